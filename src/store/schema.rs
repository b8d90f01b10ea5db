//! SQLite schema.

use rusqlite::Connection;

pub(crate) const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS channels (
    channel_id TEXT PRIMARY KEY,
    channel_name TEXT NOT NULL,
    discovered_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS videos (
    video_id TEXT PRIMARY KEY,
    channel_id TEXT NOT NULL REFERENCES channels(channel_id),
    title TEXT NOT NULL,
    published_at TEXT,
    duration_seconds INTEGER,
    view_count INTEGER NOT NULL DEFAULT 0,
    like_count INTEGER NOT NULL DEFAULT 0,
    discovered_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_videos_channel ON videos(channel_id);

CREATE TABLE IF NOT EXISTS processing_status (
    video_id TEXT PRIMARY KEY REFERENCES videos(video_id),
    transcript_status TEXT NOT NULL DEFAULT 'pending',
    comments_status TEXT NOT NULL DEFAULT 'pending',
    stage1_status TEXT NOT NULL DEFAULT 'pending',
    stage2_status TEXT NOT NULL DEFAULT 'pending',
    embedding_status TEXT NOT NULL DEFAULT 'pending',
    transcript_error TEXT,
    comments_error TEXT,
    stage1_error TEXT,
    stage2_error TEXT,
    embedding_error TEXT,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS raw_transcripts (
    transcript_id INTEGER PRIMARY KEY AUTOINCREMENT,
    video_id TEXT NOT NULL REFERENCES videos(video_id),
    language TEXT NOT NULL,
    transcript_text TEXT NOT NULL,
    was_translated INTEGER NOT NULL,
    downloaded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_raw_transcripts_video ON raw_transcripts(video_id);

CREATE TABLE IF NOT EXISTS raw_comments (
    comment_id TEXT PRIMARY KEY,
    video_id TEXT NOT NULL REFERENCES videos(video_id),
    parent_comment_id TEXT,
    author TEXT NOT NULL,
    comment_text TEXT NOT NULL,
    like_count INTEGER NOT NULL,
    published_at TEXT,
    downloaded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_raw_comments_video ON raw_comments(video_id);

CREATE TABLE IF NOT EXISTS topic_summaries (
    summary_id INTEGER PRIMARY KEY AUTOINCREMENT,
    video_id TEXT NOT NULL REFERENCES videos(video_id),
    topic_title TEXT NOT NULL,
    summary_text TEXT NOT NULL,
    summary_timestamps TEXT,
    source_type TEXT NOT NULL,
    comment_id TEXT REFERENCES raw_comments(comment_id),
    popularity_weight REAL,
    confidence_score INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_topic_summaries_video ON topic_summaries(video_id);

CREATE TABLE IF NOT EXISTS atomic_insights (
    insight_id INTEGER PRIMARY KEY AUTOINCREMENT,
    summary_id INTEGER NOT NULL REFERENCES topic_summaries(summary_id),
    insight_type TEXT NOT NULL,
    confidence_score INTEGER NOT NULL,
    insight_text TEXT NOT NULL,
    insight_timestamps TEXT,
    embedding BLOB,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_atomic_insights_summary ON atomic_insights(summary_id);

CREATE VIRTUAL TABLE IF NOT EXISTS atomic_insights_fts USING fts5(
    insight_text,
    content='atomic_insights',
    content_rowid='insight_id'
);

CREATE TRIGGER IF NOT EXISTS atomic_insights_ai AFTER INSERT ON atomic_insights BEGIN
    INSERT INTO atomic_insights_fts(rowid, insight_text) VALUES (new.insight_id, new.insight_text);
END;

CREATE TRIGGER IF NOT EXISTS atomic_insights_ad AFTER DELETE ON atomic_insights BEGIN
    INSERT INTO atomic_insights_fts(atomic_insights_fts, rowid, insight_text)
    VALUES ('delete', old.insight_id, old.insight_text);
END;

CREATE TRIGGER IF NOT EXISTS atomic_insights_au AFTER UPDATE OF insight_text ON atomic_insights BEGIN
    INSERT INTO atomic_insights_fts(atomic_insights_fts, rowid, insight_text)
    VALUES ('delete', old.insight_id, old.insight_text);
    INSERT INTO atomic_insights_fts(rowid, insight_text) VALUES (new.insight_id, new.insight_text);
END;
"#;

/// Create all tables, indexes and triggers if they don't exist.
pub(crate) fn init(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(SCHEMA)
}
