//! Channels, videos, raw content and AI outputs.

use super::{
    bytes_to_embedding, embedding_to_bytes, parse_column, parse_datetime, timestamps_from_json,
    timestamps_to_json, AtomicInsight, Channel, NewInsight, NewTopic, RawComment, RawTranscript,
    Store, TopicSummary, Video,
};
use crate::error::Result;
use crate::source::{FetchedComment, FetchedTranscript, VideoListing};
use crate::status::ProcessingStatus;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, instrument};

pub(super) const INSIGHT_COLUMNS: &str = "i.insight_id, i.summary_id, i.insight_type, \
     i.confidence_score, i.insight_text, i.insight_timestamps, i.embedding";

pub(super) fn insight_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AtomicInsight> {
    let embedding: Option<Vec<u8>> = row.get(6)?;
    Ok(AtomicInsight {
        insight_id: row.get(0)?,
        summary_id: row.get(1)?,
        insight_type: parse_column(2, row.get(2)?)?,
        confidence: row.get(3)?,
        text: row.get(4)?,
        timestamps: timestamps_from_json(row.get(5)?),
        embedding: embedding.map(|bytes| bytes_to_embedding(&bytes)),
    })
}

fn video_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Video> {
    Ok(Video {
        video_id: row.get(0)?,
        channel_id: row.get(1)?,
        title: row.get(2)?,
        published_at: parse_datetime(row.get(3)?),
        duration_seconds: row.get(4)?,
        view_count: row.get(5)?,
        like_count: row.get(6)?,
    })
}

pub(crate) fn insert_raw_transcript(
    conn: &Connection,
    video_id: &str,
    transcript: &FetchedTranscript,
) -> Result<usize> {
    conn.execute(
        r#"
        INSERT INTO raw_transcripts
            (video_id, language, transcript_text, was_translated, downloaded_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            video_id,
            transcript.language,
            transcript.text,
            transcript.was_translated,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(1)
}

/// Insert fetched comments, skipping ids that are already stored.
pub(crate) fn insert_raw_comments(
    conn: &Connection,
    video_id: &str,
    comments: &[FetchedComment],
) -> Result<usize> {
    let mut stmt = conn.prepare(
        r#"
        INSERT OR IGNORE INTO raw_comments
            (comment_id, video_id, parent_comment_id, author, comment_text,
             like_count, published_at, downloaded_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )?;

    let now = Utc::now().to_rfc3339();
    let mut inserted = 0;
    for comment in comments {
        inserted += stmt.execute(params![
            comment.comment_id,
            video_id,
            comment.parent_comment_id,
            comment.author,
            comment.text,
            comment.like_count,
            comment.published_at.map(|dt| dt.to_rfc3339()),
            now,
        ])?;
    }
    Ok(inserted)
}

pub(crate) fn insert_topic(conn: &Connection, video_id: &str, topic: &NewTopic) -> Result<i64> {
    conn.execute(
        r#"
        INSERT INTO topic_summaries
            (video_id, topic_title, summary_text, summary_timestamps, source_type,
             comment_id, popularity_weight, confidence_score, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
        params![
            video_id,
            topic.title,
            topic.summary,
            timestamps_to_json(&topic.timestamps),
            topic.source.as_str(),
            topic.comment_id,
            topic.popularity_weight,
            topic.confidence,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn insert_insight(conn: &Connection, summary_id: i64, insight: &NewInsight) -> Result<i64> {
    conn.execute(
        r#"
        INSERT INTO atomic_insights
            (summary_id, insight_type, confidence_score, insight_text,
             insight_timestamps, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![
            summary_id,
            insight.insight_type.as_str(),
            insight.confidence,
            insight.text,
            timestamps_to_json(&insight.timestamps),
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn set_insight_embedding(conn: &Connection, insight_id: i64, embedding: &[f32]) -> Result<()> {
    conn.execute(
        "UPDATE atomic_insights SET embedding = ?1 WHERE insight_id = ?2",
        params![embedding_to_bytes(embedding), insight_id],
    )?;
    Ok(())
}

/// Insights of one video that still have no embedding.
pub(crate) fn count_unembedded(conn: &Connection, video_id: &str) -> Result<usize> {
    let count: i64 = conn.query_row(
        r#"
        SELECT COUNT(*) FROM atomic_insights i
        JOIN topic_summaries t ON t.summary_id = i.summary_id
        WHERE t.video_id = ?1 AND i.embedding IS NULL
        "#,
        params![video_id],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

/// Delete derived rows, insights before topics.
///
/// `video_id = None` clears every video. Returns `(insights, topics)` deleted.
pub(crate) fn delete_derived(conn: &Connection, video_id: Option<&str>) -> Result<(usize, usize)> {
    let (insights, topics) = match video_id {
        Some(id) => {
            let insights = conn.execute(
                r#"
                DELETE FROM atomic_insights WHERE summary_id IN
                    (SELECT summary_id FROM topic_summaries WHERE video_id = ?1)
                "#,
                params![id],
            )?;
            let topics = conn.execute("DELETE FROM topic_summaries WHERE video_id = ?1", params![id])?;
            (insights, topics)
        }
        None => {
            let insights = conn.execute("DELETE FROM atomic_insights", [])?;
            let topics = conn.execute("DELETE FROM topic_summaries", [])?;
            (insights, topics)
        }
    };
    debug!(?video_id, insights, topics, "Deleted derived rows");
    Ok((insights, topics))
}

/// Delete the insights of one video, keeping its topics.
pub(crate) fn delete_insights(conn: &Connection, video_id: &str) -> Result<usize> {
    let deleted = conn.execute(
        r#"
        DELETE FROM atomic_insights WHERE summary_id IN
            (SELECT summary_id FROM topic_summaries WHERE video_id = ?1)
        "#,
        params![video_id],
    )?;
    Ok(deleted)
}

impl Store {
    pub fn upsert_channel(&self, channel_id: &str, name: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO channels (channel_id, channel_name, discovered_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(channel_id) DO UPDATE SET channel_name = excluded.channel_name
            "#,
            params![channel_id, name, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn get_channel(&self, channel_id: &str) -> Result<Option<Channel>> {
        let conn = self.lock()?;
        let channel = conn
            .query_row(
                "SELECT channel_id, channel_name FROM channels WHERE channel_id = ?1",
                params![channel_id],
                |row| {
                    Ok(Channel {
                        channel_id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(channel)
    }

    /// Insert a newly discovered video together with an all-pending status row.
    ///
    /// Both rows commit in one transaction. Returns `false` (and writes
    /// nothing) when the video is already known.
    #[instrument(skip(self, listing), fields(video_id = %listing.video_id))]
    pub fn insert_video(&self, channel_id: &str, listing: &VideoListing) -> Result<bool> {
        self.transaction(|tx| {
            let inserted = tx.execute(
                r#"
                INSERT OR IGNORE INTO videos
                    (video_id, channel_id, title, published_at, duration_seconds,
                     view_count, like_count, discovered_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    listing.video_id,
                    channel_id,
                    listing.title,
                    listing.published_at.map(|dt| dt.to_rfc3339()),
                    listing.duration_seconds,
                    listing.view_count,
                    listing.like_count,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            if inserted == 0 {
                return Ok(false);
            }

            let status = ProcessingStatus::new(&listing.video_id);
            tx.execute(
                "INSERT INTO processing_status (video_id, updated_at) VALUES (?1, ?2)",
                params![status.video_id, status.updated_at.to_rfc3339()],
            )?;
            Ok(true)
        })
    }

    pub fn get_video(&self, video_id: &str) -> Result<Option<Video>> {
        let conn = self.lock()?;
        let video = conn
            .query_row(
                r#"
                SELECT video_id, channel_id, title, published_at, duration_seconds,
                       view_count, like_count
                FROM videos WHERE video_id = ?1
                "#,
                params![video_id],
                video_from_row,
            )
            .optional()?;
        Ok(video)
    }

    /// Videos of a channel, newest first.
    pub fn list_videos(&self, channel_id: Option<&str>) -> Result<Vec<Video>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT video_id, channel_id, title, published_at, duration_seconds,
                   view_count, like_count
            FROM videos
            WHERE ?1 IS NULL OR channel_id = ?1
            ORDER BY published_at DESC, video_id
            "#,
        )?;
        let videos = stmt
            .query_map(params![channel_id], video_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(videos)
    }

    pub fn raw_transcripts(&self, video_id: &str) -> Result<Vec<RawTranscript>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT transcript_id, video_id, language, transcript_text, was_translated
            FROM raw_transcripts WHERE video_id = ?1
            ORDER BY transcript_id
            "#,
        )?;
        let transcripts = stmt
            .query_map(params![video_id], |row| {
                Ok(RawTranscript {
                    transcript_id: row.get(0)?,
                    video_id: row.get(1)?,
                    language: row.get(2)?,
                    text: row.get(3)?,
                    was_translated: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(transcripts)
    }

    /// Raw comments of a video, most liked first.
    pub fn raw_comments(&self, video_id: &str) -> Result<Vec<RawComment>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT comment_id, video_id, parent_comment_id, author, comment_text,
                   like_count, published_at
            FROM raw_comments WHERE video_id = ?1
            ORDER BY like_count DESC, comment_id
            "#,
        )?;
        let comments = stmt
            .query_map(params![video_id], |row| {
                Ok(RawComment {
                    comment_id: row.get(0)?,
                    video_id: row.get(1)?,
                    parent_comment_id: row.get(2)?,
                    author: row.get(3)?,
                    text: row.get(4)?,
                    like_count: row.get(5)?,
                    published_at: parse_datetime(row.get(6)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(comments)
    }

    pub fn topics_for_video(&self, video_id: &str) -> Result<Vec<TopicSummary>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT summary_id, video_id, topic_title, summary_text, summary_timestamps,
                   source_type, comment_id, popularity_weight, confidence_score
            FROM topic_summaries WHERE video_id = ?1
            ORDER BY summary_id
            "#,
        )?;
        let topics = stmt
            .query_map(params![video_id], |row| {
                Ok(TopicSummary {
                    summary_id: row.get(0)?,
                    video_id: row.get(1)?,
                    title: row.get(2)?,
                    summary: row.get(3)?,
                    timestamps: timestamps_from_json(row.get(4)?),
                    source: parse_column(5, row.get(5)?)?,
                    comment_id: row.get(6)?,
                    popularity_weight: row.get(7)?,
                    confidence: row.get(8)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(topics)
    }

    pub fn insights_for_video(&self, video_id: &str) -> Result<Vec<AtomicInsight>> {
        let conn = self.lock()?;
        let sql = format!(
            r#"
            SELECT {}
            FROM atomic_insights i
            JOIN topic_summaries t ON t.summary_id = i.summary_id
            WHERE t.video_id = ?1
            ORDER BY i.insight_id
            "#,
            INSIGHT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let insights = stmt
            .query_map(params![video_id], insight_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(insights)
    }

    pub fn count_topics(&self, video_id: Option<&str>) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM topic_summaries WHERE ?1 IS NULL OR video_id = ?1",
            params![video_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn count_insights(&self, video_id: Option<&str>) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            r#"
            SELECT COUNT(*) FROM atomic_insights i
            JOIN topic_summaries t ON t.summary_id = i.summary_id
            WHERE ?1 IS NULL OR t.video_id = ?1
            "#,
            params![video_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
