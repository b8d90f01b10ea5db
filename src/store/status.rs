//! Status store operations.

use super::{parse_column, Store};
use crate::error::{Result, TubeminerError};
use crate::status::{Prerequisite, ProcessingStatus, Stage, StageErrors, StageStatus, StatusUpdate};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use tracing::{debug, instrument};

const STATUS_COLUMNS: &str = "video_id, transcript_status, comments_status, stage1_status, \
     stage2_status, embedding_status, transcript_error, comments_error, stage1_error, \
     stage2_error, embedding_error, updated_at";

fn status_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProcessingStatus> {
    let updated_at: String = row.get(11)?;
    Ok(ProcessingStatus {
        video_id: row.get(0)?,
        transcript: parse_column(1, row.get(1)?)?,
        comments: parse_column(2, row.get(2)?)?,
        stage1: parse_column(3, row.get(3)?)?,
        stage2: parse_column(4, row.get(4)?)?,
        embedding: parse_column(5, row.get(5)?)?,
        errors: StageErrors {
            transcript: row.get(6)?,
            comments: row.get(7)?,
            stage1: row.get(8)?,
            stage2: row.get(9)?,
            embedding: row.get(10)?,
        },
        updated_at: DateTime::parse_from_rfc3339(&updated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

/// Read a status record on an existing connection or transaction.
pub(crate) fn read_status(conn: &Connection, video_id: &str) -> Result<Option<ProcessingStatus>> {
    let sql = format!(
        "SELECT {} FROM processing_status WHERE video_id = ?1",
        STATUS_COLUMNS
    );
    let status = conn
        .query_row(&sql, params![video_id], status_from_row)
        .optional()?;
    Ok(status)
}

/// Apply `update` to the record for `video_id`, creating it if missing.
///
/// Runs on the caller's connection so it joins whatever transaction the
/// accompanying data write is in.
pub(crate) fn write_status(
    conn: &Connection,
    video_id: &str,
    update: &StatusUpdate,
) -> Result<ProcessingStatus> {
    let mut status =
        read_status(conn, video_id)?.unwrap_or_else(|| ProcessingStatus::new(video_id));

    update
        .apply(&mut status)
        .map_err(TubeminerError::InvalidInput)?;

    conn.execute(
        r#"
        INSERT INTO processing_status
            (video_id, transcript_status, comments_status, stage1_status,
             stage2_status, embedding_status, transcript_error, comments_error,
             stage1_error, stage2_error, embedding_error, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        ON CONFLICT(video_id) DO UPDATE SET
            transcript_status = excluded.transcript_status,
            comments_status = excluded.comments_status,
            stage1_status = excluded.stage1_status,
            stage2_status = excluded.stage2_status,
            embedding_status = excluded.embedding_status,
            transcript_error = excluded.transcript_error,
            comments_error = excluded.comments_error,
            stage1_error = excluded.stage1_error,
            stage2_error = excluded.stage2_error,
            embedding_error = excluded.embedding_error,
            updated_at = excluded.updated_at
        "#,
        params![
            status.video_id,
            status.transcript.as_str(),
            status.comments.as_str(),
            status.stage1.as_str(),
            status.stage2.as_str(),
            status.embedding.as_str(),
            status.errors.transcript,
            status.errors.comments,
            status.errors.stage1,
            status.errors.stage2,
            status.errors.embedding,
            status.updated_at.to_rfc3339(),
        ],
    )?;

    debug!(video_id, changes = ?update.changes(), "Status updated");
    Ok(status)
}

/// Every video that has a status record.
pub(crate) fn status_video_ids(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT video_id FROM processing_status ORDER BY video_id")?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(ids)
}

/// SQL condition matching rows whose prerequisites for `stage` are complete.
fn prerequisite_condition(stage: Stage) -> String {
    let complete = |s: &Stage| format!("{} = '{}'", s.column(), StageStatus::Complete.as_str());
    match Prerequisite::of(stage) {
        Prerequisite::None => "1 = 1".to_string(),
        Prerequisite::AnyOf(stages) => format!(
            "({})",
            stages.iter().map(complete).collect::<Vec<_>>().join(" OR ")
        ),
        Prerequisite::AllOf(stages) => format!(
            "({})",
            stages.iter().map(complete).collect::<Vec<_>>().join(" AND ")
        ),
    }
}

/// Counts of each status value per stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusSummary {
    pub total_videos: usize,
    counts: HashMap<(Stage, StageStatus), usize>,
}

impl StatusSummary {
    pub fn count(&self, stage: Stage, status: StageStatus) -> usize {
        self.counts.get(&(stage, status)).copied().unwrap_or(0)
    }
}

impl Store {
    /// Status record for a video, or `None` if the video is unknown.
    #[instrument(skip(self))]
    pub fn get_status(&self, video_id: &str) -> Result<Option<ProcessingStatus>> {
        let conn = self.lock()?;
        read_status(&conn, video_id)
    }

    /// Apply a partial update in its own transaction.
    ///
    /// Used for status-only transitions (permanent failures). Transitions that
    /// accompany stage output are written together with the output instead.
    #[instrument(skip(self, update))]
    pub fn upsert_status(&self, video_id: &str, update: &StatusUpdate) -> Result<ProcessingStatus> {
        self.transaction(|tx| write_status(tx, video_id, update))
    }

    /// Videos whose `stage` is schedulable and whose prerequisites are complete.
    ///
    /// Newest videos first.
    #[instrument(skip(self))]
    pub fn list_eligible(&self, stage: Stage, batch_size: usize) -> Result<Vec<String>> {
        let sql = format!(
            r#"
            SELECT s.video_id
            FROM processing_status s
            JOIN videos v ON v.video_id = s.video_id
            WHERE s.{col} IN ('{pending}', '{transient}')
              AND {prereq}
            ORDER BY v.published_at DESC, s.video_id
            LIMIT ?1
            "#,
            col = stage.column(),
            pending = StageStatus::Pending.as_str(),
            transient = StageStatus::FailedTransient.as_str(),
            prereq = prerequisite_condition(stage),
        );

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map(params![batch_size as i64], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    /// Count of videos in each status for every stage.
    pub fn status_summary(&self) -> Result<StatusSummary> {
        let conn = self.lock()?;
        let total: i64 =
            conn.query_row("SELECT COUNT(*) FROM processing_status", [], |row| row.get(0))?;

        let mut summary = StatusSummary {
            total_videos: total as usize,
            ..Default::default()
        };

        for stage in Stage::ALL {
            let sql = format!(
                "SELECT {col}, COUNT(*) FROM processing_status GROUP BY {col}",
                col = stage.column()
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], |row| {
                let status: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((parse_column::<StageStatus>(0, status)?, count as usize))
            })?;
            for row in rows {
                let (status, count) = row?;
                summary.counts.insert((stage, status), count);
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::VideoListing;

    fn seeded_store(ids: &[&str]) -> Store {
        let store = Store::in_memory().unwrap();
        store.upsert_channel("UC1", "Channel").unwrap();
        for (i, id) in ids.iter().enumerate() {
            let listing = VideoListing {
                video_id: id.to_string(),
                title: format!("Video {}", id),
                published_at: Some(Utc::now() - chrono::Duration::days(i as i64)),
                duration_seconds: Some(600),
                view_count: 10,
                like_count: 1,
            };
            store.insert_video("UC1", &listing).unwrap();
        }
        store
    }

    #[test]
    fn test_get_status_unknown_video() {
        let store = seeded_store(&[]);
        assert!(store.get_status("nope").unwrap().is_none());
    }

    #[test]
    fn test_discovered_video_starts_pending() {
        let store = seeded_store(&["v1"]);
        let status = store.get_status("v1").unwrap().unwrap();
        for stage in Stage::ALL {
            assert_eq!(status.get(stage), StageStatus::Pending);
        }
    }

    #[test]
    fn test_upsert_status_persists() {
        let store = seeded_store(&["v1"]);
        let update = StatusUpdate::new()
            .set(Stage::Comments, StageStatus::FailedPermanent)
            .with_error(Stage::Comments, "comments disabled");
        store.upsert_status("v1", &update).unwrap();

        let status = store.get_status("v1").unwrap().unwrap();
        assert_eq!(status.comments, StageStatus::FailedPermanent);
        assert_eq!(status.errors.get(Stage::Comments), Some("comments disabled"));
        assert_eq!(status.transcript, StageStatus::Pending);
    }

    #[test]
    fn test_upsert_status_rejects_invalid_transition() {
        let store = seeded_store(&["v1"]);
        let update = StatusUpdate::new().set(Stage::Embedding, StageStatus::Complete);
        assert!(store.upsert_status("v1", &update).is_err());
        assert_eq!(
            store.get_status("v1").unwrap().unwrap().embedding,
            StageStatus::Pending
        );
    }

    #[test]
    fn test_list_eligible_respects_prerequisites() {
        let store = seeded_store(&["v1", "v2", "v3"]);
        store
            .upsert_status(
                "v1",
                &StatusUpdate::new().set(Stage::Transcript, StageStatus::Complete),
            )
            .unwrap();
        store
            .upsert_status(
                "v2",
                &StatusUpdate::new()
                    .set(Stage::Transcript, StageStatus::FailedPermanent)
                    .set(Stage::Comments, StageStatus::Complete),
            )
            .unwrap();

        let eligible = store.list_eligible(Stage::Stage1, 10).unwrap();
        assert_eq!(eligible, vec!["v1".to_string(), "v2".to_string()]);
        assert!(store.list_eligible(Stage::Stage2, 10).unwrap().is_empty());
    }

    #[test]
    fn test_list_eligible_includes_transient_and_excludes_terminal() {
        let store = seeded_store(&["v1", "v2", "v3"]);
        store
            .upsert_status(
                "v1",
                &StatusUpdate::new().set(Stage::Transcript, StageStatus::FailedTransient),
            )
            .unwrap();
        store
            .upsert_status(
                "v2",
                &StatusUpdate::new().set(Stage::Transcript, StageStatus::FailedPermanent),
            )
            .unwrap();
        store
            .upsert_status(
                "v3",
                &StatusUpdate::new().set(Stage::Transcript, StageStatus::InProgress),
            )
            .unwrap();

        assert_eq!(store.list_eligible(Stage::Transcript, 10).unwrap(), vec!["v1"]);
    }

    #[test]
    fn test_list_eligible_honours_batch_size() {
        let store = seeded_store(&["v1", "v2", "v3"]);
        let eligible = store.list_eligible(Stage::Comments, 2).unwrap();
        assert_eq!(eligible, vec!["v1", "v2"]);
    }

    #[test]
    fn test_status_summary_counts() {
        let store = seeded_store(&["v1", "v2"]);
        store
            .upsert_status(
                "v1",
                &StatusUpdate::new().set(Stage::Transcript, StageStatus::Complete),
            )
            .unwrap();

        let summary = store.status_summary().unwrap();
        assert_eq!(summary.total_videos, 2);
        assert_eq!(summary.count(Stage::Transcript, StageStatus::Complete), 1);
        assert_eq!(summary.count(Stage::Transcript, StageStatus::Pending), 1);
        assert_eq!(summary.count(Stage::Stage2, StageStatus::Pending), 2);
        assert_eq!(summary.count(Stage::Stage2, StageStatus::Complete), 0);
    }
}
