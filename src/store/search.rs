//! Read paths used by the search layer.

use super::content::{insight_from_row, INSIGHT_COLUMNS};
use super::{bytes_to_embedding, timestamps_from_json, InsightContext, Store};
use crate::error::Result;
use rusqlite::{params, OptionalExtension};
use tracing::instrument;

impl Store {
    /// Full-text match over insight text, best first.
    ///
    /// `query` is an FTS5 expression. Scores are negated bm25, so higher is better.
    #[instrument(skip(self))]
    pub fn search_insights_fts(&self, query: &str, limit: usize) -> Result<Vec<(i64, f64)>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT rowid, bm25(atomic_insights_fts)
            FROM atomic_insights_fts
            WHERE atomic_insights_fts MATCH ?1
            ORDER BY bm25(atomic_insights_fts)
            LIMIT ?2
            "#,
        )?;
        let hits = stmt
            .query_map(params![query, limit as i64], |row| {
                let score: f64 = row.get(1)?;
                Ok((row.get(0)?, -score))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(hits)
    }

    /// Every insight that has a stored vector.
    pub fn insight_embeddings(&self) -> Result<Vec<(i64, Vec<f32>)>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT insight_id, embedding FROM atomic_insights WHERE embedding IS NOT NULL",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let bytes: Vec<u8> = row.get(1)?;
                Ok((row.get(0)?, bytes_to_embedding(&bytes)))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// An insight joined with its topic and video.
    pub fn insight_context(&self, insight_id: i64) -> Result<Option<InsightContext>> {
        let conn = self.lock()?;
        let sql = format!(
            r#"
            SELECT {}, t.topic_title, t.summary_timestamps, v.video_id, v.title
            FROM atomic_insights i
            JOIN topic_summaries t ON t.summary_id = i.summary_id
            JOIN videos v ON v.video_id = t.video_id
            WHERE i.insight_id = ?1
            "#,
            INSIGHT_COLUMNS
        );
        let context = conn
            .query_row(&sql, params![insight_id], |row| {
                Ok(InsightContext {
                    insight: insight_from_row(row)?,
                    topic_title: row.get(7)?,
                    topic_timestamps: timestamps_from_json(row.get(8)?),
                    video_id: row.get(9)?,
                    video_title: row.get(10)?,
                })
            })
            .optional()?;
        Ok(context)
    }
}
