//! SQLite-backed store for videos, raw content, AI outputs and processing status.
//!
//! A single connection behind a mutex. Every write that touches both derived
//! rows and status goes through [`Store::transaction`] so the two commit or
//! roll back together.

mod content;
pub mod models;
mod schema;
mod search;
mod status;

pub use models::{
    AtomicInsight, Channel, InsightContext, InsightType, NewInsight, NewTopic, RawComment,
    RawTranscript, TopicSource, TopicSummary, Video,
};
pub use status::StatusSummary;

pub(crate) use content::{
    count_unembedded, delete_derived, delete_insights, insert_insight, insert_raw_comments,
    insert_raw_transcript, insert_topic, set_insight_embedding,
};
pub(crate) use status::{read_status, status_video_ids, write_status};

use crate::error::{Result, TubeminerError};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Transaction};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{info, instrument};

/// Persistent store.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database at `path`.
    #[instrument(skip_all)]
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        schema::init(&conn)?;

        info!("Opened store at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::init(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| TubeminerError::Store(format!("Failed to acquire lock: {}", e)))
    }

    /// Run `f` inside a transaction. Commits if `f` returns `Ok`, rolls back otherwise.
    pub(crate) fn transaction<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Run raw SQL against the connection. Test hook for fault injection.
    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> Result<()> {
        self.lock()?.execute_batch(sql)?;
        Ok(())
    }
}

/// Serialize an embedding to little-endian bytes.
pub(crate) fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Deserialize an embedding from little-endian bytes.
pub(crate) fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| {
            let arr: [u8; 4] = chunk.try_into().unwrap_or_default();
            f32::from_le_bytes(arr)
        })
        .collect()
}

pub(crate) fn parse_datetime(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

pub(crate) fn timestamps_to_json(timestamps: &[String]) -> Option<String> {
    if timestamps.is_empty() {
        None
    } else {
        serde_json::to_string(timestamps).ok()
    }
}

pub(crate) fn timestamps_from_json(value: Option<String>) -> Vec<String> {
    value
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

/// Parse a TEXT column into an enum, surfacing bad values as a conversion error.
pub(crate) fn parse_column<T>(idx: usize, value: String) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    value.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}

