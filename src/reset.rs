//! Reset of AI outputs.
//!
//! Deletes topic summaries and insights and puts the three derived stages
//! back to `pending`, in one transaction. Raw transcripts, raw comments and
//! their statuses are never touched.

use crate::error::{Result, TubeminerError};
use crate::status::{Stage, StageStatus, StatusUpdate};
use crate::store::{delete_derived, read_status, status_video_ids, write_status, Store};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Which videos to reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetScope {
    All,
    Videos(Vec<String>),
}

/// Whether the operator confirmed a destructive reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetConfirmation {
    Confirmed,
    Unconfirmed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetReport {
    pub videos: usize,
    pub topics_deleted: usize,
    pub insights_deleted: usize,
}

pub struct ResetController {
    store: Arc<Store>,
}

impl ResetController {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Clear AI outputs for `scope`.
    ///
    /// `All` is refused unless confirmed. Unknown video ids abort the whole
    /// reset before anything is deleted.
    #[instrument(skip(self))]
    pub fn reset_processing(
        &self,
        scope: &ResetScope,
        confirmation: ResetConfirmation,
    ) -> Result<ResetReport> {
        if *scope == ResetScope::All && confirmation != ResetConfirmation::Confirmed {
            return Err(TubeminerError::InvalidInput(
                "Resetting every video deletes all topics and insights; confirmation required"
                    .to_string(),
            ));
        }

        let pending = Stage::DERIVED.iter().fold(StatusUpdate::new(), |update, stage| {
            update.set(*stage, StageStatus::Pending).clear_error(*stage)
        });

        let report = self.store.transaction(|tx| {
            let mut report = ResetReport::default();

            let video_ids = match scope {
                ResetScope::All => {
                    let (insights, topics) = delete_derived(tx, None)?;
                    report.insights_deleted = insights;
                    report.topics_deleted = topics;
                    status_video_ids(tx)?
                }
                ResetScope::Videos(ids) => {
                    for id in ids {
                        if read_status(tx, id)?.is_none() {
                            return Err(TubeminerError::VideoNotFound(id.clone()));
                        }
                        let (insights, topics) = delete_derived(tx, Some(id))?;
                        report.insights_deleted += insights;
                        report.topics_deleted += topics;
                    }
                    ids.clone()
                }
            };

            for id in &video_ids {
                write_status(tx, id, &pending)?;
            }
            report.videos = video_ids.len();
            Ok(report)
        })?;

        if report.videos == 0 {
            warn!("Reset matched no videos");
        }
        info!(
            "Reset {} videos: deleted {} topics and {} insights",
            report.videos, report.topics_deleted, report.insights_deleted
        );
        Ok(report)
    }
}
