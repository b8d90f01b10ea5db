//! Per-video processing status.
//!
//! Every video carries five independent status tracks, one per [`Stage`].
//! The record is a plain struct with named fields so that the prerequisite
//! table in [`gate`] can be matched exhaustively.

pub mod gate;

pub use gate::{can_run, GateDecision, Prerequisite};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A discrete processing phase of a video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Raw transcript download.
    Transcript,
    /// Raw comment download.
    Comments,
    /// Topic extraction and summarization.
    Stage1,
    /// Atomization of topics into insights.
    Stage2,
    /// Embedding generation for insights.
    Embedding,
}

impl Stage {
    /// All stages in pipeline order.
    pub const ALL: [Stage; 5] = [
        Stage::Transcript,
        Stage::Comments,
        Stage::Stage1,
        Stage::Stage2,
        Stage::Embedding,
    ];

    /// Stages whose outputs are AI-derived and cleared by a reset.
    pub const DERIVED: [Stage; 3] = [Stage::Stage1, Stage::Stage2, Stage::Embedding];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Transcript => "transcript",
            Stage::Comments => "comments",
            Stage::Stage1 => "stage1",
            Stage::Stage2 => "stage2",
            Stage::Embedding => "embedding",
        }
    }

    /// Column holding this stage's status in the `processing_status` table.
    pub(crate) fn column(&self) -> &'static str {
        match self {
            Stage::Transcript => "transcript_status",
            Stage::Comments => "comments_status",
            Stage::Stage1 => "stage1_status",
            Stage::Stage2 => "stage2_status",
            Stage::Embedding => "embedding_status",
        }
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "transcript" | "transcripts" => Ok(Stage::Transcript),
            "comments" | "comment" => Ok(Stage::Comments),
            "stage1" | "stage_1" => Ok(Stage::Stage1),
            "stage2" | "stage_2" => Ok(Stage::Stage2),
            "embedding" | "embeddings" | "stage3" | "stage_3" => Ok(Stage::Embedding),
            _ => Err(format!("Unknown stage: {}", s)),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single stage for a single video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Pending,
    InProgress,
    Complete,
    /// Terminal. The stage is never retried.
    FailedPermanent,
    /// Scheduled exactly like `Pending`; kept for observability.
    FailedTransient,
}

impl StageStatus {
    pub const ALL: [StageStatus; 5] = [
        StageStatus::Pending,
        StageStatus::InProgress,
        StageStatus::Complete,
        StageStatus::FailedPermanent,
        StageStatus::FailedTransient,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::InProgress => "in_progress",
            StageStatus::Complete => "complete",
            StageStatus::FailedPermanent => "failed_permanent",
            StageStatus::FailedTransient => "failed_transient",
        }
    }

    /// Whether a stage in this status may be picked up by the scheduler.
    pub fn is_schedulable(&self) -> bool {
        matches!(self, StageStatus::Pending | StageStatus::FailedTransient)
    }
}

impl std::str::FromStr for StageStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(StageStatus::Pending),
            "in_progress" => Ok(StageStatus::InProgress),
            "complete" => Ok(StageStatus::Complete),
            "failed_permanent" => Ok(StageStatus::FailedPermanent),
            "failed_transient" => Ok(StageStatus::FailedTransient),
            _ => Err(format!("Unknown stage status: {}", s)),
        }
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing progress of one video across all stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStatus {
    pub video_id: String,
    pub transcript: StageStatus,
    pub comments: StageStatus,
    pub stage1: StageStatus,
    pub stage2: StageStatus,
    pub embedding: StageStatus,
    /// Permanent failure reasons, one slot per stage.
    pub errors: StageErrors,
    /// When the record was last mutated.
    pub updated_at: DateTime<Utc>,
}

impl ProcessingStatus {
    /// A fresh record with every stage pending.
    pub fn new(video_id: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            transcript: StageStatus::Pending,
            comments: StageStatus::Pending,
            stage1: StageStatus::Pending,
            stage2: StageStatus::Pending,
            embedding: StageStatus::Pending,
            errors: StageErrors::default(),
            updated_at: Utc::now(),
        }
    }

    pub fn get(&self, stage: Stage) -> StageStatus {
        match stage {
            Stage::Transcript => self.transcript,
            Stage::Comments => self.comments,
            Stage::Stage1 => self.stage1,
            Stage::Stage2 => self.stage2,
            Stage::Embedding => self.embedding,
        }
    }

    pub fn set(&mut self, stage: Stage, status: StageStatus) {
        match stage {
            Stage::Transcript => self.transcript = status,
            Stage::Comments => self.comments = status,
            Stage::Stage1 => self.stage1 = status,
            Stage::Stage2 => self.stage2 = status,
            Stage::Embedding => self.embedding = status,
        }
    }
}

/// Why each stage failed permanently, if it did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageErrors {
    pub transcript: Option<String>,
    pub comments: Option<String>,
    pub stage1: Option<String>,
    pub stage2: Option<String>,
    pub embedding: Option<String>,
}

impl StageErrors {
    pub fn get(&self, stage: Stage) -> Option<&str> {
        self.slot(stage).as_deref()
    }

    pub fn set(&mut self, stage: Stage, reason: Option<String>) {
        *self.slot_mut(stage) = reason;
    }

    /// Recorded reasons in pipeline order.
    pub fn iter(&self) -> impl Iterator<Item = (Stage, &str)> + '_ {
        Stage::ALL
            .into_iter()
            .filter_map(move |stage| self.get(stage).map(|reason| (stage, reason)))
    }

    fn slot(&self, stage: Stage) -> &Option<String> {
        match stage {
            Stage::Transcript => &self.transcript,
            Stage::Comments => &self.comments,
            Stage::Stage1 => &self.stage1,
            Stage::Stage2 => &self.stage2,
            Stage::Embedding => &self.embedding,
        }
    }

    fn slot_mut(&mut self, stage: Stage) -> &mut Option<String> {
        match stage {
            Stage::Transcript => &mut self.transcript,
            Stage::Comments => &mut self.comments,
            Stage::Stage1 => &mut self.stage1,
            Stage::Stage2 => &mut self.stage2,
            Stage::Embedding => &mut self.embedding,
        }
    }
}

/// A partial update to a [`ProcessingStatus`].
///
/// Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusUpdate {
    changes: Vec<(Stage, StageStatus)>,
    errors: Vec<(Stage, Option<String>)>,
}

impl StatusUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `stage` to `status`. A later call for the same stage wins.
    pub fn set(mut self, stage: Stage, status: StageStatus) -> Self {
        self.changes.retain(|(s, _)| *s != stage);
        self.changes.push((stage, status));
        self
    }

    /// Record why `stage` failed.
    pub fn with_error(mut self, stage: Stage, reason: impl Into<String>) -> Self {
        self.errors.retain(|(s, _)| *s != stage);
        self.errors.push((stage, Some(reason.into())));
        self
    }

    /// Forget the failure reason of `stage`.
    pub fn clear_error(mut self, stage: Stage) -> Self {
        self.errors.retain(|(s, _)| *s != stage);
        self.errors.push((stage, None));
        self
    }

    pub fn changes(&self) -> &[(Stage, StageStatus)] {
        &self.changes
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.errors.is_empty()
    }

    /// Apply the update, refusing transitions that violate the prerequisite table.
    ///
    /// A stage may only become `in_progress` or `complete` when its
    /// prerequisites are complete in the resulting record.
    pub fn apply(&self, status: &mut ProcessingStatus) -> std::result::Result<(), String> {
        let mut next = status.clone();
        for (stage, value) in &self.changes {
            next.set(*stage, *value);
        }
        for (stage, reason) in &self.errors {
            next.errors.set(*stage, reason.clone());
        }

        for (stage, value) in &self.changes {
            if matches!(value, StageStatus::InProgress | StageStatus::Complete) {
                let prerequisite = Prerequisite::of(*stage);
                if !prerequisite.is_satisfied(&next) {
                    return Err(format!(
                        "cannot mark {} as {} for {}: requires {}",
                        stage, value, status.video_id, prerequisite
                    ));
                }
            }
        }

        next.updated_at = Utc::now();
        *status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_round_trips_through_str() {
        for stage in Stage::ALL {
            assert_eq!(stage.as_str().parse::<Stage>().unwrap(), stage);
        }
        assert_eq!("stage_3".parse::<Stage>().unwrap(), Stage::Embedding);
        assert!("stage4".parse::<Stage>().is_err());
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in StageStatus::ALL {
            assert_eq!(status.as_str().parse::<StageStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_transient_schedules_like_pending() {
        assert!(StageStatus::Pending.is_schedulable());
        assert!(StageStatus::FailedTransient.is_schedulable());
        assert!(!StageStatus::FailedPermanent.is_schedulable());
        assert!(!StageStatus::Complete.is_schedulable());
        assert!(!StageStatus::InProgress.is_schedulable());
    }

    #[test]
    fn test_update_rejects_complete_without_prerequisite() {
        let mut status = ProcessingStatus::new("v1");
        let update = StatusUpdate::new().set(Stage::Stage2, StageStatus::Complete);

        assert!(update.apply(&mut status).is_err());
        assert_eq!(status.stage2, StageStatus::Pending);
    }

    #[test]
    fn test_update_checks_prerequisites_against_resulting_record() {
        let mut status = ProcessingStatus::new("v1");
        let update = StatusUpdate::new()
            .set(Stage::Transcript, StageStatus::Complete)
            .set(Stage::Stage1, StageStatus::Complete);

        update.apply(&mut status).unwrap();
        assert_eq!(status.transcript, StageStatus::Complete);
        assert_eq!(status.stage1, StageStatus::Complete);
    }

    #[test]
    fn test_update_allows_failure_without_prerequisite() {
        let mut status = ProcessingStatus::new("v1");
        let update = StatusUpdate::new()
            .set(Stage::Comments, StageStatus::FailedPermanent)
            .with_error(Stage::Comments, "comments disabled");

        update.apply(&mut status).unwrap();
        assert_eq!(status.comments, StageStatus::FailedPermanent);
        assert_eq!(status.errors.get(Stage::Comments), Some("comments disabled"));
        assert_eq!(status.errors.get(Stage::Transcript), None);
    }

    #[test]
    fn test_failure_reasons_are_kept_per_stage() {
        let mut status = ProcessingStatus::new("v1");
        StatusUpdate::new()
            .set(Stage::Comments, StageStatus::FailedPermanent)
            .with_error(Stage::Comments, "comments disabled")
            .apply(&mut status)
            .unwrap();
        StatusUpdate::new()
            .set(Stage::Transcript, StageStatus::FailedPermanent)
            .with_error(Stage::Transcript, "no captions")
            .apply(&mut status)
            .unwrap();

        let reasons: Vec<_> = status.errors.iter().collect();
        assert_eq!(
            reasons,
            vec![(Stage::Transcript, "no captions"), (Stage::Comments, "comments disabled")]
        );

        StatusUpdate::new()
            .clear_error(Stage::Comments)
            .apply(&mut status)
            .unwrap();
        assert_eq!(status.errors.get(Stage::Comments), None);
        assert_eq!(status.errors.get(Stage::Transcript), Some("no captions"));
    }

    #[test]
    fn test_later_set_for_same_stage_wins() {
        let update = StatusUpdate::new()
            .set(Stage::Transcript, StageStatus::Complete)
            .set(Stage::Transcript, StageStatus::FailedPermanent);
        assert_eq!(update.changes(), &[(Stage::Transcript, StageStatus::FailedPermanent)]);
    }
}
