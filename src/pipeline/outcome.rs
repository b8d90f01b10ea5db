//! Results of stage invocations, batches and whole runs.

use super::drain::StopReason;
use crate::status::{GateDecision, Stage};
use crate::usage::UsageSnapshot;
use uuid::Uuid;

/// Result of one stage invocation for one video.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    /// Outputs and `complete` status were committed together.
    Completed { rows: usize },
    /// The gate refused; nothing was called or written.
    Skipped(GateDecision),
    /// Recorded as `failed_permanent`; never retried.
    PermanentlyFailed(String),
    /// Nothing written; the video stays eligible.
    TransientlyFailed(String),
    /// The commit itself failed and was rolled back.
    IntegrityFailed(String),
}

impl StageOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            StageOutcome::Completed { .. } => "done",
            StageOutcome::Skipped(_) => "skipped",
            StageOutcome::PermanentlyFailed(_) => "will never retry",
            StageOutcome::TransientlyFailed(_) => "will retry",
            StageOutcome::IntegrityFailed(_) => "storage error",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            StageOutcome::PermanentlyFailed(_)
                | StageOutcome::TransientlyFailed(_)
                | StageOutcome::IntegrityFailed(_)
        )
    }
}

impl std::fmt::Display for StageOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageOutcome::Completed { rows } => write!(f, "done ({} rows)", rows),
            StageOutcome::Skipped(decision) => write!(f, "skipped ({})", decision),
            StageOutcome::PermanentlyFailed(reason)
            | StageOutcome::TransientlyFailed(reason)
            | StageOutcome::IntegrityFailed(reason) => write!(f, "{}: {}", self.label(), reason),
        }
    }
}

/// Tally of one stage driven over many videos.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub stage: Stage,
    pub attempted: usize,
    pub completed: usize,
    pub skipped: usize,
    pub transient: usize,
    pub permanent: usize,
    pub integrity: usize,
    /// Rows written by completed invocations.
    pub rows: usize,
    /// Dispatch was closed before the eligible set was exhausted.
    pub stopped_early: bool,
}

impl BatchReport {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            attempted: 0,
            completed: 0,
            skipped: 0,
            transient: 0,
            permanent: 0,
            integrity: 0,
            rows: 0,
            stopped_early: false,
        }
    }

    pub fn record(&mut self, outcome: &StageOutcome) {
        self.attempted += 1;
        match outcome {
            StageOutcome::Completed { rows } => {
                self.completed += 1;
                self.rows += rows;
            }
            StageOutcome::Skipped(_) => self.skipped += 1,
            StageOutcome::PermanentlyFailed(_) => self.permanent += 1,
            StageOutcome::TransientlyFailed(_) => self.transient += 1,
            StageOutcome::IntegrityFailed(_) => self.integrity += 1,
        }
    }

    pub fn merge(&mut self, other: BatchReport) {
        self.attempted += other.attempted;
        self.completed += other.completed;
        self.skipped += other.skipped;
        self.transient += other.transient;
        self.permanent += other.permanent;
        self.integrity += other.integrity;
        self.rows += other.rows;
        self.stopped_early |= other.stopped_early;
    }

    pub fn failures(&self) -> usize {
        self.transient + self.permanent + self.integrity
    }
}

/// Result of listing one channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveryReport {
    pub channel_id: String,
    pub listed: usize,
    pub new_videos: usize,
    pub known_videos: usize,
    pub failed: usize,
}

/// Everything one `run` did.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub discovery: Vec<DiscoveryReport>,
    /// Channels whose listing failed, with the reason.
    pub discovery_failures: Vec<(String, String)>,
    pub batches: Vec<BatchReport>,
    pub stop_reason: Option<StopReason>,
    pub usage: Vec<UsageSnapshot>,
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            discovery: Vec::new(),
            discovery_failures: Vec::new(),
            batches: Vec::new(),
            stop_reason: None,
            usage: Vec::new(),
        }
    }

    pub fn batch(&self, stage: Stage) -> Option<&BatchReport> {
        self.batches.iter().find(|b| b.stage == stage)
    }

    pub fn new_videos(&self) -> usize {
        self.discovery.iter().map(|d| d.new_videos).sum()
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_report_tally() {
        let mut report = BatchReport::new(Stage::Stage1);
        report.record(&StageOutcome::Completed { rows: 3 });
        report.record(&StageOutcome::Completed { rows: 2 });
        report.record(&StageOutcome::TransientlyFailed("timeout".to_string()));
        report.record(&StageOutcome::PermanentlyFailed("gone".to_string()));
        report.record(&StageOutcome::Skipped(GateDecision::AlreadyDone));

        assert_eq!(report.attempted, 5);
        assert_eq!(report.completed, 2);
        assert_eq!(report.rows, 5);
        assert_eq!(report.failures(), 2);
        assert_eq!(report.skipped, 1);
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(StageOutcome::TransientlyFailed(String::new()).label(), "will retry");
        assert_eq!(StageOutcome::PermanentlyFailed(String::new()).label(), "will never retry");
        assert!(!StageOutcome::Completed { rows: 0 }.is_failure());
        assert_eq!(
            StageOutcome::Completed { rows: 4 }.to_string(),
            "done (4 rows)"
        );
    }
}
