//! Stage gatekeeper.
//!
//! Pure decision logic over a [`ProcessingStatus`]: no I/O, no clock.

use super::{ProcessingStatus, Stage, StageStatus};

/// What a stage needs before it can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prerequisite {
    /// No prerequisites.
    None,
    /// At least one of the listed stages must be complete.
    AnyOf(&'static [Stage]),
    /// Every listed stage must be complete.
    AllOf(&'static [Stage]),
}

impl Prerequisite {
    /// The fixed prerequisite table.
    pub fn of(stage: Stage) -> Self {
        match stage {
            Stage::Transcript => Prerequisite::None,
            Stage::Comments => Prerequisite::None,
            Stage::Stage1 => Prerequisite::AnyOf(&[Stage::Transcript, Stage::Comments]),
            Stage::Stage2 => Prerequisite::AllOf(&[Stage::Stage1]),
            Stage::Embedding => Prerequisite::AllOf(&[Stage::Stage2]),
        }
    }

    pub fn stages(&self) -> &'static [Stage] {
        match self {
            Prerequisite::None => &[],
            Prerequisite::AnyOf(stages) | Prerequisite::AllOf(stages) => stages,
        }
    }

    pub fn is_satisfied(&self, status: &ProcessingStatus) -> bool {
        let complete = |s: &Stage| status.get(*s) == StageStatus::Complete;
        match self {
            Prerequisite::None => true,
            Prerequisite::AnyOf(stages) => stages.iter().any(complete),
            Prerequisite::AllOf(stages) => stages.iter().all(complete),
        }
    }

    /// Whether the prerequisite can never be met because the stages it
    /// depends on failed permanently.
    pub fn is_unreachable(&self, status: &ProcessingStatus) -> bool {
        let dead = |s: &Stage| status.get(*s) == StageStatus::FailedPermanent;
        match self {
            Prerequisite::None => false,
            Prerequisite::AnyOf(stages) => stages.iter().all(dead),
            Prerequisite::AllOf(stages) => stages.iter().any(dead),
        }
    }
}

impl std::fmt::Display for Prerequisite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = |stages: &[Stage], sep: &str| {
            stages
                .iter()
                .map(|s| format!("{}=complete", s))
                .collect::<Vec<_>>()
                .join(sep)
        };
        match self {
            Prerequisite::None => f.write_str("nothing"),
            Prerequisite::AnyOf(stages) => f.write_str(&names(stages, " or ")),
            Prerequisite::AllOf(stages) => f.write_str(&names(stages, " and ")),
        }
    }
}

/// Gatekeeper verdict for one stage of one video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Prerequisites met and the stage is not yet done.
    Runnable,
    /// The stage is already complete.
    AlreadyDone,
    /// The stage can never run, or is owned by someone else right now.
    Blocked(String),
    /// Prerequisites are not complete yet.
    PrerequisiteMissing(Prerequisite),
}

impl GateDecision {
    pub fn is_runnable(&self) -> bool {
        matches!(self, GateDecision::Runnable)
    }
}

impl std::fmt::Display for GateDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateDecision::Runnable => f.write_str("runnable"),
            GateDecision::AlreadyDone => f.write_str("already done"),
            GateDecision::Blocked(reason) => write!(f, "blocked: {}", reason),
            GateDecision::PrerequisiteMissing(p) => write!(f, "waiting for {}", p),
        }
    }
}

/// Decide whether `stage` may run for the video described by `status`.
pub fn can_run(status: &ProcessingStatus, stage: Stage) -> GateDecision {
    let prerequisite = Prerequisite::of(stage);

    match status.get(stage) {
        StageStatus::Complete => GateDecision::AlreadyDone,
        StageStatus::FailedPermanent => GateDecision::Blocked(format!("{} failed permanently", stage)),
        StageStatus::InProgress => GateDecision::Blocked(format!("{} is in progress", stage)),
        StageStatus::Pending | StageStatus::FailedTransient => {
            if prerequisite.is_satisfied(status) {
                GateDecision::Runnable
            } else if prerequisite.is_unreachable(status) {
                GateDecision::Blocked(format!("{} can never be satisfied", prerequisite))
            } else {
                GateDecision::PrerequisiteMissing(prerequisite)
            }
        }
    }
}
