//! Periodic liveness log for long runs.
//!
//! If the process dies without a trace, the last heartbeat in the log shows
//! how far the run got and how much work was in flight.

use super::drain::DrainCoordinator;
use crate::status::Stage;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Stage invocations settled in the current run, per stage.
#[derive(Debug, Default)]
pub struct Progress {
    settled: [AtomicUsize; 5],
}

impl Progress {
    fn slot(stage: Stage) -> usize {
        match stage {
            Stage::Transcript => 0,
            Stage::Comments => 1,
            Stage::Stage1 => 2,
            Stage::Stage2 => 3,
            Stage::Embedding => 4,
        }
    }

    pub fn record(&self, stage: Stage) {
        self.settled[Self::slot(stage)].fetch_add(1, Ordering::Relaxed);
    }

    pub fn settled(&self, stage: Stage) -> usize {
        self.settled[Self::slot(stage)].load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        for counter in &self.settled {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// `stage=count` for every stage that has settled anything.
    fn summary(&self) -> String {
        let parts: Vec<String> = Stage::ALL
            .iter()
            .filter_map(|stage| {
                let n = self.settled(*stage);
                (n > 0).then(|| format!("{}={}", stage, n))
            })
            .collect();
        if parts.is_empty() {
            "nothing settled yet".to_string()
        } else {
            parts.join(" ")
        }
    }
}

/// Background task logging a heartbeat until dropped.
pub struct Heartbeat {
    beats: Arc<AtomicU64>,
    handle: JoinHandle<()>,
}

impl Heartbeat {
    pub fn start(every: Duration, drain: DrainCoordinator, progress: Arc<Progress>) -> Self {
        let beats = Arc::new(AtomicU64::new(0));
        let counter = beats.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let beat = counter.fetch_add(1, Ordering::Relaxed) + 1;
                info!(
                    beat,
                    in_flight = drain.in_flight(),
                    stopping = drain.is_stopping(),
                    "Heartbeat: {}",
                    progress.summary()
                );
            }
        });
        debug!("Heartbeat every {:?}", every);
        Self { beats, handle }
    }

    pub fn beats(&self) -> u64 {
        self.beats.load(Ordering::Relaxed)
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.handle.abort();
        debug!("Heartbeat stopped after {} beats", self.beats());
    }
}
