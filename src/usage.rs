//! API usage tracking per model tier.
//!
//! Trackers are plain values owned by the pipeline and handed to the AI
//! collaborators. Nothing here is global; a run resets its trackers before
//! starting.

use crate::config::{ModelLimits, Settings, UsageSettings};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{info, warn};

const WINDOW: Duration = Duration::from_secs(60);

/// Something noteworthy produced by a [`UsageTracker::record`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageAlert {
    /// Requests per minute crossed this percentage of the limit.
    Requests(u8),
    /// Tokens per minute crossed this percentage of the limit.
    Tokens(u8),
    /// Periodic summary is due.
    Summary,
}

/// Point-in-time usage figures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageSnapshot {
    pub tier: String,
    pub model: String,
    pub requests: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    /// Requests in the last minute.
    pub rpm: u64,
    /// Tokens in the last minute.
    pub tpm: u64,
}

#[derive(Debug, Default)]
struct UsageState {
    requests: u64,
    input_tokens: u64,
    output_tokens: u64,
    cost_usd: f64,
    window: VecDeque<(Instant, u64)>,
    warned_requests: Option<u8>,
    warned_tokens: Option<u8>,
    logged_at_requests: u64,
    logged_at_tokens: u64,
}

impl UsageState {
    fn prune(&mut self, now: Instant) {
        while let Some((at, _)) = self.window.front() {
            if now.duration_since(*at) >= WINDOW {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }

    fn rpm(&self) -> u64 {
        self.window.len() as u64
    }

    fn tpm(&self) -> u64 {
        self.window.iter().map(|(_, tokens)| tokens).sum()
    }
}

/// Counts requests, tokens and cost for one model tier.
pub struct UsageTracker {
    tier: String,
    model: String,
    limits: ModelLimits,
    thresholds: Vec<u8>,
    log_every_requests: u64,
    log_every_tokens: u64,
    state: Mutex<UsageState>,
}

/// Highest threshold that `value` reaches as a percentage of `limit`.
fn crossed(thresholds: &[u8], value: u64, limit: u64) -> Option<u8> {
    if limit == 0 {
        return None;
    }
    let pct = value.saturating_mul(100) / limit;
    thresholds.iter().copied().filter(|t| pct >= *t as u64).max()
}

impl UsageTracker {
    pub fn new(tier: &str, model: &str, settings: &UsageSettings) -> Self {
        let mut thresholds = settings.warning_thresholds.clone();
        thresholds.sort_unstable();
        Self {
            tier: tier.to_string(),
            model: model.to_string(),
            limits: settings.limits_for(model),
            thresholds,
            log_every_requests: settings.log_every_requests,
            log_every_tokens: settings.log_every_tokens,
            state: Mutex::new(UsageState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, UsageState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record one request.
    pub fn record(&self, input_tokens: u64, output_tokens: u64) -> Vec<UsageAlert> {
        self.record_at(Instant::now(), input_tokens, output_tokens)
    }

    pub(crate) fn record_at(
        &self,
        now: Instant,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Vec<UsageAlert> {
        let mut alerts = Vec::new();
        let mut state = self.state();

        state.requests += 1;
        state.input_tokens += input_tokens;
        state.output_tokens += output_tokens;
        state.cost_usd += (input_tokens as f64 * self.limits.input_price
            + output_tokens as f64 * self.limits.output_price)
            / 1_000_000.0;
        state.window.push_back((now, input_tokens + output_tokens));
        state.prune(now);

        let rpm_level = crossed(&self.thresholds, state.rpm(), self.limits.rpm);
        if rpm_level > state.warned_requests {
            if let Some(level) = rpm_level {
                warn!(
                    tier = %self.tier,
                    model = %self.model,
                    "Request rate at {}% of limit ({}/{} rpm)",
                    level,
                    state.rpm(),
                    self.limits.rpm
                );
                alerts.push(UsageAlert::Requests(level));
            }
        }
        state.warned_requests = rpm_level;

        let tpm_level = crossed(&self.thresholds, state.tpm(), self.limits.tpm);
        if tpm_level > state.warned_tokens {
            if let Some(level) = tpm_level {
                warn!(
                    tier = %self.tier,
                    model = %self.model,
                    "Token rate at {}% of limit ({}/{} tpm)",
                    level,
                    state.tpm(),
                    self.limits.tpm
                );
                alerts.push(UsageAlert::Tokens(level));
            }
        }
        state.warned_tokens = tpm_level;

        let total_tokens = state.input_tokens + state.output_tokens;
        let requests_due = self.log_every_requests > 0
            && state.requests - state.logged_at_requests >= self.log_every_requests;
        let tokens_due = self.log_every_tokens > 0
            && total_tokens - state.logged_at_tokens >= self.log_every_tokens;
        if requests_due || tokens_due {
            state.logged_at_requests = state.requests;
            state.logged_at_tokens = total_tokens;
            info!(
                tier = %self.tier,
                model = %self.model,
                requests = state.requests,
                input_tokens = state.input_tokens,
                output_tokens = state.output_tokens,
                "Usage so far: ${:.4}",
                state.cost_usd
            );
            alerts.push(UsageAlert::Summary);
        }

        alerts
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        let mut state = self.state();
        state.prune(Instant::now());
        UsageSnapshot {
            tier: self.tier.clone(),
            model: self.model.clone(),
            requests: state.requests,
            input_tokens: state.input_tokens,
            output_tokens: state.output_tokens,
            cost_usd: state.cost_usd,
            rpm: state.rpm(),
            tpm: state.tpm(),
        }
    }

    /// Forget everything recorded so far.
    pub fn reset(&self) {
        *self.state() = UsageState::default();
    }
}

/// One tracker per AI tier.
#[derive(Clone)]
pub struct UsageTrackers {
    pub stage1: Arc<UsageTracker>,
    pub stage2: Arc<UsageTracker>,
    pub embedding: Arc<UsageTracker>,
}

impl UsageTrackers {
    pub fn from_settings(settings: &Settings) -> Self {
        let usage = &settings.usage;
        let models = &settings.models;
        Self {
            stage1: Arc::new(UsageTracker::new("stage1", &models.stage1_model, usage)),
            stage2: Arc::new(UsageTracker::new("stage2", &models.stage2_model, usage)),
            embedding: Arc::new(UsageTracker::new("embedding", &models.embedding_model, usage)),
        }
    }

    pub fn reset(&self) {
        self.stage1.reset();
        self.stage2.reset();
        self.embedding.reset();
    }

    pub fn snapshots(&self) -> Vec<UsageSnapshot> {
        vec![
            self.stage1.snapshot(),
            self.stage2.snapshot(),
            self.embedding.snapshot(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(rpm: u64, tpm: u64) -> UsageSettings {
        let mut settings = UsageSettings::default();
        settings.models.insert(
            "test-model".to_string(),
            ModelLimits {
                rpm,
                tpm,
                input_price: 1.0,
                output_price: 2.0,
            },
        );
        settings.log_every_requests = 0;
        settings.log_every_tokens = 0;
        settings
    }

    #[test]
    fn test_counts_and_cost() {
        let tracker = UsageTracker::new("stage1", "test-model", &settings(1000, 10_000_000));
        tracker.record(500_000, 250_000);
        tracker.record(500_000, 0);

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.requests, 2);
        assert_eq!(snapshot.input_tokens, 1_000_000);
        assert_eq!(snapshot.output_tokens, 250_000);
        assert!((snapshot.cost_usd - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_threshold_warnings_fire_once_per_level() {
        let tracker = UsageTracker::new("stage2", "test-model", &settings(4, 1_000_000));
        let start = Instant::now();

        assert!(tracker.record_at(start, 1, 1).is_empty());
        assert_eq!(tracker.record_at(start, 1, 1), vec![UsageAlert::Requests(50)]);
        assert_eq!(tracker.record_at(start, 1, 1), vec![UsageAlert::Requests(75)]);
        assert_eq!(tracker.record_at(start, 1, 1), vec![UsageAlert::Requests(90)]);
        assert!(tracker.record_at(start, 1, 1).is_empty());
    }

    #[test]
    fn test_window_slides() {
        let tracker = UsageTracker::new("stage1", "test-model", &settings(2, 1_000_000));
        let start = Instant::now();

        assert_eq!(tracker.record_at(start, 0, 0), vec![UsageAlert::Requests(50)]);
        assert_eq!(tracker.record_at(start, 0, 0), vec![UsageAlert::Requests(90)]);

        // A minute later both requests have left the window, so the levels re-arm.
        let later = start + Duration::from_secs(61);
        assert!(tracker.record_at(later, 0, 0).is_empty());
        assert_eq!(tracker.record_at(later, 0, 0), vec![UsageAlert::Requests(90)]);
    }

    #[test]
    fn test_token_warnings() {
        let tracker = UsageTracker::new("embedding", "test-model", &settings(1_000_000, 100));
        let alerts = tracker.record_at(Instant::now(), 80, 0);
        assert_eq!(alerts, vec![UsageAlert::Tokens(75)]);
    }

    #[test]
    fn test_periodic_summary() {
        let mut s = settings(1_000_000, 1_000_000_000);
        s.log_every_requests = 2;
        let tracker = UsageTracker::new("stage1", "test-model", &s);

        assert!(tracker.record(1, 1).is_empty());
        assert_eq!(tracker.record(1, 1), vec![UsageAlert::Summary]);
        assert!(tracker.record(1, 1).is_empty());
    }

    #[test]
    fn test_reset() {
        let tracker = UsageTracker::new("stage1", "test-model", &settings(1000, 1000));
        tracker.record(10, 10);
        tracker.reset();
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.requests, 0);
        assert_eq!(snapshot.rpm, 0);
        assert_eq!(snapshot.cost_usd, 0.0);
    }

    #[test]
    fn test_trackers_are_independent() {
        let trackers = UsageTrackers::from_settings(&Settings::default());
        trackers.stage1.record(1, 1);
        assert_eq!(trackers.stage1.snapshot().requests, 1);
        assert_eq!(trackers.stage2.snapshot().requests, 0);
        trackers.reset();
        assert!(trackers.snapshots().iter().all(|s| s.requests == 0));
    }
}
