//! Cooperative stop for a running pipeline.
//!
//! A stop request closes dispatch: no new stage invocation starts, but
//! invocations already running finish and commit (or roll back) normally.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Why the pipeline is winding down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Operator asked to pause; the next run resumes where this one stopped.
    Pause,
    /// The process is terminating.
    Shutdown,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Pause => f.write_str("pause"),
            StopReason::Shutdown => f.write_str("shutdown"),
        }
    }
}

struct Inner {
    token: CancellationToken,
    reason: Mutex<Option<StopReason>>,
    in_flight: AtomicUsize,
    idle: Notify,
}

/// Shared handle; clones observe the same stop state.
#[derive(Clone)]
pub struct DrainCoordinator {
    inner: Arc<Inner>,
}

impl Default for DrainCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl DrainCoordinator {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                token: CancellationToken::new(),
                reason: Mutex::new(None),
                in_flight: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    /// Close dispatch. The first reason given wins.
    pub fn request_stop(&self, reason: StopReason) {
        if let Ok(mut current) = self.inner.reason.lock() {
            if current.is_none() {
                *current = Some(reason);
                info!(
                    %reason,
                    in_flight = self.in_flight(),
                    "Stop requested, letting running work finish"
                );
            }
        }
        self.inner.token.cancel();
    }

    pub fn is_stopping(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.inner.reason.lock().ok().and_then(|r| *r)
    }

    /// Resolves once a stop has been requested.
    pub async fn stopped(&self) {
        self.inner.token.cancelled().await
    }

    /// Register one stage invocation. Returns `None` once dispatch is closed.
    pub fn begin(&self) -> Option<InFlightGuard> {
        self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlightGuard {
            inner: self.inner.clone(),
        };
        if self.is_stopping() {
            // Dropping the guard undoes the increment.
            return None;
        }
        Some(guard)
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Wait until no invocation is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Translate process signals into stop requests.
    ///
    /// Ctrl+C and SIGTERM mean shutdown, SIGUSR1 means pause.
    pub fn listen_for_signals(&self) -> JoinHandle<()> {
        let drain = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C");
                    drain.request_stop(StopReason::Shutdown);
                }
                _ = wait_for_sigterm() => {
                    info!("Received SIGTERM");
                    drain.request_stop(StopReason::Shutdown);
                }
                _ = wait_for_sigusr1() => {
                    info!("Received SIGUSR1");
                    drain.request_stop(StopReason::Pause);
                }
                _ = drain.stopped() => {}
            }
        })
    }
}

/// Held for the duration of one stage invocation.
pub struct InFlightGuard {
    inner: Arc<Inner>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.inner.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sig) => {
            sig.recv().await;
        }
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            std::future::pending::<()>().await
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await
}

#[cfg(unix)]
async fn wait_for_sigusr1() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::user_defined1()) {
        Ok(mut sig) => {
            sig.recv().await;
        }
        Err(e) => {
            warn!("Failed to install SIGUSR1 handler: {}", e);
            std::future::pending::<()>().await
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigusr1() {
    std::future::pending::<()>().await
}
