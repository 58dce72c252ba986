//! Reload requests and their debounced application.
//!
//! # Data Flow
//! ```text
//! SIGHUP / file watcher / version retry
//!     → ReloadTrigger::request()     (flag + timestamp, nothing else)
//!
//! Server housekeeping tick (every second)
//!     → ReloadCoordinator::poll(&mut agent)
//!     → due? (pending, quiet for a full window since the last request)
//!     → Agent::reload()
//! ```
//!
//! # Design Decisions
//! - Requesting is async-signal-safe in spirit: two atomic stores, no locks,
//!   no allocation, no configuration work
//! - Trailing debounce: a burst of requests is applied once, a window after
//!   the last one, so at most one reload happens per window
//! - The coordinator is polled by the task that owns the agent, which makes
//!   it the only place configuration and routes are ever changed

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::lifecycle::startup::{Agent, ReloadError, ReloadReport};
use crate::observability::metrics;

/// Minimum quiet time between a request and the reload it causes.
pub const RELOAD_WINDOW: Duration = Duration::from_millis(1000);

#[derive(Debug)]
struct TriggerState {
    epoch: Instant,
    pending: AtomicBool,
    last_requested_ms: AtomicU64,
    last_applied_ms: AtomicU64,
}

/// Cheap, cloneable handle to request a reload from anywhere.
#[derive(Debug, Clone)]
pub struct ReloadTrigger {
    state: Arc<TriggerState>,
}

impl ReloadTrigger {
    pub fn new() -> Self {
        Self {
            state: Arc::new(TriggerState {
                epoch: Instant::now(),
                pending: AtomicBool::new(false),
                last_requested_ms: AtomicU64::new(0),
                last_applied_ms: AtomicU64::new(0),
            }),
        }
    }

    /// Milliseconds since the trigger was created.
    pub fn now_ms(&self) -> u64 {
        self.state.epoch.elapsed().as_millis() as u64
    }

    /// Ask for a reload.
    pub fn request(&self) {
        self.request_at(self.now_ms());
    }

    /// Ask for a reload, at an explicit time.
    pub fn request_at(&self, now_ms: u64) {
        self.state.last_requested_ms.fetch_max(now_ms, Ordering::SeqCst);
        self.state.pending.store(true, Ordering::SeqCst);
    }

    pub fn is_pending(&self) -> bool {
        self.state.pending.load(Ordering::SeqCst)
    }

    /// Consume the pending request if it is due.
    pub fn take_due(&self, window: Duration) -> bool {
        self.take_due_at(self.now_ms(), window)
    }

    /// Consume the pending request if `now_ms` is at least `window` past the
    /// last request.
    pub fn take_due_at(&self, now_ms: u64, window: Duration) -> bool {
        if !self.is_pending() {
            return false;
        }
        let requested = self.state.last_requested_ms.load(Ordering::SeqCst);
        if now_ms < requested.saturating_add(window.as_millis() as u64) {
            return false;
        }
        if self
            .state
            .pending
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        self.state.last_applied_ms.store(requested, Ordering::SeqCst);
        true
    }

    /// Time of the last request that was turned into a reload.
    pub fn last_applied_ms(&self) -> u64 {
        self.state.last_applied_ms.load(Ordering::SeqCst)
    }

    pub fn last_requested_ms(&self) -> u64 {
        self.state.last_requested_ms.load(Ordering::SeqCst)
    }
}

impl Default for ReloadTrigger {
    fn default() -> Self {
        Self::new()
    }
}

/// Applies due reload requests to the agent.
#[derive(Debug, Clone)]
pub struct ReloadCoordinator {
    trigger: ReloadTrigger,
    window: Duration,
}

impl ReloadCoordinator {
    pub fn new(trigger: ReloadTrigger) -> Self {
        Self {
            trigger,
            window: RELOAD_WINDOW,
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn trigger(&self) -> &ReloadTrigger {
        &self.trigger
    }

    /// Run a reload if one is due. `None` when nothing was due.
    pub async fn poll(&self, agent: &mut Agent) -> Option<Result<ReloadReport, ReloadError>> {
        if !self.trigger.take_due(self.window) {
            return None;
        }

        tracing::info!("Reloading configuration");
        let outcome = agent.reload().await;
        match &outcome {
            Ok(report) => {
                metrics::record_reload("success");
                tracing::info!(
                    loaded = ?report.loaded,
                    unloaded = ?report.unloaded,
                    excluded = report.excluded.len(),
                    "Configuration reloaded"
                );
            }
            Err(e) => {
                metrics::record_reload("failed");
                tracing::error!(error = %e, "Reload failed. Keeping previous configuration.");
            }
        }
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(1000);

    #[test]
    fn nothing_due_without_request() {
        let t = ReloadTrigger::new();
        assert!(!t.take_due_at(10_000, WINDOW));
    }

    #[test]
    fn request_is_due_after_the_window() {
        let t = ReloadTrigger::new();
        t.request_at(5_000);
        assert!(t.is_pending());
        assert!(!t.take_due_at(5_999, WINDOW));
        assert!(t.take_due_at(6_000, WINDOW));
        assert!(!t.is_pending());
        assert_eq!(t.last_applied_ms(), 5_000);
        assert!(!t.take_due_at(9_000, WINDOW));
    }

    #[test]
    fn burst_collapses_into_one_reload() {
        let t = ReloadTrigger::new();
        for at in [5_000, 5_200, 5_400, 5_600] {
            t.request_at(at);
            assert!(!t.take_due_at(at + 100, WINDOW));
        }
        assert!(!t.take_due_at(6_500, WINDOW));
        assert!(t.take_due_at(6_600, WINDOW));
        assert!(!t.take_due_at(6_700, WINDOW));
    }

    #[test]
    fn applied_never_passes_requested() {
        let t = ReloadTrigger::new();
        t.request_at(3_000);
        t.request_at(2_000);
        assert_eq!(t.last_requested_ms(), 3_000);
        assert!(t.take_due_at(4_000, WINDOW));
        assert!(t.last_applied_ms() <= t.last_requested_ms());
    }

    #[test]
    fn clones_share_state() {
        let t = ReloadTrigger::new();
        let other = t.clone();
        other.request_at(100);
        assert!(t.is_pending());
    }
}
