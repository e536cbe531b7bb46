//! Bounded reconnect for dropped feeds.
//!
//! The view models themselves never retry; re-establishing a dropped
//! live feed is owned by a supervisor sitting outside them, driving the
//! model's own retry entry point so the single-active-subscription
//! invariant keeps holding. Backoff is exponential with a cap and an
//! attempt budget.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How often the supervisor re-checks a healthy feed.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Granularity of interruptible sleeps.
const SLEEP_SLICE: Duration = Duration::from_millis(25);

/// Backoff schedule: `base * factor^attempt`, capped, bounded in count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base: Duration,
    pub factor: u32,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            base: Duration::from_secs(1),
            factor: 2,
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// Delay before the given zero-based attempt, or `None` once the
    /// attempt budget is spent.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let scale = self.factor.saturating_pow(attempt);
        Some(self.base.saturating_mul(scale).min(self.max_delay))
    }
}

/// Background reconnect loop for one feed.
///
/// `is_errored` samples the owning view model's state; `reattach` drives
/// its retry entry point. The loop resets its attempt counter whenever
/// the feed reports healthy, and exits once the policy's attempt budget
/// is exhausted or on shutdown.
pub struct ReconnectSupervisor {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ReconnectSupervisor {
    pub fn spawn(
        policy: RetryPolicy,
        is_errored: impl Fn() -> bool + Send + 'static,
        reattach: impl FnMut() + Send + 'static,
    ) -> ReconnectSupervisor {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = thread::spawn(move || run(policy, &flag, is_errored, reattach));
        ReconnectSupervisor {
            stop,
            handle: Some(handle),
        }
    }

    /// Stops the loop and waits for the thread to exit. Idempotent.
    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ReconnectSupervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(
    policy: RetryPolicy,
    stop: &AtomicBool,
    is_errored: impl Fn() -> bool,
    mut reattach: impl FnMut(),
) {
    let mut attempt = 0;
    loop {
        if stop.load(Ordering::SeqCst) {
            return;
        }
        if !is_errored() {
            attempt = 0;
            if !sleep_interruptible(POLL_INTERVAL, stop) {
                return;
            }
            continue;
        }

        let Some(delay) = policy.delay_for(attempt) else {
            tracing::warn!(attempts = attempt, "reconnect attempt budget exhausted");
            return;
        };
        attempt += 1;
        tracing::info!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "scheduling feed reconnect"
        );
        if !sleep_interruptible(delay, stop) {
            return;
        }
        if is_errored() {
            reattach();
        }
    }
}

/// Sleeps in slices so shutdown stays responsive. Returns false when
/// interrupted by the stop flag.
fn sleep_interruptible(total: Duration, stop: &AtomicBool) -> bool {
    let mut remaining = total;
    while remaining > Duration::ZERO {
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        let slice = remaining.min(SLEEP_SLICE);
        thread::sleep(slice);
        remaining = remaining.saturating_sub(slice);
    }
    !stop.load(Ordering::SeqCst)
}
