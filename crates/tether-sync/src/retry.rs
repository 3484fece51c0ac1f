//! Exponential backoff and the timer that wakes the processor.

use std::sync::Arc;
use std::time::Duration;

use tether_core::config::SyncConfig;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base: Duration,
    max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(base: Duration, max_attempts: u32) -> Self {
        Self { base, max_attempts }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.base_backoff(), config.max_attempts)
    }

    /// Wait before the attempt following failed attempt number `attempt`
    /// (1-based): `base * 2^(attempt - 1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base.saturating_mul(1u32 << exponent)
    }

    /// Whether `attempt` failed attempts use up the budget.
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// A single pending wake-up. Arming replaces (and aborts) the previous one.
#[derive(Debug, Default)]
pub struct RetryTimer {
    handle: Option<JoinHandle<()>>,
    delay: Option<Duration>,
}

impl RetryTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notify `wake` after `delay`. Must be called inside a tokio runtime.
    pub fn arm(&mut self, delay: Duration, wake: Arc<Notify>) {
        self.cancel();
        self.delay = Some(delay);
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            wake.notify_one();
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.delay = None;
    }

    pub fn is_armed(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// The delay the timer was last armed with.
    pub fn armed_delay(&self) -> Option<Duration> {
        self.delay
    }
}

impl Drop for RetryTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
