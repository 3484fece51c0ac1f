//! Wall-clock time derived from the tokio clock.
//!
//! Persisted timestamps (`created_at`, `next_retry_at`) are UTC, but retry
//! timers run on `tokio::time`. Deriving one from the other keeps both in
//! step when a test pauses and advances time.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct Clock {
    origin_utc: DateTime<Utc>,
    origin: Instant,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// A clock whose current instant reads as `at`.
    pub fn starting_at(at: DateTime<Utc>) -> Self {
        Self {
            origin_utc: at,
            origin: Instant::now(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.origin.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.origin_utc + elapsed
    }

    /// Time left until `at`, zero if it has passed.
    pub fn until(&self, at: DateTime<Utc>) -> Duration {
        (at - self.now()).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn after(&self, delay: Duration) -> DateTime<Utc> {
        self.now() + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero())
    }
}
