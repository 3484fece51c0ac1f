use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::defaults;

/// Sync processor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Attempts before a transient failure becomes terminal. Default: 5.
    pub max_attempts: u32,
    /// Base of the doubling backoff, in milliseconds. Default: 1000.
    pub base_backoff_ms: u64,
    /// Seconds a synced entity keeps its `synced` badge. Default: 5.
    pub synced_retention_secs: u64,
    /// Fold updates and deletes into a still-pending create of the same
    /// temporary resource instead of queueing them behind it. Default: false.
    pub coalesce_pending_creates: bool,
}

impl SyncConfig {
    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    pub fn synced_retention(&self) -> Duration {
        Duration::from_secs(self.synced_retention_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::DEFAULT_MAX_ATTEMPTS,
            base_backoff_ms: defaults::DEFAULT_BASE_BACKOFF_MS,
            synced_retention_secs: defaults::DEFAULT_SYNCED_RETENTION_SECS,
            coalesce_pending_creates: false,
        }
    }
}
