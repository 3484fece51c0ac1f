use serde::{Deserialize, Serialize};

use super::defaults;

/// Durable queue store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file holding the mutation queue and id mappings.
    pub db_path: String,
    /// Whether to run the database in WAL journal mode.
    pub wal_mode: bool,
    /// How long a writer waits on a lock held by another process.
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: defaults::DEFAULT_DB_PATH.to_string(),
            wal_mode: true,
            busy_timeout_ms: defaults::DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}
