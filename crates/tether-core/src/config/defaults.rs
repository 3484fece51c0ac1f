//! Default values shared by the config sections.

pub use crate::constants::{
    DEFAULT_BASE_BACKOFF_MS, DEFAULT_MAX_ATTEMPTS, DEFAULT_REQUEST_TIMEOUT_MS,
    DEFAULT_SYNCED_RETENTION_SECS,
};

pub const DEFAULT_DB_PATH: &str = "tether.db";
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000/api";
pub const DEFAULT_ID_FIELD: &str = "id";
pub const DEFAULT_CSRF_HEADER: &str = "X-CSRF-Token";
pub const DEFAULT_LOG_LEVEL: &str = "info";
