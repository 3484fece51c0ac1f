//! # tether-storage
//!
//! Durable queue store for the Tether sync engine. One SQLite database holds
//! the ordered mutation queue and the temporary → real id mappings.

pub mod engine;
pub mod migrations;
pub mod pool;
pub mod queries;

pub use engine::QueueStore;

use tether_core::errors::{StorageError, TetherError};

/// Wrap a low-level failure message as a storage error.
pub fn to_storage_err(message: String) -> TetherError {
    TetherError::StorageError(StorageError::SqliteError { message })
}
