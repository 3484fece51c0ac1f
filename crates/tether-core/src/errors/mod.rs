mod storage_error;
mod sync_error;
mod transport_error;

pub use storage_error::StorageError;
pub use sync_error::SyncError;
pub use transport_error::TransportError;

use crate::mutation::MutationStatus;

/// Top-level error type for every Tether crate.
#[derive(Debug, thiserror::Error)]
pub enum TetherError {
    #[error("mutation not found: {id}")]
    MutationNotFound { id: String },

    #[error("invalid transition for mutation {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: MutationStatus,
        to: MutationStatus,
    },

    #[error("storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("transport error: {0}")]
    TransportError(#[from] TransportError),

    #[error("sync error: {0}")]
    SyncError(#[from] SyncError),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Convenience alias used across the workspace.
pub type TetherResult<T> = Result<T, TetherError>;
