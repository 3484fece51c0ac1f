/// Storage-layer errors for the durable queue.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("SQLite error: {message}")]
    SqliteError { message: String },

    #[error("migration failed at version {version}: {reason}")]
    MigrationFailed { version: u32, reason: String },

    #[error("corrupt queue record {id}: {reason}")]
    CorruptRecord { id: String, reason: String },
}
