/// Errors surfaced by the sync engine's public operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("mutation {id} is in flight and cannot be changed until its request resolves")]
    MutationInFlight { id: String },

    #[error("payload for {kind} must be a JSON object")]
    PayloadNotObject { kind: String },

    #[error("sync engine has shut down")]
    Shutdown,

    #[error("engine state lock poisoned")]
    StatePoisoned,
}
