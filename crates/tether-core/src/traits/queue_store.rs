use chrono::{DateTime, Utc};

use crate::errors::TetherResult;
use crate::mutation::{Mutation, MutationPatch, ResourceType};

/// Durable, ordered store of pending mutations.
///
/// Every method is transactional with respect to the backing store: when a
/// call returns `Ok`, its effect has been committed.
pub trait IQueueStore: Send + Sync {
    /// Persist a new mutation. Returns the sequence number assigned to it.
    fn enqueue(&self, mutation: &Mutation) -> TetherResult<i64>;

    /// All queued mutations in creation order.
    fn list(&self) -> TetherResult<Vec<Mutation>>;

    fn get(&self, id: &str) -> TetherResult<Option<Mutation>>;

    /// Apply a partial update and return the stored result.
    fn update(&self, id: &str, patch: &MutationPatch) -> TetherResult<Mutation>;

    /// Delete a mutation. Returns false if it was not queued.
    fn remove(&self, id: &str) -> TetherResult<bool>;

    /// Rewrite a temporary id to its real id in every queued resource id and
    /// payload. Returns the number of rows changed.
    fn rewrite_resource_ids(&self, temp_id: &str, real_id: &str) -> TetherResult<usize>;

    /// Clear `depends_on` on every mutation that waited for `dependency_id`.
    fn clear_dependency(&self, dependency_id: &str) -> TetherResult<usize>;

    /// Reset mutations left `syncing` by a previous process back to `pending`.
    fn recover_in_flight(&self) -> TetherResult<usize>;

    /// Number of queued mutations (none of them are `synced`).
    fn pending_count(&self) -> TetherResult<usize>;
}

/// A recorded temporary → real id mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdMapping {
    pub temp_id: String,
    pub real_id: String,
    pub resource_type: ResourceType,
    pub recorded_at: DateTime<Utc>,
}

/// Persistence for the identifier reconciliation map.
pub trait IIdMappingStore: Send + Sync {
    fn record_mapping(&self, mapping: &IdMapping) -> TetherResult<()>;

    fn load_mappings(&self) -> TetherResult<Vec<IdMapping>>;
}
