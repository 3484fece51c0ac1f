//! QueueStore: owns the write connection, implements IQueueStore +
//! IIdMappingStore, runs migrations and in-flight recovery at startup.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use tether_core::config::StorageConfig;
use tether_core::errors::{TetherError, TetherResult};
use tether_core::mutation::{Mutation, MutationPatch};
use tether_core::traits::{IIdMappingStore, IQueueStore, IdMapping};

use crate::migrations;
use crate::pool::WriteConnection;
use crate::queries::{mapping_ops, mutation_ops};

/// The durable queue. The in-memory views held by the sync engine are
/// caches of what this store contains.
pub struct QueueStore {
    writer: WriteConnection,
    db_path: Option<PathBuf>,
}

impl QueueStore {
    /// Open the store at the configured path.
    pub fn open(config: &StorageConfig) -> TetherResult<Self> {
        let path = PathBuf::from(&config.db_path);
        let writer = WriteConnection::open(&path, config)?;
        let store = Self {
            writer,
            db_path: Some(path),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Open a store backed by a specific file with default pragmas.
    pub fn open_path(path: &Path) -> TetherResult<Self> {
        Self::open(&StorageConfig {
            db_path: path.to_string_lossy().into_owned(),
            ..Default::default()
        })
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> TetherResult<Self> {
        let store = Self {
            writer: WriteConnection::open_in_memory()?,
            db_path: None,
        };
        store.initialize()?;
        Ok(store)
    }

    /// Run migrations, then demote rows a crashed process left `syncing`.
    fn initialize(&self) -> TetherResult<()> {
        let version = self.writer.with_conn_sync(migrations::run_migrations)?;
        let recovered = self.recover_in_flight()?;
        info!(
            schema_version = version,
            recovered,
            path = ?self.db_path,
            "queue store ready"
        );
        Ok(())
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Expose the connection for maintenance and tests.
    pub fn writer(&self) -> &WriteConnection {
        &self.writer
    }
}

impl IQueueStore for QueueStore {
    #[instrument(skip(self, mutation), fields(mutation_id = %mutation.id, kind = %mutation.kind))]
    fn enqueue(&self, mutation: &Mutation) -> TetherResult<i64> {
        let seq = self
            .writer
            .with_conn_sync(|conn| mutation_ops::insert_mutation(conn, mutation))?;
        debug!(seq, "mutation persisted");
        Ok(seq)
    }

    fn list(&self) -> TetherResult<Vec<Mutation>> {
        self.writer.with_conn_sync(mutation_ops::list_mutations)
    }

    fn get(&self, id: &str) -> TetherResult<Option<Mutation>> {
        self.writer
            .with_conn_sync(|conn| mutation_ops::get_mutation(conn, id))
    }

    #[instrument(skip(self, patch))]
    fn update(&self, id: &str, patch: &MutationPatch) -> TetherResult<Mutation> {
        self.writer
            .with_conn_sync(|conn| mutation_ops::patch_mutation(conn, id, patch))?
            .ok_or_else(|| TetherError::MutationNotFound { id: id.to_string() })
    }

    #[instrument(skip(self))]
    fn remove(&self, id: &str) -> TetherResult<bool> {
        self.writer
            .with_conn_sync(|conn| mutation_ops::delete_mutation(conn, id))
    }

    #[instrument(skip(self))]
    fn rewrite_resource_ids(&self, temp_id: &str, real_id: &str) -> TetherResult<usize> {
        let changed = self.writer.with_conn_sync(|conn| {
            mutation_ops::rewrite_resource_ids(conn, temp_id, real_id)
        })?;
        debug!(changed, "rewrote temporary id references");
        Ok(changed)
    }

    fn clear_dependency(&self, dependency_id: &str) -> TetherResult<usize> {
        self.writer
            .with_conn_sync(|conn| mutation_ops::clear_dependency(conn, dependency_id))
    }

    fn recover_in_flight(&self) -> TetherResult<usize> {
        self.writer.with_conn_sync(mutation_ops::reset_in_flight)
    }

    fn pending_count(&self) -> TetherResult<usize> {
        self.writer.with_conn_sync(mutation_ops::count_unsynced)
    }
}

impl IIdMappingStore for QueueStore {
    #[instrument(skip(self, mapping), fields(temp_id = %mapping.temp_id, real_id = %mapping.real_id))]
    fn record_mapping(&self, mapping: &IdMapping) -> TetherResult<()> {
        self.writer
            .with_conn_sync(|conn| mapping_ops::insert_mapping(conn, mapping))
    }

    fn load_mappings(&self) -> TetherResult<Vec<IdMapping>> {
        self.writer.with_conn_sync(mapping_ops::list_mappings)
    }
}
