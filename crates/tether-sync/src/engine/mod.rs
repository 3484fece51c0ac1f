//! SyncEngine: the facade the UI talks to. Owns the durable store, the
//! transport, the optimistic cache, the id map and the status channels.

mod actions;
mod drive;

use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::{broadcast, watch, Notify};
use tracing::info;

use tether_core::errors::{SyncError, TetherResult};
use tether_core::models::{SyncEvent, SyncStatusSnapshot};
use tether_core::mutation::{chain_key, Mutation, MutationKind, MutationPatch, ResourceType};
use tether_core::traits::{IIdMappingStore, IQueueStore, MutationTransport};
use tether_core::TetherConfig;
use tether_storage::QueueStore;

use crate::cache::{OptimisticPatcher, ReadModelCache};
use crate::clock::Clock;
use crate::network::{NetworkMonitor, NetworkState};
use crate::reconcile::IdReconciler;
use crate::retry::{RetryPolicy, RetryTimer};
use crate::status::{RecentlySynced, StatusPublisher};

pub use actions::EnqueueOutcome;
pub use drive::SyncHandle;

/// In-memory views of the durable queue. Guarded by one lock and never held
/// across an await.
pub(crate) struct EngineState {
    /// Mirror of the store, in creation order.
    pub(crate) queue: Vec<Mutation>,
    pub(crate) patcher: OptimisticPatcher,
    pub(crate) reconciler: IdReconciler,
    pub(crate) recent: Vec<RecentlySynced>,
}

impl EngineState {
    pub(crate) fn find(&self, id: &str) -> Option<&Mutation> {
        self.queue.iter().find(|m| m.id == id)
    }

    pub(crate) fn replace(&mut self, mutation: Mutation) {
        if let Some(slot) = self.queue.iter_mut().find(|m| m.id == mutation.id) {
            *slot = mutation;
        }
    }

    pub(crate) fn forget(&mut self, id: &str) {
        self.queue.retain(|m| m.id != id);
    }

    /// The queued create that introduces `temp_id`, if any.
    pub(crate) fn creator_of(&self, temp_id: &str) -> Option<&Mutation> {
        self.queue
            .iter()
            .find(|m| m.kind == MutationKind::Create && m.resource_id.as_str() == temp_id)
    }
}

pub struct SyncEngine<S, T> {
    pub(crate) store: S,
    pub(crate) transport: T,
    pub(crate) config: TetherConfig,
    pub(crate) clock: Clock,
    pub(crate) retry: RetryPolicy,
    pub(crate) network: NetworkMonitor,
    pub(crate) status: StatusPublisher,
    pub(crate) state: Mutex<EngineState>,
    pub(crate) drain_lock: tokio::sync::Mutex<()>,
    pub(crate) timer: Mutex<RetryTimer>,
    pub(crate) wake: Arc<Notify>,
}

impl<T: MutationTransport> SyncEngine<QueueStore, T> {
    /// Open the SQLite store named by `config.storage` and rehydrate from it.
    pub fn open(config: TetherConfig, transport: T) -> TetherResult<Self> {
        let store = QueueStore::open(&config.storage)?;
        Self::new(store, transport, config)
    }
}

impl<S, T> SyncEngine<S, T>
where
    S: IQueueStore + IIdMappingStore + 'static,
    T: MutationTransport,
{
    /// Rehydrate from `store`: in-flight rows go back to pending, the id map
    /// is reloaded and live optimistic patches are re-applied.
    pub fn new(store: S, transport: T, config: TetherConfig) -> TetherResult<Self> {
        config.validate()?;
        let clock = Clock::new();

        let recovered = store.recover_in_flight()?;
        let reconciler = IdReconciler::from_mappings(store.load_mappings()?);
        let mut queue = store.list()?;

        // A create whose mapping was recorded already reached the server;
        // the process stopped before it could be removed.
        let settled: Vec<(String, String)> = queue
            .iter()
            .filter(|m| m.kind == MutationKind::Create && reconciler.is_resolved(m.resource_id.as_str()))
            .map(|m| (m.id.clone(), m.resource_id.as_str().to_string()))
            .collect();
        for (id, temp) in &settled {
            store.rewrite_resource_ids(temp, &reconciler.resolve(temp))?;
            store.clear_dependency(id)?;
            store.remove(id)?;
        }
        if !settled.is_empty() {
            queue = store.list()?;
        }

        let mut patcher = OptimisticPatcher::new(config.transport.id_field.clone());
        for mutation in queue.iter().filter(|m| m.has_live_patch()) {
            patcher.apply(mutation);
        }

        info!(
            queued = queue.len(),
            recovered,
            mappings = reconciler.len(),
            "sync engine rehydrated"
        );

        let engine = Self {
            retry: RetryPolicy::from_config(&config.sync),
            store,
            transport,
            config,
            clock,
            network: NetworkMonitor::new(NetworkState::Online),
            status: StatusPublisher::new(),
            state: Mutex::new(EngineState {
                queue,
                patcher,
                reconciler,
                recent: Vec::new(),
            }),
            drain_lock: tokio::sync::Mutex::new(()),
            timer: Mutex::new(RetryTimer::new()),
            wake: Arc::new(Notify::new()),
        };
        engine.publish()?;
        Ok(engine)
    }

    pub fn config(&self) -> &TetherConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn network(&self) -> &NetworkMonitor {
        &self.network
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Report connectivity back; wakes the processor.
    pub fn set_online(&self) -> TetherResult<()> {
        if self.network.set_online() {
            self.wake.notify_one();
        }
        self.publish()
    }

    pub fn set_offline(&self) -> TetherResult<()> {
        self.network.set_offline();
        self.publish()
    }

    pub fn status(&self) -> SyncStatusSnapshot {
        self.status.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatusSnapshot> {
        self.status.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<SyncEvent> {
        self.status.events()
    }

    /// Load server truth for an entity into the read model. Optimistic
    /// layers for that entity stay on top.
    pub fn seed_entity(&self, resource_type: ResourceType, id: &str, entity: Value) -> TetherResult<()> {
        let mut state = self.lock_state()?;
        let id = state.reconciler.resolve(id);
        state.patcher.seed(resource_type, &id, entity);
        Ok(())
    }

    /// The entity as the UI should render it. Temporary ids keep resolving
    /// after reconciliation.
    pub fn entity(&self, resource_type: ResourceType, id: &str) -> TetherResult<Option<Value>> {
        let state = self.lock_state()?;
        let id = state.reconciler.resolve(id);
        Ok(state.patcher.cache().get(resource_type, &id).cloned())
    }

    pub fn cache_snapshot(&self) -> TetherResult<ReadModelCache> {
        Ok(self.lock_state()?.patcher.cache().clone())
    }

    /// The queue in creation order. For diagnostics; the UI reads status.
    pub fn queued(&self) -> TetherResult<Vec<Mutation>> {
        Ok(self.lock_state()?.queue.clone())
    }

    /// The real id a temporary id was reconciled to, if any.
    pub fn resolve_id(&self, id: &str) -> TetherResult<String> {
        Ok(self.lock_state()?.reconciler.resolve(id))
    }

    pub(crate) fn lock_state(&self) -> TetherResult<MutexGuard<'_, EngineState>> {
        self.state
            .lock()
            .map_err(|_| SyncError::StatePoisoned.into())
    }

    /// Write a patch through to the store and the mirror.
    pub(crate) fn persist(
        &self,
        state: &mut EngineState,
        id: &str,
        patch: &MutationPatch,
    ) -> TetherResult<Mutation> {
        let updated = self.store.update(id, patch)?;
        state.replace(updated.clone());
        Ok(updated)
    }

    /// Remove a mutation from the store and the mirror.
    pub(crate) fn unqueue(&self, state: &mut EngineState, id: &str) -> TetherResult<()> {
        self.store.remove(id)?;
        state.forget(id);
        Ok(())
    }

    pub(crate) fn publish(&self) -> TetherResult<()> {
        let mut state = self.lock_state()?;
        self.publish_locked(&mut state);
        Ok(())
    }

    pub(crate) fn publish_locked(&self, state: &mut EngineState) {
        let now = self.clock.now();
        let window = chrono::Duration::from_std(self.config.sync.synced_retention())
            .unwrap_or_else(|_| chrono::Duration::zero());
        state.recent.retain(|entry| now - entry.synced_at < window);
        self.status
            .publish(&state.queue, self.network.is_online(), &state.recent);
    }

    pub(crate) fn remember_synced(&self, state: &mut EngineState, resource_type: ResourceType, id: &str) {
        let key = chain_key(resource_type, id);
        state.recent.retain(|entry| entry.key != key);
        state.recent.push(RecentlySynced {
            key,
            synced_at: self.clock.now(),
        });
    }

    /// Time until the oldest `synced` badge expires.
    pub(crate) fn next_badge_expiry(&self) -> Option<std::time::Duration> {
        let state = self.lock_state().ok()?;
        let oldest = state.recent.iter().map(|entry| entry.synced_at).min()?;
        let window = chrono::Duration::from_std(self.config.sync.synced_retention()).ok()?;
        Some(self.clock.until(oldest + window))
    }

    pub(crate) fn wake_if_online(&self) {
        if self.network.is_online() {
            self.wake.notify_one();
        }
    }
}
