//! The sync processor: drains the queue one mutation at a time.
//!
//! Per mutation: `pending → syncing → {synced | conflict | failed}`. A
//! transient failure goes back to `pending` with `next_retry_at` set until
//! the attempt budget runs out.

mod classify;
mod selection;

use serde_json::Value;
use tracing::{debug, info, warn, Instrument};

use tether_core::errors::{SyncError, TetherError, TetherResult};
use tether_core::models::SyncEvent;
use tether_core::mutation::{
    collect_temp_ids, Mutation, MutationKind, MutationPatch, MutationStatus, ResourceType,
    SyncErrorDetail,
};
use tether_core::traits::{
    IIdMappingStore, IQueueStore, IdMapping, MutationRequest, MutationTransport, TransportOutcome,
};
use tether_observability::{drain_span, events, mutation_span};

use crate::engine::{EngineState, SyncEngine};

pub use classify::{classify, Disposition};
use selection::Next;

/// What one drain did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Requests issued.
    pub sent: usize,
    pub synced: usize,
    pub conflicts: usize,
    /// Mutations that ended `failed`, including dependents failed with them.
    pub failed: usize,
    pub retry_scheduled: usize,
    /// Pending mutations left waiting on their chain or a dependency.
    pub held: usize,
}

impl<S, T> SyncEngine<S, T>
where
    S: IQueueStore + IIdMappingStore + 'static,
    T: MutationTransport,
{
    /// Send everything that can be sent right now. Returns early when the
    /// network monitor reports offline.
    pub async fn drain(&self) -> TetherResult<DrainReport> {
        self.drain_with("manual").await
    }

    pub(crate) async fn drain_with(&self, trigger: &'static str) -> TetherResult<DrainReport> {
        let _running = self.drain_lock.lock().await;
        let span = drain_span!(trigger);
        self.drain_locked().instrument(span).await
    }

    async fn drain_locked(&self) -> TetherResult<DrainReport> {
        let mut report = DrainReport::default();
        while self.network.is_online() {
            let Some((mutation, request)) = self.begin_next(&mut report)? else {
                break;
            };
            report.sent += 1;
            let outcome = self.attempt(&mutation, &request).await;
            if let Err(e) = self.settle(&mutation, outcome, &mut report) {
                self.release(&mutation, &e);
                let _ = self.rearm_timer();
                return Err(e);
            }
        }
        self.rearm_timer()?;
        if report.sent > 0 {
            info!(
                sent = report.sent,
                synced = report.synced,
                conflicts = report.conflicts,
                failed = report.failed,
                retry_scheduled = report.retry_scheduled,
                held = report.held,
                "drain finished"
            );
        }
        Ok(report)
    }

    /// Pick the next sendable mutation, mark it `syncing` and build its
    /// request with ids resolved. Selection and marking share one lock so
    /// nothing can amend the mutation in between.
    fn begin_next(&self, report: &mut DrainReport) -> TetherResult<Option<(Mutation, MutationRequest)>> {
        let mut state = self.lock_state()?;
        loop {
            let scan = selection::scan(&state.queue, &state.reconciler, self.clock.now());
            match scan.next {
                Next::Send(index) => {
                    let id = state.queue[index].id.clone();
                    let patch = MutationPatch::status(MutationStatus::Syncing)
                        .with_last_attempt_at(self.clock.now());
                    let mutation = self.persist(&mut state, &id, &patch)?;
                    let request =
                        MutationRequest::for_mutation(&state.reconciler.resolve_mutation(&mutation));
                    self.publish_locked(&mut state);
                    return Ok(Some((mutation, request)));
                }
                Next::Orphaned { index, dependency } => {
                    let orphan = state.queue[index].clone();
                    warn!(
                        mutation_id = %orphan.id,
                        dependency = %dependency,
                        "dependency never reached the server"
                    );
                    self.fail_with_dependency(&mut state, &orphan, &dependency)?;
                    report.failed += 1 + self.fail_dependents(&mut state, &orphan)?;
                    self.publish_locked(&mut state);
                }
                Next::Idle => {
                    report.held = scan.held;
                    return Ok(None);
                }
            }
        }
    }

    /// One network attempt bounded by the request timeout.
    async fn attempt(&self, mutation: &Mutation, request: &MutationRequest) -> TransportOutcome {
        let timeout = self.config.transport.request_timeout();
        let span = mutation_span!(mutation);
        async {
            debug!(method = %request.method, path = %request.path, "sending mutation");
            match tokio::time::timeout(timeout, self.transport.send(request)).await {
                Ok(outcome) => outcome,
                Err(_) => TransportOutcome::Timeout,
            }
        }
        .instrument(span)
        .await
    }

    fn settle(
        &self,
        mutation: &Mutation,
        outcome: TransportOutcome,
        report: &mut DrainReport,
    ) -> TetherResult<()> {
        let mut state = self.lock_state()?;
        match classify(outcome) {
            Disposition::Synced { body } => {
                self.on_synced(&mut state, mutation, body)?;
                report.synced += 1;
            }
            Disposition::Conflict { message } => {
                self.on_conflict(&mut state, mutation, message)?;
                report.conflicts += 1;
            }
            Disposition::Rejected { status, message } => {
                report.failed += 1 + self.on_rejected(&mut state, mutation, status, message)?;
            }
            Disposition::Transient { status, message } => {
                if self.on_transient(&mut state, mutation, status, message)? {
                    report.retry_scheduled += 1;
                } else {
                    report.failed += 1;
                }
            }
        }
        self.publish_locked(&mut state);
        Ok(())
    }

    fn on_synced(&self, state: &mut EngineState, mutation: &Mutation, body: Option<Value>) -> TetherResult<()> {
        let mut resource_id = state.reconciler.resolve(mutation.resource_id.as_str());

        if mutation.kind == MutationKind::Create && mutation.resource_id.is_temporary() {
            let temp_id = mutation.resource_id.as_str();
            match body.as_ref().and_then(|b| server_id(b, &self.config.transport.id_field)) {
                Some(real_id) if real_id != temp_id => {
                    self.reconcile(state, mutation.resource_type, temp_id, &real_id)?;
                    resource_id = real_id;
                }
                _ => warn!(
                    mutation_id = %mutation.id,
                    "create response carried no id, keeping the local id"
                ),
            }
        }

        self.store.clear_dependency(&mutation.id)?;
        self.store.remove(&mutation.id)?;
        state.queue = self.store.list()?;
        state.patcher.confirm(&mutation.id, body.as_ref());
        self.remember_synced(state, mutation.resource_type, &resource_id);

        debug!(mutation_id = %mutation.id, resource_id = %resource_id, "mutation synced");
        self.status.emit(SyncEvent::Synced {
            mutation_id: mutation.id.clone(),
            resource_type: mutation.resource_type,
            resource_id,
        });
        Ok(())
    }

    /// Record a temp → real mapping and rewrite the temp id everywhere. The
    /// mapping is persisted first so a crash part-way through can be
    /// finished on restart.
    fn reconcile(
        &self,
        state: &mut EngineState,
        resource_type: ResourceType,
        temp_id: &str,
        real_id: &str,
    ) -> TetherResult<()> {
        self.store.record_mapping(&IdMapping {
            temp_id: temp_id.to_string(),
            real_id: real_id.to_string(),
            resource_type,
            recorded_at: self.clock.now(),
        })?;
        state.reconciler.record_mapping(temp_id, real_id);
        self.store.rewrite_resource_ids(temp_id, real_id)?;
        state.patcher.rekey(resource_type, temp_id, real_id);

        events::id_reconciled(temp_id, real_id);
        self.status.emit(SyncEvent::IdReconciled {
            resource_type,
            temp_id: temp_id.to_string(),
            real_id: real_id.to_string(),
        });
        Ok(())
    }

    fn on_conflict(&self, state: &mut EngineState, mutation: &Mutation, message: String) -> TetherResult<()> {
        let patch = MutationPatch::status(MutationStatus::Conflict)
            .with_attempt(mutation.attempt + 1)
            .with_next_retry_at(None)
            .with_error(Some(SyncErrorDetail::conflict(message.clone())));
        let updated = self.persist(state, &mutation.id, &patch)?;

        events::conflict_detected(&updated.id, &updated.chain_key());
        self.status.emit(SyncEvent::ConflictRequiresAttention {
            mutation_id: updated.id.clone(),
            resource_type: updated.resource_type,
            resource_id: updated.resource_id.as_str().to_string(),
            message,
        });
        Ok(())
    }

    /// Returns the number of dependents failed along with the mutation.
    fn on_rejected(
        &self,
        state: &mut EngineState,
        mutation: &Mutation,
        status: u16,
        message: String,
    ) -> TetherResult<usize> {
        let patch = MutationPatch::status(MutationStatus::Failed)
            .with_attempt(mutation.attempt + 1)
            .with_next_retry_at(None)
            .with_error(Some(SyncErrorDetail::permanent(status, message.clone())));
        let updated = self.persist(state, &mutation.id, &patch)?;

        events::permanent_failure(&updated.id, status, &message);
        self.roll_back(state, &updated);
        self.status.emit(SyncEvent::SyncFailed {
            mutation_id: updated.id.clone(),
            resource_type: updated.resource_type,
            resource_id: updated.resource_id.as_str().to_string(),
            message,
            retry_available: true,
        });
        self.fail_dependents(state, &updated)
    }

    /// Returns true when another attempt was scheduled.
    fn on_transient(
        &self,
        state: &mut EngineState,
        mutation: &Mutation,
        status: Option<u16>,
        message: String,
    ) -> TetherResult<bool> {
        let attempt = mutation.attempt + 1;
        let error = SyncErrorDetail::transient(status, message.clone());

        if self.retry.is_exhausted(attempt) {
            let patch = MutationPatch::status(MutationStatus::Failed)
                .with_attempt(attempt)
                .with_next_retry_at(None)
                .with_error(Some(error));
            let updated = self.persist(state, &mutation.id, &patch)?;
            events::retries_exhausted(&updated.id, attempt, &message);
            self.status.emit(SyncEvent::SyncFailed {
                mutation_id: updated.id.clone(),
                resource_type: updated.resource_type,
                resource_id: updated.resource_id.as_str().to_string(),
                message,
                retry_available: true,
            });
            return Ok(false);
        }

        let delay = self.retry.delay_for(attempt);
        let patch = MutationPatch::status(MutationStatus::Pending)
            .with_attempt(attempt)
            .with_next_retry_at(Some(self.clock.after(delay)))
            .with_error(Some(error));
        self.persist(state, &mutation.id, &patch)?;
        events::retry_scheduled(
            &mutation.id,
            attempt,
            u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            &message,
        );
        Ok(true)
    }

    /// Take a mutation out of `syncing` after its outcome could not be
    /// recorded. It goes back to `pending` with a backoff, or to `failed`
    /// once the attempt budget is spent. When the store stays unwritable
    /// only the in-memory copy is released; the row is recovered on restart.
    fn release(&self, mutation: &Mutation, cause: &TetherError) {
        let Ok(mut state) = self.lock_state() else {
            return;
        };
        if state.find(&mutation.id).map(|m| m.status) != Some(MutationStatus::Syncing) {
            return;
        }
        let attempt = mutation.attempt + 1;
        let error = SyncErrorDetail::transient(None, format!("could not record outcome: {cause}"));
        let patch = if self.retry.is_exhausted(attempt) {
            MutationPatch::status(MutationStatus::Failed)
                .with_next_retry_at(None)
        } else {
            MutationPatch::status(MutationStatus::Pending)
                .with_next_retry_at(Some(self.clock.after(self.retry.delay_for(attempt))))
        }
        .with_attempt(attempt)
        .with_error(Some(error));

        match self.store.update(&mutation.id, &patch) {
            Ok(updated) => state.replace(updated),
            Err(TetherError::MutationNotFound { .. }) => state.forget(&mutation.id),
            Err(e) => {
                warn!(mutation_id = %mutation.id, error = %e, "store still failing, releasing in memory only");
                if let Some(slot) = state.queue.iter_mut().find(|m| m.id == mutation.id) {
                    slot.apply_patch(&patch);
                }
            }
        }
        warn!(mutation_id = %mutation.id, error = %cause, "outcome not recorded, mutation released");
        self.publish_locked(&mut state);
    }

    /// Fail a mutation whose target never came into existence.
    pub(crate) fn fail_with_dependency(
        &self,
        state: &mut EngineState,
        mutation: &Mutation,
        dependency: &str,
    ) -> TetherResult<()> {
        let detail = SyncErrorDetail::dependency(dependency);
        let message = detail.message.clone();
        let patch = MutationPatch::status(MutationStatus::Failed)
            .with_next_retry_at(None)
            .with_error(Some(detail));
        let updated = self.persist(state, &mutation.id, &patch)?;
        self.roll_back(state, &updated);
        self.status.emit(SyncEvent::SyncFailed {
            mutation_id: updated.id.clone(),
            resource_type: updated.resource_type,
            resource_id: updated.resource_id.as_str().to_string(),
            message,
            retry_available: true,
        });
        Ok(())
    }

    /// Fail every pending mutation that targets or references the resource
    /// `root` would have created, transitively. Returns how many failed.
    pub(crate) fn fail_dependents(&self, state: &mut EngineState, root: &Mutation) -> TetherResult<usize> {
        let mut failed = 0;
        let mut frontier = vec![root.clone()];
        while let Some(parent) = frontier.pop() {
            if parent.kind != MutationKind::Create || !parent.resource_id.is_temporary() {
                continue;
            }
            let dependents: Vec<Mutation> = state
                .queue
                .iter()
                .filter(|m| m.status == MutationStatus::Pending && depends_on(m, &parent))
                .cloned()
                .collect();
            for dependent in dependents {
                self.fail_with_dependency(state, &dependent, &parent.id)?;
                failed += 1;
                frontier.push(dependent);
            }
        }
        Ok(failed)
    }

    pub(crate) fn roll_back(&self, state: &mut EngineState, mutation: &Mutation) {
        if state.patcher.rollback(&mutation.id) {
            events::rollback_applied(&mutation.id, &mutation.chain_key());
            self.status.emit(SyncEvent::RolledBack {
                mutation_id: mutation.id.clone(),
                resource_type: mutation.resource_type,
                resource_id: mutation.resource_id.as_str().to_string(),
            });
        }
    }

    /// Arm the retry timer for the earliest scheduled retry, or disarm it.
    fn rearm_timer(&self) -> TetherResult<()> {
        let next = {
            let state = self.lock_state()?;
            selection::next_retry_at(&state.queue, self.clock.now())
        };
        let mut timer = self
            .timer
            .lock()
            .map_err(|_| SyncError::StatePoisoned)?;
        match next {
            Some(at) if self.network.is_online() => {
                timer.arm(self.clock.until(at), self.wake.clone());
            }
            _ => timer.cancel(),
        }
        Ok(())
    }

    pub(crate) fn cancel_timer(&self) {
        if let Ok(mut timer) = self.timer.lock() {
            timer.cancel();
        }
    }

    /// Whether a retry timer is currently armed.
    pub fn retry_armed(&self) -> bool {
        self.timer.lock().map(|t| t.is_armed()).unwrap_or(false)
    }
}

/// Whether `mutation` waits for the resource `parent` creates.
pub(crate) fn depends_on(mutation: &Mutation, parent: &Mutation) -> bool {
    if mutation.id == parent.id {
        return false;
    }
    if mutation.depends_on.as_deref() == Some(parent.id.as_str()) {
        return true;
    }
    let temp = parent.resource_id.as_str();
    if mutation.kind != MutationKind::Create && mutation.resource_id.as_str() == temp {
        return true;
    }
    let mut referenced = Vec::new();
    collect_temp_ids(&mutation.payload, &mut referenced);
    referenced.iter().any(|id| id == temp)
}

/// The server-assigned id in a create response. Numeric ids are accepted.
fn server_id(body: &Value, id_field: &str) -> Option<String> {
    match body.get(id_field)? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}
