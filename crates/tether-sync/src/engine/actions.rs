//! Entry points the UI calls: enqueueing edits and resolving mutations that
//! automatic recovery gave up on.

use serde_json::Value;
use tracing::{debug, info};

use tether_core::errors::{SyncError, TetherError, TetherResult};
use tether_core::models::SyncEvent;
use tether_core::mutation::{
    Mutation, MutationKind, MutationPatch, MutationStatus, NewMutation, ResourceId, ResourceType,
};
use tether_core::traits::{IIdMappingStore, IQueueStore, MutationTransport};

use super::{EngineState, SyncEngine};
use crate::processor::depends_on;

/// What became of an enqueued edit.
#[derive(Debug, Clone, PartialEq)]
pub enum EnqueueOutcome {
    /// Persisted as a new mutation.
    Queued(Mutation),
    /// Folded into the still-pending create of the same resource.
    Coalesced { into: String },
    /// A delete of a resource that never left the device; the queued
    /// create was dropped instead.
    Cancelled { removed: Vec<String> },
}

impl EnqueueOutcome {
    pub fn mutation(&self) -> Option<&Mutation> {
        match self {
            Self::Queued(m) => Some(m),
            _ => None,
        }
    }
}

impl<S, T> SyncEngine<S, T>
where
    S: IQueueStore + IIdMappingStore + 'static,
    T: MutationTransport,
{
    /// Create a resource under a fresh temporary id.
    pub fn create(&self, resource_type: ResourceType, payload: Value) -> TetherResult<Mutation> {
        self.queue_mutation(NewMutation::create(resource_type, payload))
    }

    pub fn update(
        &self,
        resource_type: ResourceType,
        id: impl Into<ResourceId>,
        diff: Value,
    ) -> TetherResult<EnqueueOutcome> {
        self.enqueue(NewMutation::update(resource_type, id, diff))
    }

    pub fn delete(&self, resource_type: ResourceType, id: impl Into<ResourceId>) -> TetherResult<EnqueueOutcome> {
        self.enqueue(NewMutation::delete(resource_type, id))
    }

    /// Apply the edit to the read model, persist it, and wake the processor.
    pub fn enqueue(&self, new: NewMutation) -> TetherResult<EnqueueOutcome> {
        validate(&new)?;
        if self.config.sync.coalesce_pending_creates {
            if let Some(outcome) = self.try_coalesce(&new)? {
                return Ok(outcome);
            }
        }
        self.queue_mutation(new).map(EnqueueOutcome::Queued)
    }

    fn queue_mutation(&self, new: NewMutation) -> TetherResult<Mutation> {
        validate(&new)?;
        let mut state = self.lock_state()?;

        let mut mutation = Mutation::from_new(new, self.clock.now());
        // Ids the UI still holds from before reconciliation go out resolved.
        mutation.resource_id = state.reconciler.resolve(mutation.resource_id.as_str()).into();
        mutation.payload = state.reconciler.resolve_payload(&mutation.payload);
        mutation.depends_on = state
            .reconciler
            .unresolved_temp_ids(&mutation)
            .iter()
            .find_map(|temp| state.creator_of(temp))
            .map(|creator| creator.id.clone());

        state.patcher.apply(&mutation);
        match self.store.enqueue(&mutation) {
            Ok(seq) => mutation.seq = seq,
            Err(e) => {
                state.patcher.rollback(&mutation.id);
                return Err(e);
            }
        }
        state.queue.push(mutation.clone());

        debug!(
            mutation_id = %mutation.id,
            kind = %mutation.kind,
            resource = %mutation.chain_key(),
            depends_on = ?mutation.depends_on,
            "mutation enqueued"
        );
        self.status.emit(SyncEvent::Enqueued {
            mutation_id: mutation.id.clone(),
            kind: mutation.kind,
            resource_type: mutation.resource_type,
            resource_id: mutation.resource_id.as_str().to_string(),
        });
        self.publish_locked(&mut state);
        drop(state);

        self.wake_if_online();
        Ok(mutation)
    }

    /// Fold an update or delete into a pending create that is the only
    /// queued mutation for its resource.
    fn try_coalesce(&self, new: &NewMutation) -> TetherResult<Option<EnqueueOutcome>> {
        if new.kind == MutationKind::Create || !new.resource_id.is_temporary() {
            return Ok(None);
        }
        let mut state = self.lock_state()?;
        let chain = new.resource_id.as_str();
        let Some(create) = state.creator_of(chain).cloned() else {
            return Ok(None);
        };
        let chain_len = state
            .queue
            .iter()
            .filter(|m| m.resource_type == new.resource_type && m.resource_id.as_str() == chain)
            .count();
        if create.status != MutationStatus::Pending
            || create.resource_type != new.resource_type
            || chain_len != 1
        {
            return Ok(None);
        }

        let outcome = match new.kind {
            MutationKind::Update => {
                let mut payload = create.payload.clone();
                if let (Value::Object(body), Value::Object(diff)) = (&mut payload, &new.payload) {
                    for (field, value) in diff {
                        body.insert(field.clone(), value.clone());
                    }
                }
                self.persist(&mut state, &create.id, &MutationPatch::default().with_payload(payload))?;
                state.patcher.amend(&create.id, &new.payload);
                debug!(mutation_id = %create.id, "update folded into pending create");
                EnqueueOutcome::Coalesced { into: create.id }
            }
            MutationKind::Delete => {
                self.unqueue(&mut state, &create.id)?;
                self.roll_back(&mut state, &create);
                self.status.emit(SyncEvent::Discarded {
                    mutation_id: create.id.clone(),
                });
                debug!(mutation_id = %create.id, "delete cancelled pending create");
                EnqueueOutcome::Cancelled {
                    removed: vec![create.id],
                }
            }
            MutationKind::Create => return Ok(None),
        };
        self.publish_locked(&mut state);
        Ok(Some(outcome))
    }

    /// Send a failed or conflicting mutation again with a fresh attempt
    /// budget. A rolled-back effect is re-applied first.
    pub fn retry(&self, id: &str) -> TetherResult<Mutation> {
        let mut state = self.lock_state()?;
        let mutation = find(&state, id)?;
        if !matches!(mutation.status, MutationStatus::Failed | MutationStatus::Conflict) {
            return Err(TetherError::InvalidTransition {
                id: id.to_string(),
                from: mutation.status,
                to: MutationStatus::Pending,
            });
        }

        if !mutation.has_live_patch() {
            state.patcher.apply(&mutation);
        }
        let patch = MutationPatch::status(MutationStatus::Pending)
            .with_attempt(0)
            .with_next_retry_at(None)
            .with_error(None);
        let updated = self.persist(&mut state, id, &patch)?;
        info!(mutation_id = %id, "manual retry");
        self.publish_locked(&mut state);
        drop(state);

        self.wake_if_online();
        Ok(updated)
    }

    /// Drop a mutation and undo its local effect. Discarding a create also
    /// discards everything that depends on the resource it would have made.
    /// Returns the ids removed.
    pub fn discard(&self, id: &str) -> TetherResult<Vec<String>> {
        let mut state = self.lock_state()?;
        let root = find(&state, id)?;
        if root.status == MutationStatus::Syncing {
            return Err(SyncError::MutationInFlight { id: id.to_string() }.into());
        }

        let mut removed = Vec::new();
        let mut frontier = vec![root];
        while let Some(mutation) = frontier.pop() {
            if removed.contains(&mutation.id) {
                continue;
            }
            self.unqueue(&mut state, &mutation.id)?;
            self.roll_back(&mut state, &mutation);
            self.status.emit(SyncEvent::Discarded {
                mutation_id: mutation.id.clone(),
            });
            removed.push(mutation.id.clone());

            if mutation.kind == MutationKind::Create && mutation.resource_id.is_temporary() {
                frontier.extend(
                    state
                        .queue
                        .iter()
                        .filter(|m| m.status != MutationStatus::Syncing && depends_on(m, &mutation))
                        .cloned(),
                );
            }
        }

        info!(mutation_id = %id, removed = removed.len(), "discarded");
        self.publish_locked(&mut state);
        Ok(removed)
    }

    /// Give up a conflicting or failed mutation in favor of the server's
    /// version of the entity (`None` if the server no longer has it).
    pub fn reload(&self, id: &str, authoritative: Option<Value>) -> TetherResult<()> {
        let mut state = self.lock_state()?;
        let mutation = find(&state, id)?;
        if !matches!(mutation.status, MutationStatus::Failed | MutationStatus::Conflict) {
            return Err(TetherError::InvalidTransition {
                id: id.to_string(),
                from: mutation.status,
                to: MutationStatus::Synced,
            });
        }

        if !state.patcher.settle(&mutation.id, authoritative.clone()) {
            if let Some(entity) = authoritative {
                let entity_id = state.reconciler.resolve(mutation.resource_id.as_str());
                state.patcher.seed(mutation.resource_type, &entity_id, entity);
            }
        }
        self.unqueue(&mut state, &mutation.id)?;
        self.status.emit(SyncEvent::Discarded {
            mutation_id: mutation.id.clone(),
        });
        info!(mutation_id = %id, "reloaded from server");
        self.publish_locked(&mut state);
        Ok(())
    }
}

fn find(state: &EngineState, id: &str) -> TetherResult<Mutation> {
    state
        .find(id)
        .cloned()
        .ok_or_else(|| TetherError::MutationNotFound { id: id.to_string() })
}

/// Creates and updates carry a JSON object.
fn validate(new: &NewMutation) -> TetherResult<()> {
    if new.kind != MutationKind::Delete && !new.payload.is_object() {
        return Err(SyncError::PayloadNotObject {
            kind: new.kind.to_string(),
        }
        .into());
    }
    Ok(())
}
