//! The mutation: one queued intent to create, update, or delete a resource.
//!
//! # Examples
//!
//! ```
//! use tether_core::mutation::{Mutation, MutationStatus, NewMutation, ResourceType};
//!
//! let new = NewMutation::create(ResourceType::Document, serde_json::json!({"title": "X"}));
//! assert!(new.resource_id.is_temporary());
//!
//! let mutation = Mutation::from_new(new, chrono::Utc::now());
//! assert_eq!(mutation.status, MutationStatus::Pending);
//! assert_eq!(mutation.attempt, 0);
//! ```

mod error_detail;
mod ids;
mod types;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

pub use error_detail::{ErrorClass, SyncErrorDetail};
pub use ids::{collect_temp_ids, is_temporary_id, replace_id_refs, ResourceId};
pub use types::{MutationKind, MutationStatus, ResourceType};

/// A queued mutation as persisted in the durable store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Mutation {
    /// Assigned at enqueue time, stable for the mutation's lifetime.
    pub id: String,
    pub kind: MutationKind,
    pub resource_type: ResourceType,
    /// Real server id or temporary id.
    pub resource_id: ResourceId,
    /// Field diff (update), full body (create) or `null` (delete).
    pub payload: Value,
    /// The unsynced create this mutation waits for.
    pub depends_on: Option<String>,
    pub status: MutationStatus,
    /// Sync attempts made so far.
    pub attempt: u32,
    /// Enqueue sequence assigned by the store. Breaks `created_at` ties.
    pub seq: i64,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<SyncErrorDetail>,
}

impl Mutation {
    /// Materialize a new pending mutation with a fresh id.
    pub fn from_new(new: NewMutation, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: new.kind,
            resource_type: new.resource_type,
            resource_id: new.resource_id,
            payload: new.payload,
            depends_on: None,
            status: MutationStatus::Pending,
            attempt: 0,
            seq: 0,
            created_at: now,
            last_attempt_at: None,
            next_retry_at: None,
            last_error: None,
        }
    }

    /// Key shared by every mutation targeting the same resource.
    pub fn chain_key(&self) -> String {
        chain_key(self.resource_type, self.resource_id.as_str())
    }

    /// Whether the optimistic effect of this mutation is still applied to
    /// the read-model cache. Permanent and dependency failures have already
    /// been rolled back.
    pub fn has_live_patch(&self) -> bool {
        match self.status {
            MutationStatus::Synced => false,
            MutationStatus::Failed => !matches!(
                self.last_error.as_ref().map(|e| e.class),
                Some(ErrorClass::Permanent) | Some(ErrorClass::Dependency)
            ),
            _ => true,
        }
    }

    /// Whether a retry timer is still running for this mutation at `now`.
    pub fn is_backing_off(&self, now: DateTime<Utc>) -> bool {
        self.status == MutationStatus::Pending && self.next_retry_at.is_some_and(|at| at > now)
    }

    /// Apply a partial update in place.
    pub fn apply_patch(&mut self, patch: &MutationPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(attempt) = patch.attempt {
            self.attempt = attempt;
        }
        if let Some(at) = patch.last_attempt_at {
            self.last_attempt_at = at;
        }
        if let Some(at) = patch.next_retry_at {
            self.next_retry_at = at;
        }
        if let Some(ref err) = patch.last_error {
            self.last_error = err.clone();
        }
        if let Some(ref id) = patch.resource_id {
            self.resource_id = id.clone();
        }
        if let Some(ref payload) = patch.payload {
            self.payload = payload.clone();
        }
        if let Some(ref dep) = patch.depends_on {
            self.depends_on = dep.clone();
        }
    }
}

/// Format a chain key from its parts.
pub fn chain_key(resource_type: ResourceType, resource_id: &str) -> String {
    format!("{resource_type}:{resource_id}")
}

/// A mutation as requested by the UI, before the queue assigns identity.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMutation {
    pub kind: MutationKind,
    pub resource_type: ResourceType,
    pub resource_id: ResourceId,
    pub payload: Value,
}

impl NewMutation {
    /// A create for a brand-new resource, addressed by a fresh temporary id.
    pub fn create(resource_type: ResourceType, payload: Value) -> Self {
        Self {
            kind: MutationKind::Create,
            resource_type,
            resource_id: ResourceId::temporary(),
            payload,
        }
    }

    pub fn update(
        resource_type: ResourceType,
        resource_id: impl Into<ResourceId>,
        diff: Value,
    ) -> Self {
        Self {
            kind: MutationKind::Update,
            resource_type,
            resource_id: resource_id.into(),
            payload: diff,
        }
    }

    pub fn delete(resource_type: ResourceType, resource_id: impl Into<ResourceId>) -> Self {
        Self {
            kind: MutationKind::Delete,
            resource_type,
            resource_id: resource_id.into(),
            payload: Value::Null,
        }
    }
}

/// Partial update of a stored mutation. `None` leaves a field untouched;
/// the nested options of nullable fields allow clearing them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationPatch {
    pub status: Option<MutationStatus>,
    pub attempt: Option<u32>,
    pub last_attempt_at: Option<Option<DateTime<Utc>>>,
    pub next_retry_at: Option<Option<DateTime<Utc>>>,
    pub last_error: Option<Option<SyncErrorDetail>>,
    pub resource_id: Option<ResourceId>,
    pub payload: Option<Value>,
    pub depends_on: Option<Option<String>>,
}

impl MutationPatch {
    pub fn status(status: MutationStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    pub fn with_last_attempt_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_attempt_at = Some(Some(at));
        self
    }

    pub fn with_next_retry_at(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.next_retry_at = Some(at);
        self
    }

    pub fn with_error(mut self, error: Option<SyncErrorDetail>) -> Self {
        self.last_error = Some(error);
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_depends_on(mut self, depends_on: Option<String>) -> Self {
        self.depends_on = Some(depends_on);
        self
    }
}
