use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::mutation::{MutationKind, ResourceType};

/// Discrete notifications broadcast to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(export)]
pub enum SyncEvent {
    Enqueued {
        mutation_id: String,
        kind: MutationKind,
        resource_type: ResourceType,
        resource_id: String,
    },
    Synced {
        mutation_id: String,
        resource_type: ResourceType,
        resource_id: String,
    },
    IdReconciled {
        resource_type: ResourceType,
        temp_id: String,
        real_id: String,
    },
    /// The server rejected the change with 409; the user must decide.
    ConflictRequiresAttention {
        mutation_id: String,
        resource_type: ResourceType,
        resource_id: String,
        message: String,
    },
    /// Automatic recovery is over for this mutation.
    SyncFailed {
        mutation_id: String,
        resource_type: ResourceType,
        resource_id: String,
        message: String,
        retry_available: bool,
    },
    RolledBack {
        mutation_id: String,
        resource_type: ResourceType,
        resource_id: String,
    },
    Discarded {
        mutation_id: String,
    },
}

impl SyncEvent {
    pub fn mutation_id(&self) -> Option<&str> {
        match self {
            Self::Enqueued { mutation_id, .. }
            | Self::Synced { mutation_id, .. }
            | Self::ConflictRequiresAttention { mutation_id, .. }
            | Self::SyncFailed { mutation_id, .. }
            | Self::RolledBack { mutation_id, .. }
            | Self::Discarded { mutation_id } => Some(mutation_id),
            Self::IdReconciled { .. } => None,
        }
    }
}
