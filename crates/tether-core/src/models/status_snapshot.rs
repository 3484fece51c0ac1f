use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::mutation::MutationStatus;

/// Derived view of the queue, re-published after every change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SyncStatusSnapshot {
    pub online: bool,
    /// Mutations not yet `synced`.
    pub pending_count: usize,
    pub syncing_count: usize,
    pub conflict_count: usize,
    pub failed_count: usize,
    /// Per-entity badge keyed by `"<resource_type>:<id>"`.
    pub badges: BTreeMap<String, MutationStatus>,
    pub banner: Option<Banner>,
}

impl SyncStatusSnapshot {
    /// Badge for one entity, if it has queued or recently synced work.
    pub fn badge(&self, key: &str) -> Option<MutationStatus> {
        self.badges.get(key).copied()
    }

    pub fn is_idle(&self) -> bool {
        self.pending_count == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum BannerKind {
    Conflict,
    Failed,
}

/// Aggregate message shown once automatic recovery has run out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Banner {
    pub kind: BannerKind,
    pub count: usize,
    pub message: String,
}

impl Banner {
    pub fn conflicts(count: usize) -> Self {
        Self {
            kind: BannerKind::Conflict,
            count,
            message: format!("{count} {} need{} attention", noun(count), verb_s(count)),
        }
    }

    pub fn failures(count: usize) -> Self {
        Self {
            kind: BannerKind::Failed,
            count,
            message: format!("{count} {} failed to sync", noun(count)),
        }
    }
}

fn noun(count: usize) -> &'static str {
    if count == 1 {
        "change"
    } else {
        "changes"
    }
}

fn verb_s(count: usize) -> &'static str {
    if count == 1 {
        "s"
    } else {
        ""
    }
}
