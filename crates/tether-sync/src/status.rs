//! Derived status for the UI: a `watch` snapshot plus a `broadcast` of
//! discrete events.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch};

use tether_core::constants::EVENT_CHANNEL_CAPACITY;
use tether_core::models::{Banner, SyncEvent, SyncStatusSnapshot};
use tether_core::mutation::{Mutation, MutationStatus};

/// An entity whose last mutation synced recently; it keeps a `synced`
/// badge until the confirmation window closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentlySynced {
    pub key: String,
    pub synced_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct StatusPublisher {
    snapshot: watch::Sender<SyncStatusSnapshot>,
    events: broadcast::Sender<SyncEvent>,
}

impl Default for StatusPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusPublisher {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(SyncStatusSnapshot::default());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { snapshot, events }
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatusSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn current(&self) -> SyncStatusSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Recompute the snapshot; subscribers are only woken when it changed.
    pub fn publish(&self, queue: &[Mutation], online: bool, recent: &[RecentlySynced]) {
        let next = derive_snapshot(queue, online, recent);
        self.snapshot.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    pub fn emit(&self, event: SyncEvent) {
        // No receivers is fine; nobody is listening yet.
        let _ = self.events.send(event);
    }
}

/// Build the snapshot for a queue.
pub fn derive_snapshot(
    queue: &[Mutation],
    online: bool,
    recent: &[RecentlySynced],
) -> SyncStatusSnapshot {
    let mut snapshot = SyncStatusSnapshot {
        online,
        ..Default::default()
    };
    let mut badges: BTreeMap<String, MutationStatus> = BTreeMap::new();

    for mutation in queue {
        match mutation.status {
            MutationStatus::Synced => continue,
            MutationStatus::Syncing => snapshot.syncing_count += 1,
            MutationStatus::Conflict => snapshot.conflict_count += 1,
            MutationStatus::Failed => snapshot.failed_count += 1,
            MutationStatus::Pending => {}
        }
        snapshot.pending_count += 1;
        badges
            .entry(mutation.chain_key())
            .and_modify(|badge| {
                if mutation.status.severity() > badge.severity() {
                    *badge = mutation.status;
                }
            })
            .or_insert(mutation.status);
    }

    for entry in recent {
        badges
            .entry(entry.key.clone())
            .or_insert(MutationStatus::Synced);
    }

    snapshot.banner = if snapshot.conflict_count > 0 {
        Some(Banner::conflicts(snapshot.conflict_count))
    } else if snapshot.failed_count > 0 {
        Some(Banner::failures(snapshot.failed_count))
    } else {
        None
    };
    snapshot.badges = badges;
    snapshot
}
