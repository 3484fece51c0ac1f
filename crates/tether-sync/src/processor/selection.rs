//! Which queued mutation may go out next.
//!
//! Mutations are considered in creation order. A chain (resource type plus
//! resolved id) is blocked from the first mutation that cannot be sent, so
//! later mutations on the same resource never overtake it.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tether_core::mutation::{chain_key, Mutation, MutationKind, MutationStatus};

use crate::reconcile::IdReconciler;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Next {
    Send(usize),
    /// The mutation waits on a create that will never reach the server.
    Orphaned { index: usize, dependency: String },
    Idle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Scan {
    pub(crate) next: Next,
    /// Pending mutations passed over because of their chain or a dependency.
    pub(crate) held: usize,
}

/// Whether a mutation stops later mutations of its chain.
fn blocks_chain(mutation: &Mutation, now: DateTime<Utc>) -> bool {
    match mutation.status {
        MutationStatus::Synced => false,
        MutationStatus::Syncing | MutationStatus::Conflict => true,
        MutationStatus::Failed => mutation.has_live_patch(),
        MutationStatus::Pending => mutation.is_backing_off(now),
    }
}

/// A create that failed for good and was rolled back.
fn is_dead_create(mutation: &Mutation) -> bool {
    mutation.kind == MutationKind::Create
        && mutation.status == MutationStatus::Failed
        && !mutation.has_live_patch()
}

enum Dependency {
    Ready,
    Waiting,
    Dead(String),
}

fn check_dependencies(queue: &[Mutation], mutation: &Mutation, reconciler: &IdReconciler) -> Dependency {
    let mut waiting = false;

    if let Some(dep) = &mutation.depends_on {
        if let Some(creator) = queue.iter().find(|m| &m.id == dep) {
            if is_dead_create(creator) {
                return Dependency::Dead(creator.id.clone());
            }
            waiting = true;
        }
    }

    for temp in reconciler.unresolved_temp_ids(mutation) {
        let creator = queue
            .iter()
            .find(|m| m.kind == MutationKind::Create && m.resource_id.as_str() == temp);
        match creator {
            None => return Dependency::Dead(temp),
            Some(c) if is_dead_create(c) => return Dependency::Dead(c.id.clone()),
            Some(_) => waiting = true,
        }
    }

    if waiting {
        Dependency::Waiting
    } else {
        Dependency::Ready
    }
}

pub(crate) fn scan(queue: &[Mutation], reconciler: &IdReconciler, now: DateTime<Utc>) -> Scan {
    let mut blocked: HashSet<String> = HashSet::new();
    let mut held = 0;

    for (index, mutation) in queue.iter().enumerate() {
        if mutation.status == MutationStatus::Synced {
            continue;
        }
        let key = chain_key(
            mutation.resource_type,
            &reconciler.resolve(mutation.resource_id.as_str()),
        );

        if blocked.contains(&key) {
            if mutation.status == MutationStatus::Pending {
                held += 1;
            }
            continue;
        }
        if blocks_chain(mutation, now) {
            blocked.insert(key);
            continue;
        }
        if mutation.status != MutationStatus::Pending {
            continue;
        }

        match check_dependencies(queue, mutation, reconciler) {
            Dependency::Ready => {
                return Scan {
                    next: Next::Send(index),
                    held,
                }
            }
            Dependency::Waiting => {
                blocked.insert(key);
                held += 1;
            }
            Dependency::Dead(dependency) => {
                return Scan {
                    next: Next::Orphaned { index, dependency },
                    held,
                }
            }
        }
    }

    Scan {
        next: Next::Idle,
        held,
    }
}

/// Earliest scheduled retry still in the future.
pub(crate) fn next_retry_at(queue: &[Mutation], now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    queue
        .iter()
        .filter(|m| m.status == MutationStatus::Pending)
        .filter_map(|m| m.next_retry_at)
        .filter(|at| *at > now)
        .min()
}
