//! Structured log events for sync state changes.

use tracing::{info, warn};

pub fn retry_scheduled(mutation_id: &str, attempt: u32, delay_ms: u64, reason: &str) {
    warn!(
        target: "tether.sync",
        mutation_id,
        attempt,
        delay_ms,
        reason,
        "retry scheduled"
    );
}

pub fn retries_exhausted(mutation_id: &str, attempt: u32, reason: &str) {
    warn!(
        target: "tether.sync",
        mutation_id,
        attempt,
        reason,
        "retries exhausted, waiting for manual action"
    );
}

pub fn permanent_failure(mutation_id: &str, status: u16, reason: &str) {
    warn!(
        target: "tether.sync",
        mutation_id,
        status,
        reason,
        "mutation rejected"
    );
}

pub fn conflict_detected(mutation_id: &str, resource: &str) {
    warn!(
        target: "tether.sync",
        mutation_id,
        resource,
        "conflict requires attention"
    );
}

pub fn rollback_applied(mutation_id: &str, resource: &str) {
    info!(target: "tether.sync", mutation_id, resource, "optimistic patch rolled back");
}

pub fn id_reconciled(temp_id: &str, real_id: &str) {
    info!(target: "tether.sync", temp_id, real_id, "temporary id reconciled");
}

pub fn connectivity_changed(online: bool) {
    info!(target: "tether.sync", online, "connectivity changed");
}
