//! Temporary → real id map.
//!
//! Entries are added when a create syncs and are never removed: a UI that
//! still holds a temporary id keeps resolving it after reconciliation.

use std::collections::HashMap;

use serde_json::Value;
use tether_core::mutation::{collect_temp_ids, replace_id_refs, Mutation, MutationKind};
use tether_core::traits::IdMapping;

#[derive(Debug, Clone, Default)]
pub struct IdReconciler {
    mappings: HashMap<String, String>,
}

impl IdReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted mappings.
    pub fn from_mappings(mappings: impl IntoIterator<Item = IdMapping>) -> Self {
        let mut reconciler = Self::new();
        for mapping in mappings {
            reconciler.record_mapping(&mapping.temp_id, &mapping.real_id);
        }
        reconciler
    }

    pub fn record_mapping(&mut self, temp_id: &str, real_id: &str) {
        self.mappings.insert(temp_id.to_string(), real_id.to_string());
    }

    pub fn is_resolved(&self, temp_id: &str) -> bool {
        self.mappings.contains_key(temp_id)
    }

    /// The real id for `id` if it is a reconciled temporary id, else `id`.
    pub fn resolve(&self, id: &str) -> String {
        self.mappings
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    /// Rewrite every string in `payload` equal to a known temporary id.
    pub fn resolve_payload(&self, payload: &Value) -> Value {
        let mut resolved = payload.clone();
        let mut referenced = Vec::new();
        collect_temp_ids(payload, &mut referenced);
        for temp in referenced {
            if let Some(real) = self.mappings.get(&temp) {
                replace_id_refs(&mut resolved, &temp, real);
            }
        }
        resolved
    }

    /// A copy of `mutation` with its resource id and payload resolved.
    pub fn resolve_mutation(&self, mutation: &Mutation) -> Mutation {
        let mut resolved = mutation.clone();
        resolved.resource_id = self.resolve(mutation.resource_id.as_str()).into();
        resolved.payload = self.resolve_payload(&mutation.payload);
        resolved
    }

    /// Temporary ids `mutation` references that have no mapping yet. A
    /// create's own resource id is not a reference.
    pub fn unresolved_temp_ids(&self, mutation: &Mutation) -> Vec<String> {
        let mut referenced = Vec::new();
        if mutation.kind != MutationKind::Create && mutation.resource_id.is_temporary() {
            referenced.push(mutation.resource_id.as_str().to_string());
        }
        collect_temp_ids(&mutation.payload, &mut referenced);
        if mutation.kind == MutationKind::Create {
            referenced.retain(|id| id != mutation.resource_id.as_str());
        }
        referenced.retain(|id| !self.is_resolved(id));
        referenced
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}
