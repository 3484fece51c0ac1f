use std::collections::BTreeMap;

use serde_json::Value;
use tether_core::mutation::{replace_id_refs, ResourceType};

pub type EntityKey = (ResourceType, String);

/// Local read model: the entities the UI renders, keyed by type and id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadModelCache {
    entities: BTreeMap<EntityKey, Value>,
}

impl ReadModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, resource_type: ResourceType, id: &str) -> Option<&Value> {
        self.entities.get(&(resource_type, id.to_string()))
    }

    pub fn contains(&self, resource_type: ResourceType, id: &str) -> bool {
        self.get(resource_type, id).is_some()
    }

    pub(crate) fn set(&mut self, key: &EntityKey, entity: Option<Value>) {
        match entity {
            Some(entity) => {
                self.entities.insert(key.clone(), entity);
            }
            None => {
                self.entities.remove(key);
            }
        }
    }

    pub(crate) fn take(&mut self, key: &EntityKey) -> Option<Value> {
        self.entities.remove(key)
    }

    /// Rewrite every reference to `from` in every cached entity.
    pub(crate) fn rewrite_refs(&mut self, from: &str, to: &str) -> usize {
        self.entities
            .values_mut()
            .map(|entity| replace_id_refs(entity, from, to))
            .sum()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityKey, &Value)> {
        self.entities.iter()
    }

    /// Deterministic serialization, for exact before/after comparisons.
    pub fn snapshot_bytes(&self) -> Vec<u8> {
        let rows: Vec<(&str, &str, &Value)> = self
            .entities
            .iter()
            .map(|((resource_type, id), entity)| (resource_type.as_str(), id.as_str(), entity))
            .collect();
        serde_json::to_vec(&rows).unwrap_or_default()
    }
}
