//! Optimistic layers over the read model.
//!
//! Each entity carries a stack of layers, one per queued mutation whose
//! effect is applied locally. A layer remembers the entity as it was just
//! before the mutation. Removing a layer from anywhere in the stack restores
//! its snapshot and replays the layers above it, so reversal is exact no
//! matter which order mutations settle in.

use std::collections::HashMap;

use serde_json::{Map, Value};
use tether_core::mutation::{Mutation, MutationKind, ResourceType};

use super::read_model::{EntityKey, ReadModelCache};

#[derive(Debug, Clone)]
struct Layer {
    mutation_id: String,
    kind: MutationKind,
    payload: Value,
    before: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct OptimisticPatcher {
    cache: ReadModelCache,
    layers: HashMap<EntityKey, Vec<Layer>>,
    index: HashMap<String, EntityKey>,
    id_field: String,
}

impl OptimisticPatcher {
    /// `id_field` names the id property written into provisional entities.
    pub fn new(id_field: impl Into<String>) -> Self {
        Self {
            cache: ReadModelCache::new(),
            layers: HashMap::new(),
            index: HashMap::new(),
            id_field: id_field.into(),
        }
    }

    pub fn cache(&self) -> &ReadModelCache {
        &self.cache
    }

    pub fn has_layer(&self, mutation_id: &str) -> bool {
        self.index.contains_key(mutation_id)
    }

    pub fn layer_count(&self) -> usize {
        self.index.len()
    }

    /// Load server truth underneath any optimistic layers for the entity.
    pub fn seed(&mut self, resource_type: ResourceType, id: &str, entity: Value) {
        let key = (resource_type, id.to_string());
        if self.layers.get(&key).is_some_and(|stack| !stack.is_empty()) {
            self.rebuild(&key, 0, Some(entity));
        } else {
            self.cache.set(&key, Some(entity));
        }
    }

    /// Reflect `mutation` in the cache immediately. Applying a mutation that
    /// already has a layer is a no-op.
    pub fn apply(&mut self, mutation: &Mutation) {
        if self.has_layer(&mutation.id) {
            return;
        }
        let key = (mutation.resource_type, mutation.resource_id.as_str().to_string());
        let before = self.cache.get(key.0, &key.1).cloned();
        let layer = Layer {
            mutation_id: mutation.id.clone(),
            kind: mutation.kind,
            payload: mutation.payload.clone(),
            before,
        };
        let after = self.patched(&layer, &key.1, layer.before.clone());
        self.cache.set(&key, after);
        self.index.insert(mutation.id.clone(), key.clone());
        self.layers.entry(key).or_default().push(layer);
    }

    /// Undo a mutation's effect. Returns false when no layer exists, which
    /// makes repeated rollbacks harmless.
    pub fn rollback(&mut self, mutation_id: &str) -> bool {
        let Some((key, position, layer)) = self.detach(mutation_id) else {
            return false;
        };
        self.rebuild(&key, position, layer.before);
        true
    }

    /// Settle a synced mutation. The server's entity, when returned, is
    /// merged over the locally computed one and becomes the new base.
    pub fn confirm(&mut self, mutation_id: &str, authoritative: Option<&Value>) -> bool {
        let Some((key, position, layer)) = self.detach(mutation_id) else {
            return false;
        };
        let local = self.patched(&layer, &key.1, layer.before.clone());
        let base = match (layer.kind, local, authoritative) {
            (MutationKind::Delete, _, _) => None,
            (_, Some(Value::Object(mut local)), Some(Value::Object(server))) => {
                local.extend(server.clone());
                Some(Value::Object(local))
            }
            (_, None, Some(server)) => Some(server.clone()),
            (_, local, _) => local,
        };
        self.rebuild(&key, position, base);
        true
    }

    /// Drop a mutation's layer and take `entity` as the server state in its
    /// place. Used when the user reloads after a conflict.
    pub fn settle(&mut self, mutation_id: &str, entity: Option<Value>) -> bool {
        let Some((key, position, _)) = self.detach(mutation_id) else {
            return false;
        };
        self.rebuild(&key, position, entity);
        true
    }

    /// Fold a follow-up diff into an existing create layer.
    pub fn amend(&mut self, mutation_id: &str, diff: &Value) -> bool {
        let Some(key) = self.index.get(mutation_id).cloned() else {
            return false;
        };
        let Some(stack) = self.layers.get_mut(&key) else {
            return false;
        };
        let Some(position) = stack.iter().position(|l| l.mutation_id == mutation_id) else {
            return false;
        };
        merge_into(&mut stack[position].payload, diff);
        let base = stack[position].before.clone();
        self.rebuild(&key, position, base);
        true
    }

    /// Move an entity and its layers from a temporary id to its real id and
    /// rewrite temp-id references everywhere in the cache.
    pub fn rekey(&mut self, resource_type: ResourceType, temp_id: &str, real_id: &str) {
        let from = (resource_type, temp_id.to_string());
        let to = (resource_type, real_id.to_string());

        if let Some(mut entity) = self.cache.take(&from) {
            if let Value::Object(map) = &mut entity {
                map.insert(self.id_field.clone(), Value::String(real_id.to_string()));
            }
            self.cache.set(&to, Some(entity));
        }
        if let Some(stack) = self.layers.remove(&from) {
            for layer in &stack {
                self.index.insert(layer.mutation_id.clone(), to.clone());
            }
            self.layers.entry(to).or_default().extend(stack);
        }

        self.cache.rewrite_refs(temp_id, real_id);
        for layer in self.layers.values_mut().flatten() {
            tether_core::mutation::replace_id_refs(&mut layer.payload, temp_id, real_id);
            if let Some(before) = layer.before.as_mut() {
                tether_core::mutation::replace_id_refs(before, temp_id, real_id);
            }
        }
    }

    fn detach(&mut self, mutation_id: &str) -> Option<(EntityKey, usize, Layer)> {
        let key = self.index.remove(mutation_id)?;
        let stack = self.layers.get_mut(&key)?;
        let position = stack.iter().position(|l| l.mutation_id == mutation_id)?;
        let layer = stack.remove(position);
        Some((key, position, layer))
    }

    /// Replay the layers from `position` upward over `base` and write the
    /// result to the cache.
    fn rebuild(&mut self, key: &EntityKey, position: usize, base: Option<Value>) {
        let mut current = base;
        if let Some(mut stack) = self.layers.remove(key) {
            for layer in stack.iter_mut().skip(position) {
                layer.before = current.clone();
                current = self.patched(layer, &key.1, current);
            }
            if !stack.is_empty() {
                self.layers.insert(key.clone(), stack);
            }
        }
        self.cache.set(key, current);
    }

    fn patched(&self, layer: &Layer, id: &str, current: Option<Value>) -> Option<Value> {
        match layer.kind {
            MutationKind::Create => {
                let mut entity = match &layer.payload {
                    Value::Object(map) => map.clone(),
                    _ => Map::new(),
                };
                entity.insert(self.id_field.clone(), Value::String(id.to_string()));
                Some(Value::Object(entity))
            }
            MutationKind::Update => {
                let mut entity = current.unwrap_or_else(|| {
                    let mut map = Map::new();
                    map.insert(self.id_field.clone(), Value::String(id.to_string()));
                    Value::Object(map)
                });
                merge_into(&mut entity, &layer.payload);
                Some(entity)
            }
            MutationKind::Delete => None,
        }
    }
}

/// Shallow merge: top-level keys of `diff` overwrite those of `target`.
fn merge_into(target: &mut Value, diff: &Value) {
    if let (Value::Object(target), Value::Object(diff)) = (target, diff) {
        for (field, value) in diff {
            target.insert(field.clone(), value.clone());
        }
    }
}
