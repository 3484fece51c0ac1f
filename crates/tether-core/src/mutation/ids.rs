//! Resource identifiers. A resource id is either a server-assigned id or a
//! locally generated temporary id of the form `temp-<uuid v4>`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::constants::TEMP_ID_PREFIX;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[serde(transparent)]
#[ts(export)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh temporary id for a resource created offline.
    pub fn temporary() -> Self {
        Self(format!("{TEMP_ID_PREFIX}{}", uuid::Uuid::new_v4()))
    }

    /// Whether this id was generated locally and still awaits reconciliation.
    pub fn is_temporary(&self) -> bool {
        is_temporary_id(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// Structural check for temporary ids: the prefix followed by a valid UUID.
pub fn is_temporary_id(id: &str) -> bool {
    id.strip_prefix(TEMP_ID_PREFIX)
        .is_some_and(|rest| uuid::Uuid::parse_str(rest).is_ok())
}

/// Replace every JSON string equal to `from` with `to`, at any depth.
/// Returns the number of values rewritten.
pub fn replace_id_refs(value: &mut Value, from: &str, to: &str) -> usize {
    match value {
        Value::String(s) if s == from => {
            *s = to.to_string();
            1
        }
        Value::Array(items) => items
            .iter_mut()
            .map(|item| replace_id_refs(item, from, to))
            .sum(),
        Value::Object(map) => map
            .values_mut()
            .map(|item| replace_id_refs(item, from, to))
            .sum(),
        _ => 0,
    }
}

/// Collect every temporary id referenced by string values in `value`.
pub fn collect_temp_ids(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) if is_temporary_id(s) => {
            if !out.iter().any(|seen| seen == s) {
                out.push(s.clone());
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_temp_ids(item, out)),
        Value::Object(map) => map.values().for_each(|item| collect_temp_ids(item, out)),
        _ => {}
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ResourceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ResourceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for ResourceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
