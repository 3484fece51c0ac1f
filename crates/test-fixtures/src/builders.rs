use serde_json::{json, Value};
use tether_core::TetherConfig;

/// Default configuration with the documented timings.
pub fn test_config() -> TetherConfig {
    TetherConfig::default()
}

pub fn document_body(title: &str) -> Value {
    json!({ "title": title, "content": "", "archived": false })
}

/// An issue that belongs to `document_id`, which may be a temporary id.
pub fn issue_body(title: &str, document_id: &str) -> Value {
    json!({ "title": title, "document_id": document_id, "state": "open" })
}
