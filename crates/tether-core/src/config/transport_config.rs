use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::defaults;

/// Outbound HTTP configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Base URL of the resource API, without a trailing slash.
    pub base_url: String,
    /// Per-attempt timeout. Expiry counts as a retryable failure.
    pub request_timeout_ms: u64,
    /// Field of a create response body that carries the server-assigned id.
    pub id_field: String,
    /// Header name used to send the CSRF token.
    pub csrf_header: String,
}

impl TransportConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::DEFAULT_BASE_URL.to_string(),
            request_timeout_ms: defaults::DEFAULT_REQUEST_TIMEOUT_MS,
            id_field: defaults::DEFAULT_ID_FIELD.to_string(),
            csrf_header: defaults::DEFAULT_CSRF_HEADER.to_string(),
        }
    }
}
