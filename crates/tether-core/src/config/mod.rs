//! Layered configuration loaded from TOML. Every section falls back to its
//! defaults, so an empty document is a valid configuration.

pub mod defaults;
mod observability_config;
mod storage_config;
mod sync_config;
mod transport_config;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use observability_config::ObservabilityConfig;
pub use storage_config::StorageConfig;
pub use sync_config::SyncConfig;
pub use transport_config::TransportConfig;

use crate::errors::{TetherError, TetherResult};

/// Root configuration for the sync engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TetherConfig {
    pub storage: StorageConfig,
    pub sync: SyncConfig,
    pub transport: TransportConfig,
    pub observability: ObservabilityConfig,
}

impl TetherConfig {
    /// Parse a TOML document, filling unspecified fields with defaults.
    pub fn from_toml(input: &str) -> TetherResult<Self> {
        let config: Self =
            toml::from_str(input).map_err(|e| TetherError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file on disk.
    pub fn load(path: &Path) -> TetherResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            TetherError::ConfigError(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml(&raw)
    }

    /// Serialize back to TOML.
    pub fn to_toml(&self) -> TetherResult<String> {
        toml::to_string(self).map_err(|e| TetherError::ConfigError(e.to_string()))
    }

    /// Reject values the engine cannot operate with.
    pub fn validate(&self) -> TetherResult<()> {
        if self.sync.max_attempts == 0 {
            return Err(TetherError::ConfigError(
                "sync.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.sync.base_backoff_ms == 0 {
            return Err(TetherError::ConfigError(
                "sync.base_backoff_ms must be positive".to_string(),
            ));
        }
        if self.transport.request_timeout_ms == 0 {
            return Err(TetherError::ConfigError(
                "transport.request_timeout_ms must be positive".to_string(),
            ));
        }
        if self.transport.id_field.is_empty() {
            return Err(TetherError::ConfigError(
                "transport.id_field must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
