use std::fmt;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// How a failed attempt was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ErrorClass {
    /// Timeout, connection failure, 5xx or 429. Retried with backoff.
    Transient,
    /// 4xx other than 409. Never retried; the optimistic patch is rolled back.
    Permanent,
    /// 409. Waits for the user to retry, discard or reload.
    Conflict,
    /// The create this mutation depends on never reached the server.
    Dependency,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
            Self::Conflict => "conflict",
            Self::Dependency => "dependency",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified error detail stored on a `conflict` or `failed` mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SyncErrorDetail {
    pub class: ErrorClass,
    /// HTTP status of the last response, if the server answered at all.
    pub status_code: Option<u16>,
    pub message: String,
}

impl SyncErrorDetail {
    pub fn transient(status_code: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Transient,
            status_code,
            message: message.into(),
        }
    }

    pub fn permanent(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Permanent,
            status_code: Some(status_code),
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Conflict,
            status_code: Some(409),
            message: message.into(),
        }
    }

    pub fn dependency(dependency_id: &str) -> Self {
        Self {
            class: ErrorClass::Dependency,
            status_code: None,
            message: format!("depends on mutation {dependency_id}, which failed to sync"),
        }
    }
}
