//! Map a transport outcome to what happens to the mutation next.

use serde_json::Value;
use tether_core::traits::TransportOutcome;

#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// 2xx. Carries the authoritative entity when the server sent one.
    Synced { body: Option<Value> },
    /// 409. Waits for the user.
    Conflict { message: String },
    /// Any other 4xx. Final after one attempt.
    Rejected { status: u16, message: String },
    /// 5xx, 429, timeouts and connection failures. Retried with backoff.
    Transient { status: Option<u16>, message: String },
}

pub fn classify(outcome: TransportOutcome) -> Disposition {
    match outcome {
        TransportOutcome::Response { status, body } => match status {
            200..=299 => Disposition::Synced { body },
            409 => Disposition::Conflict {
                message: server_message(body.as_ref())
                    .unwrap_or_else(|| "the server has a newer version".into()),
            },
            429 => Disposition::Transient {
                status: Some(status),
                message: "rate limited".into(),
            },
            400..=499 => Disposition::Rejected {
                status,
                message: server_message(body.as_ref())
                    .unwrap_or_else(|| format!("rejected with HTTP {status}")),
            },
            _ => Disposition::Transient {
                status: Some(status),
                message: server_message(body.as_ref())
                    .unwrap_or_else(|| format!("server answered HTTP {status}")),
            },
        },
        TransportOutcome::Timeout => Disposition::Transient {
            status: None,
            message: "request timed out".into(),
        },
        TransportOutcome::NetworkFailure { reason } => Disposition::Transient {
            status: None,
            message: reason,
        },
    }
}

/// `error` or `message` from a JSON error body.
fn server_message(body: Option<&Value>) -> Option<String> {
    let body = body?;
    ["error", "message"]
        .iter()
        .find_map(|field| body.get(field).and_then(Value::as_str))
        .map(str::to_string)
}
