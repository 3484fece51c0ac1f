use std::fmt;
use std::future::Future;

use serde_json::Value;

use crate::mutation::{Mutation, MutationKind, ResourceType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Post,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One outbound request, built from a mutation whose ids are already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRequest {
    pub mutation_id: String,
    pub method: HttpMethod,
    /// Path relative to the API base, e.g. `/documents/42`.
    pub path: String,
    pub resource_type: ResourceType,
    /// `None` for creates.
    pub resource_id: Option<String>,
    pub body: Option<Value>,
}

impl MutationRequest {
    /// Map a mutation onto its REST call.
    pub fn for_mutation(mutation: &Mutation) -> Self {
        let collection = mutation.resource_type.collection();
        let id = mutation.resource_id.as_str();
        let (method, path, resource_id, body) = match mutation.kind {
            MutationKind::Create => (
                HttpMethod::Post,
                format!("/{collection}"),
                None,
                Some(mutation.payload.clone()),
            ),
            MutationKind::Update => (
                HttpMethod::Patch,
                format!("/{collection}/{id}"),
                Some(id.to_string()),
                Some(mutation.payload.clone()),
            ),
            MutationKind::Delete => (
                HttpMethod::Delete,
                format!("/{collection}/{id}"),
                Some(id.to_string()),
                None,
            ),
        };
        Self {
            mutation_id: mutation.id.clone(),
            method,
            path,
            resource_type: mutation.resource_type,
            resource_id,
            body,
        }
    }
}

/// What came back from one attempt. Classification is the processor's job.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportOutcome {
    /// The server answered. `body` is the parsed JSON body, if any.
    Response { status: u16, body: Option<Value> },
    Timeout,
    /// Connection refused, reset, DNS failure and friends.
    NetworkFailure { reason: String },
}

impl TransportOutcome {
    pub fn status(status: u16) -> Self {
        Self::Response { status, body: None }
    }

    pub fn json(status: u16, body: Value) -> Self {
        Self::Response {
            status,
            body: Some(body),
        }
    }
}

/// Sends mutation requests to the server.
pub trait MutationTransport: Send + Sync + 'static {
    fn send(&self, request: &MutationRequest) -> impl Future<Output = TransportOutcome> + Send;
}
