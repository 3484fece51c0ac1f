//! An in-process stand-in for the REST server.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tether_core::traits::{HttpMethod, MutationRequest, MutationTransport, TransportOutcome};

/// How the server answers one request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum ScriptedReply {
    /// 2xx echoing the request body. Creates get a fresh `srv-N` id.
    Echo,
    Status {
        status: u16,
        #[serde(default)]
        body: Option<Value>,
    },
    Timeout,
    NetworkDown,
    /// Never answers; only the caller-level timeout ends the attempt.
    Hang,
}

impl ScriptedReply {
    pub fn status(status: u16) -> Self {
        Self::Status { status, body: None }
    }

    pub fn json(status: u16, body: Value) -> Self {
        Self::Status {
            status,
            body: Some(body),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub request: MutationRequest,
    pub at: tokio::time::Instant,
}

impl RecordedRequest {
    /// `"METHOD /path"`.
    pub fn line(&self) -> String {
        format!("{} {}", self.request.method, self.request.path)
    }
}

struct Script {
    replies: VecDeque<ScriptedReply>,
    fallback: ScriptedReply,
    latency: Duration,
    log: Vec<RecordedRequest>,
    next_server_id: u64,
}

/// Cheap to clone; clones share the script and the request log.
#[derive(Clone)]
pub struct ScriptedTransport {
    inner: Arc<Mutex<Script>>,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Script {
                replies: VecDeque::new(),
                fallback: ScriptedReply::Echo,
                latency: Duration::ZERO,
                log: Vec::new(),
                next_server_id: 1,
            })),
        }
    }

    pub fn from_replies(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        let transport = Self::new();
        transport.script().replies.extend(replies);
        transport
    }

    pub fn push(&self, reply: ScriptedReply) -> &Self {
        self.script().replies.push_back(reply);
        self
    }

    pub fn push_many(&self, reply: ScriptedReply, count: usize) -> &Self {
        let mut script = self.script();
        for _ in 0..count {
            script.replies.push_back(reply.clone());
        }
        drop(script);
        self
    }

    /// Reply used once the scripted replies run out.
    pub fn set_fallback(&self, reply: ScriptedReply) {
        self.script().fallback = reply;
    }

    /// Delay every reply by `latency` (virtual time under a paused runtime).
    pub fn set_latency(&self, latency: Duration) {
        self.script().latency = latency;
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.script().log.clone()
    }

    pub fn request_count(&self) -> usize {
        self.script().log.len()
    }

    pub fn lines(&self) -> Vec<String> {
        self.script().log.iter().map(RecordedRequest::line).collect()
    }

    /// Gaps between consecutive requests.
    pub fn gaps(&self) -> Vec<Duration> {
        let log = self.script().log.clone();
        log.windows(2).map(|w| w[1].at - w[0].at).collect()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.inner.lock().expect("scripted transport lock poisoned")
    }
}

impl MutationTransport for ScriptedTransport {
    async fn send(&self, request: &MutationRequest) -> TransportOutcome {
        let (reply, latency, server_id) = {
            let mut script = self.script();
            script.log.push(RecordedRequest {
                request: request.clone(),
                at: tokio::time::Instant::now(),
            });
            let reply = script
                .replies
                .pop_front()
                .unwrap_or_else(|| script.fallback.clone());
            let server_id = script.next_server_id;
            if reply == ScriptedReply::Echo && request.method == HttpMethod::Post {
                script.next_server_id += 1;
            }
            (reply, script.latency, server_id)
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        match reply {
            ScriptedReply::Echo => echo(request, server_id),
            ScriptedReply::Status { status, body } => TransportOutcome::Response { status, body },
            ScriptedReply::Timeout => TransportOutcome::Timeout,
            ScriptedReply::NetworkDown => TransportOutcome::NetworkFailure {
                reason: "connection refused".into(),
            },
            ScriptedReply::Hang => std::future::pending().await,
        }
    }
}

fn echo(request: &MutationRequest, server_id: u64) -> TransportOutcome {
    match request.method {
        HttpMethod::Post => {
            let mut body = request.body.clone().unwrap_or_else(|| Value::Object(Default::default()));
            if let Value::Object(map) = &mut body {
                map.insert("id".into(), Value::String(format!("srv-{server_id}")));
            }
            TransportOutcome::json(201, body)
        }
        HttpMethod::Patch => {
            let mut body = request.body.clone().unwrap_or_else(|| Value::Object(Default::default()));
            if let (Value::Object(map), Some(id)) = (&mut body, &request.resource_id) {
                map.insert("id".into(), Value::String(id.clone()));
            }
            TransportOutcome::json(200, body)
        }
        HttpMethod::Delete => TransportOutcome::status(204),
    }
}
