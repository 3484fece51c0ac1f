use reqwest::header::{HeaderName, HeaderValue, COOKIE};
use reqwest::{Client, Method, Url};
use serde_json::Value;
use tracing::{debug, warn};

use tether_core::config::TransportConfig;
use tether_core::errors::{TetherResult, TransportError};
use tether_core::traits::{HttpMethod, MutationRequest, MutationTransport, TransportOutcome};

/// Session credentials owned by the embedding app's auth layer.
pub trait CredentialProvider: Send + Sync + 'static {
    fn csrf_token(&self) -> Option<String>;
    fn session_cookie(&self) -> Option<String>;
}

/// Fixed credentials.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    pub csrf_token: Option<String>,
    pub session_cookie: Option<String>,
}

impl StaticCredentials {
    pub fn new(csrf_token: impl Into<String>, session_cookie: impl Into<String>) -> Self {
        Self {
            csrf_token: Some(csrf_token.into()),
            session_cookie: Some(session_cookie.into()),
        }
    }
}

impl CredentialProvider for StaticCredentials {
    fn csrf_token(&self) -> Option<String> {
        self.csrf_token.clone()
    }

    fn session_cookie(&self) -> Option<String> {
        self.session_cookie.clone()
    }
}

/// REST transport over reqwest.
pub struct HttpTransport<C: CredentialProvider> {
    client: Client,
    base_url: String,
    csrf_header: HeaderName,
    credentials: C,
}

impl<C: CredentialProvider> HttpTransport<C> {
    pub fn new(config: &TransportConfig, credentials: C) -> TetherResult<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url).map_err(|e| TransportError::InvalidUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;
        let csrf_header =
            HeaderName::from_bytes(config.csrf_header.as_bytes()).map_err(|e| {
                TransportError::ClientBuild {
                    reason: format!("invalid csrf header name: {e}"),
                }
            })?;
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| TransportError::ClientBuild {
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url,
            csrf_header,
            credentials,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the HTTP request for `request` without sending it.
    pub fn build_request(&self, request: &MutationRequest) -> TetherResult<reqwest::Request> {
        let method = match request.method {
            HttpMethod::Post => Method::POST,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Delete => Method::DELETE,
        };
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self.client.request(method, url);

        if let Some(token) = self.credentials.csrf_token() {
            builder = builder.header(self.csrf_header.clone(), header_value(&token, request)?);
        }
        if let Some(cookie) = self.credentials.session_cookie() {
            builder = builder.header(COOKIE, header_value(&cookie, request)?);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        builder.build().map_err(|e| {
            TransportError::RequestBuild {
                path: request.path.clone(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}

fn header_value(value: &str, request: &MutationRequest) -> TetherResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| {
        TransportError::RequestBuild {
            path: request.path.clone(),
            reason: e.to_string(),
        }
        .into()
    })
}

impl<C: CredentialProvider> MutationTransport for HttpTransport<C> {
    async fn send(&self, request: &MutationRequest) -> TransportOutcome {
        let http_request = match self.build_request(request) {
            Ok(r) => r,
            Err(e) => {
                return TransportOutcome::NetworkFailure {
                    reason: e.to_string(),
                }
            }
        };

        match self.client.execute(http_request).await {
            Ok(response) => {
                let status = response.status().as_u16();
                let body = decode_body(status, &request.path, response.bytes().await);
                debug!(status, path = %request.path, "response received");
                TransportOutcome::Response { status, body }
            }
            Err(e) if e.is_timeout() => TransportOutcome::Timeout,
            Err(e) => TransportOutcome::NetworkFailure {
                reason: e.to_string(),
            },
        }
    }
}

/// A missing or unreadable body on a success status costs the caller the
/// server's copy of the entity, so it is logged rather than dropped.
fn decode_body(
    status: u16,
    path: &str,
    read: Result<impl AsRef<[u8]>, reqwest::Error>,
) -> Option<Value> {
    let success = (200..300).contains(&status);
    let bytes = match read {
        Ok(bytes) if bytes.as_ref().is_empty() => return None,
        Ok(bytes) => bytes,
        Err(e) => {
            if success {
                warn!(status, path = %path, error = %e, "response body could not be read");
            } else {
                debug!(status, path = %path, error = %e, "error body could not be read");
            }
            return None;
        }
    };
    match serde_json::from_slice(bytes.as_ref()) {
        Ok(value) => Some(value),
        Err(e) => {
            if success {
                warn!(status, path = %path, error = %e, "response body is not JSON");
            }
            None
        }
    }
}
