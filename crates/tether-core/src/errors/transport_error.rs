/// Errors raised while building an outbound request.
///
/// Failures of the request itself (timeouts, resets, status codes) are not
/// errors: they come back as a `TransportOutcome` and get classified by the
/// sync processor.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid base url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to build HTTP client: {reason}")]
    ClientBuild { reason: String },

    #[error("failed to build request for {path}: {reason}")]
    RequestBuild { path: String, reason: String },
}
