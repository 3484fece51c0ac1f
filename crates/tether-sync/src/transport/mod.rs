//! Outbound requests. The trait and request types live in `tether-core` so
//! test doubles need not depend on this crate.

mod http;

pub use http::{CredentialProvider, HttpTransport, StaticCredentials};
pub use tether_core::traits::{HttpMethod, MutationRequest, MutationTransport, TransportOutcome};
