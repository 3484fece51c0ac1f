//! # tether-sync
//!
//! The offline mutation pipeline: edits are applied optimistically to a
//! local read model, persisted to the durable queue, and drained to the
//! server in order once connectivity allows. Failures are retried,
//! rolled back or surfaced for the user depending on how the server
//! answered.

pub mod cache;
pub mod clock;
pub mod engine;
pub mod network;
pub mod processor;
pub mod reconcile;
pub mod retry;
pub mod status;
pub mod transport;

pub use cache::{OptimisticPatcher, ReadModelCache};
pub use clock::Clock;
pub use engine::{EnqueueOutcome, SyncEngine, SyncHandle};
pub use network::{NetworkMonitor, NetworkState};
pub use processor::{classify, Disposition, DrainReport};
pub use reconcile::IdReconciler;
pub use retry::{RetryPolicy, RetryTimer};
pub use status::{derive_snapshot, RecentlySynced, StatusPublisher};
pub use transport::{
    CredentialProvider, HttpMethod, HttpTransport, MutationRequest, MutationTransport,
    StaticCredentials, TransportOutcome,
};
