mod queue_store;
mod transport;

pub use queue_store::{IIdMappingStore, IQueueStore, IdMapping};
pub use transport::{HttpMethod, MutationRequest, MutationTransport, TransportOutcome};
