//! Span definitions per sync operation.

/// Create a drain span.
#[macro_export]
macro_rules! drain_span {
    ($trigger:expr) => {
        tracing::info_span!("tether.drain", trigger = %$trigger)
    };
}

/// Create a span around one network attempt.
#[macro_export]
macro_rules! mutation_span {
    ($mutation:expr) => {
        tracing::info_span!(
            "tether.mutation",
            mutation_id = %$mutation.id,
            kind = %$mutation.kind,
            resource = %$mutation.chain_key(),
            attempt = $mutation.attempt + 1
        )
    };
}

/// Span names as constants for programmatic use.
pub mod names {
    pub const DRAIN: &str = "tether.drain";
    pub const MUTATION: &str = "tether.mutation";
}
