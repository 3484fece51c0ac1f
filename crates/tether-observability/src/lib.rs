//! # tether-observability
//!
//! Subscriber setup and the structured events the sync engine emits.

pub mod tracing_setup;

pub use tracing_setup::{build_filter, events, init_tracing};
