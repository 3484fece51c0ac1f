//! # tether-core
//!
//! Foundation crate for the Tether offline mutation sync engine.
//! Defines the mutation data model, status contract, traits, errors, config,
//! and constants. Every other crate in the workspace depends on this.

pub mod config;
pub mod constants;
pub mod errors;
pub mod models;
pub mod mutation;
pub mod traits;

// Re-export the most commonly used types at the crate root.
pub use config::TetherConfig;
pub use errors::{TetherError, TetherResult};
pub use mutation::{
    ErrorClass, Mutation, MutationKind, MutationPatch, MutationStatus, NewMutation, ResourceId,
    ResourceType, SyncErrorDetail,
};
