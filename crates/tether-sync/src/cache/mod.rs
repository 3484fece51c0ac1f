//! The local read model and the optimistic layers applied over it.

mod patcher;
mod read_model;

pub use patcher::OptimisticPatcher;
pub use read_model::{EntityKey, ReadModelCache};
