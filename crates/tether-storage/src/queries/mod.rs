//! SQL for the queue and the id map. Functions take a bare connection so
//! callers can compose them inside one transaction.

pub mod mapping_ops;
pub mod mutation_ops;
