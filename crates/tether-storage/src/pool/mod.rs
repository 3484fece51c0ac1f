//! Connection management. The queue is small and written far more often than
//! it is scanned, so a single write connection serves every operation.

pub mod pragmas;
pub mod write_connection;

pub use write_connection::WriteConnection;
