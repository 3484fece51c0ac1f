//! UI-facing status contract. Presentation code consumes these and never
//! reads the queue directly.

mod status_snapshot;
mod sync_event;

pub use status_snapshot::{Banner, BannerKind, SyncStatusSnapshot};
pub use sync_event::SyncEvent;
