/// Tether system version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prefix carried by every locally generated temporary resource id.
pub const TEMP_ID_PREFIX: &str = "temp-";

/// Attempts made before a transient failure becomes terminal.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Base delay of the exponential retry backoff, in milliseconds.
pub const DEFAULT_BASE_BACKOFF_MS: u64 = 1_000;

/// Caller-level timeout applied to each network attempt, in milliseconds.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;

/// How long a synced mutation keeps its entity badge at `synced`, in seconds.
pub const DEFAULT_SYNCED_RETENTION_SECS: u64 = 5;

/// Capacity of the sync event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;
