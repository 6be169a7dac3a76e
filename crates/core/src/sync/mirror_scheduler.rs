//! Scheduler constants for the background mirror.

/// Default cadence of scheduled mirror runs (nightly-style batch).
pub const MIRROR_DEFAULT_INTERVAL_SECS: u64 = 60 * 60 * 24;

/// Maximum jitter (seconds) added to periodic run intervals.
pub const MIRROR_INTERVAL_JITTER_SECS: u64 = 30;

/// Default deadline for mirroring a single collection.
pub const MIRROR_COLLECTION_TIMEOUT_SECS: u64 = 300;

/// Consecutive failed runs after which the background loop stops itself.
pub const MIRROR_MAX_CONSECUTIVE_FAILURES: u32 = 10;

/// How long shutdown waits for an in-flight run before aborting it.
pub const MIRROR_SHUTDOWN_GRACE_SECS: u64 = 30;
