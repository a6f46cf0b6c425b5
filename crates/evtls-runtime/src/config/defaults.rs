//! Library defaults for `RuntimeConfig`

/// Worker threads (each runs one event loop)
pub const NUM_WORKERS: usize = 4;

/// Upper bound on worker threads
pub const MAX_WORKERS: usize = 256;

/// How long an idle loop parks before re-checking its exit flag
pub const PARK_TIMEOUT_MS: u64 = 100;

/// Worker thread names are `<prefix>-<n>`
pub const THREAD_NAME_PREFIX: &str = "evtls-worker";

/// Raise the log level to debug on runtime construction
pub const DEBUG_LOGGING: bool = false;
