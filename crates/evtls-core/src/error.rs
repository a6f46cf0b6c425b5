//! Error types for evtls
//!
//! Almost every failure at this layer is a broken invariant (wrong thread,
//! use after shutdown, double free). Those are reported through [`fatal`],
//! which logs and panics. Only configuration and thread spawning return
//! recoverable errors.

use core::fmt;

use crate::id::SlotIndex;
use crate::state::LifecycleState;

/// Result type for recoverable evtls operations
pub type TlsResult<T> = Result<T, TlsError>;

/// Errors raised by the registry, slots and runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsError {
    /// Main-thread-only operation called from another thread
    NotMainThread,

    /// Operation not permitted once the registry has shut down
    AfterShutdown(&'static str),

    /// Lifecycle moved backwards or repeated a transition
    InvalidTransition {
        from: LifecycleState,
        to: LifecycleState,
    },

    /// Slot index pushed onto the free list twice
    DuplicateFree(SlotIndex),

    /// Slot index released without a live handle
    SlotNotAllocated(SlotIndex),

    /// Slot read on a thread whose cells never reached the index
    NotRegistered(SlotIndex),

    /// Thread storage used before a dispatcher was bound to it
    DispatcherUnbound,

    /// Same dispatcher registered twice, or storage bound twice
    DuplicateRegistration(String),

    /// Thread storage torn down while the registry was not shut down
    ShutdownOutOfOrder(LifecycleState),

    /// Invalid runtime configuration
    Config(ConfigError),

    /// Failed to spawn a worker thread
    SpawnFailed(String),

    /// Worker thread panicked
    WorkerPanicked(String),
}

impl fmt::Display for TlsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlsError::NotMainThread => write!(f, "operation restricted to the main thread"),
            TlsError::AfterShutdown(op) => write!(f, "{} called after shutdown", op),
            TlsError::InvalidTransition { from, to } => {
                write!(f, "illegal lifecycle transition {} -> {}", from, to)
            }
            TlsError::DuplicateFree(idx) => write!(f, "slot index {} already in free slot set", idx),
            TlsError::SlotNotAllocated(idx) => write!(f, "slot index {} is not allocated", idx),
            TlsError::NotRegistered(idx) => {
                write!(f, "slot {} not present on this thread", idx)
            }
            TlsError::DispatcherUnbound => write!(f, "thread storage has no dispatcher bound"),
            TlsError::DuplicateRegistration(name) => {
                write!(f, "dispatcher '{}' registered twice", name)
            }
            TlsError::ShutdownOutOfOrder(state) => {
                write!(f, "thread shutdown while registry is {}", state)
            }
            TlsError::Config(e) => write!(f, "config error: {}", e),
            TlsError::SpawnFailed(msg) => write!(f, "failed to spawn worker thread: {}", msg),
            TlsError::WorkerPanicked(name) => write!(f, "worker thread {} panicked", name),
        }
    }
}

impl std::error::Error for TlsError {}

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for TlsError {
    fn from(e: ConfigError) -> Self {
        TlsError::Config(e)
    }
}

/// Report a broken invariant and abort the current operation.
///
/// Logs at error level, then panics with the error text. Continuing would
/// hand out recycled indexes or read cells that were never written.
#[cold]
#[track_caller]
pub fn fatal(err: TlsError) -> ! {
    let location = core::panic::Location::caller();
    crate::kerror!("fatal: {} (at {})", err, location);
    panic!("{}", err);
}
