//! # evtls-core
//!
//! Core types for evtls, the slot-based thread-local coordination layer.
//!
//! This crate is platform-agnostic and knows nothing about threads or
//! dispatchers. Everything that posts callbacks lives in `evtls-runtime`.
//!
//! ## Modules
//!
//! - `id` - Slot index newtype
//! - `state` - Registry lifecycle state (shared with worker threads)
//! - `slot` - Slot index table with FIFO free list
//! - `error` - Error types and fatal invariant reporting
//! - `kprint` - Kernel-style debug printing macros
//! - `env` - Environment variable utilities

pub mod id;
pub mod state;
pub mod slot;
pub mod error;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use id::SlotIndex;
pub use state::{LifecycleState, SharedLifecycle};
pub use slot::SlotTable;
pub use error::{fatal, ConfigError, TlsError, TlsResult};
pub use env::{env_get, env_get_bool, env_get_millis, env_get_opt, env_get_str, env_is_set};
