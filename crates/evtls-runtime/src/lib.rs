//! # evtls-runtime
//!
//! Slot-based thread-local coordination for servers that run one event
//! loop per thread.
//!
//! This crate provides:
//! - `Dispatcher` trait and the `LoopDispatcher` event loop
//! - `ThreadContext`, the per-thread cell storage passed to every callback
//! - `Instance`, the main-thread registry of slots and dispatchers
//! - `Slot`, the handle for one cross-thread variable
//! - `WorkerPool`, OS threads that each drive a `LoopDispatcher`
//! - Loop parking (futex on Linux, condvar elsewhere)

pub mod config;
pub mod parking;
pub mod dispatcher;
pub mod tls;
pub mod liveness;
pub mod broadcast;
pub mod registry;
pub mod slot;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use config::RuntimeConfig;
pub use dispatcher::{Dispatcher, DispatcherRef, DispatcherStats, LoopDispatcher, PostCb};
pub use tls::{ObjectRef, ThreadContext};
pub use liveness::{LivenessGuard, LivenessToken};
pub use broadcast::{BroadcastCb, CompletionCb, CompletionGuard, CompletionTicket};
pub use registry::Instance;
pub use slot::Slot;
pub use worker::WorkerPool;
pub use parking::{new_parking, LoopParking};
