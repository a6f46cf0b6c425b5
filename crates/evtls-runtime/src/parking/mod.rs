//! Event loop parking
//!
//! An idle loop parks its thread until a post arrives. There is exactly one
//! parker per loop (the loop's own thread) and any number of unparkers
//! (every thread that posts to it).
//!
//! A notification is sticky: `unpark()` before `park()` makes the next
//! `park()` return immediately. The loop checks its queue, finds it empty,
//! and parks; a post that lands in between is never lost.

use std::time::Duration;

/// Platform-specific loop parking mechanism
pub trait LoopParking: Send + Sync {
    /// Park the calling thread until unparked or timeout.
    ///
    /// Returns `true` if a notification was consumed, `false` on timeout
    /// or spurious wakeup. Callers re-check their queue either way.
    fn park(&self, timeout: Option<Duration>) -> bool;

    /// Wake the parked thread, or make its next park return immediately
    fn unpark(&self);

    /// Whether the owning thread is currently parked (hint, may be stale)
    fn is_parked(&self) -> bool;
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod futex_linux;
        pub use futex_linux::FutexParking as PlatformParking;
    } else {
        mod fallback;
        pub use fallback::CondvarParking as PlatformParking;
    }
}

/// Create a new platform-appropriate parking instance
pub fn new_parking() -> Box<dyn LoopParking> {
    Box::new(PlatformParking::new())
}
