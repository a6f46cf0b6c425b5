//! Slot liveness token
//!
//! Counts the callbacks that were wrapped by a slot and may still be queued
//! or running on some thread. A slot's index must not be recycled until the
//! count reaches zero, otherwise a stale callback could write into a cell
//! that now belongs to a different slot.
//!
//! The count and its condvar are the only lock/wait primitive in the
//! registry. Only the main thread waits; any thread may release.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

struct LivenessInner {
    outstanding: Mutex<usize>,
    drained: Condvar,
}

/// Shared outstanding-callback counter for one slot
#[derive(Clone)]
pub struct LivenessToken {
    inner: Arc<LivenessInner>,
}

impl LivenessToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LivenessInner {
                outstanding: Mutex::new(0),
                drained: Condvar::new(),
            }),
        }
    }

    /// Count one more outstanding callback; released when the guard drops
    pub fn guard(&self) -> LivenessGuard {
        *self.inner.outstanding.lock() += 1;
        LivenessGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Callbacks not yet released
    pub fn outstanding(&self) -> usize {
        *self.inner.outstanding.lock()
    }

    /// Block until every guard has been released
    pub fn wait_drained(&self) {
        let mut outstanding = self.inner.outstanding.lock();
        while *outstanding != 0 {
            self.inner.drained.wait(&mut outstanding);
        }
    }

    /// Like `wait_drained` with a deadline; `true` if drained
    pub fn wait_drained_for(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut outstanding = self.inner.outstanding.lock();
        while *outstanding != 0 {
            if self.inner.drained.wait_until(&mut outstanding, deadline).timed_out() {
                return *outstanding == 0;
            }
        }
        true
    }
}

impl Default for LivenessToken {
    fn default() -> Self {
        Self::new()
    }
}

/// One outstanding callback. Carried inside the wrapped callback.
pub struct LivenessGuard {
    inner: Arc<LivenessInner>,
}

impl LivenessGuard {
    fn release(&self) {
        let mut outstanding = self.inner.outstanding.lock();
        debug_assert!(*outstanding > 0);
        *outstanding -= 1;
        if *outstanding == 0 {
            self.inner.drained.notify_all();
        }
    }
}

impl Drop for LivenessGuard {
    fn drop(&mut self) {
        self.release();
    }
}
