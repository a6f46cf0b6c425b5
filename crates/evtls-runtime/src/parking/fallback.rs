//! Condvar-based loop parking
//!
//! Used on platforms without futex support.

use super::LoopParking;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Condvar-based parking (fallback)
pub struct CondvarParking {
    /// Pending notification
    notified: Mutex<bool>,

    condvar: Condvar,

    parked: AtomicBool,
}

impl CondvarParking {
    pub fn new() -> Self {
        Self {
            notified: Mutex::new(false),
            condvar: Condvar::new(),
            parked: AtomicBool::new(false),
        }
    }
}

impl Default for CondvarParking {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopParking for CondvarParking {
    fn park(&self, timeout: Option<Duration>) -> bool {
        let mut notified = self.notified.lock();

        if !*notified {
            self.parked.store(true, Ordering::SeqCst);
            match timeout {
                Some(t) => {
                    self.condvar.wait_for(&mut notified, t);
                }
                None => {
                    while !*notified {
                        self.condvar.wait(&mut notified);
                    }
                }
            }
            self.parked.store(false, Ordering::SeqCst);
        }

        std::mem::replace(&mut *notified, false)
    }

    fn unpark(&self) {
        let mut notified = self.notified.lock();
        *notified = true;
        self.condvar.notify_one();
    }

    fn is_parked(&self) -> bool {
        self.parked.load(Ordering::Relaxed)
    }
}
