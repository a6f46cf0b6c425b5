//! Linux futex-based loop parking
//!
//! Futex word semantics:
//! - 0 = no notification pending, parking allowed
//! - 1 = notification pending, park returns immediately
//!
//! `unpark` stores 1 before waking, so a FUTEX_WAIT that races with it sees
//! a changed word (EAGAIN) instead of sleeping through the post.

use super::LoopParking;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

/// Linux futex-based parking
pub struct FutexParking {
    /// Futex word: 0 = idle, 1 = notified
    futex: AtomicU32,

    /// Set while the owner is inside FUTEX_WAIT
    parked: AtomicBool,
}

impl FutexParking {
    pub fn new() -> Self {
        Self {
            futex: AtomicU32::new(0),
            parked: AtomicBool::new(false),
        }
    }

    fn futex_wait(&self, timeout: Option<Duration>) {
        let timespec = timeout.map(|d| libc::timespec {
            tv_sec: d.as_secs() as libc::time_t,
            tv_nsec: d.subsec_nanos() as libc::c_long,
        });
        let timespec_ptr = match &timespec {
            Some(ts) => ts as *const libc::timespec,
            None => std::ptr::null(),
        };

        // Sleeps only while the word is still 0. The result is ignored: wake,
        // timeout, EAGAIN and EINTR are all resolved by re-reading the word.
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.futex.as_ptr(),
                libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
                0u32,
                timespec_ptr,
                std::ptr::null::<u32>(),
                0u32,
            );
        }
    }
}

impl Default for FutexParking {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopParking for FutexParking {
    fn park(&self, timeout: Option<Duration>) -> bool {
        if self.futex.swap(0, Ordering::AcqRel) == 1 {
            return true;
        }

        self.parked.store(true, Ordering::SeqCst);
        self.futex_wait(timeout);
        self.parked.store(false, Ordering::SeqCst);

        self.futex.swap(0, Ordering::AcqRel) == 1
    }

    fn unpark(&self) {
        if self.futex.swap(1, Ordering::AcqRel) == 1 {
            // Already notified; the owner has not consumed it yet
            return;
        }
        if !self.parked.load(Ordering::SeqCst) {
            return;
        }

        unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.futex.as_ptr(),
                libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
                1i32,
                std::ptr::null::<libc::timespec>(),
                std::ptr::null::<u32>(),
                0u32,
            );
        }
    }

    fn is_parked(&self) -> bool {
        self.parked.load(Ordering::Relaxed)
    }
}
