//! Registry lifecycle state
//!
//! The state is monotonic: Initializing -> Running -> Shutdown, with a
//! direct Initializing -> Shutdown edge for failed startups. It is mutated
//! only by the main thread but read from worker threads during their
//! shutdown, so it lives behind a shared atomic.

use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::error::{fatal, TlsError};

/// Lifecycle state of the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LifecycleState {
    /// Slots may be allocated and set; workers are not draining yet
    Initializing = 0,

    /// Workers drain their queues; slot destruction must synchronize
    Running = 1,

    /// Terminal; no allocation, registration or broadcast
    Shutdown = 2,
}

impl LifecycleState {
    /// Check if no further transitions are possible
    #[inline]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Shutdown)
    }

    /// Check if a transition to `to` is legal from this state
    #[inline]
    pub const fn can_transition_to(&self, to: LifecycleState) -> bool {
        matches!(
            (self, to),
            (LifecycleState::Initializing, LifecycleState::Running)
                | (LifecycleState::Initializing, LifecycleState::Shutdown)
                | (LifecycleState::Running, LifecycleState::Shutdown)
        )
    }
}

impl From<u8> for LifecycleState {
    fn from(v: u8) -> Self {
        match v {
            0 => LifecycleState::Initializing,
            1 => LifecycleState::Running,
            _ => LifecycleState::Shutdown,
        }
    }
}

impl From<LifecycleState> for u8 {
    fn from(state: LifecycleState) -> u8 {
        state as u8
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Initializing => write!(f, "initializing"),
            LifecycleState::Running => write!(f, "running"),
            LifecycleState::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Lifecycle state shared between the registry and the threads it drives.
///
/// Cloning yields another handle to the same state.
#[derive(Debug, Clone)]
pub struct SharedLifecycle {
    state: Arc<AtomicU8>,
}

impl SharedLifecycle {
    /// Create a new lifecycle in the Initializing state
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(LifecycleState::Initializing as u8)),
        }
    }

    /// Current state
    #[inline]
    pub fn load(&self) -> LifecycleState {
        LifecycleState::from(self.state.load(Ordering::Acquire))
    }

    /// Move to `to`, returning the previous state.
    ///
    /// An illegal transition is fatal.
    pub fn transition(&self, to: LifecycleState) -> LifecycleState {
        let from = self.load();
        if !from.can_transition_to(to) {
            fatal(TlsError::InvalidTransition { from, to });
        }
        self.state.store(to as u8, Ordering::Release);
        from
    }
}

impl Default for SharedLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
