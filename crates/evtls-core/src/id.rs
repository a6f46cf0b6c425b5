//! Slot index type

use core::fmt;

/// Index of a slot in the registry and in every thread's cell sequence.
///
/// The same index addresses the same logical variable on every thread.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct SlotIndex(u32);

impl SlotIndex {
    /// Create a slot index from a raw value
    #[inline]
    pub const fn new(index: u32) -> Self {
        SlotIndex(index)
    }

    /// Get the raw u32 value
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Get as usize for indexing cell sequences
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for SlotIndex {
    #[inline]
    fn from(index: u32) -> Self {
        SlotIndex(index)
    }
}

impl From<SlotIndex> for u32 {
    #[inline]
    fn from(index: SlotIndex) -> Self {
        index.0
    }
}

impl fmt::Debug for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SlotIndex({})", self.0)
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
