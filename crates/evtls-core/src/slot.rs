//! Slot index table
//!
//! Owns the slot index space: an ordered sequence of entries where `None`
//! marks a freed index, plus a FIFO queue of freed indexes. Freed indexes
//! are reused oldest first; the sequence only grows when the queue is empty.
//!
//! The table is single-owner (`&mut self`); the registry keeps it on the
//! main thread.

use std::collections::VecDeque;

use crate::error::{fatal, TlsError};
use crate::id::SlotIndex;

/// Slot index allocator with a FIFO free list
pub struct SlotTable<T> {
    /// Back-reference per index; `None` = free
    entries: Vec<Option<T>>,

    /// Freed indexes, oldest first
    free: VecDeque<SlotIndex>,
}

impl<T> SlotTable<T> {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            free: VecDeque::new(),
        }
    }

    /// Bind `entry` to an index, returning it.
    ///
    /// Reuses the oldest freed index if there is one, otherwise appends.
    pub fn allocate(&mut self, entry: T) -> SlotIndex {
        if let Some(idx) = self.free.pop_front() {
            debug_assert!(idx.as_usize() < self.entries.len());
            debug_assert!(self.entries[idx.as_usize()].is_none());
            self.entries[idx.as_usize()] = Some(entry);
            return idx;
        }

        let idx = SlotIndex::new(self.entries.len() as u32);
        self.entries.push(Some(entry));
        idx
    }

    /// Free `idx`, returning its entry.
    ///
    /// Freeing an index twice, or one that was never handed out, is fatal.
    pub fn release(&mut self, idx: SlotIndex) -> T {
        if self.free.contains(&idx) {
            fatal(TlsError::DuplicateFree(idx));
        }
        let entry = match self.entries.get_mut(idx.as_usize()).and_then(Option::take) {
            Some(entry) => entry,
            None => fatal(TlsError::SlotNotAllocated(idx)),
        };
        self.free.push_back(idx);
        entry
    }

    /// Entry bound to `idx`, if live
    #[inline]
    pub fn get(&self, idx: SlotIndex) -> Option<&T> {
        self.entries.get(idx.as_usize()).and_then(Option::as_ref)
    }

    /// Size of the index space (live + free)
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of indexes currently bound
    #[inline]
    pub fn live_count(&self) -> usize {
        self.entries.len() - self.free.len()
    }

    /// Number of indexes waiting for reuse
    #[inline]
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Freed indexes in reuse order
    pub fn free_indexes(&self) -> impl Iterator<Item = SlotIndex> + '_ {
        self.free.iter().copied()
    }
}

impl<T> Default for SlotTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_sequential() {
        let mut table = SlotTable::new();

        assert_eq!(table.allocate("a").as_u32(), 0);
        assert_eq!(table.allocate("b").as_u32(), 1);
        assert_eq!(table.allocate("c").as_u32(), 2);
        assert_eq!(table.len(), 3);
        assert_eq!(table.live_count(), 3);
        assert_eq!(table.free_count(), 0);
    }

    #[test]
    fn test_release_reuse_is_fifo() {
        let mut table = SlotTable::new();
        let a = table.allocate(0);
        let b = table.allocate(1);
        let c = table.allocate(2);

        assert_eq!(table.release(c), 2);
        assert_eq!(table.release(a), 0);
        assert_eq!(table.free_indexes().collect::<Vec<_>>(), vec![c, a]);

        // Oldest freed first, not most recent
        assert_eq!(table.allocate(10), c);
        assert_eq!(table.allocate(11), a);
        assert_eq!(table.get(b), Some(&1));

        // Free list drained, grows again
        assert_eq!(table.allocate(12).as_u32(), 3);
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn test_free_entries_are_empty() {
        let mut table = SlotTable::new();
        let a = table.allocate('x');
        table.release(a);
        assert!(table.get(a).is_none());
        assert_eq!(table.live_count(), 0);
        assert_eq!(table.free_count(), 1);
    }

    #[test]
    #[should_panic(expected = "already in free slot set")]
    fn test_double_release_is_fatal() {
        crate::kprint::set_log_level(crate::kprint::LogLevel::Off);
        let mut table = SlotTable::new();
        let a = table.allocate(());
        table.release(a);
        table.release(a);
    }

    #[test]
    #[should_panic(expected = "is not allocated")]
    fn test_release_unknown_is_fatal() {
        crate::kprint::set_log_level(crate::kprint::LogLevel::Off);
        let mut table: SlotTable<()> = SlotTable::new();
        table.release(SlotIndex::new(4));
    }

    #[test]
    fn test_no_two_live_entries_share_an_index() {
        let mut table = SlotTable::new();
        let mut live = Vec::new();
        for round in 0..50u32 {
            live.push(table.allocate(round));
            if round % 3 == 0 {
                let idx = live.remove(0);
                table.release(idx);
            }
        }
        let mut seen: Vec<_> = live.iter().map(|i| i.as_u32()).collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), live.len());
        assert_eq!(table.live_count(), live.len());
    }
}
