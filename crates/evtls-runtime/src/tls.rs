//! Per-thread slot storage
//!
//! Every thread that takes part in slot traffic owns one `ThreadContext`.
//! Its event loop passes `&ThreadContext` to every callback it runs, so a
//! cell is only ever touched by code running on the owning thread. That is
//! the whole isolation story: no locks around cells.
//!
//! Cells are indexed by `SlotIndex` identically on every thread and grow
//! lazily on first write.

use std::any::Any;
use std::cell::{OnceCell, RefCell};
use std::sync::Arc;

use evtls_core::{fatal, kdebug, LifecycleState, SharedLifecycle, SlotIndex, TlsError};

use crate::dispatcher::DispatcherRef;

/// Opaque shared object stored in a cell
pub type ObjectRef = Arc<dyn Any + Send + Sync>;

struct Binding {
    dispatcher: DispatcherRef,
    lifecycle: SharedLifecycle,
}

/// Storage for one thread
pub struct ThreadContext {
    cells: RefCell<Vec<Option<ObjectRef>>>,
    binding: OnceCell<Binding>,
}

impl ThreadContext {
    /// Empty, unbound storage
    pub fn new() -> Self {
        Self {
            cells: RefCell::new(Vec::new()),
            binding: OnceCell::new(),
        }
    }

    /// Bind this storage to its thread's dispatcher and the registry
    /// lifecycle. Binding twice is fatal.
    pub fn bind(&self, dispatcher: DispatcherRef, lifecycle: SharedLifecycle) {
        let name = dispatcher.name().to_string();
        if self.binding.set(Binding { dispatcher, lifecycle }).is_err() {
            fatal(TlsError::DuplicateRegistration(name));
        }
    }

    #[inline]
    pub fn is_bound(&self) -> bool {
        self.binding.get().is_some()
    }

    /// This thread's dispatcher
    pub fn dispatcher(&self) -> &DispatcherRef {
        match self.binding.get() {
            Some(binding) => &binding.dispatcher,
            None => fatal(TlsError::DispatcherUnbound),
        }
    }

    /// Value stored at `idx`; `None` if cleared.
    ///
    /// Fatal if no broadcast has reached this thread for `idx` yet.
    pub fn get(&self, idx: SlotIndex) -> Option<ObjectRef> {
        let cell = self.cells.borrow().get(idx.as_usize()).cloned();
        match cell {
            Some(object) => object,
            None => fatal(TlsError::NotRegistered(idx)),
        }
    }

    /// Typed view of `get`; `None` if cleared or of another type
    pub fn get_typed<T: Any + Send + Sync>(&self, idx: SlotIndex) -> Option<Arc<T>> {
        self.get(idx).and_then(|obj| obj.downcast::<T>().ok())
    }

    /// Whether the cell sequence reaches `idx`
    #[inline]
    pub fn contains(&self, idx: SlotIndex) -> bool {
        self.cells.borrow().len() > idx.as_usize()
    }

    /// Store `object` at `idx`, growing the sequence if needed
    pub fn set(&self, idx: SlotIndex, object: ObjectRef) {
        let previous = {
            let mut cells = self.cells.borrow_mut();
            if cells.len() <= idx.as_usize() {
                cells.resize_with(idx.as_usize() + 1, || None);
            }
            cells[idx.as_usize()].replace(object)
        };
        // Dropped outside the borrow: destructors may read other cells
        drop(previous);
    }

    /// Empty the cell at `idx` if present
    pub fn clear(&self, idx: SlotIndex) {
        let previous = self
            .cells
            .borrow_mut()
            .get_mut(idx.as_usize())
            .and_then(Option::take);
        drop(previous);
    }

    /// Length of the cell sequence (not the number of set cells)
    #[inline]
    pub fn len(&self) -> usize {
        self.cells.borrow().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.borrow().is_empty()
    }

    /// Tear down all cells, highest index first.
    ///
    /// Low indexes belong to long-lived subsystems allocated early, so
    /// reverse index order approximates reverse dependency order. Fatal if
    /// the registry has not shut down.
    pub fn shutdown_thread(&self) {
        if let Some(binding) = self.binding.get() {
            let state = binding.lifecycle.load();
            if state != LifecycleState::Shutdown {
                fatal(TlsError::ShutdownOutOfOrder(state));
            }
        }
        let cleared = self.clear_all_reverse();
        kdebug!("thread storage shut down, {} cells cleared", cleared);
    }

    /// Pop cells from the back until empty, returning how many were popped
    pub(crate) fn clear_all_reverse(&self) -> usize {
        let mut popped = 0;
        loop {
            let last = self.cells.borrow_mut().pop();
            match last {
                Some(cell) => {
                    drop(cell);
                    popped += 1;
                }
                None => break,
            }
        }
        popped
    }
}

impl Default for ThreadContext {
    fn default() -> Self {
        Self::new()
    }
}
