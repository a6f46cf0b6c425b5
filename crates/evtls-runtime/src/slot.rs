//! Slot handles
//!
//! A `Slot` is the main thread's handle to one cross-thread variable: one
//! cell per thread, all at the same index. Every callback the handle sends
//! to another thread carries a liveness guard, and dropping the handle
//! waits (while Running) until those guards are gone before the index is
//! returned to the free list.

use std::any::Any;
use std::rc::Rc;
use std::sync::Arc;

use evtls_core::{kdebug, LifecycleState, SlotIndex};

use crate::broadcast::BroadcastCb;
use crate::dispatcher::DispatcherRef;
use crate::liveness::LivenessToken;
use crate::registry::Registry;
use crate::tls::{ObjectRef, ThreadContext};

/// Handle to one logical thread-local variable
pub struct Slot {
    registry: Rc<Registry>,
    index: SlotIndex,
    liveness: LivenessToken,
}

impl Slot {
    pub(crate) fn new(registry: Rc<Registry>, index: SlotIndex, liveness: LivenessToken) -> Self {
        Self {
            registry,
            index,
            liveness,
        }
    }

    /// Index of this slot's cell on every thread
    #[inline]
    pub fn index(&self) -> SlotIndex {
        self.index
    }

    /// Main thread's value; `None` if cleared.
    ///
    /// Fatal unless a `set` or update has already reached the main thread.
    /// Workers read their own value with `ThreadContext::get(slot.index())`.
    pub fn get(&self) -> Option<ObjectRef> {
        self.registry.main_context().get(self.index)
    }

    pub fn get_typed<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.registry.main_context().get_typed(self.index)
    }

    /// Whether the main thread's cells reach this slot
    pub fn current_thread_registered(&self) -> bool {
        self.registry.main_context().contains(self.index)
    }

    /// Callbacks sent through this handle that have not finished yet
    pub fn outstanding_callbacks(&self) -> usize {
        self.liveness.outstanding()
    }

    /// Attach a liveness guard; the guard lives as long as any copy of the
    /// returned callback.
    fn wrap(&self, cb: BroadcastCb) -> BroadcastCb {
        let guard = self.liveness.guard();
        Arc::new(move |ctx: &ThreadContext| {
            let _alive = &guard;
            cb(ctx)
        })
    }

    /// Give every thread its own value.
    ///
    /// Each worker computes its value on its own thread by calling `init`
    /// with its dispatcher; the main thread's value is computed before this
    /// returns.
    pub fn set<F>(&self, init: F)
    where
        F: Fn(&DispatcherRef) -> ObjectRef + Send + Sync + 'static,
    {
        let registry = &self.registry;
        registry.assert_main_thread();
        registry.assert_not_shutdown("set");

        let init = Arc::new(init);
        let index = self.index;
        for worker in registry.workers() {
            let init = Arc::clone(&init);
            let wrapped = self.wrap(Arc::new(move |ctx: &ThreadContext| {
                ctx.set(index, init(ctx.dispatcher()));
            }));
            worker.post(Box::new(move |ctx| wrapped(ctx)));
        }

        let main_ctx = registry.main_context();
        main_ctx.set(index, init(main_ctx.dispatcher()));
    }

    /// Run `cb` on every thread (main first, synchronously)
    pub fn run_on_all_threads<F>(&self, cb: F)
    where
        F: Fn(&ThreadContext) + Send + Sync + 'static,
    {
        self.registry.run_on_all_threads(self.wrap(Arc::new(cb)));
    }

    /// Run `cb` on every thread, then `completion` once on the main thread
    /// after the last worker has run its copy
    pub fn run_on_all_threads_with_completion<F, C>(&self, cb: F, completion: C)
    where
        F: Fn(&ThreadContext) + Send + Sync + 'static,
        C: FnOnce(&ThreadContext) + Send + 'static,
    {
        self.registry
            .run_on_all_threads_with_completion(self.wrap(Arc::new(cb)), Box::new(completion));
    }

    /// Replace every thread's value with `update(current)`
    pub fn update_on_all_threads<U>(&self, update: U)
    where
        U: Fn(Option<ObjectRef>) -> ObjectRef + Send + Sync + 'static,
    {
        self.run_on_all_threads(Self::updater(self.index, update));
    }

    /// `update_on_all_threads`, then `completion` on the main thread once
    /// every thread has applied the update
    pub fn update_on_all_threads_with_completion<U, C>(&self, update: U, completion: C)
    where
        U: Fn(Option<ObjectRef>) -> ObjectRef + Send + Sync + 'static,
        C: FnOnce(&ThreadContext) + Send + 'static,
    {
        self.run_on_all_threads_with_completion(Self::updater(self.index, update), completion);
    }

    fn updater<U>(index: SlotIndex, update: U) -> impl Fn(&ThreadContext) + Send + Sync + 'static
    where
        U: Fn(Option<ObjectRef>) -> ObjectRef + Send + Sync + 'static,
    {
        move |ctx: &ThreadContext| {
            let current = ctx.get(index);
            ctx.set(index, update(current));
        }
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        // Initializing: workers are not draining, nothing to race with.
        // Shutdown: workers have exited and removal is a no-op.
        if self.registry.state() == LifecycleState::Running {
            let outstanding = self.liveness.outstanding();
            if outstanding > 0 {
                kdebug!("slot {} waiting for {} callbacks", self.index, outstanding);
            }
            self.liveness.wait_drained();
        }
        self.registry.remove_slot(self.index);
    }
}

impl std::fmt::Debug for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slot")
            .field("index", &self.index)
            .field("outstanding", &self.liveness.outstanding())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::Harness;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_update_applies_on_every_thread() {
        let h = Harness::new(2);
        let slot = h.instance.allocate_slot();
        slot.set(|_| Arc::new(1u64));
        slot.update_on_all_threads(|current| {
            let n = current.and_then(|v| v.downcast::<u64>().ok()).map_or(0, |v| *v);
            Arc::new(n + 10)
        });

        assert_eq!(*slot.get_typed::<u64>().unwrap(), 11);
        h.drain_workers();
        for i in 0..2 {
            assert_eq!(*h.worker_ctx(i).get_typed::<u64>(slot.index()).unwrap(), 11);
        }
        h.shutdown();
    }

    #[test]
    fn test_completion_waits_for_slowest_worker() {
        let h = Harness::new(3);
        let slot = h.instance.allocate_slot();
        slot.set(|_| Arc::new(0u64));
        h.drain_workers();

        let runs = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(None));
        let counter = runs.clone();
        let observed = seen.clone();
        let probe = runs.clone();
        slot.update_on_all_threads_with_completion(
            move |current| {
                counter.fetch_add(1, Ordering::SeqCst);
                let n = current.and_then(|v| v.downcast::<u64>().ok()).map_or(0, |v| *v);
                Arc::new(n + 1)
            },
            move |_| {
                *observed.lock() = Some(probe.load(Ordering::SeqCst));
            },
        );

        h.drain_worker(0);
        h.drain_worker(1);
        assert_eq!(h.drain_main(), 0);
        assert!(seen.lock().is_none());

        h.drain_worker(2);
        assert_eq!(h.drain_main(), 1);
        assert_eq!(*seen.lock(), Some(4));
        assert_eq!(runs.load(Ordering::SeqCst), 4);
        h.shutdown();
    }

    #[test]
    fn test_callbacks_hold_liveness_until_run() {
        let h = Harness::new(2);
        let slot = h.instance.allocate_slot();

        // One guard per worker: each set callback is wrapped separately
        slot.set(|_| Arc::new(()));
        assert_eq!(slot.outstanding_callbacks(), 2);
        assert_eq!(h.instance.outstanding_callbacks(slot.index()), Some(2));
        h.drain_worker(0);
        assert_eq!(slot.outstanding_callbacks(), 1);
        h.drain_worker(1);
        assert_eq!(slot.outstanding_callbacks(), 0);

        // One shared guard for a broadcast, released by the last copy
        slot.run_on_all_threads(|_| {});
        assert_eq!(slot.outstanding_callbacks(), 1);
        h.drain_worker(0);
        assert_eq!(slot.outstanding_callbacks(), 1);
        h.drain_worker(1);
        assert_eq!(slot.outstanding_callbacks(), 0);

        h.shutdown();
    }

    #[test]
    fn test_completion_releases_liveness_before_it_runs() {
        let h = Harness::new(1);
        let slot = h.instance.allocate_slot();
        let token_view = Arc::new(AtomicUsize::new(usize::MAX));
        let view = token_view.clone();
        let idx = slot.index();

        slot.run_on_all_threads_with_completion(|_| {}, move |_| view.store(idx.as_usize(), Ordering::SeqCst));
        assert_eq!(slot.outstanding_callbacks(), 1);
        h.drain_worker(0);
        assert_eq!(slot.outstanding_callbacks(), 0);
        h.drain_main();
        assert_eq!(token_view.load(Ordering::SeqCst), idx.as_usize());
        h.shutdown();
    }

    #[test]
    fn test_current_thread_registered() {
        let h = Harness::new(0);
        let a = h.instance.allocate_slot();
        let b = h.instance.allocate_slot();
        assert!(!b.current_thread_registered());

        b.set(|_| Arc::new(()));
        assert!(a.current_thread_registered());
        assert!(b.current_thread_registered());
        assert!(a.get().is_none());
        h.shutdown();
    }

    #[test]
    #[should_panic(expected = "not present on this thread")]
    fn test_get_before_set_is_fatal() {
        let h = Harness::new(0);
        let slot = h.instance.allocate_slot();
        let _ = slot.get();
    }

    #[test]
    #[should_panic(expected = "set called after shutdown")]
    fn test_set_after_shutdown_is_fatal() {
        let h = Harness::new(0);
        let slot = h.instance.allocate_slot();
        h.instance.begin_shutdown();
        slot.set(|_| Arc::new(()));
    }
}
