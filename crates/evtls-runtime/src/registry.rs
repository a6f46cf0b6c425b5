//! Slot registry
//!
//! `Instance` is owned by the main thread. It holds the slot index space,
//! the registered worker dispatchers, the main dispatcher and its storage,
//! and the lifecycle state. Every mutating operation checks that it runs on
//! the thread that created the instance; the handle is `!Send`, so that
//! check is a backstop rather than the primary guard.
//!
//! Lifecycle: Initializing -> Running -> Shutdown. While Initializing the
//! workers are registered but not draining their queues, so destroying a
//! slot does not wait for them. From Running on, slot destruction blocks
//! until every callback the slot posted has finished. Once Shutdown, slot
//! removal is a no-op and nothing may be allocated or broadcast.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use evtls_core::{
    fatal, kdebug, kwarn, LifecycleState, SharedLifecycle, SlotIndex, SlotTable, TlsError,
};

use crate::broadcast::{self, BroadcastCb, CompletionCb};
use crate::dispatcher::{same_dispatcher, DispatcherRef};
use crate::liveness::LivenessToken;
use crate::slot::Slot;
use crate::tls::ThreadContext;

/// Registry's back-reference to a live slot
pub(crate) struct SlotEntry {
    liveness: LivenessToken,
}

pub(crate) struct Registry {
    main_thread: ThreadId,
    lifecycle: SharedLifecycle,
    main_context: Rc<ThreadContext>,
    main_dispatcher: RefCell<Option<DispatcherRef>>,
    workers: RefCell<Vec<DispatcherRef>>,
    slots: RefCell<SlotTable<SlotEntry>>,
}

impl Registry {
    #[track_caller]
    pub(crate) fn assert_main_thread(&self) {
        if thread::current().id() != self.main_thread {
            fatal(TlsError::NotMainThread);
        }
    }

    #[track_caller]
    pub(crate) fn assert_not_shutdown(&self, op: &'static str) {
        if self.lifecycle.load() == LifecycleState::Shutdown {
            fatal(TlsError::AfterShutdown(op));
        }
    }

    #[inline]
    pub(crate) fn state(&self) -> LifecycleState {
        self.lifecycle.load()
    }

    #[inline]
    pub(crate) fn main_context(&self) -> &ThreadContext {
        &self.main_context
    }

    pub(crate) fn main_dispatcher(&self) -> DispatcherRef {
        match self.main_dispatcher.borrow().as_ref() {
            Some(dispatcher) => Arc::clone(dispatcher),
            None => fatal(TlsError::DispatcherUnbound),
        }
    }

    /// Snapshot so no borrow is held while callbacks run
    pub(crate) fn workers(&self) -> Vec<DispatcherRef> {
        self.workers.borrow().clone()
    }

    pub(crate) fn run_on_all_threads(&self, cb: BroadcastCb) {
        self.assert_main_thread();
        self.assert_not_shutdown("run_on_all_threads");

        let workers = self.workers();
        broadcast::broadcast(&self.main_context, &workers, cb);
    }

    pub(crate) fn run_on_all_threads_with_completion(&self, cb: BroadcastCb, completion: CompletionCb) {
        self.assert_main_thread();
        self.assert_not_shutdown("run_on_all_threads");

        let workers = self.workers();
        let main = self.main_dispatcher();
        broadcast::broadcast_with_completion(&self.main_context, &main, &workers, cb, completion);
    }

    /// Free `idx` and clear its cell on every thread.
    ///
    /// The clear is posted, so it is sequenced before anything a future
    /// owner of the index posts to the same thread.
    pub(crate) fn remove_slot(&self, idx: SlotIndex) {
        self.assert_main_thread();

        // Workers are gone and nothing is allocated past this point;
        // shutdown_thread() cleans up their cells.
        if self.state() == LifecycleState::Shutdown {
            return;
        }

        self.slots.borrow_mut().release(idx);
        kdebug!("slot {} freed", idx);

        self.run_on_all_threads(Arc::new(move |ctx: &ThreadContext| ctx.clear(idx)));
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        if self.state() != LifecycleState::Shutdown && !thread::panicking() {
            kwarn!("registry dropped while {}", self.state());
        }
        self.main_context.clear_all_reverse();
    }
}

/// Main-thread registry of slots and dispatchers
pub struct Instance {
    inner: Rc<Registry>,
}

impl Instance {
    /// Create a registry owned by the calling thread
    pub fn new() -> Self {
        Self {
            inner: Rc::new(Registry {
                main_thread: thread::current().id(),
                lifecycle: SharedLifecycle::new(),
                main_context: Rc::new(ThreadContext::new()),
                main_dispatcher: RefCell::new(None),
                workers: RefCell::new(Vec::new()),
                slots: RefCell::new(SlotTable::new()),
            }),
        }
    }

    /// Register a thread's dispatcher.
    ///
    /// The main dispatcher is bound to the main storage immediately. A
    /// worker's storage is bound by a callback posted to the worker, so the
    /// binding runs before any slot traffic sent to it afterwards.
    pub fn register_thread(&self, dispatcher: DispatcherRef, is_main: bool) {
        let inner = &self.inner;
        inner.assert_main_thread();
        inner.assert_not_shutdown("register_thread");

        if is_main {
            kdebug!("registered main dispatcher {}", dispatcher.name());
            *inner.main_dispatcher.borrow_mut() = Some(Arc::clone(&dispatcher));
            inner.main_context.bind(dispatcher, inner.lifecycle.clone());
            return;
        }

        {
            let mut workers = inner.workers.borrow_mut();
            if workers.iter().any(|w| same_dispatcher(w, &dispatcher)) {
                fatal(TlsError::DuplicateRegistration(dispatcher.name().to_string()));
            }
            workers.push(Arc::clone(&dispatcher));
        }
        kdebug!("registered worker dispatcher {}", dispatcher.name());

        let lifecycle = inner.lifecycle.clone();
        let bound = Arc::clone(&dispatcher);
        dispatcher.post(Box::new(move |ctx| ctx.bind(bound, lifecycle)));
    }

    /// Allocate a slot, reusing the oldest freed index if any
    pub fn allocate_slot(&self) -> Slot {
        let inner = &self.inner;
        inner.assert_main_thread();
        inner.assert_not_shutdown("allocate_slot");

        let liveness = LivenessToken::new();
        let idx = inner.slots.borrow_mut().allocate(SlotEntry {
            liveness: liveness.clone(),
        });
        kdebug!("slot {} allocated", idx);
        Slot::new(Rc::clone(inner), idx, liveness)
    }

    /// Run `cb` on the main thread now and on every worker later
    pub fn run_on_all_threads<F>(&self, cb: F)
    where
        F: Fn(&ThreadContext) + Send + Sync + 'static,
    {
        self.inner.run_on_all_threads(Arc::new(cb));
    }

    /// Like `run_on_all_threads`, then run `completion` on the main thread
    /// once every worker has run its copy
    pub fn run_on_all_threads_with_completion<F, C>(&self, cb: F, completion: C)
    where
        F: Fn(&ThreadContext) + Send + Sync + 'static,
        C: FnOnce(&ThreadContext) + Send + 'static,
    {
        self.inner
            .run_on_all_threads_with_completion(Arc::new(cb), Box::new(completion));
    }

    /// Initializing -> Running
    pub fn start_running(&self) {
        self.inner.assert_main_thread();
        self.inner.lifecycle.transition(LifecycleState::Running);
        kdebug!("registry running with {} workers", self.registered_thread_count());
    }

    /// Running (or Initializing) -> Shutdown
    pub fn begin_shutdown(&self) {
        self.inner.assert_main_thread();
        self.inner.assert_not_shutdown("begin_shutdown");
        let from = self.inner.lifecycle.transition(LifecycleState::Shutdown);
        kdebug!("registry shutdown (was {})", from);
    }

    /// Tear down the main thread's own cells, highest index first
    pub fn finish_thread_shutdown(&self) {
        self.inner.assert_main_thread();
        self.inner.main_context.shutdown_thread();
    }

    #[inline]
    pub fn state(&self) -> LifecycleState {
        self.inner.state()
    }

    /// Shared lifecycle, for storage not bound through `register_thread`
    pub fn lifecycle(&self) -> SharedLifecycle {
        self.inner.lifecycle.clone()
    }

    /// Main thread's storage; pass it to whatever drains the main loop
    pub fn main_context(&self) -> Rc<ThreadContext> {
        Rc::clone(&self.inner.main_context)
    }

    /// The calling (main) thread's dispatcher
    pub fn dispatcher(&self) -> &DispatcherRef {
        self.inner.main_context.dispatcher()
    }

    pub fn main_dispatcher(&self) -> DispatcherRef {
        self.inner.main_dispatcher()
    }

    /// Registered workers (main excluded)
    pub fn registered_thread_count(&self) -> usize {
        self.inner.workers.borrow().len()
    }

    /// Size of the index space
    pub fn slot_count(&self) -> usize {
        self.inner.slots.borrow().len()
    }

    pub fn live_slot_count(&self) -> usize {
        self.inner.slots.borrow().live_count()
    }

    pub fn free_slot_count(&self) -> usize {
        self.inner.slots.borrow().free_count()
    }

    /// Freed indexes in reuse order
    pub fn free_slot_indexes(&self) -> Vec<SlotIndex> {
        self.inner.slots.borrow().free_indexes().collect()
    }

    /// Callbacks posted by the slot at `idx` that have not finished yet
    pub fn outstanding_callbacks(&self, idx: SlotIndex) -> Option<usize> {
        self.inner
            .slots
            .borrow()
            .get(idx)
            .map(|entry| entry.liveness.outstanding())
    }
}

impl Default for Instance {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::{Dispatcher, LoopDispatcher};
    use crate::testing::Harness;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    fn label(s: &'static str) -> impl Fn(&DispatcherRef) -> crate::ObjectRef + Send + Sync + 'static {
        move |_| Arc::new(s)
    }

    #[test]
    fn test_freed_index_is_reused_without_disturbing_neighbours() {
        let h = Harness::new(0);
        let a = h.instance.allocate_slot();
        let b = h.instance.allocate_slot();
        assert_eq!(a.index().as_u32(), 0);
        assert_eq!(b.index().as_u32(), 1);

        b.set(label("b"));
        drop(a);
        assert_eq!(h.instance.free_slot_indexes(), vec![SlotIndex::new(0)]);

        let c = h.instance.allocate_slot();
        assert_eq!(c.index().as_u32(), 0);
        c.set(label("c"));

        assert_eq!(*b.get_typed::<&'static str>().unwrap(), "b");
        assert_eq!(*c.get_typed::<&'static str>().unwrap(), "c");
        assert_eq!(h.instance.slot_count(), 2);
        assert_eq!(h.instance.free_slot_count(), 0);

        h.shutdown();
    }

    #[test]
    fn test_free_list_is_fifo() {
        let h = Harness::new(0);
        let slots: Vec<_> = (0..4).map(|_| h.instance.allocate_slot()).collect();
        let mut slots = slots.into_iter();
        let s0 = slots.next().unwrap();
        let s1 = slots.next().unwrap();
        let s2 = slots.next().unwrap();
        let _s3 = slots.next().unwrap();

        drop(s2);
        drop(s0);
        assert_eq!(
            h.instance.free_slot_indexes(),
            vec![SlotIndex::new(2), SlotIndex::new(0)]
        );
        assert_eq!(h.instance.live_slot_count(), 2);

        let next = h.instance.allocate_slot();
        assert_eq!(next.index().as_u32(), 2);
        drop(s1);
        h.shutdown();
    }

    #[test]
    fn test_worker_binding_arrives_by_post() {
        let h = Harness::new(1);
        assert!(!h.worker_ctx(0).is_bound());
        assert_eq!(h.worker(0).pending(), 1);

        h.drain_worker(0);
        assert!(h.worker_ctx(0).is_bound());
        assert_eq!(h.worker_ctx(0).dispatcher().name(), "worker-0");
        assert_eq!(h.instance.registered_thread_count(), 1);
        assert_eq!(h.instance.dispatcher().name(), "main");
        h.shutdown();
    }

    #[test]
    fn test_each_thread_sees_its_own_value() {
        let h = Harness::new(2);
        let slot = h.instance.allocate_slot();
        slot.set(|d: &DispatcherRef| Arc::new(d.name().to_string()));

        assert_eq!(*slot.get_typed::<String>().unwrap(), "main");
        h.drain_workers();
        let idx = slot.index();
        assert_eq!(*h.worker_ctx(0).get_typed::<String>(idx).unwrap(), "worker-0");
        assert_eq!(*h.worker_ctx(1).get_typed::<String>(idx).unwrap(), "worker-1");

        h.shutdown();
    }

    #[test]
    fn test_removal_clears_every_thread() {
        let h = Harness::new(2);
        let slot = h.instance.allocate_slot();
        let idx = slot.index();
        slot.set(label("x"));
        h.drain_workers();

        drop(slot);
        assert!(h.instance.main_context().get(idx).is_none());
        // Worker cells still hold the value until the clear is drained
        assert!(h.worker_ctx(0).get(idx).is_some());

        h.drain_workers();
        assert!(h.worker_ctx(0).get(idx).is_none());
        assert!(h.worker_ctx(1).get(idx).is_none());
        h.shutdown();
    }

    #[test]
    fn test_clear_is_sequenced_before_next_owner() {
        let h = Harness::new(1);
        let old = h.instance.allocate_slot();
        old.set(label("old"));
        drop(old);

        // Nothing drained yet: the worker queue holds bind, set(old), clear
        let new = h.instance.allocate_slot();
        assert_eq!(new.index().as_u32(), 0);
        new.set(label("new"));

        h.drain_workers();
        assert_eq!(*h.worker_ctx(0).get_typed::<&'static str>(new.index()).unwrap(), "new");
        h.shutdown();
    }

    #[test]
    fn test_completion_with_no_workers_goes_to_main_loop() {
        let h = Harness::new(0);
        let done = Arc::new(AtomicBool::new(false));
        let flag = done.clone();
        h.instance
            .run_on_all_threads_with_completion(|_| {}, move |_| flag.store(true, Ordering::SeqCst));

        assert!(!done.load(Ordering::SeqCst));
        assert_eq!(h.drain_main(), 1);
        assert!(done.load(Ordering::SeqCst));
        h.shutdown();
    }

    #[test]
    fn test_main_teardown_in_reverse_index_order() {
        struct Probe(usize, Arc<Mutex<Vec<usize>>>);
        impl Drop for Probe {
            fn drop(&mut self) {
                self.1.lock().push(self.0);
            }
        }

        let h = Harness::new(0);
        let order = Arc::new(Mutex::new(Vec::new()));
        let slots: Vec<_> = (0..3)
            .map(|i| {
                let slot = h.instance.allocate_slot();
                let order = order.clone();
                slot.set(move |_| Arc::new(Probe(i, order.clone())));
                slot
            })
            .collect();

        h.instance.start_running();
        h.instance.begin_shutdown();
        // Removal is a no-op after shutdown
        drop(slots);
        assert!(order.lock().is_empty());

        h.instance.finish_thread_shutdown();
        assert_eq!(*order.lock(), vec![2, 1, 0]);
    }

    #[test]
    fn test_destroy_while_initializing_does_not_wait() {
        let h = Harness::new(1);
        let slot = h.instance.allocate_slot();
        slot.set(label("x"));
        assert_eq!(slot.outstanding_callbacks(), 1);

        drop(slot);
        assert_eq!(h.instance.free_slot_count(), 1);
        h.shutdown();
    }

    #[test]
    fn test_destroy_after_shutdown_is_noop() {
        let h = Harness::new(1);
        let slot = h.instance.allocate_slot();
        h.instance.start_running();
        slot.set(label("x"));
        h.instance.begin_shutdown();

        // Worker never drained; dropping must not block
        drop(slot);
        assert_eq!(h.instance.free_slot_count(), 0);
        assert_eq!(h.instance.live_slot_count(), 1);

        h.worker(0).discard_pending();
        h.worker_ctx(0).shutdown_thread();
        h.instance.finish_thread_shutdown();
    }

    #[test]
    fn test_destroy_while_running_waits_for_worker() {
        let instance = Instance::new();
        let main = Arc::new(LoopDispatcher::new("main"));
        instance.register_thread(main.clone(), true);
        let worker = Arc::new(LoopDispatcher::new("worker-0"));
        instance.register_thread(worker.clone(), false);

        // Hold the worker behind a gate so the slot's callback stays queued
        let (open, gate) = mpsc::channel::<()>();
        worker.post(Box::new(move |_| {
            let _ = gate.recv();
        }));

        let runner = worker.clone();
        let handle = std::thread::spawn(move || {
            let ctx = ThreadContext::new();
            runner.run(&ctx, Duration::from_millis(5));
            ctx.shutdown_thread();
        });

        instance.start_running();
        let slot = instance.allocate_slot();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        slot.run_on_all_threads(move |ctx| {
            if ctx.dispatcher().name() == "worker-0" {
                flag.store(true, Ordering::SeqCst);
            }
        });
        assert_eq!(slot.outstanding_callbacks(), 1);

        let opener = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            let _ = open.send(());
        });

        drop(slot);
        assert!(ran.load(Ordering::SeqCst));

        instance.begin_shutdown();
        worker.exit();
        handle.join().unwrap();
        opener.join().unwrap();
        main.discard_pending();
        instance.finish_thread_shutdown();
    }

    #[test]
    #[should_panic(expected = "allocate_slot called after shutdown")]
    fn test_allocate_after_shutdown_is_fatal() {
        let h = Harness::new(0);
        h.instance.begin_shutdown();
        let _ = h.instance.allocate_slot();
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn test_duplicate_worker_registration_is_fatal() {
        let h = Harness::new(1);
        h.instance.register_thread(h.worker_ref(0), false);
    }

    #[test]
    #[should_panic(expected = "illegal lifecycle transition")]
    fn test_start_running_twice_is_fatal() {
        let h = Harness::new(0);
        h.instance.start_running();
        h.instance.start_running();
    }

    #[test]
    #[should_panic(expected = "thread shutdown while registry is running")]
    fn test_thread_shutdown_before_registry_is_fatal() {
        let h = Harness::new(0);
        h.instance.start_running();
        h.instance.finish_thread_shutdown();
    }
}
