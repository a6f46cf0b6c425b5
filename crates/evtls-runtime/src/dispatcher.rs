//! Dispatchers: per-thread single-threaded callback queues
//!
//! A `Dispatcher` is the only way to get work onto another thread. Posting
//! is safe from any thread; callbacks run later on the dispatcher's own
//! thread, strictly in post order, never concurrently with each other.
//!
//! `LoopDispatcher` is the event loop used by `WorkerPool` and by the main
//! thread. Servers with their own event loop implement `Dispatcher` for it
//! and hand the loop's `ThreadContext` to each callback they run.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_queue::SegQueue;
use evtls_core::{kdebug, ktrace};

use crate::parking::{new_parking, LoopParking};
use crate::tls::ThreadContext;

/// Callback executed once on a dispatcher's thread
pub type PostCb = Box<dyn FnOnce(&ThreadContext) + Send + 'static>;

/// Shared handle to a dispatcher
pub type DispatcherRef = Arc<dyn Dispatcher>;

/// Ordered callback posting onto one thread
pub trait Dispatcher: Send + Sync {
    /// Enqueue `cb` for execution on this dispatcher's thread.
    ///
    /// Never blocks and never runs `cb` inline.
    fn post(&self, cb: PostCb);

    /// Human-readable name, used in logs and errors
    fn name(&self) -> &str;
}

/// Identity comparison for dispatcher handles
#[inline]
pub fn same_dispatcher(a: &DispatcherRef, b: &DispatcherRef) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Counters for one loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatcherStats {
    pub posted: u64,
    pub executed: u64,
    pub discarded: u64,
}

/// FIFO event loop
pub struct LoopDispatcher {
    name: String,
    queue: SegQueue<PostCb>,
    parking: Box<dyn LoopParking>,
    exiting: AtomicBool,
    posted: AtomicU64,
    executed: AtomicU64,
    discarded: AtomicU64,
}

impl LoopDispatcher {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            queue: SegQueue::new(),
            parking: new_parking(),
            exiting: AtomicBool::new(false),
            posted: AtomicU64::new(0),
            executed: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    /// Run queued callbacks until the queue is observed empty.
    ///
    /// Callbacks posted while draining run in the same call. Must only be
    /// called from the thread that owns `ctx`.
    pub fn run_until_idle(&self, ctx: &ThreadContext) -> usize {
        let mut ran = 0;
        while let Some(cb) = self.queue.pop() {
            cb(ctx);
            ran += 1;
        }
        if ran > 0 {
            self.executed.fetch_add(ran as u64, Ordering::Relaxed);
            ktrace!("{}: ran {} callbacks", self.name, ran);
        }
        ran
    }

    /// One loop iteration: drain, and if nothing ran, park then drain again.
    pub fn turn(&self, ctx: &ThreadContext, park_timeout: Duration) -> usize {
        let ran = self.run_until_idle(ctx);
        if ran > 0 || self.is_exiting() {
            return ran;
        }
        self.parking.park(Some(park_timeout));
        self.run_until_idle(ctx)
    }

    /// Run until `exit()` is called.
    ///
    /// Callbacks still queued when the exit is observed are dropped on this
    /// thread without running.
    pub fn run(&self, ctx: &ThreadContext, park_timeout: Duration) {
        kdebug!("{}: loop running", self.name);
        while !self.is_exiting() {
            self.turn(ctx, park_timeout);
        }
        let dropped = self.discard_pending();
        kdebug!("{}: loop exited, {} callbacks discarded", self.name, dropped);
    }

    /// Ask `run` to return after the current callback
    pub fn exit(&self) {
        self.exiting.store(true, Ordering::Release);
        self.parking.unpark();
    }

    #[inline]
    pub fn is_exiting(&self) -> bool {
        self.exiting.load(Ordering::Acquire)
    }

    /// Drop every queued callback without running it
    pub fn discard_pending(&self) -> usize {
        let mut dropped = 0;
        while let Some(cb) = self.queue.pop() {
            drop(cb);
            dropped += 1;
        }
        self.discarded.fetch_add(dropped as u64, Ordering::Relaxed);
        dropped
    }

    /// Callbacks waiting to run
    #[inline]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            posted: self.posted.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

impl Dispatcher for LoopDispatcher {
    fn post(&self, cb: PostCb) {
        self.queue.push(cb);
        self.posted.fetch_add(1, Ordering::Relaxed);
        self.parking.unpark();
    }

    fn name(&self) -> &str {
        &self.name
    }
}
