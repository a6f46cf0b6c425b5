//! # evtls - Event-loop Thread Local Storage
//!
//! Slot-based thread-local variables for servers that run one event loop
//! per thread.
//!
//! The main thread allocates a *slot* and every registered thread gets its
//! own value at that slot's index. Values are installed and updated by
//! posting callbacks to each thread's loop, so a worker only ever touches
//! its own cells; no locks are taken on the read path.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use evtls::{Dispatcher, Runtime, RuntimeConfig};
//!
//! let mut rt = Runtime::new(RuntimeConfig::new().num_workers(2))?;
//! rt.start()?;
//!
//! let names = rt.allocate_slot();
//! names.set(|d| Arc::new(d.name().to_string()));
//!
//! let idx = names.index();
//! names.run_on_all_threads_with_completion(
//!     move |ctx| {
//!         let name = ctx.get_typed::<String>(idx);
//!         evtls::kinfo!("{:?}", name);
//!     },
//!     |_| evtls::kinfo!("every thread has run"),
//! );
//! rt.run_main_until_idle();
//!
//! drop(names);
//! rt.shutdown()?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Main thread (owns Instance)                 │
//! │     allocate_slot, set, run_on_all_threads, shutdown        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ post()
//!          ┌───────────────────┼───────────────────┐
//!          ▼                   ▼                   ▼
//!    ┌───────────┐      ┌───────────┐      ┌───────────┐
//!    │ Worker 0  │      │ Worker 1  │      │ Worker N  │
//!    │ loop+ctx  │      │ loop+ctx  │      │ loop+ctx  │
//!    └───────────┘      └───────────┘      └───────────┘
//!          │                   │                   │
//!          └─────── completion posted to main ─────┘
//! ```

use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

// Re-export core types
pub use evtls_core::{
    fatal,
    ConfigError,
    LifecycleState,
    SharedLifecycle,
    SlotIndex,
    SlotTable,
    TlsError,
    TlsResult,
};

// Re-export kprint macros for debug logging
pub use evtls_core::{kprint, kprintln, klog, kerror, kwarn, kinfo, kdebug, ktrace};
pub use evtls_core::kprint::{
    LogLevel, init as init_logging, set_flush_enabled, set_log_level, set_thread_tag_enabled,
};

// Re-export env utilities
pub use evtls_core::{env_get, env_get_bool, env_get_millis, env_get_opt, env_get_str, env_is_set};

// Re-export runtime types
pub use evtls_runtime::{
    BroadcastCb,
    CompletionCb,
    Dispatcher,
    DispatcherRef,
    DispatcherStats,
    Instance,
    LoopDispatcher,
    ObjectRef,
    PostCb,
    RuntimeConfig,
    Slot,
    ThreadContext,
    WorkerPool,
};

/// Registry, main loop and worker pool wired together
///
/// The main thread's loop is not a thread of its own: whoever owns the
/// runtime drives it with `run_main_until_idle` or `run_main_until`.
/// Completions posted by broadcasts arrive there.
pub struct Runtime {
    config: RuntimeConfig,
    main_loop: Arc<LoopDispatcher>,
    instance: Instance,
    pool: Option<WorkerPool>,
    started: bool,
}

impl Runtime {
    /// Build the registry and register every thread.
    ///
    /// Workers are registered here but do not run until `start()`, so
    /// slots set before then are buffered in their queues.
    pub fn new(config: RuntimeConfig) -> TlsResult<Self> {
        config.validate()?;
        init_logging();
        if config.debug_logging {
            set_log_level(LogLevel::Debug);
        }

        let main_loop = Arc::new(LoopDispatcher::new("main"));
        let instance = Instance::new();
        instance.register_thread(main_loop.clone(), true);

        let pool = WorkerPool::new(&config);
        for dispatcher in pool.dispatchers() {
            instance.register_thread(dispatcher, false);
        }
        kdebug!("runtime created with {} workers", pool.num_workers());

        Ok(Self {
            config,
            main_loop,
            instance,
            pool: Some(pool),
            started: false,
        })
    }

    /// Spawn the worker threads and move the registry to Running
    pub fn start(&mut self) -> TlsResult<()> {
        if self.started {
            return Ok(());
        }
        match self.pool.as_mut() {
            Some(pool) => pool.start()?,
            None => return Err(TlsError::AfterShutdown("start")),
        }
        self.instance.start_running();
        self.started = true;
        kinfo!("runtime started with {} workers", self.num_workers());
        Ok(())
    }

    /// Start, run `f`, then shut down
    pub fn block_on<F, T>(&mut self, f: F) -> TlsResult<T>
    where
        F: FnOnce(&Runtime) -> T,
    {
        self.start()?;
        let result = f(self);
        self.shutdown()?;
        Ok(result)
    }

    #[inline]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    #[inline]
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Allocate a slot on the registry
    pub fn allocate_slot(&self) -> Slot {
        self.instance.allocate_slot()
    }

    pub fn main_dispatcher(&self) -> DispatcherRef {
        self.main_loop.clone()
    }

    #[inline]
    pub fn main_loop(&self) -> &Arc<LoopDispatcher> {
        &self.main_loop
    }

    /// Worker `i`'s dispatcher
    pub fn worker(&self, i: usize) -> Option<DispatcherRef> {
        let pool = self.pool.as_ref()?;
        pool.dispatcher(i).map(|d| Arc::clone(d) as DispatcherRef)
    }

    pub fn num_workers(&self) -> usize {
        self.pool.as_ref().map_or(0, WorkerPool::num_workers)
    }

    /// Main thread's storage
    pub fn main_context(&self) -> Rc<ThreadContext> {
        self.instance.main_context()
    }

    /// Run everything queued on the main loop; returns callbacks run
    pub fn run_main_until_idle(&self) -> usize {
        self.main_loop.run_until_idle(&self.instance.main_context())
    }

    /// Drive the main loop until `done` holds or `timeout` elapses.
    ///
    /// Returns whether `done` held.
    pub fn run_main_until<F>(&self, timeout: Duration, mut done: F) -> bool
    where
        F: FnMut() -> bool,
    {
        let ctx = self.instance.main_context();
        let deadline = Instant::now() + timeout;
        loop {
            if done() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let wait = (deadline - now).min(self.config.park_timeout);
            self.main_loop.turn(&ctx, wait);
        }
    }

    /// Shut the registry down, stop and join the workers, then tear down
    /// the main thread's cells.
    ///
    /// Slots still alive afterwards are inert; dropping them does nothing.
    pub fn shutdown(&mut self) -> TlsResult<()> {
        let pool = match self.pool.take() {
            Some(pool) => pool,
            None => return Ok(()),
        };

        self.instance.begin_shutdown();
        pool.shutdown();
        let joined = pool.join();

        let discarded = self.main_loop.discard_pending();
        if discarded > 0 {
            kdebug!("main loop discarded {} callbacks at shutdown", discarded);
        }
        self.instance.finish_thread_shutdown();
        kinfo!("runtime shut down");
        joined
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            kwarn!("runtime shutdown on drop: {}", e);
        }
    }
}
