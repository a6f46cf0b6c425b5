//! Worker threads
//!
//! Each worker is an OS thread driving one `LoopDispatcher` with its own
//! `ThreadContext`. Dispatchers are created up front so they can be
//! registered (and receive posts) before the threads start draining; the
//! queues simply buffer until then.
//!
//! When its loop exits, a worker tears down its cells in reverse index
//! order. The registry must already be shut down by then.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use evtls_core::{kinfo, TlsError, TlsResult};

use crate::config::RuntimeConfig;
use crate::dispatcher::{Dispatcher, DispatcherRef, LoopDispatcher};
use crate::tls::ThreadContext;

/// Pool of event loop threads
pub struct WorkerPool {
    dispatchers: Vec<Arc<LoopDispatcher>>,
    handles: Vec<JoinHandle<()>>,
    park_timeout: Duration,
    /// Workers whose loop has started
    started: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// Create the workers' dispatchers; no threads yet
    pub fn new(config: &RuntimeConfig) -> Self {
        let dispatchers = (0..config.num_workers)
            .map(|i| Arc::new(LoopDispatcher::new(config.worker_name(i))))
            .collect();
        Self {
            dispatchers,
            handles: Vec::with_capacity(config.num_workers),
            park_timeout: config.park_timeout,
            started: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Spawn one thread per dispatcher
    pub fn start(&mut self) -> TlsResult<()> {
        if !self.handles.is_empty() {
            return Ok(());
        }
        for dispatcher in &self.dispatchers {
            let dispatcher = Arc::clone(dispatcher);
            let started = Arc::clone(&self.started);
            let park_timeout = self.park_timeout;

            let handle = thread::Builder::new()
                .name(dispatcher.name().to_string())
                .spawn(move || worker_main(dispatcher, park_timeout, started))
                .map_err(|e| TlsError::SpawnFailed(e.to_string()))?;
            self.handles.push(handle);
        }
        Ok(())
    }

    /// Dispatchers to register with the registry, in worker order
    pub fn dispatchers(&self) -> impl Iterator<Item = DispatcherRef> + '_ {
        self.dispatchers
            .iter()
            .map(|d| Arc::clone(d) as DispatcherRef)
    }

    /// Worker `i`'s loop
    pub fn dispatcher(&self, i: usize) -> Option<&Arc<LoopDispatcher>> {
        self.dispatchers.get(i)
    }

    #[inline]
    pub fn num_workers(&self) -> usize {
        self.dispatchers.len()
    }

    #[inline]
    pub fn started_count(&self) -> usize {
        self.started.load(Ordering::Acquire)
    }

    /// Ask every loop to exit
    pub fn shutdown(&self) {
        for dispatcher in &self.dispatchers {
            dispatcher.exit();
        }
    }

    /// Wait for all workers to finish
    pub fn join(self) -> TlsResult<()> {
        let mut result = Ok(());
        for handle in self.handles {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() && result.is_ok() {
                result = Err(TlsError::WorkerPanicked(name));
            }
        }
        result
    }
}

fn worker_main(dispatcher: Arc<LoopDispatcher>, park_timeout: Duration, started: Arc<AtomicUsize>) {
    let ctx = ThreadContext::new();
    started.fetch_add(1, Ordering::AcqRel);
    kinfo!("{} started", dispatcher.name());

    dispatcher.run(&ctx, park_timeout);

    ctx.shutdown_thread();
    kinfo!("{} stopped", dispatcher.name());
}
