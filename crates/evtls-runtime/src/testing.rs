//! Hand-driven registry harness for unit tests.
//!
//! Worker loops are drained explicitly on the test thread, each with its
//! own `ThreadContext`, so cross-thread ordering can be asserted without
//! timing.

use std::sync::Arc;

use crate::dispatcher::{DispatcherRef, LoopDispatcher};
use crate::registry::Instance;
use crate::tls::ThreadContext;

pub(crate) struct Harness {
    pub instance: Instance,
    pub main: Arc<LoopDispatcher>,
    workers: Vec<(Arc<LoopDispatcher>, ThreadContext)>,
}

impl Harness {
    pub fn new(num_workers: usize) -> Self {
        evtls_core::kprint::set_log_level(evtls_core::kprint::LogLevel::Off);

        let instance = Instance::new();
        let main = Arc::new(LoopDispatcher::new("main"));
        instance.register_thread(main.clone(), true);

        let workers = (0..num_workers)
            .map(|i| {
                let d = Arc::new(LoopDispatcher::new(format!("worker-{}", i)));
                instance.register_thread(d.clone(), false);
                (d, ThreadContext::new())
            })
            .collect();

        Self { instance, main, workers }
    }

    pub fn worker(&self, i: usize) -> &Arc<LoopDispatcher> {
        &self.workers[i].0
    }

    pub fn worker_ref(&self, i: usize) -> DispatcherRef {
        self.workers[i].0.clone()
    }

    pub fn worker_ctx(&self, i: usize) -> &ThreadContext {
        &self.workers[i].1
    }

    pub fn drain_worker(&self, i: usize) -> usize {
        let (d, ctx) = &self.workers[i];
        d.run_until_idle(ctx)
    }

    pub fn drain_workers(&self) {
        for i in 0..self.workers.len() {
            self.drain_worker(i);
        }
    }

    pub fn drain_main(&self) -> usize {
        self.main.run_until_idle(&self.instance.main_context())
    }

    /// Shutdown in server order: registry, then each thread's cells
    pub fn shutdown(&self) {
        self.instance.begin_shutdown();
        for (d, ctx) in &self.workers {
            d.discard_pending();
            ctx.shutdown_thread();
        }
        self.main.discard_pending();
        self.instance.finish_thread_shutdown();
    }
}
