//! Cross-thread broadcast
//!
//! A broadcast runs the same callback on the main thread (synchronously,
//! first) and posts a copy to every registered worker. The completion form
//! additionally posts a completion callback to the main dispatcher once
//! every worker has run its copy.
//!
//! Completion tracking is an atomic countdown, one ticket per worker. The
//! thread that releases the last ticket posts the completion.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use evtls_core::ktrace;
use parking_lot::Mutex;

use crate::dispatcher::DispatcherRef;
use crate::tls::ThreadContext;

/// Callback run once per thread
pub type BroadcastCb = Arc<dyn Fn(&ThreadContext) + Send + Sync + 'static>;

/// Callback run once on the main thread after a broadcast completes
pub type CompletionCb = Box<dyn FnOnce(&ThreadContext) + Send + 'static>;

/// Countdown shared by the worker copies of one broadcast
pub struct CompletionGuard {
    remaining: AtomicUsize,
    main: DispatcherRef,
    completion: Mutex<Option<CompletionCb>>,
}

impl CompletionGuard {
    /// Arm a countdown for `workers` copies.
    ///
    /// With no workers the completion is posted right away.
    pub fn arm(workers: usize, main: DispatcherRef, completion: CompletionCb) -> Vec<CompletionTicket> {
        if workers == 0 {
            main.post(completion);
            return Vec::new();
        }

        let guard = Arc::new(CompletionGuard {
            remaining: AtomicUsize::new(workers),
            main,
            completion: Mutex::new(Some(completion)),
        });
        (0..workers)
            .map(|_| CompletionTicket {
                guard: Arc::clone(&guard),
            })
            .collect()
    }

    /// Copies not yet released
    #[inline]
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    fn arrive(&self) {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        if let Some(completion) = self.completion.lock().take() {
            ktrace!("broadcast complete, posting completion to {}", self.main.name());
            self.main.post(completion);
        }
    }
}

/// One worker's share of a completion countdown; releases on drop
pub struct CompletionTicket {
    guard: Arc<CompletionGuard>,
}

impl CompletionTicket {
    #[inline]
    pub fn remaining(&self) -> usize {
        self.guard.remaining()
    }
}

impl Drop for CompletionTicket {
    fn drop(&mut self) {
        self.guard.arrive();
    }
}

/// Run `cb` on the main thread, then post it to every worker.
pub(crate) fn broadcast(main_ctx: &ThreadContext, workers: &[DispatcherRef], cb: BroadcastCb) {
    cb(main_ctx);
    for worker in workers {
        let cb = Arc::clone(&cb);
        worker.post(Box::new(move |ctx| cb(ctx)));
    }
    ktrace!("broadcast posted to {} workers", workers.len());
}

/// Run `cb` on the main thread, post it to every worker, and post
/// `completion` to `main` after the last worker copy has run.
///
/// The main thread's share is never overlapped with the workers'; it runs
/// before anything is posted.
pub(crate) fn broadcast_with_completion(
    main_ctx: &ThreadContext,
    main: &DispatcherRef,
    workers: &[DispatcherRef],
    cb: BroadcastCb,
    completion: CompletionCb,
) {
    cb(main_ctx);
    let tickets = CompletionGuard::arm(workers.len(), Arc::clone(main), completion);
    for (worker, ticket) in workers.iter().zip(tickets) {
        let cb = Arc::clone(&cb);
        worker.post(Box::new(move |ctx| {
            cb(ctx);
            // Release the callback (and any slot guard inside it) before the
            // completion can be posted.
            drop(cb);
            drop(ticket);
        }));
    }
    ktrace!("broadcast with completion posted to {} workers", workers.len());
}
