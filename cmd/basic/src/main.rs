//! Basic evtls example
//!
//! Gives every event loop its own request counter, feeds requests to the
//! workers, then collects the per-thread totals with a completion.
//!
//! # Environment Variables
//!
//! - `EVTLS_NUM_WORKERS=N` - Number of worker loops (default 4)
//! - `EVTLS_FLUSH_EPRINT=1` - Flush debug output immediately (useful for crash debugging)
//! - `EVTLS_LOG_LEVEL=debug` - Set log level (off, error, warn, info, debug, trace)

use evtls::{kdebug, kinfo, Dispatcher, Runtime, RuntimeConfig, TlsResult};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const REQUESTS: u64 = 1000;

/// One thread's view of the server configuration
struct Settings {
    generation: u64,
}

// EVTLS_LOG_LEVEL=debug EVTLS_NUM_WORKERS=2 cargo run -p evtls-basic
fn main() -> TlsResult<()> {
    println!("=== evtls Basic Example ===\n");

    let config = RuntimeConfig::default();
    config.print();
    let mut runtime = Runtime::new(config)?;
    runtime.start()?;

    let counters = runtime.allocate_slot();
    counters.set(|d| {
        kdebug!("counter created on {}", d.name());
        Arc::new(AtomicU64::new(0))
    });

    let settings = runtime.allocate_slot();
    settings.set(|_| Arc::new(Settings { generation: 1 }));

    // Round-robin requests over the workers; each bumps its own counter
    let idx = counters.index();
    let workers = runtime.num_workers().max(1);
    for n in 0..REQUESTS {
        let target = match runtime.worker(n as usize % workers) {
            Some(worker) => worker,
            None => runtime.main_dispatcher(),
        };
        target.post(Box::new(move |ctx| {
            if let Some(counter) = ctx.get_typed::<AtomicU64>(idx) {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        }));
    }
    runtime.run_main_until_idle();

    // Collect per-thread totals once every loop has reported
    let total = Arc::new(AtomicU64::new(0));
    let done = Arc::new(AtomicBool::new(false));
    let sum = total.clone();
    let flag = done.clone();
    counters.run_on_all_threads_with_completion(
        move |ctx| {
            let served = ctx
                .get_typed::<AtomicU64>(idx)
                .map_or(0, |c| c.load(Ordering::Relaxed));
            println!("  {:<16} served {}", ctx.dispatcher().name(), served);
            sum.fetch_add(served, Ordering::Relaxed);
        },
        move |_| flag.store(true, Ordering::SeqCst),
    );
    if !runtime.run_main_until(Duration::from_secs(10), || done.load(Ordering::SeqCst)) {
        println!("WARNING: Timeout!");
    }
    kinfo!("{} requests served", total.load(Ordering::Relaxed));
    println!("\nTotal served: {}/{}", total.load(Ordering::Relaxed), REQUESTS);

    // Publish a new settings generation everywhere
    let reloaded = Arc::new(AtomicBool::new(false));
    let flag = reloaded.clone();
    settings.update_on_all_threads_with_completion(
        |current| {
            let generation = current
                .and_then(|s| s.downcast::<Settings>().ok())
                .map_or(0, |s| s.generation);
            Arc::new(Settings { generation: generation + 1 })
        },
        move |_| flag.store(true, Ordering::SeqCst),
    );
    runtime.run_main_until(Duration::from_secs(10), || reloaded.load(Ordering::SeqCst));
    if let Some(s) = settings.get_typed::<Settings>() {
        println!("Settings generation: {}", s.generation);
    }

    drop(settings);
    drop(counters);
    runtime.shutdown()?;

    println!("\n=== Example Complete ===");
    Ok(())
}
