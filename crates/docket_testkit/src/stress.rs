//! Concurrency stress harnesses.
//!
//! Each harness drives one store from several threads and reports what
//! happened; the caller decides what the numbers must satisfy.

use docket_core::{CoreError, DocumentStore, Entity, EntityKind, Index};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Operations that gave up with `ConcurrentModification`.
    pub contended_ops: usize,
    /// Operations that failed with any other error.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, contended: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + contended + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            contended_ops: contended,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Contended: {}", self.contended_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Operations per thread.
    pub operations_per_thread: usize,
    /// Number of concurrent threads.
    pub threads: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations_per_thread: 200,
            threads: 4,
        }
    }
}

/// State of the shared counter used by [`stress_concurrent_increments`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    /// Number of committed increments.
    pub value: u64,
}

/// Entity kind of the shared counter.
#[derive(Debug)]
pub struct CounterKind;

impl EntityKind for CounterKind {
    const ENTITY_NAME: &'static str = "stress_counter";
    type State = Counter;

    fn initial_state() -> Counter {
        Counter::default()
    }
}

/// Increments the counter `id` from `config.threads` threads at once.
///
/// Every increment goes through [`Entity::mutate`]. Afterwards the
/// counter's value must equal `successful_ops`: an increment either
/// committed exactly once or reported an error.
pub fn stress_concurrent_increments(
    store: &DocumentStore,
    id: &str,
    config: &StressConfig,
) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let contended = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|_| {
            let store = store.clone();
            let id = id.to_string();
            let successful = Arc::clone(&successful);
            let contended = Arc::clone(&contended);
            let failed = Arc::clone(&failed);
            let ops = config.operations_per_thread;

            thread::spawn(move || {
                let mut counter: Entity<CounterKind> = Entity::new(store, id);
                for _ in 0..ops {
                    match counter.mutate(|c| Counter { value: c.value + 1 }) {
                        Ok(_) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(CoreError::ConcurrentModification { .. }) => {
                            contended.fetch_add(1, Ordering::Relaxed)
                        }
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        contended.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Reads the counter written by [`stress_concurrent_increments`].
pub fn read_counter(store: &DocumentStore, id: &str) -> u64 {
    Entity::<CounterKind>::new(store.clone(), id)
        .get_state()
        .expect("Failed to read counter")
        .value
}

/// Appends to the index `name` from `config.threads` threads at once.
///
/// Thread `t` appends `"t<t>-<n>"` one item at a time, so each thread's
/// items must appear in the index in their own order.
pub fn stress_concurrent_appends(
    store: &DocumentStore,
    name: &str,
    page_size: usize,
    config: &StressConfig,
) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let index: Index<String> = Index::with_page_size(store.clone(), name, page_size);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let ops = config.operations_per_thread;

            thread::spawn(move || {
                for n in 0..ops {
                    match index.add(format!("t{t}-{n}")) {
                        Ok(()) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        0,
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}
