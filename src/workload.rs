//! Built-in instrumented workload.
//!
//! A small call graph of arithmetic and formatting loops. `calc_int` and
//! `calc_float` are reached through two different parents, which exercises
//! depth-independent totals; every worker thread contributes the same tree so
//! merged call counts scale with the thread count.

use std::cell::RefCell;
use std::fmt::Write as _;
use std::hint::black_box;
use std::thread;
use std::time::{Duration, Instant};

use scopemeter_runtime::{ScopeGuard, ScopeTree, flush, scope, scope_fn};
use tracing::{debug, info};

use crate::error::Error;

/// Scope name wrapping each worker thread's run.
pub const WORKER_SCOPE: &str = "worker thread";
/// Scope name wrapping the main thread's run.
pub const MAIN_SCOPE: &str = "main thread";

pub fn calc_int(count: u64) -> u64 {
    scope_fn!();
    let mut val = 0u64;
    for i in 0..=count {
        val = val.wrapping_add(black_box(i));
    }
    val
}

pub fn calc_float(count: u64) -> f64 {
    scope_fn!();
    let mut val = 0f32;
    for i in 0..=count {
        val += black_box(i as f32);
    }
    f64::from(val)
}

pub fn calc_string(count: u64) -> String {
    scope_fn!();
    let mut out = String::new();
    for i in 0..=count {
        let _ = write!(out, "{i} ");
    }
    out
}

pub fn calc_numbers(count: u64) -> f64 {
    scope_fn!();
    calc_int(count) as f64 + calc_float(count)
}

pub fn calc_all(count: u64) -> f64 {
    scope_fn!();
    black_box(calc_string(count));
    calc_int(count) as f64 + calc_float(count)
}

/// One full pass over the call graph.
pub fn suite(count: u64) -> f64 {
    scope_fn!();
    calc_numbers(count) + calc_all(count)
}

/// Run `suite(count)` on `threads` worker threads and once on the calling
/// thread, then publish the calling thread's measurements.
///
/// Worker trees are merged into the global tree when the workers exit, which
/// happens before `join` returns.
pub fn run(threads: usize, count: u64) -> Result<(), Error> {
    let handles: Vec<_> = (0..threads)
        .map(|index| {
            thread::spawn(move || {
                scope!(WORKER_SCOPE);
                debug!(index, "worker started");
                black_box(suite(count))
            })
        })
        .collect();

    for (index, handle) in handles.into_iter().enumerate() {
        handle.join().map_err(|_| Error::WorkerPanicked(index))?;
    }

    {
        scope!(MAIN_SCOPE);
        black_box(suite(count));
    }
    flush();
    info!(threads, count, "workload finished");
    Ok(())
}

/// Amortised cost of one guard on a private tree.
#[derive(Debug, Clone, Copy)]
pub struct Overhead {
    pub iterations: u64,
    /// Wall time per enter/drop pair as seen from outside.
    pub per_scope: Duration,
    /// Chore the tree attributed to itself per activation.
    pub chore_per_scope: Duration,
}

pub fn measure_overhead(iterations: u64) -> Result<Overhead, Error> {
    if iterations == 0 {
        return Err(Error::InvalidArgument(
            "--iterations must be at least 1".into(),
        ));
    }
    let tree = RefCell::new(ScopeTree::new());
    let start = Instant::now();
    for _ in 0..iterations {
        let _g = ScopeGuard::new(Instant::now(), black_box("overhead_sample"), &tree);
    }
    let elapsed = start.elapsed();

    let tree = tree.into_inner();
    let chore = tree
        .root()
        .child("overhead_sample")
        .map(|sample| sample.node_chore_duration())
        .unwrap_or_default();

    Ok(Overhead {
        iterations,
        per_scope: per_iteration(elapsed, iterations),
        chore_per_scope: per_iteration(chore, iterations),
    })
}

fn per_iteration(total: Duration, iterations: u64) -> Duration {
    let nanos = total.as_nanos() / u128::from(iterations);
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}
