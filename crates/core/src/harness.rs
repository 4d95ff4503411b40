//! Worker-thread hammer harness.
//!
//! Drives concurrent invocation of registered callables the way the host's
//! recalculation pool does: N real OS threads, each dispatching its chosen
//! target over and over with varying arguments. The report carries every
//! per-call outcome plus the allocator's final counters, so tests can
//! assert "the leaky path leaked and the managed path did not" per
//! scenario.

use std::thread;

use recalc_addin_protocol::{HostApi, HostError, Target, Variant};

use crate::alloc::AllocStats;
use crate::host::Host;

/// Outcome of one hammered call.
#[derive(Debug)]
pub struct CallRecord {
    pub thread: usize,
    pub iteration: usize,
    pub outcome: Result<Variant, HostError>,
}

/// Aggregate of one concurrent run.
#[derive(Debug)]
pub struct HammerReport {
    pub calls: Vec<CallRecord>,
    /// Allocator counters sampled after every worker joined.
    pub alloc_stats: AllocStats,
}

impl HammerReport {
    pub fn total(&self) -> usize {
        self.calls.len()
    }

    pub fn completed(&self) -> usize {
        self.calls.iter().filter(|record| record.outcome.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.completed()
    }

    /// The successfully returned values, in no particular cross-thread
    /// order.
    pub fn values(&self) -> impl Iterator<Item = &Variant> {
        self.calls.iter().filter_map(|record| record.outcome.as_ref().ok())
    }
}

/// Spawn `threads` worker threads and have each dispatch its target
/// `iterations` times; thread `t` hammers `targets[t % targets.len()]` and
/// `make_args(t, i)` supplies the arguments for its iteration `i`.
///
/// The harness plays the host's role on the return path: every owned
/// result is handed to the free callback exactly once after its value is
/// recorded, so managed-convention leaks and double-frees in the report
/// are genuine protocol defects rather than harness artifacts.
pub fn run_concurrent<F>(
    host: &Host,
    targets: &[Target],
    threads: usize,
    iterations: usize,
    make_args: F,
) -> HammerReport
where
    F: Fn(usize, usize) -> Vec<Variant> + Sync,
{
    let mut calls = Vec::new();
    if !targets.is_empty() && threads > 0 {
        tracing::debug!(threads, iterations, targets = targets.len(), "hammer start");
        let make_args = &make_args;
        let per_thread: Vec<Vec<CallRecord>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..threads)
                .map(|t| {
                    let target = targets[t % targets.len()].clone();
                    scope.spawn(move || {
                        let mut records = Vec::with_capacity(iterations);
                        for i in 0..iterations {
                            let args = make_args(t, i);
                            let outcome = match host.dispatch(&target, &args) {
                                Ok(dispatched) => {
                                    if dispatched.must_release {
                                        host.free(&dispatched.value);
                                    }
                                    Ok(dispatched.value)
                                }
                                Err(err) => Err(err),
                            };
                            records.push(CallRecord { thread: t, iteration: i, outcome });
                        }
                        records
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or_default())
                .collect()
        });
        calls = per_thread.into_iter().flatten().collect();
        tracing::debug!(calls = calls.len(), "hammer done");
    }
    HammerReport { calls, alloc_stats: host.allocator().stats() }
}
