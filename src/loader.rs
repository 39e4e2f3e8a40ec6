//! Parallel loader: rescans a data file and rebuilds the index from it.
//!
//! `Load` is the only recovery path this crate provides — there is no
//! journal, so a process that crashed mid-`SetOffset` simply reruns `Load`
//! on restart. Records are decoded sequentially
//! (decoding itself is inherently ordered, since each record's length
//! prefixes gate where the next one starts) but the resulting `SetOffset`
//! calls are dispatched onto a fixed-size worker pool and may land on
//! different top-level shards concurrently; within one shard the instance's
//! write lock serializes them.

use std::fs::File;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::record::scan;
use crate::sharded_index::ShardedHashIndex;

/// Outcome of a completed `Load` run.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadStats {
    /// Number of records successfully dispatched to the index.
    pub records: u64,
}

const PROGRESS_INTERVAL: u64 = 100_000;

/// Sequentially scans `data_file`, dispatching one `SetOffset` call per
/// decoded record onto a pool of `workers` threads, and waits for every
/// dispatched call to finish before returning.
///
/// A decode failure aborts the scan immediately (propagated from [`scan`]).
/// The first `SetOffset` failure observed from any worker is returned once
/// every in-flight call has drained; later failures are discarded — the
/// caller sees exactly one error, not a race between several.
pub fn load(data_file: &File, index: &ShardedHashIndex, workers: usize) -> Result<LoadStats> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .map_err(|e| Error::Config(format!("failed to build loader thread pool: {e}")))?;

    let first_error: Arc<Mutex<Option<Error>>> = Arc::new(Mutex::new(None));
    let dispatched = Arc::new(AtomicU64::new(0));

    let scan_result = pool.scope(|scope| {
        scan(data_file, |record| {
            let first_error = first_error.clone();
            let dispatched = dispatched.clone();
            scope.spawn(move |_| {
                if first_error.lock().unwrap().is_some() {
                    return;
                }
                match index.set_offset(&record.key, record.offset) {
                    Ok(()) => {
                        let n = dispatched.fetch_add(1, Ordering::Relaxed) + 1;
                        if n % PROGRESS_INTERVAL == 0 {
                            tracing::info!(event = "load_progress", records = n);
                        }
                    }
                    Err(e) => {
                        let mut slot = first_error.lock().unwrap();
                        if slot.is_none() {
                            *slot = Some(e);
                        }
                    }
                }
            });
        })
    });
    scan_result?;

    // Every spawned closure has been joined and dropped by now (`scope`
    // only returns once they all finish), so this is the last reference.
    if let Some(e) = first_error.lock().unwrap().take() {
        return Err(e);
    }

    Ok(LoadStats {
        records: dispatched.load(Ordering::Relaxed),
    })
}

#[cfg(test)]
#[path = "loader_tests.rs"]
mod loader_tests;
