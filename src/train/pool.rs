//! Fixed worker pool and shard partitioning.

use std::ops::Range;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::FlatResult;

/// Splits `0..count` into at most `parts` contiguous, disjoint shards that
/// together cover every index. Shard sizes differ by at most one.
///
/// ```rust
/// use flatlm::train::partition;
///
/// assert_eq!(partition(10, 3), vec![0..4, 4..7, 7..10]);
/// assert_eq!(partition(2, 8), vec![0..1, 1..2]);
/// assert!(partition(0, 4).is_empty());
/// ```
pub fn partition(count: usize, parts: usize) -> Vec<Range<usize>> {
    if count == 0 {
        return Vec::new();
    }
    let parts = parts.clamp(1, count);
    let base = count / parts;
    let extra = count % parts;

    let mut shards = Vec::with_capacity(parts);
    let mut low = 0;
    for i in 0..parts {
        let size = base + usize::from(i < extra);
        shards.push(low..low + size);
        low += size;
    }
    shards
}

/// Thread pool that runs one task per worker and waits for all of them.
#[derive(Debug)]
pub struct WorkerPool {
    pool: ThreadPool,
    threads: usize,
}

impl WorkerPool {
    /// Builds a pool with `threads` threads (0 = detected core count).
    pub fn new(threads: usize) -> FlatResult<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("flatlm-worker-{}", i))
            .build()?;
        let threads = pool.current_num_threads();
        log::info!("Worker pool ready: {} threads", threads);
        Ok(Self { pool, threads })
    }

    /// Threads in the pool.
    #[inline]
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// One shard per thread over `0..count`.
    pub fn shards(&self, count: usize) -> Vec<Range<usize>> {
        partition(count, self.threads)
    }

    /// Runs `task` on every worker inside the pool and blocks until all have
    /// finished.
    ///
    /// Every worker runs to completion; if any failed, the error of the
    /// lowest-indexed failing worker is returned.
    pub fn run<W, F>(&self, workers: &mut [W], task: F) -> FlatResult<()>
    where
        W: Send,
        F: Fn(&mut W) -> FlatResult<()> + Send + Sync,
    {
        let results: Vec<FlatResult<()>> = self
            .pool
            .install(|| workers.par_iter_mut().map(|worker| task(worker)).collect());
        results.into_iter().collect()
    }
}
