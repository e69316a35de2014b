//! Block-parallel execution on a rayon pool.

use rayon::prelude::*;
use tracing::warn;

use crate::error::Result;

/// Runs per-block work either on a dedicated pool or on the global one.
///
/// Each task handles one block at a time, so the number of blocks alive at
/// once is bounded by the thread count.
#[derive(Debug)]
pub struct BlockPool {
    pool: Option<rayon::ThreadPool>,
}

impl BlockPool {
    /// `None` uses the global rayon pool.
    pub fn new(threads: Option<usize>) -> Self {
        let pool = threads.and_then(|num_threads| {
            rayon::ThreadPoolBuilder::new()
                .num_threads(num_threads)
                .thread_name(|i| format!("jvol-block-{i}"))
                .build()
                .map_err(|e| warn!("falling back to the global thread pool: {e}"))
                .ok()
        });
        Self { pool }
    }

    pub fn threads(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }

    fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    /// Call `task(index, slot)` for every `slot_len` chunk of `out`.
    ///
    /// Stops at the first error.
    pub fn fill_slots<T, F>(&self, out: &mut [T], slot_len: usize, task: F) -> Result<()>
    where
        T: Send,
        F: Fn(usize, &mut [T]) -> Result<()> + Send + Sync,
    {
        self.install(|| {
            out.par_chunks_mut(slot_len)
                .enumerate()
                .try_for_each(|(index, slot)| task(index, slot))
        })
    }

    /// Collect `task(index)` for `0..count`, in index order.
    pub fn map_blocks<R, F>(&self, count: usize, task: F) -> Result<Vec<R>>
    where
        R: Send,
        F: Fn(usize) -> Result<R> + Send + Sync,
    {
        self.install(|| (0..count).into_par_iter().map(task).collect())
    }
}

impl Default for BlockPool {
    fn default() -> Self {
        Self::new(None)
    }
}
