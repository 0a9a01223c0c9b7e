//! Fixed-size pools of dispatch threads
//!
//! A [`DispatchQueue`] owns between 1 and [`MAX_POOL_SIZE`] workers and picks
//! one for every submission:
//!
//! 1. If the caller is already running on one of the pool's workers, that
//!    worker is chosen, so nested synchronous submissions run inline.
//! 2. Otherwise the worker with the fewest pending messages wins, ties going
//!    to the lowest index.
//!
//! Work on one worker is strictly ordered; across workers there is no
//! ordering guarantee. A pool of one gives full single-thread affinity.

use crate::error::{DispatchError, DispatchResult};
use crate::thread::{DispatchThread, WorkerId, current_worker};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;
use tracing::debug;

/// Upper bound on workers per pool
pub const MAX_POOL_SIZE: usize = 16;

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// A pool of [`DispatchThread`]s with least-loaded selection
#[derive(Debug)]
pub struct DispatchQueue {
    threads: Vec<DispatchThread>,
}

impl DispatchQueue {
    /// Create a pool of `pool` workers named `jscore-dispatch-{pool id}-{index}`.
    ///
    /// `pool` is clamped to `1..=MAX_POOL_SIZE`.
    pub fn new(pool: usize) -> DispatchResult<Self> {
        Self::with_name("jscore-dispatch", pool)
    }

    /// Create a pool whose worker threads are named `{prefix}-{pool id}-{index}`
    pub fn with_name(prefix: &str, pool: usize) -> DispatchResult<Self> {
        let pool = pool.clamp(1, MAX_POOL_SIZE);
        let pool_id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);

        let threads = (0..pool)
            .map(|i| DispatchThread::spawn(format!("{}-{}-{}", prefix, pool_id, i)))
            .collect::<DispatchResult<Vec<_>>>()?;

        debug!(pool_id, size = pool, prefix, "Dispatch queue created");
        Ok(Self { threads })
    }

    /// Number of workers in the pool
    pub fn pool_size(&self) -> usize {
        self.threads.len()
    }

    /// Pending messages per worker, in index order
    pub fn depths(&self) -> Vec<usize> {
        self.threads.iter().map(DispatchThread::depth).collect()
    }

    /// Total pending messages across the pool
    pub fn depth(&self) -> usize {
        self.threads.iter().map(DispatchThread::depth).sum()
    }

    /// Whether the calling thread is one of this pool's workers
    pub fn is_current(&self) -> bool {
        self.threads.iter().any(DispatchThread::is_current)
    }

    /// Worker ids in index order
    pub fn worker_ids(&self) -> Vec<WorkerId> {
        self.threads.iter().map(DispatchThread::id).collect()
    }

    /// Run `f` on a pool worker and block until it has finished.
    ///
    /// See [`DispatchThread::submit_sync`] for the inline self-dispatch rule.
    pub fn submit_sync<F, R>(&self, f: F) -> DispatchResult<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.pick_thread().submit_sync(f)
    }

    /// Queue `f` on a pool worker and return immediately
    pub fn submit_async<F>(&self, f: F) -> DispatchResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.pick_thread().submit_async(f)
    }

    /// Queue `f` on a pool worker and get its result through a oneshot.
    ///
    /// The receiver resolves to an error if the worker stops before `f` runs
    /// or `f` panics.
    pub fn submit_with_reply<F, R>(&self, f: F) -> DispatchResult<oneshot::Receiver<R>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.submit_async(move || {
            let _ = tx.send(f());
        })?;
        Ok(rx)
    }

    /// Stop every worker and wait for them to exit.
    ///
    /// Work already queued runs first; synchronous submissions queued after
    /// a worker's destruct message fail with [`DispatchError::Stopped`].
    pub fn shutdown(&self) -> DispatchResult<()> {
        let mut first_error: Option<DispatchError> = None;
        for thread in &self.threads {
            if let Err(e) = thread.stop() {
                first_error.get_or_insert(e);
            }
        }
        for thread in &self.threads {
            thread.join();
        }
        first_error.map_or(Ok(()), Err)
    }

    fn pick_thread(&self) -> &DispatchThread {
        &self.threads[self.pick_index(current_worker())]
    }

    /// Index of the worker that should take work submitted by `caller`
    fn pick_index(&self, caller: Option<WorkerId>) -> usize {
        if let Some(caller) = caller
            && let Some(i) = self.threads.iter().position(|t| t.id() == caller)
        {
            return i;
        }
        least_loaded(&self.depths())
    }
}

/// Index of the smallest depth, lowest index on ties
fn least_loaded(depths: &[usize]) -> usize {
    depths
        .iter()
        .enumerate()
        .min_by_key(|&(i, &depth)| (depth, i))
        .map_or(0, |(i, _)| i)
}
