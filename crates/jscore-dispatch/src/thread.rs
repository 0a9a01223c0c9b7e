//! Dedicated dispatch threads with single-thread affinity
//!
//! A [`DispatchThread`] owns one OS thread and one [`WorkQueue`]. Every closure
//! submitted to it runs on that thread, one at a time, in submission order.
//! Callers on other threads can block until their closure has run
//! ([`submit_sync`](DispatchThread::submit_sync)) or fire and forget
//! ([`submit_async`](DispatchThread::submit_async)).
//!
//! ## Self-dispatch
//!
//! A closure running on worker W that synchronously submits to W again would
//! wait forever: W is busy running the very closure that is waiting. Each
//! worker therefore marks its thread with a [`WorkerId`] token in thread-local
//! storage, and a synchronous submission that finds the caller already on the
//! target worker runs the closure inline instead of queueing it.
//!
//! ## Shutdown
//!
//! [`stop`](DispatchThread::stop) enqueues a destruct message behind all work
//! already queued. When the loop reaches it, the thread closes its queue and
//! signals every synchronous waiter still pending, without running their
//! closures, so no caller is left blocked.

use crate::error::{DispatchError, DispatchResult, QueueError};
use crate::queue::WorkQueue;
use parking_lot::Mutex;
use std::cell::Cell;
use std::fmt;
use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use tracing::{debug, error, info_span, trace, warn};

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT_WORKER: Cell<Option<WorkerId>> = const { Cell::new(None) };
}

/// Identity token of a dispatch worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(u64);

impl WorkerId {
    /// Allocate a fresh, process-unique worker id
    pub fn next() -> Self {
        Self(NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker#{}", self.0)
    }
}

/// The worker the calling thread is currently running as, if any
pub fn current_worker() -> Option<WorkerId> {
    CURRENT_WORKER.with(Cell::get)
}

/// Mark the calling thread as running on behalf of `id` until the guard drops.
///
/// Dispatch threads do this for their whole lifetime. Tests can use it to
/// exercise self-dispatch decisions without spawning threads.
pub fn enter_worker(id: WorkerId) -> WorkerGuard {
    let previous = CURRENT_WORKER.with(|current| current.replace(Some(id)));
    WorkerGuard { previous }
}

/// Restores the previous worker token when dropped
#[must_use = "the worker token is cleared as soon as the guard drops"]
pub struct WorkerGuard {
    previous: Option<WorkerId>,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        CURRENT_WORKER.with(|current| current.set(self.previous));
    }
}

type Job = Box<dyn FnOnce() + Send + 'static>;

/// How a submitted closure ended, sent back on the reply queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reply {
    Completed,
    Panicked,
    Discarded,
}

enum Message {
    Function {
        job: Job,
        reply: Option<Arc<WorkQueue<Reply>>>,
    },
    Destruct,
}

/// A single OS thread executing submitted closures in FIFO order.
pub struct DispatchThread {
    id: WorkerId,
    name: String,
    queue: Arc<WorkQueue<Message>>,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DispatchThread {
    /// Spawn a new dispatch thread with the given OS thread name
    ///
    /// A name containing a NUL byte is rejected with [`DispatchError::Spawn`].
    pub fn spawn(name: impl Into<String>) -> DispatchResult<Self> {
        let name = name.into();
        if name.contains('\0') {
            return Err(DispatchError::Spawn(io::Error::new(
                io::ErrorKind::InvalidInput,
                "thread name contains a NUL byte",
            )));
        }
        let id = WorkerId::next();
        let queue = Arc::new(WorkQueue::new());
        let running = Arc::new(AtomicBool::new(true));

        let handle = {
            let queue = queue.clone();
            let running = running.clone();
            let thread_name = name.clone();
            std::thread::Builder::new()
                .name(name.clone())
                .spawn(move || run(id, &thread_name, &queue, &running))
                .map_err(DispatchError::Spawn)?
        };

        debug!(worker = %id, name = %name, "Dispatch thread spawned");
        Ok(Self {
            id,
            name,
            queue,
            running,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// This worker's identity token
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// OS thread name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the calling thread is this worker
    pub fn is_current(&self) -> bool {
        current_worker() == Some(self.id)
    }

    /// Whether the worker loop is still accepting work
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Number of messages waiting in this worker's queue
    pub fn depth(&self) -> usize {
        self.queue.len()
    }

    /// Run `f` on this worker and block until it has finished.
    ///
    /// When called from this worker itself, `f` runs inline on the caller's
    /// stack instead of being queued.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::Stopped`] if the worker shut down before `f` ran
    /// - [`DispatchError::Panicked`] if `f` panicked on the worker
    /// - [`DispatchError::OutOfMemory`] if the submission could not be queued
    pub fn submit_sync<F, R>(&self, f: F) -> DispatchResult<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_current() {
            trace!(worker = %self.id, "Self-dispatch, running inline");
            return Ok(f());
        }

        let slot = Arc::new(Mutex::new(None));
        let reply = Arc::new(WorkQueue::new());
        let out = slot.clone();
        self.queue.add(Message::Function {
            job: Box::new(move || {
                *out.lock() = Some(f());
            }),
            reply: Some(reply.clone()),
        })?;

        // The reply queue is private to this call and never closed
        let outcome = reply.get()?;
        match outcome {
            Reply::Completed => slot.lock().take().ok_or(DispatchError::Panicked),
            Reply::Panicked => Err(DispatchError::Panicked),
            Reply::Discarded => Err(DispatchError::Stopped),
        }
    }

    /// Queue `f` to run on this worker and return immediately.
    ///
    /// `f` runs after everything already queued on this worker and before
    /// anything queued later. Work submitted this way is queued even from
    /// the worker itself.
    pub fn submit_async<F>(&self, f: F) -> DispatchResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.queue
            .add(Message::Function {
                job: Box::new(f),
                reply: None,
            })
            .map_err(Into::into)
    }

    /// Ask the worker to stop after the work already queued.
    ///
    /// Idempotent: stopping an already stopped worker is a no-op.
    pub fn stop(&self) -> DispatchResult<()> {
        match self.queue.add(Message::Destruct) {
            Ok(()) | Err(QueueError::Closed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Wait for the worker thread to exit.
    ///
    /// Must follow [`stop`](Self::stop). Joining from the worker itself is
    /// refused with a warning and the thread is left detached.
    pub fn join(&self) {
        if self.is_current() {
            warn!(worker = %self.id, "Dispatch thread cannot join itself, detaching");
            return;
        }
        if let Some(handle) = self.handle.lock().take()
            && handle.join().is_err()
        {
            error!(worker = %self.id, "Dispatch thread terminated by panic");
        }
    }
}

impl Drop for DispatchThread {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(worker = %self.id, error = %e, "Failed to stop dispatch thread");
        }
        if self.is_current() {
            // The loop still has to reach the destruct message queued above
            warn!(worker = %self.id, "Dispatch thread dropped from itself, detaching");
            return;
        }
        self.join();
        self.queue.cleanup(true);
    }
}

impl fmt::Debug for DispatchThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchThread")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("depth", &self.depth())
            .field("running", &self.is_running())
            .finish()
    }
}

/// Worker loop: execute functions until a destruct message arrives, then
/// release every waiter still queued.
fn run(id: WorkerId, name: &str, queue: &WorkQueue<Message>, running: &AtomicBool) {
    let _worker = enter_worker(id);
    let _span = info_span!("dispatch_thread", name = %name).entered();
    debug!("Dispatch thread starting");

    loop {
        match queue.get() {
            Ok(Message::Function { job, reply }) => {
                let outcome = execute(job);
                if let Some(reply) = reply {
                    signal(&reply, outcome);
                }
            }
            Ok(Message::Destruct) => {
                debug!("Received destruct message");
                break;
            }
            Err(e) => {
                debug!(error = %e, "Dispatch queue unavailable");
                break;
            }
        }
    }

    running.store(false, Ordering::Release);

    let mut discarded = 0usize;
    for message in queue.close() {
        if let Message::Function { job, reply } = message {
            drop(job);
            if let Some(reply) = reply {
                signal(&reply, Reply::Discarded);
            }
            discarded += 1;
        }
    }

    debug!(discarded, "Dispatch thread stopped");
}

/// Run one closure, converting a panic into [`Reply::Panicked`]
fn execute(job: Job) -> Reply {
    match catch_unwind(AssertUnwindSafe(job)) {
        Ok(()) => Reply::Completed,
        Err(panic) => {
            let message = if let Some(s) = panic.downcast_ref::<&str>() {
                format!("Dispatched closure panicked: {}", s)
            } else if let Some(s) = panic.downcast_ref::<String>() {
                format!("Dispatched closure panicked: {}", s)
            } else {
                "Dispatched closure panicked: unknown payload".to_string()
            };
            error!("{}", message);
            Reply::Panicked
        }
    }
}

fn signal(reply: &WorkQueue<Reply>, outcome: Reply) {
    if let Err(e) = reply.add(outcome) {
        // A lost signal leaves its waiter blocked; there is no retry path
        error!(error = %e, "Failed to signal synchronous waiter");
    }
}
