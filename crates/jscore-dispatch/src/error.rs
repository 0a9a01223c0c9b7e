//! Error types for the dispatch layer
//!
//! Queue-level failures are local to one submission: callers recover or
//! abort that submission and keep using the queue.

use std::io;
use thiserror::Error;

/// Result type alias for [`WorkQueue`](crate::WorkQueue) operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Result type alias for worker and pool operations
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Outcomes of a queue operation other than success
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// Growing the queue storage failed
    #[error("Out of memory while enqueueing message")]
    OutOfMemory,

    /// A bounded `get` saw no message before its deadline.
    ///
    /// This is a normal outcome, the queue is left untouched.
    #[error("Timed out waiting for a message")]
    TimedOut,

    /// The queue was closed by its consumer and holds no more messages
    #[error("Queue is closed")]
    Closed,
}

/// Errors reported by [`DispatchThread`](crate::DispatchThread) and
/// [`DispatchQueue`](crate::DispatchQueue)
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The worker queue could not grow to hold the submission
    #[error("Out of memory while dispatching")]
    OutOfMemory,

    /// The worker was stopped before the submission could run
    #[error("Dispatch thread stopped")]
    Stopped,

    /// The submitted closure panicked on the worker thread
    #[error("Dispatched closure panicked")]
    Panicked,

    /// The worker thread could not be spawned
    #[error("Failed to spawn dispatch thread: {0}")]
    Spawn(#[source] io::Error),
}

impl From<QueueError> for DispatchError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::OutOfMemory => Self::OutOfMemory,
            // A worker queue only times out when asked to, and closes on stop
            QueueError::TimedOut | QueueError::Closed => Self::Stopped,
        }
    }
}
