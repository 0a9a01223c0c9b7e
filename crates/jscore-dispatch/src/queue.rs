//! Waitable FIFO queue for passing messages between threads
//!
//! [`WorkQueue`] is the primitive every dispatch thread is built on: producers
//! on any thread `add` messages, a consumer blocks in `get` until one arrives
//! (optionally with a timeout). Messages come out in strict arrival order.
//!
//! The ring buffer behind the queue doubles as its node pool. Capacity freed by
//! `get` is kept for later `add` calls, bounded relative to the recent depth so
//! a burst does not pin memory forever.

use crate::error::{QueueError, QueueResult};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Spare slots always kept around for reuse, regardless of depth.
pub const POOL_RESERVE: usize = 256;

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> QueueState<T> {
    /// Return surplus capacity to the allocator once the spare pool is
    /// far larger than the current depth warrants.
    fn trim_pool(&mut self) {
        let len = self.items.len();
        let spare = self.items.capacity() - len;
        if spare > len / 4 + POOL_RESERVE * 10 {
            self.items.shrink_to(len + len / 8 + POOL_RESERVE);
        }
    }
}

/// A thread-safe FIFO of messages with blocking and timed dequeue.
///
/// # Example
///
/// ```
/// use jscore_dispatch::WorkQueue;
/// use std::time::Duration;
///
/// let queue = WorkQueue::new();
/// queue.add("hello").unwrap();
/// assert_eq!(queue.get().unwrap(), "hello");
/// assert!(queue.get_timeout(Duration::from_millis(1)).is_err());
/// ```
pub struct WorkQueue<T> {
    state: Mutex<QueueState<T>>,
    ready: Condvar,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkQueue<T> {
    /// Create an empty, open queue
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
            }),
            ready: Condvar::new(),
        }
    }

    /// Append a message.
    ///
    /// Never blocks beyond the internal lock. When the queue goes from empty
    /// to non-empty every waiting consumer is woken; each re-checks the queue
    /// so only as many proceed as there are messages.
    ///
    /// # Errors
    ///
    /// - [`QueueError::OutOfMemory`] if storage for the message cannot be reserved
    /// - [`QueueError::Closed`] if the consumer has closed the queue
    pub fn add(&self, message: T) -> QueueResult<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(QueueError::Closed);
        }
        state
            .items
            .try_reserve(1)
            .map_err(|_| QueueError::OutOfMemory)?;

        let was_empty = state.items.is_empty();
        state.items.push_back(message);
        if was_empty {
            self.ready.notify_all();
        }
        Ok(())
    }

    /// Block until a message is available and pop it.
    ///
    /// Returns [`QueueError::Closed`] once the queue is closed and empty.
    pub fn get(&self) -> QueueResult<T> {
        self.recv(None)
    }

    /// Like [`get`](Self::get), but gives up after `timeout`.
    ///
    /// On timeout returns [`QueueError::TimedOut`] and leaves the queue unchanged.
    /// A timeout too large to represent as a deadline waits without one.
    pub fn get_timeout(&self, timeout: Duration) -> QueueResult<T> {
        self.recv(Instant::now().checked_add(timeout))
    }

    fn recv(&self, deadline: Option<Instant>) -> QueueResult<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(message) = state.items.pop_front() {
                state.trim_pool();
                return Ok(message);
            }
            if state.closed {
                return Err(QueueError::Closed);
            }
            match deadline {
                Some(deadline) => {
                    // Spurious wakeups loop back to the emptiness check
                    if self.ready.wait_until(&mut state, deadline).timed_out() {
                        return match state.items.pop_front() {
                            Some(message) => {
                                state.trim_pool();
                                Ok(message)
                            }
                            None => Err(QueueError::TimedOut),
                        };
                    }
                }
                None => self.ready.wait(&mut state),
            }
        }
    }

    /// Number of pending messages at this instant
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Whether no messages are pending at this instant
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of spare slots currently retained for reuse
    pub fn pooled(&self) -> usize {
        let state = self.state.lock();
        state.items.capacity() - state.items.len()
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Close the queue and take every message still pending.
    ///
    /// Closing and draining happen under one lock acquisition, so an `add`
    /// either lands in the returned batch or fails with
    /// [`QueueError::Closed`]. Blocked consumers are woken and see `Closed`.
    pub fn close(&self) -> Vec<T> {
        let mut state = self.state.lock();
        state.closed = true;
        let pending = state.items.drain(..).collect();
        self.ready.notify_all();
        pending
    }

    /// Drain all pending messages and release the node pool.
    ///
    /// With `free_payloads` the pending messages are dropped here and an empty
    /// vector is returned; otherwise ownership of them passes to the caller.
    /// Must not race with in-flight `add`/`get` calls on a queue that is
    /// still in use.
    pub fn cleanup(&self, free_payloads: bool) -> Vec<T> {
        let mut state = self.state.lock();
        let pending: Vec<T> = state.items.drain(..).collect();
        state.items.shrink_to_fit();
        if free_payloads {
            drop(pending);
            Vec::new()
        } else {
            pending
        }
    }
}
