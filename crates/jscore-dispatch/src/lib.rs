//! jscore-dispatch - single-thread affinity scheduling for script engine contexts.
//!
//! Script engines such as JavaScriptCore must not be touched concurrently from
//! several threads for the same context group. This crate funnels work for a
//! context onto dedicated threads while letting callers on any thread submit
//! synchronously or asynchronously.
//!
//! # Architecture
//!
//! ```text
//! caller thread ──submit_sync──▶ DispatchQueue ──pick──▶ DispatchThread
//!                                 (1..=16 workers)        ├─ WorkQueue<Message>
//!                                                         └─ OS thread loop
//!       ▲                                                        │
//!       └────────── reply WorkQueue (one per sync call) ◀────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use jscore_dispatch::DispatchQueue;
//!
//! let queue = DispatchQueue::new(1).unwrap();
//! let answer = queue.submit_sync(|| 6 * 7).unwrap();
//! assert_eq!(answer, 42);
//! queue.shutdown().unwrap();
//! ```

mod error;
mod pool;
mod queue;
mod thread;

pub use error::{DispatchError, DispatchResult, QueueError, QueueResult};
pub use pool::{DispatchQueue, MAX_POOL_SIZE};
pub use queue::{POOL_RESERVE, WorkQueue};
pub use thread::{DispatchThread, WorkerGuard, WorkerId, current_worker, enter_worker};
