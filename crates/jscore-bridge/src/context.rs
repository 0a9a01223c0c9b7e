//! A script context bound to its own dispatch pool
//!
//! [`ContextWrapper`] owns one engine context and the [`DispatchQueue`] every
//! operation on that context runs through. The context is created on a pool
//! worker and released on a pool worker, so the engine only ever sees it from
//! the pool's threads.

use crate::config::BridgeConfig;
use crate::engine::Engine;
use crate::error::{BridgeError, BridgeResult};
use crate::refs::{ContextGroupRef, ContextRef};
use jscore_dispatch::DispatchQueue;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// An engine context together with its dispatch pool
pub struct ContextWrapper {
    context: ContextRef,
    engine: Arc<dyn Engine>,
    queue: DispatchQueue,
}

impl ContextWrapper {
    /// Spawn the pool and create the context on it.
    ///
    /// With `group` the context joins that group, otherwise the engine makes
    /// a fresh one.
    pub fn create(
        engine: Arc<dyn Engine>,
        group: Option<ContextGroupRef>,
        config: &BridgeConfig,
    ) -> BridgeResult<Self> {
        let queue = DispatchQueue::with_name(&config.thread_name, config.context_pool_size)?;

        let create = engine.clone();
        let context = queue.submit_sync(move || create.global_context_create(group))?;
        if context.is_null() {
            if let Err(e) = queue.shutdown() {
                warn!(error = %e, "Failed to stop pool of unborn context");
            }
            return Err(BridgeError::context_creation(match group {
                Some(group) => format!("engine returned no context in {}", group),
                None => "engine returned no context".to_string(),
            }));
        }

        debug!(%context, pool = queue.pool_size(), "Context created");
        Ok(Self {
            context,
            engine,
            queue,
        })
    }

    /// The engine context
    pub fn context(&self) -> ContextRef {
        self.context
    }

    /// The pool all work on this context runs through
    pub fn queue(&self) -> &DispatchQueue {
        &self.queue
    }

    /// Pending operations across the pool
    pub fn depth(&self) -> usize {
        self.queue.depth()
    }

    /// Run `f` against the context on its pool and wait for the result
    pub fn sync<F, R>(&self, f: F) -> BridgeResult<R>
    where
        F: FnOnce(&dyn Engine, ContextRef) -> R + Send + 'static,
        R: Send + 'static,
    {
        let engine = self.engine.clone();
        let context = self.context;
        Ok(self.queue.submit_sync(move || f(engine.as_ref(), context))?)
    }

    /// Queue `f` against the context and return immediately
    pub fn dispatch_async<F>(&self, f: F) -> BridgeResult<()>
    where
        F: FnOnce(&dyn Engine, ContextRef) + Send + 'static,
    {
        let engine = self.engine.clone();
        let context = self.context;
        Ok(self.queue.submit_async(move || f(engine.as_ref(), context))?)
    }
}

impl Drop for ContextWrapper {
    fn drop(&mut self) {
        let engine = self.engine.clone();
        let context = self.context;
        if let Err(e) = self
            .queue
            .submit_sync(move || engine.global_context_release(context))
        {
            warn!(%context, error = %e, "Failed to release context on its worker");
        }
        if let Err(e) = self.queue.shutdown() {
            warn!(%context, error = %e, "Failed to stop context pool");
        }
        debug!(%context, "Context destroyed");
    }
}

impl fmt::Debug for ContextWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextWrapper")
            .field("context", &self.context)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}
