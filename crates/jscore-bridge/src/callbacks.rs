//! Routing of engine callbacks back to the host
//!
//! Every host-backed class is created with a [`CallbackRouter`] as its
//! [`HostCallbacks`]. When the engine fires a hook, the router resolves the
//! invoking object through the [`HandleRegistry`] and forwards the call to the
//! [`Boundary`] with the fixed argument layout of the matching
//! [`CallbackMethod`](crate::boundary::CallbackMethod). An object with no
//! record left (already finalized or released) turns the hook into a no-op.

use crate::boundary::{
    Arg, Boundary, CONSTRUCTOR_CALLBACK, FINALIZE_CALLBACK, FUNCTION_CALLBACK,
    HAS_INSTANCE_CALLBACK, Invocation,
};
use crate::engine::{Engine, HostCallbacks};
use crate::refs::{Completion, ContextRef, ObjectRef, ValueRef};
use crate::registry::{HandleRegistry, HostKind, HostObject};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// Forwards engine hooks to the host via the registry
pub struct CallbackRouter {
    registry: Arc<HandleRegistry>,
    boundary: Arc<dyn Boundary>,
    // Classes hold the router, the engine holds the classes
    engine: Option<Weak<dyn Engine>>,
}

impl CallbackRouter {
    pub fn new(registry: Arc<HandleRegistry>, boundary: Arc<dyn Boundary>) -> Self {
        Self {
            registry,
            boundary,
            engine: None,
        }
    }

    /// Release classes of torn down records through `engine`
    pub fn with_engine(mut self, engine: &Arc<dyn Engine>) -> Self {
        self.engine = Some(Arc::downgrade(engine));
        self
    }

    pub fn registry(&self) -> &Arc<HandleRegistry> {
        &self.registry
    }

    /// Unregister `object` and tear its record down.
    ///
    /// Returns `false` if the object had no record.
    pub fn release(&self, object: ObjectRef) -> bool {
        match self.registry.unregister(object) {
            Some(record) => {
                self.teardown(&record);
                true
            }
            None => false,
        }
    }

    /// Run the one-time teardown of a record already removed from the registry
    fn teardown(&self, record: &HostObject) {
        if !record.begin_teardown() {
            return;
        }
        let object = record.object();
        if record.kind() == HostKind::Instance {
            self.boundary.invoke(
                record.host(),
                &FINALIZE_CALLBACK,
                &[Arg::Long(object.as_raw())],
            );
        }
        match self.engine.as_ref().and_then(Weak::upgrade) {
            Some(engine) => engine.class_release(record.class()),
            None => debug!(%object, "No engine, class not released"),
        }
        self.boundary.release_host(record.host());
        debug!(%object, host = %record.host(), kind = ?record.kind(), "Host object torn down");
    }

    fn resolve(&self, object: ObjectRef, hook: &'static str) -> Option<Arc<HostObject>> {
        let record = self.registry.lookup(object);
        if record.is_none() {
            trace!(%object, hook, "No host record, callback ignored");
        }
        record
    }
}

fn raw_args(args: &[ValueRef]) -> Vec<i64> {
    args.iter().map(|arg| arg.as_raw()).collect()
}

fn completion<T>(invocation: Invocation, value: impl FnOnce(i64) -> T, empty: T) -> Completion<T> {
    if invocation.exception != 0 {
        Completion::thrown(empty, ValueRef::from_raw(invocation.exception))
    } else {
        Completion::ok(value(invocation.result))
    }
}

impl HostCallbacks for CallbackRouter {
    fn finalize(&self, object: ObjectRef) {
        if let Some(record) = self.registry.unregister(object) {
            self.teardown(&record);
        } else {
            trace!(%object, "Finalize for unknown object");
        }
    }

    fn call_as_function(
        &self,
        ctx: ContextRef,
        function: ObjectRef,
        this: ObjectRef,
        args: &[ValueRef],
    ) -> Completion<ValueRef> {
        let Some(record) = self.resolve(function, "function") else {
            return Completion::ok(ValueRef::NULL);
        };
        let args = raw_args(args);
        let invocation = self.boundary.invoke(
            record.host(),
            &FUNCTION_CALLBACK,
            &[
                Arg::Long(ctx.as_raw()),
                Arg::Long(function.as_raw()),
                Arg::Long(this.as_raw()),
                Arg::LongArray(&args),
                Arg::Exception,
            ],
        );
        completion(invocation, ValueRef::from_raw, ValueRef::NULL)
    }

    fn call_as_constructor(
        &self,
        ctx: ContextRef,
        constructor: ObjectRef,
        args: &[ValueRef],
    ) -> Completion<ObjectRef> {
        let Some(record) = self.resolve(constructor, "constructor") else {
            return Completion::ok(ObjectRef::NULL);
        };
        let args = raw_args(args);
        let invocation = self.boundary.invoke(
            record.host(),
            &CONSTRUCTOR_CALLBACK,
            &[
                Arg::Long(ctx.as_raw()),
                Arg::Long(constructor.as_raw()),
                Arg::LongArray(&args),
                Arg::Exception,
            ],
        );
        completion(invocation, ObjectRef::from_raw, ObjectRef::NULL)
    }

    fn has_instance(
        &self,
        ctx: ContextRef,
        constructor: ObjectRef,
        candidate: ValueRef,
    ) -> Completion<bool> {
        let Some(record) = self.resolve(constructor, "has_instance") else {
            return Completion::ok(false);
        };
        let invocation = self.boundary.invoke(
            record.host(),
            &HAS_INSTANCE_CALLBACK,
            &[
                Arg::Long(ctx.as_raw()),
                Arg::Long(constructor.as_raw()),
                Arg::Long(candidate.as_raw()),
                Arg::Exception,
            ],
        );
        completion(invocation, |result| result != 0, false)
    }
}
