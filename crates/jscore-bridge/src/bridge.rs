//! The inbound operation surface
//!
//! [`Bridge`] is what the managed runtime calls. It owns the context table,
//! the object registry and a small shared pool, and routes every operation to
//! the right worker:
//!
//! - context, value and object operations run on the owning context's pool
//! - strings, context groups and property name arrays run on the shared pool
//!
//! Operations that can throw return a [`ReturnObject`]; the exception travels
//! in its `exception` field and is never turned into an error.

use crate::boundary::{Boundary, HostRef};
use crate::callbacks::CallbackRouter;
use crate::config::BridgeConfig;
use crate::context::ContextWrapper;
use crate::engine::{ClassDefinition, ClassHooks, Engine, HostCallbacks};
use crate::error::{BridgeError, BridgeResult};
use crate::handles::{Handle, HandleTable};
use crate::refs::{
    ClassRef, ContextGroupRef, ContextRef, ObjectKind, ObjectRef, PropertyAttributes,
    PropertyNameArrayRef, ReturnObject, StringRef, ValueRef, ValueType,
};
use crate::registry::{HandleRegistry, HostKind, HostObject};
use jscore_dispatch::DispatchQueue;
use std::sync::Arc;
use tracing::debug;

/// Host-side handle of a context wrapper
pub type ContextHandle = Handle;

/// Entry point for every operation the host performs on the engine
pub struct Bridge {
    engine: Arc<dyn Engine>,
    config: BridgeConfig,
    contexts: HandleTable<ContextWrapper>,
    registry: Arc<HandleRegistry>,
    router: Arc<CallbackRouter>,
    shared: DispatchQueue,
}

impl Bridge {
    /// Create a bridge over `engine`, forwarding callbacks to `boundary`
    pub fn new(
        engine: Arc<dyn Engine>,
        boundary: Arc<dyn Boundary>,
        config: BridgeConfig,
    ) -> BridgeResult<Self> {
        let registry = Arc::new(HandleRegistry::new());
        let router = Arc::new(CallbackRouter::new(registry.clone(), boundary).with_engine(&engine));
        let shared = DispatchQueue::with_name(
            &format!("{}-shared", config.thread_name),
            config.shared_pool_size,
        )?;
        debug!(?config, "Bridge created");
        Ok(Self {
            engine,
            config,
            contexts: HandleTable::new(),
            registry,
            router,
            shared,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Registry of host-backed objects
    pub fn registry(&self) -> &Arc<HandleRegistry> {
        &self.registry
    }

    /// Callback hooks installed on host-backed classes
    pub fn callbacks(&self) -> Arc<dyn HostCallbacks> {
        self.router.clone()
    }

    /// The shared pool for context-independent work
    pub fn shared_queue(&self) -> &DispatchQueue {
        &self.shared
    }

    /// Number of live context wrappers
    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    /// Resolve a context handle
    pub fn context(&self, handle: ContextHandle) -> BridgeResult<Arc<ContextWrapper>> {
        self.contexts
            .get(handle)
            .ok_or(BridgeError::InvalidHandle(handle.as_raw()))
    }

    fn on_context<F, R>(&self, handle: ContextHandle, f: F) -> BridgeResult<R>
    where
        F: FnOnce(&dyn Engine, ContextRef) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.context(handle)?.sync(f)
    }

    fn on_shared<F, R>(&self, f: F) -> BridgeResult<R>
    where
        F: FnOnce(&dyn Engine) -> R + Send + 'static,
        R: Send + 'static,
    {
        let engine = self.engine.clone();
        Ok(self.shared.submit_sync(move || f(engine.as_ref()))?)
    }

    // ---- Context groups ----

    pub fn context_group_create(&self) -> BridgeResult<ContextGroupRef> {
        self.on_shared(|engine| engine.context_group_create())
    }

    pub fn context_group_retain(&self, group: ContextGroupRef) -> BridgeResult<ContextGroupRef> {
        self.on_shared(move |engine| engine.context_group_retain(group))
    }

    pub fn context_group_release(&self, group: ContextGroupRef) -> BridgeResult<()> {
        self.on_shared(move |engine| engine.context_group_release(group))
    }

    // ---- Contexts ----

    /// Create a context with its own pool
    pub fn context_create(&self) -> BridgeResult<ContextHandle> {
        self.insert_context(None)
    }

    /// Create a context inside `group`
    pub fn context_create_in_group(&self, group: ContextGroupRef) -> BridgeResult<ContextHandle> {
        self.insert_context(Some(group))
    }

    fn insert_context(&self, group: Option<ContextGroupRef>) -> BridgeResult<ContextHandle> {
        let wrapper = ContextWrapper::create(self.engine.clone(), group, &self.config)?;
        let context = wrapper.context();
        let handle = self.contexts.insert(wrapper);
        debug!(%handle, %context, "Context registered");
        Ok(handle)
    }

    /// Destroy a context wrapper.
    ///
    /// The engine context is released on its worker once the last in-flight
    /// operation holding the wrapper returns.
    pub fn context_finalize(&self, handle: ContextHandle) -> BridgeResult<()> {
        let wrapper = self
            .contexts
            .remove(handle)
            .ok_or(BridgeError::InvalidHandle(handle.as_raw()))?;
        debug!(%handle, context = %wrapper.context(), "Context finalized");
        Ok(())
    }

    pub fn context_retain(&self, handle: ContextHandle) -> BridgeResult<ContextRef> {
        self.on_context(handle, |engine, ctx| engine.global_context_retain(ctx))
    }

    pub fn context_release(&self, handle: ContextHandle) -> BridgeResult<()> {
        self.on_context(handle, |engine, ctx| engine.global_context_release(ctx))
    }

    pub fn context_global_object(&self, handle: ContextHandle) -> BridgeResult<ObjectRef> {
        self.on_context(handle, |engine, ctx| engine.context_global_object(ctx))
    }

    pub fn context_group(&self, handle: ContextHandle) -> BridgeResult<ContextGroupRef> {
        self.on_context(handle, |engine, ctx| engine.context_group(ctx))
    }

    pub fn evaluate_script(
        &self,
        handle: ContextHandle,
        script: StringRef,
        this: ObjectRef,
        source_url: StringRef,
        starting_line: i32,
    ) -> BridgeResult<ReturnObject> {
        self.on_context(handle, move |engine, ctx| {
            ReturnObject::from(engine.evaluate_script(ctx, script, this, source_url, starting_line))
        })
    }

    pub fn check_script_syntax(
        &self,
        handle: ContextHandle,
        script: StringRef,
        source_url: StringRef,
        starting_line: i32,
    ) -> BridgeResult<ReturnObject> {
        self.on_context(handle, move |engine, ctx| {
            ReturnObject::from(engine.check_script_syntax(ctx, script, source_url, starting_line))
        })
    }

    /// Queue a collection on the context's worker without waiting
    pub fn garbage_collect(&self, handle: ContextHandle) -> BridgeResult<()> {
        self.context(handle)?
            .dispatch_async(|engine, ctx| engine.garbage_collect(ctx))
    }

    // ---- Strings ----

    pub fn string_create_utf8(&self, text: &str) -> BridgeResult<StringRef> {
        let text = text.to_owned();
        self.on_shared(move |engine| engine.string_create_utf8(&text))
    }

    pub fn string_create_utf16(&self, chars: &[u16]) -> BridgeResult<StringRef> {
        let chars = chars.to_vec();
        self.on_shared(move |engine| engine.string_create_utf16(&chars))
    }

    pub fn string_retain(&self, string: StringRef) -> BridgeResult<StringRef> {
        self.on_shared(move |engine| engine.string_retain(string))
    }

    /// Release without waiting for the shared pool
    pub fn string_release(&self, string: StringRef) -> BridgeResult<()> {
        let engine = self.engine.clone();
        Ok(self
            .shared
            .submit_async(move || engine.string_release(string))?)
    }

    pub fn string_length(&self, string: StringRef) -> BridgeResult<usize> {
        self.on_shared(move |engine| engine.string_length(string))
    }

    pub fn string_to_utf8(&self, string: StringRef) -> BridgeResult<String> {
        self.on_shared(move |engine| engine.string_to_utf8(string))
    }

    pub fn string_is_equal(&self, a: StringRef, b: StringRef) -> BridgeResult<bool> {
        self.on_shared(move |engine| engine.string_is_equal(a, b))
    }

    pub fn string_is_equal_to_utf8(&self, a: StringRef, b: &str) -> BridgeResult<bool> {
        let b = b.to_owned();
        self.on_shared(move |engine| engine.string_is_equal_to_utf8(a, &b))
    }

    // ---- Values ----

    pub fn value_type(&self, handle: ContextHandle, value: ValueRef) -> BridgeResult<ValueType> {
        self.on_context(handle, move |engine, ctx| engine.value_type(ctx, value))
    }

    pub fn value_is_equal(
        &self,
        handle: ContextHandle,
        a: ValueRef,
        b: ValueRef,
    ) -> BridgeResult<ReturnObject> {
        self.on_context(handle, move |engine, ctx| {
            ReturnObject::from(engine.value_is_equal(ctx, a, b))
        })
    }

    pub fn value_is_strict_equal(
        &self,
        handle: ContextHandle,
        a: ValueRef,
        b: ValueRef,
    ) -> BridgeResult<bool> {
        self.on_context(handle, move |engine, ctx| {
            engine.value_is_strict_equal(ctx, a, b)
        })
    }

    pub fn value_is_instance_of(
        &self,
        handle: ContextHandle,
        value: ValueRef,
        constructor: ObjectRef,
    ) -> BridgeResult<ReturnObject> {
        self.on_context(handle, move |engine, ctx| {
            ReturnObject::from(engine.value_is_instance_of(ctx, value, constructor))
        })
    }

    pub fn value_make_undefined(&self, handle: ContextHandle) -> BridgeResult<ValueRef> {
        self.on_context(handle, |engine, ctx| engine.value_make_undefined(ctx))
    }

    pub fn value_make_null(&self, handle: ContextHandle) -> BridgeResult<ValueRef> {
        self.on_context(handle, |engine, ctx| engine.value_make_null(ctx))
    }

    pub fn value_make_boolean(&self, handle: ContextHandle, value: bool) -> BridgeResult<ValueRef> {
        self.on_context(handle, move |engine, ctx| {
            engine.value_make_boolean(ctx, value)
        })
    }

    pub fn value_make_number(&self, handle: ContextHandle, value: f64) -> BridgeResult<ValueRef> {
        self.on_context(handle, move |engine, ctx| {
            engine.value_make_number(ctx, value)
        })
    }

    pub fn value_make_string(
        &self,
        handle: ContextHandle,
        string: StringRef,
    ) -> BridgeResult<ValueRef> {
        self.on_context(handle, move |engine, ctx| {
            engine.value_make_string(ctx, string)
        })
    }

    pub fn value_make_from_json(
        &self,
        handle: ContextHandle,
        json: StringRef,
    ) -> BridgeResult<ValueRef> {
        self.on_context(handle, move |engine, ctx| {
            engine.value_make_from_json(ctx, json)
        })
    }

    pub fn value_to_json(
        &self,
        handle: ContextHandle,
        value: ValueRef,
        indent: u32,
    ) -> BridgeResult<ReturnObject> {
        self.on_context(handle, move |engine, ctx| {
            ReturnObject::from(engine.value_to_json(ctx, value, indent))
        })
    }

    pub fn value_to_boolean(&self, handle: ContextHandle, value: ValueRef) -> BridgeResult<bool> {
        self.on_context(handle, move |engine, ctx| engine.value_to_boolean(ctx, value))
    }

    pub fn value_to_number(
        &self,
        handle: ContextHandle,
        value: ValueRef,
    ) -> BridgeResult<ReturnObject> {
        self.on_context(handle, move |engine, ctx| {
            ReturnObject::from(engine.value_to_number(ctx, value))
        })
    }

    pub fn value_to_string_copy(
        &self,
        handle: ContextHandle,
        value: ValueRef,
    ) -> BridgeResult<ReturnObject> {
        self.on_context(handle, move |engine, ctx| {
            ReturnObject::from(engine.value_to_string_copy(ctx, value))
        })
    }

    pub fn value_to_object(
        &self,
        handle: ContextHandle,
        value: ValueRef,
    ) -> BridgeResult<ReturnObject> {
        self.on_context(handle, move |engine, ctx| {
            ReturnObject::from(engine.value_to_object(ctx, value))
        })
    }

    pub fn value_protect(&self, handle: ContextHandle, value: ValueRef) -> BridgeResult<()> {
        self.on_context(handle, move |engine, ctx| engine.value_protect(ctx, value))
    }

    pub fn value_unprotect(&self, handle: ContextHandle, value: ValueRef) -> BridgeResult<()> {
        self.on_context(handle, move |engine, ctx| engine.value_unprotect(ctx, value))
    }

    // ---- Objects ----

    /// Make a plain object
    pub fn object_make(&self, handle: ContextHandle) -> BridgeResult<ObjectRef> {
        self.on_context(handle, |engine, ctx| {
            engine.object_make(ctx, ClassRef::NULL)
        })
    }

    pub fn object_make_array(
        &self,
        handle: ContextHandle,
        elements: &[ValueRef],
    ) -> BridgeResult<ReturnObject> {
        self.object_make_builtin(handle, ObjectKind::Array, elements)
    }

    pub fn object_make_date(
        &self,
        handle: ContextHandle,
        args: &[ValueRef],
    ) -> BridgeResult<ReturnObject> {
        self.object_make_builtin(handle, ObjectKind::Date, args)
    }

    pub fn object_make_error(
        &self,
        handle: ContextHandle,
        args: &[ValueRef],
    ) -> BridgeResult<ReturnObject> {
        self.object_make_builtin(handle, ObjectKind::Error, args)
    }

    pub fn object_make_regexp(
        &self,
        handle: ContextHandle,
        args: &[ValueRef],
    ) -> BridgeResult<ReturnObject> {
        self.object_make_builtin(handle, ObjectKind::RegExp, args)
    }

    fn object_make_builtin(
        &self,
        handle: ContextHandle,
        kind: ObjectKind,
        args: &[ValueRef],
    ) -> BridgeResult<ReturnObject> {
        let args = args.to_vec();
        self.on_context(handle, move |engine, ctx| {
            ReturnObject::from(engine.object_make_builtin(ctx, kind, &args))
        })
    }

    /// Compile a function from source
    pub fn object_make_function(
        &self,
        handle: ContextHandle,
        name: StringRef,
        parameters: &[StringRef],
        body: StringRef,
        source_url: StringRef,
        starting_line: i32,
    ) -> BridgeResult<ReturnObject> {
        let parameters = parameters.to_vec();
        self.on_context(handle, move |engine, ctx| {
            ReturnObject::from(
                engine.object_make_function(ctx, name, &parameters, body, source_url, starting_line),
            )
        })
    }

    /// Make an object whose finalization is reported to `host`
    pub fn object_make_with_finalize_callback(
        &self,
        handle: ContextHandle,
        host: HostRef,
    ) -> BridgeResult<ObjectRef> {
        self.make_host_object(handle, host, HostKind::Instance, StringRef::NULL)
    }

    /// Make a callable object whose calls are forwarded to `host`
    pub fn object_make_function_with_callback(
        &self,
        handle: ContextHandle,
        host: HostRef,
        name: StringRef,
    ) -> BridgeResult<ObjectRef> {
        self.make_host_object(handle, host, HostKind::Function, name)
    }

    /// Drop the host record of a callback function.
    ///
    /// Returns `false` if the function had no record (already released).
    pub fn object_release_function_with_callback(
        &self,
        handle: ContextHandle,
        function: ObjectRef,
    ) -> BridgeResult<bool> {
        let router = self.router.clone();
        self.on_context(handle, move |_, _| router.release(function))
    }

    fn make_host_object(
        &self,
        handle: ContextHandle,
        host: HostRef,
        kind: HostKind,
        name: StringRef,
    ) -> BridgeResult<ObjectRef> {
        let router = self.router.clone();
        self.on_context(handle, move |engine, ctx| {
            let hooks = match kind {
                HostKind::Instance => ClassHooks::FINALIZE,
                HostKind::Function => ClassHooks::CALLABLE,
            };
            let name = (!name.is_null()).then(|| engine.string_to_utf8(name));
            let callbacks: Arc<dyn HostCallbacks> = router.clone();
            let class = engine.class_create(ClassDefinition {
                name,
                hooks,
                callbacks,
            });
            let object = engine.object_make(ctx, class);
            if object.is_null() {
                engine.class_release(class);
                return ObjectRef::NULL;
            }
            // Registered before any other work on this context can reach it
            router
                .registry()
                .register(Arc::new(HostObject::new(object, class, host, kind, ctx)));
            object
        })
    }

    pub fn object_prototype(
        &self,
        handle: ContextHandle,
        object: ObjectRef,
    ) -> BridgeResult<ValueRef> {
        self.on_context(handle, move |engine, ctx| engine.object_prototype(ctx, object))
    }

    pub fn object_set_prototype(
        &self,
        handle: ContextHandle,
        object: ObjectRef,
        prototype: ValueRef,
    ) -> BridgeResult<()> {
        self.on_context(handle, move |engine, ctx| {
            engine.object_set_prototype(ctx, object, prototype)
        })
    }

    pub fn object_has_property(
        &self,
        handle: ContextHandle,
        object: ObjectRef,
        name: StringRef,
    ) -> BridgeResult<bool> {
        self.on_context(handle, move |engine, ctx| {
            engine.object_has_property(ctx, object, name)
        })
    }

    pub fn object_get_property(
        &self,
        handle: ContextHandle,
        object: ObjectRef,
        name: StringRef,
    ) -> BridgeResult<ReturnObject> {
        self.on_context(handle, move |engine, ctx| {
            ReturnObject::from(engine.object_get_property(ctx, object, name))
        })
    }

    pub fn object_set_property(
        &self,
        handle: ContextHandle,
        object: ObjectRef,
        name: StringRef,
        value: ValueRef,
        attributes: PropertyAttributes,
    ) -> BridgeResult<ReturnObject> {
        self.on_context(handle, move |engine, ctx| {
            ReturnObject::from(engine.object_set_property(ctx, object, name, value, attributes))
        })
    }

    pub fn object_delete_property(
        &self,
        handle: ContextHandle,
        object: ObjectRef,
        name: StringRef,
    ) -> BridgeResult<ReturnObject> {
        self.on_context(handle, move |engine, ctx| {
            ReturnObject::from(engine.object_delete_property(ctx, object, name))
        })
    }

    pub fn object_get_property_at_index(
        &self,
        handle: ContextHandle,
        object: ObjectRef,
        index: u32,
    ) -> BridgeResult<ReturnObject> {
        self.on_context(handle, move |engine, ctx| {
            ReturnObject::from(engine.object_get_property_at_index(ctx, object, index))
        })
    }

    pub fn object_set_property_at_index(
        &self,
        handle: ContextHandle,
        object: ObjectRef,
        index: u32,
        value: ValueRef,
    ) -> BridgeResult<ReturnObject> {
        self.on_context(handle, move |engine, ctx| {
            ReturnObject::from(engine.object_set_property_at_index(ctx, object, index, value))
        })
    }

    pub fn object_is_function(&self, handle: ContextHandle, object: ObjectRef) -> BridgeResult<bool> {
        self.on_context(handle, move |engine, ctx| engine.object_is_function(ctx, object))
    }

    pub fn object_is_constructor(
        &self,
        handle: ContextHandle,
        object: ObjectRef,
    ) -> BridgeResult<bool> {
        self.on_context(handle, move |engine, ctx| {
            engine.object_is_constructor(ctx, object)
        })
    }

    pub fn object_call_as_function(
        &self,
        handle: ContextHandle,
        object: ObjectRef,
        this: ObjectRef,
        args: &[ValueRef],
    ) -> BridgeResult<ReturnObject> {
        let args = args.to_vec();
        self.on_context(handle, move |engine, ctx| {
            ReturnObject::from(engine.object_call_as_function(ctx, object, this, &args))
        })
    }

    pub fn object_call_as_constructor(
        &self,
        handle: ContextHandle,
        object: ObjectRef,
        args: &[ValueRef],
    ) -> BridgeResult<ReturnObject> {
        let args = args.to_vec();
        self.on_context(handle, move |engine, ctx| {
            ReturnObject::from(engine.object_call_as_constructor(ctx, object, &args))
        })
    }

    // ---- Property name arrays ----

    pub fn object_copy_property_names(
        &self,
        handle: ContextHandle,
        object: ObjectRef,
    ) -> BridgeResult<PropertyNameArrayRef> {
        self.on_context(handle, move |engine, ctx| {
            engine.object_copy_property_names(ctx, object)
        })
    }

    pub fn property_names(&self, array: PropertyNameArrayRef) -> BridgeResult<Vec<StringRef>> {
        self.on_shared(move |engine| engine.property_names(array))
    }

    pub fn property_names_release(&self, array: PropertyNameArrayRef) -> BridgeResult<()> {
        self.on_shared(move |engine| engine.property_name_array_release(array))
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        let contexts = self.contexts.drain();
        debug!(contexts = contexts.len(), "Bridge shutting down");
        drop(contexts);
    }
}
