//! The scripting engine as seen by the bridge
//!
//! [`Engine`] mirrors the engine's C API one call per method, using the typed
//! handles from [`refs`](crate::refs). The bridge never calls it directly from
//! a caller thread: every call is made from inside a closure running on the
//! owning context's dispatch worker (or on the shared pool for
//! context-independent calls).
//!
//! Calls that can throw return a [`Completion`]. Implementations are not
//! required to be internally synchronized per context group; affinity is what
//! the dispatch layer provides.

use crate::refs::{
    ClassRef, Completion, ContextGroupRef, ContextRef, ObjectKind, ObjectRef, PropertyAttributes,
    PropertyNameArrayRef, StringRef, ValueRef, ValueType,
};
use std::fmt;
use std::sync::Arc;

/// Engine-invoked hooks of a host-backed class.
///
/// The engine calls these from its own thread when an object of the class is
/// finalized or used as a function, constructor or `instanceof` target.
pub trait HostCallbacks: Send + Sync {
    fn finalize(&self, object: ObjectRef);

    fn call_as_function(
        &self,
        ctx: ContextRef,
        function: ObjectRef,
        this: ObjectRef,
        args: &[ValueRef],
    ) -> Completion<ValueRef>;

    fn call_as_constructor(
        &self,
        ctx: ContextRef,
        constructor: ObjectRef,
        args: &[ValueRef],
    ) -> Completion<ObjectRef>;

    fn has_instance(
        &self,
        ctx: ContextRef,
        constructor: ObjectRef,
        candidate: ValueRef,
    ) -> Completion<bool>;
}

/// Which hooks a class installs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClassHooks {
    pub finalize: bool,
    pub call_as_function: bool,
    pub call_as_constructor: bool,
    pub has_instance: bool,
}

impl ClassHooks {
    /// Finalizer only
    pub const FINALIZE: Self = Self {
        finalize: true,
        call_as_function: false,
        call_as_constructor: false,
        has_instance: false,
    };

    /// Callable as function and constructor, and an `instanceof` target
    pub const CALLABLE: Self = Self {
        finalize: false,
        call_as_function: true,
        call_as_constructor: true,
        has_instance: true,
    };
}

/// Description of a host-backed class handed to [`Engine::class_create`]
#[derive(Clone)]
pub struct ClassDefinition {
    pub name: Option<String>,
    pub hooks: ClassHooks,
    pub callbacks: Arc<dyn HostCallbacks>,
}

impl fmt::Debug for ClassDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDefinition")
            .field("name", &self.name)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

/// The wrapped scripting engine
pub trait Engine: Send + Sync {
    // Context groups

    fn context_group_create(&self) -> ContextGroupRef;
    fn context_group_retain(&self, group: ContextGroupRef) -> ContextGroupRef;
    fn context_group_release(&self, group: ContextGroupRef);

    // Contexts

    /// Create a global context, in `group` or in a fresh one.
    /// Returns [`ContextRef::NULL`] on failure.
    fn global_context_create(&self, group: Option<ContextGroupRef>) -> ContextRef;
    fn global_context_retain(&self, ctx: ContextRef) -> ContextRef;
    fn global_context_release(&self, ctx: ContextRef);
    fn context_global_object(&self, ctx: ContextRef) -> ObjectRef;
    fn context_group(&self, ctx: ContextRef) -> ContextGroupRef;

    fn evaluate_script(
        &self,
        ctx: ContextRef,
        script: StringRef,
        this: ObjectRef,
        source_url: StringRef,
        starting_line: i32,
    ) -> Completion<ValueRef>;

    fn check_script_syntax(
        &self,
        ctx: ContextRef,
        script: StringRef,
        source_url: StringRef,
        starting_line: i32,
    ) -> Completion<bool>;

    fn garbage_collect(&self, ctx: ContextRef);

    // Strings

    fn string_create_utf8(&self, text: &str) -> StringRef;
    fn string_create_utf16(&self, chars: &[u16]) -> StringRef;
    fn string_retain(&self, string: StringRef) -> StringRef;
    fn string_release(&self, string: StringRef);
    /// Length in UTF-16 code units
    fn string_length(&self, string: StringRef) -> usize;
    fn string_to_utf8(&self, string: StringRef) -> String;
    fn string_is_equal(&self, a: StringRef, b: StringRef) -> bool;
    fn string_is_equal_to_utf8(&self, a: StringRef, b: &str) -> bool;

    // Values

    fn value_type(&self, ctx: ContextRef, value: ValueRef) -> ValueType;
    fn value_is_equal(&self, ctx: ContextRef, a: ValueRef, b: ValueRef) -> Completion<bool>;
    fn value_is_strict_equal(&self, ctx: ContextRef, a: ValueRef, b: ValueRef) -> bool;
    fn value_is_instance_of(
        &self,
        ctx: ContextRef,
        value: ValueRef,
        constructor: ObjectRef,
    ) -> Completion<bool>;
    fn value_make_undefined(&self, ctx: ContextRef) -> ValueRef;
    fn value_make_null(&self, ctx: ContextRef) -> ValueRef;
    fn value_make_boolean(&self, ctx: ContextRef, value: bool) -> ValueRef;
    fn value_make_number(&self, ctx: ContextRef, value: f64) -> ValueRef;
    fn value_make_string(&self, ctx: ContextRef, string: StringRef) -> ValueRef;
    /// Parse JSON; [`ValueRef::NULL`] if the text is not valid JSON
    fn value_make_from_json(&self, ctx: ContextRef, json: StringRef) -> ValueRef;
    fn value_to_json(&self, ctx: ContextRef, value: ValueRef, indent: u32)
    -> Completion<StringRef>;
    fn value_to_boolean(&self, ctx: ContextRef, value: ValueRef) -> bool;
    fn value_to_number(&self, ctx: ContextRef, value: ValueRef) -> Completion<f64>;
    fn value_to_string_copy(&self, ctx: ContextRef, value: ValueRef) -> Completion<StringRef>;
    fn value_to_object(&self, ctx: ContextRef, value: ValueRef) -> Completion<ObjectRef>;
    fn value_protect(&self, ctx: ContextRef, value: ValueRef);
    fn value_unprotect(&self, ctx: ContextRef, value: ValueRef);

    // Classes

    fn class_create(&self, definition: ClassDefinition) -> ClassRef;
    fn class_release(&self, class: ClassRef);

    // Objects

    /// Make an object of `class`, or a plain object for [`ClassRef::NULL`]
    fn object_make(&self, ctx: ContextRef, class: ClassRef) -> ObjectRef;
    fn object_make_builtin(
        &self,
        ctx: ContextRef,
        kind: ObjectKind,
        args: &[ValueRef],
    ) -> Completion<ObjectRef>;
    fn object_make_function(
        &self,
        ctx: ContextRef,
        name: StringRef,
        parameters: &[StringRef],
        body: StringRef,
        source_url: StringRef,
        starting_line: i32,
    ) -> Completion<ObjectRef>;
    fn object_prototype(&self, ctx: ContextRef, object: ObjectRef) -> ValueRef;
    fn object_set_prototype(&self, ctx: ContextRef, object: ObjectRef, prototype: ValueRef);
    fn object_has_property(&self, ctx: ContextRef, object: ObjectRef, name: StringRef) -> bool;
    fn object_get_property(
        &self,
        ctx: ContextRef,
        object: ObjectRef,
        name: StringRef,
    ) -> Completion<ValueRef>;
    fn object_set_property(
        &self,
        ctx: ContextRef,
        object: ObjectRef,
        name: StringRef,
        value: ValueRef,
        attributes: PropertyAttributes,
    ) -> Completion<()>;
    fn object_delete_property(
        &self,
        ctx: ContextRef,
        object: ObjectRef,
        name: StringRef,
    ) -> Completion<bool>;
    fn object_get_property_at_index(
        &self,
        ctx: ContextRef,
        object: ObjectRef,
        index: u32,
    ) -> Completion<ValueRef>;
    fn object_set_property_at_index(
        &self,
        ctx: ContextRef,
        object: ObjectRef,
        index: u32,
        value: ValueRef,
    ) -> Completion<()>;
    fn object_is_function(&self, ctx: ContextRef, object: ObjectRef) -> bool;
    fn object_is_constructor(&self, ctx: ContextRef, object: ObjectRef) -> bool;
    fn object_call_as_function(
        &self,
        ctx: ContextRef,
        object: ObjectRef,
        this: ObjectRef,
        args: &[ValueRef],
    ) -> Completion<ValueRef>;
    fn object_call_as_constructor(
        &self,
        ctx: ContextRef,
        object: ObjectRef,
        args: &[ValueRef],
    ) -> Completion<ObjectRef>;

    // Property name arrays

    fn object_copy_property_names(&self, ctx: ContextRef, object: ObjectRef)
    -> PropertyNameArrayRef;
    fn property_names(&self, array: PropertyNameArrayRef) -> Vec<StringRef>;
    fn property_name_array_release(&self, array: PropertyNameArrayRef);
}
