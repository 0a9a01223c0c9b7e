//! In-memory engine and host used by the integration tests.
//!
//! `FakeEngine` keeps every handle in one table and records an affinity
//! violation whenever a context is touched from a thread other than the one
//! that created it.

#![allow(dead_code)]

use jscore_bridge::refs::{PROPERTY_ATTRIBUTE_DONT_DELETE, PROPERTY_ATTRIBUTE_READ_ONLY};
use jscore_bridge::{
    Arg, Boundary, CallbackMethod, ClassDefinition, ClassRef, Completion, ContextGroupRef,
    ContextRef, Engine, HostCallbacks, HostRef, Invocation, ObjectKind, ObjectRef,
    PropertyAttributes, PropertyNameArrayRef, StringRef, ValueRef, ValueType,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, ThreadId};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Object(ObjectData),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Plain,
    Builtin(ObjectKind),
    Function { body: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectData {
    pub context: ContextRef,
    pub class: ClassRef,
    pub shape: Shape,
    pub properties: HashMap<String, (ValueRef, PropertyAttributes)>,
    pub prototype: ValueRef,
}

struct ContextState {
    owner: ThreadId,
    group: ContextGroupRef,
    global: ObjectRef,
    retains: i32,
}

#[derive(Default)]
struct State {
    next: usize,
    groups: HashMap<ContextGroupRef, i32>,
    contexts: HashMap<ContextRef, ContextState>,
    strings: HashMap<StringRef, (String, i32)>,
    values: HashMap<usize, Value>,
    protected: HashMap<usize, i32>,
    classes: HashMap<ClassRef, ClassDefinition>,
    name_arrays: HashMap<PropertyNameArrayRef, Vec<StringRef>>,
}

impl State {
    fn alloc(&mut self) -> usize {
        self.next += 0x10;
        0x10_0000 + self.next
    }

    fn value(&mut self, value: Value) -> ValueRef {
        let id = self.alloc();
        self.values.insert(id, value);
        ValueRef(id)
    }

    fn string(&mut self, text: &str) -> StringRef {
        let id = StringRef(self.alloc());
        self.strings.insert(id, (text.to_string(), 1));
        id
    }

    fn text(&self, string: StringRef) -> String {
        self.strings
            .get(&string)
            .map(|(text, _)| text.clone())
            .unwrap_or_default()
    }

    fn object(&mut self, ctx: ContextRef, class: ClassRef, shape: Shape) -> ObjectRef {
        ObjectRef(
            self.value(Value::Object(ObjectData {
                context: ctx,
                class,
                shape,
                properties: HashMap::new(),
                prototype: ValueRef::NULL,
            }))
            .0,
        )
    }

    fn object_mut(&mut self, object: ObjectRef) -> Option<&mut ObjectData> {
        match self.values.get_mut(&object.0) {
            Some(Value::Object(data)) => Some(data),
            _ => None,
        }
    }

    fn error(&mut self, message: &str) -> ValueRef {
        self.value(Value::String(message.to_string()))
    }

    fn hooks(&self, object: ObjectRef) -> Option<(ClassDefinition, Shape)> {
        match self.values.get(&object.0) {
            Some(Value::Object(data)) => {
                let class = self.classes.get(&data.class).cloned();
                match class {
                    Some(class) => Some((class, data.shape.clone())),
                    None => None,
                }
            }
            _ => None,
        }
    }

    fn shape(&self, object: ObjectRef) -> Option<Shape> {
        match self.values.get(&object.0) {
            Some(Value::Object(data)) => Some(data.shape.clone()),
            _ => None,
        }
    }

    fn number(&self, value: ValueRef) -> f64 {
        match self.values.get(&value.0) {
            Some(Value::Number(n)) => *n,
            Some(Value::Boolean(b)) => f64::from(u8::from(*b)),
            Some(Value::Null) => 0.0,
            Some(Value::String(s)) => s.trim().parse().unwrap_or(f64::NAN),
            _ => f64::NAN,
        }
    }

    fn display(&self, value: ValueRef) -> String {
        match self.values.get(&value.0) {
            Some(Value::Undefined) | None => "undefined".to_string(),
            Some(Value::Null) => "null".to_string(),
            Some(Value::Boolean(b)) => b.to_string(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(Value::Object(_)) => "[object Object]".to_string(),
        }
    }

    /// Tiny expression language: numbers, literals, `throw <msg>`, globals
    fn eval(&mut self, ctx: ContextRef, source: &str, this: ObjectRef) -> Completion<ValueRef> {
        let source = source.trim().trim_start_matches("return ").trim();
        if let Some(message) = source.strip_prefix("throw ") {
            let exception = self.error(message.trim());
            return Completion::thrown(ValueRef::NULL, exception);
        }
        let value = match source {
            "" | "undefined" => Value::Undefined,
            "null" => Value::Null,
            "true" => Value::Boolean(true),
            "false" => Value::Boolean(false),
            "this" => {
                let global = self.contexts.get(&ctx).map_or(ObjectRef::NULL, |c| c.global);
                let target = if this.is_null() { global } else { this };
                return Completion::ok(target.into());
            }
            _ => {
                if let Ok(n) = source.parse::<f64>() {
                    Value::Number(n)
                } else if source.len() >= 2 && source.starts_with('\'') && source.ends_with('\'') {
                    Value::String(source[1..source.len() - 1].to_string())
                } else {
                    let global = self.contexts.get(&ctx).map(|c| c.global);
                    let found = global
                        .and_then(|global| match self.values.get(&global.0) {
                            Some(Value::Object(data)) => data.properties.get(source).copied(),
                            _ => None,
                        })
                        .map(|(value, _)| value);
                    return match found {
                        Some(value) => Completion::ok(value),
                        None => {
                            let exception =
                                self.error(&format!("ReferenceError: {} is not defined", source));
                            Completion::thrown(ValueRef::NULL, exception)
                        }
                    };
                }
            }
        };
        Completion::ok(self.value(value))
    }
}

/// Engine double with per-context thread affinity checks
#[derive(Default)]
pub struct FakeEngine {
    state: Mutex<State>,
    violations: AtomicUsize,
    collections: AtomicUsize,
    fail_contexts: AtomicBool,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Calls made for a context off its creating thread
    pub fn violations(&self) -> usize {
        self.violations.load(Ordering::SeqCst)
    }

    pub fn collections(&self) -> usize {
        self.collections.load(Ordering::SeqCst)
    }

    /// Make `global_context_create` return a null context
    pub fn fail_context_creation(&self, fail: bool) {
        self.fail_contexts.store(fail, Ordering::SeqCst);
    }

    pub fn live_contexts(&self) -> usize {
        self.state
            .lock()
            .contexts
            .values()
            .filter(|c| c.retains > 0)
            .count()
    }

    pub fn context_owner(&self, ctx: ContextRef) -> Option<ThreadId> {
        self.state.lock().contexts.get(&ctx).map(|c| c.owner)
    }

    pub fn class_count(&self) -> usize {
        self.state.lock().classes.len()
    }

    pub fn string_count(&self) -> usize {
        self.state.lock().strings.len()
    }

    pub fn value(&self, value: ValueRef) -> Option<Value> {
        self.state.lock().values.get(&value.0).cloned()
    }

    pub fn text(&self, string: StringRef) -> String {
        self.state.lock().text(string)
    }

    fn check(&self, ctx: ContextRef) {
        let owner = self.state.lock().contexts.get(&ctx).map(|c| c.owner);
        if owner != Some(thread::current().id()) {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Engine for FakeEngine {
    fn context_group_create(&self) -> ContextGroupRef {
        let mut state = self.state.lock();
        let group = ContextGroupRef(state.alloc());
        state.groups.insert(group, 1);
        group
    }

    fn context_group_retain(&self, group: ContextGroupRef) -> ContextGroupRef {
        if let Some(count) = self.state.lock().groups.get_mut(&group) {
            *count += 1;
        }
        group
    }

    fn context_group_release(&self, group: ContextGroupRef) {
        let mut state = self.state.lock();
        if let Some(count) = state.groups.get_mut(&group) {
            *count -= 1;
            if *count <= 0 {
                state.groups.remove(&group);
            }
        }
    }

    fn global_context_create(&self, group: Option<ContextGroupRef>) -> ContextRef {
        if self.fail_contexts.load(Ordering::SeqCst) {
            return ContextRef::NULL;
        }
        let mut state = self.state.lock();
        let group = match group {
            Some(group) => {
                *state.groups.entry(group).or_insert(0) += 1;
                group
            }
            None => {
                let group = ContextGroupRef(state.alloc());
                state.groups.insert(group, 1);
                group
            }
        };
        let ctx = ContextRef(state.alloc());
        let global = state.object(ctx, ClassRef::NULL, Shape::Plain);
        state.contexts.insert(
            ctx,
            ContextState {
                owner: thread::current().id(),
                group,
                global,
                retains: 1,
            },
        );
        ctx
    }

    fn global_context_retain(&self, ctx: ContextRef) -> ContextRef {
        self.check(ctx);
        if let Some(context) = self.state.lock().contexts.get_mut(&ctx) {
            context.retains += 1;
        }
        ctx
    }

    fn global_context_release(&self, ctx: ContextRef) {
        self.check(ctx);
        if let Some(context) = self.state.lock().contexts.get_mut(&ctx) {
            context.retains -= 1;
        }
    }

    fn context_global_object(&self, ctx: ContextRef) -> ObjectRef {
        self.check(ctx);
        self.state
            .lock()
            .contexts
            .get(&ctx)
            .map_or(ObjectRef::NULL, |c| c.global)
    }

    fn context_group(&self, ctx: ContextRef) -> ContextGroupRef {
        self.check(ctx);
        self.state
            .lock()
            .contexts
            .get(&ctx)
            .map_or(ContextGroupRef::NULL, |c| c.group)
    }

    fn evaluate_script(
        &self,
        ctx: ContextRef,
        script: StringRef,
        this: ObjectRef,
        _source_url: StringRef,
        _starting_line: i32,
    ) -> Completion<ValueRef> {
        self.check(ctx);
        let mut state = self.state.lock();
        let source = state.text(script);
        state.eval(ctx, &source, this)
    }

    fn check_script_syntax(
        &self,
        ctx: ContextRef,
        script: StringRef,
        _source_url: StringRef,
        _starting_line: i32,
    ) -> Completion<bool> {
        self.check(ctx);
        let mut state = self.state.lock();
        let source = state.text(script);
        let balance = source.chars().fold(0i32, |depth, c| match c {
            '(' => depth + 1,
            ')' => depth - 1,
            _ => depth,
        });
        if balance == 0 {
            Completion::ok(true)
        } else {
            let exception = state.error("SyntaxError: unbalanced parentheses");
            Completion::thrown(false, exception)
        }
    }

    fn garbage_collect(&self, ctx: ContextRef) {
        self.check(ctx);
        self.collections.fetch_add(1, Ordering::SeqCst);
        let doomed: Vec<(ObjectRef, Arc<dyn HostCallbacks>)> = {
            let mut state = self.state.lock();
            let candidates: Vec<usize> = state
                .values
                .iter()
                .filter_map(|(id, value)| match value {
                    Value::Object(data)
                        if data.context == ctx && !state.protected.contains_key(id) =>
                    {
                        state
                            .classes
                            .get(&data.class)
                            .filter(|class| class.hooks.finalize)
                            .map(|_| *id)
                    }
                    _ => None,
                })
                .collect();
            candidates
                .into_iter()
                .filter_map(|id| {
                    let callbacks = state.hooks(ObjectRef(id))?.0.callbacks;
                    state.values.remove(&id);
                    Some((ObjectRef(id), callbacks))
                })
                .collect()
        };
        // Finalizers run without the engine lock, they re-enter the engine
        for (object, callbacks) in doomed {
            callbacks.finalize(object);
        }
    }

    fn string_create_utf8(&self, text: &str) -> StringRef {
        self.state.lock().string(text)
    }

    fn string_create_utf16(&self, chars: &[u16]) -> StringRef {
        let text = String::from_utf16_lossy(chars);
        self.state.lock().string(&text)
    }

    fn string_retain(&self, string: StringRef) -> StringRef {
        if let Some((_, count)) = self.state.lock().strings.get_mut(&string) {
            *count += 1;
        }
        string
    }

    fn string_release(&self, string: StringRef) {
        let mut state = self.state.lock();
        if let Some((_, count)) = state.strings.get_mut(&string) {
            *count -= 1;
            if *count <= 0 {
                state.strings.remove(&string);
            }
        }
    }

    fn string_length(&self, string: StringRef) -> usize {
        self.state.lock().text(string).encode_utf16().count()
    }

    fn string_to_utf8(&self, string: StringRef) -> String {
        self.state.lock().text(string)
    }

    fn string_is_equal(&self, a: StringRef, b: StringRef) -> bool {
        let state = self.state.lock();
        state.text(a) == state.text(b)
    }

    fn string_is_equal_to_utf8(&self, a: StringRef, b: &str) -> bool {
        self.state.lock().text(a) == b
    }

    fn value_type(&self, ctx: ContextRef, value: ValueRef) -> ValueType {
        self.check(ctx);
        match self.state.lock().values.get(&value.0) {
            Some(Value::Undefined) | None => ValueType::Undefined,
            Some(Value::Null) => ValueType::Null,
            Some(Value::Boolean(_)) => ValueType::Boolean,
            Some(Value::Number(_)) => ValueType::Number,
            Some(Value::String(_)) => ValueType::String,
            Some(Value::Object(_)) => ValueType::Object,
        }
    }

    fn value_is_equal(&self, ctx: ContextRef, a: ValueRef, b: ValueRef) -> Completion<bool> {
        self.check(ctx);
        let state = self.state.lock();
        let loose = match (state.values.get(&a.0), state.values.get(&b.0)) {
            (Some(Value::Object(_)), _) | (_, Some(Value::Object(_))) => a == b,
            (Some(x), Some(y)) if x == y => true,
            _ => state.number(a) == state.number(b),
        };
        Completion::ok(loose)
    }

    fn value_is_strict_equal(&self, ctx: ContextRef, a: ValueRef, b: ValueRef) -> bool {
        self.check(ctx);
        let state = self.state.lock();
        match (state.values.get(&a.0), state.values.get(&b.0)) {
            (Some(Value::Object(_)), _) => a == b,
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }

    fn value_is_instance_of(
        &self,
        ctx: ContextRef,
        value: ValueRef,
        constructor: ObjectRef,
    ) -> Completion<bool> {
        self.check(ctx);
        let hooks = self.state.lock().hooks(constructor);
        match hooks {
            Some((class, _)) if class.hooks.has_instance => {
                class.callbacks.has_instance(ctx, constructor, value)
            }
            _ => Completion::ok(false),
        }
    }

    fn value_make_undefined(&self, ctx: ContextRef) -> ValueRef {
        self.check(ctx);
        self.state.lock().value(Value::Undefined)
    }

    fn value_make_null(&self, ctx: ContextRef) -> ValueRef {
        self.check(ctx);
        self.state.lock().value(Value::Null)
    }

    fn value_make_boolean(&self, ctx: ContextRef, value: bool) -> ValueRef {
        self.check(ctx);
        self.state.lock().value(Value::Boolean(value))
    }

    fn value_make_number(&self, ctx: ContextRef, value: f64) -> ValueRef {
        self.check(ctx);
        self.state.lock().value(Value::Number(value))
    }

    fn value_make_string(&self, ctx: ContextRef, string: StringRef) -> ValueRef {
        self.check(ctx);
        let mut state = self.state.lock();
        let text = state.text(string);
        state.value(Value::String(text))
    }

    fn value_make_from_json(&self, ctx: ContextRef, json: StringRef) -> ValueRef {
        self.check(ctx);
        let mut state = self.state.lock();
        let text = state.text(json);
        let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&text) else {
            return ValueRef::NULL;
        };
        let value = match parsed {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
                return state.object(ctx, ClassRef::NULL, Shape::Plain).into();
            }
        };
        state.value(value)
    }

    fn value_to_json(&self, ctx: ContextRef, value: ValueRef, _indent: u32) -> Completion<StringRef> {
        self.check(ctx);
        let mut state = self.state.lock();
        let json = match state.values.get(&value.0) {
            Some(Value::Null) => serde_json::Value::Null,
            Some(Value::Boolean(b)) => serde_json::Value::Bool(*b),
            Some(Value::Number(n)) => serde_json::json!(n),
            Some(Value::String(s)) => serde_json::Value::String(s.clone()),
            Some(Value::Object(_)) => serde_json::json!({}),
            Some(Value::Undefined) | None => return Completion::ok(StringRef::NULL),
        };
        let text = json.to_string();
        Completion::ok(state.string(&text))
    }

    fn value_to_boolean(&self, ctx: ContextRef, value: ValueRef) -> bool {
        self.check(ctx);
        match self.state.lock().values.get(&value.0) {
            Some(Value::Boolean(b)) => *b,
            Some(Value::Number(n)) => *n != 0.0 && !n.is_nan(),
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Object(_)) => true,
            _ => false,
        }
    }

    fn value_to_number(&self, ctx: ContextRef, value: ValueRef) -> Completion<f64> {
        self.check(ctx);
        Completion::ok(self.state.lock().number(value))
    }

    fn value_to_string_copy(&self, ctx: ContextRef, value: ValueRef) -> Completion<StringRef> {
        self.check(ctx);
        let mut state = self.state.lock();
        let text = state.display(value);
        Completion::ok(state.string(&text))
    }

    fn value_to_object(&self, ctx: ContextRef, value: ValueRef) -> Completion<ObjectRef> {
        self.check(ctx);
        let mut state = self.state.lock();
        match state.values.get(&value.0) {
            Some(Value::Object(_)) => Completion::ok(ObjectRef(value.0)),
            Some(Value::Undefined) | Some(Value::Null) | None => {
                let exception = state.error("TypeError: cannot convert to object");
                Completion::thrown(ObjectRef::NULL, exception)
            }
            Some(_) => Completion::ok(state.object(ctx, ClassRef::NULL, Shape::Plain)),
        }
    }

    fn value_protect(&self, ctx: ContextRef, value: ValueRef) {
        self.check(ctx);
        *self.state.lock().protected.entry(value.0).or_insert(0) += 1;
    }

    fn value_unprotect(&self, ctx: ContextRef, value: ValueRef) {
        self.check(ctx);
        let mut state = self.state.lock();
        if let Some(count) = state.protected.get_mut(&value.0) {
            *count -= 1;
            if *count <= 0 {
                state.protected.remove(&value.0);
            }
        }
    }

    fn class_create(&self, definition: ClassDefinition) -> ClassRef {
        let mut state = self.state.lock();
        let class = ClassRef(state.alloc());
        state.classes.insert(class, definition);
        class
    }

    fn class_release(&self, class: ClassRef) {
        self.state.lock().classes.remove(&class);
    }

    fn object_make(&self, ctx: ContextRef, class: ClassRef) -> ObjectRef {
        self.check(ctx);
        self.state.lock().object(ctx, class, Shape::Plain)
    }

    fn object_make_builtin(
        &self,
        ctx: ContextRef,
        kind: ObjectKind,
        args: &[ValueRef],
    ) -> Completion<ObjectRef> {
        self.check(ctx);
        let mut state = self.state.lock();
        let object = state.object(ctx, ClassRef::NULL, Shape::Builtin(kind));
        let entries: Vec<(String, ValueRef)> = match kind {
            ObjectKind::Array => args
                .iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), *v))
                .collect(),
            ObjectKind::Error => args.first().map(|m| ("message".to_string(), *m)).into_iter().collect(),
            ObjectKind::Date | ObjectKind::RegExp => Vec::new(),
        };
        if let Some(data) = state.object_mut(object) {
            for (key, value) in entries {
                data.properties.insert(key, (value, 0));
            }
        }
        Completion::ok(object)
    }

    fn object_make_function(
        &self,
        ctx: ContextRef,
        _name: StringRef,
        _parameters: &[StringRef],
        body: StringRef,
        _source_url: StringRef,
        _starting_line: i32,
    ) -> Completion<ObjectRef> {
        self.check(ctx);
        let mut state = self.state.lock();
        let body = state.text(body);
        Completion::ok(state.object(ctx, ClassRef::NULL, Shape::Function { body }))
    }

    fn object_prototype(&self, ctx: ContextRef, object: ObjectRef) -> ValueRef {
        self.check(ctx);
        self.state
            .lock()
            .object_mut(object)
            .map_or(ValueRef::NULL, |data| data.prototype)
    }

    fn object_set_prototype(&self, ctx: ContextRef, object: ObjectRef, prototype: ValueRef) {
        self.check(ctx);
        if let Some(data) = self.state.lock().object_mut(object) {
            data.prototype = prototype;
        }
    }

    fn object_has_property(&self, ctx: ContextRef, object: ObjectRef, name: StringRef) -> bool {
        self.check(ctx);
        let mut state = self.state.lock();
        let key = state.text(name);
        state
            .object_mut(object)
            .is_some_and(|data| data.properties.contains_key(&key))
    }

    fn object_get_property(
        &self,
        ctx: ContextRef,
        object: ObjectRef,
        name: StringRef,
    ) -> Completion<ValueRef> {
        self.check(ctx);
        let mut state = self.state.lock();
        let key = state.text(name);
        let found = state
            .object_mut(object)
            .and_then(|data| data.properties.get(&key).map(|(value, _)| *value));
        match found {
            Some(value) => Completion::ok(value),
            None => Completion::ok(state.value(Value::Undefined)),
        }
    }

    fn object_set_property(
        &self,
        ctx: ContextRef,
        object: ObjectRef,
        name: StringRef,
        value: ValueRef,
        attributes: PropertyAttributes,
    ) -> Completion<()> {
        self.check(ctx);
        let mut state = self.state.lock();
        let key = state.text(name);
        let Some(data) = state.object_mut(object) else {
            let exception = state.error("TypeError: not an object");
            return Completion::thrown((), exception);
        };
        let read_only = data
            .properties
            .get(&key)
            .is_some_and(|(_, attrs)| attrs & PROPERTY_ATTRIBUTE_READ_ONLY != 0);
        if read_only {
            let exception = state.error(&format!("TypeError: {} is read-only", key));
            return Completion::thrown((), exception);
        }
        data.properties.insert(key, (value, attributes));
        Completion::ok(())
    }

    fn object_delete_property(
        &self,
        ctx: ContextRef,
        object: ObjectRef,
        name: StringRef,
    ) -> Completion<bool> {
        self.check(ctx);
        let mut state = self.state.lock();
        let key = state.text(name);
        let Some(data) = state.object_mut(object) else {
            return Completion::ok(false);
        };
        match data.properties.get(&key) {
            Some((_, attrs)) if attrs & PROPERTY_ATTRIBUTE_DONT_DELETE != 0 => Completion::ok(false),
            Some(_) => {
                data.properties.remove(&key);
                Completion::ok(true)
            }
            None => Completion::ok(true),
        }
    }

    fn object_get_property_at_index(
        &self,
        ctx: ContextRef,
        object: ObjectRef,
        index: u32,
    ) -> Completion<ValueRef> {
        let name = self.string_create_utf8(&index.to_string());
        let result = self.object_get_property(ctx, object, name);
        self.string_release(name);
        result
    }

    fn object_set_property_at_index(
        &self,
        ctx: ContextRef,
        object: ObjectRef,
        index: u32,
        value: ValueRef,
    ) -> Completion<()> {
        let name = self.string_create_utf8(&index.to_string());
        let result = self.object_set_property(ctx, object, name, value, 0);
        self.string_release(name);
        result
    }

    fn object_is_function(&self, ctx: ContextRef, object: ObjectRef) -> bool {
        self.check(ctx);
        let state = self.state.lock();
        match state.hooks(object) {
            Some((class, _)) => class.hooks.call_as_function,
            None => matches!(state.shape(object), Some(Shape::Function { .. })),
        }
    }

    fn object_is_constructor(&self, ctx: ContextRef, object: ObjectRef) -> bool {
        self.check(ctx);
        let state = self.state.lock();
        state
            .hooks(object)
            .is_some_and(|(class, _)| class.hooks.call_as_constructor)
    }

    fn object_call_as_function(
        &self,
        ctx: ContextRef,
        object: ObjectRef,
        this: ObjectRef,
        args: &[ValueRef],
    ) -> Completion<ValueRef> {
        self.check(ctx);
        let (hooks, shape) = {
            let state = self.state.lock();
            (state.hooks(object), state.shape(object))
        };
        match (hooks, shape) {
            // Host callbacks run without the engine lock, they re-enter the bridge
            (Some((class, _)), _) if class.hooks.call_as_function => {
                class.callbacks.call_as_function(ctx, object, this, args)
            }
            (_, Some(Shape::Function { body })) => self.state.lock().eval(ctx, &body, this),
            _ => {
                let exception = self.state.lock().error("TypeError: not a function");
                Completion::thrown(ValueRef::NULL, exception)
            }
        }
    }

    fn object_call_as_constructor(
        &self,
        ctx: ContextRef,
        object: ObjectRef,
        args: &[ValueRef],
    ) -> Completion<ObjectRef> {
        self.check(ctx);
        let hooks = self.state.lock().hooks(object);
        match hooks {
            Some((class, _)) if class.hooks.call_as_constructor => {
                class.callbacks.call_as_constructor(ctx, object, args)
            }
            _ => {
                let exception = self.state.lock().error("TypeError: not a constructor");
                Completion::thrown(ObjectRef::NULL, exception)
            }
        }
    }

    fn object_copy_property_names(
        &self,
        ctx: ContextRef,
        object: ObjectRef,
    ) -> PropertyNameArrayRef {
        self.check(ctx);
        let mut state = self.state.lock();
        let mut keys: Vec<String> = state
            .object_mut(object)
            .map(|data| data.properties.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        let names: Vec<StringRef> = keys.iter().map(|key| state.string(key)).collect();
        let array = PropertyNameArrayRef(state.alloc());
        state.name_arrays.insert(array, names);
        array
    }

    fn property_names(&self, array: PropertyNameArrayRef) -> Vec<StringRef> {
        self.state
            .lock()
            .name_arrays
            .get(&array)
            .cloned()
            .unwrap_or_default()
    }

    fn property_name_array_release(&self, array: PropertyNameArrayRef) {
        let mut state = self.state.lock();
        if let Some(names) = state.name_arrays.remove(&array) {
            for name in names {
                state.strings.remove(&name);
            }
        }
    }
}

type Handler = Arc<dyn Fn(HostRef, &CallbackMethod, &[Arg<'_>]) -> Invocation + Send + Sync>;

/// Host double recording every callback it receives
#[derive(Default)]
pub struct FakeBoundary {
    handler: Mutex<Option<Handler>>,
    calls: Mutex<Vec<(HostRef, &'static str)>>,
    released: Mutex<Vec<HostRef>>,
}

impl FakeBoundary {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer callbacks with `handler` instead of a zero result
    pub fn on_invoke(
        &self,
        handler: impl Fn(HostRef, &CallbackMethod, &[Arg<'_>]) -> Invocation + Send + Sync + 'static,
    ) {
        *self.handler.lock() = Some(Arc::new(handler));
    }

    pub fn calls(&self) -> Vec<(HostRef, &'static str)> {
        self.calls.lock().clone()
    }

    pub fn calls_named(&self, name: &str) -> usize {
        self.calls.lock().iter().filter(|(_, n)| *n == name).count()
    }

    pub fn released(&self) -> Vec<HostRef> {
        self.released.lock().clone()
    }
}

impl Boundary for FakeBoundary {
    fn invoke(&self, receiver: HostRef, method: &CallbackMethod, args: &[Arg<'_>]) -> Invocation {
        self.calls.lock().push((receiver, method.name));
        let handler = self.handler.lock().clone();
        match handler {
            Some(handler) => handler(receiver, method, args),
            None => Invocation::default(),
        }
    }

    fn release_host(&self, host: HostRef) {
        self.released.lock().push(host);
    }
}
