//! The realm: heap, intrinsics, call frames, and the object operations every
//! piece of evaluated code goes through.

use std::rc::Rc;

use tracing::trace;

use crate::ast::{ClassDef, FunctionDef};
use crate::error::{RealmError, RealmResult};
use crate::heap::{
    ClassObject, FunctionKind, FunctionObject, Heap, HeapObject, NativeFn, NativeObject,
    ObjectKind, Property, ProxyObject,
};
use crate::interp::{self, Completion};
use crate::intrinsics::{self, Intrinsics};
use crate::proxy::{IntrinsicAccess, ProxyHandler, Trap, TrapOutcome};
use crate::scope::{Scope, ScopeRef};
use crate::value::{ObjectId, Value, array_index, number_to_string};

/// Execution limits. Exceeding either is a determinism violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RealmLimits {
    /// Statements and loop iterations one realm may execute in total.
    pub max_steps: u64,
    /// Maximum nesting of user function calls.
    pub max_call_depth: usize,
}

impl Default for RealmLimits {
    fn default() -> Self {
        Self {
            max_steps: 1_000_000,
            max_call_depth: 256,
        }
    }
}

/// Who is performing an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Ordinary code; every membrane check applies.
    User,
    /// Privileged runtime code; membranes pass operations straight through.
    Admin,
}

/// One active user function call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// How the function was declared.
    pub kind: FunctionKind,
    /// Declaring class for methods, statics, and constructors.
    pub class: Option<ObjectId>,
    /// The function object (the class itself for constructors).
    pub function: ObjectId,
}

/// An isolated execution environment.
#[derive(Debug)]
pub struct Realm {
    heap: Heap,
    pub(crate) intrinsics: Intrinsics,
    sandbox_globals: ScopeRef,
    host_globals: ScopeRef,
    frames: Vec<Frame>,
    admin_depth: usize,
    steps: u64,
    limits: RealmLimits,
}

impl Default for Realm {
    fn default() -> Self {
        Self::new(RealmLimits::default())
    }
}

impl Realm {
    /// Create a realm with its intrinsics installed.
    #[must_use]
    pub fn new(limits: RealmLimits) -> Self {
        let mut realm = Self {
            heap: Heap::default(),
            intrinsics: Intrinsics::default(),
            sandbox_globals: Scope::root(),
            host_globals: Scope::root(),
            frames: Vec::new(),
            admin_depth: 0,
            steps: 0,
            limits,
        };
        intrinsics::install(&mut realm);
        realm
    }

    /// The configured limits.
    #[must_use]
    pub fn limits(&self) -> RealmLimits {
        self.limits
    }

    /// Deterministic global scope used by the sandboxed evaluator.
    #[must_use]
    pub fn sandbox_globals(&self) -> ScopeRef {
        Rc::clone(&self.sandbox_globals)
    }

    /// Host global scope used by the direct evaluator.
    #[must_use]
    pub fn host_globals(&self) -> ScopeRef {
        Rc::clone(&self.host_globals)
    }

    // -----------------------------------------------------------------------
    // Access mode and frames
    // -----------------------------------------------------------------------

    /// Current access mode.
    #[must_use]
    pub fn access_mode(&self) -> AccessMode {
        if self.admin_depth > 0 {
            AccessMode::Admin
        } else {
            AccessMode::User
        }
    }

    /// Whether admin mode is active.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.admin_depth > 0
    }

    /// Enter admin mode. Every push must be paired with [`Realm::pop_admin`].
    pub fn push_admin(&mut self) {
        self.admin_depth = self.admin_depth.saturating_add(1);
    }

    /// Leave one level of admin mode.
    pub fn pop_admin(&mut self) {
        self.admin_depth = self.admin_depth.saturating_sub(1);
    }

    /// Run `f` in admin mode. Nested calls are fine; the mode is a stack.
    pub fn with_admin<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.push_admin();
        let out = f(self);
        self.pop_admin();
        out
    }

    /// The innermost active user call.
    #[must_use]
    pub fn current_frame(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// All active user calls, outermost first.
    #[must_use]
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub(crate) fn step(&mut self) -> RealmResult<()> {
        self.steps = self.steps.saturating_add(1);
        if self.steps > self.limits.max_steps {
            return Err(RealmError::Determinism(
                "Execution step limit exceeded".to_owned(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Heap access and allocation
    // -----------------------------------------------------------------------

    /// Borrow an object.
    ///
    /// # Errors
    ///
    /// Fails for ids that do not belong to this realm.
    pub fn object(&self, id: ObjectId) -> RealmResult<&HeapObject> {
        self.heap.get(id)
    }

    /// Borrow an object mutably.
    ///
    /// # Errors
    ///
    /// Fails for ids that do not belong to this realm.
    pub fn object_mut(&mut self, id: ObjectId) -> RealmResult<&mut HeapObject> {
        self.heap.get_mut(id)
    }

    /// Number of objects allocated so far.
    #[must_use]
    pub fn heap_len(&self) -> usize {
        self.heap.len()
    }

    /// Allocate an object of `kind` with the given prototype.
    pub fn alloc(&mut self, kind: ObjectKind, proto: Option<ObjectId>) -> ObjectId {
        self.heap.alloc(HeapObject::new(kind, proto))
    }

    /// New ordinary object.
    pub fn new_object(&mut self) -> ObjectId {
        let proto = self.intrinsics.object_proto;
        self.alloc(ObjectKind::Plain, Some(proto))
    }

    /// New array.
    pub fn new_array(&mut self, items: Vec<Value>) -> ObjectId {
        let proto = self.intrinsics.array_proto;
        self.alloc(ObjectKind::Array(items), Some(proto))
    }

    /// New byte array.
    pub fn new_bytes(&mut self, bytes: Vec<u8>) -> ObjectId {
        let proto = self.intrinsics.bytes_proto;
        self.alloc(ObjectKind::Bytes(bytes), Some(proto))
    }

    /// New set. Duplicates (by `SameValueZero`) are dropped.
    pub fn new_set(&mut self, values: Vec<Value>) -> ObjectId {
        let mut unique: Vec<Value> = Vec::with_capacity(values.len());
        for v in values {
            if !unique.iter().any(|u| u.same_value_zero(&v)) {
                unique.push(v);
            }
        }
        let proto = self.intrinsics.set_proto;
        self.alloc(ObjectKind::Set(unique), Some(proto))
    }

    /// New map. Later duplicate keys overwrite earlier ones.
    pub fn new_map(&mut self, entries: Vec<(Value, Value)>) -> ObjectId {
        let mut unique: Vec<(Value, Value)> = Vec::with_capacity(entries.len());
        for (k, v) in entries {
            if let Some(slot) = unique.iter_mut().find(|(u, _)| u.same_value_zero(&k)) {
                slot.1 = v;
            } else {
                unique.push((k, v));
            }
        }
        let proto = self.intrinsics.map_proto;
        self.alloc(ObjectKind::Map(unique), Some(proto))
    }

    /// New error object carrying `message`.
    pub fn new_error(&mut self, message: &str) -> ObjectId {
        let proto = self.intrinsics.error_proto;
        let id = self.alloc(ObjectKind::Error, Some(proto));
        if let Ok(obj) = self.object_mut(id) {
            obj.props
                .insert("message", Property::hidden(Value::string(message)));
        }
        id
    }

    /// New built-in function.
    pub fn new_native(
        &mut self,
        name: &'static str,
        call: NativeFn,
        construct: Option<NativeFn>,
    ) -> ObjectId {
        let proto = self.intrinsics.function_proto;
        let id = self.alloc(
            ObjectKind::Native(NativeObject {
                name,
                call,
                construct,
            }),
            Some(proto),
        );
        if let Ok(obj) = self.object_mut(id) {
            obj.props.insert("name", Property::hidden(Value::string(name)));
        }
        id
    }

    /// Wrap `target` in a proxy slot dispatching to `handler`.
    pub fn create_proxy(&mut self, target: ObjectId, handler: Rc<dyn ProxyHandler>) -> ObjectId {
        let id = self.alloc(ObjectKind::Proxy(ProxyObject { target, handler }), None);
        trace!(proxy = %id, target = %target, "created proxy");
        id
    }

    /// Target and handler of a proxy slot.
    #[must_use]
    pub fn proxy_parts(&self, id: ObjectId) -> Option<(ObjectId, Rc<dyn ProxyHandler>)> {
        match self.heap.get(id).map(|o| &o.kind) {
            Ok(ObjectKind::Proxy(p)) => Some((p.target, Rc::clone(&p.handler))),
            _ => None,
        }
    }

    /// Whether `id` is a proxy slot.
    #[must_use]
    pub fn is_proxy(&self, id: ObjectId) -> bool {
        matches!(self.heap.get(id).map(|o| &o.kind), Ok(ObjectKind::Proxy(_)))
    }

    /// Follow proxy slots down to the underlying object.
    #[must_use]
    pub fn resolve_target(&self, id: ObjectId) -> ObjectId {
        let mut current = id;
        while let Ok(ObjectKind::Proxy(p)) = self.heap.get(current).map(|o| &o.kind) {
            current = p.target;
        }
        current
    }

    /// Kind of the object behind any proxies.
    ///
    /// # Errors
    ///
    /// Fails for ids that do not belong to this realm.
    pub fn target_kind(&self, id: ObjectId) -> RealmResult<&ObjectKind> {
        Ok(&self.heap.get(self.resolve_target(id))?.kind)
    }

    /// `typeof`.
    #[must_use]
    pub fn type_of(&self, value: &Value) -> &'static str {
        match value {
            Value::Object(id) => match self.target_kind(*id) {
                Ok(kind) if kind.is_callable() => "function",
                _ => "object",
            },
            other => other.primitive_type_name(),
        }
    }

    /// Runtime type name for diagnostics.
    #[must_use]
    pub fn type_name(&self, value: &Value) -> String {
        match value {
            Value::Object(id) => match self.target_kind(*id) {
                Ok(ObjectKind::Class(c)) => format!("class {}", c.name),
                Ok(kind) => kind.type_name().to_owned(),
                Err(_) => "unknown".to_owned(),
            },
            Value::Undefined => "undefined".to_owned(),
            Value::Null => "null".to_owned(),
            other => other.primitive_type_name().to_owned(),
        }
    }

    /// The class an object belongs to: the class itself for class objects,
    /// otherwise the class whose prototype is the object's direct prototype.
    #[must_use]
    pub fn owner_class(&self, id: ObjectId) -> Option<ObjectId> {
        let target = self.resolve_target(id);
        let obj = self.heap.get(target).ok()?;
        if matches!(obj.kind, ObjectKind::Class(_)) {
            return Some(target);
        }
        let proto = obj.proto?;
        self.heap.get(self.resolve_target(proto)).ok()?.constructor
    }

    // -----------------------------------------------------------------------
    // Generic object operations (proxy aware)
    // -----------------------------------------------------------------------

    fn dispatch(&mut self, id: ObjectId, trap: Trap) -> RealmResult<TrapOutcome> {
        if let Some((target, handler)) = self.proxy_parts(id) {
            return handler.handle(self, id, target, trap);
        }
        self.raw_trap(id, trap)
    }

    /// Perform `trap` directly on an ordinary (non-proxy) object.
    ///
    /// # Errors
    ///
    /// Propagates errors from the operation itself.
    pub fn raw_trap(&mut self, id: ObjectId, trap: Trap) -> RealmResult<TrapOutcome> {
        match trap {
            Trap::Get { key } => self.raw_get(id, &key).map(TrapOutcome::Value),
            Trap::Set { key, value } => self.raw_set(id, &key, value).map(|()| TrapOutcome::Done),
            Trap::Has { key } => self.raw_has(id, &key).map(TrapOutcome::Bool),
            Trap::Delete { key } => self.raw_delete(id, &key).map(TrapOutcome::Bool),
            Trap::Define { key, property } => self
                .raw_define(id, &key, property)
                .map(|()| TrapOutcome::Done),
            Trap::OwnKeys => self.raw_own_keys(id).map(TrapOutcome::Keys),
            Trap::Apply { this, args } => self.raw_call(id, this, &args).map(TrapOutcome::Value),
            Trap::Construct { args } => self.raw_construct(id, &args).map(TrapOutcome::Value),
            Trap::GetPrototypeOf => Ok(TrapOutcome::Proto(self.object(id)?.proto)),
            Trap::SetPrototypeOf { proto } => {
                self.object_mut(id)?.proto = proto;
                Ok(TrapOutcome::Done)
            },
            Trap::PreventExtensions => {
                self.object_mut(id)?.extensible = false;
                Ok(TrapOutcome::Done)
            },
            Trap::IsExtensible => Ok(TrapOutcome::Bool(self.object(id)?.extensible)),
            Trap::Unwrap { .. } => Ok(TrapOutcome::Target(id)),
        }
    }

    /// Read a property from any value.
    ///
    /// # Errors
    ///
    /// Fails on `undefined`/`null` receivers and propagates proxy errors.
    pub fn get(&mut self, value: &Value, key: &str) -> RealmResult<Value> {
        match value {
            Value::Object(id) => self.get_object(*id, key),
            Value::String(s) => {
                if key == "length" {
                    return Ok(Value::Number(s.chars().count() as f64));
                }
                if let Some(i) = array_index(key) {
                    return Ok(s
                        .chars()
                        .nth(i)
                        .map_or(Value::Undefined, |c| Value::String(c.to_string())));
                }
                let proto = self.intrinsics.string_proto;
                self.get_object(proto, key)
            },
            Value::Undefined | Value::Null => Err(RealmError::Type(format!(
                "Cannot read properties of {} (reading '{key}')",
                self.type_name(value)
            ))),
            Value::Bool(_) | Value::Number(_) => Ok(Value::Undefined),
        }
    }

    /// Read a property from an object.
    ///
    /// # Errors
    ///
    /// Propagates proxy errors.
    pub fn get_object(&mut self, id: ObjectId, key: &str) -> RealmResult<Value> {
        self.dispatch(id, Trap::Get { key: key.to_owned() })?
            .into_value()
    }

    /// Write a property.
    ///
    /// # Errors
    ///
    /// Fails on non-object receivers, read-only properties, and proxy denials.
    pub fn set(&mut self, target: &Value, key: &str, value: Value) -> RealmResult<()> {
        let Value::Object(id) = target else {
            return Err(RealmError::Type(format!(
                "Cannot set properties of {} (setting '{key}')",
                self.type_name(target)
            )));
        };
        self.dispatch(
            *id,
            Trap::Set {
                key: key.to_owned(),
                value,
            },
        )
        .map(|_| ())
    }

    /// `key in target`.
    ///
    /// # Errors
    ///
    /// Fails on non-object targets and propagates proxy errors.
    pub fn has(&mut self, target: &Value, key: &str) -> RealmResult<bool> {
        let Value::Object(id) = target else {
            return Err(RealmError::Type(format!(
                "Cannot use 'in' operator to search for '{key}' in {}",
                self.type_name(target)
            )));
        };
        self.dispatch(*id, Trap::Has { key: key.to_owned() })?
            .into_bool()
    }

    /// `delete target[key]`.
    ///
    /// # Errors
    ///
    /// Fails on non-object targets and propagates proxy errors.
    pub fn delete(&mut self, target: &Value, key: &str) -> RealmResult<bool> {
        let Value::Object(id) = target else {
            return Err(RealmError::Type(format!(
                "Cannot convert {} to object",
                self.type_name(target)
            )));
        };
        self.dispatch(*id, Trap::Delete { key: key.to_owned() })?
            .into_bool()
    }

    /// Define an own property.
    ///
    /// # Errors
    ///
    /// Propagates proxy denials and extensibility violations.
    pub fn define(&mut self, id: ObjectId, key: &str, property: Property) -> RealmResult<()> {
        self.dispatch(
            id,
            Trap::Define {
                key: key.to_owned(),
                property,
            },
        )
        .map(|_| ())
    }

    /// Enumerable own string keys in insertion order.
    ///
    /// # Errors
    ///
    /// Propagates proxy errors.
    pub fn own_keys(&mut self, id: ObjectId) -> RealmResult<Vec<String>> {
        self.dispatch(id, Trap::OwnKeys)?.into_keys()
    }

    /// `[[GetPrototypeOf]]`.
    ///
    /// # Errors
    ///
    /// Propagates proxy errors.
    pub fn get_prototype_of(&mut self, id: ObjectId) -> RealmResult<Option<ObjectId>> {
        self.dispatch(id, Trap::GetPrototypeOf)?.into_proto()
    }

    /// `[[SetPrototypeOf]]`.
    ///
    /// # Errors
    ///
    /// Propagates proxy errors.
    pub fn set_prototype_of(&mut self, id: ObjectId, proto: Option<ObjectId>) -> RealmResult<()> {
        self.dispatch(id, Trap::SetPrototypeOf { proto }).map(|_| ())
    }

    /// `[[PreventExtensions]]`.
    ///
    /// # Errors
    ///
    /// Propagates proxy errors.
    pub fn prevent_extensions(&mut self, id: ObjectId) -> RealmResult<()> {
        self.dispatch(id, Trap::PreventExtensions).map(|_| ())
    }

    /// `[[IsExtensible]]`.
    ///
    /// # Errors
    ///
    /// Propagates proxy errors.
    pub fn is_extensible(&mut self, id: ObjectId) -> RealmResult<bool> {
        self.dispatch(id, Trap::IsExtensible)?.into_bool()
    }

    /// Call a function value.
    ///
    /// # Errors
    ///
    /// Fails on non-callables and propagates anything the callee throws.
    pub fn call(&mut self, callee: &Value, this: Value, args: &[Value]) -> RealmResult<Value> {
        let Value::Object(id) = callee else {
            return Err(RealmError::Type(format!(
                "{} is not a function",
                self.type_name(callee)
            )));
        };
        self.dispatch(
            *id,
            Trap::Apply {
                this,
                args: args.to_vec(),
            },
        )?
        .into_value()
    }

    /// `new callee(...args)`.
    ///
    /// # Errors
    ///
    /// Fails on non-constructors and propagates anything the constructor throws.
    pub fn construct(&mut self, callee: &Value, args: &[Value]) -> RealmResult<Value> {
        let Value::Object(id) = callee else {
            return Err(RealmError::Type(format!(
                "{} is not a constructor",
                self.type_name(callee)
            )));
        };
        self.dispatch(
            *id,
            Trap::Construct {
                args: args.to_vec(),
            },
        )?
        .into_value()
    }

    /// Resolve the real intrinsic object behind `this` for a built-in.
    ///
    /// # Errors
    ///
    /// Fails when `this` is not an object.
    pub fn intrinsic_receiver(
        &mut self,
        this: &Value,
        access: IntrinsicAccess,
    ) -> RealmResult<ObjectId> {
        let Value::Object(id) = this else {
            return Err(RealmError::Type(format!(
                "Method called on incompatible receiver {}",
                self.type_name(this)
            )));
        };
        let target = self.dispatch(*id, Trap::Unwrap { access })?.into_target()?;
        Ok(self.resolve_target(target))
    }

    /// `value instanceof class`.
    ///
    /// # Errors
    ///
    /// Fails when `class` is not callable.
    pub fn instance_of(&mut self, value: &Value, class: &Value) -> RealmResult<bool> {
        let callable = matches!(class, Value::Object(id) if self.target_kind(*id).is_ok_and(ObjectKind::is_callable));
        if !callable {
            return Err(RealmError::Type(
                "Right-hand side of 'instanceof' is not callable".to_owned(),
            ));
        }
        let Value::Object(obj) = value else {
            return Ok(false);
        };
        let Value::Object(proto) = self.get(class, "prototype")? else {
            return Ok(false);
        };
        let wanted = self.resolve_target(proto);
        let mut current = self.get_prototype_of(*obj)?;
        let mut hops = 0usize;
        while let Some(p) = current {
            if self.resolve_target(p) == wanted {
                return Ok(true);
            }
            hops = hops.saturating_add(1);
            if hops > 10_000 {
                return Err(RealmError::Determinism("prototype chain too deep".to_owned()));
            }
            current = self.get_prototype_of(p)?;
        }
        Ok(false)
    }

    /// Same object identity once proxies are looked through.
    #[must_use]
    pub fn same_target(&self, a: ObjectId, b: ObjectId) -> bool {
        self.resolve_target(a) == self.resolve_target(b)
    }

    // -----------------------------------------------------------------------
    // Raw (ordinary object) semantics
    // -----------------------------------------------------------------------

    /// Ordinary `[[Get]]`, walking the prototype chain.
    ///
    /// # Errors
    ///
    /// Propagates errors from proxies found on the prototype chain.
    pub fn raw_get(&mut self, id: ObjectId, key: &str) -> RealmResult<Value> {
        let obj = self.object(id)?;
        match &obj.kind {
            ObjectKind::Array(items) => {
                if key == "length" {
                    return Ok(Value::Number(items.len() as f64));
                }
                if let Some(i) = array_index(key) {
                    return Ok(items.get(i).cloned().unwrap_or_default());
                }
            },
            ObjectKind::Bytes(bytes) => {
                if key == "length" {
                    return Ok(Value::Number(bytes.len() as f64));
                }
                if let Some(i) = array_index(key) {
                    return Ok(bytes
                        .get(i)
                        .map_or(Value::Undefined, |b| Value::Number(f64::from(*b))));
                }
            },
            ObjectKind::Set(values) if key == "size" => {
                return Ok(Value::Number(values.len() as f64));
            },
            ObjectKind::Map(entries) if key == "size" => {
                return Ok(Value::Number(entries.len() as f64));
            },
            _ => {},
        }
        if let Some(prop) = obj.props.get(key) {
            return Ok(prop.value.clone());
        }
        match obj.proto {
            Some(proto) => self.get_object(proto, key),
            None => Ok(Value::Undefined),
        }
    }

    /// Ordinary `[[Set]]` on an own property.
    ///
    /// # Errors
    ///
    /// Fails on read-only properties and non-extensible objects.
    pub fn raw_set(&mut self, id: ObjectId, key: &str, value: Value) -> RealmResult<()> {
        let obj = self.object_mut(id)?;
        match &mut obj.kind {
            ObjectKind::Array(items) => {
                if key == "length" {
                    let len = to_length(&value)?;
                    items.resize(len, Value::Undefined);
                    return Ok(());
                }
                if let Some(i) = array_index(key) {
                    if !obj.extensible && i >= items.len() {
                        return Err(not_extensible(key));
                    }
                    if i >= items.len() {
                        items.resize(i.saturating_add(1), Value::Undefined);
                    }
                    items[i] = value;
                    return Ok(());
                }
            },
            ObjectKind::Bytes(bytes) => {
                if let Some(i) = array_index(key) {
                    if let Some(slot) = bytes.get_mut(i) {
                        *slot = to_byte(&value);
                    }
                    return Ok(());
                }
                if key == "length" {
                    return Ok(());
                }
            },
            _ => {},
        }
        match obj.props.get_mut(key) {
            Some(prop) if !prop.writable => Err(RealmError::Type(format!(
                "Cannot assign to read only property '{key}' of object"
            ))),
            Some(prop) => {
                prop.value = value;
                Ok(())
            },
            None if !obj.extensible => Err(not_extensible(key)),
            None => {
                obj.props.insert(key, Property::data(value));
                Ok(())
            },
        }
    }

    /// Ordinary `[[HasProperty]]`.
    ///
    /// # Errors
    ///
    /// Propagates errors from proxies found on the prototype chain.
    pub fn raw_has(&mut self, id: ObjectId, key: &str) -> RealmResult<bool> {
        let obj = self.object(id)?;
        let exotic = match &obj.kind {
            ObjectKind::Array(items) => {
                key == "length" || array_index(key).is_some_and(|i| i < items.len())
            },
            ObjectKind::Bytes(bytes) => {
                key == "length" || array_index(key).is_some_and(|i| i < bytes.len())
            },
            _ => false,
        };
        if exotic || obj.props.contains(key) {
            return Ok(true);
        }
        match obj.proto {
            Some(proto) => self.dispatch(proto, Trap::Has { key: key.to_owned() })?.into_bool(),
            None => Ok(false),
        }
    }

    /// Ordinary `[[Delete]]` of an own property.
    ///
    /// # Errors
    ///
    /// Fails on non-extensible objects.
    pub fn raw_delete(&mut self, id: ObjectId, key: &str) -> RealmResult<bool> {
        let obj = self.object_mut(id)?;
        if let ObjectKind::Array(items) = &mut obj.kind {
            if let Some(i) = array_index(key) {
                if i.saturating_add(1) == items.len() {
                    items.pop();
                } else if let Some(slot) = items.get_mut(i) {
                    *slot = Value::Undefined;
                }
                return Ok(true);
            }
        }
        if !obj.extensible && obj.props.contains(key) {
            return Err(RealmError::Type(format!(
                "Cannot delete property '{key}' of a non-extensible object"
            )));
        }
        obj.props.remove(key);
        Ok(true)
    }

    /// Ordinary `[[DefineOwnProperty]]`.
    ///
    /// # Errors
    ///
    /// Fails on non-extensible objects.
    pub fn raw_define(&mut self, id: ObjectId, key: &str, property: Property) -> RealmResult<()> {
        let is_element = matches!(self.object(id)?.kind, ObjectKind::Array(_) | ObjectKind::Bytes(_))
            && (array_index(key).is_some() || key == "length");
        if is_element {
            return self.raw_set(id, key, property.value);
        }
        let obj = self.object_mut(id)?;
        if !obj.extensible && !obj.props.contains(key) {
            return Err(not_extensible(key));
        }
        obj.props.insert(key, property);
        Ok(())
    }

    /// Ordinary own enumerable string keys, insertion ordered.
    ///
    /// # Errors
    ///
    /// Fails for ids that do not belong to this realm.
    pub fn raw_own_keys(&self, id: ObjectId) -> RealmResult<Vec<String>> {
        let obj = self.object(id)?;
        let mut keys: Vec<String> = match &obj.kind {
            ObjectKind::Array(items) => (0..items.len()).map(|i| i.to_string()).collect(),
            ObjectKind::Bytes(bytes) => (0..bytes.len()).map(|i| i.to_string()).collect(),
            _ => Vec::new(),
        };
        keys.extend(obj.props.enumerable_keys().map(str::to_owned));
        Ok(keys)
    }

    /// Ordinary `[[Call]]`.
    ///
    /// # Errors
    ///
    /// Fails on non-callables and propagates anything the callee throws.
    pub fn raw_call(&mut self, id: ObjectId, this: Value, args: &[Value]) -> RealmResult<Value> {
        let kind = self.object(id)?.kind.clone();
        match kind {
            ObjectKind::Function(f) => self.invoke(id, &f, this, args),
            ObjectKind::Native(n) => (n.call)(self, &this, args),
            ObjectKind::Class(c) => Err(RealmError::Type(format!(
                "Class constructor {} cannot be invoked without 'new'",
                c.name
            ))),
            ObjectKind::Proxy(_) => self.call(&Value::Object(id), this, args),
            other => Err(RealmError::Type(format!(
                "{} is not a function",
                other.type_name()
            ))),
        }
    }

    /// Ordinary `[[Construct]]`.
    ///
    /// # Errors
    ///
    /// Fails on non-constructors and propagates anything the constructor throws.
    pub fn raw_construct(&mut self, id: ObjectId, args: &[Value]) -> RealmResult<Value> {
        let kind = self.object(id)?.kind.clone();
        match kind {
            ObjectKind::Class(_) => {
                let instance = self.allocate_instance(id)?;
                self.run_constructor(id, Value::Object(instance), args)?;
                Ok(Value::Object(instance))
            },
            ObjectKind::Native(NativeObject {
                construct: Some(ctor),
                ..
            }) => ctor(self, &Value::Undefined, args),
            ObjectKind::Proxy(_) => self.construct(&Value::Object(id), args),
            other => Err(RealmError::Type(format!(
                "{} is not a constructor",
                other.type_name()
            ))),
        }
    }

    /// Allocate an empty instance of `class` without running its constructor.
    ///
    /// # Errors
    ///
    /// Fails when `class` has no prototype object.
    pub fn allocate_instance(&mut self, class: ObjectId) -> RealmResult<ObjectId> {
        let class = self.resolve_target(class);
        let Value::Object(proto) = self.raw_get(class, "prototype")? else {
            return Err(RealmError::Type("class has no prototype".to_owned()));
        };
        Ok(self.alloc(ObjectKind::Plain, Some(proto)))
    }

    /// Run the constructor chain of `class` against an existing `this`.
    ///
    /// # Errors
    ///
    /// Propagates anything the constructor throws.
    pub fn run_constructor(&mut self, class: ObjectId, this: Value, args: &[Value]) -> RealmResult<()> {
        let class = self.resolve_target(class);
        let ObjectKind::Class(c) = self.object(class)?.kind.clone() else {
            return Ok(());
        };
        match (&c.def.constructor, c.parent) {
            (Some(ctor), _) => {
                let function = FunctionObject {
                    def: Rc::clone(ctor),
                    scope: Rc::clone(&c.scope),
                    home: Some(class),
                    kind: FunctionKind::Constructor,
                };
                self.invoke(class, &function, this, args).map(|_| ())
            },
            (None, Some(parent)) => self.run_constructor(parent, this, args),
            (None, None) => Ok(()),
        }
    }

    fn invoke(
        &mut self,
        id: ObjectId,
        function: &FunctionObject,
        this: Value,
        args: &[Value],
    ) -> RealmResult<Value> {
        if self.frames.len() >= self.limits.max_call_depth {
            return Err(RealmError::Determinism(
                "Maximum call stack size exceeded".to_owned(),
            ));
        }
        let scope = Scope::activation(&function.scope, this);
        {
            let mut s = scope.borrow_mut();
            for (i, param) in function.def.params.iter().enumerate() {
                s.declare(param.clone(), args.get(i).cloned().unwrap_or_default(), true);
            }
        }
        self.frames.push(Frame {
            kind: function.kind,
            class: function.home,
            function: id,
        });
        let result = interp::exec_block(self, &function.def.body, &scope);
        self.frames.pop();
        match result? {
            Completion::Return(v) if function.kind != FunctionKind::Constructor => Ok(v),
            _ => Ok(Value::Undefined),
        }
    }

    // -----------------------------------------------------------------------
    // Function and class creation
    // -----------------------------------------------------------------------

    /// Create a function object closing over `scope`.
    pub fn make_function(
        &mut self,
        def: Rc<FunctionDef>,
        scope: &ScopeRef,
        home: Option<ObjectId>,
        kind: FunctionKind,
        name: &str,
    ) -> ObjectId {
        let proto = self.intrinsics.function_proto;
        let id = self.alloc(
            ObjectKind::Function(FunctionObject {
                def,
                scope: Rc::clone(scope),
                home,
                kind,
            }),
            Some(proto),
        );
        if let Ok(obj) = self.object_mut(id) {
            obj.props.insert("name", Property::hidden(Value::string(name)));
        }
        id
    }

    /// Create a class object with its prototype and methods.
    ///
    /// # Errors
    ///
    /// Fails when `parent` is not a class.
    pub fn make_class(
        &mut self,
        def: Rc<ClassDef>,
        scope: &ScopeRef,
        parent: Option<ObjectId>,
        name: &str,
    ) -> RealmResult<ObjectId> {
        let parent_proto = match parent {
            Some(p) => {
                let raw_parent = self.resolve_target(p);
                if !matches!(self.object(raw_parent)?.kind, ObjectKind::Class(_)) {
                    return Err(RealmError::Type(format!(
                        "Class extends value {} is not a constructor",
                        self.type_name(&Value::Object(p))
                    )));
                }
                match self.raw_get(raw_parent, "prototype")? {
                    Value::Object(pp) => Some(pp),
                    _ => None,
                }
            },
            None => Some(self.intrinsics.object_proto),
        };

        let class_proto = match parent {
            Some(p) => Some(self.resolve_target(p)),
            None => Some(self.intrinsics.function_proto),
        };
        let raw_parent = parent.map(|p| self.resolve_target(p));
        let class_id = self.alloc(
            ObjectKind::Class(ClassObject {
                def: Rc::clone(&def),
                scope: Rc::clone(scope),
                parent: raw_parent,
                name: name.to_owned(),
            }),
            class_proto,
        );

        let prototype = self.alloc(ObjectKind::Plain, parent_proto);
        {
            let proto_obj = self.object_mut(prototype)?;
            proto_obj.constructor = Some(class_id);
            proto_obj
                .props
                .insert("constructor", Property::hidden(Value::Object(class_id)));
        }

        for method in &def.methods {
            let kind = if method.is_static {
                FunctionKind::Static
            } else {
                FunctionKind::Method
            };
            let fid = self.make_function(
                Rc::clone(&method.function),
                scope,
                Some(class_id),
                kind,
                &method.name,
            );
            let holder = if method.is_static { class_id } else { prototype };
            self.object_mut(holder)?
                .props
                .insert(method.name.clone(), Property::hidden(Value::Object(fid)));
        }

        let class_obj = self.object_mut(class_id)?;
        class_obj
            .props
            .insert("prototype", Property::hidden(Value::Object(prototype)));
        class_obj
            .props
            .insert("name", Property::hidden(Value::string(name)));
        Ok(class_id)
    }

    // -----------------------------------------------------------------------
    // Conversions
    // -----------------------------------------------------------------------

    /// `String(value)`.
    ///
    /// # Errors
    ///
    /// Propagates errors from reading array elements through proxies.
    pub fn to_string(&mut self, value: &Value) -> RealmResult<String> {
        Ok(match value {
            Value::Undefined => "undefined".to_owned(),
            Value::Null => "null".to_owned(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::String(s) => s.clone(),
            Value::Object(id) => match self.target_kind(*id)?.clone() {
                ObjectKind::Array(_) => {
                    let items = self.iterate(value)?;
                    let mut parts = Vec::with_capacity(items.len());
                    for item in &items {
                        parts.push(if item.is_nullish() {
                            String::new()
                        } else {
                            self.to_string(item)?
                        });
                    }
                    parts.join(",")
                },
                ObjectKind::Error => {
                    let message = self.get(value, "message")?;
                    format!("Error: {}", self.to_string(&message)?)
                },
                ObjectKind::Function(_) | ObjectKind::Class(_) | ObjectKind::Native(_) => {
                    crate::determinism::function_to_string(self, *id)?
                },
                _ => "[object Object]".to_owned(),
            },
        })
    }

    /// `Number(value)`.
    #[must_use]
    pub fn to_number(&self, value: &Value) -> f64 {
        match value {
            Value::Undefined | Value::Object(_) => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) => {
                let t = s.trim();
                if t.is_empty() {
                    0.0
                } else {
                    t.parse::<f64>().unwrap_or(f64::NAN)
                }
            },
        }
    }

    /// Property key conversion.
    ///
    /// # Errors
    ///
    /// Propagates `to_string` errors.
    pub fn to_property_key(&mut self, value: &Value) -> RealmResult<String> {
        self.to_string(value)
    }

    /// The elements `for...of` visits.
    ///
    /// # Errors
    ///
    /// Fails on values that are not iterable.
    pub fn iterate(&mut self, value: &Value) -> RealmResult<Vec<Value>> {
        match value {
            Value::String(s) => Ok(s.chars().map(|c| Value::String(c.to_string())).collect()),
            Value::Object(id) => {
                let kind = self.target_kind(*id)?.clone();
                match kind {
                    ObjectKind::Array(_) => {
                        let len = to_length(&self.get(value, "length")?)?;
                        let mut out = Vec::with_capacity(len);
                        for i in 0..len {
                            out.push(self.get(value, &i.to_string())?);
                        }
                        Ok(out)
                    },
                    ObjectKind::Set(_) | ObjectKind::Map(_) | ObjectKind::Bytes(_) => {
                        let target = self.intrinsic_receiver(value, IntrinsicAccess::Read)?;
                        match self.object(target)?.kind.clone() {
                            ObjectKind::Set(values) => Ok(values),
                            ObjectKind::Bytes(bytes) => {
                                Ok(bytes.iter().map(|b| Value::Number(f64::from(*b))).collect())
                            },
                            ObjectKind::Map(entries) => Ok(entries
                                .into_iter()
                                .map(|(k, v)| Value::Object(self.new_array(vec![k, v])))
                                .collect()),
                            _ => Ok(Vec::new()),
                        }
                    },
                    other => Err(RealmError::Type(format!(
                        "{} is not iterable",
                        other.type_name()
                    ))),
                }
            },
            other => Err(RealmError::Type(format!(
                "{} is not iterable",
                self.type_name(other)
            ))),
        }
    }

    /// Turn a thrown value into an error carrying its rendered message.
    pub fn throw_value(&mut self, value: Value) -> RealmError {
        let message = match &value {
            Value::Object(id) if matches!(self.target_kind(*id), Ok(ObjectKind::Error)) => {
                let target = self.resolve_target(*id);
                let raw = self
                    .object(target)
                    .ok()
                    .and_then(|o| o.props.get("message").map(|p| p.value.clone()))
                    .unwrap_or_default();
                self.to_string(&raw).unwrap_or_default()
            },
            other => self.to_string(other).unwrap_or_else(|e| e.message()),
        };
        RealmError::Thrown { message, value }
    }
}

fn not_extensible(key: &str) -> RealmError {
    RealmError::Type(format!(
        "Cannot add property {key}, object is not extensible"
    ))
}

pub(crate) fn to_length(value: &Value) -> RealmResult<usize> {
    match value {
        Value::Number(n) if n.is_finite() && *n >= 0.0 && n.fract() == 0.0 => {
            Ok(*n as usize)
        },
        _ => Err(RealmError::Range("Invalid array length".to_owned())),
    }
}

fn to_byte(value: &Value) -> u8 {
    match value {
        Value::Number(n) if n.is_finite() => {
            let whole = n.trunc() as i64;
            u8::try_from(whole.rem_euclid(256)).unwrap_or(0)
        },
        _ => 0,
    }
}
