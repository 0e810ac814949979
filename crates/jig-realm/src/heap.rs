//! Object arena.
//!
//! Objects live for the lifetime of their realm. Nothing is collected, so an
//! [`ObjectId`] handed out once stays valid and keeps its identity; registries
//! outside the realm may key on ids without weak references.

use std::fmt;
use std::rc::Rc;

use crate::ast::{ClassDef, FunctionDef};
use crate::error::{RealmError, RealmResult};
use crate::proxy::ProxyHandler;
use crate::realm::Realm;
use crate::scope::ScopeRef;
use crate::value::{ObjectId, Value};

/// Signature of a built-in function.
pub type NativeFn = fn(&mut Realm, &Value, &[Value]) -> RealmResult<Value>;

/// Own data property.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    /// Stored value.
    pub value: Value,
    /// Listed by key enumeration.
    pub enumerable: bool,
    /// Accepts assignment.
    pub writable: bool,
}

impl Property {
    /// Ordinary enumerable, writable data property.
    #[must_use]
    pub fn data(value: Value) -> Self {
        Self {
            value,
            enumerable: true,
            writable: true,
        }
    }

    /// Non-enumerable property, as used for methods and internals.
    #[must_use]
    pub fn hidden(value: Value) -> Self {
        Self {
            value,
            enumerable: false,
            writable: true,
        }
    }
}

/// Own properties in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties(Vec<(String, Property)>);

impl Properties {
    /// Looks up a property.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Property> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, p)| p)
    }

    /// Looks up a property mutably.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Property> {
        self.0.iter_mut().find(|(k, _)| k == key).map(|(_, p)| p)
    }

    /// Inserts or replaces. Replacing keeps the original position.
    pub fn insert(&mut self, key: impl Into<String>, property: Property) {
        let key = key.into();
        if let Some(existing) = self.get_mut(&key) {
            *existing = property;
        } else {
            self.0.push((key, property));
        }
    }

    /// Removes a property, returning it.
    pub fn remove(&mut self, key: &str) -> Option<Property> {
        let idx = self.0.iter().position(|(k, _)| k == key)?;
        Some(self.0.remove(idx).1)
    }

    /// Whether a key is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Enumerable keys in insertion order.
    pub fn enumerable_keys(&self) -> impl Iterator<Item = &str> {
        self.0
            .iter()
            .filter(|(_, p)| p.enumerable)
            .map(|(k, _)| k.as_str())
    }

    /// All entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Property)> {
        self.0.iter().map(|(k, p)| (k.as_str(), p))
    }

    /// Drops every property.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Number of properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no properties.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// What kind of call frame a function body runs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    /// Free function.
    Plain,
    /// Instance method on a class prototype.
    Method,
    /// Static method on a class.
    Static,
    /// Class constructor.
    Constructor,
}

/// A user-defined function closure.
#[derive(Debug, Clone)]
pub struct FunctionObject {
    /// Parsed definition.
    pub def: Rc<FunctionDef>,
    /// Captured scope.
    pub scope: ScopeRef,
    /// Class the function was declared in, for methods.
    pub home: Option<ObjectId>,
    /// Frame kind the body runs as.
    pub kind: FunctionKind,
}

/// A user-defined class.
#[derive(Debug, Clone)]
pub struct ClassObject {
    /// Parsed definition.
    pub def: Rc<ClassDef>,
    /// Captured scope.
    pub scope: ScopeRef,
    /// Resolved `extends` target.
    pub parent: Option<ObjectId>,
    /// Name, synthetic for anonymous classes.
    pub name: String,
}

/// A built-in function.
#[derive(Clone)]
pub struct NativeObject {
    /// Name used by `toString`.
    pub name: &'static str,
    /// Call behaviour.
    pub call: NativeFn,
    /// Construct behaviour, for built-in constructors.
    pub construct: Option<NativeFn>,
}

impl fmt::Debug for NativeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeObject")
            .field("name", &self.name)
            .field("constructible", &self.construct.is_some())
            .finish()
    }
}

/// A proxy slot: every operation goes through `handler`.
#[derive(Clone)]
pub struct ProxyObject {
    /// Underlying target object.
    pub target: ObjectId,
    /// Interceptor chain.
    pub handler: Rc<dyn ProxyHandler>,
}

impl fmt::Debug for ProxyObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyObject")
            .field("target", &self.target)
            .field("handler", &self.handler)
            .finish()
    }
}

/// Object payload by kind.
#[derive(Debug, Clone)]
pub enum ObjectKind {
    /// Ordinary object.
    Plain,
    /// Dense array.
    Array(Vec<Value>),
    /// `Uint8Array`.
    Bytes(Vec<u8>),
    /// `Set`, insertion ordered.
    Set(Vec<Value>),
    /// `Map`, insertion ordered.
    Map(Vec<(Value, Value)>),
    /// Thrown error object.
    Error,
    /// User function.
    Function(FunctionObject),
    /// User class.
    Class(ClassObject),
    /// Built-in function.
    Native(NativeObject),
    /// Proxy.
    Proxy(ProxyObject),
}

impl ObjectKind {
    /// Short runtime type name used in diagnostics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Plain => "Object",
            Self::Array(_) => "Array",
            Self::Bytes(_) => "Uint8Array",
            Self::Set(_) => "Set",
            Self::Map(_) => "Map",
            Self::Error => "Error",
            Self::Function(_) | Self::Native(_) => "Function",
            Self::Class(_) => "Class",
            Self::Proxy(_) => "Proxy",
        }
    }

    /// Whether values of this kind are callable.
    #[must_use]
    pub fn is_callable(&self) -> bool {
        matches!(self, Self::Function(_) | Self::Class(_) | Self::Native(_))
    }
}

/// One arena slot.
#[derive(Debug, Clone)]
pub struct HeapObject {
    /// Kind-specific payload.
    pub kind: ObjectKind,
    /// Own properties.
    pub props: Properties,
    /// `[[Prototype]]`.
    pub proto: Option<ObjectId>,
    /// Whether new properties may be added.
    pub extensible: bool,
    /// For prototype objects, the class they belong to.
    pub constructor: Option<ObjectId>,
}

impl HeapObject {
    /// New object of `kind` with the given prototype.
    #[must_use]
    pub fn new(kind: ObjectKind, proto: Option<ObjectId>) -> Self {
        Self {
            kind,
            props: Properties::default(),
            proto,
            extensible: true,
            constructor: None,
        }
    }
}

/// The arena itself.
#[derive(Debug, Default)]
pub struct Heap {
    objects: Vec<HeapObject>,
}

impl Heap {
    /// Stores an object and returns its id.
    pub fn alloc(&mut self, object: HeapObject) -> ObjectId {
        let id = u32::try_from(self.objects.len()).unwrap_or(u32::MAX);
        self.objects.push(object);
        ObjectId::new(id)
    }

    /// Borrow an object.
    ///
    /// # Errors
    ///
    /// Returns [`RealmError::Internal`] if the id does not belong to this heap.
    pub fn get(&self, id: ObjectId) -> RealmResult<&HeapObject> {
        self.objects
            .get(id.index())
            .ok_or_else(|| RealmError::Internal(format!("unknown object {id}")))
    }

    /// Borrow an object mutably.
    ///
    /// # Errors
    ///
    /// Returns [`RealmError::Internal`] if the id does not belong to this heap.
    pub fn get_mut(&mut self, id: ObjectId) -> RealmResult<&mut HeapObject> {
        self.objects
            .get_mut(id.index())
            .ok_or_else(|| RealmError::Internal(format!("unknown object {id}")))
    }

    /// Number of allocated objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether nothing has been allocated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_properties_keep_insertion_order_on_replace() {
        let mut props = Properties::default();
        props.insert("b", Property::data(Value::Number(1.0)));
        props.insert("a", Property::data(Value::Number(2.0)));
        props.insert("b", Property::data(Value::Number(3.0)));
        let keys: Vec<_> = props.enumerable_keys().collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(props.get("b").unwrap().value, Value::Number(3.0));
    }

    #[test]
    fn test_hidden_properties_are_not_enumerable() {
        let mut props = Properties::default();
        props.insert("x", Property::data(Value::Null));
        props.insert("m", Property::hidden(Value::Null));
        assert_eq!(props.enumerable_keys().collect::<Vec<_>>(), vec!["x"]);
        assert!(props.contains("m"));
    }

    #[test]
    fn test_unknown_id_is_internal_error() {
        let heap = Heap::default();
        assert!(matches!(
            heap.get(ObjectId::new(7)),
            Err(RealmError::Internal(_))
        ));
    }
}
