//! Proxy seam.
//!
//! A heap slot of kind [`ObjectKind::Proxy`](crate::heap::ObjectKind::Proxy)
//! never executes operations itself. Every operation is reified as a
//! [`Trap`] and handed to the slot's [`ProxyHandler`], which may grant, deny,
//! or transform it before it reaches the target.

use std::fmt;

use crate::error::{RealmError, RealmResult};
use crate::heap::Property;
use crate::realm::Realm;
use crate::value::{ObjectId, Value};

/// How a built-in intends to use an unwrapped intrinsic receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntrinsicAccess {
    /// The built-in only reads (`has`, `get`, `size`, iteration).
    Read,
    /// The built-in mutates (`add`, `set`, `delete`, `clear`).
    Write,
}

/// One low-level operation on an object.
#[derive(Debug, Clone, PartialEq)]
pub enum Trap {
    /// Property read.
    Get {
        /// Property key.
        key: String,
    },
    /// Property write.
    Set {
        /// Property key.
        key: String,
        /// New value.
        value: Value,
    },
    /// `key in object`.
    Has {
        /// Property key.
        key: String,
    },
    /// `delete object[key]`.
    Delete {
        /// Property key.
        key: String,
    },
    /// Define an own property.
    Define {
        /// Property key.
        key: String,
        /// Property to install.
        property: Property,
    },
    /// Enumerable own string keys, insertion ordered.
    OwnKeys,
    /// Call with a `this` value.
    Apply {
        /// Receiver.
        this: Value,
        /// Arguments.
        args: Vec<Value>,
    },
    /// `new`.
    Construct {
        /// Arguments.
        args: Vec<Value>,
    },
    /// Read `[[Prototype]]`.
    GetPrototypeOf,
    /// Replace `[[Prototype]]`.
    SetPrototypeOf {
        /// New prototype.
        proto: Option<ObjectId>,
    },
    /// Forbid new properties.
    PreventExtensions,
    /// Query extensibility.
    IsExtensible,
    /// A built-in asks for the real intrinsic object behind a proxy so native
    /// brand checks succeed.
    Unwrap {
        /// Intended access.
        access: IntrinsicAccess,
    },
}

impl Trap {
    /// Stable name used in logs and errors.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Get { .. } => "get",
            Self::Set { .. } => "set",
            Self::Has { .. } => "has",
            Self::Delete { .. } => "deleteProperty",
            Self::Define { .. } => "defineProperty",
            Self::OwnKeys => "ownKeys",
            Self::Apply { .. } => "apply",
            Self::Construct { .. } => "construct",
            Self::GetPrototypeOf => "getPrototypeOf",
            Self::SetPrototypeOf { .. } => "setPrototypeOf",
            Self::PreventExtensions => "preventExtensions",
            Self::IsExtensible => "isExtensible",
            Self::Unwrap { .. } => "unwrap",
        }
    }

    /// The property key the trap concerns, if any.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Get { key }
            | Self::Set { key, .. }
            | Self::Has { key }
            | Self::Delete { key }
            | Self::Define { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Whether the trap mutates the target.
    #[must_use]
    pub fn is_write(&self) -> bool {
        match self {
            Self::Set { .. }
            | Self::Define { .. }
            | Self::Delete { .. }
            | Self::SetPrototypeOf { .. }
            | Self::PreventExtensions => true,
            Self::Unwrap { access } => *access == IntrinsicAccess::Write,
            _ => false,
        }
    }
}

/// Result of a trap.
#[derive(Debug, Clone, PartialEq)]
pub enum TrapOutcome {
    /// A value (get, apply, construct).
    Value(Value),
    /// A boolean (has, delete, is-extensible).
    Bool(bool),
    /// Keys (own-keys).
    Keys(Vec<String>),
    /// A prototype (get-prototype-of).
    Proto(Option<ObjectId>),
    /// The intrinsic target (unwrap).
    Target(ObjectId),
    /// No result (set, define, set-prototype-of, prevent-extensions).
    Done,
}

impl TrapOutcome {
    /// Extract a value.
    ///
    /// # Errors
    ///
    /// Fails if the handler produced a different outcome shape.
    pub fn into_value(self) -> RealmResult<Value> {
        match self {
            Self::Value(v) => Ok(v),
            other => Err(shape_error("value", &other)),
        }
    }

    /// Extract a boolean.
    ///
    /// # Errors
    ///
    /// Fails if the handler produced a different outcome shape.
    pub fn into_bool(self) -> RealmResult<bool> {
        match self {
            Self::Bool(b) => Ok(b),
            other => Err(shape_error("bool", &other)),
        }
    }

    /// Extract keys.
    ///
    /// # Errors
    ///
    /// Fails if the handler produced a different outcome shape.
    pub fn into_keys(self) -> RealmResult<Vec<String>> {
        match self {
            Self::Keys(k) => Ok(k),
            other => Err(shape_error("keys", &other)),
        }
    }

    /// Extract a prototype.
    ///
    /// # Errors
    ///
    /// Fails if the handler produced a different outcome shape.
    pub fn into_proto(self) -> RealmResult<Option<ObjectId>> {
        match self {
            Self::Proto(p) => Ok(p),
            other => Err(shape_error("proto", &other)),
        }
    }

    /// Extract an unwrapped target.
    ///
    /// # Errors
    ///
    /// Fails if the handler produced a different outcome shape.
    pub fn into_target(self) -> RealmResult<ObjectId> {
        match self {
            Self::Target(t) => Ok(t),
            other => Err(shape_error("target", &other)),
        }
    }
}

fn shape_error(wanted: &str, got: &TrapOutcome) -> RealmError {
    RealmError::Internal(format!("proxy handler returned {got:?}, expected {wanted}"))
}

/// Handler behind a proxy slot.
///
/// Handlers run synchronously and must never suspend.
pub trait ProxyHandler: fmt::Debug {
    /// Handle `trap` on the pair (`proxy`, `target`).
    ///
    /// # Errors
    ///
    /// Any error is propagated to the code that performed the operation.
    fn handle(
        &self,
        realm: &mut Realm,
        proxy: ObjectId,
        target: ObjectId,
        trap: Trap,
    ) -> RealmResult<TrapOutcome>;
}
