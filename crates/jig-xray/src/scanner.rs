//! Value classification.
//!
//! Scanners are consulted in a fixed order and the first one that claims a
//! value decides how it is handled. A claim carries a verdict per purpose, so
//! a scanner can accept a value for cloning but refuse it for serialization.
//! Deserialization runs the same chain over [`Node`]s.

use std::fmt;

use jig_realm::{ObjectId, ObjectKind, Realm, Value};

use crate::node::{Node, is_json_safe};
use crate::xray::Xray;

/// What an operation is doing with a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    /// Walking the graph for tokens and deployables.
    Scan,
    /// Deep-copying inside the realm.
    Clone,
    /// Producing JSON.
    Serialize,
    /// Rebuilding from JSON.
    Deserialize,
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Scan => "scan",
            Self::Clone => "clone",
            Self::Serialize => "serialize",
            Self::Deserialize => "deserialize",
        })
    }
}

/// A scanner's answer for one purpose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The scanner handles the value.
    Accept,
    /// The scanner owns the value but refuses this purpose.
    Refuse(String),
}

/// The scanners, in consultation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scanner {
    /// `$dedup` and `$dup` nodes. Never claims live values.
    Dedup,
    /// `undefined`.
    Undefined,
    /// `null`, booleans, numbers, strings.
    Primitive,
    /// Ordinary objects.
    Object,
    /// Arrays.
    Array,
    /// Byte arrays.
    ByteArray,
    /// Sets.
    Set,
    /// Maps.
    Map,
    /// Jigs and code, saved by location.
    Token,
    /// Classes not yet deployed.
    Deployable,
    /// Instances of deployed classes that are not jigs.
    Arbitrary,
}

/// Consultation order. The last three run only when enabled on the [`Xray`].
pub const SCANNERS: [Scanner; 11] = [
    Scanner::Dedup,
    Scanner::Undefined,
    Scanner::Primitive,
    Scanner::Object,
    Scanner::Array,
    Scanner::ByteArray,
    Scanner::Set,
    Scanner::Map,
    Scanner::Token,
    Scanner::Deployable,
    Scanner::Arbitrary,
];

impl Scanner {
    /// Short name used in diagnostics.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Dedup => "dedup",
            Self::Undefined => "undefined",
            Self::Primitive => "primitive",
            Self::Object => "object",
            Self::Array => "array",
            Self::ByteArray => "byte-array",
            Self::Set => "set",
            Self::Map => "map",
            Self::Token => "token",
            Self::Deployable => "deployable",
            Self::Arbitrary => "arbitrary",
        }
    }

    /// Verdict for `value`, or `None` if this scanner does not claim it.
    pub(crate) fn claim(self, xray: &Xray, realm: &Realm, value: &Value, purpose: Purpose) -> Option<Verdict> {
        match (self, value) {
            (Self::Dedup, _) => None,
            (Self::Undefined, Value::Undefined) => Some(Verdict::Accept),
            (Self::Primitive, Value::Null | Value::Bool(_) | Value::String(_)) => Some(Verdict::Accept),
            (Self::Primitive, Value::Number(n)) => {
                if purpose == Purpose::Serialize && !is_json_safe(*n) {
                    Some(Verdict::Refuse("not JSON-safe".to_owned()))
                } else {
                    Some(Verdict::Accept)
                }
            },
            (_, Value::Object(id)) => self.claim_object(xray, realm, *id, purpose),
            _ => None,
        }
    }

    /// Verdict for a node being deserialized, or `None` if this scanner does
    /// not claim it.
    pub(crate) fn claim_node(self, xray: &Xray, node: &Node) -> Option<Verdict> {
        let accept = Some(Verdict::Accept);
        match (self, node) {
            (Self::Dedup, Node::Dedup { .. } | Node::Dup(_))
            | (Self::Undefined, Node::Undefined)
            | (Self::Primitive, Node::Null | Node::Bool(_) | Node::Number(_) | Node::String(_))
            | (Self::Object, Node::Object(_))
            | (Self::Array, Node::Array(_))
            | (Self::ByteArray, Node::Bytes(_))
            | (Self::Set, Node::Set { .. })
            | (Self::Map, Node::Map { .. }) => accept,
            (Self::Token, Node::Ref(_)) => match xray.loader() {
                Some(_) => accept,
                None => Some(Verdict::Refuse("no token loader configured".to_owned())),
            },
            (Self::Arbitrary, Node::Arbitrary { .. }) => {
                if xray.arbitrary_enabled() {
                    accept
                } else {
                    Some(Verdict::Refuse("arbitrary objects are not enabled".to_owned()))
                }
            },
            _ => None,
        }
    }

    fn claim_object(self, xray: &Xray, realm: &Realm, id: ObjectId, purpose: Purpose) -> Option<Verdict> {
        let target = realm.resolve_target(id);
        let kind = &realm.object(target).ok()?.kind;
        let accept = Some(Verdict::Accept);
        match self {
            Self::Object if matches!(kind, ObjectKind::Plain) && realm.owner_class(target).is_none() => accept,
            Self::Array if matches!(kind, ObjectKind::Array(_)) => accept,
            Self::ByteArray if matches!(kind, ObjectKind::Bytes(_)) => accept,
            Self::Set if matches!(kind, ObjectKind::Set(_)) => accept,
            Self::Map if matches!(kind, ObjectKind::Map(_)) => accept,
            Self::Token if xray.token_proxy(realm, id).is_some() => match purpose {
                Purpose::Serialize if !xray.has_saver() => {
                    Some(Verdict::Refuse("no token saver configured".to_owned()))
                },
                _ => accept,
            },
            Self::Deployable if xray.deployables_enabled() && matches!(kind, ObjectKind::Class(_)) => {
                match purpose {
                    Purpose::Serialize => Some(Verdict::Refuse("class is not deployed; deploy it first".to_owned())),
                    _ => accept,
                }
            },
            Self::Arbitrary
                if xray.arbitrary_enabled()
                    && matches!(kind, ObjectKind::Plain)
                    && realm.owner_class(target).is_some() =>
            {
                accept
            },
            _ => None,
        }
    }
}
