//! Serialization with structural sharing.
//!
//! A first pass counts how often each container is reached. Containers
//! reached more than once, which includes every member of a cycle, are
//! emitted once into the `dups` table in depth-first order and referenced
//! by `$dup` index everywhere else. A graph without sharing serializes to a
//! bare node.

use std::collections::{HashMap, HashSet};

use jig_realm::{ObjectId, ObjectKind, Realm, Value};
use serde_json::Value as Json;
use tracing::trace;

use crate::error::{XrayError, XrayResult};
use crate::node::{Node, Props};
use crate::scanner::{Purpose, Scanner};
use crate::xray::{Path, Segment, Xray, members};

impl Xray {
    /// Serialize `value` to canonical JSON.
    ///
    /// # Errors
    ///
    /// [`XrayError::Rejected`] naming the deepest value that cannot be
    /// serialized, or a failure from the token saver.
    pub fn serialize(&self, realm: &Realm, value: &Value) -> XrayResult<Json> {
        Ok(self.serialize_node(realm, value)?.to_json())
    }

    /// Serialize `value` to a [`Node`].
    ///
    /// # Errors
    ///
    /// Same as [`Xray::serialize`].
    pub fn serialize_node(&self, realm: &Realm, value: &Value) -> XrayResult<Node> {
        let mut counter = Counter {
            xray: self,
            realm,
            counts: HashMap::new(),
            path: Path::root(),
        };
        counter.visit(value)?;
        let shared: HashSet<ObjectId> = counter
            .counts
            .into_iter()
            .filter(|(_, n)| *n > 1)
            .map(|(id, _)| id)
            .collect();

        let mut emitter = Emitter {
            xray: self,
            realm,
            shared,
            assigned: HashMap::new(),
            dups: Vec::new(),
            path: Path::root(),
        };
        let root = emitter.node(value)?;
        if emitter.dups.is_empty() {
            return Ok(root);
        }
        trace!(dups = emitter.dups.len(), "deduplicated");
        Ok(Node::Dedup {
            root: Box::new(root),
            dups: emitter.dups,
        })
    }
}

struct Counter<'a> {
    xray: &'a Xray,
    realm: &'a Realm,
    counts: HashMap<ObjectId, usize>,
    path: Path,
}

impl Counter<'_> {
    fn visit(&mut self, value: &Value) -> XrayResult<()> {
        let scanner = self.xray.classify(self.realm, value, Purpose::Serialize, &self.path)?;
        let Value::Object(id) = value else {
            return Ok(());
        };
        if scanner == Scanner::Token {
            return Ok(());
        }
        let count = self.counts.entry(self.realm.resolve_target(*id)).or_insert(0);
        *count = count.saturating_add(1);
        if *count > 1 {
            return Ok(());
        }
        for (segment, child) in members(self.realm, value, scanner, Purpose::Serialize, &self.path)? {
            self.path.push(segment);
            self.visit(&child)?;
            self.path.pop();
        }
        Ok(())
    }
}

struct Emitter<'a> {
    xray: &'a Xray,
    realm: &'a Realm,
    shared: HashSet<ObjectId>,
    assigned: HashMap<ObjectId, usize>,
    dups: Vec<Node>,
    path: Path,
}

impl Emitter<'_> {
    fn node(&mut self, value: &Value) -> XrayResult<Node> {
        let scanner = self.xray.classify(self.realm, value, Purpose::Serialize, &self.path)?;
        let id = match value {
            Value::Undefined => return Ok(Node::Undefined),
            Value::Null => return Ok(Node::Null),
            Value::Bool(b) => return Ok(Node::Bool(*b)),
            Value::Number(n) => return Ok(Node::Number(*n)),
            Value::String(s) => return Ok(Node::String(s.clone())),
            Value::Object(id) => *id,
        };
        if scanner == Scanner::Token {
            return self.token(value, id);
        }
        let target = self.realm.resolve_target(id);
        if !self.shared.contains(&target) {
            return self.content(value, target, scanner);
        }
        if let Some(index) = self.assigned.get(&target) {
            return Ok(Node::Dup(*index));
        }
        let index = self.dups.len();
        self.assigned.insert(target, index);
        self.dups.push(Node::Null);
        let content = self.content(value, target, scanner)?;
        if let Some(slot) = self.dups.get_mut(index) {
            *slot = content;
        }
        Ok(Node::Dup(index))
    }

    fn token(&self, value: &Value, id: ObjectId) -> XrayResult<Node> {
        let (Some(saver), Some(proxy)) = (self.xray.saver(), self.xray.token_proxy(self.realm, id)) else {
            return Err(self.path.reject(
                self.realm,
                value,
                Purpose::Serialize,
                "no token saver configured",
            ));
        };
        Ok(Node::Ref(saver.save(self.realm, proxy)?))
    }

    fn content(&mut self, value: &Value, target: ObjectId, scanner: Scanner) -> XrayResult<Node> {
        let mut items = Vec::new();
        let mut props = Props::new();
        let mut keys = Vec::new();
        let mut vals = Vec::new();
        let mut class = None;
        for (segment, child) in members(self.realm, value, scanner, Purpose::Serialize, &self.path)? {
            self.path.push(segment.clone());
            let node = self.node(&child)?;
            self.path.pop();
            match segment {
                Segment::Key(key) => {
                    props.insert(key, node);
                },
                Segment::Index(_) => items.push(node),
                Segment::MapKey(_) => keys.push(node),
                Segment::MapValue(_) => vals.push(node),
                Segment::Class => class = Some(node),
            }
        }
        Ok(match scanner {
            Scanner::Object => Node::Object(props),
            Scanner::Array => Node::Array(items),
            Scanner::ByteArray => match &self.realm.object(target)?.kind {
                ObjectKind::Bytes(bytes) => Node::Bytes(bytes.clone()),
                _ => Node::Bytes(Vec::new()),
            },
            Scanner::Set => Node::Set { values: items, props },
            Scanner::Map => Node::Map {
                entries: keys.into_iter().zip(vals).collect(),
                props,
            },
            Scanner::Arbitrary => {
                let class = class.ok_or_else(|| {
                    self.path
                        .reject(self.realm, value, Purpose::Serialize, "instance has no class")
                })?;
                Node::Arbitrary {
                    state: props,
                    class: Box::new(class),
                }
            },
            other => {
                return Err(XrayError::InvalidNode(format!(
                    "{} values have no content",
                    other.name()
                )));
            },
        })
    }
}
