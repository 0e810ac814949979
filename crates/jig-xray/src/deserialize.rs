//! Rebuilding values from nodes.

use jig_realm::{ObjectId, ObjectKind, Realm, Value};
use serde_json::Value as Json;
use tracing::trace;

use crate::clone::fill;
use crate::error::{XrayError, XrayResult};
use crate::node::{Node, Props};
use crate::scanner::Purpose;
use crate::xray::{Path, Segment, Xray};

impl Xray {
    /// Rebuild a value from JSON produced by [`Xray::serialize`].
    ///
    /// # Errors
    ///
    /// [`XrayError::InvalidNode`] for malformed documents,
    /// [`XrayError::Dedup`] for a bad dup table, and token loader failures.
    pub fn deserialize(&self, realm: &mut Realm, json: &Json) -> XrayResult<Value> {
        let node = Node::from_json(json)?;
        self.deserialize_node(realm, &node)
    }

    /// Rebuild a value from a [`Node`].
    ///
    /// Shared nodes are materialised as empty shells first, then filled in
    /// table order, and the root is resolved last, so `$dup` references may
    /// point forwards, backwards, or at themselves.
    ///
    /// # Errors
    ///
    /// Same as [`Xray::deserialize`].
    pub fn deserialize_node(&self, realm: &mut Realm, node: &Node) -> XrayResult<Value> {
        let Node::Dedup { root, dups } = node else {
            return Builder::new(self, Vec::new()).build(realm, node);
        };
        let mut builder = Builder::new(self, Vec::with_capacity(dups.len()));
        for dup in dups {
            self.classify_node(dup, &builder.path)?;
            let shell = builder.shell(realm, dup)?;
            builder.shells.push(shell);
        }
        for (index, dup) in dups.iter().enumerate() {
            let shell = builder.shells.get(index).cloned().unwrap_or_default();
            builder.fill_shell(realm, &shell, dup)?;
        }
        trace!(dups = dups.len(), "rebuilt shared nodes");
        builder.build(realm, root)
    }
}

struct Builder<'a> {
    xray: &'a Xray,
    shells: Vec<Value>,
    path: Path,
}

impl<'a> Builder<'a> {
    fn new(xray: &'a Xray, shells: Vec<Value>) -> Self {
        Self {
            xray,
            shells,
            path: Path::root(),
        }
    }

    fn refuse(&self, what: impl Into<String>, reason: &str) -> XrayError {
        XrayError::Rejected {
            purpose: Purpose::Deserialize,
            culprit: what.into(),
            path: self.path.to_string(),
            reason: reason.to_owned(),
        }
    }

    /// An empty container for a shared node, or the finished value for
    /// nodes that have no children.
    fn shell(&mut self, realm: &mut Realm, node: &Node) -> XrayResult<Value> {
        let id = match node {
            Node::Object(_) => realm.new_object(),
            Node::Array(_) => realm.new_array(Vec::new()),
            Node::Set { .. } => realm.new_set(Vec::new()),
            Node::Map { .. } => realm.new_map(Vec::new()),
            Node::Arbitrary { class, .. } => {
                self.path.push(Segment::Class);
                let class = self.build(realm, class);
                self.path.pop();
                let class = class?;
                self.instance_of(realm, &class)?
            },
            Node::Dedup { .. } | Node::Dup(_) => {
                return Err(XrayError::Dedup("dups entries must be values".to_owned()));
            },
            leaf => return self.build(realm, leaf),
        };
        Ok(Value::Object(id))
    }

    fn fill_shell(&mut self, realm: &mut Realm, shell: &Value, node: &Node) -> XrayResult<()> {
        let Value::Object(id) = shell else {
            return Ok(());
        };
        let children = match node {
            Node::Object(props) | Node::Arbitrary { state: props, .. } => self.props(realm, props)?,
            Node::Array(items) => self.indexed(realm, items)?,
            Node::Set { values, props } => {
                let mut children = self.indexed(realm, values)?;
                children.extend(self.props(realm, props)?);
                children
            },
            Node::Map { entries, props } => {
                let mut children = self.entries(realm, entries)?;
                children.extend(self.props(realm, props)?);
                children
            },
            _ => return Ok(()),
        };
        fill(realm, *id, children)
    }

    fn build(&mut self, realm: &mut Realm, node: &Node) -> XrayResult<Value> {
        self.xray.classify_node(node, &self.path)?;
        match node {
            Node::Undefined => Ok(Value::Undefined),
            Node::Null => Ok(Value::Null),
            Node::Bool(b) => Ok(Value::Bool(*b)),
            Node::Number(n) => Ok(Value::Number(*n)),
            Node::String(s) => Ok(Value::String(s.clone())),
            Node::Bytes(bytes) => Ok(Value::Object(realm.new_bytes(bytes.clone()))),
            Node::Ref(location) => {
                let Some(loader) = self.xray.loader() else {
                    return Err(self.path.reject_node(node, "no token loader configured"));
                };
                loader.load(realm, location)
            },
            Node::Dup(index) => self
                .shells
                .get(*index)
                .cloned()
                .ok_or_else(|| XrayError::Dedup(format!("Invalid dup index {index}"))),
            Node::Dedup { .. } => Err(XrayError::Dedup("nested $dedup".to_owned())),
            container => {
                let shell = self.shell(realm, container)?;
                self.fill_shell(realm, &shell, container)?;
                Ok(shell)
            },
        }
    }

    fn instance_of(&self, realm: &mut Realm, class: &Value) -> XrayResult<ObjectId> {
        let Value::Object(class_id) = class else {
            return Err(self.refuse("$arbob", "T is not a class"));
        };
        let raw = realm.resolve_target(*class_id);
        if !matches!(realm.object(raw)?.kind, ObjectKind::Class(_)) {
            return Err(self.refuse("$arbob", "T is not a class"));
        }
        let proto = realm.raw_get(raw, "prototype")?.as_object();
        Ok(realm.alloc(ObjectKind::Plain, proto))
    }

    fn props(&mut self, realm: &mut Realm, props: &Props) -> XrayResult<Vec<(Segment, Value)>> {
        let mut out = Vec::with_capacity(props.len());
        for (key, node) in props {
            self.path.push(Segment::Key(key.clone()));
            let value = self.build(realm, node)?;
            self.path.pop();
            out.push((Segment::Key(key.clone()), value));
        }
        Ok(out)
    }

    fn indexed(&mut self, realm: &mut Realm, items: &[Node]) -> XrayResult<Vec<(Segment, Value)>> {
        let mut out = Vec::with_capacity(items.len());
        for (i, node) in items.iter().enumerate() {
            self.path.push(Segment::Index(i));
            let value = self.build(realm, node)?;
            self.path.pop();
            out.push((Segment::Index(i), value));
        }
        Ok(out)
    }

    fn entries(&mut self, realm: &mut Realm, entries: &[(Node, Node)]) -> XrayResult<Vec<(Segment, Value)>> {
        let mut out = Vec::with_capacity(entries.len().saturating_mul(2));
        for (i, (k, v)) in entries.iter().enumerate() {
            self.path.push(Segment::MapKey(i));
            let key = self.build(realm, k)?;
            self.path.pop();
            self.path.push(Segment::MapValue(i));
            let value = self.build(realm, v)?;
            self.path.pop();
            out.push((Segment::MapKey(i), key));
            out.push((Segment::MapValue(i), value));
        }
        Ok(out)
    }
}
