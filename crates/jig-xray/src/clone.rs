//! Deep copies inside one realm.

use std::collections::HashMap;

use jig_realm::{ObjectId, ObjectKind, Property, Realm, Value};

use crate::error::XrayResult;
use crate::scanner::{Purpose, Scanner};
use crate::xray::{Path, Segment, Xray, members};

impl Xray {
    /// Copy `value` into fresh raw objects. Tokens and classes are kept by
    /// identity, shared references and cycles are preserved, and proxies of
    /// inner objects are copied through to plain data.
    ///
    /// # Errors
    ///
    /// [`crate::XrayError::Rejected`] for values no scanner can clone.
    pub fn clone_value(&self, realm: &mut Realm, value: &Value) -> XrayResult<Value> {
        let mut walk = CloneWalk {
            xray: self,
            cache: HashMap::new(),
            path: Path::root(),
        };
        walk.copy(realm, value)
    }
}

struct CloneWalk<'a> {
    xray: &'a Xray,
    cache: HashMap<ObjectId, ObjectId>,
    path: Path,
}

impl CloneWalk<'_> {
    fn copy(&mut self, realm: &mut Realm, value: &Value) -> XrayResult<Value> {
        let scanner = self.xray.classify(realm, value, Purpose::Clone, &self.path)?;
        let Value::Object(id) = value else {
            return Ok(value.clone());
        };
        if matches!(scanner, Scanner::Token | Scanner::Deployable) {
            return Ok(value.clone());
        }
        let target = realm.resolve_target(*id);
        if let Some(copy) = self.cache.get(&target) {
            return Ok(Value::Object(*copy));
        }
        let shell = shell_like(realm, target, scanner)?;
        self.cache.insert(target, shell);

        let children = members(realm, value, scanner, Purpose::Clone, &self.path)?;
        let mut copied = Vec::with_capacity(children.len());
        for (segment, child) in children {
            self.path.push(segment.clone());
            let copy = self.copy(realm, &child)?;
            self.path.pop();
            copied.push((segment, copy));
        }
        fill(realm, shell, copied)?;
        Ok(Value::Object(shell))
    }
}

/// An empty container of the same shape as `target`.
fn shell_like(realm: &mut Realm, target: ObjectId, scanner: Scanner) -> XrayResult<ObjectId> {
    let source = realm.object(target)?;
    let proto = source.proto;
    let bytes = match &source.kind {
        ObjectKind::Bytes(b) => Some(b.clone()),
        _ => None,
    };
    Ok(match scanner {
        Scanner::Array => realm.new_array(Vec::new()),
        Scanner::ByteArray => realm.new_bytes(bytes.unwrap_or_default()),
        Scanner::Set => realm.new_set(Vec::new()),
        Scanner::Map => realm.new_map(Vec::new()),
        Scanner::Arbitrary => realm.alloc(ObjectKind::Plain, proto),
        _ => realm.new_object(),
    })
}

/// Store children into a container created by [`shell_like`] or by the
/// deserializer. Class segments are carried by the prototype and skipped.
pub(crate) fn fill(realm: &mut Realm, shell: ObjectId, children: Vec<(Segment, Value)>) -> XrayResult<()> {
    let object = realm.object_mut(shell)?;
    let mut pending_key: Option<Value> = None;
    for (segment, value) in children {
        match (segment, &mut object.kind) {
            (Segment::Key(key), _) => object.props.insert(key, Property::data(value)),
            (Segment::Index(_), ObjectKind::Array(items)) => items.push(value),
            (Segment::Index(_), ObjectKind::Set(values)) => {
                if !values.iter().any(|v| v.same_value_zero(&value)) {
                    values.push(value);
                }
            },
            (Segment::MapKey(_), ObjectKind::Map(_)) => pending_key = Some(value),
            (Segment::MapValue(_), ObjectKind::Map(entries)) => {
                if let Some(key) = pending_key.take() {
                    match entries.iter_mut().find(|(k, _)| k.same_value_zero(&key)) {
                        Some(slot) => slot.1 = value,
                        None => entries.push((key, value)),
                    }
                }
            },
            _ => {},
        }
    }
    Ok(())
}
