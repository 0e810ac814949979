//! `Set`, `Map`, and `Uint8Array`.
//!
//! These built-ins keep their contents in internal slots, so each method asks
//! the realm for the real receiver first. A membrane sees that request as an
//! unwrap of the given access kind.

use super::{arg, link_prototype, method};
use crate::error::{RealmError, RealmResult};
use crate::heap::ObjectKind;
use crate::proxy::IntrinsicAccess;
use crate::realm::Realm;
use crate::value::{ObjectId, Value};

pub(super) fn set_constructor(realm: &mut Realm) -> ObjectId {
    let ctor = realm.new_native("Set", requires_new, Some(new_set));
    let proto = realm.intrinsics.set_proto;
    link_prototype(realm, ctor, proto);
    ctor
}

pub(super) fn map_constructor(realm: &mut Realm) -> ObjectId {
    let ctor = realm.new_native("Map", requires_new, Some(new_map));
    let proto = realm.intrinsics.map_proto;
    link_prototype(realm, ctor, proto);
    ctor
}

pub(super) fn bytes_constructor(realm: &mut Realm) -> ObjectId {
    let ctor = realm.new_native("Uint8Array", requires_new, Some(new_bytes));
    let proto = realm.intrinsics.bytes_proto;
    link_prototype(realm, ctor, proto);
    ctor
}

pub(super) fn install_prototypes(realm: &mut Realm) {
    let set = realm.intrinsics.set_proto;
    method(realm, set, "add", set_add);
    method(realm, set, "has", has);
    method(realm, set, "delete", delete);
    method(realm, set, "clear", clear);
    method(realm, set, "forEach", for_each);
    method(realm, set, "values", values);
    method(realm, set, "keys", values);
    method(realm, set, "entries", entries);

    let map = realm.intrinsics.map_proto;
    method(realm, map, "get", map_get);
    method(realm, map, "set", map_set);
    method(realm, map, "has", has);
    method(realm, map, "delete", delete);
    method(realm, map, "clear", clear);
    method(realm, map, "forEach", for_each);
    method(realm, map, "keys", keys);
    method(realm, map, "values", values);
    method(realm, map, "entries", entries);

    let bytes = realm.intrinsics.bytes_proto;
    method(realm, bytes, "slice", bytes_slice);
    method(realm, bytes, "fill", bytes_fill);
}

fn requires_new(_realm: &mut Realm, _this: &Value, _args: &[Value]) -> RealmResult<Value> {
    Err(RealmError::Type(
        "Constructor requires 'new'".to_owned(),
    ))
}

fn new_set(realm: &mut Realm, _this: &Value, args: &[Value]) -> RealmResult<Value> {
    let items = match arg(args, 0) {
        Value::Undefined | Value::Null => Vec::new(),
        v => realm.iterate(&v)?,
    };
    Ok(Value::Object(realm.new_set(items)))
}

fn new_map(realm: &mut Realm, _this: &Value, args: &[Value]) -> RealmResult<Value> {
    let mut entries = Vec::new();
    if let v @ Value::Object(_) = arg(args, 0) {
        for pair in realm.iterate(&v)? {
            let key = realm.get(&pair, "0")?;
            let value = realm.get(&pair, "1")?;
            entries.push((key, value));
        }
    }
    Ok(Value::Object(realm.new_map(entries)))
}

fn new_bytes(realm: &mut Realm, _this: &Value, args: &[Value]) -> RealmResult<Value> {
    let bytes = match arg(args, 0) {
        Value::Undefined => Vec::new(),
        Value::Number(n) => vec![0; crate::realm::to_length(&Value::Number(n))?],
        v => realm
            .iterate(&v)?
            .iter()
            .map(|b| byte(realm, b))
            .collect(),
    };
    Ok(Value::Object(realm.new_bytes(bytes)))
}

fn byte(realm: &Realm, value: &Value) -> u8 {
    let n = realm.to_number(value);
    if !n.is_finite() {
        return 0;
    }
    let whole = n.trunc() as i64;
    u8::try_from(whole.rem_euclid(256)).unwrap_or(0)
}

fn incompatible(name: &str, realm: &Realm, this: &Value) -> RealmError {
    RealmError::Type(format!(
        "Method {name} called on incompatible receiver {}",
        realm.type_name(this)
    ))
}

fn set_add(realm: &mut Realm, this: &Value, args: &[Value]) -> RealmResult<Value> {
    let target = realm.intrinsic_receiver(this, IntrinsicAccess::Write)?;
    let value = arg(args, 0);
    match &mut realm.object_mut(target)?.kind {
        ObjectKind::Set(values) => {
            if !values.iter().any(|v| v.same_value_zero(&value)) {
                values.push(value);
            }
        },
        _ => return Err(incompatible("Set.prototype.add", realm, this)),
    }
    Ok(this.clone())
}

fn map_set(realm: &mut Realm, this: &Value, args: &[Value]) -> RealmResult<Value> {
    let target = realm.intrinsic_receiver(this, IntrinsicAccess::Write)?;
    let key = arg(args, 0);
    let value = arg(args, 1);
    match &mut realm.object_mut(target)?.kind {
        ObjectKind::Map(entries) => {
            match entries.iter_mut().find(|(k, _)| k.same_value_zero(&key)) {
                Some(slot) => slot.1 = value,
                None => entries.push((key, value)),
            }
        },
        _ => return Err(incompatible("Map.prototype.set", realm, this)),
    }
    Ok(this.clone())
}

fn map_get(realm: &mut Realm, this: &Value, args: &[Value]) -> RealmResult<Value> {
    let target = realm.intrinsic_receiver(this, IntrinsicAccess::Read)?;
    let key = arg(args, 0);
    match &realm.object(target)?.kind {
        ObjectKind::Map(entries) => Ok(entries
            .iter()
            .find(|(k, _)| k.same_value_zero(&key))
            .map(|(_, v)| v.clone())
            .unwrap_or_default()),
        _ => Err(incompatible("Map.prototype.get", realm, this)),
    }
}

fn has(realm: &mut Realm, this: &Value, args: &[Value]) -> RealmResult<Value> {
    let target = realm.intrinsic_receiver(this, IntrinsicAccess::Read)?;
    let key = arg(args, 0);
    match &realm.object(target)?.kind {
        ObjectKind::Set(values) => Ok(Value::Bool(values.iter().any(|v| v.same_value_zero(&key)))),
        ObjectKind::Map(entries) => Ok(Value::Bool(
            entries.iter().any(|(k, _)| k.same_value_zero(&key)),
        )),
        _ => Err(incompatible("has", realm, this)),
    }
}

fn delete(realm: &mut Realm, this: &Value, args: &[Value]) -> RealmResult<Value> {
    let target = realm.intrinsic_receiver(this, IntrinsicAccess::Write)?;
    let key = arg(args, 0);
    let removed = match &mut realm.object_mut(target)?.kind {
        ObjectKind::Set(values) => {
            let before = values.len();
            values.retain(|v| !v.same_value_zero(&key));
            before != values.len()
        },
        ObjectKind::Map(entries) => {
            let before = entries.len();
            entries.retain(|(k, _)| !k.same_value_zero(&key));
            before != entries.len()
        },
        _ => return Err(incompatible("delete", realm, this)),
    };
    Ok(Value::Bool(removed))
}

fn clear(realm: &mut Realm, this: &Value, _args: &[Value]) -> RealmResult<Value> {
    let target = realm.intrinsic_receiver(this, IntrinsicAccess::Write)?;
    match &mut realm.object_mut(target)?.kind {
        ObjectKind::Set(values) => values.clear(),
        ObjectKind::Map(entries) => entries.clear(),
        _ => return Err(incompatible("clear", realm, this)),
    }
    Ok(Value::Undefined)
}

/// Snapshot of `(key, value)` pairs; sets report each value as both.
fn pairs(realm: &mut Realm, this: &Value, name: &str) -> RealmResult<Vec<(Value, Value)>> {
    let target = realm.intrinsic_receiver(this, IntrinsicAccess::Read)?;
    match &realm.object(target)?.kind {
        ObjectKind::Set(values) => Ok(values.iter().map(|v| (v.clone(), v.clone())).collect()),
        ObjectKind::Map(entries) => Ok(entries.clone()),
        _ => Err(incompatible(name, realm, this)),
    }
}

fn for_each(realm: &mut Realm, this: &Value, args: &[Value]) -> RealmResult<Value> {
    let f = arg(args, 0);
    let receiver = arg(args, 1);
    for (k, v) in pairs(realm, this, "forEach")? {
        realm.call(&f, receiver.clone(), &[v, k, this.clone()])?;
    }
    Ok(Value::Undefined)
}

fn keys(realm: &mut Realm, this: &Value, _args: &[Value]) -> RealmResult<Value> {
    let items = pairs(realm, this, "keys")?.into_iter().map(|(k, _)| k).collect();
    Ok(Value::Object(realm.new_array(items)))
}

fn values(realm: &mut Realm, this: &Value, _args: &[Value]) -> RealmResult<Value> {
    let items = pairs(realm, this, "values")?.into_iter().map(|(_, v)| v).collect();
    Ok(Value::Object(realm.new_array(items)))
}

fn entries(realm: &mut Realm, this: &Value, _args: &[Value]) -> RealmResult<Value> {
    let mut items = Vec::new();
    for (k, v) in pairs(realm, this, "entries")? {
        items.push(Value::Object(realm.new_array(vec![k, v])));
    }
    Ok(Value::Object(realm.new_array(items)))
}

fn bytes_of(realm: &mut Realm, this: &Value, access: IntrinsicAccess) -> RealmResult<ObjectId> {
    let target = realm.intrinsic_receiver(this, access)?;
    match realm.object(target)?.kind {
        ObjectKind::Bytes(_) => Ok(target),
        _ => Err(incompatible("Uint8Array method", realm, this)),
    }
}

fn bytes_slice(realm: &mut Realm, this: &Value, args: &[Value]) -> RealmResult<Value> {
    let target = bytes_of(realm, this, IntrinsicAccess::Read)?;
    let ObjectKind::Bytes(bytes) = realm.object(target)?.kind.clone() else {
        return Ok(Value::Undefined);
    };
    let len = bytes.len();
    let index = |realm: &Realm, v: &Value, default: usize| -> usize {
        if v.is_undefined() {
            return default;
        }
        let n = realm.to_number(v);
        let len_f = len as f64;
        let i = if n < 0.0 { (len_f + n.trunc()).max(0.0) } else { n.trunc().min(len_f) };
        let i = if i.is_nan() { 0 } else { i as usize };
        i
    };
    let start = index(realm, &arg(args, 0), 0);
    let end = index(realm, &arg(args, 1), len);
    let out = bytes.get(start..end.max(start)).unwrap_or_default().to_vec();
    Ok(Value::Object(realm.new_bytes(out)))
}

fn bytes_fill(realm: &mut Realm, this: &Value, args: &[Value]) -> RealmResult<Value> {
    let target = bytes_of(realm, this, IntrinsicAccess::Write)?;
    let b = byte(realm, &arg(args, 0));
    if let ObjectKind::Bytes(bytes) = &mut realm.object_mut(target)?.kind {
        bytes.fill(b);
    }
    Ok(this.clone())
}

#[cfg(test)]
mod tests {
    use crate::intrinsics::tests::eval_in_sandbox;
    use crate::value::Value;

    #[test]
    fn test_set_and_map() {
        assert_eq!(
            eval_in_sandbox("const s = new Set([1, 1, 2]); s.add(3); s.delete(1); return s.size"),
            Value::Number(2.0)
        );
        assert_eq!(
            eval_in_sandbox("const m = new Map([['a', 1]]); m.set('b', 2); return m.get('a') + m.get('b')"),
            Value::Number(3.0)
        );
        assert_eq!(
            eval_in_sandbox("let n = 0; for (const e of new Map([['a', 5]]).entries()) { n += e[1] } return n"),
            Value::Number(5.0)
        );
    }

    #[test]
    fn test_bytes() {
        assert_eq!(
            eval_in_sandbox("const b = new Uint8Array([1, 2, 300]); return b[2] + b.length"),
            Value::Number(47.0)
        );
    }
}
