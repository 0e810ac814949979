//! `Array` and `Array.prototype`.
//!
//! Every method reads and writes `this` through generic property access so a
//! membrane around an array sees each element operation.

use super::{arg, length_of, link_prototype, method};
use crate::determinism;
use crate::error::{RealmError, RealmResult};
use crate::heap::ObjectKind;
use crate::realm::Realm;
use crate::value::{ObjectId, Value};

pub(super) fn constructor(realm: &mut Realm) -> ObjectId {
    let ctor = realm.new_native("Array", new_array, Some(new_array));
    let proto = realm.intrinsics.array_proto;
    link_prototype(realm, ctor, proto);
    method(realm, ctor, "isArray", is_array);
    method(realm, ctor, "from", from);
    ctor
}

pub(super) fn install_prototype(realm: &mut Realm) {
    let proto = realm.intrinsics.array_proto;
    method(realm, proto, "push", push);
    method(realm, proto, "pop", pop);
    method(realm, proto, "shift", shift);
    method(realm, proto, "unshift", unshift);
    method(realm, proto, "slice", slice);
    method(realm, proto, "splice", splice);
    method(realm, proto, "concat", concat);
    method(realm, proto, "indexOf", index_of);
    method(realm, proto, "includes", includes);
    method(realm, proto, "join", join);
    method(realm, proto, "reverse", reverse);
    method(realm, proto, "sort", sort);
    method(realm, proto, "forEach", for_each);
    method(realm, proto, "map", map);
    method(realm, proto, "filter", filter);
    method(realm, proto, "find", find);
    method(realm, proto, "findIndex", find_index);
    method(realm, proto, "some", some);
    method(realm, proto, "every", every);
    method(realm, proto, "reduce", reduce);
}

fn new_array(realm: &mut Realm, _this: &Value, args: &[Value]) -> RealmResult<Value> {
    if let [Value::Number(n)] = args {
        let len = crate::realm::to_length(&Value::Number(*n))?;
        return Ok(Value::Object(realm.new_array(vec![Value::Undefined; len])));
    }
    Ok(Value::Object(realm.new_array(args.to_vec())))
}

fn is_array(realm: &mut Realm, _this: &Value, args: &[Value]) -> RealmResult<Value> {
    Ok(Value::Bool(match arg(args, 0) {
        Value::Object(id) => matches!(realm.target_kind(id)?, ObjectKind::Array(_)),
        _ => false,
    }))
}

fn from(realm: &mut Realm, _this: &Value, args: &[Value]) -> RealmResult<Value> {
    let items = realm.iterate(&arg(args, 0))?;
    Ok(Value::Object(realm.new_array(items)))
}

fn elements(realm: &mut Realm, this: &Value) -> RealmResult<Vec<Value>> {
    let len = length_of(realm, this)?;
    let mut out = Vec::with_capacity(len);
    for i in 0..len {
        out.push(realm.get(this, &i.to_string())?);
    }
    Ok(out)
}

/// Replace the contents of `this` with `items`, element by element.
fn write_back(realm: &mut Realm, this: &Value, items: Vec<Value>) -> RealmResult<()> {
    let len = items.len() as f64;
    for (i, item) in items.into_iter().enumerate() {
        realm.set(this, &i.to_string(), item)?;
    }
    realm.set(this, "length", Value::Number(len))
}

/// Resolve a relative index argument against `len`.
fn relative(realm: &Realm, value: &Value, len: usize, default: usize) -> usize {
    if value.is_undefined() {
        return default;
    }
    let n = realm.to_number(value);
    if n.is_nan() {
        return 0;
    }
    let len_f = len as f64;
    let idx = if n < 0.0 { (len_f + n.trunc()).max(0.0) } else { n.trunc().min(len_f) };
    let idx = idx as usize;
    idx
}

fn push(realm: &mut Realm, this: &Value, args: &[Value]) -> RealmResult<Value> {
    let mut len = length_of(realm, this)?;
    for value in args {
        realm.set(this, &len.to_string(), value.clone())?;
        len = len.saturating_add(1);
    }
    Ok(Value::Number(len as f64))
}

fn pop(realm: &mut Realm, this: &Value, _args: &[Value]) -> RealmResult<Value> {
    let len = length_of(realm, this)?;
    let Some(last) = len.checked_sub(1) else {
        return Ok(Value::Undefined);
    };
    let value = realm.get(this, &last.to_string())?;
    realm.set(this, "length", Value::Number(last as f64))?;
    Ok(value)
}

fn shift(realm: &mut Realm, this: &Value, _args: &[Value]) -> RealmResult<Value> {
    let mut items = elements(realm, this)?;
    if items.is_empty() {
        return Ok(Value::Undefined);
    }
    let first = items.remove(0);
    write_back(realm, this, items)?;
    Ok(first)
}

fn unshift(realm: &mut Realm, this: &Value, args: &[Value]) -> RealmResult<Value> {
    let mut items = args.to_vec();
    items.extend(elements(realm, this)?);
    let len = items.len() as f64;
    write_back(realm, this, items)?;
    Ok(Value::Number(len))
}

fn slice(realm: &mut Realm, this: &Value, args: &[Value]) -> RealmResult<Value> {
    let items = elements(realm, this)?;
    let start = relative(realm, &arg(args, 0), items.len(), 0);
    let end = relative(realm, &arg(args, 1), items.len(), items.len());
    let out = items.get(start..end.max(start)).unwrap_or_default().to_vec();
    Ok(Value::Object(realm.new_array(out)))
}

fn splice(realm: &mut Realm, this: &Value, args: &[Value]) -> RealmResult<Value> {
    let mut items = elements(realm, this)?;
    let start = relative(realm, &arg(args, 0), items.len(), 0);
    let remaining = items.len().saturating_sub(start);
    let count = match args.get(1) {
        None => remaining,
        Some(v) => relative(realm, v, remaining, remaining),
    };
    let inserted = args.get(2..).unwrap_or_default().to_vec();
    let removed: Vec<Value> = items.splice(start..start + count, inserted).collect();
    write_back(realm, this, items)?;
    Ok(Value::Object(realm.new_array(removed)))
}

fn concat(realm: &mut Realm, this: &Value, args: &[Value]) -> RealmResult<Value> {
    let mut items = elements(realm, this)?;
    for value in args {
        let spread = matches!(value, Value::Object(id) if matches!(realm.target_kind(*id)?, ObjectKind::Array(_)));
        if spread {
            items.extend(elements(realm, value)?);
        } else {
            items.push(value.clone());
        }
    }
    Ok(Value::Object(realm.new_array(items)))
}

fn index_of(realm: &mut Realm, this: &Value, args: &[Value]) -> RealmResult<Value> {
    let needle = arg(args, 0);
    let items = elements(realm, this)?;
    Ok(Value::Number(
        items
            .iter()
            .position(|v| v.strict_equals(&needle))
            .map_or(-1.0, |i| i as f64),
    ))
}

fn includes(realm: &mut Realm, this: &Value, args: &[Value]) -> RealmResult<Value> {
    let needle = arg(args, 0);
    let items = elements(realm, this)?;
    Ok(Value::Bool(items.iter().any(|v| v.same_value_zero(&needle))))
}

fn join(realm: &mut Realm, this: &Value, args: &[Value]) -> RealmResult<Value> {
    let sep = match arg(args, 0) {
        Value::Undefined => ",".to_owned(),
        other => realm.to_string(&other)?,
    };
    let items = elements(realm, this)?;
    let mut parts = Vec::with_capacity(items.len());
    for item in &items {
        parts.push(if item.is_nullish() {
            String::new()
        } else {
            realm.to_string(item)?
        });
    }
    Ok(Value::String(parts.join(&sep)))
}

fn reverse(realm: &mut Realm, this: &Value, _args: &[Value]) -> RealmResult<Value> {
    let mut items = elements(realm, this)?;
    items.reverse();
    write_back(realm, this, items)?;
    Ok(this.clone())
}

fn sort(realm: &mut Realm, this: &Value, args: &[Value]) -> RealmResult<Value> {
    let items = elements(realm, this)?;
    let comparator = match arg(args, 0) {
        Value::Undefined => None,
        f => Some(f),
    };
    let sorted = determinism::stable_sort(realm, items, comparator.as_ref())?;
    write_back(realm, this, sorted)?;
    Ok(this.clone())
}

fn callback(realm: &Realm, args: &[Value], name: &str) -> RealmResult<Value> {
    let f = arg(args, 0);
    if realm.type_of(&f) != "function" {
        return Err(RealmError::Type(format!(
            "{} is not a function (in Array.prototype.{name})",
            realm.type_name(&f)
        )));
    }
    Ok(f)
}

/// Call `f(item, index, array)` for each element until `each` returns false.
fn visit(
    realm: &mut Realm,
    this: &Value,
    args: &[Value],
    name: &str,
    mut each: impl FnMut(&mut Realm, usize, Value, Value) -> RealmResult<bool>,
) -> RealmResult<()> {
    let f = callback(realm, args, name)?;
    let receiver = arg(args, 1);
    let items = elements(realm, this)?;
    for (i, item) in items.into_iter().enumerate() {
        let index = Value::Number(i as f64);
        let result = realm.call(&f, receiver.clone(), &[item.clone(), index, this.clone()])?;
        if !each(realm, i, item, result)? {
            break;
        }
    }
    Ok(())
}

fn for_each(realm: &mut Realm, this: &Value, args: &[Value]) -> RealmResult<Value> {
    visit(realm, this, args, "forEach", |_, _, _, _| Ok(true))?;
    Ok(Value::Undefined)
}

fn map(realm: &mut Realm, this: &Value, args: &[Value]) -> RealmResult<Value> {
    let mut out = Vec::new();
    visit(realm, this, args, "map", |_, _, _, r| {
        out.push(r);
        Ok(true)
    })?;
    Ok(Value::Object(realm.new_array(out)))
}

fn filter(realm: &mut Realm, this: &Value, args: &[Value]) -> RealmResult<Value> {
    let mut out = Vec::new();
    visit(realm, this, args, "filter", |_, _, item, r| {
        if r.truthy() {
            out.push(item);
        }
        Ok(true)
    })?;
    Ok(Value::Object(realm.new_array(out)))
}

fn find(realm: &mut Realm, this: &Value, args: &[Value]) -> RealmResult<Value> {
    let mut found = Value::Undefined;
    visit(realm, this, args, "find", |_, _, item, r| {
        if r.truthy() {
            found = item;
            return Ok(false);
        }
        Ok(true)
    })?;
    Ok(found)
}

fn find_index(realm: &mut Realm, this: &Value, args: &[Value]) -> RealmResult<Value> {
    let mut found = -1.0;
    visit(realm, this, args, "findIndex", |_, i, _, r| {
        if r.truthy() {
            {
                found = i as f64;
            }
            return Ok(false);
        }
        Ok(true)
    })?;
    Ok(Value::Number(found))
}

fn some(realm: &mut Realm, this: &Value, args: &[Value]) -> RealmResult<Value> {
    let mut any = false;
    visit(realm, this, args, "some", |_, _, _, r| {
        any = r.truthy();
        Ok(!any)
    })?;
    Ok(Value::Bool(any))
}

fn every(realm: &mut Realm, this: &Value, args: &[Value]) -> RealmResult<Value> {
    let mut all = true;
    visit(realm, this, args, "every", |_, _, _, r| {
        all = r.truthy();
        Ok(all)
    })?;
    Ok(Value::Bool(all))
}

fn reduce(realm: &mut Realm, this: &Value, args: &[Value]) -> RealmResult<Value> {
    let f = callback(realm, args, "reduce")?;
    let mut items = elements(realm, this)?.into_iter().enumerate();
    let mut acc = match args.get(1) {
        Some(initial) => initial.clone(),
        None => match items.next() {
            Some((_, first)) => first,
            None => {
                return Err(RealmError::Type(
                    "Reduce of empty array with no initial value".to_owned(),
                ));
            },
        },
    };
    for (i, item) in items {
        let index = Value::Number(i as f64);
        acc = realm.call(&f, Value::Undefined, &[acc, item, index, this.clone()])?;
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use crate::intrinsics::tests::eval_in_sandbox;
    use crate::value::Value;

    #[test]
    fn test_mutators() {
        assert_eq!(
            eval_in_sandbox("const a = [1, 2]; a.push(3); a.unshift(0); a.pop(); return a.join('-')"),
            Value::string("0-1-2")
        );
        assert_eq!(
            eval_in_sandbox("const a = [1, 2, 3, 4]; a.splice(1, 2, 'x'); return a.join()"),
            Value::string("1,x,4")
        );
    }

    #[test]
    fn test_higher_order() {
        assert_eq!(
            eval_in_sandbox("return [1, 2, 3].map(function (x) { return x * 2 }).filter(function (x) { return x > 2 }).length"),
            Value::Number(2.0)
        );
        assert_eq!(
            eval_in_sandbox("return [1, 2, 3].reduce(function (a, b) { return a + b }, 0)"),
            Value::Number(6.0)
        );
    }

    #[test]
    fn test_sort_is_stable_with_equal_comparator() {
        let src = "const a = [{ k: 'a' }, { k: 'b' }, { k: 'c' }];
                   a.sort(function () { return 0 });
                   return a.map(function (o) { return o.k }).join('')";
        assert_eq!(eval_in_sandbox(src), Value::string("abc"));
        assert_eq!(eval_in_sandbox("return [3, 1, 2].sort().join()"), Value::string("1,2,3"));
    }
}
