//! `Object`, `Function.prototype`, `Error`, `JSON`, `Math`, `Number`.

use super::{arg, constant, link_prototype, method, object_arg};
use crate::determinism;
use crate::error::{RealmError, RealmResult};
use crate::heap::NativeFn;
use crate::realm::Realm;
use crate::value::{ObjectId, Value};

pub(super) fn install_prototypes(realm: &mut Realm) {
    let object_proto = realm.intrinsics.object_proto;
    method(realm, object_proto, "hasOwnProperty", has_own_property);
    method(realm, object_proto, "toString", object_to_string);

    let function_proto = realm.intrinsics.function_proto;
    method(realm, function_proto, "toString", function_to_string);
    method(realm, function_proto, "call", function_call);
    method(realm, function_proto, "apply", function_apply);

    let error_proto = realm.intrinsics.error_proto;
    constant(realm, error_proto, "name", Value::string("Error"));
    method(realm, error_proto, "toString", object_to_string);
}

/// The `Object` constructor with `keys` supplied by the caller, so host and
/// sandbox tables can differ in key order only.
pub(super) fn object_constructor(realm: &mut Realm, keys_fn: NativeFn) -> ObjectId {
    let ctor = realm.new_native("Object", new_object, Some(new_object));
    let proto = realm.intrinsics.object_proto;
    link_prototype(realm, ctor, proto);
    method(realm, ctor, "keys", keys_fn);
    method(realm, ctor, "values", values);
    method(realm, ctor, "entries", entries);
    method(realm, ctor, "assign", assign);
    method(realm, ctor, "freeze", freeze);
    method(realm, ctor, "isFrozen", is_frozen);
    method(realm, ctor, "getPrototypeOf", get_prototype_of);
    method(realm, ctor, "setPrototypeOf", set_prototype_of);
    method(realm, ctor, "create", create);
    ctor
}

fn new_object(realm: &mut Realm, _this: &Value, args: &[Value]) -> RealmResult<Value> {
    match arg(args, 0) {
        v @ Value::Object(_) => Ok(v),
        _ => Ok(Value::Object(realm.new_object())),
    }
}

/// Deterministic `Object.keys`: enumerable own keys in insertion order.
pub(super) fn keys(realm: &mut Realm, _this: &Value, args: &[Value]) -> RealmResult<Value> {
    let id = object_arg(realm, args, 0, "Object.keys")?;
    let keys = determinism::own_keys(realm, id)?;
    let items = keys.into_iter().map(Value::String).collect();
    Ok(Value::Object(realm.new_array(items)))
}

fn values(realm: &mut Realm, _this: &Value, args: &[Value]) -> RealmResult<Value> {
    let id = object_arg(realm, args, 0, "Object.values")?;
    let keys = determinism::own_keys(realm, id)?;
    let mut items = Vec::with_capacity(keys.len());
    for key in &keys {
        items.push(realm.get_object(id, key)?);
    }
    Ok(Value::Object(realm.new_array(items)))
}

fn entries(realm: &mut Realm, _this: &Value, args: &[Value]) -> RealmResult<Value> {
    let id = object_arg(realm, args, 0, "Object.entries")?;
    let keys = determinism::own_keys(realm, id)?;
    let mut items = Vec::with_capacity(keys.len());
    for key in keys {
        let value = realm.get_object(id, &key)?;
        let pair = realm.new_array(vec![Value::String(key), value]);
        items.push(Value::Object(pair));
    }
    Ok(Value::Object(realm.new_array(items)))
}

fn assign(realm: &mut Realm, _this: &Value, args: &[Value]) -> RealmResult<Value> {
    let target = arg(args, 0);
    object_arg(realm, args, 0, "Object.assign")?;
    for source in args.iter().skip(1) {
        let Value::Object(src) = source else { continue };
        for key in determinism::own_keys(realm, *src)? {
            let value = realm.get_object(*src, &key)?;
            realm.set(&target, &key, value)?;
        }
    }
    Ok(target)
}

fn freeze(realm: &mut Realm, _this: &Value, args: &[Value]) -> RealmResult<Value> {
    let value = arg(args, 0);
    if let Value::Object(id) = value {
        realm.prevent_extensions(id)?;
    }
    Ok(value)
}

fn is_frozen(realm: &mut Realm, _this: &Value, args: &[Value]) -> RealmResult<Value> {
    match arg(args, 0) {
        Value::Object(id) => Ok(Value::Bool(!realm.is_extensible(id)?)),
        _ => Ok(Value::Bool(true)),
    }
}

fn get_prototype_of(realm: &mut Realm, _this: &Value, args: &[Value]) -> RealmResult<Value> {
    let id = object_arg(realm, args, 0, "Object.getPrototypeOf")?;
    Ok(realm
        .get_prototype_of(id)?
        .map_or(Value::Null, Value::Object))
}

fn set_prototype_of(realm: &mut Realm, _this: &Value, args: &[Value]) -> RealmResult<Value> {
    let id = object_arg(realm, args, 0, "Object.setPrototypeOf")?;
    let proto = match arg(args, 1) {
        Value::Object(p) => Some(p),
        Value::Null => None,
        other => {
            return Err(RealmError::Type(format!(
                "Object prototype may only be an Object or null: {}",
                realm.type_name(&other)
            )));
        },
    };
    realm.set_prototype_of(id, proto)?;
    Ok(Value::Object(id))
}

fn create(realm: &mut Realm, _this: &Value, args: &[Value]) -> RealmResult<Value> {
    let proto = match arg(args, 0) {
        Value::Object(p) => Some(p),
        Value::Null => None,
        other => {
            return Err(RealmError::Type(format!(
                "Object prototype may only be an Object or null: {}",
                realm.type_name(&other)
            )));
        },
    };
    Ok(Value::Object(
        realm.alloc(crate::heap::ObjectKind::Plain, proto),
    ))
}

fn has_own_property(realm: &mut Realm, this: &Value, args: &[Value]) -> RealmResult<Value> {
    let Value::Object(id) = this else {
        return Ok(Value::Bool(false));
    };
    let key = realm.to_property_key(&arg(args, 0))?;
    Ok(Value::Bool(determinism::own_keys(realm, *id)?.contains(&key)))
}

fn object_to_string(realm: &mut Realm, this: &Value, _args: &[Value]) -> RealmResult<Value> {
    realm.to_string(this).map(Value::String)
}

fn function_to_string(realm: &mut Realm, this: &Value, _args: &[Value]) -> RealmResult<Value> {
    let Value::Object(id) = this else {
        return Err(RealmError::Type(
            "Function.prototype.toString requires that 'this' be a Function".to_owned(),
        ));
    };
    determinism::function_to_string(realm, *id).map(Value::String)
}

fn function_call(realm: &mut Realm, this: &Value, args: &[Value]) -> RealmResult<Value> {
    let receiver = arg(args, 0);
    let rest = args.get(1..).unwrap_or_default();
    realm.call(this, receiver, rest)
}

fn function_apply(realm: &mut Realm, this: &Value, args: &[Value]) -> RealmResult<Value> {
    let receiver = arg(args, 0);
    let list = match arg(args, 1) {
        Value::Undefined | Value::Null => Vec::new(),
        list => realm.iterate(&list)?,
    };
    realm.call(this, receiver, &list)
}

pub(super) fn error_constructor(realm: &mut Realm) -> ObjectId {
    let ctor = realm.new_native("Error", new_error, Some(new_error));
    let proto = realm.intrinsics.error_proto;
    link_prototype(realm, ctor, proto);
    ctor
}

fn new_error(realm: &mut Realm, _this: &Value, args: &[Value]) -> RealmResult<Value> {
    let message = match arg(args, 0) {
        Value::Undefined => String::new(),
        other => realm.to_string(&other)?,
    };
    Ok(Value::Object(realm.new_error(&message)))
}

pub(super) fn json(realm: &mut Realm) -> ObjectId {
    let json = realm.new_object();
    method(realm, json, "stringify", json_stringify);
    method(realm, json, "parse", json_parse);
    json
}

fn json_stringify(realm: &mut Realm, _this: &Value, args: &[Value]) -> RealmResult<Value> {
    let value = arg(args, 0);
    if value.is_undefined() {
        return Ok(Value::Undefined);
    }
    determinism::canonical_json(realm, &value).map(Value::String)
}

fn json_parse(realm: &mut Realm, _this: &Value, args: &[Value]) -> RealmResult<Value> {
    let text = realm.to_string(&arg(args, 0))?;
    determinism::parse_json(realm, &text)
}

/// `Math` without `random`.
pub(super) fn math(realm: &mut Realm) -> ObjectId {
    let math = realm.new_object();
    install_math(realm, math);
    math
}

pub(super) fn install_math(realm: &mut Realm, math: ObjectId) {
    constant(realm, math, "PI", Value::Number(std::f64::consts::PI));
    constant(realm, math, "E", Value::Number(std::f64::consts::E));
    method(realm, math, "floor", |r, _, a| unary_math(r, a, f64::floor));
    method(realm, math, "ceil", |r, _, a| unary_math(r, a, f64::ceil));
    method(realm, math, "round", |r, _, a| {
        unary_math(r, a, |n| (n + 0.5).floor())
    });
    method(realm, math, "trunc", |r, _, a| unary_math(r, a, f64::trunc));
    method(realm, math, "abs", |r, _, a| unary_math(r, a, f64::abs));
    method(realm, math, "sqrt", |r, _, a| unary_math(r, a, f64::sqrt));
    method(realm, math, "sign", |r, _, a| {
        unary_math(r, a, |n| if n == 0.0 || n.is_nan() { n } else { n.signum() })
    });
    method(realm, math, "pow", |r, _, a| {
        let base = r.to_number(&arg(a, 0));
        let exp = r.to_number(&arg(a, 1));
        Ok(Value::Number(base.powf(exp)))
    });
    method(realm, math, "min", |r, _, a| {
        fold_math(r, a, f64::INFINITY, f64::min)
    });
    method(realm, math, "max", |r, _, a| {
        fold_math(r, a, f64::NEG_INFINITY, f64::max)
    });
}

fn unary_math(realm: &Realm, args: &[Value], f: impl Fn(f64) -> f64) -> RealmResult<Value> {
    Ok(Value::Number(f(realm.to_number(&arg(args, 0)))))
}

fn fold_math(realm: &Realm, args: &[Value], init: f64, f: fn(f64, f64) -> f64) -> RealmResult<Value> {
    let mut acc = init;
    for a in args {
        let n = realm.to_number(a);
        if n.is_nan() {
            return Ok(Value::Number(f64::NAN));
        }
        acc = f(acc, n);
    }
    Ok(Value::Number(acc))
}

pub(super) fn number_constructor(realm: &mut Realm) -> ObjectId {
    let ctor = realm.new_native("Number", to_number, None);
    method(realm, ctor, "isInteger", |_, _, a| {
        Ok(Value::Bool(
            matches!(arg(a, 0), Value::Number(n) if n.is_finite() && n.fract() == 0.0),
        ))
    });
    method(realm, ctor, "isFinite", |_, _, a| {
        Ok(Value::Bool(matches!(arg(a, 0), Value::Number(n) if n.is_finite())))
    });
    method(realm, ctor, "isNaN", |_, _, a| {
        Ok(Value::Bool(matches!(arg(a, 0), Value::Number(n) if n.is_nan())))
    });
    constant(realm, ctor, "MAX_SAFE_INTEGER", Value::Number(9_007_199_254_740_991.0));
    constant(realm, ctor, "MIN_SAFE_INTEGER", Value::Number(-9_007_199_254_740_991.0));
    constant(realm, ctor, "EPSILON", Value::Number(f64::EPSILON));
    ctor
}

fn to_number(realm: &mut Realm, _this: &Value, args: &[Value]) -> RealmResult<Value> {
    if args.is_empty() {
        return Ok(Value::Number(0.0));
    }
    Ok(Value::Number(realm.to_number(&arg(args, 0))))
}

pub(super) fn boolean(_realm: &mut Realm, _this: &Value, args: &[Value]) -> RealmResult<Value> {
    Ok(Value::Bool(arg(args, 0).truthy()))
}

pub(super) fn is_nan(realm: &mut Realm, _this: &Value, args: &[Value]) -> RealmResult<Value> {
    Ok(Value::Bool(realm.to_number(&arg(args, 0)).is_nan()))
}

pub(super) fn parse_float(realm: &mut Realm, _this: &Value, args: &[Value]) -> RealmResult<Value> {
    let text = realm.to_string(&arg(args, 0))?;
    let text = text.trim_start();
    let end = text
        .char_indices()
        .take_while(|(i, c)| {
            c.is_ascii_digit() || *c == '.' || ((*c == '-' || *c == '+') && *i == 0) || *c == 'e'
        })
        .map(|(i, c)| i + c.len_utf8())
        .last()
        .unwrap_or(0);
    let mut slice = &text[..end];
    while !slice.is_empty() {
        if let Ok(n) = slice.parse::<f64>() {
            return Ok(Value::Number(n));
        }
        slice = &slice[..slice.len() - 1];
    }
    Ok(Value::Number(f64::NAN))
}

pub(super) fn parse_int(realm: &mut Realm, _this: &Value, args: &[Value]) -> RealmResult<Value> {
    let text = realm.to_string(&arg(args, 0))?;
    let radix = match arg(args, 1) {
        Value::Undefined => 10,
        other => {
            let r = realm.to_number(&other);
            if !(2.0..=36.0).contains(&r) {
                return Ok(Value::Number(f64::NAN));
            }
            let r = r as u32;
            r
        },
    };
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let mut acc: Option<f64> = None;
    for c in digits.chars() {
        let Some(d) = c.to_digit(radix) else { break };
        acc = Some(acc.unwrap_or(0.0) * f64::from(radix) + f64::from(d));
    }
    Ok(Value::Number(match acc {
        Some(n) if negative => -n,
        Some(n) => n,
        None => f64::NAN,
    }))
}
