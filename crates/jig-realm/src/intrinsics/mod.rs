//! Built-in objects.
//!
//! Two global tables are populated here. The sandbox table carries only
//! deterministic built-ins and shadows every banned name with `undefined`.
//! The host table adds clock, randomness, and host key ordering for the
//! direct evaluator.

mod array;
mod collections;
mod host;
mod object;
mod string;

use crate::determinism::BANNED;
use crate::error::RealmResult;
use crate::heap::{NativeFn, ObjectKind, Property};
use crate::realm::Realm;
use crate::scope::ScopeRef;
use crate::value::{ObjectId, Value};

/// Prototype objects shared by every value of a kind.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Intrinsics {
    pub(crate) object_proto: ObjectId,
    pub(crate) function_proto: ObjectId,
    pub(crate) array_proto: ObjectId,
    pub(crate) string_proto: ObjectId,
    pub(crate) bytes_proto: ObjectId,
    pub(crate) set_proto: ObjectId,
    pub(crate) map_proto: ObjectId,
    pub(crate) error_proto: ObjectId,
}

pub(crate) fn install(realm: &mut Realm) {
    let object_proto = realm.alloc(ObjectKind::Plain, None);
    let proto = Some(object_proto);
    realm.intrinsics = Intrinsics {
        object_proto,
        function_proto: realm.alloc(ObjectKind::Plain, proto),
        array_proto: realm.alloc(ObjectKind::Plain, proto),
        string_proto: realm.alloc(ObjectKind::Plain, proto),
        bytes_proto: realm.alloc(ObjectKind::Plain, proto),
        set_proto: realm.alloc(ObjectKind::Plain, proto),
        map_proto: realm.alloc(ObjectKind::Plain, proto),
        error_proto: realm.alloc(ObjectKind::Plain, proto),
    };

    object::install_prototypes(realm);
    array::install_prototype(realm);
    string::install_prototype(realm);
    collections::install_prototypes(realm);

    let sandbox = realm.sandbox_globals();
    install_common(realm, &sandbox);
    let object_ctor = object::object_constructor(realm, object::keys);
    declare(&sandbox, "Object", Value::Object(object_ctor));
    let math = object::math(realm);
    declare(&sandbox, "Math", Value::Object(math));
    for name in BANNED {
        if sandbox.borrow().get_own(name).is_none() {
            declare(&sandbox, name, Value::Undefined);
        }
    }

    let host = realm.host_globals();
    install_common(realm, &host);
    host::install(realm, &host);
}

fn install_common(realm: &mut Realm, scope: &ScopeRef) {
    let globals = [
        ("Array", array::constructor(realm)),
        ("Set", collections::set_constructor(realm)),
        ("Map", collections::map_constructor(realm)),
        ("Uint8Array", collections::bytes_constructor(realm)),
        ("Error", object::error_constructor(realm)),
        ("JSON", object::json(realm)),
        ("Number", object::number_constructor(realm)),
        ("String", string::constructor(realm)),
        ("Boolean", realm.new_native("Boolean", object::boolean, None)),
        ("parseInt", realm.new_native("parseInt", object::parse_int, None)),
        ("parseFloat", realm.new_native("parseFloat", object::parse_float, None)),
        ("isNaN", realm.new_native("isNaN", object::is_nan, None)),
    ];
    for (name, id) in globals {
        declare(scope, name, Value::Object(id));
    }
    declare(scope, "NaN", Value::Number(f64::NAN));
    declare(scope, "Infinity", Value::Number(f64::INFINITY));
}

fn declare(scope: &ScopeRef, name: &str, value: Value) {
    scope.borrow_mut().declare(name, value, false);
}

/// Install a built-in method as a hidden property of `holder`.
pub(crate) fn method(realm: &mut Realm, holder: ObjectId, name: &'static str, call: NativeFn) {
    let f = realm.new_native(name, call, None);
    if let Ok(obj) = realm.object_mut(holder) {
        obj.props.insert(name, Property::hidden(Value::Object(f)));
    }
}

/// Install a constant as a hidden property of `holder`.
pub(crate) fn constant(realm: &mut Realm, holder: ObjectId, name: &'static str, value: Value) {
    if let Ok(obj) = realm.object_mut(holder) {
        obj.props.insert(name, Property::hidden(value));
    }
}

/// Link a built-in constructor to its prototype object.
pub(crate) fn link_prototype(realm: &mut Realm, ctor: ObjectId, proto: ObjectId) {
    constant(realm, ctor, "prototype", Value::Object(proto));
    constant(realm, proto, "constructor", Value::Object(ctor));
}

/// The `i`th argument, or `undefined`.
pub(crate) fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or_default()
}

/// The `i`th argument as an object id.
pub(crate) fn object_arg(realm: &Realm, args: &[Value], i: usize, what: &str) -> RealmResult<ObjectId> {
    match args.get(i) {
        Some(Value::Object(id)) => Ok(*id),
        other => Err(crate::error::RealmError::Type(format!(
            "{what} called on non-object {}",
            realm.type_name(other.unwrap_or(&Value::Undefined))
        ))),
    }
}

/// Length of an array-like through generic property access.
pub(crate) fn length_of(realm: &mut Realm, value: &Value) -> RealmResult<usize> {
    let len = realm.get(value, "length")?;
    crate::realm::to_length(&len)
}

#[cfg(test)]
mod tests {
    use crate::evaluator::{Evaluator, SandboxEvaluator};
    use crate::realm::Realm;
    use crate::value::Value;

    pub(crate) fn eval_in_sandbox(src: &str) -> Value {
        let mut realm = Realm::default();
        let wrapped = format!("function wrapped() {{ {src} }}");
        let evaluation = SandboxEvaluator.evaluate(&mut realm, &wrapped, None).unwrap();
        realm.call(&evaluation.result, Value::Undefined, &[]).unwrap()
    }

    #[test]
    fn test_banned_names_are_undefined() {
        assert_eq!(eval_in_sandbox("return typeof Date"), Value::string("undefined"));
        assert_eq!(eval_in_sandbox("return Math.random"), Value::Undefined);
        assert_eq!(eval_in_sandbox("return typeof eval"), Value::string("undefined"));
        assert_eq!(eval_in_sandbox("return Math.floor(2.7)"), Value::Number(2.0));
    }

    #[test]
    fn test_json_is_canonical() {
        assert_eq!(
            eval_in_sandbox("return JSON.stringify({ b: 1, a: [true, null] })"),
            Value::string(r#"{"a":[true,null],"b":1}"#)
        );
        assert_eq!(
            eval_in_sandbox("return JSON.parse('{\"x\": [1, 2]}').x[1]"),
            Value::Number(2.0)
        );
    }
}
