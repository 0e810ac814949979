//! Host-only built-ins for the direct evaluator.

use rand::Rng;

use super::{method, object, object_arg};
use crate::error::RealmResult;
use crate::realm::Realm;
use crate::scope::ScopeRef;
use crate::value::{Value, array_index};

pub(super) fn install(realm: &mut Realm, scope: &ScopeRef) {
    let object_ctor = object::object_constructor(realm, host_keys);
    super::declare(scope, "Object", Value::Object(object_ctor));

    let math = object::math(realm);
    method(realm, math, "random", random);
    super::declare(scope, "Math", Value::Object(math));

    let date = realm.new_native("Date", date_string, Some(date_string));
    method(realm, date, "now", now);
    super::declare(scope, "Date", Value::Object(date));
}

/// Host `Object.keys`: integer-like keys ascending, then the rest in
/// insertion order.
fn host_keys(realm: &mut Realm, _this: &Value, args: &[Value]) -> RealmResult<Value> {
    let id = object_arg(realm, args, 0, "Object.keys")?;
    let keys = realm.own_keys(id)?;
    let (mut ints, rest): (Vec<String>, Vec<String>) =
        keys.into_iter().partition(|k| array_index(k).is_some());
    ints.sort_by_key(|k| array_index(k).unwrap_or(usize::MAX));
    let items = ints.into_iter().chain(rest).map(Value::String).collect();
    Ok(Value::Object(realm.new_array(items)))
}

fn random(_realm: &mut Realm, _this: &Value, _args: &[Value]) -> RealmResult<Value> {
    Ok(Value::Number(rand::thread_rng().r#gen::<f64>()))
}

fn now(_realm: &mut Realm, _this: &Value, _args: &[Value]) -> RealmResult<Value> {
    Ok(Value::Number(chrono::Utc::now().timestamp_millis() as f64))
}

fn date_string(_realm: &mut Realm, _this: &Value, _args: &[Value]) -> RealmResult<Value> {
    Ok(Value::String(chrono::Utc::now().to_rfc3339()))
}
