//! Deterministic replacements for operations whose result would otherwise
//! depend on the host.

use serde_json::{Map, Number};

use crate::error::{RealmError, RealmResult};
use crate::heap::ObjectKind;
use crate::realm::Realm;
use crate::value::{ObjectId, Value};

/// Globals that resolve to `undefined` inside the sandbox.
pub const BANNED: &[&str] = &[
    "Date",
    "eval",
    "setTimeout",
    "setInterval",
    "fetch",
    "WebSocket",
    "require",
    "process",
    "document",
    "window",
    "XMLHttpRequest",
    "Function",
];

/// Enumerable own string keys in insertion order.
///
/// # Errors
///
/// Propagates proxy errors.
pub fn own_keys(realm: &mut Realm, id: ObjectId) -> RealmResult<Vec<String>> {
    realm.own_keys(id)
}

/// Merge sort with ties broken by original position.
///
/// With no comparator, elements are compared by their string form.
///
/// # Errors
///
/// Propagates errors thrown by the comparator.
pub fn stable_sort(
    realm: &mut Realm,
    items: Vec<Value>,
    comparator: Option<&Value>,
) -> RealmResult<Vec<Value>> {
    let mut indexed: Vec<(usize, Value)> = items.into_iter().enumerate().collect();
    merge_sort(realm, &mut indexed, comparator)?;
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

fn merge_sort(
    realm: &mut Realm,
    items: &mut Vec<(usize, Value)>,
    comparator: Option<&Value>,
) -> RealmResult<()> {
    if items.len() <= 1 {
        return Ok(());
    }
    let mut right = items.split_off(items.len() / 2);
    merge_sort(realm, items, comparator)?;
    merge_sort(realm, &mut right, comparator)?;

    let left = std::mem::take(items);
    let mut merged = Vec::with_capacity(left.len().saturating_add(right.len()));
    let mut l = left.into_iter().peekable();
    let mut r = right.into_iter().peekable();
    while let (Some(a), Some(b)) = (l.peek(), r.peek()) {
        let order = compare(realm, &a.1, &b.1, comparator)?;
        let take_right = order > 0.0 || (order == 0.0 && b.0 < a.0);
        let next = if take_right { r.next() } else { l.next() };
        merged.extend(next);
    }
    merged.extend(l);
    merged.extend(r);
    *items = merged;
    Ok(())
}

fn compare(realm: &mut Realm, a: &Value, b: &Value, comparator: Option<&Value>) -> RealmResult<f64> {
    if let Some(f) = comparator {
        let result = realm.call(f, Value::Undefined, &[a.clone(), b.clone()])?;
        let n = realm.to_number(&result);
        return Ok(if n.is_nan() { 0.0 } else { n });
    }
    // Undefined sorts last.
    match (a.is_undefined(), b.is_undefined()) {
        (true, true) => return Ok(0.0),
        (true, false) => return Ok(1.0),
        (false, true) => return Ok(-1.0),
        (false, false) => {},
    }
    let a = realm.to_string(a)?;
    let b = realm.to_string(b)?;
    Ok(match a.cmp(&b) {
        std::cmp::Ordering::Less => -1.0,
        std::cmp::Ordering::Equal => 0.0,
        std::cmp::Ordering::Greater => 1.0,
    })
}

/// `JSON.stringify` with object keys sorted.
///
/// # Errors
///
/// Fails on cyclic structures.
pub fn canonical_json(realm: &mut Realm, value: &Value) -> RealmResult<String> {
    let json = to_json(realm, value)?.unwrap_or(serde_json::Value::Null);
    serde_json::to_string(&json).map_err(|e| RealmError::Internal(e.to_string()))
}

/// Convert a realm value to JSON the way `JSON.stringify` would. Returns
/// `None` for values `JSON.stringify` omits (undefined, functions).
///
/// # Errors
///
/// Fails on cyclic structures.
pub fn to_json(realm: &mut Realm, value: &Value) -> RealmResult<Option<serde_json::Value>> {
    let mut stack = Vec::new();
    to_json_inner(realm, value, &mut stack)
}

fn to_json_inner(
    realm: &mut Realm,
    value: &Value,
    stack: &mut Vec<ObjectId>,
) -> RealmResult<Option<serde_json::Value>> {
    Ok(Some(match value {
        Value::Undefined => return Ok(None),
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => json_number(*n),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Object(id) => {
            let raw = realm.resolve_target(*id);
            if stack.contains(&raw) {
                return Err(RealmError::Type(
                    "Converting circular structure to JSON".to_owned(),
                ));
            }
            let kind = realm.target_kind(*id)?;
            if kind.is_callable() {
                return Ok(None);
            }
            let is_array = matches!(kind, ObjectKind::Array(_));
            stack.push(raw);
            let out = if is_array {
                let items = realm.iterate(value)?;
                let mut out = Vec::with_capacity(items.len());
                for item in &items {
                    out.push(to_json_inner(realm, item, stack)?.unwrap_or(serde_json::Value::Null));
                }
                serde_json::Value::Array(out)
            } else {
                let mut map = Map::new();
                for key in own_keys(realm, *id)? {
                    let v = realm.get_object(*id, &key)?;
                    if let Some(j) = to_json_inner(realm, &v, stack)? {
                        map.insert(key, j);
                    }
                }
                serde_json::Value::Object(map)
            };
            stack.pop();
            out
        },
    }))
}

/// Integral values within the safe range are written without a fraction.
/// Non-finite values become `null`.
pub(crate) fn json_number(n: f64) -> serde_json::Value {
    if !n.is_finite() {
        return serde_json::Value::Null;
    }
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return serde_json::Value::Number(Number::from(n as i64));
    }
    Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
}

/// Largest integer a double represents exactly.
pub const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// JSON text as parsed by `JSON.parse`: object keys keep their source order.
/// A repeated key keeps its first position and its last value.
///
/// # Errors
///
/// [`RealmError::Syntax`] for malformed text.
pub fn parse_json(realm: &mut Realm, text: &str) -> RealmResult<Value> {
    let parsed: OrderedJson =
        serde_json::from_str(text).map_err(|e| RealmError::Syntax(format!("JSON.parse: {e}")))?;
    Ok(parsed.into_value(realm))
}

/// JSON document with object entries in source order.
enum OrderedJson {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<OrderedJson>),
    Object(Vec<(String, OrderedJson)>),
}

impl OrderedJson {
    fn into_value(self, realm: &mut Realm) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(b),
            Self::Number(n) => Value::Number(n),
            Self::String(s) => Value::String(s),
            Self::Array(items) => {
                let values = items.into_iter().map(|j| j.into_value(realm)).collect();
                Value::Object(realm.new_array(values))
            },
            Self::Object(entries) => {
                let id = realm.new_object();
                for (k, v) in entries {
                    let value = v.into_value(realm);
                    if let Ok(obj) = realm.object_mut(id) {
                        obj.props.insert(k, crate::heap::Property::data(value));
                    }
                }
                Value::Object(id)
            },
        }
    }
}

impl<'de> serde::Deserialize<'de> for OrderedJson {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(OrderedVisitor)
    }
}

struct OrderedVisitor;

impl<'de> serde::de::Visitor<'de> for OrderedVisitor {
    type Value = OrderedJson;

    fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("a JSON value")
    }

    fn visit_unit<E>(self) -> Result<OrderedJson, E> {
        Ok(OrderedJson::Null)
    }

    fn visit_bool<E>(self, b: bool) -> Result<OrderedJson, E> {
        Ok(OrderedJson::Bool(b))
    }

    fn visit_i64<E>(self, n: i64) -> Result<OrderedJson, E> {
        Ok(OrderedJson::Number(n as f64))
    }

    fn visit_u64<E>(self, n: u64) -> Result<OrderedJson, E> {
        Ok(OrderedJson::Number(n as f64))
    }

    fn visit_f64<E>(self, n: f64) -> Result<OrderedJson, E> {
        Ok(OrderedJson::Number(n))
    }

    fn visit_str<E>(self, s: &str) -> Result<OrderedJson, E> {
        Ok(OrderedJson::String(s.to_owned()))
    }

    fn visit_string<E>(self, s: String) -> Result<OrderedJson, E> {
        Ok(OrderedJson::String(s))
    }

    fn visit_seq<A: serde::de::SeqAccess<'de>>(self, mut seq: A) -> Result<OrderedJson, A::Error> {
        let mut items = Vec::new();
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(OrderedJson::Array(items))
    }

    fn visit_map<A: serde::de::MapAccess<'de>>(self, mut map: A) -> Result<OrderedJson, A::Error> {
        let mut entries: Vec<(String, OrderedJson)> = Vec::new();
        while let Some((key, value)) = map.next_entry::<String, OrderedJson>()? {
            match entries.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => slot.1 = value,
                None => entries.push((key, value)),
            }
        }
        Ok(OrderedJson::Object(entries))
    }
}

/// Source text of a function or class, whitespace-normalised; built-ins
/// render as `function name() { [native code] }`.
///
/// # Errors
///
/// Fails when `id` is not callable.
pub fn function_to_string(realm: &Realm, id: ObjectId) -> RealmResult<String> {
    match realm.target_kind(id)? {
        ObjectKind::Function(f) => Ok(normalize_source(&f.def.source)),
        ObjectKind::Class(c) => Ok(normalize_source(&c.def.source)),
        ObjectKind::Native(n) => Ok(format!("function {}() {{ [native code] }}", n.name)),
        other => Err(RealmError::Type(format!(
            "Function.prototype.toString requires that 'this' be a Function, got {}",
            other.type_name()
        ))),
    }
}

/// Unix line endings, trailing whitespace stripped, and the common
/// indentation of continuation lines removed.
#[must_use]
pub fn normalize_source(src: &str) -> String {
    let text = src.replace("\r\n", "\n");
    let lines: Vec<&str> = text.trim().lines().map(str::trim_end).collect();
    let indent = lines
        .iter()
        .skip(1)
        .filter(|l| !l.is_empty())
        .map(|l| l.len().saturating_sub(l.trim_start().len()))
        .min()
        .unwrap_or(0);
    let mut out = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        if i == 0 || line.is_empty() {
            out.push(*line);
        } else {
            out.push(line.get(indent..).unwrap_or(line));
        }
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::Property;

    #[test]
    fn test_own_keys_skip_hidden_and_keep_insertion_order() {
        let mut realm = Realm::default();
        let id = realm.new_object();
        realm.define(id, "z", Property::data(Value::Null)).unwrap();
        realm.define(id, "hidden", Property::hidden(Value::Null)).unwrap();
        realm.define(id, "a", Property::data(Value::Null)).unwrap();
        realm.define(id, "10", Property::data(Value::Null)).unwrap();
        assert_eq!(own_keys(&mut realm, id).unwrap(), vec!["z", "a", "10"]);
    }

    #[test]
    fn test_parsed_json_keeps_source_key_order() {
        let mut realm = Realm::default();
        let parsed = parse_json(&mut realm, r#"{"b":1,"a":{"y":2,"x":3},"b":4}"#).unwrap();
        let id = parsed.as_object().unwrap();
        assert_eq!(own_keys(&mut realm, id).unwrap(), vec!["b", "a"]);
        assert_eq!(realm.raw_get(id, "b").unwrap(), Value::Number(4.0));
        let Value::Object(inner) = realm.raw_get(id, "a").unwrap() else {
            panic!("nested object expected");
        };
        assert_eq!(own_keys(&mut realm, inner).unwrap(), vec!["y", "x"]);
        assert!(matches!(parse_json(&mut realm, "{"), Err(RealmError::Syntax(_))));
    }

    #[test]
    fn test_stable_sort_with_equal_comparator_keeps_order() {
        let mut realm = Realm::default();
        let zero = realm.new_native("zero", |_, _, _| Ok(Value::Number(0.0)), None);
        let items: Vec<Value> = (0..9).map(|i| Value::Number(f64::from(i))).collect();
        let sorted = stable_sort(&mut realm, items.clone(), Some(&Value::Object(zero))).unwrap();
        assert_eq!(sorted, items);
    }

    #[test]
    fn test_default_sort_is_by_string() {
        let mut realm = Realm::default();
        let items = vec![Value::Number(10.0), Value::Number(9.0), Value::Undefined, Value::Number(1.0)];
        let sorted = stable_sort(&mut realm, items, None).unwrap();
        assert_eq!(
            sorted,
            vec![Value::Number(1.0), Value::Number(10.0), Value::Number(9.0), Value::Undefined]
        );
    }

    #[test]
    fn test_canonical_json_sorts_keys_and_rejects_cycles() {
        let mut realm = Realm::default();
        let id = realm.new_object();
        realm.set(&Value::Object(id), "b", Value::Number(2.0)).unwrap();
        realm.set(&Value::Object(id), "a", Value::Undefined).unwrap();
        realm.set(&Value::Object(id), "c", Value::string("x")).unwrap();
        assert_eq!(canonical_json(&mut realm, &Value::Object(id)).unwrap(), r#"{"b":2,"c":"x"}"#);

        realm.set(&Value::Object(id), "self", Value::Object(id)).unwrap();
        assert!(matches!(
            canonical_json(&mut realm, &Value::Object(id)),
            Err(RealmError::Type(_))
        ));
    }

    #[test]
    fn test_normalize_source_dedents() {
        let src = "class A {\r\n        m() {}   \r\n    }";
        assert_eq!(normalize_source(src), "class A {\n    m() {}\n}");
    }
}
