//! `String` and `String.prototype`.

use super::{arg, method};
use crate::error::{RealmError, RealmResult};
use crate::realm::Realm;
use crate::value::{ObjectId, Value};

pub(super) fn constructor(realm: &mut Realm) -> ObjectId {
    realm.new_native("String", to_string, None)
}

pub(super) fn install_prototype(realm: &mut Realm) {
    let proto = realm.intrinsics.string_proto;
    method(realm, proto, "charAt", char_at);
    method(realm, proto, "indexOf", index_of);
    method(realm, proto, "includes", includes);
    method(realm, proto, "startsWith", starts_with);
    method(realm, proto, "endsWith", ends_with);
    method(realm, proto, "slice", slice);
    method(realm, proto, "substring", substring);
    method(realm, proto, "split", split);
    method(realm, proto, "toUpperCase", |r, this, _| {
        Ok(Value::String(receiver(r, this)?.to_uppercase()))
    });
    method(realm, proto, "toLowerCase", |r, this, _| {
        Ok(Value::String(receiver(r, this)?.to_lowercase()))
    });
    method(realm, proto, "trim", |r, this, _| {
        Ok(Value::string(receiver(r, this)?.trim()))
    });
    method(realm, proto, "repeat", repeat);
    method(realm, proto, "padStart", pad_start);
    method(realm, proto, "toString", |r, this, _| receiver(r, this).map(Value::String));
}

fn to_string(realm: &mut Realm, _this: &Value, args: &[Value]) -> RealmResult<Value> {
    if args.is_empty() {
        return Ok(Value::string(""));
    }
    realm.to_string(&arg(args, 0)).map(Value::String)
}

fn receiver(realm: &mut Realm, this: &Value) -> RealmResult<String> {
    match this {
        Value::String(s) => Ok(s.clone()),
        Value::Undefined | Value::Null => Err(RealmError::Type(
            "String.prototype method called on null or undefined".to_owned(),
        )),
        other => realm.to_string(other),
    }
}

fn chars(s: &str) -> Vec<char> {
    s.chars().collect()
}

fn clamp_index(realm: &Realm, value: &Value, len: usize, default: usize) -> usize {
    if value.is_undefined() {
        return default;
    }
    let n = realm.to_number(value);
    if n.is_nan() || n <= 0.0 {
        return 0;
    }
    let i = n.trunc().min(usize::MAX as f64) as usize;
    i.min(len)
}

fn relative_index(realm: &Realm, value: &Value, len: usize, default: usize) -> usize {
    if value.is_undefined() {
        return default;
    }
    let n = realm.to_number(value);
    if n < 0.0 {
        let back = (-n.trunc()) as usize;
        return len.saturating_sub(back);
    }
    clamp_index(realm, value, len, default)
}

/// Character offset of `needle` in `hay`, if present.
fn find(hay: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    hay.windows(needle.len()).position(|w| w == needle)
}

fn char_at(realm: &mut Realm, this: &Value, args: &[Value]) -> RealmResult<Value> {
    let s = chars(&receiver(realm, this)?);
    let i = clamp_index(realm, &arg(args, 0), s.len(), 0);
    Ok(Value::String(s.get(i).map(char::to_string).unwrap_or_default()))
}

fn index_of(realm: &mut Realm, this: &Value, args: &[Value]) -> RealmResult<Value> {
    let s = chars(&receiver(realm, this)?);
    let needle = chars(&realm.to_string(&arg(args, 0))?);
    Ok(Value::Number(find(&s, &needle).map_or(-1.0, |i| i as f64)))
}

fn includes(realm: &mut Realm, this: &Value, args: &[Value]) -> RealmResult<Value> {
    let s = receiver(realm, this)?;
    let needle = realm.to_string(&arg(args, 0))?;
    Ok(Value::Bool(s.contains(needle.as_str())))
}

fn starts_with(realm: &mut Realm, this: &Value, args: &[Value]) -> RealmResult<Value> {
    let s = receiver(realm, this)?;
    let needle = realm.to_string(&arg(args, 0))?;
    Ok(Value::Bool(s.starts_with(needle.as_str())))
}

fn ends_with(realm: &mut Realm, this: &Value, args: &[Value]) -> RealmResult<Value> {
    let s = receiver(realm, this)?;
    let needle = realm.to_string(&arg(args, 0))?;
    Ok(Value::Bool(s.ends_with(needle.as_str())))
}

fn slice(realm: &mut Realm, this: &Value, args: &[Value]) -> RealmResult<Value> {
    let s = chars(&receiver(realm, this)?);
    let start = relative_index(realm, &arg(args, 0), s.len(), 0);
    let end = relative_index(realm, &arg(args, 1), s.len(), s.len());
    Ok(Value::String(
        s.get(start..end.max(start)).unwrap_or_default().iter().collect(),
    ))
}

fn substring(realm: &mut Realm, this: &Value, args: &[Value]) -> RealmResult<Value> {
    let s = chars(&receiver(realm, this)?);
    let a = clamp_index(realm, &arg(args, 0), s.len(), 0);
    let b = clamp_index(realm, &arg(args, 1), s.len(), s.len());
    let (start, end) = if a <= b { (a, b) } else { (b, a) };
    Ok(Value::String(s.get(start..end).unwrap_or_default().iter().collect()))
}

fn split(realm: &mut Realm, this: &Value, args: &[Value]) -> RealmResult<Value> {
    let s = receiver(realm, this)?;
    let parts: Vec<Value> = match arg(args, 0) {
        Value::Undefined => vec![Value::String(s)],
        sep => {
            let sep = realm.to_string(&sep)?;
            if sep.is_empty() {
                s.chars().map(|c| Value::String(c.to_string())).collect()
            } else {
                s.split(sep.as_str()).map(Value::string).collect()
            }
        },
    };
    Ok(Value::Object(realm.new_array(parts)))
}

fn repeat(realm: &mut Realm, this: &Value, args: &[Value]) -> RealmResult<Value> {
    let s = receiver(realm, this)?;
    let n = realm.to_number(&arg(args, 0));
    if !n.is_finite() || n < 0.0 {
        return Err(RealmError::Range(format!("Invalid count value: {n}")));
    }
    Ok(Value::String(s.repeat(n as usize)))
}

fn pad_start(realm: &mut Realm, this: &Value, args: &[Value]) -> RealmResult<Value> {
    let s = receiver(realm, this)?;
    let target = clamp_index(realm, &arg(args, 0), usize::MAX, 0);
    let fill = match arg(args, 1) {
        Value::Undefined => " ".to_owned(),
        other => realm.to_string(&other)?,
    };
    let len = s.chars().count();
    if target <= len || fill.is_empty() {
        return Ok(Value::String(s));
    }
    let mut out: String = fill.chars().cycle().take(target - len).collect();
    out.push_str(&s);
    Ok(Value::String(out))
}

#[cfg(test)]
mod tests {
    use crate::intrinsics::tests::eval_in_sandbox;
    use crate::value::Value;

    #[test]
    fn test_string_methods() {
        assert_eq!(eval_in_sandbox("return 'hello'.slice(-3)"), Value::string("llo"));
        assert_eq!(eval_in_sandbox("return 'a,b,c'.split(',').length"), Value::Number(3.0));
        assert_eq!(eval_in_sandbox("return '7'.padStart(3, '0')"), Value::string("007"));
        assert_eq!(eval_in_sandbox("return 'abc'.length"), Value::Number(3.0));
        assert_eq!(eval_in_sandbox("return 'abc'[1]"), Value::string("b"));
    }
}
