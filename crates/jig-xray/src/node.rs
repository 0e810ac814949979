//! Serialized node model.
//!
//! A node is plain JSON. Non-JSON values are carried by single tagged
//! objects:
//!
//! | Node        | JSON                                   |
//! |-------------|----------------------------------------|
//! | undefined   | `{"$undef": 1}`                        |
//! | byte array  | `{"$ui8a": "<base64>"}`                |
//! | set         | `{"$set": [...], "props": {...}}`      |
//! | map         | `{"$map": [[k, v], ...], "props": {...}}` |
//! | token       | `{"$ref": "<location>"}`               |
//! | instance    | `{"$arbob": {...}, "T": <token>}`      |
//! | dedup root  | `{"$dedup": <node>, "dups": [...]}`    |
//! | shared node | `{"$dup": <index>}`                    |
//!
//! `props` is omitted when empty. Objects serialize with sorted keys.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Number, Value as Json, json};

use crate::error::{XrayError, XrayResult};

/// Property bag of an object-like node.
pub type Props = BTreeMap<String, Node>;

/// One serialized value.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// `undefined`.
    Undefined,
    /// `null`.
    Null,
    /// A boolean.
    Bool(bool),
    /// A finite number other than `-0`.
    Number(f64),
    /// A string.
    String(String),
    /// An array.
    Array(Vec<Node>),
    /// An ordinary object.
    Object(Props),
    /// A byte array.
    Bytes(Vec<u8>),
    /// A set with optional extra properties.
    Set {
        /// Members in insertion order.
        values: Vec<Node>,
        /// Extra enumerable properties.
        props: Props,
    },
    /// A map with optional extra properties.
    Map {
        /// Entries in insertion order.
        entries: Vec<(Node, Node)>,
        /// Extra enumerable properties.
        props: Props,
    },
    /// A token saved as its location.
    Ref(String),
    /// An instance of a deployed class.
    Arbitrary {
        /// Enumerable state.
        state: Props,
        /// The class, itself a token.
        class: Box<Node>,
    },
    /// A graph with shared nodes.
    Dedup {
        /// The top-level value.
        root: Box<Node>,
        /// Shared nodes, referenced by [`Node::Dup`] index.
        dups: Vec<Node>,
    },
    /// Reference into the enclosing dedup table.
    Dup(usize),
}

/// Whether `n` survives a JSON round trip unchanged.
#[must_use]
pub fn is_json_safe(n: f64) -> bool {
    n.is_finite() && !(n == 0.0 && n.is_sign_negative())
}

impl Node {
    /// Every `$ref` location in the tree, in first-seen order.
    #[must_use]
    pub fn refs(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_refs(&mut out);
        out
    }

    fn collect_refs(&self, out: &mut Vec<String>) {
        match self {
            Self::Ref(location) => {
                if !out.contains(location) {
                    out.push(location.clone());
                }
            },
            Self::Array(items) => items.iter().for_each(|n| n.collect_refs(out)),
            Self::Object(props) => props.values().for_each(|n| n.collect_refs(out)),
            Self::Set { values, props } => {
                values.iter().for_each(|n| n.collect_refs(out));
                props.values().for_each(|n| n.collect_refs(out));
            },
            Self::Map { entries, props } => {
                for (k, v) in entries {
                    k.collect_refs(out);
                    v.collect_refs(out);
                }
                props.values().for_each(|n| n.collect_refs(out));
            },
            Self::Arbitrary { state, class } => {
                state.values().for_each(|n| n.collect_refs(out));
                class.collect_refs(out);
            },
            Self::Dedup { root, dups } => {
                root.collect_refs(out);
                dups.iter().for_each(|n| n.collect_refs(out));
            },
            _ => {},
        }
    }

    /// Short description for diagnostics.
    #[must_use]
    pub fn tag(&self) -> String {
        match self {
            Self::Undefined => "$undef".to_owned(),
            Self::Null => "null".to_owned(),
            Self::Bool(_) => "boolean".to_owned(),
            Self::Number(_) => "number".to_owned(),
            Self::String(_) => "string".to_owned(),
            Self::Array(_) => "array".to_owned(),
            Self::Object(_) => "object".to_owned(),
            Self::Bytes(_) => "$ui8a".to_owned(),
            Self::Set { .. } => "$set".to_owned(),
            Self::Map { .. } => "$map".to_owned(),
            Self::Ref(location) => format!("reference {location}"),
            Self::Arbitrary { .. } => "$arbob".to_owned(),
            Self::Dedup { .. } => "$dedup".to_owned(),
            Self::Dup(index) => format!("$dup {index}"),
        }
    }

    /// JSON form.
    #[must_use]
    pub fn to_json(&self) -> Json {
        match self {
            Self::Undefined => json!({ "$undef": 1 }),
            Self::Null => Json::Null,
            Self::Bool(b) => Json::Bool(*b),
            Self::Number(n) => number_json(*n),
            Self::String(s) => Json::String(s.clone()),
            Self::Array(items) => Json::Array(items.iter().map(Self::to_json).collect()),
            Self::Object(props) => Json::Object(props_json(props)),
            Self::Bytes(bytes) => json!({ "$ui8a": STANDARD.encode(bytes) }),
            Self::Set { values, props } => {
                let mut out = Map::new();
                out.insert("$set".into(), Json::Array(values.iter().map(Self::to_json).collect()));
                with_props(out, props)
            },
            Self::Map { entries, props } => {
                let pairs = entries
                    .iter()
                    .map(|(k, v)| Json::Array(vec![k.to_json(), v.to_json()]))
                    .collect();
                let mut out = Map::new();
                out.insert("$map".into(), Json::Array(pairs));
                with_props(out, props)
            },
            Self::Ref(location) => json!({ "$ref": location }),
            Self::Arbitrary { state, class } => {
                json!({ "$arbob": Json::Object(props_json(state)), "T": class.to_json() })
            },
            Self::Dedup { root, dups } => json!({
                "$dedup": root.to_json(),
                "dups": dups.iter().map(Self::to_json).collect::<Vec<_>>(),
            }),
            Self::Dup(index) => json!({ "$dup": index }),
        }
    }

    /// Parse a JSON document.
    ///
    /// # Errors
    ///
    /// [`XrayError::InvalidNode`] for unknown tags, stray `$` keys, malformed
    /// tag payloads, and numbers that are not JSON-safe.
    pub fn from_json(json: &Json) -> XrayResult<Self> {
        match json {
            Json::Null => Ok(Self::Null),
            Json::Bool(b) => Ok(Self::Bool(*b)),
            Json::Number(n) => {
                let value = n
                    .as_f64()
                    .filter(|v| is_json_safe(*v))
                    .ok_or_else(|| invalid(format!("number {n}")))?;
                Ok(Self::Number(value))
            },
            Json::String(s) => Ok(Self::String(s.clone())),
            Json::Array(items) => Ok(Self::Array(
                items.iter().map(Self::from_json).collect::<XrayResult<_>>()?,
            )),
            Json::Object(map) => Self::from_object(map),
        }
    }

    fn from_object(map: &Map<String, Json>) -> XrayResult<Self> {
        let Some(tag) = map.keys().find(|k| k.starts_with('$')) else {
            return Ok(Self::Object(parse_props(map)?));
        };
        let payload = &map[tag];
        let only = |allowed: &[&str]| -> XrayResult<()> {
            match map.keys().find(|k| *k != tag && !allowed.contains(&k.as_str())) {
                Some(extra) => Err(invalid(format!("unexpected key {extra} beside {tag}"))),
                None => Ok(()),
            }
        };
        match tag.as_str() {
            "$undef" => {
                only(&[])?;
                Ok(Self::Undefined)
            },
            "$ui8a" => {
                only(&[])?;
                let text = payload.as_str().ok_or_else(|| invalid("$ui8a must be a string"))?;
                let bytes = STANDARD
                    .decode(text)
                    .map_err(|e| invalid(format!("$ui8a: {e}")))?;
                Ok(Self::Bytes(bytes))
            },
            "$set" => {
                only(&["props"])?;
                let values = array(payload, "$set")?
                    .iter()
                    .map(Self::from_json)
                    .collect::<XrayResult<_>>()?;
                Ok(Self::Set {
                    values,
                    props: optional_props(map)?,
                })
            },
            "$map" => {
                only(&["props"])?;
                let entries = array(payload, "$map")?
                    .iter()
                    .map(|pair| match pair.as_array().map(Vec::as_slice) {
                        Some([k, v]) => Ok((Self::from_json(k)?, Self::from_json(v)?)),
                        _ => Err(invalid("$map entries must be [key, value] pairs")),
                    })
                    .collect::<XrayResult<_>>()?;
                Ok(Self::Map {
                    entries,
                    props: optional_props(map)?,
                })
            },
            "$ref" => {
                only(&[])?;
                let location = payload.as_str().ok_or_else(|| invalid("$ref must be a string"))?;
                Ok(Self::Ref(location.to_owned()))
            },
            "$arbob" => {
                only(&["T"])?;
                let state = payload
                    .as_object()
                    .ok_or_else(|| invalid("$arbob must be an object"))
                    .and_then(parse_props)?;
                let class = map.get("T").ok_or_else(|| invalid("$arbob without T"))?;
                Ok(Self::Arbitrary {
                    state,
                    class: Box::new(Self::from_json(class)?),
                })
            },
            "$dedup" => {
                only(&["dups"])?;
                let dups = map
                    .get("dups")
                    .ok_or_else(|| XrayError::Dedup("missing dups".to_owned()))
                    .and_then(|d| {
                        d.as_array()
                            .ok_or_else(|| XrayError::Dedup("dups must be an array".to_owned()))
                    })?
                    .iter()
                    .map(Self::from_json)
                    .collect::<XrayResult<_>>()?;
                Ok(Self::Dedup {
                    root: Box::new(Self::from_json(payload)?),
                    dups,
                })
            },
            "$dup" => {
                only(&[])?;
                let index = payload
                    .as_u64()
                    .and_then(|i| usize::try_from(i).ok())
                    .ok_or_else(|| XrayError::Dedup("$dup must be a non-negative integer".to_owned()))?;
                Ok(Self::Dup(index))
            },
            other => Err(invalid(format!("unknown tag {other}"))),
        }
    }
}

fn invalid(msg: impl Into<String>) -> XrayError {
    XrayError::InvalidNode(msg.into())
}

fn number_json(n: f64) -> Json {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        #[allow(clippy::cast_possible_truncation)]
        let whole = n as i64;
        return Json::Number(whole.into());
    }
    Number::from_f64(n).map_or(Json::Null, Json::Number)
}

fn props_json(props: &Props) -> Map<String, Json> {
    props.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()
}

fn with_props(mut out: Map<String, Json>, props: &Props) -> Json {
    if !props.is_empty() {
        out.insert("props".into(), Json::Object(props_json(props)));
    }
    Json::Object(out)
}

fn parse_props(map: &Map<String, Json>) -> XrayResult<Props> {
    map.iter()
        .map(|(k, v)| {
            if k.starts_with('$') {
                return Err(invalid(format!("reserved key {k}")));
            }
            Ok((k.clone(), Node::from_json(v)?))
        })
        .collect()
}

fn optional_props(map: &Map<String, Json>) -> XrayResult<Props> {
    match map.get("props") {
        None => Ok(Props::new()),
        Some(Json::Object(props)) => parse_props(props),
        Some(_) => Err(invalid("props must be an object")),
    }
}

fn array<'a>(json: &'a Json, tag: &str) -> XrayResult<&'a Vec<Json>> {
    json.as_array()
        .ok_or_else(|| invalid(format!("{tag} must be an array")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_forms() {
        let node = Node::Set {
            values: vec![Node::Number(1.0), Node::Undefined],
            props: Props::from([("tag".to_owned(), Node::String("x".to_owned()))]),
        };
        assert_eq!(
            node.to_json(),
            json!({ "$set": [1, { "$undef": 1 }], "props": { "tag": "x" } })
        );
        assert_eq!(Node::Bytes(vec![1, 2, 3]).to_json(), json!({ "$ui8a": "AQID" }));
        assert_eq!(Node::from_json(&json!({ "$ui8a": "AQID" })).unwrap(), Node::Bytes(vec![1, 2, 3]));
    }

    #[test]
    fn test_rejects_stray_dollar_keys_and_bad_numbers() {
        assert!(Node::from_json(&json!({ "$nope": 1 })).is_err());
        assert!(Node::from_json(&json!({ "a": { "$x": 1, "b": 2 } })).is_err());
        assert!(Node::from_json(&json!({ "$ref": "aa_o1", "extra": 1 })).is_err());
        assert!(Node::from_json(&json!(-0.0)).is_err());
        assert!(matches!(
            Node::from_json(&json!({ "$dup": -1 })),
            Err(XrayError::Dedup(_))
        ));
    }

    #[test]
    fn test_refs_are_collected_once_in_order() {
        let node = Node::from_json(&json!({
            "$dedup": { "a": { "$ref": "_d1" }, "b": [{ "$dup": 0 }, { "$ref": "ff_o2" }] },
            "dups": [{ "$set": [{ "$ref": "_d1" }] }]
        }))
        .unwrap();
        assert_eq!(node.refs(), vec!["_d1".to_owned(), "ff_o2".to_owned()]);
    }

    #[test]
    fn test_integral_numbers_print_without_fraction() {
        assert_eq!(Node::Number(3.0).to_json().to_string(), "3");
        assert_eq!(Node::Number(0.5).to_json().to_string(), "0.5");
        assert!(!is_json_safe(f64::NAN));
        assert!(!is_json_safe(-0.0));
        assert!(is_json_safe(0.0));
    }
}
