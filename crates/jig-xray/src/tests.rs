use std::collections::HashMap;
use std::rc::Rc;

use jig_membrane::{ProxyKind, Registry, SharedRegistry};
use jig_realm::{Evaluator, ObjectId, Property, Realm, SandboxEvaluator, Value};
use serde_json::json;

use crate::{Checkpoint, Deployer, Purpose, TokenLoader, TokenSaver, Xray, XrayError, XrayResult};

fn obj(realm: &mut Realm, props: &[(&str, Value)]) -> Value {
    let id = realm.new_object();
    for (k, v) in props {
        realm
            .object_mut(id)
            .unwrap()
            .props
            .insert(*k, Property::data(v.clone()));
    }
    Value::Object(id)
}

fn num(n: f64) -> Value {
    Value::Number(n)
}

fn id(value: &Value) -> ObjectId {
    value.as_object().unwrap()
}

/// Saves a token as `loc<raw id>` and loads it back to a fixed value.
struct Locations {
    loaded: HashMap<String, Value>,
}

impl TokenSaver for Locations {
    fn save(&self, _realm: &Realm, token: ObjectId) -> XrayResult<String> {
        Ok(format!("loc_o{}", token.raw()))
    }
}

impl TokenLoader for Locations {
    fn load(&self, _realm: &mut Realm, location: &str) -> XrayResult<Value> {
        self.loaded
            .get(location)
            .cloned()
            .ok_or_else(|| XrayError::Token(format!("unknown location {location}")))
    }
}

fn token_xray(registry: &SharedRegistry, loaded: HashMap<String, Value>) -> Xray {
    let hooks = Rc::new(Locations { loaded });
    Xray::new()
        .with_registry(Rc::clone(registry))
        .with_saver(hooks.clone())
        .with_loader(hooks)
}

#[test]
fn test_round_trip_keeps_shape_and_shared_identity() {
    let mut realm = Realm::default();
    let bytes = Value::Object(realm.new_bytes(vec![0, 255, 7]));
    let set = Value::Object(realm.new_set(vec![num(1.0), Value::string("x"), bytes.clone()]));
    let map = Value::Object(realm.new_map(vec![(Value::string("k"), Value::Null), (num(2.0), Value::Bool(true))]));
    let list = Value::Object(realm.new_array(vec![Value::Undefined, num(0.5), set.clone()]));
    let root = obj(&mut realm, &[
        ("list", list),
        ("map", map),
        ("bytes", bytes),
        ("text", Value::string("hi")),
    ]);

    let xray = Xray::new();
    let json = xray.serialize(&realm, &root).unwrap();
    let back = xray.deserialize(&mut realm, &json).unwrap();
    assert_ne!(back, root);
    assert_eq!(xray.serialize(&realm, &back).unwrap(), json);

    let back_id = id(&back);
    let direct = realm.raw_get(back_id, "bytes").unwrap();
    let list = realm.raw_get(back_id, "list").unwrap();
    let set = realm.raw_get(id(&list), "2").unwrap();
    let jig_realm::ObjectKind::Set(members) = &realm.object(id(&set)).unwrap().kind else {
        panic!("expected a set");
    };
    assert!(members.contains(&direct));
}

#[test]
fn test_shared_object_serializes_once() {
    let mut realm = Realm::default();
    let shared = obj(&mut realm, &[("n", num(1.0))]);
    let root = obj(&mut realm, &[("a", shared.clone()), ("b", shared)]);

    let xray = Xray::new();
    let json = xray.serialize(&realm, &root).unwrap();
    assert_eq!(
        json,
        json!({
            "$dedup": { "a": { "$dup": 0 }, "b": { "$dup": 0 } },
            "dups": [{ "n": 1 }]
        })
    );

    let back = xray.deserialize(&mut realm, &json).unwrap();
    let a = realm.raw_get(id(&back), "a").unwrap();
    let b = realm.raw_get(id(&back), "b").unwrap();
    assert_eq!(a, b);
    assert_eq!(realm.raw_get(id(&a), "n").unwrap(), num(1.0));
}

#[test]
fn test_cycles_terminate_and_rebuild() {
    let mut realm = Realm::default();
    let root = obj(&mut realm, &[("name", Value::string("loop"))]);
    realm
        .object_mut(id(&root))
        .unwrap()
        .props
        .insert("me", Property::data(root.clone()));

    let xray = Xray::new();
    let json = xray.serialize(&realm, &root).unwrap();
    assert_eq!(
        json,
        json!({ "$dedup": { "$dup": 0 }, "dups": [{ "me": { "$dup": 0 }, "name": "loop" }] })
    );
    let back = xray.deserialize(&mut realm, &json).unwrap();
    assert_eq!(realm.raw_get(id(&back), "me").unwrap(), back);

    let copy = xray.clone_value(&mut realm, &root).unwrap();
    assert_ne!(copy, root);
    assert_eq!(realm.raw_get(id(&copy), "me").unwrap(), copy);
}

#[test]
fn test_rejection_names_deepest_value() {
    let mut realm = Realm::default();
    let list = Value::Object(realm.new_array(vec![num(1.0), num(f64::NAN)]));
    let root = obj(&mut realm, &[("a", list)]);
    let err = Xray::new().serialize(&realm, &root).unwrap_err();
    assert_eq!(err.to_string(), "Cannot serialize NaN at value.a[1]: not JSON-safe");

    let zero = obj(&mut realm, &[("z", num(-0.0))]);
    assert!(Xray::new().serialize(&realm, &zero).is_err());
    assert!(Xray::new().clone_value(&mut realm, &zero).is_ok());

    let reserved = obj(&mut realm, &[("$ref", Value::string("x"))]);
    let err = Xray::new().serialize(&realm, &reserved).unwrap_err();
    assert!(err.to_string().ends_with("reserved key $ref"), "{err}");
}

#[test]
fn test_undeployed_classes_are_collected_not_serialized() {
    let mut realm = Realm::default();
    let class = SandboxEvaluator
        .evaluate(&mut realm, "class A { }", None)
        .unwrap()
        .result;
    let root = obj(&mut realm, &[("kind", class.clone())]);

    let plain = Xray::new().scan(&realm, &root).unwrap_err();
    assert!(matches!(plain, XrayError::Rejected { ref reason, .. } if reason == "unsupported type"));

    let xray = Xray::new().allow_deployables();
    let found = xray.scan(&realm, &root).unwrap();
    assert_eq!(found.deployables, vec![id(&class)]);
    let err = xray.serialize(&realm, &root).unwrap_err();
    assert!(err.to_string().contains("deploy it first"), "{err}");
}

#[test]
fn test_tokens_save_as_refs_and_load_back() {
    let mut realm = Realm::default();
    let registry = Registry::shared();
    let class = SandboxEvaluator
        .evaluate(&mut realm, "class Coin { }", None)
        .unwrap()
        .result;
    let proxy = realm.allocate_instance(id(&class)).unwrap();
    let target = realm.allocate_instance(id(&class)).unwrap();
    registry.borrow_mut().insert(proxy, target, ProxyKind::Jig).unwrap();
    let token = Value::Object(proxy);
    let root = obj(&mut realm, &[("owner", token.clone()), ("also", token.clone())]);

    let location = format!("loc_o{}", proxy.raw());
    let xray = token_xray(&registry, HashMap::from([(location.clone(), token.clone())]));
    let json = xray.serialize(&realm, &root).unwrap();
    assert_eq!(json, json!({ "also": { "$ref": location }, "owner": { "$ref": location } }));
    assert_eq!(xray.scan(&realm, &root).unwrap().tokens, vec![proxy]);

    let back = xray.deserialize(&mut realm, &json).unwrap();
    assert_eq!(realm.raw_get(id(&back), "owner").unwrap(), token);

    let err = Xray::new().with_registry(registry).serialize(&realm, &root).unwrap_err();
    assert!(matches!(err, XrayError::Rejected { purpose: Purpose::Serialize, .. }));
}

#[test]
fn test_foreign_inner_objects_must_be_cloned() {
    let mut realm = Realm::default();
    let registry = Registry::shared();
    let (me, other) = (ObjectId::new(9001), ObjectId::new(9002));
    let (proxy, target) = (realm.new_object(), realm.new_object());
    registry
        .borrow_mut()
        .insert(proxy, target, ProxyKind::Inner { owner: other })
        .unwrap();
    let root = obj(&mut realm, &[("borrowed", Value::Object(proxy))]);

    let xray = Xray::new().with_registry(Rc::clone(&registry)).restrict_owner(me);
    let err = xray.serialize(&realm, &root).unwrap_err();
    assert!(err.to_string().contains("value.borrowed"), "{err}");
    assert!(err.to_string().ends_with("clone it first"), "{err}");

    let copy = xray.clone_value(&mut realm, &root).unwrap();
    assert!(xray.serialize(&realm, &copy).is_ok());
    assert!(Xray::new().with_registry(registry).restrict_owner(other).serialize(&realm, &root).is_ok());
}

#[test]
fn test_arbitrary_instances_carry_their_class() {
    let mut realm = Realm::default();
    let registry = Registry::shared();
    let class = SandboxEvaluator
        .evaluate(&mut realm, "class Point { }", None)
        .unwrap()
        .result;
    let code = realm.new_object();
    registry.borrow_mut().insert(code, id(&class), ProxyKind::Code).unwrap();
    let point = realm.allocate_instance(id(&class)).unwrap();
    realm.raw_set(point, "x", num(3.0)).unwrap();

    let location = format!("loc_o{}", code.raw());
    let xray = token_xray(&registry, HashMap::from([(location.clone(), class.clone())])).allow_arbitrary();
    let json = xray.serialize(&realm, &Value::Object(point)).unwrap();
    assert_eq!(json, json!({ "$arbob": { "x": 3 }, "T": { "$ref": location } }));

    let back = xray.deserialize(&mut realm, &json).unwrap();
    assert_eq!(realm.owner_class(id(&back)), Some(id(&class)));
    assert_eq!(realm.raw_get(id(&back), "x").unwrap(), num(3.0));
}

#[test]
fn test_bad_dup_tables() {
    let mut realm = Realm::default();
    let xray = Xray::new();
    let out_of_range = json!({ "$dedup": { "$dup": 3 }, "dups": [] });
    assert_eq!(
        xray.deserialize(&mut realm, &out_of_range).unwrap_err(),
        XrayError::Dedup("Invalid dup index 3".to_owned())
    );
    let nested = json!({ "$dedup": 1, "dups": [{ "$dup": 0 }] });
    assert!(matches!(xray.deserialize(&mut realm, &nested), Err(XrayError::Dedup(_))));
}

#[test]
fn test_disabled_scanners_reject_nested_nodes() {
    let mut realm = Realm::default();
    let xray = Xray::new();

    let arbob = json!({ "items": [1, { "$arbob": { "x": 1 }, "T": null }] });
    match xray.deserialize(&mut realm, &arbob).unwrap_err() {
        XrayError::Rejected { purpose, culprit, path, reason } => {
            assert_eq!(purpose, Purpose::Deserialize);
            assert_eq!(culprit, "$arbob");
            assert_eq!(path, "value.items[1]");
            assert_eq!(reason, "arbitrary objects are not enabled");
        },
        other => panic!("unexpected error: {other}"),
    }

    let reference = json!({ "owner": { "$ref": "abc_o1" } });
    match xray.deserialize(&mut realm, &reference).unwrap_err() {
        XrayError::Rejected { culprit, path, reason, .. } => {
            assert_eq!(culprit, "reference abc_o1");
            assert_eq!(path, "value.owner");
            assert_eq!(reason, "no token loader configured");
        },
        other => panic!("unexpected error: {other}"),
    }
}

struct RegisterAsCode {
    registry: SharedRegistry,
}

impl Deployer for RegisterAsCode {
    fn deploy(&self, realm: &mut Realm, class: ObjectId) -> XrayResult<()> {
        let code = realm.new_object();
        self.registry
            .borrow_mut()
            .insert(code, class, ProxyKind::Code)
            .map_err(|e| XrayError::Token(e.to_string()))
    }
}

#[test]
fn test_checkpoints_detect_change_and_restore() {
    let mut realm = Realm::default();
    let registry = Registry::shared();
    let class = SandboxEvaluator
        .evaluate(&mut realm, "class Helper { }", None)
        .unwrap()
        .result;
    let list = Value::Object(realm.new_array(vec![num(1.0), num(2.0)]));
    let jig = id(&obj(&mut realm, &[("n", num(1.0)), ("list", list), ("helper", class)]));
    realm
        .object_mut(jig)
        .unwrap()
        .props
        .insert("location", Property::hidden(Value::string("aa_o0")));

    let xray = token_xray(&registry, HashMap::new()).allow_deployables();
    assert!(Checkpoint::capture(&xray, &mut realm, jig, None).is_err());

    let deployer = RegisterAsCode {
        registry: Rc::clone(&registry),
    };
    let before = Checkpoint::capture(&xray, &mut realm, jig, Some(&deployer)).unwrap();
    assert_eq!(before.tokens().len(), 1);
    assert!(Checkpoint::capture(&xray, &mut realm, jig, Some(&deployer)).unwrap().equals(&before));

    realm.raw_set(jig, "n", num(2.0)).unwrap();
    let after = Checkpoint::capture(&xray, &mut realm, jig, Some(&deployer)).unwrap();
    assert!(!after.equals(&before));

    // The loader knows no locations.
    assert!(before.restore_into_new(&xray, &mut realm).is_err());

    let data_only = Xray::new();
    let plain = id(&obj(&mut realm, &[("n", num(1.0))]));
    let snapshot = Checkpoint::capture(&data_only, &mut realm, plain, None).unwrap();
    realm.raw_set(plain, "n", num(5.0)).unwrap();
    realm.raw_set(plain, "extra", Value::Bool(true)).unwrap();
    snapshot.restore_in_place(&data_only, &mut realm, plain).unwrap();
    assert_eq!(realm.raw_get(plain, "n").unwrap(), num(1.0));
    assert_eq!(realm.raw_get(plain, "extra").unwrap(), Value::Undefined);

    let copy = snapshot.restore_into_new(&data_only, &mut realm).unwrap();
    assert_eq!(realm.raw_get(copy, "n").unwrap(), num(1.0));
    assert!(Checkpoint::capture(&data_only, &mut realm, copy, None).unwrap().equals(&snapshot));
}
