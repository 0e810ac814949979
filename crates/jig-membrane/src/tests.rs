use std::rc::Rc;

use jig_realm::{Evaluator, ObjectId, Realm, RealmError, SandboxEvaluator, Value};

use crate::{
    ErrorSource, Membrane, MembraneBuilder, MembraneError, OUTSIDE_METHOD, ProxyKind, Record,
    Registry, SharedRegistry,
};

#[derive(Debug)]
struct Clean;

impl ErrorSource for Clean {
    fn error_reason(&self, _realm: &Realm, _owner: ObjectId) -> Option<String> {
        None
    }
}

#[derive(Debug)]
struct AlwaysErrored;

impl ErrorSource for AlwaysErrored {
    fn error_reason(&self, _realm: &Realm, _owner: ObjectId) -> Option<String> {
        Some("broadcast failed".to_owned())
    }
}

struct Harness {
    realm: Realm,
    registry: SharedRegistry,
    record: Record,
    membrane: Rc<Membrane>,
}

impl Harness {
    fn new() -> Self {
        Self::with_source(Rc::new(Clean))
    }

    fn with_source(source: Rc<dyn ErrorSource>) -> Self {
        let registry = Registry::shared();
        let record = Record::new();
        let membrane = MembraneBuilder::standard(Rc::clone(&registry), record.clone(), source, None);
        Self {
            realm: Realm::default(),
            registry,
            record,
            membrane,
        }
    }

    fn install(&mut self, name: &str, src: &str) -> Value {
        self.install_with(name, src, &[])
    }

    fn install_with(&mut self, name: &str, src: &str, deps: &[(&str, &Value)]) -> Value {
        let evaluation = SandboxEvaluator.evaluate(&mut self.realm, src, None).unwrap();
        let class = evaluation.result.as_object().unwrap();
        let code = self
            .membrane
            .wrap(&mut self.realm, class, ProxyKind::Code)
            .unwrap();
        evaluation.globals.set(name, Value::Object(code));
        for (dep, value) in deps {
            evaluation.globals.set(*dep, (*value).clone());
        }
        Value::Object(code)
    }

    fn call(&mut self, this: &Value, method: &str, args: &[Value]) -> Result<Value, RealmError> {
        let f = self.realm.get(this, method)?;
        self.realm.call(&f, this.clone(), args)
    }
}

const SECRETS: &str = "class A {
    constructor(v) { this._secret = v; this.items = [] }
    peek(other) { return other._secret }
    poke(other, v) { other._secret = v }
    add(x) { this.items.push(x) }
}";

#[test]
fn test_one_membrane_per_target_and_lookups_invert() {
    let mut h = Harness::new();
    let code = h.install("A", SECRETS);
    let jig = h.realm.construct(&code, &[Value::Number(1.0)]).unwrap();
    let items = h.realm.get(&jig, "items").unwrap();

    for proxy in [&code, &jig, &items] {
        let p = proxy.as_object().unwrap();
        let registry = h.registry.borrow();
        let target = registry.lookup_target(p).unwrap();
        assert_eq!(registry.lookup_proxy(target), Some(p));
    }

    let class = h.registry.borrow().lookup_target(code.as_object().unwrap()).unwrap();
    assert_eq!(
        h.membrane.wrap(&mut h.realm, class, ProxyKind::Code),
        Err(MembraneError::DuplicateProxy { target: class })
    );
}

#[test]
fn test_instances_of_one_class_share_private_state() {
    let mut h = Harness::new();
    let code = h.install("A", SECRETS);
    let a1 = h.realm.construct(&code, &[Value::Number(1.0)]).unwrap();
    let a2 = h.realm.construct(&code, &[Value::Number(2.0)]).unwrap();

    assert_eq!(h.call(&a1, "peek", &[a2.clone()]).unwrap(), Value::Number(2.0));
    h.call(&a2, "poke", &[a1.clone(), Value::Number(5.0)]).unwrap();
    assert_eq!(h.call(&a2, "peek", &[a1.clone()]).unwrap(), Value::Number(5.0));
}

#[test]
fn test_other_classes_cannot_touch_private_state() {
    let mut h = Harness::new();
    let a = h.install("A", SECRETS);
    let b = h.install("B", "class B { steal(a) { return a._secret } }");
    let a1 = h.realm.construct(&a, &[Value::Number(1.0)]).unwrap();
    let b1 = h.realm.construct(&b, &[]).unwrap();

    let err = h.call(&b1, "steal", &[a1.clone()]).unwrap_err();
    assert!(matches!(err, RealmError::Capability(_)), "{err:?}");
    assert!(h.realm.get(&a1, "_secret").is_err());

    let keys = h.realm.own_keys(a1.as_object().unwrap()).unwrap();
    assert_eq!(keys, vec!["items"]);
}

#[test]
fn test_updates_outside_methods_are_rejected() {
    let mut h = Harness::new();
    let code = h.install("A", SECRETS);
    let jig = h.realm.construct(&code, &[Value::Number(1.0)]).unwrap();

    let err = h.realm.set(&jig, "items", Value::Null).unwrap_err();
    assert_eq!(err.to_string(), OUTSIDE_METHOD);

    h.record.begin();
    h.call(&jig, "add", &[Value::Number(7.0)]).unwrap();
    assert_eq!(h.record.writes(), vec![jig.as_object().unwrap()]);
    let items = h.realm.get(&jig, "items").unwrap();
    assert_eq!(h.realm.get(&items, "0").unwrap(), Value::Number(7.0));

    h.realm.with_admin(|realm| realm.set(&jig, "items", Value::Null)).unwrap();
    assert_eq!(h.realm.get(&jig, "items").unwrap(), Value::Null);
}

#[test]
fn test_construction_is_recorded() {
    let mut h = Harness::new();
    let a = h.install("A", SECRETS);
    let f = h.install_with("F", "class F { make() { return new A(0) } }", &[("A", &a)]);
    let factory = h.realm.construct(&f, &[]).unwrap();

    h.record.begin();
    let made = h.call(&factory, "make", &[]).unwrap();
    assert!(h.realm.instance_of(&made, &a).unwrap());
    assert_eq!(h.record.creates(), vec![made.as_object().unwrap()]);
    assert_eq!(h.registry.borrow().kind(made.as_object().unwrap()), Some(ProxyKind::Jig));
}

#[test]
fn test_collections_work_through_proxies() {
    let mut h = Harness::new();
    let code = h.install(
        "C",
        "class C { constructor() { this.s = new Set() } add(x) { this.s.add(x) } }",
    );
    let jig = h.realm.construct(&code, &[]).unwrap();
    h.call(&jig, "add", &[Value::string("x")]).unwrap();
    h.call(&jig, "add", &[Value::string("x")]).unwrap();

    let set = h.realm.get(&jig, "s").unwrap();
    assert!(h.realm.is_proxy(set.as_object().unwrap()));
    assert_eq!(h.realm.get(&set, "size").unwrap(), Value::Number(1.0));
    assert_eq!(h.call(&set, "has", &[Value::string("x")]).unwrap(), Value::Bool(true));

    let err = h.call(&set, "add", &[Value::string("y")]).unwrap_err();
    assert_eq!(err.to_string(), OUTSIDE_METHOD);
}

#[test]
fn test_errored_objects_refuse_everything_but_introspection() {
    let mut h = Harness::with_source(Rc::new(AlwaysErrored));
    let code = h.install("A", "class A {}");
    let err = h.realm.construct(&code, &[]).unwrap_err();
    assert_eq!(err, RealmError::Terminal("broadcast failed".to_owned()));
    assert_eq!(h.realm.get(&code, "location").unwrap(), Value::Undefined);
    assert!(h.realm.get(&code, "name").is_err());
    assert_eq!(
        h.realm.with_admin(|realm| realm.get(&code, "name")).unwrap(),
        Value::string("A")
    );
}
