use std::rc::Rc;

use jig_membrane::{Interceptor, Membrane, MembraneBuilder, ProxyKind, Record, Registry};
use jig_realm::{Evaluator, ObjectId, Realm, RealmError, SandboxEvaluator, Value};

use crate::{Batch, Bindings, BindingsInterceptor, LifecycleState, TempKind};

struct Harness {
    realm: Realm,
    bindings: Bindings,
    record: Record,
    membrane: Rc<Membrane>,
}

impl Harness {
    fn new() -> Self {
        let record = Record::new();
        let bindings = Bindings::new("mock");
        let layer: Rc<dyn Interceptor> =
            Rc::new(BindingsInterceptor::new(bindings.clone(), Some(record.clone())));
        let membrane = MembraneBuilder::standard(
            Registry::shared(),
            record.clone(),
            Rc::new(bindings.clone()),
            Some(layer),
        );
        Self {
            realm: Realm::default(),
            bindings,
            record,
            membrane,
        }
    }

    fn install(&mut self, name: &str, src: &str) -> Value {
        let evaluation = SandboxEvaluator.evaluate(&mut self.realm, src, None).unwrap();
        let class = evaluation.result.as_object().unwrap();
        let code = self
            .membrane
            .wrap(&mut self.realm, class, ProxyKind::Code)
            .unwrap();
        evaluation.globals.set(name, Value::Object(code));
        Value::Object(code)
    }

    fn call(&mut self, this: &Value, method: &str, args: &[Value]) -> Result<Value, RealmError> {
        let f = self.realm.get(this, method)?;
        self.realm.call(&f, this.clone(), args)
    }

    fn enqueue(&mut self, batch: &mut Batch, jig: &Value) -> ObjectId {
        let id = jig.as_object().unwrap();
        batch
            .enqueue(&self.bindings, &mut self.realm, id, TempKind::Output)
            .unwrap();
        id
    }
}

const TOKEN: &str = "class Token {
    constructor() { this.n = 0 }
    give(o) { this.owner = o }
    fund(s) { this.satoshis = s }
    move() { this.location = 'abc_o1' }
    rewind() { this.nonce = 0 }
    drop() { delete this.origin }
    inc() { this.n += 1 }
}";

#[test]
fn test_pending_bindings_are_undetermined_until_confirmed() {
    let mut h = Harness::new();
    let code = h.install("Token", TOKEN);
    let jig = h.realm.construct(&code, &[]).unwrap();
    assert_eq!(h.realm.get(&jig, "location").unwrap(), Value::Undefined);

    let mut batch = Batch::begin("mock");
    let id = h.enqueue(&mut batch, &jig);
    let pending = h.realm.get(&jig, "location").unwrap_err();
    assert_eq!(pending, RealmError::Undetermined("location is undetermined".to_owned()));
    assert!(h.realm.get(&jig, "nonce").is_err());

    batch.end();
    batch.confirm(&h.bindings, &mut h.realm, "f00d").unwrap();
    assert_eq!(h.bindings.store().state(id), LifecycleState::Confirmed);
    assert_eq!(h.realm.get(&jig, "location").unwrap(), Value::string("f00d_o0"));
    assert_eq!(h.realm.get(&jig, "origin").unwrap(), Value::string("f00d_o0"));
    assert_eq!(h.realm.get(&jig, "nonce").unwrap(), Value::Number(1.0));
    assert!(h.realm.has(&jig, "satoshis").unwrap());
}

#[test]
fn test_owner_and_satoshis_take_one_assignment() {
    let mut h = Harness::new();
    let code = h.install("Token", TOKEN);
    let jig = h.realm.construct(&code, &[]).unwrap();

    h.call(&jig, "give", &[Value::string("alice")]).unwrap();
    let again = h.call(&jig, "give", &[Value::string("bob")]).unwrap_err();
    assert_eq!(again.to_string(), "Cannot set binding again");

    h.call(&jig, "fund", &[Value::Number(500.0)]).unwrap();
    assert!(h.call(&jig, "fund", &[Value::Number(1.0)]).is_err());
    assert!(h.record.writes().contains(&jig.as_object().unwrap()));

    // Assigned but unconfirmed.
    assert!(matches!(h.realm.get(&jig, "owner"), Err(RealmError::Undetermined(_))));
}

#[test]
fn test_location_origin_and_nonce_are_read_only() {
    let mut h = Harness::new();
    let code = h.install("Token", TOKEN);
    let jig = h.realm.construct(&code, &[]).unwrap();

    let moved = h.call(&jig, "move", &[]).unwrap_err();
    assert_eq!(moved.to_string(), "Cannot set location");
    let rewound = h.call(&jig, "rewind", &[]).unwrap_err();
    assert_eq!(rewound.to_string(), "Cannot set nonce");
    let dropped = h.call(&jig, "drop", &[]).unwrap_err();
    assert_eq!(dropped.to_string(), "Cannot delete origin");

    h.call(&jig, "inc", &[]).unwrap();
    assert_eq!(h.realm.get(&jig, "n").unwrap(), Value::Number(1.0));
}

#[test]
fn test_errored_jig_refuses_all_work() {
    let mut h = Harness::new();
    let code = h.install("Token", TOKEN);
    let jig = h.realm.construct(&code, &[]).unwrap();

    let mut batch = Batch::begin("mock");
    let id = h.enqueue(&mut batch, &jig);
    batch.fail(&h.bindings, &mut h.realm, "Broadcast failed").unwrap();
    assert_eq!(h.bindings.store().state(id), LifecycleState::Errored);

    let terminal = RealmError::Terminal("Broadcast failed".to_owned());
    assert_eq!(h.realm.get(&jig, "n").unwrap_err(), terminal);
    assert_eq!(h.call(&jig, "inc", &[]).unwrap_err(), terminal);
    assert_eq!(h.realm.set(&jig, "n", Value::Number(2.0)).unwrap_err(), terminal);

    assert_eq!(h.realm.get(&jig, "location").unwrap(), Value::Undefined);
    assert_eq!(h.realm.get(&jig, "origin").unwrap(), Value::Undefined);
    let seen = h.realm.with_admin(|r| r.get(&jig, "location")).unwrap();
    assert_eq!(seen, Value::string("_o0"));
}
