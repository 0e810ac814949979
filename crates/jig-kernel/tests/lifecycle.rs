//! Deploy, sync, and load scenarios against the in-memory ledger.

use std::sync::Arc;

use jig_bindings::LifecycleState;
use jig_kernel::{Kernel, KernelError, LedgerError, Output};
use jig_realm::{Evaluator, Property, RealmError, SandboxEvaluator, Value};
use jig_test::{MockLedger, fixtures, init_test_logging};
use serde_json::json;

fn kernel_on(ledger: &Arc<MockLedger>) -> Kernel {
    init_test_logging();
    Kernel::with_ledger(ledger.clone())
}

fn admin_location(kernel: &mut Kernel, code: &Value) -> Value {
    kernel
        .realm_mut()
        .with_admin(|r| r.get(code, "location"))
        .unwrap()
}

fn location(kernel: &mut Kernel, code: &Value) -> Value {
    kernel.realm_mut().get(code, "location").unwrap()
}

#[tokio::test]
async fn test_dependency_is_deployed_before_its_dependent() {
    let ledger = Arc::new(MockLedger::new());
    let mut kernel = kernel_on(&ledger);
    let a = kernel.install(fixtures::DEPENDS_ON_B).unwrap();
    let b = kernel.install(fixtures::LEAF).unwrap();
    kernel.set_deps(&a, &[("B", b.clone())]).unwrap();

    let queued = kernel.deploy(&a).unwrap();
    assert_eq!(queued.to_string(), "_d1");
    assert_eq!(admin_location(&mut kernel, &b), Value::string("_d0"));
    assert_eq!(kernel.state(&a), LifecycleState::Pending);
    assert!(matches!(
        kernel.realm_mut().get(&a, "location"),
        Err(RealmError::Undetermined(_))
    ));

    let txid = kernel.sync().await.unwrap().unwrap();
    assert_eq!(location(&mut kernel, &b), Value::String(format!("{txid}_o0")));
    assert_eq!(location(&mut kernel, &a), Value::String(format!("{txid}_o1")));
    assert_eq!(kernel.realm_mut().get(&a, "origin").unwrap(), Value::String(format!("{txid}_o1")));
    assert_eq!(kernel.state(&b), LifecycleState::Confirmed);

    let tx = ledger.transaction(&txid).unwrap();
    assert_eq!(tx.network, "mock");
    let Output::Deploy { props, .. } = &tx.outputs[1] else {
        panic!("expected a deploy output");
    };
    assert_eq!(props, &json!({ "deps": { "B": { "$ref": "_d0" } } }));
}

#[tokio::test]
async fn test_circular_dependencies_deploy_and_load() {
    let ledger = Arc::new(MockLedger::new());
    let mut kernel = kernel_on(&ledger);
    let a = kernel.install(fixtures::DEPENDS_ON_B).unwrap();
    let b = kernel.install(fixtures::DEPENDS_ON_A).unwrap();
    kernel.set_deps(&a, &[("B", b.clone())]).unwrap();
    kernel.set_deps(&b, &[("A", a.clone())]).unwrap();

    kernel.deploy(&a).unwrap();
    assert_eq!(admin_location(&mut kernel, &b), Value::string("_d0"));
    assert_eq!(admin_location(&mut kernel, &a), Value::string("_d1"));
    let txid = kernel.sync().await.unwrap().unwrap();

    let mut fresh = kernel_on(&ledger);
    let a2 = fresh.load(&format!("{txid}_o1")).await.unwrap();
    let b2 = fresh.load(&format!("{txid}_o0")).await.unwrap();
    assert_eq!(location(&mut fresh, &a2), Value::String(format!("{txid}_o1")));

    let a_instance = fresh.construct(&a2, &[]).unwrap();
    let b_instance = fresh.call(&a_instance, "createB", &[]).unwrap();
    assert!(fresh.realm_mut().instance_of(&b_instance, &b2).unwrap());
    let again = fresh.call(&b_instance, "createA", &[]).unwrap();
    assert!(fresh.realm_mut().instance_of(&again, &a2).unwrap());
}

#[tokio::test]
async fn test_failed_batch_errors_every_member() {
    let ledger = Arc::new(MockLedger::new().failing_with("Broadcast failed: insufficient funds"));
    let mut kernel = kernel_on(&ledger);
    let a = kernel.install(fixtures::DEPENDS_ON_B).unwrap();
    let b = kernel.install(fixtures::LEAF).unwrap();
    kernel.set_deps(&a, &[("B", b.clone())]).unwrap();

    kernel.begin().unwrap();
    kernel.deploy(&a).unwrap();
    kernel.end().unwrap();
    let err = kernel.sync().await.unwrap_err();
    assert_eq!(err.to_string(), "Broadcast failed: insufficient funds");
    assert!(matches!(err, KernelError::Ledger(LedgerError::Rejected(_))));

    for code in [&a, &b] {
        assert_eq!(kernel.state(code), LifecycleState::Errored);
        assert_eq!(location(&mut kernel, code), Value::Undefined);
        assert_eq!(kernel.realm_mut().get(code, "origin").unwrap(), Value::Undefined);
    }
    assert_eq!(admin_location(&mut kernel, &b), Value::string("_d0"));
    assert_eq!(admin_location(&mut kernel, &a), Value::string("_d1"));

    let terminal = RealmError::Terminal("Broadcast failed: insufficient funds".to_owned());
    assert_eq!(kernel.realm_mut().get(&a, "name").unwrap_err(), terminal);
    assert_eq!(
        kernel.deploy(&a).unwrap_err().to_string(),
        "Broadcast failed: insufficient funds"
    );
    assert!(ledger.is_empty());
}

#[tokio::test]
async fn test_rollback_discards_pending_bindings() {
    let ledger = Arc::new(MockLedger::new());
    let mut kernel = kernel_on(&ledger);
    let counter = kernel.install(fixtures::COUNTER).unwrap();

    kernel.begin().unwrap();
    kernel.deploy(&counter).unwrap();
    assert!(matches!(kernel.sync().await, Err(KernelError::BatchOpen)));
    kernel.rollback().unwrap();

    assert_eq!(kernel.state(&counter), LifecycleState::Unsaved);
    assert_eq!(location(&mut kernel, &counter), Value::Undefined);
    assert_eq!(kernel.sync().await.unwrap(), None);
    assert!(ledger.is_empty());
    assert!(matches!(kernel.rollback(), Err(KernelError::NoBatch)));
}

#[tokio::test]
async fn test_activation_switches_the_visible_network() {
    let ledger = Arc::new(MockLedger::new());
    let mut kernel = kernel_on(&ledger);
    let helper = kernel.install(fixtures::HELPER).unwrap();
    kernel.deploy(&helper).unwrap();
    let txid = kernel.sync().await.unwrap().unwrap();
    let confirmed = Value::String(format!("{txid}_o0"));

    assert_eq!(kernel.activate("test").unwrap(), "mock");
    assert_eq!(kernel.network(), "test");
    assert_eq!(location(&mut kernel, &helper), Value::Undefined);
    assert_eq!(kernel.state(&helper), LifecycleState::Unsaved);

    kernel.activate("mock").unwrap();
    assert_eq!(location(&mut kernel, &helper), confirmed);
}

#[tokio::test]
async fn test_undeployed_class_in_properties_is_deployed_with_its_owner() {
    let ledger = Arc::new(MockLedger::new());
    let mut kernel = kernel_on(&ledger);
    let counter = kernel.install(fixtures::COUNTER).unwrap();
    let raw = SandboxEvaluator
        .evaluate(kernel.realm_mut(), "class Helper {}", None)
        .unwrap()
        .result;
    let target = kernel.realm().resolve_target(counter.as_object().unwrap());
    kernel
        .realm_mut()
        .object_mut(target)
        .unwrap()
        .props
        .insert("helper", Property::data(raw));

    assert_eq!(kernel.deploy(&counter).unwrap().to_string(), "_d0");
    let txid = kernel.sync().await.unwrap().unwrap();
    let tx = ledger.transaction(&txid).unwrap();
    assert_eq!(tx.outputs.len(), 2);
    let Output::Deploy { props, .. } = &tx.outputs[0] else {
        panic!("expected a deploy output");
    };
    assert_eq!(props, &json!({ "helper": { "$ref": "_d1" } }));
    let Output::Deploy { src, .. } = &tx.outputs[1] else {
        panic!("expected a deploy output");
    };
    assert_eq!(src, "class Helper {}");
}

#[tokio::test]
async fn test_load_follows_references_into_earlier_transactions() {
    let ledger = Arc::new(MockLedger::new());
    let mut kernel = kernel_on(&ledger);
    let b = kernel.install(fixtures::LEAF).unwrap();
    kernel.deploy(&b).unwrap();
    let first = kernel.sync().await.unwrap().unwrap();

    let a = kernel.install(fixtures::DEPENDS_ON_B).unwrap();
    kernel.set_deps(&a, &[("B", b.clone())]).unwrap();
    assert_eq!(kernel.deploy(&a).unwrap().to_string(), "_d0");
    let second = kernel.sync().await.unwrap().unwrap();
    let tx = ledger.transaction(&second).unwrap();
    let Output::Deploy { props, .. } = &tx.outputs[0] else {
        panic!("expected a deploy output");
    };
    assert_eq!(props, &json!({ "deps": { "B": { "$ref": format!("{first}_o0") } } }));

    let mut fresh = kernel_on(&ledger);
    let a2 = fresh.load(&format!("{second}_o0")).await.unwrap();
    let b2 = fresh.load(&format!("{first}_o0")).await.unwrap();
    let instance = fresh.construct(&a2, &[]).unwrap();
    let made = fresh.call(&instance, "createB", &[]).unwrap();
    assert!(fresh.realm_mut().instance_of(&made, &b2).unwrap());
    let describe = fresh.call(&b2, "describe", &[]).unwrap();
    assert_eq!(describe, Value::string("leaf"));
}

#[tokio::test]
async fn test_errors_pass_through_unchanged() {
    let ledger = Arc::new(MockLedger::new());
    let mut kernel = kernel_on(&ledger);
    assert!(matches!(
        kernel.install("1 + 2"),
        Err(KernelError::Realm(RealmError::Input(_)))
    ));
    assert!(matches!(
        kernel.deploy(&Value::Number(1.0)),
        Err(KernelError::NotCode(_))
    ));
    let err = kernel.load("ffff_o0").await.unwrap_err();
    assert_eq!(err.to_string(), "Transaction not found: ffff");
}

fn field(kernel: &mut Kernel, jig: &Value, key: &str) -> Value {
    kernel.realm_mut().get(jig, key).unwrap()
}

/// Deploys `Counter` and returns it with one confirmed instance.
async fn confirmed_counter(kernel: &mut Kernel) -> (Value, Value, String) {
    let counter = kernel.install(fixtures::COUNTER).unwrap();
    kernel.deploy(&counter).unwrap();
    kernel.sync().await.unwrap().unwrap();
    let jig = kernel.construct(&counter, &[]).unwrap();
    let txid = kernel.sync().await.unwrap().unwrap();
    (counter, jig, txid)
}

#[tokio::test]
async fn test_jig_actions_in_a_bracket_publish_one_output() {
    let ledger = Arc::new(MockLedger::new());
    let mut kernel = kernel_on(&ledger);
    let counter = kernel.install(fixtures::COUNTER).unwrap();
    kernel.deploy(&counter).unwrap();
    let deployed = kernel.sync().await.unwrap().unwrap();

    kernel.begin().unwrap();
    let jig = kernel.construct(&counter, &[]).unwrap();
    assert_eq!(kernel.call(&jig, "inc", &[]).unwrap(), Value::Number(1.0));
    kernel.end().unwrap();
    assert_eq!(kernel.state(&jig), LifecycleState::Pending);
    assert_eq!(admin_location(&mut kernel, &jig), Value::string("_o0"));

    let txid = kernel.sync().await.unwrap().unwrap();
    assert_eq!(kernel.state(&jig), LifecycleState::Confirmed);
    assert_eq!(location(&mut kernel, &jig), Value::String(format!("{txid}_o0")));
    let tx = ledger.transaction(&txid).unwrap();
    assert_eq!(
        tx.outputs,
        vec![Output::Jig {
            class: format!("{deployed}_o0"),
            state: json!({ "n": 1 }),
            owner: None,
            satoshis: None,
        }]
    );
}

#[tokio::test]
async fn test_constructing_from_undeployed_code_deploys_it_first() {
    let ledger = Arc::new(MockLedger::new());
    let mut kernel = kernel_on(&ledger);
    let counter = kernel.install(fixtures::COUNTER).unwrap();
    let jig = kernel.construct(&counter, &[]).unwrap();
    assert_eq!(admin_location(&mut kernel, &counter), Value::string("_d0"));
    assert_eq!(admin_location(&mut kernel, &jig), Value::string("_o1"));
    kernel.call(&jig, "inc", &[]).unwrap();

    let txid = kernel.sync().await.unwrap().unwrap();
    let tx = ledger.transaction(&txid).unwrap();
    assert_eq!(tx.outputs.len(), 2);
    let Output::Jig { class, state, .. } = &tx.outputs[1] else {
        panic!("expected a jig output");
    };
    assert_eq!(class, "_d0");
    assert_eq!(state, &json!({ "n": 1 }));

    let mut fresh = kernel_on(&ledger);
    let loaded = fresh.load(&format!("{txid}_o1")).await.unwrap();
    let code = fresh.load(&format!("{txid}_o0")).await.unwrap();
    assert!(fresh.realm_mut().instance_of(&loaded, &code).unwrap());
    assert_eq!(field(&mut fresh, &loaded, "n"), Value::Number(1.0));
    assert_eq!(fresh.state(&loaded), LifecycleState::Confirmed);
    assert_eq!(fresh.call(&loaded, "inc", &[]).unwrap(), Value::Number(2.0));
    assert_eq!(fresh.state(&loaded), LifecycleState::Pending);
}

#[tokio::test]
async fn test_calls_that_change_nothing_publish_nothing() {
    let ledger = Arc::new(MockLedger::new());
    let mut kernel = kernel_on(&ledger);
    let (_, jig, txid) = confirmed_counter(&mut kernel).await;

    assert_eq!(kernel.call(&jig, "value", &[]).unwrap(), Value::Number(0.0));
    assert_eq!(kernel.sync().await.unwrap(), None);
    assert_eq!(location(&mut kernel, &jig), Value::String(format!("{txid}_o0")));
}

#[tokio::test]
async fn test_thrown_method_leaves_the_jig_untouched() {
    let ledger = Arc::new(MockLedger::new());
    let mut kernel = kernel_on(&ledger);
    let (_, jig, _) = confirmed_counter(&mut kernel).await;

    let err = kernel.call(&jig, "incThenFail", &[]).unwrap_err();
    assert!(matches!(err, KernelError::Realm(RealmError::Thrown { .. })));
    assert_eq!(field(&mut kernel, &jig, "n"), Value::Number(0.0));
    assert_eq!(kernel.state(&jig), LifecycleState::Confirmed);
    assert_eq!(kernel.sync().await.unwrap(), None);
}

#[tokio::test]
async fn test_rollback_restores_jig_state() {
    let ledger = Arc::new(MockLedger::new());
    let mut kernel = kernel_on(&ledger);
    let (_, jig, txid) = confirmed_counter(&mut kernel).await;

    kernel.begin().unwrap();
    kernel.call(&jig, "inc", &[]).unwrap();
    kernel.call(&jig, "inc", &[]).unwrap();
    assert_eq!(field(&mut kernel, &jig, "n"), Value::Number(2.0));
    kernel.rollback().unwrap();

    assert_eq!(field(&mut kernel, &jig, "n"), Value::Number(0.0));
    assert_eq!(kernel.state(&jig), LifecycleState::Confirmed);
    assert_eq!(location(&mut kernel, &jig), Value::String(format!("{txid}_o0")));
}

#[tokio::test]
async fn test_failed_sync_errors_changed_jigs() {
    let ledger = Arc::new(MockLedger::new());
    let mut kernel = kernel_on(&ledger);
    let (_, jig, _) = confirmed_counter(&mut kernel).await;

    ledger.fail_next("Broadcast failed: mempool conflict");
    kernel.call(&jig, "inc", &[]).unwrap();
    let err = kernel.sync().await.unwrap_err();
    assert_eq!(err.to_string(), "Broadcast failed: mempool conflict");
    assert_eq!(kernel.state(&jig), LifecycleState::Errored);
    assert_eq!(admin_location(&mut kernel, &jig), Value::string("_o0"));
    assert_eq!(ledger.len(), 2);
}

#[tokio::test]
async fn test_later_calls_in_a_batch_republish_the_latest_state() {
    let ledger = Arc::new(MockLedger::new());
    let mut kernel = kernel_on(&ledger);
    let (_, jig, _) = confirmed_counter(&mut kernel).await;

    kernel.call(&jig, "inc", &[]).unwrap();
    kernel.call(&jig, "inc", &[]).unwrap();
    let txid = kernel.sync().await.unwrap().unwrap();
    let tx = ledger.transaction(&txid).unwrap();
    assert_eq!(tx.outputs.len(), 1);
    let Output::Jig { state, .. } = &tx.outputs[0] else {
        panic!("expected a jig output");
    };
    assert_eq!(state, &json!({ "n": 2 }));
}
