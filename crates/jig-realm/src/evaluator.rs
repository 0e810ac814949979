//! Evaluation strategies.

use tracing::debug;

use crate::ast::{Expr, Stmt};
use crate::determinism::BANNED;
use crate::error::{RealmError, RealmResult};
use crate::heap::ObjectKind;
use crate::interp::{self, Completion};
use crate::parser::parse_program;
use crate::realm::Realm;
use crate::scope::{GlobalsHandle, Scope, ScopeRef};
use crate::value::Value;

/// Name reserved for the globals channel; an environment may not define it.
pub const GLOBALS_CHANNEL: &str = "__globals__";

/// Result of evaluating one class or function.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// The class or function object.
    pub result: Value,
    /// Globals visible to the evaluated code. Names set here later are seen
    /// by the code at call time.
    pub globals: GlobalsHandle,
}

/// A way of compiling jig code into a realm.
pub trait Evaluator {
    /// Evaluate `code`, which must be exactly one class or function, with the
    /// entries of `env` visible as globals.
    ///
    /// # Errors
    ///
    /// [`RealmError::Input`] for bad code shape, a non-object `env`, or an
    /// `env` that defines [`GLOBALS_CHANNEL`]. Parse and runtime errors pass
    /// through unchanged.
    fn evaluate(&self, realm: &mut Realm, code: &str, env: Option<&Value>)
    -> RealmResult<Evaluation>;
}

/// Like [`Evaluator::evaluate`] but accepts the code as a realm value.
///
/// # Errors
///
/// [`RealmError::Input`] when `code` is not a string, otherwise as
/// [`Evaluator::evaluate`].
pub fn evaluate_value(
    evaluator: &dyn Evaluator,
    realm: &mut Realm,
    code: &Value,
    env: Option<&Value>,
) -> RealmResult<Evaluation> {
    let Value::String(src) = code else {
        return Err(RealmError::Input(format!(
            "Code must be a string: {}",
            realm.type_name(code)
        )));
    };
    evaluator.evaluate(realm, src, env)
}

/// Evaluates under the deterministic sandbox globals, in a fresh module scope
/// per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct SandboxEvaluator;

impl Evaluator for SandboxEvaluator {
    fn evaluate(
        &self,
        realm: &mut Realm,
        code: &str,
        env: Option<&Value>,
    ) -> RealmResult<Evaluation> {
        let module = Scope::child(&realm.sandbox_globals());
        compile(realm, code, env, module)
    }
}

/// Evaluates against the shared host globals.
///
/// While active, the host table's non-deterministic entries are replaced by
/// their sandbox counterparts; deactivating restores exactly what was there.
#[derive(Debug, Default)]
pub struct DirectEvaluator {
    saved: Option<Vec<(String, Option<Value>)>>,
}

impl DirectEvaluator {
    /// A direct evaluator in the inactive state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the deterministic replacements are installed.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.saved.is_some()
    }

    /// Install deterministic replacements into the host globals.
    pub fn activate(&mut self, realm: &Realm) {
        if self.saved.is_some() {
            return;
        }
        let host = realm.host_globals();
        let sandbox = realm.sandbox_globals();
        let mut saved = Vec::new();
        for name in patched_names() {
            let prior = host.borrow().get_own(name);
            saved.push((name.to_owned(), prior));
            let replacement = sandbox.borrow().get_own(name).unwrap_or_default();
            host.borrow_mut().declare(name, replacement, false);
        }
        debug!(patched = saved.len(), "direct evaluator activated");
        self.saved = Some(saved);
    }

    /// Restore the host globals saved by [`DirectEvaluator::activate`].
    pub fn deactivate(&mut self, realm: &Realm) {
        let Some(saved) = self.saved.take() else {
            return;
        };
        let host = realm.host_globals();
        let mut scope = host.borrow_mut();
        for (name, prior) in saved {
            match prior {
                Some(value) => scope.declare(name, value, false),
                None => {
                    scope.remove_own(&name);
                },
            }
        }
        debug!("direct evaluator deactivated");
    }
}

fn patched_names() -> impl Iterator<Item = &'static str> {
    ["Object", "Math", "JSON"].into_iter().chain(BANNED.iter().copied())
}

impl Evaluator for DirectEvaluator {
    fn evaluate(
        &self,
        realm: &mut Realm,
        code: &str,
        env: Option<&Value>,
    ) -> RealmResult<Evaluation> {
        let module = Scope::child(&realm.host_globals());
        compile(realm, code, env, module)
    }
}

fn compile(
    realm: &mut Realm,
    code: &str,
    env: Option<&Value>,
    module: ScopeRef,
) -> RealmResult<Evaluation> {
    let program = parse_program(code)?;
    let is_code = matches!(
        program.as_slice(),
        [Stmt::Class(_) | Stmt::Function(_) | Stmt::Expr(Expr::Class(_) | Expr::Function(_))]
    );
    if !is_code {
        return Err(RealmError::Input(
            "Code must be a single class or function".to_owned(),
        ));
    }

    if let Some(env) = env {
        install_env(realm, env, &module)?;
    }

    let result = match interp::exec_block(realm, &program, &module)? {
        Completion::Normal(v) => v,
        other => {
            return Err(RealmError::Internal(format!(
                "unexpected completion {other:?}"
            )));
        },
    };
    debug!(kind = realm.type_of(&result), "evaluated code");
    Ok(Evaluation {
        result,
        globals: GlobalsHandle::new(module),
    })
}

fn install_env(realm: &mut Realm, env: &Value, module: &ScopeRef) -> RealmResult<()> {
    let id = match env {
        Value::Object(id) if matches!(realm.object(*id)?.kind, ObjectKind::Plain) => *id,
        other => {
            return Err(RealmError::Input(format!(
                "Environment must be an object: {}",
                realm.type_name(other)
            )));
        },
    };
    let keys = realm.raw_own_keys(id)?;
    if keys.iter().any(|k| k == GLOBALS_CHANNEL) {
        return Err(RealmError::Input(format!(
            "Environment must not define {GLOBALS_CHANNEL}"
        )));
    }
    for key in keys {
        let value = realm.raw_get(id, &key)?;
        module.borrow_mut().declare(key, value, true);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::Property;

    fn env_with(realm: &mut Realm, entries: &[(&str, Value)]) -> Value {
        let id = realm.new_object();
        for (k, v) in entries {
            realm.define(id, k, Property::data(v.clone())).unwrap();
        }
        Value::Object(id)
    }

    #[test]
    fn test_rejects_non_code() {
        let mut realm = Realm::default();
        for src in ["1 + 2", "class A {} class B {}", "let x = 1"] {
            assert!(matches!(
                SandboxEvaluator.evaluate(&mut realm, src, None),
                Err(RealmError::Input(_))
            ));
        }
        assert!(matches!(
            evaluate_value(&SandboxEvaluator, &mut realm, &Value::Number(1.0), None),
            Err(RealmError::Input(_))
        ));
    }

    #[test]
    fn test_rejects_bad_env() {
        let mut realm = Realm::default();
        assert!(matches!(
            SandboxEvaluator.evaluate(&mut realm, "class A {}", Some(&Value::Number(3.0))),
            Err(RealmError::Input(_))
        ));
        let env = env_with(&mut realm, &[(GLOBALS_CHANNEL, Value::Null)]);
        assert!(matches!(
            SandboxEvaluator.evaluate(&mut realm, "class A {}", Some(&env)),
            Err(RealmError::Input(_))
        ));
    }

    #[test]
    fn test_anonymous_code_gets_synthetic_name() {
        let mut realm = Realm::default();
        let class = SandboxEvaluator.evaluate(&mut realm, "class {}", None).unwrap();
        assert_eq!(
            realm.get(&class.result, "name").unwrap(),
            Value::string("Anonymous")
        );
        let func = SandboxEvaluator
            .evaluate(&mut realm, "function () { return 1 }", None)
            .unwrap();
        assert_eq!(
            realm.get(&func.result, "name").unwrap(),
            Value::string("anonymousFunction")
        );
        let named = SandboxEvaluator.evaluate(&mut realm, "class Dragon {}", None).unwrap();
        assert_eq!(realm.get(&named.result, "name").unwrap(), Value::string("Dragon"));
    }

    #[test]
    fn test_env_and_unresolved_dependency() {
        let mut realm = Realm::default();
        let env = env_with(&mut realm, &[("base", Value::Number(40.0))]);
        let f = SandboxEvaluator
            .evaluate(&mut realm, "function f() { return base + 2 }", Some(&env))
            .unwrap();
        assert_eq!(realm.call(&f.result, Value::Undefined, &[]).unwrap(), Value::Number(42.0));

        let g = SandboxEvaluator
            .evaluate(&mut realm, "function g() { return Missing }", None)
            .unwrap();
        let err = realm.call(&g.result, Value::Undefined, &[]).unwrap_err();
        assert_eq!(err.to_string(), "Missing is not defined");
    }

    #[test]
    fn test_globals_wire_circular_classes() {
        let mut realm = Realm::default();
        let a = SandboxEvaluator
            .evaluate(&mut realm, "class A { createB() { return new B() } }", None)
            .unwrap();
        let b = SandboxEvaluator
            .evaluate(&mut realm, "class B { createA() { return new A() } }", None)
            .unwrap();
        a.globals.set("B", b.result.clone());
        b.globals.set("A", a.result.clone());

        let a_inst = realm.construct(&a.result, &[]).unwrap();
        let create_b = realm.get(&a_inst, "createB").unwrap();
        let b_inst = realm.call(&create_b, a_inst.clone(), &[]).unwrap();
        assert!(realm.instance_of(&b_inst, &b.result).unwrap());
        let create_a = realm.get(&b_inst, "createA").unwrap();
        let again = realm.call(&create_a, b_inst, &[]).unwrap();
        assert!(realm.instance_of(&again, &a.result).unwrap());
    }

    #[test]
    fn test_sandboxes_are_isolated() {
        let mut realm = Realm::default();
        let a = SandboxEvaluator.evaluate(&mut realm, "class A {}", None).unwrap();
        let b = SandboxEvaluator.evaluate(&mut realm, "class B {}", None).unwrap();
        assert!(a.globals.get("B").is_none());
        assert!(!a.globals.same_channel(&b.globals));
    }

    #[test]
    fn test_direct_evaluator_patches_and_restores() {
        let mut realm = Realm::default();
        let mut direct = DirectEvaluator::new();
        let typeof_date = direct
            .evaluate(&mut realm, "function p() { return typeof Date }", None)
            .unwrap();
        assert_eq!(
            realm.call(&typeof_date.result, Value::Undefined, &[]).unwrap(),
            Value::string("function")
        );
        let host_object = realm.host_globals().borrow().get_own("Object");

        direct.activate(&realm);
        assert!(direct.is_active());
        assert_eq!(
            realm.call(&typeof_date.result, Value::Undefined, &[]).unwrap(),
            Value::string("undefined")
        );

        direct.deactivate(&realm);
        assert_eq!(
            realm.call(&typeof_date.result, Value::Undefined, &[]).unwrap(),
            Value::string("function")
        );
        assert_eq!(realm.host_globals().borrow().get_own("Object"), host_object);
        assert!(realm.host_globals().borrow().get_own("fetch").is_none());
    }
}
