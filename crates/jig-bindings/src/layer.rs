//! The bindings layer of jig and code membranes.

use jig_membrane::{Interceptor, Next, Record, TrapContext};
use jig_realm::{RealmError, RealmResult, Trap, TrapOutcome};
use tracing::debug;

use crate::binding::BindingName;
use crate::store::Bindings;

/// Guards the five binding names on jigs and code.
///
/// Pending values read as undetermined. `location`, `origin`, and `nonce`
/// are never writable from code. `owner` and `satoshis` take one assignment
/// while unset. Inner objects and other keys pass through.
#[derive(Debug, Clone)]
pub struct BindingsInterceptor {
    bindings: Bindings,
    record: Option<Record>,
}

impl BindingsInterceptor {
    /// Layer over `bindings`, noting assignments in `record` when given.
    #[must_use]
    pub fn new(bindings: Bindings, record: Option<Record>) -> Self {
        Self { bindings, record }
    }
}

impl Interceptor for BindingsInterceptor {
    fn name(&self) -> &'static str {
        "bindings"
    }

    fn intercept(&self, cx: &mut TrapContext<'_>, trap: Trap, next: Next<'_>) -> RealmResult<TrapOutcome> {
        let Some(name) = trap.key().and_then(BindingName::from_key) else {
            return next.run(cx, trap);
        };
        if !cx.is_token() {
            return next.run(cx, trap);
        }
        let proxy = cx.proxy;
        match trap {
            Trap::Get { .. } => {
                let store = self.bindings.store();
                let value = match store.active(proxy) {
                    Some(set) => set.read(name)?,
                    None => jig_realm::Value::Undefined,
                };
                Ok(TrapOutcome::Value(value))
            },
            Trap::Has { .. } => Ok(TrapOutcome::Bool(true)),
            Trap::Delete { .. } => Err(RealmError::capability(format!(
                "Cannot delete {}",
                name.as_str()
            ))),
            Trap::Set { value, .. }
            | Trap::Define {
                property: jig_realm::Property { value, .. },
                ..
            } => {
                {
                    let mut store = self.bindings.store_mut();
                    let network = store.active_network().to_owned();
                    store.entry(&network, proxy).assign(name, &value)?;
                    store.project(cx.realm, proxy)?;
                }
                if let Some(record) = &self.record {
                    record.write(proxy);
                }
                debug!(%proxy, binding = name.as_str(), "binding assigned");
                Ok(TrapOutcome::Done)
            },
            other => next.run(cx, other),
        }
    }
}
