//! Default behaviour at the bottom of every chain.

use jig_realm::heap::ObjectKind;
use jig_realm::{RealmResult, Trap, TrapOutcome, Value};
use tracing::debug;

use crate::chain::{Interceptor, Next, TrapContext};
use crate::record::Record;
use crate::registry::ProxyKind;

/// Performs the operation on the target.
///
/// Objects read out of a guarded object come back wrapped in the same chain,
/// so nothing reachable from a jig escapes its membrane. Constructing through
/// a code proxy yields a jig proxy whose constructor runs as one of its
/// methods.
#[derive(Debug, Clone, Default)]
pub struct BaseLayer {
    record: Option<Record>,
}

impl BaseLayer {
    /// Base layer that reports constructed jigs to `record`.
    #[must_use]
    pub fn new(record: Option<Record>) -> Self {
        Self { record }
    }

    fn wrap_value(cx: &mut TrapContext<'_>, value: Value) -> RealmResult<Value> {
        let Value::Object(id) = value else {
            return Ok(value);
        };
        if cx.realm.is_proxy(id) {
            return Ok(value);
        }
        if let Some(proxy) = cx.registry.borrow().lookup_proxy(id) {
            return Ok(Value::Object(proxy));
        }
        let owner = match &cx.realm.object(id)?.kind {
            // Built-ins and unregistered classes are shared, not owned.
            ObjectKind::Native(_) | ObjectKind::Class(_) => return Ok(value),
            // Methods belong to the code that declared them.
            ObjectKind::Function(f) => f
                .home
                .and_then(|home| cx.registry.borrow().lookup_proxy(home))
                .unwrap_or_else(|| cx.owner()),
            _ => cx.owner(),
        };
        let proxy = cx.wrap(id, ProxyKind::Inner { owner })?;
        Ok(Value::Object(proxy))
    }

    fn construct_jig(&self, cx: &mut TrapContext<'_>, args: &[Value]) -> RealmResult<TrapOutcome> {
        let instance = cx.realm.allocate_instance(cx.target)?;
        let jig = cx.wrap(instance, ProxyKind::Jig)?;
        debug!(code = %cx.proxy, %jig, "constructing jig");
        if let Some(record) = &self.record {
            record.create(jig);
            record.push(jig);
        }
        let result = cx.realm.run_constructor(cx.target, Value::Object(jig), args);
        if let Some(record) = &self.record {
            record.pop();
        }
        result.map(|()| TrapOutcome::Value(Value::Object(jig)))
    }

    fn is_code_class(cx: &TrapContext<'_>) -> bool {
        cx.kind() == Some(ProxyKind::Code)
            && matches!(cx.realm.object(cx.target).map(|o| &o.kind), Ok(ObjectKind::Class(_)))
    }
}

impl Interceptor for BaseLayer {
    fn name(&self) -> &'static str {
        "base"
    }

    fn intercept(&self, cx: &mut TrapContext<'_>, trap: Trap, _next: Next<'_>) -> RealmResult<TrapOutcome> {
        match trap {
            Trap::Get { key } => {
                let value = cx.realm.raw_get(cx.target, &key)?;
                Self::wrap_value(cx, value).map(TrapOutcome::Value)
            },
            Trap::Construct { args } if Self::is_code_class(cx) => self.construct_jig(cx, &args),
            other => cx.realm.raw_trap(cx.target, other),
        }
    }
}

