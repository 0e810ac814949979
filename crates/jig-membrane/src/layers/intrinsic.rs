//! Built-in collection passthrough.

use jig_realm::heap::ObjectKind;
use jig_realm::{RealmResult, Trap, TrapOutcome};

use crate::chain::{Interceptor, Next, TrapContext};

/// Sets, maps, and byte arrays keep their contents in internal slots that
/// only the real object has. Built-in methods unwrap their receiver to the
/// target, and method lookups return the built-ins unwrapped.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntrinsicLayer;

impl Interceptor for IntrinsicLayer {
    fn name(&self) -> &'static str {
        "intrinsic"
    }

    fn intercept(&self, cx: &mut TrapContext<'_>, trap: Trap, next: Next<'_>) -> RealmResult<TrapOutcome> {
        let collection = matches!(
            cx.realm.object(cx.target).map(|o| &o.kind),
            Ok(ObjectKind::Set(_) | ObjectKind::Map(_) | ObjectKind::Bytes(_))
        );
        match trap {
            Trap::Unwrap { .. } => Ok(TrapOutcome::Target(cx.target)),
            Trap::Get { key } if collection => {
                let value = cx.realm.raw_get(cx.target, &key)?;
                let native = value
                    .as_object()
                    .is_some_and(|id| matches!(cx.realm.target_kind(id), Ok(ObjectKind::Native(_))));
                if native || !matches!(value, jig_realm::Value::Object(_)) {
                    return Ok(TrapOutcome::Value(value));
                }
                next.run(cx, Trap::Get { key })
            },
            other => next.run(cx, other),
        }
    }
}
