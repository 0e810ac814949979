//! Encapsulation of `_`-prefixed properties.

use jig_realm::heap::ObjectKind;
use jig_realm::{ObjectId, Realm, RealmError, RealmResult, Trap, TrapOutcome};

use crate::chain::{Interceptor, Next, TrapContext};

/// Prefix that marks a property as private.
pub const PRIVATE_PREFIX: char = '_';

/// Whether `key` names a private property.
#[must_use]
pub fn is_private(key: &str) -> bool {
    key.starts_with(PRIVATE_PREFIX)
}

/// Private names are reachable only from code of the owning class: its
/// static methods, its instance methods, and its constructor. Key
/// enumeration hides them from everyone else instead of failing.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrivateLayer;

impl PrivateLayer {
    fn allowed(realm: &Realm, owner: ObjectId) -> bool {
        let Some(accessor) = realm.current_frame().and_then(|f| f.class) else {
            return false;
        };
        let mut class = realm.owner_class(owner);
        while let Some(c) = class {
            if c == accessor {
                return true;
            }
            class = match realm.object(c).map(|o| &o.kind) {
                Ok(ObjectKind::Class(obj)) => obj.parent,
                _ => None,
            };
        }
        false
    }
}

impl Interceptor for PrivateLayer {
    fn name(&self) -> &'static str {
        "private"
    }

    fn intercept(&self, cx: &mut TrapContext<'_>, trap: Trap, next: Next<'_>) -> RealmResult<TrapOutcome> {
        let owner = cx.owner();
        if matches!(trap, Trap::OwnKeys) {
            let keys = next.run(cx, trap)?.into_keys()?;
            if Self::allowed(cx.realm, owner) {
                return Ok(TrapOutcome::Keys(keys));
            }
            return Ok(TrapOutcome::Keys(
                keys.into_iter().filter(|k| !is_private(k)).collect(),
            ));
        }
        if let Some(key) = trap.key().filter(|k| is_private(k)) {
            if !Self::allowed(cx.realm, owner) {
                let verb = match &trap {
                    Trap::Set { .. } | Trap::Define { .. } => "set",
                    Trap::Delete { .. } => "delete",
                    Trap::Has { .. } => "check",
                    _ => "access",
                };
                return Err(RealmError::capability(format!(
                    "Cannot {verb} private property {key}"
                )));
            }
        }
        next.run(cx, trap)
    }
}
