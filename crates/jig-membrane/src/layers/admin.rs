//! Privileged bypass.

use jig_realm::{RealmResult, Trap, TrapOutcome};

use crate::chain::{Interceptor, Next, TrapContext};

/// While the realm is in admin mode every operation runs directly against
/// the target and no later layer sees it.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdminLayer;

impl Interceptor for AdminLayer {
    fn name(&self) -> &'static str {
        "admin"
    }

    fn intercept(&self, cx: &mut TrapContext<'_>, trap: Trap, next: Next<'_>) -> RealmResult<TrapOutcome> {
        if cx.realm.is_admin() {
            return cx.realm.raw_trap(cx.target, trap);
        }
        next.run(cx, trap)
    }
}
