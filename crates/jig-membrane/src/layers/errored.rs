//! Terminal error state.

use std::rc::Rc;

use jig_realm::{ObjectId, Realm, RealmError, RealmResult, Trap, TrapOutcome};

use crate::chain::{Interceptor, Next, TrapContext};

/// Names that stay readable on an errored object so the failure can be
/// reported.
pub const INTROSPECTION_KEYS: &[&str] = &["location", "origin", "nonce"];

/// Tells the errored layer whether an owner's location is an error marker.
pub trait ErrorSource {
    /// The stored failure reason, if `owner` is errored.
    fn error_reason(&self, realm: &Realm, owner: ObjectId) -> Option<String>;
}

/// Once an owner is errored, every operation on it or its inner objects
/// fails with the stored reason. Before the owner has any location this
/// layer does nothing.
#[derive(Clone)]
pub struct ErroredLayer {
    source: Rc<dyn ErrorSource>,
}

impl ErroredLayer {
    /// Layer consulting `source`.
    #[must_use]
    pub fn new(source: Rc<dyn ErrorSource>) -> Self {
        Self { source }
    }
}

impl std::fmt::Debug for ErroredLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErroredLayer").finish_non_exhaustive()
    }
}

impl Interceptor for ErroredLayer {
    fn name(&self) -> &'static str {
        "errored"
    }

    fn intercept(&self, cx: &mut TrapContext<'_>, trap: Trap, next: Next<'_>) -> RealmResult<TrapOutcome> {
        let owner = cx.owner();
        if let Some(reason) = self.source.error_reason(cx.realm, owner) {
            let introspection = cx.is_token()
                && matches!(&trap, Trap::Get { key } if INTROSPECTION_KEYS.contains(&key.as_str()));
            if !introspection {
                return Err(RealmError::Terminal(reason));
            }
        }
        next.run(cx, trap)
    }
}
