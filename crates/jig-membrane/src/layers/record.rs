//! Read/write recording.

use jig_realm::{RealmError, RealmResult, Trap, TrapOutcome, Value};

use crate::chain::{Interceptor, Next, TrapContext};
use crate::record::Record;

/// Message for mutations attempted outside any method body.
pub const OUTSIDE_METHOD: &str = "Updates must be performed in a method";

/// Attributes every operation to its owner in the current [`Record`].
///
/// Calling a function with a jig or code proxy as `this` enters a method of
/// that jig for the duration of the call.
#[derive(Debug, Clone)]
pub struct RecordLayer {
    record: Record,
}

impl RecordLayer {
    /// Layer writing into `record`.
    #[must_use]
    pub fn new(record: Record) -> Self {
        Self { record }
    }
}

impl Interceptor for RecordLayer {
    fn name(&self) -> &'static str {
        "record"
    }

    fn intercept(&self, cx: &mut TrapContext<'_>, trap: Trap, next: Next<'_>) -> RealmResult<TrapOutcome> {
        let owner = cx.owner();
        if trap.is_write() {
            if self.record.depth() == 0 {
                return Err(RealmError::capability(OUTSIDE_METHOD));
            }
            self.record.write(owner);
            return next.run(cx, trap);
        }

        self.record.read(owner);
        let method_of = match &trap {
            Trap::Apply {
                this: Value::Object(this),
                ..
            } if cx.registry.borrow().is_token(*this) => Some(*this),
            _ => None,
        };
        let Some(jig) = method_of else {
            return next.run(cx, trap);
        };
        self.record.push(jig);
        self.record.read(jig);
        let result = next.run(cx, trap);
        self.record.pop();
        result
    }
}
