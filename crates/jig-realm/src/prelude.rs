//! Prelude module - commonly used types for convenient import.
//!
//! Use `use jig_realm::prelude::*;` to import all essential types.

// Errors
pub use crate::{RealmError, RealmResult};

// Values and the realm
pub use crate::{ObjectId, Realm, RealmLimits, Value};

// Evaluation
pub use crate::{DirectEvaluator, Evaluation, Evaluator, GlobalsHandle, SandboxEvaluator};

// Proxy seam
pub use crate::{AccessMode, Frame, IntrinsicAccess, ProxyHandler, Trap, TrapOutcome};
