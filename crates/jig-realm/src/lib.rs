//! Jig Realm - deterministic restricted evaluator for jig code.
//!
//! This crate provides:
//! - A purpose-built interpreter for a small class/function language
//! - An arena heap with stable object ids
//! - A proxy seam through which every object operation can be intercepted
//! - Deterministic built-ins and two evaluator strategies
//!
//! # Determinism
//!
//! The sandboxed evaluator exposes no clock, randomness, timers, or I/O.
//! Key enumeration follows insertion order, sorting is stable, and JSON
//! output has sorted keys. Runaway code hits a step or call depth limit
//! instead of hanging.
//!
//! # Example
//!
//! ```
//! use jig_realm::{Evaluator, Realm, SandboxEvaluator, Value};
//!
//! let mut realm = Realm::default();
//! let code = "class Counter { constructor() { this.n = 0 } inc() { this.n += 1 } }";
//! let counter = SandboxEvaluator.evaluate(&mut realm, code, None).unwrap().result;
//!
//! let instance = realm.construct(&counter, &[]).unwrap();
//! let inc = realm.get(&instance, "inc").unwrap();
//! realm.call(&inc, instance.clone(), &[]).unwrap();
//! assert_eq!(realm.get(&instance, "n").unwrap(), Value::Number(1.0));
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
// Numeric conversions follow the language's double semantics.
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::arithmetic_side_effects
)]

pub mod prelude;

pub mod ast;
pub mod determinism;
mod error;
pub mod evaluator;
pub mod heap;
mod interp;
mod intrinsics;
mod lexer;
mod parser;
pub mod proxy;
pub mod realm;
pub mod scope;
pub mod value;

pub use error::{RealmError, RealmResult};
pub use evaluator::{
    DirectEvaluator, Evaluation, Evaluator, GLOBALS_CHANNEL, SandboxEvaluator, evaluate_value,
};
pub use heap::{FunctionKind, HeapObject, NativeFn, ObjectKind, Property};
pub use interp::{ANONYMOUS_CLASS, ANONYMOUS_FUNCTION};
pub use proxy::{IntrinsicAccess, ProxyHandler, Trap, TrapOutcome};
pub use realm::{AccessMode, Frame, Realm, RealmLimits};
pub use scope::{GlobalsHandle, Scope, ScopeRef};
pub use value::{ObjectId, Value};
