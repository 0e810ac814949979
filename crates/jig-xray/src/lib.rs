//! Jig Xray - canonical serialization of jig object graphs.
//!
//! Xray walks a realm's object graph and turns it into JSON that every
//! party produces identically: keys are sorted, non-JSON values use tagged
//! objects (see [`Node`]), and shared or cyclic structure is written once
//! into a `$dedup` table.
//!
//! Values are classified by an ordered list of [`Scanner`]s. Jigs and code
//! are not inlined but saved as locations through a [`TokenSaver`] and
//! loaded back through a [`TokenLoader`].
//!
//! # Example
//!
//! ```
//! use jig_realm::{Realm, Value};
//! use jig_xray::Xray;
//!
//! let mut realm = Realm::default();
//! let list = realm.new_array(vec![Value::Number(1.0), Value::Undefined]);
//! let json = Xray::new().serialize(&realm, &Value::Object(list)).unwrap();
//! assert_eq!(json.to_string(), r#"[1,{"$undef":1}]"#);
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod checkpoint;
mod clone;
mod deserialize;
mod error;
mod node;
mod scanner;
mod serialize;
mod token;
mod xray;

pub use checkpoint::Checkpoint;
pub use error::{XrayError, XrayResult};
pub use node::{Node, Props, is_json_safe};
pub use scanner::{Purpose, SCANNERS, Scanner, Verdict};
pub use token::{Deployer, TokenLoader, TokenSaver};
pub use xray::{Discovered, Xray};

#[cfg(test)]
mod tests;
