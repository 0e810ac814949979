//! Jig Membrane - capability membranes for jig objects.
//!
//! Every code object, jig instance, and inner object is reached through a
//! proxy whose handler is a [`Membrane`]: an ordered chain of
//! [`Interceptor`] layers.
//!
//! # Layers
//!
//! The standard chain, outermost first:
//!
//! 1. [`AdminLayer`] - privileged runtime code goes straight to the target
//! 2. [`ErroredLayer`] - objects whose location is an error marker refuse work
//! 3. A bindings layer (see `jig-bindings`), when present
//! 4. [`PrivateLayer`] - `_`-prefixed names stay inside their class
//! 5. [`RecordLayer`] - reads and writes are attributed to the running action
//! 6. [`IntrinsicLayer`] - sets, maps, and byte arrays work through proxies
//! 7. [`BaseLayer`] - the operation itself
//!
//! Identities are tracked by a [`Registry`]; a target can be wrapped once.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod builder;
mod chain;
mod error;
pub mod layers;
mod record;
mod registry;

pub use builder::MembraneBuilder;
pub use chain::{Interceptor, Membrane, Next, TrapContext};
pub use error::{MembraneError, MembraneResult};
pub use layers::{
    AdminLayer, BaseLayer, ErroredLayer, INTROSPECTION_KEYS, IntrinsicLayer, ErrorSource,
    OUTSIDE_METHOD, PrivateLayer, RecordLayer, is_private,
};
pub use record::Record;
pub use registry::{Entry, ProxyKind, Registry, SharedRegistry};

#[cfg(test)]
mod tests;
