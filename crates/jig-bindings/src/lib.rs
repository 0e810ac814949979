//! Jig Bindings - where jigs live on the ledger.
//!
//! Each jig and code object carries five tracked properties: `location`,
//! `origin`, `nonce`, `owner`, and `satoshis`. This crate owns their values
//! and the lifecycle that moves them:
//!
//! ```text
//! Unsaved -> Pending (temporary location, inside a Batch)
//!          -> Confirmed (txid_oN)
//!          -> Errored (error://reason, terminal)
//! ```
//!
//! Values are kept per network in a [`BindingStore`]. The
//! [`BindingsInterceptor`] guards the names on the membrane, and a
//! [`Batch`] settles a group of pending objects together.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod batch;
mod binding;
mod error;
mod layer;
mod location;
mod store;

pub use batch::Batch;
pub use binding::{Binding, BindingName, BindingSet, LifecycleState};
pub use error::{BindingError, BindingResult};
pub use layer::BindingsInterceptor;
pub use location::{Category, ERROR_PREFIX, Location, TempKind};
pub use store::{BindingStore, Bindings};

#[cfg(test)]
mod tests;
