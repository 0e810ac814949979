//! Jig Kernel - deploys code, publishes it through a ledger, and loads it
//! back.
//!
//! A [`Kernel`] owns one realm and the membrane chain every code and jig in
//! it is wrapped in. Deploying queues code into a batch with temporary
//! locations (`_d0`, `_d1`, ...), dependencies first. Syncing publishes the
//! batch as one [`Transaction`]; the ledger's txid settles every member at
//! `<txid>_o<index>`, and a ledger failure moves every member to the error
//! state. Calls and constructions that change jigs join the batch the same
//! way, as `_o<index>` outputs. Loading fetches a transaction, re-evaluates
//! its source and rebuilds its jigs.
//!
//! The [`Ledger`] is a trait; an in-memory implementation lives in
//! `jig-test`.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod action;
mod error;
mod kernel;
mod ledger;
mod load;
mod tokens;

pub use error::{KernelError, KernelResult};
pub use kernel::Kernel;
pub use ledger::{Ledger, LedgerError, LedgerResult, Output, Transaction, Utxo};
