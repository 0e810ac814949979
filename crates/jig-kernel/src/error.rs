//! Kernel error types.
//!
//! Errors from the realm, the bindings, and the ledger are wrapped
//! transparently so their messages reach callers unchanged.

use jig_bindings::BindingError;
use jig_membrane::MembraneError;
use jig_realm::RealmError;
use jig_xray::XrayError;
use thiserror::Error;

use crate::ledger::LedgerError;

/// Errors raised by kernel operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum KernelError {
    /// Evaluation or execution failed.
    #[error(transparent)]
    Realm(#[from] RealmError),

    /// A membrane could not be built.
    #[error(transparent)]
    Membrane(#[from] MembraneError),

    /// Binding bookkeeping failed.
    #[error(transparent)]
    Binding(#[from] BindingError),

    /// A value could not be serialized or rebuilt.
    #[error(transparent)]
    Xray(#[from] XrayError),

    /// The ledger refused or could not answer.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// A batch is already open or awaiting sync.
    #[error("A batch is already in progress")]
    BatchInProgress,

    /// `end` or `sync` without a matching open batch.
    #[error("No batch is open")]
    NoBatch,

    /// `sync` while the batch still accepts members.
    #[error("Batch must be ended before sync")]
    BatchOpen,

    /// The value is not a class or function.
    #[error("Not deployable: {0}")]
    NotCode(String),

    /// A fetched transaction does not hold what was asked for.
    #[error("Nothing to load at {0}")]
    NotFound(String),

    /// A fetched transaction cannot be replayed.
    #[error("Invalid transaction {txid}: {reason}")]
    InvalidTransaction {
        /// The transaction.
        txid: String,
        /// What is wrong with it.
        reason: String,
    },
}

/// Result type for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;
