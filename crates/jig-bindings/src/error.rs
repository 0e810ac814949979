//! Binding error types.

use jig_realm::RealmError;
use thiserror::Error;

/// Errors raised by binding bookkeeping.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BindingError {
    /// A location string does not follow the grammar.
    #[error("Bad location: {0}")]
    InvalidLocation(String),

    /// The batch no longer accepts new members.
    #[error("batch is closed")]
    BatchClosed,

    /// The object is in the terminal error state.
    #[error("{0}")]
    Errored(String),

    /// Realm failure while projecting bindings.
    #[error(transparent)]
    Realm(#[from] RealmError),
}

/// Result type for binding operations.
pub type BindingResult<T> = Result<T, BindingError>;
