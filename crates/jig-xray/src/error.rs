//! Xray error types.

use jig_realm::RealmError;
use thiserror::Error;

use crate::scanner::Purpose;

/// Errors raised while scanning, cloning, or (de)serializing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum XrayError {
    /// No scanner accepted a value. Names the deepest offending value.
    #[error("Cannot {purpose} {culprit} at {path}: {reason}")]
    Rejected {
        /// Operation that was refused.
        purpose: Purpose,
        /// The offending value and, where known, its runtime type.
        culprit: String,
        /// Where the value sits, starting at `value`.
        path: String,
        /// Why it was refused.
        reason: String,
    },

    /// A JSON document is not a well-formed node.
    #[error("Invalid node: {0}")]
    InvalidNode(String),

    /// A `$dedup` table is malformed.
    #[error("Invalid dedup table: {0}")]
    Dedup(String),

    /// A token hook failed.
    #[error("{0}")]
    Token(String),

    /// Realm failure while reading or building objects.
    #[error(transparent)]
    Realm(#[from] RealmError),
}

/// Result type for Xray operations.
pub type XrayResult<T> = Result<T, XrayError>;

impl From<XrayError> for RealmError {
    fn from(err: XrayError) -> Self {
        match err {
            XrayError::Realm(inner) => inner,
            other => Self::Type(other.to_string()),
        }
    }
}
