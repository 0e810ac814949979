//! Membrane error types.

use jig_realm::{ObjectId, RealmError};
use thiserror::Error;

/// Errors raised while building or registering membranes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MembraneError {
    /// A membrane already exists for the target.
    #[error("Multiple proxies for {target}")]
    DuplicateProxy {
        /// The target that is already wrapped.
        target: ObjectId,
    },

    /// The id is not a registered proxy.
    #[error("unknown proxy {0}")]
    UnknownProxy(ObjectId),

    /// The id is already registered as a proxy.
    #[error("{0} is already a proxy")]
    AlreadyProxy(ObjectId),
}

/// Result type for membrane operations.
pub type MembraneResult<T> = Result<T, MembraneError>;

impl From<MembraneError> for RealmError {
    fn from(err: MembraneError) -> Self {
        Self::Internal(err.to_string())
    }
}
