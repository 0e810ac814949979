//! Realm error types.
//!
//! Messages are carried verbatim so callers can match on known substrings.

use thiserror::Error;

use crate::value::Value;

/// Errors raised while compiling or running code inside a realm.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RealmError {
    /// Bad arguments to `evaluate` (wrong code shape, bad env, reserved name).
    #[error("{0}")]
    Input(String),

    /// Source text could not be parsed.
    #[error("SyntaxError: {0}")]
    Syntax(String),

    /// A disallowed construct was used or an execution limit was exceeded.
    #[error("{0}")]
    Determinism(String),

    /// An identifier could not be resolved.
    #[error("{0}")]
    Reference(String),

    /// An operation was applied to a value of the wrong type.
    #[error("{0}")]
    Type(String),

    /// A numeric argument was out of range.
    #[error("RangeError: {0}")]
    Range(String),

    /// A value thrown by user code.
    #[error("{message}")]
    Thrown {
        /// Rendered message of the thrown value.
        message: String,
        /// The thrown value itself.
        value: Value,
    },

    /// Private property access, write-once binding violation, or a
    /// mutation outside a method body.
    #[error("{0}")]
    Capability(String),

    /// A binding is still pending confirmation.
    #[error("{0}")]
    Undetermined(String),

    /// The object is in a terminal error state.
    #[error("{0}")]
    Terminal(String),

    /// Violated internal invariant, such as an unknown object id.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RealmError {
    /// Build a type error from anything displayable.
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::Type(message.into())
    }

    /// Build a capability error from anything displayable.
    pub fn capability(message: impl Into<String>) -> Self {
        Self::Capability(message.into())
    }

    /// The user-visible message without any category prefix.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Thrown { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Result type for realm operations.
pub type RealmResult<T> = Result<T, RealmError>;
