//! Common imports.
//!
//! ```
//! use jig_config::prelude::*;
//! ```

// Errors
pub use crate::{ConfigError, ConfigResult};

// Types
pub use crate::{Config, EvaluatorKind};
