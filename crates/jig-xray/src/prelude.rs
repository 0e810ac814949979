//! Prelude module - commonly used types for convenient import.
//!
//! Use `use jig_xray::prelude::*;` to import all essential types.

// Errors
pub use crate::{XrayError, XrayResult};

// Serialization
pub use crate::{Checkpoint, Node, Xray};

// Hooks
pub use crate::{Deployer, TokenLoader, TokenSaver};
