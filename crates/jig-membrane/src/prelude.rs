//! Prelude module - commonly used types for convenient import.
//!
//! Use `use jig_membrane::prelude::*;` to import all essential types.

// Errors
pub use crate::{MembraneError, MembraneResult};

// Chains
pub use crate::{Interceptor, Membrane, MembraneBuilder, Next, TrapContext};

// Layers
pub use crate::{ErrorSource, Record};

// Identity
pub use crate::{ProxyKind, Registry, SharedRegistry};
