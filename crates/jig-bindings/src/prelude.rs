//! Prelude module - commonly used types for convenient import.
//!
//! Use `use jig_bindings::prelude::*;` to import all essential types.

// Errors
pub use crate::{BindingError, BindingResult};

// Values
pub use crate::{Binding, BindingName, BindingSet, LifecycleState, Location, TempKind};

// Bookkeeping
pub use crate::{Batch, BindingStore, Bindings, BindingsInterceptor};
