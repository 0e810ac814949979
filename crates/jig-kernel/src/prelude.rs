//! Prelude module - commonly used types for convenient import.
//!
//! ```
//! use jig_kernel::prelude::*;
//! ```

// Errors
pub use crate::{KernelError, KernelResult, LedgerError, LedgerResult};

// Kernel
pub use crate::Kernel;

// Ledger
pub use crate::{Ledger, Output, Transaction, Utxo};
