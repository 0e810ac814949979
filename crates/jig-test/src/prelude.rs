//! Common test imports.

pub use crate::fixtures;
pub use crate::{MockLedger, init_test_logging, txid_of};
