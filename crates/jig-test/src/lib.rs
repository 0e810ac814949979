//! Jig Test - shared test utilities for the jig runtime.
//!
//! Add to a crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! jig-test.workspace = true
//! ```
//!
//! Then, in an integration test:
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use jig_kernel::Kernel;
//! use jig_test::{MockLedger, fixtures};
//!
//! #[tokio::test]
//! async fn test_deploy() {
//!     let ledger = Arc::new(MockLedger::new());
//!     let mut kernel = Kernel::with_ledger(ledger.clone());
//!     let code = kernel.install(fixtures::COUNTER).unwrap();
//!     kernel.deploy(&code).unwrap();
//!     kernel.sync().await.unwrap();
//!     assert_eq!(ledger.len(), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod fixtures;
pub mod ledger;
pub mod logging;

pub use ledger::{MockLedger, txid_of};
pub use logging::init_test_logging;
