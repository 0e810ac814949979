//! Jig Telemetry - logging for the jig runtime.
//!
//! Every jig crate logs through `tracing`. This crate installs the
//! subscriber from the `[logging]` section of a jig config: a level filter
//! with per-crate directives, one of four output formats, and a sink.
//!
//! # Example
//!
//! ```rust,no_run
//! use jig_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), jig_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Json)
//!     .with_directive("jig_kernel=debug");
//! setup_logging(&config)?;
//! tracing::info!("kernel starting");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, LogSink, setup_from_section, setup_logging};
