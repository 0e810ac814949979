//! Prelude module - commonly used types for convenient import.
//!
//! ```rust,no_run
//! use jig_telemetry::prelude::*;
//!
//! # fn main() -> TelemetryResult<()> {
//! setup_logging(&LogConfig::new("debug").with_format(LogFormat::Compact))?;
//! # Ok(())
//! # }
//! ```

// Errors
pub use crate::{TelemetryError, TelemetryResult};

// Logging configuration
pub use crate::{LogConfig, LogFormat, LogSink};

// Setup functions
pub use crate::{setup_from_section, setup_logging};
