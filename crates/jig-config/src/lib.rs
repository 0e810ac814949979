//! Jig Config - layered configuration for the jig runtime.
//!
//! An embedded `defaults.toml` supplies every value; a single TOML file is
//! merged on top. `JIG_NETWORK` and `JIG_LOG_LEVEL` fill `network.name` and
//! `logging.level` only when the file leaves them out.
//!
//! ```
//! use jig_config::Config;
//!
//! let config = Config::from_toml_str("[realm]\nmax_steps = 500\n").unwrap();
//! assert_eq!(config.realm.max_steps, 500);
//! assert_eq!(config.network.name, "mock");
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod loader;
mod types;
mod validate;

use std::path::Path;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ENV_FALLBACKS, load_str};
pub use types::{Config, EvaluatorKind, LoggingSection, NetworkSection, RealmSection, XraySection};
pub use validate::validate;

impl Config {
    /// Load `path` over the embedded defaults.
    ///
    /// # Errors
    ///
    /// See [`ConfigError`].
    pub fn load_file(path: &Path) -> ConfigResult<Self> {
        loader::load_file(path)
    }

    /// Parse TOML text over the embedded defaults, ignoring the environment.
    ///
    /// # Errors
    ///
    /// See [`ConfigError`].
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        loader::from_toml_str(text)
    }
}
