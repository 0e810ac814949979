//! Configuration types.
//!
//! Every section implements [`Default`] so a bare `[section]` header, or no
//! file at all, yields a working configuration.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which network new kernels publish to.
    pub network: NetworkSection,
    /// Evaluator choice and execution limits.
    pub realm: RealmSection,
    /// Serializer scanners.
    pub xray: XraySection,
    /// Log level, format, and per-crate directives.
    pub logging: LoggingSection,
}

/// Network selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSection {
    /// Network name, e.g. `"mock"`, `"test"`, `"main"`.
    pub name: String,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            name: "mock".to_owned(),
        }
    }
}

/// Evaluator strategy for code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluatorKind {
    /// Deterministic restricted realm.
    #[default]
    Sandbox,
    /// Host globals available; for debugging only.
    Direct,
}

/// Realm limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealmSection {
    /// Which evaluator installs code.
    pub evaluator: EvaluatorKind,
    /// Statements and loop iterations one realm may execute.
    pub max_steps: u64,
    /// Maximum nesting of user function calls.
    pub max_call_depth: usize,
}

impl Default for RealmSection {
    fn default() -> Self {
        Self {
            evaluator: EvaluatorKind::Sandbox,
            max_steps: 1_000_000,
            max_call_depth: 256,
        }
    }
}

/// Optional Xray scanners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct XraySection {
    /// Accept instances of deployed classes that are not jigs.
    pub allow_arbitrary: bool,
    /// Collect undeployed classes for deployment.
    pub allow_deployables: bool,
}

impl Default for XraySection {
    fn default() -> Self {
        Self {
            allow_arbitrary: true,
            allow_deployables: true,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Level filter (`error`, `warn`, `info`, `debug`, `trace`).
    pub level: String,
    /// `pretty`, `compact`, `json`, or `full`.
    pub format: String,
    /// Extra filter directives such as `jig_kernel=debug`.
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "pretty".to_owned(),
            directives: Vec::new(),
        }
    }
}
