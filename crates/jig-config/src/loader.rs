//! Config loading.
//!
//! 1. Parse the embedded `defaults.toml`
//! 2. Merge the file on top, table by table
//! 3. Fill `network.name` and `logging.level` from `JIG_NETWORK` and
//!    `JIG_LOG_LEVEL` when the file leaves them unset
//! 4. Deserialize and validate

use std::path::Path;

use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Environment fallbacks: variable, table, key.
pub const ENV_FALLBACKS: &[(&str, &str, &str)] = &[
    ("JIG_NETWORK", "network", "name"),
    ("JIG_LOG_LEVEL", "logging", "level"),
];

/// Load a single file over the defaults, reading the process environment.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read, parsed, or fails
/// validation.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
        path: path.display().to_string(),
        source,
    })?;
    let config = load_str(&text, &path.display().to_string(), |var| std::env::var(var).ok())?;
    info!(path = %path.display(), network = %config.network.name, "loaded config");
    Ok(config)
}

/// Parse `text` over the defaults without consulting the environment.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the text does not parse or fails validation.
pub fn from_toml_str(text: &str) -> ConfigResult<Config> {
    load_str(text, "<string>", |_| None)
}

/// Parse `text` over the defaults, resolving fallbacks through `env`.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the text does not parse or fails validation.
pub fn load_str(
    text: &str,
    origin: &str,
    env: impl Fn(&str) -> Option<String>,
) -> ConfigResult<Config> {
    let mut merged: toml::Value = parse(DEFAULTS_TOML, "<embedded defaults>")?;
    let overlay: toml::Value = parse(text, origin)?;

    for (var, table, key) in ENV_FALLBACKS {
        let set_in_file = overlay
            .get(table)
            .and_then(|t| t.get(key))
            .is_some();
        if set_in_file {
            continue;
        }
        if let Some(value) = env(var) {
            debug!(var, "applying environment fallback");
            if let Some(section) = merged.get_mut(table).and_then(toml::Value::as_table_mut) {
                section.insert((*key).to_owned(), toml::Value::String(value));
            }
        }
    }
    deep_merge(&mut merged, overlay);

    let config: Config = merged.try_into().map_err(|source| ConfigError::ParseError {
        path: origin.to_owned(),
        source,
    })?;
    validate::validate(&config)?;
    Ok(config)
}

fn parse(text: &str, origin: &str) -> ConfigResult<toml::Value> {
    toml::from_str(text).map_err(|source| ConfigError::ParseError {
        path: origin.to_owned(),
        source,
    })
}

/// Merge `overlay` into `base`. Tables merge key by key; anything else
/// replaces.
fn deep_merge(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base.insert(key, value);
                    },
                }
            }
        },
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EvaluatorKind;

    #[test]
    fn test_empty_text_yields_defaults() {
        let config = from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = from_toml_str("[realm]\nmax_steps = 50\n[network]\nname = \"test\"\n").unwrap();
        assert_eq!(config.realm.max_steps, 50);
        assert_eq!(config.realm.max_call_depth, 256);
        assert_eq!(config.realm.evaluator, EvaluatorKind::Sandbox);
        assert_eq!(config.network.name, "test");
    }

    #[test]
    fn test_env_is_a_fallback_only() {
        let env = |var: &str| match var {
            "JIG_NETWORK" => Some("main".to_owned()),
            "JIG_LOG_LEVEL" => Some("debug".to_owned()),
            _ => None,
        };
        let config = load_str("[network]\nname = \"test\"\n", "inline", env).unwrap();
        assert_eq!(config.network.name, "test");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_load_file_and_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jig.toml");
        std::fs::write(&path, "[xray]\nallow_arbitrary = false\n").unwrap();
        assert!(!load_file(&path).unwrap().xray.allow_arbitrary);

        std::fs::write(&path, "[realm\n").unwrap();
        assert!(matches!(load_file(&path), Err(ConfigError::ParseError { .. })));
        assert!(matches!(
            load_file(&dir.path().join("missing.toml")),
            Err(ConfigError::ReadError { .. })
        ));
    }
}
