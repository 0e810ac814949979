//! Post-merge validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];
const LOG_FORMATS: &[&str] = &["pretty", "compact", "json", "full"];
const MAX_CALL_DEPTH: usize = 4096;

/// Reject values that parse but cannot drive a kernel.
///
/// # Errors
///
/// Returns [`ConfigError::ValidationError`] naming the first bad field.
pub fn validate(config: &Config) -> ConfigResult<()> {
    if config.network.name.trim().is_empty() {
        return Err(invalid("network.name", "must not be empty"));
    }
    if config.realm.max_steps == 0 {
        return Err(invalid("realm.max_steps", "must be greater than zero"));
    }
    if config.realm.max_call_depth == 0 || config.realm.max_call_depth > MAX_CALL_DEPTH {
        return Err(invalid(
            "realm.max_call_depth",
            &format!("must be between 1 and {MAX_CALL_DEPTH}"),
        ));
    }
    let level = config.logging.level.to_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        return Err(invalid(
            "logging.level",
            &format!("expected one of {}", LOG_LEVELS.join(", ")),
        ));
    }
    if !LOG_FORMATS.contains(&config.logging.format.as_str()) {
        return Err(invalid(
            "logging.format",
            &format!("expected one of {}", LOG_FORMATS.join(", ")),
        ));
    }
    Ok(())
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(config: &Config) -> String {
        match validate(config) {
            Err(ConfigError::ValidationError { field, .. }) => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_bad_fields_are_named() {
        let mut config = Config::default();
        config.network.name = "  ".to_owned();
        assert_eq!(field_of(&config), "network.name");

        let mut config = Config::default();
        config.realm.max_steps = 0;
        assert_eq!(field_of(&config), "realm.max_steps");

        let mut config = Config::default();
        config.realm.max_call_depth = 10_000;
        assert_eq!(field_of(&config), "realm.max_call_depth");

        let mut config = Config::default();
        config.logging.level = "loud".to_owned();
        assert_eq!(field_of(&config), "logging.level");

        let mut config = Config::default();
        config.logging.format = "xml".to_owned();
        assert_eq!(field_of(&config), "logging.format");
    }

    #[test]
    fn test_level_is_case_insensitive() {
        let mut config = Config::default();
        config.logging.level = "DEBUG".to_owned();
        assert!(validate(&config).is_ok());
    }
}
