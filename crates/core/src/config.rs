//! Environment-variable parsing shared by the `from_env` constructors.

use std::str::FromStr;
use std::time::Duration;

/// A configuration value that failed to parse.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} has invalid value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Read `key`, falling back to `default` when unset or empty.
pub fn env_or<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
                key,
                value: raw,
                reason: e.to_string(),
            })
        }
        _ => Ok(default),
    }
}

/// Read a whole-second duration.
pub fn env_secs(key: &'static str, default_secs: u64) -> Result<Duration, ConfigError> {
    env_or(key, default_secs).map(Duration::from_secs)
}

/// Read a millisecond duration.
pub fn env_millis(key: &'static str, default_ms: u64) -> Result<Duration, ConfigError> {
    env_or(key, default_ms).map(Duration::from_millis)
}

/// Read an optional string, treating empty values as unset.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
