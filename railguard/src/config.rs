//! Loadable guard settings.
//!
//! Settings cover the plain-data part of a guard (retry policy, overall
//! timeout, schema strictness). They are read from JSON and may be
//! overridden from `RAILGUARD_*` environment variables, then applied to a
//! [`GuardBuilder`](crate::pipeline::GuardBuilder) with `with_settings`.
//! Validation happens when the guard is built.

use crate::errors::ConfigError;
use crate::pipeline::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable overriding `retry.max_attempts`.
pub const ENV_MAX_ATTEMPTS: &str = "RAILGUARD_MAX_ATTEMPTS";
/// Environment variable overriding `retry.initial_delay_ms`.
pub const ENV_INITIAL_DELAY_MS: &str = "RAILGUARD_INITIAL_DELAY_MS";
/// Environment variable overriding `retry.max_delay_ms`.
pub const ENV_MAX_DELAY_MS: &str = "RAILGUARD_MAX_DELAY_MS";
/// Environment variable overriding `timeout_ms`.
pub const ENV_TIMEOUT_MS: &str = "RAILGUARD_TIMEOUT_MS";
/// Environment variable overriding `strict_schema`.
pub const ENV_STRICT_SCHEMA: &str = "RAILGUARD_STRICT_SCHEMA";

/// Serializable guard settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardSettings {
    /// Retry policy.
    pub retry: RetryPolicy,
    /// Overall run timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Whether schema decoding rejects unknown fields.
    pub strict_schema: bool,
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            timeout_ms: None,
            strict_schema: true,
        }
    }
}

impl GuardSettings {
    /// Parses settings from a JSON string. Missing keys take defaults.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Reads settings from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::SettingsIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Default settings with environment overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env()
    }

    /// Applies overrides from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Applies overrides from an arbitrary variable lookup.
    ///
    /// An empty `RAILGUARD_TIMEOUT_MS` clears the timeout.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_MAX_ATTEMPTS) {
            self.retry.max_attempts = parse_var(ENV_MAX_ATTEMPTS, &value)?;
        }
        if let Some(value) = lookup(ENV_INITIAL_DELAY_MS) {
            self.retry.initial_delay_ms = parse_var(ENV_INITIAL_DELAY_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_DELAY_MS) {
            self.retry.max_delay_ms = parse_var(ENV_MAX_DELAY_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_TIMEOUT_MS) {
            self.timeout_ms = if value.trim().is_empty() {
                None
            } else {
                Some(parse_var(ENV_TIMEOUT_MS, &value)?)
            };
        }
        if let Some(value) = lookup(ENV_STRICT_SCHEMA) {
            self.strict_schema = parse_bool(ENV_STRICT_SCHEMA, &value)?;
        }
        Ok(self)
    }

    /// Returns the overall timeout.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

fn parse_var<T: FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        var: var.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            var: var.to_string(),
            value: value.to_string(),
        }),
    }
}
