//! Tracing subscriber setup.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding a filter directive that overrides the
/// configured level, e.g. `RAILGUARD_LOG=railguard=debug`.
pub const LOG_ENV: &str = "RAILGUARD_LOG";

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// Newline-delimited JSON.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RAILGUARD_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
    /// Colored output, text format only.
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            ansi: true,
        }
    }
}

impl LoggingConfig {
    /// Sets the level directive.
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Sets the output format.
    #[must_use]
    pub const fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Builds the filter: `RAILGUARD_LOG` first, then the configured level.
    pub fn env_filter(&self) -> Result<EnvFilter, ConfigError> {
        if let Ok(directive) = std::env::var(LOG_ENV) {
            if let Ok(filter) = EnvFilter::try_new(&directive) {
                return Ok(filter);
            }
        }
        EnvFilter::try_new(&self.level)
            .map_err(|e| ConfigError::Logging(format!("invalid level '{}': {e}", self.level)))
    }
}

/// Installs the global tracing subscriber.
///
/// Fails if a global subscriber is already set.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), ConfigError> {
    let filter = config.env_filter()?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_ansi(config.ansi))
            .try_init(),
    };

    installed.map_err(|e| ConfigError::Logging(e.to_string()))
}
