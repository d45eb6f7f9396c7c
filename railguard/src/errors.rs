//! Error types for railguard.
//!
//! Two families live here:
//!
//! - [`GuardError`]: the single terminal failure a run can produce, one
//!   variant per pipeline stage plus cancellation and deadline conditions.
//! - [`ConfigError`]: construction-time failures raised while building a
//!   [`Guard`](crate::pipeline::Guard) or loading settings.
//!
//! Retry eligibility is decided by [`GuardError::is_retryable`].

use crate::cancellation::Cancelled;
use crate::contracts::SchemaError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error as StdError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Boxed error returned by injected collaborators (generators and checks).
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Stable tag identifying which kind of failure ended a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// An input-side check rejected the prompt.
    PreCheck,
    /// The generation client failed.
    Generation,
    /// An output-side check rejected the generated text.
    PostCheck,
    /// The generated text did not decode against the schema.
    Structural,
    /// Every allowed attempt failed.
    RetriesExhausted,
    /// The caller cancelled the run.
    Cancelled,
    /// The overall run timeout elapsed.
    DeadlineExceeded,
}

impl FailureKind {
    /// Returns the snake_case name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PreCheck => "pre_check",
            Self::Generation => "generation",
            Self::PostCheck => "post_check",
            Self::Structural => "structural",
            Self::RetriesExhausted => "retries_exhausted",
            Self::Cancelled => "cancelled",
            Self::DeadlineExceeded => "deadline_exceeded",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The terminal failure of a guarded run.
///
/// Stage variants keep their originating cause as the error source, so the
/// chain can be walked with [`std::error::Error::source`].
#[derive(Debug, Error)]
pub enum GuardError {
    /// A pre-check rejected the input. Never retried.
    #[error("Pre-check failed [{check}]: {source}")]
    PreCheck {
        /// Name of the rejecting check.
        check: String,
        /// The check's reason.
        source: BoxError,
    },

    /// The generation client returned an error.
    #[error("Generation failed: {source}")]
    Generation {
        /// The client's error.
        source: BoxError,
    },

    /// A post-check rejected the generated output.
    #[error("Post-check failed [{check}]: {source}")]
    PostCheck {
        /// Name of the rejecting check.
        check: String,
        /// The check's reason.
        source: BoxError,
    },

    /// The generated output did not match the configured schema.
    #[error("Structural validation failed: {source}")]
    Structural {
        /// The decode error.
        #[from]
        source: SchemaError,
    },

    /// All attempts were consumed without success.
    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: usize,
        /// The wrapped failure of the final attempt.
        #[source]
        last: Box<GuardError>,
    },

    /// The run was cancelled through its cancellation token.
    #[error("Run cancelled: {reason}")]
    Cancelled {
        /// The cancellation reason.
        reason: String,
    },

    /// The configured overall timeout elapsed.
    #[error("Run exceeded its deadline of {}ms", timeout.as_millis())]
    DeadlineExceeded {
        /// The configured timeout.
        timeout: Duration,
    },
}

impl GuardError {
    /// Creates a cancellation failure, falling back to a generic reason.
    #[must_use]
    pub fn cancelled(reason: Option<String>) -> Self {
        Self::Cancelled {
            reason: reason.unwrap_or_else(|| "cancelled".to_string()),
        }
    }

    /// Returns the kind tag of this failure.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::PreCheck { .. } => FailureKind::PreCheck,
            Self::Generation { .. } => FailureKind::Generation,
            Self::PostCheck { .. } => FailureKind::PostCheck,
            Self::Structural { .. } => FailureKind::Structural,
            Self::RetriesExhausted { .. } => FailureKind::RetriesExhausted,
            Self::Cancelled { .. } => FailureKind::Cancelled,
            Self::DeadlineExceeded { .. } => FailureKind::DeadlineExceeded,
        }
    }

    /// Decides whether another attempt may succeed where this one failed.
    ///
    /// Pre-check rejections are terminal: a retry would resubmit the same
    /// input. Cancellation and deadline conditions are terminal wherever
    /// they surface, including inside a collaborator's cause chain.
    /// Generation, post-check and structural failures are retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::PreCheck { .. }
            | Self::RetriesExhausted { .. }
            | Self::Cancelled { .. }
            | Self::DeadlineExceeded { .. } => false,
            Self::Generation { source } | Self::PostCheck { source, .. } => {
                !caused_by_cancellation(source.as_ref())
            }
            Self::Structural { .. } => true,
        }
    }

    /// Returns true for cancellation and deadline failures.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. } | Self::DeadlineExceeded { .. })
    }

    /// Returns the name of the check that failed, for check failures.
    #[must_use]
    pub fn check_name(&self) -> Option<&str> {
        match self {
            Self::PreCheck { check, .. } | Self::PostCheck { check, .. } => Some(check),
            _ => None,
        }
    }

    /// Returns the last attempt's failure when retries were exhausted.
    #[must_use]
    pub fn last_cause(&self) -> Option<&Self> {
        match self {
            Self::RetriesExhausted { last, .. } => Some(last),
            _ => None,
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!(self.kind()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map.insert("retryable".to_string(), serde_json::json!(self.is_retryable()));

        match self {
            Self::PreCheck { check, .. } | Self::PostCheck { check, .. } => {
                map.insert("check".to_string(), serde_json::json!(check));
            }
            Self::RetriesExhausted { attempts, last } => {
                map.insert("attempts".to_string(), serde_json::json!(attempts));
                let last: serde_json::Map<String, serde_json::Value> =
                    last.to_dict().into_iter().collect();
                map.insert("last".to_string(), serde_json::Value::Object(last));
            }
            Self::Cancelled { reason } => {
                map.insert("reason".to_string(), serde_json::json!(reason));
            }
            Self::DeadlineExceeded { timeout } => {
                let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                map.insert("timeout_ms".to_string(), serde_json::json!(millis));
            }
            Self::Generation { .. } | Self::Structural { .. } => {}
        }

        map
    }
}

/// Walks a cause chain looking for a cancellation marker.
fn caused_by_cancellation(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.is::<Cancelled>() {
            return true;
        }
        if let Some(guard) = e.downcast_ref::<GuardError>() {
            if guard.is_cancellation() {
                return true;
            }
        }
        current = e.source();
    }
    false
}

/// Free-function form of [`GuardError::is_retryable`].
#[must_use]
pub fn is_retryable(err: &GuardError) -> bool {
    err.is_retryable()
}

/// Errors raised while constructing a guard or loading its settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No generation client was configured.
    #[error("No generation client provided")]
    NoClient,

    /// The retry policy failed validation.
    #[error("Invalid retry policy: {0}")]
    InvalidRetryPolicy(String),

    /// A zero timeout was configured.
    #[error("Timeout must be positive")]
    InvalidTimeout,

    /// The schema template could not be turned into a descriptor.
    #[error("Invalid schema: {0}")]
    InvalidSchema(#[source] SchemaError),

    /// A settings file could not be read.
    #[error("Failed to read settings from {}: {source}", path.display())]
    SettingsIo {
        /// The settings file path.
        path: PathBuf,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Settings text was not valid.
    #[error("Invalid settings: {0}")]
    SettingsParse(#[from] serde_json::Error),

    /// An environment override held an unparsable value.
    #[error("Invalid value for {var}: '{value}'")]
    InvalidEnv {
        /// The variable name.
        var: String,
        /// The rejected value.
        value: String,
    },

    /// The tracing subscriber could not be installed.
    #[error("Failed to initialise logging: {0}")]
    Logging(String),
}
