//! Successful run output.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

/// Execution metadata for a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunMetadata {
    /// Unique identifier of the run.
    pub run_id: Uuid,
    /// Wall-clock time the run started.
    pub started_at: DateTime<Utc>,
    /// Attempts consumed, 1-indexed.
    pub attempts: usize,
    /// Elapsed time from run start to completion.
    #[serde(serialize_with = "serialize_millis", rename = "elapsed_ms")]
    pub elapsed: Duration,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// The result of a successful guarded run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    raw: String,
    parsed: Option<Value>,
    metadata: RunMetadata,
}

impl RunResult {
    pub(crate) fn new(raw: String, parsed: Option<Value>, metadata: RunMetadata) -> Self {
        Self {
            raw,
            parsed,
            metadata,
        }
    }

    /// Returns the raw generated text.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Returns the decoded value, present only when a schema is configured.
    #[must_use]
    pub fn parsed(&self) -> Option<&Value> {
        self.parsed.as_ref()
    }

    /// Returns the run metadata.
    #[must_use]
    pub fn metadata(&self) -> &RunMetadata {
        &self.metadata
    }

    /// Returns the number of attempts consumed.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.metadata.attempts
    }

    /// Deserializes the decoded value, or the raw text when no schema was
    /// configured, into `T`.
    pub fn parse_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match &self.parsed {
            Some(value) => T::deserialize(value),
            None => serde_json::from_str(&self.raw),
        }
    }

    /// Consumes the result, returning its parts.
    #[must_use]
    pub fn into_parts(self) -> (String, Option<Value>, RunMetadata) {
        (self.raw, self.parsed, self.metadata)
    }
}
