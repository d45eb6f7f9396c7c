//! Event types and sink implementations.

use crate::errors::FailureKind;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn, Level};
use uuid::Uuid;

/// A lifecycle event of a single run.
///
/// Attempt numbers are 1-indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GuardEvent {
    /// A run began.
    RunStarted {
        /// Run identifier.
        run_id: Uuid,
        /// Length of the input in bytes.
        input_len: usize,
    },
    /// Every pre-check accepted the input.
    PreChecksPassed {
        /// Run identifier.
        run_id: Uuid,
        /// Number of pre-checks run.
        checks: usize,
    },
    /// An attempt began.
    AttemptStarted {
        /// Run identifier.
        run_id: Uuid,
        /// Attempt number.
        attempt: usize,
    },
    /// An attempt failed.
    AttemptFailed {
        /// Run identifier.
        run_id: Uuid,
        /// Attempt number.
        attempt: usize,
        /// Failure kind.
        kind: FailureKind,
        /// Whether the failure is eligible for retry.
        retryable: bool,
        /// Failure message.
        error: String,
    },
    /// A backoff wait was scheduled before the next attempt.
    BackoffScheduled {
        /// Run identifier.
        run_id: Uuid,
        /// The attempt that will follow the wait.
        next_attempt: usize,
        /// Wait length in milliseconds.
        delay_ms: u64,
    },
    /// The run produced a result.
    RunSucceeded {
        /// Run identifier.
        run_id: Uuid,
        /// Attempts consumed.
        attempts: usize,
        /// Elapsed time in milliseconds.
        elapsed_ms: u64,
    },
    /// The run ended with a failure.
    RunFailed {
        /// Run identifier.
        run_id: Uuid,
        /// Failure kind.
        kind: FailureKind,
        /// Failure message.
        error: String,
        /// Elapsed time in milliseconds.
        elapsed_ms: u64,
    },
}

impl GuardEvent {
    /// Returns the dotted event type name.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run.started",
            Self::PreChecksPassed { .. } => "run.pre_checks_passed",
            Self::AttemptStarted { .. } => "attempt.started",
            Self::AttemptFailed { .. } => "attempt.failed",
            Self::BackoffScheduled { .. } => "attempt.backoff",
            Self::RunSucceeded { .. } => "run.succeeded",
            Self::RunFailed { .. } => "run.failed",
        }
    }

    /// Returns the run identifier.
    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::PreChecksPassed { run_id, .. }
            | Self::AttemptStarted { run_id, .. }
            | Self::AttemptFailed { run_id, .. }
            | Self::BackoffScheduled { run_id, .. }
            | Self::RunSucceeded { run_id, .. }
            | Self::RunFailed { run_id, .. } => *run_id,
        }
    }

    const fn is_failure(&self) -> bool {
        matches!(self, Self::AttemptFailed { .. } | Self::RunFailed { .. })
    }
}

/// Receives run lifecycle events.
///
/// `emit` is called inline on the run's task and must not block.
pub trait EventSink: Send + Sync {
    /// Emits an event.
    fn emit(&self, event: &GuardEvent);
}

/// A sink that discards all events. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn emit(&self, _event: &GuardEvent) {}
}

/// A sink that forwards events to `tracing`.
///
/// Failure events are always logged at `WARN`.
#[derive(Debug, Clone)]
pub struct TracingEventSink {
    level: Level,
}

impl Default for TracingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl TracingEventSink {
    /// Creates a sink logging at the given level.
    #[must_use]
    pub const fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level sink.
    #[must_use]
    pub const fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    /// Creates an info-level sink.
    #[must_use]
    pub const fn info() -> Self {
        Self::new(Level::INFO)
    }
}

impl EventSink for TracingEventSink {
    fn emit(&self, event: &GuardEvent) {
        let event_type = event.event_type();
        let run_id = event.run_id();

        if event.is_failure() {
            warn!(%run_id, event_type, event = ?event, "Event: {}", event_type);
            return;
        }

        match self.level {
            Level::TRACE => trace!(%run_id, event_type, event = ?event, "Event: {}", event_type),
            Level::DEBUG => debug!(%run_id, event_type, event = ?event, "Event: {}", event_type),
            _ => info!(%run_id, event_type, event = ?event, "Event: {}", event_type),
        }
    }
}

/// A sink that records events, for tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: parking_lot::RwLock<Vec<GuardEvent>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<GuardEvent> {
        self.events.read().clone()
    }

    /// Returns the type names of collected events, in order.
    #[must_use]
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.read().iter().map(GuardEvent::event_type).collect()
    }

    /// Returns events whose type starts with `prefix`.
    #[must_use]
    pub fn events_of_type(&self, prefix: &str) -> Vec<GuardEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type().starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&self, event: &GuardEvent) {
        self.events.write().push(event.clone());
    }
}
