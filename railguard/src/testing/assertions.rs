//! Test assertions for run outcomes.

use crate::errors::{FailureKind, GuardError};
use crate::events::CollectingEventSink;
use crate::pipeline::RunResult;

/// Asserts that the run succeeded after exactly `attempts` attempts.
pub fn assert_succeeded_after(outcome: &Result<RunResult, GuardError>, attempts: usize) {
    match outcome {
        Ok(result) => assert_eq!(
            result.attempts(),
            attempts,
            "Expected success after {} attempts, got {}",
            attempts,
            result.attempts()
        ),
        Err(err) => panic!("Expected success, got failure: {err}"),
    }
}

/// Asserts that the run failed with the expected kind and returns the error.
pub fn assert_failure_kind(
    outcome: &Result<RunResult, GuardError>,
    expected: FailureKind,
) -> &GuardError {
    match outcome {
        Ok(result) => panic!(
            "Expected {expected} failure, got success after {} attempts",
            result.attempts()
        ),
        Err(err) => {
            assert_eq!(
                err.kind(),
                expected,
                "Expected failure kind {:?}, got {:?}: {}",
                expected,
                err.kind(),
                err
            );
            err
        }
    }
}

/// Asserts retries were exhausted after `attempts` and returns the last cause.
pub fn assert_retries_exhausted(
    outcome: &Result<RunResult, GuardError>,
    attempts: usize,
) -> &GuardError {
    match assert_failure_kind(outcome, FailureKind::RetriesExhausted) {
        GuardError::RetriesExhausted {
            attempts: actual,
            last,
        } => {
            assert_eq!(
                *actual, attempts,
                "Expected {attempts} attempts before exhaustion, got {actual}"
            );
            last
        }
        other => panic!("Expected retries exhausted, got {other}"),
    }
}

/// Asserts that the sink recorded exactly these event types, in order.
pub fn assert_event_types(sink: &CollectingEventSink, expected: &[&str]) {
    let actual = sink.event_types();
    assert_eq!(
        actual, expected,
        "Expected events {expected:?}, got {actual:?}"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventSink, GuardEvent};
    use crate::pipeline::RunMetadata;
    use std::time::Duration;
    use uuid::Uuid;

    fn success(attempts: usize) -> Result<RunResult, GuardError> {
        Ok(RunResult::new(
            "ok".to_string(),
            None,
            RunMetadata {
                run_id: Uuid::new_v4(),
                started_at: chrono::Utc::now(),
                attempts,
                elapsed: Duration::ZERO,
            },
        ))
    }

    fn exhausted() -> Result<RunResult, GuardError> {
        Err(GuardError::RetriesExhausted {
            attempts: 2,
            last: Box::new(GuardError::Generation {
                source: "down".into(),
            }),
        })
    }

    #[test]
    fn test_assert_succeeded_after() {
        assert_succeeded_after(&success(2), 2);
    }

    #[test]
    #[should_panic(expected = "Expected success")]
    fn test_assert_succeeded_after_fails_on_error() {
        assert_succeeded_after(&exhausted(), 1);
    }

    #[test]
    fn test_assert_retries_exhausted() {
        let outcome = exhausted();
        let last = assert_retries_exhausted(&outcome, 2);
        assert_eq!(last.kind(), FailureKind::Generation);
    }

    #[test]
    #[should_panic(expected = "Expected failure kind")]
    fn test_assert_failure_kind_mismatch() {
        assert_failure_kind(&exhausted(), FailureKind::PreCheck);
    }

    #[test]
    fn test_assert_event_types() {
        let sink = CollectingEventSink::new();
        sink.emit(&GuardEvent::AttemptStarted {
            run_id: Uuid::nil(),
            attempt: 1,
        });
        assert_event_types(&sink, &["attempt.started"]);
    }
}
