//! The guarded run orchestrator.

use super::builder::GuardBuilder;
use super::result::{RunMetadata, RunResult};
use super::retry::{self, RetryDecision, RetryPolicy};
use crate::cancellation::CancellationToken;
use crate::checks::CheckChain;
use crate::client::Generator;
use crate::contracts::Schema;
use crate::errors::GuardError;
use crate::events::{EventSink, GuardEvent};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// An immutable, validated run configuration.
///
/// A guard is built once and may serve any number of concurrent runs; all
/// per-run state lives inside the run call.
#[derive(Clone)]
pub struct Guard {
    client: Arc<dyn Generator>,
    pre_checks: CheckChain,
    post_checks: CheckChain,
    schema: Option<Schema>,
    retry: RetryPolicy,
    timeout: Option<Duration>,
    events: Arc<dyn EventSink>,
}

struct RunContext {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    start: Instant,
}

impl RunContext {
    fn begin() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            start: Instant::now(),
        }
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn metadata(&self, attempts: usize) -> RunMetadata {
        RunMetadata {
            run_id: self.run_id,
            started_at: self.started_at,
            attempts,
            elapsed: self.start.elapsed(),
        }
    }
}

impl Guard {
    /// Returns a new builder.
    #[must_use]
    pub fn builder() -> GuardBuilder {
        GuardBuilder::new()
    }

    pub(crate) fn from_parts(
        client: Arc<dyn Generator>,
        pre_checks: CheckChain,
        post_checks: CheckChain,
        schema: Option<Schema>,
        retry: RetryPolicy,
        timeout: Option<Duration>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            client,
            pre_checks,
            post_checks,
            schema,
            retry,
            timeout,
            events,
        }
    }

    /// Returns the generation client.
    #[must_use]
    pub fn client(&self) -> &Arc<dyn Generator> {
        &self.client
    }

    /// Returns the schema, if configured.
    #[must_use]
    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    /// Returns the pre-checks.
    #[must_use]
    pub fn pre_checks(&self) -> &CheckChain {
        &self.pre_checks
    }

    /// Returns the post-checks.
    #[must_use]
    pub fn post_checks(&self) -> &CheckChain {
        &self.post_checks
    }

    /// Returns the retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Returns the overall run timeout.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Runs the pipeline for `input`.
    pub async fn run(&self, input: &str) -> Result<RunResult, GuardError> {
        self.run_cancellable(input, &CancellationToken::new()).await
    }

    /// Runs the pipeline for `input`, aborting when `token` is cancelled.
    ///
    /// Cancellation and the overall timeout end the run immediately with
    /// [`GuardError::Cancelled`] or [`GuardError::DeadlineExceeded`], never
    /// with `RetriesExhausted`.
    pub async fn run_cancellable(
        &self,
        input: &str,
        token: &CancellationToken,
    ) -> Result<RunResult, GuardError> {
        let run = RunContext::begin();
        self.events.emit(&GuardEvent::RunStarted {
            run_id: run.run_id,
            input_len: input.len(),
        });

        let outcome = self.supervise(input, token, &run).await;

        match &outcome {
            Ok(result) => self.events.emit(&GuardEvent::RunSucceeded {
                run_id: run.run_id,
                attempts: result.attempts(),
                elapsed_ms: run.elapsed_ms(),
            }),
            Err(err) => self.events.emit(&GuardEvent::RunFailed {
                run_id: run.run_id,
                kind: err.kind(),
                error: err.to_string(),
                elapsed_ms: run.elapsed_ms(),
            }),
        }

        outcome
    }

    async fn supervise(
        &self,
        input: &str,
        token: &CancellationToken,
        run: &RunContext,
    ) -> Result<RunResult, GuardError> {
        if token.is_cancelled() {
            return Err(GuardError::cancelled(token.reason()));
        }

        // Collaborators see a run-scoped token so a deadline reaches them too.
        let run_token = CancellationToken::new();
        let deadline = async {
            match self.timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending::<()>().await,
            }
        };

        let outcome = tokio::select! {
            biased;
            () = token.cancelled() => {
                let reason = token.reason().unwrap_or_default();
                run_token.cancel(reason.clone());
                Err(GuardError::Cancelled { reason })
            }
            () = deadline => {
                run_token.cancel("deadline exceeded");
                Err(self.deadline_error())
            }
            res = self.execute(input, &run_token, run) => res,
        };

        match (self.timeout, outcome) {
            (Some(timeout), Err(GuardError::RetriesExhausted { .. }))
                if run.start.elapsed() >= timeout =>
            {
                Err(GuardError::DeadlineExceeded { timeout })
            }
            (_, outcome) => outcome,
        }
    }

    fn deadline_error(&self) -> GuardError {
        GuardError::DeadlineExceeded {
            timeout: self.timeout.unwrap_or_default(),
        }
    }

    async fn execute(
        &self,
        input: &str,
        token: &CancellationToken,
        run: &RunContext,
    ) -> Result<RunResult, GuardError> {
        self.pre_checks
            .run(input, token)
            .await
            .map_err(|failure| GuardError::PreCheck {
                check: failure.check,
                source: failure.cause,
            })?;
        self.events.emit(&GuardEvent::PreChecksPassed {
            run_id: run.run_id,
            checks: self.pre_checks.len(),
        });

        let mut attempt = 0;
        loop {
            self.events.emit(&GuardEvent::AttemptStarted {
                run_id: run.run_id,
                attempt: attempt + 1,
            });

            let err = match self.attempt(input, token).await {
                Ok((raw, parsed)) => {
                    return Ok(RunResult::new(raw, parsed, run.metadata(attempt + 1)));
                }
                Err(err) => err,
            };

            let decision = self.retry.decide(attempt, &err);
            self.events.emit(&GuardEvent::AttemptFailed {
                run_id: run.run_id,
                attempt: attempt + 1,
                kind: err.kind(),
                retryable: err.is_retryable(),
                error: err.to_string(),
            });

            match decision {
                RetryDecision::NotRetryable => return Err(err),
                RetryDecision::GiveUp => {
                    return Err(GuardError::RetriesExhausted {
                        attempts: attempt + 1,
                        last: Box::new(err),
                    });
                }
                RetryDecision::Retry(delay) => {
                    self.events.emit(&GuardEvent::BackoffScheduled {
                        run_id: run.run_id,
                        next_attempt: attempt + 2,
                        delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    });
                    retry::wait(delay, token)
                        .await
                        .map_err(|cancelled| GuardError::Cancelled {
                            reason: cancelled.reason,
                        })?;
                    attempt += 1;
                }
            }
        }
    }

    async fn attempt(
        &self,
        input: &str,
        token: &CancellationToken,
    ) -> Result<(String, Option<Value>), GuardError> {
        let raw = self
            .client
            .generate(input, token)
            .await
            .map_err(|source| GuardError::Generation { source })?;

        self.post_checks
            .run(&raw, token)
            .await
            .map_err(|failure| GuardError::PostCheck {
                check: failure.check,
                source: failure.cause,
            })?;

        let parsed = match &self.schema {
            Some(schema) => Some(schema.decode(&raw)?),
            None => None,
        };

        Ok((raw, parsed))
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard")
            .field("pre_checks", &self.pre_checks)
            .field("post_checks", &self.post_checks)
            .field("schema", &self.schema)
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
