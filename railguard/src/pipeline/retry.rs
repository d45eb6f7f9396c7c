//! Retry policy with exponential backoff and proportional jitter.
//!
//! Attempts are 0-indexed. No delay precedes attempt 0; attempt `a >= 1`
//! waits `min(max_delay, initial_delay * multiplier^(a-1))`, perturbed by
//! up to `jitter` of that value in either direction.

use crate::cancellation::{CancellationToken, Cancelled};
use crate::errors::GuardError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry configuration for a guard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum attempts, including the first.
    pub max_attempts: usize,
    /// Delay before the second attempt, in milliseconds.
    pub initial_delay_ms: u64,
    /// Upper bound for any single delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Fraction of the delay used as the jitter range, in `[0, 1]`.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5000,
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Creates the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A single attempt with zero delays.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            multiplier: 1.0,
            jitter: 0.0,
        }
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the initial delay.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay_ms = duration_to_millis(delay);
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = duration_to_millis(delay);
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Sets the jitter fraction.
    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Returns the initial delay.
    #[must_use]
    pub const fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Returns the maximum delay.
    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Validates all fields together.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts < 1 {
            return Err("max_attempts must be >= 1".to_string());
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(format!("multiplier must be >= 1, got {}", self.multiplier));
        }
        if !self.jitter.is_finite() || !(0.0..=1.0).contains(&self.jitter) {
            return Err(format!("jitter must be within [0, 1], got {}", self.jitter));
        }
        Ok(())
    }

    /// Returns the un-jittered delay before `attempt`.
    #[must_use]
    pub fn base_delay(&self, attempt: usize) -> Duration {
        if attempt == 0 || self.initial_delay_ms == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let secs = self.initial_delay().as_secs_f64() * self.multiplier.powi(exponent);
        let capped = secs.min(self.max_delay().as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or_else(|_| self.max_delay())
    }

    /// Returns the jittered delay before `attempt`.
    #[must_use]
    pub fn delay(&self, attempt: usize) -> Duration {
        self.delay_with(attempt, &mut rand::thread_rng())
    }

    /// Returns the jittered delay before `attempt` using the given RNG.
    ///
    /// The result never exceeds the maximum delay.
    pub fn delay_with<R: Rng + ?Sized>(&self, attempt: usize, rng: &mut R) -> Duration {
        let base = self.base_delay(attempt);
        if base.is_zero() || self.jitter <= 0.0 {
            return base;
        }

        let base_secs = base.as_secs_f64();
        let spread = base_secs * self.jitter;
        let jittered = base_secs + rng.gen_range(-spread..=spread);
        let clamped = jittered.clamp(0.0, self.max_delay().as_secs_f64());
        Duration::try_from_secs_f64(clamped).unwrap_or(base)
    }

    /// Decides what follows a failed attempt.
    ///
    /// `attempt` is the 0-indexed attempt that just failed.
    #[must_use]
    pub fn decide(&self, attempt: usize, error: &GuardError) -> RetryDecision {
        if !error.is_retryable() {
            return RetryDecision::NotRetryable;
        }
        let next = attempt + 1;
        if next >= self.max_attempts {
            return RetryDecision::GiveUp;
        }
        RetryDecision::Retry(self.delay(next))
    }
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry(Duration),
    /// No attempts left.
    GiveUp,
    /// The failure is terminal.
    NotRetryable,
}

/// Sleeps for `delay` unless the token fires first.
pub async fn wait(delay: Duration, token: &CancellationToken) -> Result<(), Cancelled> {
    if delay.is_zero() {
        return token.ensure_active();
    }

    tokio::select! {
        biased;
        () = token.cancelled() => Err(Cancelled::new(token.reason().unwrap_or_default())),
        () = tokio::time::sleep(delay) => Ok(()),
    }
}

fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
