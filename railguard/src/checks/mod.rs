//! Pre-check and post-check slots.
//!
//! A [`Check`] is a named predicate over text. Pre-checks see the caller's
//! input before generation; post-checks see the raw generated output. The
//! pipeline treats both the same way: run in declaration order, first
//! failure wins.

use crate::cancellation::CancellationToken;
use crate::errors::BoxError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Name given to checks built from bare closures.
pub const DEFAULT_CHECK_NAME: &str = "custom";

/// Trait for input and output checks.
///
/// Implementations must not mutate pipeline state. Long-running checks
/// should honor the cancellation token and return promptly once it fires.
#[async_trait]
pub trait Check: Send + Sync {
    /// Returns a human-readable name used for error attribution.
    fn name(&self) -> &str;

    /// Examines the text, returning an error to reject it.
    async fn check(&self, text: &str, token: &CancellationToken) -> Result<(), BoxError>;
}

/// A check backed by a synchronous closure.
pub struct FnCheck<F>
where
    F: Fn(&str) -> Result<(), BoxError> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnCheck<F>
where
    F: Fn(&str) -> Result<(), BoxError> + Send + Sync,
{
    /// Creates a check named [`DEFAULT_CHECK_NAME`].
    pub fn new(func: F) -> Self {
        Self::named(DEFAULT_CHECK_NAME, func)
    }

    /// Creates a named check.
    pub fn named(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> fmt::Debug for FnCheck<F>
where
    F: Fn(&str) -> Result<(), BoxError> + Send + Sync,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCheck").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> Check for FnCheck<F>
where
    F: Fn(&str) -> Result<(), BoxError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self, text: &str, token: &CancellationToken) -> Result<(), BoxError> {
        token.ensure_active()?;
        (self.func)(text)
    }
}

/// The first failing check of a [`CheckChain`] run.
#[derive(Debug)]
pub struct CheckFailure {
    /// Name of the failing check.
    pub check: String,
    /// The check's error.
    pub cause: BoxError,
}

impl fmt::Display for CheckFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.check, self.cause)
    }
}

impl std::error::Error for CheckFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.cause.as_ref())
    }
}

/// An ordered set of checks.
#[derive(Clone, Default)]
pub struct CheckChain {
    checks: Vec<Arc<dyn Check>>,
}

impl CheckChain {
    /// Creates a new empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self { checks: Vec::new() }
    }

    /// Appends a check; declaration order is execution order.
    pub fn push(&mut self, check: Arc<dyn Check>) {
        self.checks.push(check);
    }

    /// Runs every check in order, stopping at the first failure.
    pub async fn run(&self, text: &str, token: &CancellationToken) -> Result<(), CheckFailure> {
        for check in &self.checks {
            if let Err(cause) = check.check(text, token).await {
                return Err(CheckFailure {
                    check: check.name().to_string(),
                    cause,
                });
            }
        }
        Ok(())
    }

    /// Returns the checks in declaration order.
    #[must_use]
    pub fn checks(&self) -> &[Arc<dyn Check>] {
        &self.checks
    }

    /// Returns the check names in declaration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.checks.iter().map(|c| c.name().to_string()).collect()
    }

    /// Returns the number of checks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    /// Returns true if the chain is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

impl fmt::Debug for CheckChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl FromIterator<Arc<dyn Check>> for CheckChain {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Check>>>(iter: I) -> Self {
        Self {
            checks: iter.into_iter().collect(),
        }
    }
}
