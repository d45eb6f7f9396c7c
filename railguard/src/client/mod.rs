//! The generation backend slot.

use crate::cancellation::CancellationToken;
use crate::errors::BoxError;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;

/// A fallible, non-deterministic text generator.
///
/// The pipeline calls `generate` once per attempt with the caller's
/// unmodified input. Implementations must honor the token and return
/// promptly once it is cancelled, preferably with a
/// [`Cancelled`](crate::cancellation::Cancelled) error somewhere in the
/// cause chain.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produces text for the given input.
    async fn generate(&self, input: &str, token: &CancellationToken) -> Result<String, BoxError>;
}

type GenerateFn =
    dyn Fn(String, CancellationToken) -> BoxFuture<'static, Result<String, BoxError>> + Send + Sync;

/// A generator backed by an async closure.
///
/// ```rust
/// use futures::FutureExt;
/// use railguard::client::FnGenerator;
///
/// let echo = FnGenerator::new(|input, _token| async move { Ok(input) }.boxed());
/// ```
pub struct FnGenerator {
    func: Box<GenerateFn>,
}

impl FnGenerator {
    /// Wraps a closure returning a boxed future.
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(String, CancellationToken) -> BoxFuture<'static, Result<String, BoxError>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            func: Box::new(func),
        }
    }
}

impl fmt::Debug for FnGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnGenerator").finish_non_exhaustive()
    }
}

#[async_trait]
impl Generator for FnGenerator {
    async fn generate(&self, input: &str, token: &CancellationToken) -> Result<String, BoxError> {
        (self.func)(input.to_string(), token.clone()).await
    }
}
