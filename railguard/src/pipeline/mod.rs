//! The guarded execution pipeline.
//!
//! A run moves through four strictly ordered phases:
//!
//! ```text
//! START -> PRE_CHECKS -> GENERATE -> POST_CHECKS -> DECODE -> SUCCESS
//!             |fail                    |fail          |fail
//!             v                        v              v
//!          terminal               retry loop back to GENERATE
//! ```
//!
//! Pre-check rejections are terminal. Generation, post-check and decode
//! failures are retried per the [`RetryPolicy`] until attempts run out, at
//! which point the run fails with
//! [`GuardError::RetriesExhausted`](crate::errors::GuardError::RetriesExhausted).

mod builder;
mod guard;
mod result;
pub mod retry;

#[cfg(test)]
mod integration_tests;

pub use builder::GuardBuilder;
pub use guard::Guard;
pub use result::{RunMetadata, RunResult};
pub use retry::{RetryDecision, RetryPolicy};
