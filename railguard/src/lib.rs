//! # Railguard
//!
//! A guarded execution pipeline for a single fallible, non-deterministic
//! text-generation call.
//!
//! Every run goes through the same strictly ordered phases:
//!
//! - **Pre-checks**: input-side predicates. The first rejection ends the run;
//!   it is never retried and the generator is never called.
//! - **Generation**: the injected [`Generator`](client::Generator) is invoked
//!   with the unmodified input.
//! - **Post-checks**: output-side predicates over the raw generated text.
//! - **Decode**: optional strict structural decoding against a
//!   [`Schema`](contracts::Schema).
//!
//! Generation, post-check and decode failures are retried with exponential
//! backoff and jitter until the [`RetryPolicy`](pipeline::RetryPolicy) runs
//! out of attempts. Cancellation and the optional overall timeout always end
//! the run immediately.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use railguard::prelude::*;
//!
//! let guard = Guard::builder()
//!     .client(my_client)
//!     .pre_check(FnCheck::named("keywords", |text| {
//!         if text.contains("ignore previous") {
//!             return Err("prompt injection".into());
//!         }
//!         Ok(())
//!     }))
//!     .schema_for::<Answer>()
//!     .max_attempts(3)
//!     .build()?;
//!
//! let result = guard.run("summarise this invoice").await?;
//! let answer: Answer = result.parse_as()?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod checks;
pub mod client;
pub mod config;
pub mod contracts;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::{CancellationToken, Cancelled};
    pub use crate::checks::{Check, CheckChain, CheckFailure, FnCheck};
    pub use crate::client::{FnGenerator, Generator};
    pub use crate::config::GuardSettings;
    pub use crate::contracts::{FieldKind, Schema, SchemaError};
    pub use crate::errors::{BoxError, ConfigError, FailureKind, GuardError};
    pub use crate::events::{
        CollectingEventSink, EventSink, GuardEvent, NoOpEventSink, TracingEventSink,
    };
    pub use crate::pipeline::{Guard, GuardBuilder, RetryPolicy, RunMetadata, RunResult};
}
