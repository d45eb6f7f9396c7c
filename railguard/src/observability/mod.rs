//! Logging setup for applications embedding railguard.
//!
//! The pipeline itself never logs; pair [`init_tracing`] with a
//! [`TracingEventSink`](crate::events::TracingEventSink) to see run events.

mod logging;

pub use logging::{init_tracing, LogFormat, LoggingConfig, LOG_ENV};
