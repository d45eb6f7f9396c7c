//! Run lifecycle events.
//!
//! A [`Guard`](crate::pipeline::Guard) reports its progress to an injected
//! [`EventSink`]. Sinks are per-guard; there is no process-wide sink.

mod sink;

pub use sink::{CollectingEventSink, EventSink, GuardEvent, NoOpEventSink, TracingEventSink};
