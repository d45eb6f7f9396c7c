//! Cooperative cancellation for guarded runs.
//!
//! This module provides:
//! - CancellationToken, an awaitable first-reason-wins cancellation handle
//! - Cancelled, the marker error collaborators return when they abort

mod token;

pub use token::{CancellationToken, Cancelled};
