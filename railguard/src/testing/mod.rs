//! Testing utilities for guarded runs.
//!
//! This module provides:
//! - Scripted generators and recording checks
//! - Assertions over run outcomes and emitted events

mod assertions;
mod mocks;

pub use assertions::{
    assert_event_types, assert_failure_kind, assert_retries_exhausted, assert_succeeded_after,
};
pub use mocks::{RecordingCheck, Reply, ScriptedGenerator};
