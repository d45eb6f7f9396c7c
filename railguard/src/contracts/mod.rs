//! Structural contracts for generated output.
//!
//! A [`Schema`] captures the expected shape of a JSON object once, either
//! from a template value or from an explicit field list, and decodes raw
//! text against it. Decoding is strict by default.

mod schema;

pub use schema::{FieldKind, FieldSpec, Schema, SchemaError};
