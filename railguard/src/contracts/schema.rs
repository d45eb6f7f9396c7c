//! Schema descriptor and strict decoder.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::any::TypeId;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors produced while building a schema or decoding text against it.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The template did not serialize to a JSON object.
    #[error("Invalid schema template: {0}")]
    InvalidTemplate(String),

    /// The text is not well-formed JSON.
    #[error("Malformed JSON: {0}")]
    Syntax(#[source] serde_json::Error),

    /// Non-whitespace content follows the decoded value.
    #[error("Unexpected content after JSON value")]
    TrailingContent,

    /// The top-level value is not an object.
    #[error("Expected a JSON object, found {found}")]
    NotAnObject {
        /// JSON type of the value found.
        found: &'static str,
    },

    /// A field not declared in the schema was present in strict mode.
    #[error("Unknown field '{path}'")]
    UnknownField {
        /// Dotted path of the field.
        path: String,
    },

    /// A field held a value of the wrong kind.
    #[error("Field '{path}': expected {expected}, found {found}")]
    TypeMismatch {
        /// Dotted path of the field.
        path: String,
        /// Description of the expected kind.
        expected: String,
        /// JSON type of the value found.
        found: &'static str,
    },

    /// A required field was absent or null.
    #[error("Missing required field '{path}'")]
    MissingField {
        /// Dotted path of the field.
        path: String,
    },

    /// A typed decode targeted a type the schema was not built from.
    #[error("Schema was built for {expected}, cannot decode into {found}")]
    LayoutMismatch {
        /// Type the schema was derived from.
        expected: &'static str,
        /// Type requested by the caller.
        found: &'static str,
    },

    /// The validated value could not be converted into the target type.
    #[error("Failed to deserialize decoded value: {0}")]
    Deserialize(#[source] serde_json::Error),
}

/// Expected kind of a field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// Any JSON value, including null.
    Any,
    /// A boolean.
    Bool,
    /// An integral number.
    Integer,
    /// Any number.
    Number,
    /// A string.
    String,
    /// An array whose elements all have the given kind.
    Array(Box<FieldKind>),
    /// An object with arbitrary keys whose values all have the given kind.
    Map(Box<FieldKind>),
    /// A nested object described by its own schema.
    Object(Schema),
}

impl FieldKind {
    /// Shorthand for [`FieldKind::Array`].
    #[must_use]
    pub fn array_of(kind: Self) -> Self {
        Self::Array(Box::new(kind))
    }

    /// Shorthand for [`FieldKind::Map`].
    #[must_use]
    pub fn map_of(kind: Self) -> Self {
        Self::Map(Box::new(kind))
    }

    /// Returns a short human-readable description.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Any => "any".to_string(),
            Self::Bool => "boolean".to_string(),
            Self::Integer => "integer".to_string(),
            Self::Number => "number".to_string(),
            Self::String => "string".to_string(),
            Self::Array(inner) => format!("array<{}>", inner.describe()),
            Self::Map(inner) => format!("map<{}>", inner.describe()),
            Self::Object(_) => "object".to_string(),
        }
    }

    fn from_sample(sample: &Value) -> Self {
        match sample {
            Value::Null => Self::Any,
            Value::Bool(_) => Self::Bool,
            Value::Number(n) if n.is_i64() || n.is_u64() => Self::Integer,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(items) => {
                Self::array_of(items.first().map_or(Self::Any, Self::from_sample))
            }
            Value::Object(entries) if entries.is_empty() => Self::map_of(Self::Any),
            Value::Object(entries) => Self::Object(Schema::from_entries(entries)),
        }
    }

    fn set_strict(&mut self, strict: bool) {
        match self {
            Self::Array(inner) | Self::Map(inner) => inner.set_strict(strict),
            Self::Object(schema) => schema.set_strict(strict),
            _ => {}
        }
    }

    fn check(&self, value: Value, path: &str) -> Result<Value, SchemaError> {
        match (self, value) {
            (Self::Any, v) => Ok(v),
            (Self::Bool, v @ Value::Bool(_))
            | (Self::Number, v @ Value::Number(_))
            | (Self::String, v @ Value::String(_)) => Ok(v),
            (Self::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => Ok(Value::Number(n)),
            (Self::Array(inner), Value::Array(items)) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| inner.check(item, &format!("{path}[{i}]")))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            (Self::Map(inner), Value::Object(entries)) => entries
                .into_iter()
                .map(|(key, item)| {
                    let item_path = join(path, &key);
                    inner.check(item, &item_path).map(|item| (key, item))
                })
                .collect::<Result<Map<_, _>, _>>()
                .map(Value::Object),
            (Self::Object(schema), Value::Object(entries)) => {
                schema.check_object(entries, path).map(Value::Object)
            }
            (kind, other) => Err(SchemaError::TypeMismatch {
                path: path.to_string(),
                expected: kind.describe(),
                found: json_type(&other),
            }),
        }
    }
}

/// One declared field of a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    /// Expected kind of the value.
    pub kind: FieldKind,
    /// Whether the field must be present and non-null.
    pub required: bool,
    /// Value substituted when the field is absent or null.
    pub default: Option<Value>,
}

type TypedCheck = fn(&Value) -> Result<(), serde_json::Error>;

#[derive(Debug, Clone, Copy)]
struct TypeOrigin {
    id: TypeId,
    name: &'static str,
    check: TypedCheck,
}

impl PartialEq for TypeOrigin {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

fn check_as<T: DeserializeOwned>(value: &Value) -> Result<(), serde_json::Error> {
    T::deserialize(value).map(|_| ())
}

/// A structural descriptor for JSON objects.
///
/// Built once and shared read-only between runs. Strict mode (the default)
/// rejects fields the descriptor does not declare; lenient mode drops them.
/// Both modes reject content trailing the decoded value.
///
/// # Example
///
/// ```rust
/// use railguard::contracts::{FieldKind, Schema};
///
/// let schema = Schema::new().required_field("name", FieldKind::String);
///
/// assert!(schema.validate_only(r#"{"name":"x"}"#).is_ok());
/// assert!(schema.validate_only(r#"{"name":"x","extra":"y"}"#).is_err());
/// assert!(schema.validate_only(r#"{"name":"x"}GARBAGE"#).is_err());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    fields: BTreeMap<String, FieldSpec>,
    strict: bool,
    origin: Option<TypeOrigin>,
}

impl Default for Schema {
    fn default() -> Self {
        Self::new()
    }
}

impl Schema {
    /// Creates an empty strict schema.
    #[must_use]
    pub fn new() -> Self {
        Self {
            fields: BTreeMap::new(),
            strict: true,
            origin: None,
        }
    }

    /// Derives a schema from a template value.
    ///
    /// Field kinds are inferred from the serialized template and its values
    /// become the defaults for absent or null fields. The schema remembers
    /// `T`, so [`Schema::decode_as`] only accepts `T`, and every decode also
    /// runs `T`'s deserializer to catch what the inferred kinds miss (element
    /// types of empty collections, `None` options, integer ranges).
    pub fn from_template<T>(template: &T) -> Result<Self, SchemaError>
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        let value = serde_json::to_value(template)
            .map_err(|e| SchemaError::InvalidTemplate(e.to_string()))?;
        let Value::Object(entries) = value else {
            return Err(SchemaError::InvalidTemplate(format!(
                "{} does not serialize to an object",
                std::any::type_name::<T>()
            )));
        };

        let mut schema = Self::from_entries(&entries);
        schema.origin = Some(TypeOrigin {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            check: check_as::<T>,
        });
        Ok(schema)
    }

    /// Derives a schema from `T::default()`.
    pub fn for_type<T>() -> Result<Self, SchemaError>
    where
        T: Serialize + DeserializeOwned + Default + 'static,
    {
        Self::from_template(&T::default())
    }

    fn from_entries(entries: &Map<String, Value>) -> Self {
        let fields = entries
            .iter()
            .map(|(name, sample)| {
                let spec = FieldSpec {
                    kind: FieldKind::from_sample(sample),
                    required: false,
                    default: Some(sample.clone()),
                };
                (name.clone(), spec)
            })
            .collect();
        Self {
            fields,
            strict: true,
            origin: None,
        }
    }

    /// Declares an optional field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, mut kind: FieldKind) -> Self {
        kind.set_strict(self.strict);
        self.fields.insert(
            name.into(),
            FieldSpec {
                kind,
                required: false,
                default: None,
            },
        );
        self
    }

    /// Declares a field that must be present and non-null.
    #[must_use]
    pub fn required_field(self, name: impl Into<String>, kind: FieldKind) -> Self {
        let name = name.into();
        let mut schema = self.field(name.clone(), kind);
        if let Some(spec) = schema.fields.get_mut(&name) {
            spec.required = true;
        }
        schema
    }

    /// Sets strictness, returning the schema.
    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.set_strict(strict);
        self
    }

    /// Toggles strictness for this schema and every nested object schema.
    ///
    /// Only affects subsequent decodes.
    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
        for spec in self.fields.values_mut() {
            spec.kind.set_strict(strict);
        }
    }

    /// Returns whether unknown fields are rejected.
    #[must_use]
    pub const fn is_strict(&self) -> bool {
        self.strict
    }

    /// Returns the declared field, if any.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    /// Iterates over declared fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    /// Returns the number of declared fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if no fields are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the name of the type this schema was derived from.
    #[must_use]
    pub fn type_name(&self) -> Option<&'static str> {
        self.origin.map(|o| o.name)
    }

    /// Decodes text into a fresh value of the captured shape.
    ///
    /// The text must hold exactly one JSON object (surrounding whitespace is
    /// allowed). Defaults fill absent or null optional fields.
    pub fn decode(&self, text: &str) -> Result<Value, SchemaError> {
        let mut de = serde_json::Deserializer::from_str(text);
        let value = Value::deserialize(&mut de).map_err(SchemaError::Syntax)?;
        de.end().map_err(|_| SchemaError::TrailingContent)?;

        let decoded = match value {
            Value::Object(entries) => self.check_object(entries, "").map(Value::Object)?,
            other => {
                return Err(SchemaError::NotAnObject {
                    found: json_type(&other),
                })
            }
        };

        if let Some(origin) = self.origin {
            (origin.check)(&decoded).map_err(SchemaError::Deserialize)?;
        }
        Ok(decoded)
    }

    /// Decodes text into `T`, the type this schema was derived from.
    ///
    /// Schemas declared field by field have no captured type and accept any
    /// deserializable target.
    pub fn decode_as<T: DeserializeOwned + 'static>(&self, text: &str) -> Result<T, SchemaError> {
        if let Some(origin) = self.origin {
            if origin.id != TypeId::of::<T>() {
                return Err(SchemaError::LayoutMismatch {
                    expected: origin.name,
                    found: std::any::type_name::<T>(),
                });
            }
        }
        let value = self.decode(text)?;
        serde_json::from_value(value).map_err(SchemaError::Deserialize)
    }

    /// Decodes and discards the result.
    pub fn validate_only(&self, text: &str) -> Result<(), SchemaError> {
        self.decode(text).map(|_| ())
    }

    fn check_object(
        &self,
        entries: Map<String, Value>,
        path: &str,
    ) -> Result<Map<String, Value>, SchemaError> {
        let mut out = Map::new();

        for (name, value) in entries {
            let field_path = join(path, &name);
            let Some(spec) = self.fields.get(&name) else {
                if self.strict {
                    return Err(SchemaError::UnknownField { path: field_path });
                }
                continue;
            };

            let value = if value.is_null() {
                if spec.required {
                    return Err(SchemaError::MissingField { path: field_path });
                }
                spec.default.clone().unwrap_or(Value::Null)
            } else {
                spec.kind.check(value, &field_path)?
            };
            out.insert(name, value);
        }

        for (name, spec) in &self.fields {
            if out.contains_key(name) {
                continue;
            }
            if spec.required {
                return Err(SchemaError::MissingField {
                    path: join(path, name),
                });
            }
            if let Some(default) = &spec.default {
                out.insert(name.clone(), default.clone());
            }
        }

        Ok(out)
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
