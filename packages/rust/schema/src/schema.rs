//! The schema model, deserialized from the `publication_schema` section of a
//! collection declaration file.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Validated publication metadata: field name to JSON-compatible value.
pub type Metadata = BTreeMap<String, Value>;

// ---------------------------------------------------------------------------
// PublicationSchema
// ---------------------------------------------------------------------------

/// Constraints every publication in a collection must satisfy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PublicationSchema {
    /// Artifact keys every publication must declare.
    pub required_artifacts: Vec<String>,

    /// Artifact keys a publication may declare.
    #[serde(default)]
    pub optional_artifacts: Vec<String>,

    /// Shape of the publication metadata. `None` accepts any metadata.
    #[serde(default)]
    pub metadata_schema: Option<MetadataSchema>,

    /// Whether artifacts outside the required/optional lists are accepted.
    #[serde(default)]
    pub allow_unspecified_artifacts: bool,

    /// Whether publications form a sequence, exposing `${previous.*}` during
    /// interpolation.
    #[serde(default)]
    pub is_ordered: bool,
}

impl PublicationSchema {
    /// A schema that accepts any artifacts and any metadata.
    ///
    /// Used for the `default` collection holding stand-alone publications.
    pub fn permissive() -> Self {
        Self {
            required_artifacts: Vec::new(),
            optional_artifacts: Vec::new(),
            metadata_schema: None,
            allow_unspecified_artifacts: true,
            is_ordered: false,
        }
    }

    /// Whether `key` is named as a required or optional artifact.
    pub fn declares_artifact(&self, key: &str) -> bool {
        self.required_artifacts.iter().any(|k| k == key)
            || self.optional_artifacts.iter().any(|k| k == key)
    }
}

// ---------------------------------------------------------------------------
// MetadataSchema
// ---------------------------------------------------------------------------

/// Required and optional metadata fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetadataSchema {
    #[serde(default)]
    pub required_keys: BTreeMap<String, FieldSpec>,

    #[serde(default)]
    pub optional_keys: BTreeMap<String, FieldSpec>,

    /// Accept fields not listed above. The schema is closed by default.
    #[serde(default)]
    pub allow_extra_keys: bool,
}

/// Type and constraints of a single metadata field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldSpec {
    #[serde(rename = "type")]
    pub field_type: FieldType,

    /// Whether `null` is an acceptable value.
    #[serde(default)]
    pub nullable: bool,

    /// Value used when an optional field is absent. An explicit `null` is a
    /// default too, distinct from no default at all.
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub default: Option<Value>,

    /// Enumeration of acceptable values, compared after normalization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,
}

impl FieldSpec {
    /// A plain field of the given type.
    pub fn of(field_type: FieldType) -> Self {
        Self {
            field_type,
            nullable: false,
            default: None,
            allowed: None,
        }
    }
}

/// Any value that is present, `null` included, is `Some`.
fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Metadata field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    Date,
    Datetime,
    List,
    Dict,
    Any,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Datetime => "datetime",
            Self::List => "list",
            Self::Dict => "dict",
            Self::Any => "any",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Short name of a JSON value's type, for error messages.
pub(crate) fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}
