//! Validation of declared publication metadata and artifacts against a
//! [`PublicationSchema`].

use serde_json::{Map, Value};
use tracing::trace;

use crate::dates::{DATE_FORMAT, DATETIME_FORMAT, parse_date, parse_datetime};
use crate::schema::{
    FieldSpec, FieldType, Metadata, MetadataSchema, PublicationSchema, value_type_name,
};

/// A publication failed its collection's schema.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{collection}/{publication}: `{field}` {reason}")]
pub struct ValidationError {
    /// Key of the collection whose schema was applied.
    pub collection: String,
    /// Key of the offending publication.
    pub publication: String,
    /// Metadata field name, or `artifacts.<key>` for artifact problems.
    pub field: String,
    pub reason: ValidationReason,
}

/// Why a field failed validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationReason {
    #[error("is required but missing")]
    MissingField,

    #[error("should be of type {expected}, found {found}")]
    WrongType { expected: FieldType, found: String },

    #[error("is not part of the schema")]
    UnknownField,

    #[error("has value {value}, which is not allowed")]
    NotAllowed { value: String },

    #[error("is a required artifact but is not declared")]
    MissingArtifact,

    #[error("is not an artifact of this collection")]
    UnknownArtifact,

    #[error("is not a valid date: {message}")]
    InvalidDate { message: String },
}

impl PublicationSchema {
    /// Validate raw declared metadata, returning it normalized.
    ///
    /// Dates and datetimes are rewritten to their canonical string forms and
    /// defaults of absent optional fields are filled in.
    pub fn validate_metadata(
        &self,
        collection: &str,
        publication: &str,
        raw: &Map<String, Value>,
    ) -> Result<Metadata, ValidationError> {
        match &self.metadata_schema {
            None => Ok(raw.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
            Some(schema) => schema.validate(raw).map_err(|(field, reason)| ValidationError {
                collection: collection.to_string(),
                publication: publication.to_string(),
                field,
                reason,
            }),
        }
    }

    /// Check the set of declared artifact keys against the required and
    /// optional lists.
    pub fn validate_artifacts<'a, I>(
        &self,
        collection: &str,
        publication: &str,
        keys: I,
    ) -> Result<(), ValidationError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let error = |key: &str, reason| ValidationError {
            collection: collection.to_string(),
            publication: publication.to_string(),
            field: format!("artifacts.{key}"),
            reason,
        };

        let keys: Vec<&str> = keys.into_iter().collect();

        for required in &self.required_artifacts {
            if !keys.contains(&required.as_str()) {
                return Err(error(required, ValidationReason::MissingArtifact));
            }
        }

        if !self.allow_unspecified_artifacts {
            if let Some(unknown) = keys.iter().find(|k| !self.declares_artifact(k)) {
                return Err(error(unknown, ValidationReason::UnknownArtifact));
            }
        }

        Ok(())
    }
}

impl MetadataSchema {
    fn validate(&self, raw: &Map<String, Value>) -> Result<Metadata, (String, ValidationReason)> {
        let mut metadata = Metadata::new();

        for (name, spec) in &self.required_keys {
            let value = raw
                .get(name)
                .ok_or_else(|| (name.clone(), ValidationReason::MissingField))?;
            let checked = spec.check(value).map_err(|reason| (name.clone(), reason))?;
            metadata.insert(name.clone(), checked);
        }

        for (name, spec) in &self.optional_keys {
            match raw.get(name) {
                Some(value) => {
                    let checked = spec.check(value).map_err(|reason| (name.clone(), reason))?;
                    metadata.insert(name.clone(), checked);
                }
                None => {
                    if let Some(default) = &spec.default {
                        trace!(field = %name, "filling in default");
                        metadata.insert(name.clone(), default.clone());
                    }
                }
            }
        }

        for (name, value) in raw {
            if self.required_keys.contains_key(name) || self.optional_keys.contains_key(name) {
                continue;
            }
            if !self.allow_extra_keys {
                return Err((name.clone(), ValidationReason::UnknownField));
            }
            metadata.insert(name.clone(), value.clone());
        }

        Ok(metadata)
    }
}

impl FieldSpec {
    /// Check a single value, returning its normalized form.
    pub fn check(&self, value: &Value) -> Result<Value, ValidationReason> {
        if value.is_null() && (self.nullable || self.field_type == FieldType::Any) {
            return Ok(Value::Null);
        }

        let wrong_type = || ValidationReason::WrongType {
            expected: self.field_type,
            found: value_type_name(value).to_string(),
        };

        let normalized = match (self.field_type, value) {
            (FieldType::Any, v) => v.clone(),
            (FieldType::String, Value::String(_)) => value.clone(),
            (FieldType::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => value.clone(),
            (FieldType::Float, Value::Number(_)) => value.clone(),
            (FieldType::Boolean, Value::Bool(_)) => value.clone(),
            (FieldType::List, Value::Array(_)) => value.clone(),
            (FieldType::Dict, Value::Object(_)) => value.clone(),
            (FieldType::Date, Value::String(s)) => {
                let date = parse_date(s).map_err(|e| ValidationReason::InvalidDate {
                    message: e.to_string(),
                })?;
                Value::String(date.format(DATE_FORMAT).to_string())
            }
            (FieldType::Datetime, Value::String(s)) => {
                let datetime = parse_datetime(s).map_err(|e| ValidationReason::InvalidDate {
                    message: e.to_string(),
                })?;
                Value::String(datetime.format(DATETIME_FORMAT).to_string())
            }
            _ => return Err(wrong_type()),
        };

        if let Some(allowed) = &self.allowed {
            if !allowed.contains(&normalized) {
                return Err(ValidationReason::NotAllowed {
                    value: normalized.to_string(),
                });
            }
        }

        Ok(normalized)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;

    fn lecture_schema() -> PublicationSchema {
        let mut required_keys = BTreeMap::new();
        required_keys.insert("number".to_string(), FieldSpec::of(FieldType::Integer));
        required_keys.insert("topic".to_string(), FieldSpec::of(FieldType::String));
        required_keys.insert("date".to_string(), FieldSpec::of(FieldType::Date));

        let mut optional_keys = BTreeMap::new();
        optional_keys.insert(
            "slides".to_string(),
            FieldSpec {
                default: Some(json!(false)),
                ..FieldSpec::of(FieldType::Boolean)
            },
        );
        optional_keys.insert(
            "room".to_string(),
            FieldSpec {
                allowed: Some(vec![json!("A"), json!("B")]),
                ..FieldSpec::of(FieldType::String)
            },
        );

        PublicationSchema {
            required_artifacts: vec!["lecture.ipynb".into()],
            optional_artifacts: vec!["notes.pdf".into()],
            metadata_schema: Some(MetadataSchema {
                required_keys,
                optional_keys,
                allow_extra_keys: false,
            }),
            allow_unspecified_artifacts: false,
            is_ordered: false,
        }
    }

    fn raw(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn valid_metadata_is_normalized() {
        let schema = lecture_schema();
        let metadata = schema
            .validate_metadata(
                "lectures",
                "01",
                &raw(json!({ "number": 1, "topic": "Intro", "date": "2020-09-28" })),
            )
            .unwrap();

        assert_eq!(metadata["date"], json!("2020-09-28"));
        assert_eq!(metadata["slides"], json!(false));
        assert!(!metadata.contains_key("room"));
    }

    #[test]
    fn missing_required_field_names_the_field() {
        let schema = lecture_schema();
        let err = schema
            .validate_metadata("lectures", "01", &raw(json!({ "number": 1, "date": "2020-09-28" })))
            .unwrap_err();

        assert_eq!(err.collection, "lectures");
        assert_eq!(err.publication, "01");
        assert_eq!(err.field, "topic");
        assert_eq!(err.reason, ValidationReason::MissingField);
        assert!(err.to_string().contains("lectures/01"));
    }

    #[test]
    fn wrong_type_is_reported() {
        let schema = lecture_schema();
        let err = schema
            .validate_metadata(
                "lectures",
                "01",
                &raw(json!({ "number": "one", "topic": "Intro", "date": "2020-09-28" })),
            )
            .unwrap_err();

        assert_eq!(err.field, "number");
        assert_eq!(
            err.reason,
            ValidationReason::WrongType {
                expected: FieldType::Integer,
                found: "string".into()
            }
        );
    }

    #[test]
    fn unknown_field_rejected_when_closed() {
        let schema = lecture_schema();
        let err = schema
            .validate_metadata(
                "lectures",
                "01",
                &raw(json!({ "number": 1, "topic": "Intro", "date": "2020-09-28", "extra": 1 })),
            )
            .unwrap_err();
        assert_eq!(err.field, "extra");
        assert_eq!(err.reason, ValidationReason::UnknownField);
    }

    #[test]
    fn extra_field_accepted_when_open() {
        let mut schema = lecture_schema();
        if let Some(metadata) = schema.metadata_schema.as_mut() {
            metadata.allow_extra_keys = true;
        }
        let metadata = schema
            .validate_metadata(
                "lectures",
                "01",
                &raw(json!({ "number": 1, "topic": "Intro", "date": "2020-09-28", "extra": 1 })),
            )
            .unwrap();
        assert_eq!(metadata["extra"], json!(1));
    }

    #[test]
    fn optional_fields_may_be_present() {
        let schema = lecture_schema();
        let metadata = schema
            .validate_metadata(
                "lectures",
                "01",
                &raw(json!({
                    "number": 1, "topic": "Intro", "date": "2020-09-28",
                    "slides": true, "room": "B"
                })),
            )
            .unwrap();
        assert_eq!(metadata["slides"], json!(true));
        assert_eq!(metadata["room"], json!("B"));
    }

    #[test]
    fn allowed_values_are_enforced() {
        let schema = lecture_schema();
        let err = schema
            .validate_metadata(
                "lectures",
                "01",
                &raw(json!({ "number": 1, "topic": "Intro", "date": "2020-09-28", "room": "C" })),
            )
            .unwrap_err();
        assert_eq!(err.field, "room");
        assert!(matches!(err.reason, ValidationReason::NotAllowed { .. }));
    }

    #[test]
    fn invalid_date_is_reported() {
        let schema = lecture_schema();
        let err = schema
            .validate_metadata(
                "lectures",
                "01",
                &raw(json!({ "number": 1, "topic": "Intro", "date": "someday" })),
            )
            .unwrap_err();
        assert_eq!(err.field, "date");
        assert!(matches!(err.reason, ValidationReason::InvalidDate { .. }));
    }

    #[test]
    fn datetime_is_normalized() {
        let spec = FieldSpec::of(FieldType::Datetime);
        assert_eq!(
            spec.check(&json!("2020-09-04T23:59")).unwrap(),
            json!("2020-09-04 23:59:00")
        );
        assert!(spec.check(&json!("2020-09-04")).is_err());
    }

    #[test]
    fn nullable_fields_accept_null() {
        let spec = FieldSpec {
            nullable: true,
            ..FieldSpec::of(FieldType::Date)
        };
        assert_eq!(spec.check(&Value::Null).unwrap(), Value::Null);
        assert!(FieldSpec::of(FieldType::Date).check(&Value::Null).is_err());
    }

    #[test]
    fn null_default_is_filled_in() {
        let mut schema = lecture_schema();
        if let Some(metadata) = schema.metadata_schema.as_mut() {
            metadata.optional_keys.insert(
                "released".to_string(),
                FieldSpec {
                    nullable: true,
                    default: Some(Value::Null),
                    ..FieldSpec::of(FieldType::Date)
                },
            );
        }
        let metadata = schema
            .validate_metadata(
                "lectures",
                "01",
                &raw(json!({ "number": 1, "topic": "Intro", "date": "2020-09-28" })),
            )
            .unwrap();
        assert_eq!(metadata.get("released"), Some(&Value::Null));
    }

    #[test]
    fn no_metadata_schema_accepts_anything() {
        let schema = PublicationSchema::permissive();
        let metadata = schema
            .validate_metadata("default", "textbook", &raw(json!({ "anything": [1, 2] })))
            .unwrap();
        assert_eq!(metadata["anything"], json!([1, 2]));
    }

    #[test]
    fn required_artifact_must_be_declared() {
        let schema = lecture_schema();
        let err = schema
            .validate_artifacts("lectures", "01", ["notes.pdf"])
            .unwrap_err();
        assert_eq!(err.field, "artifacts.lecture.ipynb");
        assert_eq!(err.reason, ValidationReason::MissingArtifact);
    }

    #[test]
    fn unspecified_artifacts_need_permission() {
        let mut schema = lecture_schema();
        let err = schema
            .validate_artifacts("lectures", "01", ["lecture.ipynb", "woo.pdf"])
            .unwrap_err();
        assert_eq!(err.reason, ValidationReason::UnknownArtifact);

        schema.allow_unspecified_artifacts = true;
        assert!(
            schema
                .validate_artifacts("lectures", "01", ["lecture.ipynb", "woo.pdf"])
                .is_ok()
        );
    }
}
