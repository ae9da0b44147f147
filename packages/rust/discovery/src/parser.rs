//! Collection and publication declaration file readers.
//!
//! Both readers parse exactly one YAML file and touch nothing else on disk.
//! Interpolation runs first, then the result is checked against the expected
//! shape and, for publications, against the collection's schema.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use coursepub_schema::dates::parse_datetime;
use coursepub_shared::{
    Collection, DiscoveryError, Publication, PublicationSchema, TreeNode, ValidationError,
    ValidationReason,
};

use crate::interpolate::Resolver;

// ---------------------------------------------------------------------------
// File shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CollectionFile {
    publication_schema: PublicationSchema,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PublicationFile {
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
    #[serde(default)]
    release_time: Option<String>,
    #[serde(default = "default_true")]
    ready: bool,
    artifacts: BTreeMap<String, Option<ArtifactEntry>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ArtifactEntry {
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    recipe: Option<String>,
    #[serde(default)]
    release_time: Option<String>,
    #[serde(default)]
    ready: Option<bool>,
    #[serde(default)]
    missing_ok: bool,
}

fn default_true() -> bool {
    true
}

/// One entry of a publication file's `artifacts` section.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactDeclaration {
    /// File produced by the recipe, relative to the publication directory.
    /// Defaults to the artifact key.
    pub file: Option<String>,
    pub recipe: Option<String>,
    pub release_time: Option<NaiveDateTime>,
    pub ready: bool,
    pub missing_ok: bool,
}

impl Default for ArtifactDeclaration {
    fn default() -> Self {
        Self {
            file: None,
            recipe: None,
            release_time: None,
            ready: true,
            missing_ok: false,
        }
    }
}

/// A parsed publication file: the publication with no artifacts attached, and
/// the artifacts it declares.
#[derive(Debug, Clone, PartialEq)]
pub struct PublicationDeclaration {
    pub publication: Publication,
    pub artifacts: BTreeMap<String, ArtifactDeclaration>,
}

/// Everything needed to read and validate one publication file.
#[derive(Debug, Clone, Copy)]
pub struct PublicationContext<'a> {
    pub collection_key: &'a str,
    pub publication_key: &'a str,
    pub schema: &'a PublicationSchema,
    /// Available as `${vars.*}`.
    pub vars: &'a Map<String, Value>,
    /// The previous publication of an ordered collection, available as
    /// `${previous.*}`.
    pub previous: Option<&'a Publication>,
}

// ---------------------------------------------------------------------------
// Readers
// ---------------------------------------------------------------------------

/// Read a collection file into a [`Collection`] with no publications.
pub fn read_collection_file(
    path: &Path,
    vars: &Map<String, Value>,
) -> Result<Collection, DiscoveryError> {
    let raw = load_yaml(path)?;
    let resolved = Resolver::new(&raw, vars, None)
        .resolve()
        .map_err(|e| DiscoveryError::malformed(path, e.to_string()))?;

    let file: CollectionFile = serde_json::from_value(resolved)
        .map_err(|e| DiscoveryError::malformed(path, e.to_string()))?;

    check_defaults(&file.publication_schema).map_err(|m| DiscoveryError::malformed(path, m))?;

    debug!(path = %path.display(), "read collection file");
    Ok(Collection::new(file.publication_schema))
}

/// Read a publication file, validating it against `ctx.schema`.
pub fn read_publication_file(
    path: &Path,
    ctx: &PublicationContext<'_>,
) -> Result<PublicationDeclaration, DiscoveryError> {
    let raw = load_yaml(path)?;

    let previous = ctx
        .previous
        .map(|p| p.to_plain())
        .transpose()
        .map_err(|e| DiscoveryError::malformed(path, e.to_string()))?;

    let resolved = Resolver::new(&raw, ctx.vars, previous.as_ref())
        .resolve()
        .map_err(|e| DiscoveryError::malformed(path, e.to_string()))?;

    let file: PublicationFile = serde_json::from_value(resolved)
        .map_err(|e| DiscoveryError::malformed(path, e.to_string()))?;

    let invalid = |source: ValidationError| DiscoveryError::Invalid {
        path: path.to_path_buf(),
        source,
    };
    let invalid_date = |field: String, message: String| {
        invalid(ValidationError {
            collection: ctx.collection_key.to_string(),
            publication: ctx.publication_key.to_string(),
            field,
            reason: ValidationReason::InvalidDate { message },
        })
    };

    let metadata = ctx
        .schema
        .validate_metadata(
            ctx.collection_key,
            ctx.publication_key,
            &file.metadata.unwrap_or_default(),
        )
        .map_err(invalid)?;

    ctx.schema
        .validate_artifacts(
            ctx.collection_key,
            ctx.publication_key,
            file.artifacts.keys().map(String::as_str),
        )
        .map_err(invalid)?;

    let release_time = file
        .release_time
        .as_deref()
        .map(parse_datetime)
        .transpose()
        .map_err(|e| invalid_date("release_time".into(), e.to_string()))?;

    let mut artifacts = BTreeMap::new();
    for (key, entry) in file.artifacts {
        let entry = entry.unwrap_or_default();
        let release_time = entry
            .release_time
            .as_deref()
            .map(parse_datetime)
            .transpose()
            .map_err(|e| invalid_date(format!("artifacts.{key}.release_time"), e.to_string()))?;
        let declaration = ArtifactDeclaration {
            file: entry.file,
            recipe: entry.recipe,
            release_time,
            ready: entry.ready.unwrap_or(true),
            missing_ok: entry.missing_ok,
        };
        artifacts.insert(key, declaration);
    }

    let mut publication = Publication::new(metadata);
    publication.release_time = release_time;
    publication.ready = file.ready;

    debug!(path = %path.display(), artifacts = artifacts.len(), "read publication file");
    Ok(PublicationDeclaration {
        publication,
        artifacts,
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load_yaml(path: &Path) -> Result<Value, DiscoveryError> {
    let text = std::fs::read_to_string(path).map_err(|e| DiscoveryError::io(path, e))?;
    let value: Value =
        serde_yaml::from_str(&text).map_err(|e| DiscoveryError::malformed(path, e.to_string()))?;

    if !value.is_object() {
        return Err(DiscoveryError::malformed(path, "expected a mapping at the top level"));
    }
    Ok(value)
}

/// Defaults declared in a metadata schema must satisfy their own field spec.
fn check_defaults(schema: &PublicationSchema) -> Result<(), String> {
    let Some(metadata_schema) = &schema.metadata_schema else {
        return Ok(());
    };
    for (name, spec) in &metadata_schema.optional_keys {
        if let Some(default) = &spec.default {
            spec.check(default)
                .map_err(|reason| format!("default of `{name}` {reason}"))?;
        }
    }
    Ok(())
}
