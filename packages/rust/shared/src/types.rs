//! The materials tree.
//!
//! A [`Universe`] holds [`Collection`]s, which hold [`Publication`]s, which
//! hold [`Artifact`]s. The three internal node kinds implement [`TreeNode`];
//! stages never mutate a tree in place but build a new one with
//! [`TreeNode::with_children`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub use coursepub_schema::{Metadata, PublicationSchema};

use crate::error::{Error, Result};

/// Key of the collection holding publications that live outside any
/// collection directory.
pub const DEFAULT_COLLECTION: &str = "default";

// ---------------------------------------------------------------------------
// TreeNode
// ---------------------------------------------------------------------------

/// Behavior shared by the internal nodes of the tree.
pub trait TreeNode: Clone + Serialize + DeserializeOwned {
    /// The node type one level down.
    type Child: Clone;

    /// Immediate children, ordered by key.
    fn children(&self) -> &BTreeMap<String, Self::Child>;

    /// A copy of this node with its children replaced and every other field
    /// preserved.
    fn with_children(&self, children: BTreeMap<String, Self::Child>) -> Self;

    /// Deep, JSON-compatible representation of this node and its descendants.
    fn to_plain(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| Error::serialization(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// KeyPath
// ---------------------------------------------------------------------------

/// Location of a node in the tree: `collection[/publication[/artifact]]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyPath {
    pub collection: String,
    pub publication: Option<String>,
    pub artifact: Option<String>,
}

impl KeyPath {
    /// Path of a collection.
    pub fn collection(key: impl Into<String>) -> Self {
        Self {
            collection: key.into(),
            publication: None,
            artifact: None,
        }
    }

    /// Path of a publication within this path's collection.
    pub fn publication(&self, key: impl Into<String>) -> Self {
        Self {
            collection: self.collection.clone(),
            publication: Some(key.into()),
            artifact: None,
        }
    }

    /// Path of an artifact within this path's publication.
    pub fn artifact(&self, key: impl Into<String>) -> Self {
        Self {
            collection: self.collection.clone(),
            publication: self.publication.clone(),
            artifact: Some(key.into()),
        }
    }

    /// The populated keys, outermost first.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.collection.as_str())
            .chain(self.publication.as_deref())
            .chain(self.artifact.as_deref())
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.segments().collect();
        f.write_str(&joined.join("/"))
    }
}

// ---------------------------------------------------------------------------
// Artifact
// ---------------------------------------------------------------------------

/// An artifact at one of its three lifecycle stages.
///
/// Transitions only go forward: unbuilt → built → published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Artifact {
    Unbuilt(UnbuiltArtifact),
    Built(BuiltArtifact),
    Published(PublishedArtifact),
}

impl Artifact {
    /// The artifact's logical key within its publication.
    pub fn key(&self) -> &str {
        match self {
            Self::Unbuilt(a) => &a.key,
            Self::Built(a) => &a.key,
            Self::Published(a) => &a.key,
        }
    }

    /// Lifecycle stage name, as used in the serialized form.
    pub fn state(&self) -> &'static str {
        match self {
            Self::Unbuilt(_) => "unbuilt",
            Self::Built(_) => "built",
            Self::Published(_) => "published",
        }
    }

    pub fn as_unbuilt(&self) -> Option<&UnbuiltArtifact> {
        match self {
            Self::Unbuilt(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_built(&self) -> Option<&BuiltArtifact> {
        match self {
            Self::Built(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_published(&self) -> Option<&PublishedArtifact> {
        match self {
            Self::Published(a) => Some(a),
            _ => None,
        }
    }
}

/// A declared artifact whose recipe has not run yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnbuiltArtifact {
    pub key: String,
    /// Directory the recipe runs in (the publication directory).
    pub workdir: PathBuf,
    /// File the recipe produces, relative to `workdir`.
    pub path: PathBuf,
    /// Shell command producing the file. `None` means the file is provided as-is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipe: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_time: Option<NaiveDateTime>,
    #[serde(default = "default_true")]
    pub ready: bool,
    /// Tolerate the file being absent after the build.
    #[serde(default)]
    pub missing_ok: bool,
}

impl UnbuiltArtifact {
    /// An artifact whose file is named after its key and needs no recipe.
    pub fn new(key: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        let key = key.into();
        Self {
            path: PathBuf::from(&key),
            key,
            workdir: workdir.into(),
            recipe: None,
            release_time: None,
            ready: true,
            missing_ok: false,
        }
    }

    /// Where the file is expected on disk.
    pub fn source_path(&self) -> PathBuf {
        self.workdir.join(&self.path)
    }
}

/// An artifact whose output exists on the build side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuiltArtifact {
    pub key: String,
    pub workdir: PathBuf,
    /// Output file, relative to `workdir` (or absolute).
    pub path: PathBuf,
}

impl BuiltArtifact {
    pub fn output_path(&self) -> PathBuf {
        self.workdir.join(&self.path)
    }
}

/// An artifact placed at its public location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedArtifact {
    pub key: String,
    /// Resolved public path, suitable for links.
    pub path: PathBuf,
}

impl PublishedArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Publication
// ---------------------------------------------------------------------------

/// One unit of content (a lecture, a homework) and its artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Publication {
    pub metadata: Metadata,
    /// Before this time neither the publication nor its artifacts are built.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_time: Option<NaiveDateTime>,
    #[serde(default = "default_true")]
    pub ready: bool,
    pub artifacts: BTreeMap<String, Artifact>,
}

impl Publication {
    /// A released, ready publication with no artifacts.
    pub fn new(metadata: Metadata) -> Self {
        Self {
            metadata,
            release_time: None,
            ready: true,
            artifacts: BTreeMap::new(),
        }
    }
}

impl TreeNode for Publication {
    type Child = Artifact;

    fn children(&self) -> &BTreeMap<String, Artifact> {
        &self.artifacts
    }

    fn with_children(&self, children: BTreeMap<String, Artifact>) -> Self {
        Self {
            metadata: self.metadata.clone(),
            release_time: self.release_time,
            ready: self.ready,
            artifacts: children,
        }
    }
}

// ---------------------------------------------------------------------------
// Collection
// ---------------------------------------------------------------------------

/// A group of publications sharing a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Collection {
    pub publication_schema: PublicationSchema,
    pub publications: BTreeMap<String, Publication>,
}

impl Collection {
    /// An empty collection with the given schema.
    pub fn new(publication_schema: PublicationSchema) -> Self {
        Self {
            publication_schema,
            publications: BTreeMap::new(),
        }
    }
}

impl TreeNode for Collection {
    type Child = Publication;

    fn children(&self) -> &BTreeMap<String, Publication> {
        &self.publications
    }

    fn with_children(&self, children: BTreeMap<String, Publication>) -> Self {
        Self {
            publication_schema: self.publication_schema.clone(),
            publications: children,
        }
    }
}

// ---------------------------------------------------------------------------
// Universe
// ---------------------------------------------------------------------------

/// Root of the tree for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Universe {
    pub collections: BTreeMap<String, Collection>,
}

impl Universe {
    pub fn new(collections: BTreeMap<String, Collection>) -> Self {
        Self { collections }
    }

    /// Every publication with its key path, in key order.
    pub fn publications(&self) -> Vec<(KeyPath, &Publication)> {
        self.collections
            .iter()
            .flat_map(|(ck, collection)| {
                let base = KeyPath::collection(ck);
                collection
                    .publications
                    .iter()
                    .map(move |(pk, publication)| (base.publication(pk), publication))
            })
            .collect()
    }

    /// Every artifact with its key path, in key order.
    pub fn artifacts(&self) -> Vec<(KeyPath, &Artifact)> {
        self.publications()
            .into_iter()
            .flat_map(|(path, publication)| {
                publication
                    .artifacts
                    .iter()
                    .map(move |(ak, artifact)| (path.artifact(ak), artifact))
            })
            .collect()
    }

    /// Look up an artifact by its key path.
    pub fn artifact(&self, path: &KeyPath) -> Option<&Artifact> {
        let publication = self
            .collections
            .get(&path.collection)?
            .publications
            .get(path.publication.as_deref()?)?;
        publication.artifacts.get(path.artifact.as_deref()?)
    }
}

impl TreeNode for Universe {
    type Child = Collection;

    fn children(&self) -> &BTreeMap<String, Collection> {
        &self.collections
    }

    fn with_children(&self, children: BTreeMap<String, Collection>) -> Self {
        Self {
            collections: children,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sample_publication() -> Publication {
        let mut metadata = Metadata::new();
        metadata.insert("topic".into(), json!("Intro"));
        let mut publication = Publication::new(metadata);
        publication.artifacts.insert(
            "lecture.ipynb".into(),
            Artifact::Unbuilt(UnbuiltArtifact::new("lecture.ipynb", "/src/lectures/01")),
        );
        publication
    }

    fn sample_universe() -> Universe {
        let mut lectures = Collection::new(PublicationSchema::permissive());
        lectures.publications.insert("01".into(), sample_publication());
        let mut collections = BTreeMap::new();
        collections.insert("lectures".into(), lectures);
        Universe::new(collections)
    }

    #[test]
    fn key_path_display() {
        let path = KeyPath::collection("lectures")
            .publication("01")
            .artifact("lecture.ipynb");
        assert_eq!(path.to_string(), "lectures/01/lecture.ipynb");
        assert_eq!(KeyPath::collection("lectures").to_string(), "lectures");
    }

    #[test]
    fn with_children_preserves_other_fields() {
        let mut publication = sample_publication();
        publication.ready = false;

        let replaced = publication.with_children(BTreeMap::new());

        assert!(replaced.artifacts.is_empty());
        assert!(!replaced.ready);
        assert_eq!(replaced.metadata, publication.metadata);
        // the original is untouched
        assert_eq!(publication.artifacts.len(), 1);
    }

    #[test]
    fn to_plain_tags_artifact_state() {
        let plain = sample_universe().to_plain().expect("to_plain");
        let artifact = &plain["collections"]["lectures"]["publications"]["01"]["artifacts"]
            ["lecture.ipynb"];
        assert_eq!(artifact["state"], "unbuilt");
        assert_eq!(artifact["path"], "lecture.ipynb");
    }

    #[test]
    fn artifacts_are_listed_with_key_paths() {
        let universe = sample_universe();
        let artifacts = universe.artifacts();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].0.to_string(), "lectures/01/lecture.ipynb");
        assert_eq!(artifacts[0].1.state(), "unbuilt");
        assert!(universe.artifact(&artifacts[0].0).is_some());
    }

    #[test]
    fn children_are_ordered_by_key() {
        let mut collection = Collection::new(PublicationSchema::permissive());
        for key in ["10-late", "02-python", "01-intro"] {
            collection
                .publications
                .insert(key.into(), Publication::new(Metadata::new()));
        }
        let keys: Vec<&String> = collection.children().keys().collect();
        assert_eq!(keys, ["01-intro", "02-python", "10-late"]);
    }
}
