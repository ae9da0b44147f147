//! The publish stage: built artifacts are copied (or moved) to their public
//! location, `<destination>/<collection>/<publication>/<artifact>`.
//!
//! Every target path is planned and checked for collisions before anything
//! is written, so a failed plan leaves the destination untouched.

use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info, instrument};

use coursepub_shared::{
    Artifact, BuiltArtifact, Collection, Error, KeyPath, PipelineConfig, Publication,
    PublishMode, PublishedArtifact, Result, TreeNode, Universe,
};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for [`publish`].
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    pub mode: PublishMode,
}

impl From<&PipelineConfig> for PublishOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            mode: config.publish.mode,
        }
    }
}

// ---------------------------------------------------------------------------
// Callbacks
// ---------------------------------------------------------------------------

/// Hooks invoked during [`publish`]. Every method defaults to a no-op.
pub trait PublishCallbacks {
    fn on_collection_start(&mut self, _key: &str) {}

    fn on_collection_end(&mut self, _key: &str, _collection: &Collection) {}

    fn on_publication_start(&mut self, _key_path: &KeyPath) {}

    fn on_publication_end(&mut self, _key_path: &KeyPath, _publication: &Publication) {}

    fn on_artifact_start(&mut self, _key_path: &KeyPath, _artifact: &BuiltArtifact) {}

    /// Just before `src` is copied or moved to `dst`.
    fn on_copy(&mut self, _src: &Path, _dst: &Path) {}

    fn on_artifact_published(&mut self, _key_path: &KeyPath, _artifact: &PublishedArtifact) {}
}

/// Callbacks that do nothing.
pub struct SilentCallbacks;

impl PublishCallbacks for SilentCallbacks {}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Publish every built artifact in `universe` under `destination`.
///
/// Already published artifacts pass through unchanged. An unbuilt artifact is
/// an [`Error::InvalidState`]; two artifacts resolving to the same public path
/// are an [`Error::Collision`].
#[instrument(skip_all, fields(destination = %destination.display(), mode = ?options.mode))]
pub fn publish(
    universe: &Universe,
    destination: &Path,
    options: &PublishOptions,
    callbacks: &mut dyn PublishCallbacks,
) -> Result<Universe> {
    let destination = std::path::absolute(destination).map_err(|e| Error::io(destination, e))?;
    let plan = plan(universe, &destination)?;
    debug!(targets = plan.len(), "publish plan ready");

    let mut collections = BTreeMap::new();
    for (collection_key, collection) in universe.children() {
        callbacks.on_collection_start(collection_key);
        let base = KeyPath::collection(collection_key);

        let mut publications = BTreeMap::new();
        for (publication_key, publication) in collection.children() {
            let key_path = base.publication(publication_key);
            callbacks.on_publication_start(&key_path);

            let mut artifacts = BTreeMap::new();
            for (artifact_key, artifact) in publication.children() {
                let artifact_path = key_path.artifact(artifact_key);
                let published = match artifact {
                    Artifact::Built(built) => {
                        let target = plan
                            .get(&artifact_path)
                            .ok_or_else(|| unbuilt(&artifact_path))?;
                        Artifact::Published(publish_artifact(
                            &artifact_path,
                            built,
                            target,
                            options.mode,
                            callbacks,
                        )?)
                    }
                    Artifact::Published(_) => artifact.clone(),
                    Artifact::Unbuilt(_) => return Err(unbuilt(&artifact_path)),
                };
                artifacts.insert(artifact_key.clone(), published);
            }

            let published = publication.with_children(artifacts);
            callbacks.on_publication_end(&key_path, &published);
            publications.insert(publication_key.clone(), published);
        }

        let published = collection.with_children(publications);
        callbacks.on_collection_end(collection_key, &published);
        collections.insert(collection_key.clone(), published);
    }

    info!(artifacts = plan.len(), "publish complete");
    Ok(universe.with_children(collections))
}

/// The public path of the artifact at `key_path` under `destination`.
///
/// `.` components are dropped. Empty keys, `..` and absolute keys are
/// rejected so that no artifact can land outside its publication directory.
pub fn public_path(destination: &Path, key_path: &KeyPath) -> Result<PathBuf> {
    let invalid = |reason: &str| Error::InvalidKey {
        key_path: key_path.clone(),
        reason: reason.to_string(),
    };

    let mut path = destination.to_path_buf();
    for segment in key_path.segments() {
        if segment.is_empty() {
            return Err(invalid("empty key"));
        }
        for component in Path::new(segment).components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                Component::ParentDir => return Err(invalid("`..` is not allowed in keys")),
                Component::RootDir | Component::Prefix(_) => {
                    return Err(invalid("absolute keys are not allowed"));
                }
            }
        }
    }
    Ok(path)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Resolve the target of every built artifact and reject collisions.
fn plan(universe: &Universe, destination: &Path) -> Result<BTreeMap<KeyPath, PathBuf>> {
    let mut targets = BTreeMap::new();
    let mut claimed: HashMap<PathBuf, KeyPath> = HashMap::new();

    for (key_path, artifact) in universe.artifacts() {
        let target = match artifact {
            Artifact::Unbuilt(_) => return Err(unbuilt(&key_path)),
            Artifact::Built(_) => public_path(destination, &key_path)?,
            Artifact::Published(published) => published.path.clone(),
        };

        if let Some(first) = claimed.get(&target) {
            return Err(Error::Collision {
                path: target,
                first: first.clone(),
                second: key_path,
            });
        }
        claimed.insert(target.clone(), key_path.clone());

        if artifact.as_built().is_some() {
            targets.insert(key_path, target);
        }
    }

    // A file target cannot also be a directory holding another target.
    let mut paths: Vec<(&PathBuf, &KeyPath)> = claimed.iter().collect();
    paths.sort();
    for pair in paths.windows(2) {
        let (outer, first) = pair[0];
        let (inner, second) = pair[1];
        if inner.starts_with(outer) {
            return Err(Error::Collision {
                path: outer.clone(),
                first: first.clone(),
                second: second.clone(),
            });
        }
    }

    Ok(targets)
}

fn publish_artifact(
    key_path: &KeyPath,
    built: &BuiltArtifact,
    target: &Path,
    mode: PublishMode,
    callbacks: &mut dyn PublishCallbacks,
) -> Result<PublishedArtifact> {
    callbacks.on_artifact_start(key_path, built);

    let source = built.output_path();
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    callbacks.on_copy(&source, target);
    debug!(artifact = %key_path, src = %source.display(), dst = %target.display(), "publishing");
    transfer(&source, target, mode)?;

    let published = PublishedArtifact {
        key: built.key.clone(),
        path: target.to_path_buf(),
    };
    callbacks.on_artifact_published(key_path, &published);
    Ok(published)
}

/// Copy or move `src` to `dst`, replacing whatever `dst` held before.
fn transfer(src: &Path, dst: &Path, mode: PublishMode) -> Result<()> {
    if dst.is_dir() {
        std::fs::remove_dir_all(dst).map_err(|e| Error::io(dst, e))?;
    }

    match mode {
        PublishMode::Copy => copy_recursive(src, dst),
        PublishMode::Move => {
            if std::fs::rename(src, dst).is_ok() {
                return Ok(());
            }
            // rename fails across filesystems
            copy_recursive(src, dst)?;
            if src.is_dir() {
                std::fs::remove_dir_all(src).map_err(|e| Error::io(src, e))
            } else {
                std::fs::remove_file(src).map_err(|e| Error::io(src, e))
            }
        }
    }
}

fn copy_recursive(src: &Path, dst: &Path) -> Result<()> {
    if !src.is_dir() {
        std::fs::copy(src, dst).map_err(|e| Error::io(src, e))?;
        return Ok(());
    }

    std::fs::create_dir_all(dst).map_err(|e| Error::io(dst, e))?;
    for entry in std::fs::read_dir(src).map_err(|e| Error::io(src, e))? {
        let entry = entry.map_err(|e| Error::io(src, e))?;
        copy_recursive(&entry.path(), &dst.join(entry.file_name()))?;
    }
    Ok(())
}

fn unbuilt(key_path: &KeyPath) -> Error {
    Error::InvalidState {
        key_path: key_path.clone(),
        message: "artifact must be built before it is published".into(),
    }
}
