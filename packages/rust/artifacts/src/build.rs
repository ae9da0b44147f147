//! The build stage: unbuilt artifacts become built artifacts.
//!
//! Publications and artifacts that are not ready, or whose release time has
//! not arrived, are left out of the resulting universe.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{Local, NaiveDateTime};
use tracing::{debug, info, instrument, warn};

use coursepub_shared::{
    Artifact, BuildError, BuildFailure, BuiltArtifact, ErrorPolicy, KeyPath, PipelineConfig,
    Publication, TreeNode, UnbuiltArtifact, Universe,
};

use crate::recipe::BuildRecipe;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for [`build`].
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// The time release times are compared against.
    pub now: NaiveDateTime,
    /// Build artifacts whose release time is in the future. Does not affect
    /// `ready: false`.
    pub ignore_release_time: bool,
}

impl BuildOptions {
    /// Options evaluating release times at `now`.
    pub fn at(now: NaiveDateTime) -> Self {
        Self {
            now,
            ignore_release_time: false,
        }
    }
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self::at(Local::now().naive_local())
    }
}

impl From<&PipelineConfig> for BuildOptions {
    /// Uses `build.now` when it is set and valid, the current time otherwise.
    /// [`PipelineConfig::validate`] rejects an invalid `build.now`.
    fn from(config: &PipelineConfig) -> Self {
        let now = config.build.now().ok().flatten();
        Self {
            ignore_release_time: config.build.ignore_release_time,
            ..now.map(Self::at).unwrap_or_default()
        }
    }
}

// ---------------------------------------------------------------------------
// Callbacks
// ---------------------------------------------------------------------------

/// Hooks invoked during [`build`]. Every method defaults to a no-op.
///
/// Every start hook is followed by its end hook, whether the node was built
/// or not. Nodes held back by the release gate get neither.
pub trait BuildCallbacks {
    fn on_publication_start(&mut self, _key_path: &KeyPath, _publication: &Publication) {}

    /// Called with the built publication, or with the error that left it out.
    fn on_publication_end(
        &mut self,
        _key_path: &KeyPath,
        _outcome: Result<&Publication, &BuildError>,
    ) {
    }

    fn on_artifact_start(&mut self, _key_path: &KeyPath, _artifact: &UnbuiltArtifact) {}

    /// `None` when the artifact failed or its output is missing with
    /// `missing_ok` set.
    fn on_artifact_end(&mut self, _key_path: &KeyPath, _built: Option<&BuiltArtifact>) {}

    /// A publication or artifact is marked `ready: false` and was left out.
    fn on_not_ready(&mut self, _key_path: &KeyPath) {}

    /// A publication or artifact is not released yet and was left out.
    fn on_too_soon(&mut self, _key_path: &KeyPath, _release_time: NaiveDateTime) {}

    /// The output is missing but the artifact is `missing_ok`; it was left out.
    fn on_missing(&mut self, _key_path: &KeyPath, _path: &Path) {}

    /// An artifact failed to build. [`ErrorPolicy::Continue`] leaves its whole
    /// publication out and carries on.
    fn on_error(&mut self, _error: &BuildError) -> ErrorPolicy {
        ErrorPolicy::Abort
    }
}

/// Callbacks that do nothing and abort on the first error.
pub struct SilentCallbacks;

impl BuildCallbacks for SilentCallbacks {}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Build every released, ready artifact in `universe`.
///
/// Returns a new universe; `universe` itself is not modified. Collections are
/// kept even if all of their publications were left out.
#[instrument(skip_all, fields(now = %options.now))]
pub fn build(
    universe: &Universe,
    recipe: &dyn BuildRecipe,
    options: &BuildOptions,
    callbacks: &mut dyn BuildCallbacks,
) -> Result<Universe, BuildError> {
    let mut collections = BTreeMap::new();
    let mut built_count = 0usize;

    for (collection_key, collection) in universe.children() {
        let base = KeyPath::collection(collection_key);
        let mut publications = BTreeMap::new();

        for (publication_key, publication) in collection.children() {
            let key_path = base.publication(publication_key);

            let released = is_released(
                &key_path,
                publication.ready,
                publication.release_time,
                options,
                callbacks,
            );
            if !released {
                continue;
            }

            callbacks.on_publication_start(&key_path, publication);
            match build_publication(&key_path, publication, recipe, options, callbacks) {
                Ok(built) => {
                    built_count += built.artifacts.len();
                    callbacks.on_publication_end(&key_path, Ok(&built));
                    publications.insert(publication_key.clone(), built);
                }
                Err(err) => {
                    let policy = callbacks.on_error(&err);
                    callbacks.on_publication_end(&key_path, Err(&err));
                    match policy {
                        ErrorPolicy::Abort => return Err(err),
                        ErrorPolicy::Continue => {
                            warn!(publication = %key_path, error = %err, "leaving out publication");
                        }
                    }
                }
            }
        }

        collections.insert(collection_key.clone(), collection.with_children(publications));
    }

    info!(artifacts = built_count, "build complete");
    Ok(universe.with_children(collections))
}

/// Build a single unbuilt artifact.
///
/// Returns `Ok(None)` when the artifact is left out: not ready, not yet
/// released, or missing with `missing_ok` set.
pub fn build_artifact(
    key_path: &KeyPath,
    artifact: &UnbuiltArtifact,
    recipe: &dyn BuildRecipe,
    options: &BuildOptions,
    callbacks: &mut dyn BuildCallbacks,
) -> Result<Option<BuiltArtifact>, BuildError> {
    if !is_released(key_path, artifact.ready, artifact.release_time, options, callbacks) {
        return Ok(None);
    }

    callbacks.on_artifact_start(key_path, artifact);
    let result = run_recipe(key_path, artifact, recipe, callbacks);
    callbacks.on_artifact_end(key_path, result.as_ref().ok().and_then(Option::as_ref));
    result
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn run_recipe(
    key_path: &KeyPath,
    artifact: &UnbuiltArtifact,
    recipe: &dyn BuildRecipe,
    callbacks: &mut dyn BuildCallbacks,
) -> Result<Option<BuiltArtifact>, BuildError> {
    let path = recipe
        .run(key_path, artifact)
        .map_err(|cause| BuildError::new(key_path.clone(), cause))?;

    let built = BuiltArtifact {
        key: artifact.key.clone(),
        workdir: artifact.workdir.clone(),
        path,
    };

    let output = built.output_path();
    if !output.exists() {
        if artifact.missing_ok {
            debug!(
                artifact = %key_path,
                path = %output.display(),
                "output missing, but missing_ok"
            );
            callbacks.on_missing(key_path, &output);
            return Ok(None);
        }
        return Err(BuildError::new(
            key_path.clone(),
            BuildFailure::MissingOutput { path: output },
        ));
    }

    Ok(Some(built))
}

fn build_publication(
    key_path: &KeyPath,
    publication: &Publication,
    recipe: &dyn BuildRecipe,
    options: &BuildOptions,
    callbacks: &mut dyn BuildCallbacks,
) -> Result<Publication, BuildError> {
    let mut artifacts = BTreeMap::new();

    for (key, artifact) in publication.children() {
        let artifact_path = key_path.artifact(key);
        match artifact {
            Artifact::Unbuilt(unbuilt) => {
                if let Some(built) =
                    build_artifact(&artifact_path, unbuilt, recipe, options, callbacks)?
                {
                    artifacts.insert(key.clone(), Artifact::Built(built));
                }
            }
            Artifact::Built(_) => {
                artifacts.insert(key.clone(), artifact.clone());
            }
            Artifact::Published(_) => {
                return Err(BuildError::new(artifact_path, BuildFailure::AlreadyPublished));
            }
        }
    }

    Ok(publication.with_children(artifacts))
}

/// Release gate shared by publications and artifacts.
fn is_released(
    key_path: &KeyPath,
    ready: bool,
    release_time: Option<NaiveDateTime>,
    options: &BuildOptions,
    callbacks: &mut dyn BuildCallbacks,
) -> bool {
    if !ready {
        debug!(node = %key_path, "not ready");
        callbacks.on_not_ready(key_path);
        return false;
    }

    match release_time {
        Some(time) if time > options.now && !options.ignore_release_time => {
            debug!(node = %key_path, release_time = %time, "not yet released");
            callbacks.on_too_soon(key_path, time);
            false
        }
        _ => true,
    }
}
