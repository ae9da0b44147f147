//! Source tree discovery.
//!
//! Walks an input directory laid out as collections of publications, reads
//! every declaration file, validates it, and assembles a [`Universe`] of
//! unbuilt artifacts:
//!
//! ```text
//! input/
//!   lectures/              collection (collection.yaml)
//!     01-intro/            publication (publication.yaml)
//!     02-python/
//!   syllabus/              stand-alone publication, goes to "default"
//! ```
//!
//! Callbacks observe the walk in lexicographic key order and may skip nodes,
//! stop early, or downgrade errors to warnings.

mod interpolate;
mod parser;
mod resolve;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use coursepub_shared::{
    Artifact, Collection, DEFAULT_COLLECTION, DiscoveryError, ErrorPolicy, KeyPath,
    PipelineConfig, Publication, PublicationSchema, UnbuiltArtifact, Universe,
};

pub use interpolate::InterpolationError;
pub use parser::{
    ArtifactDeclaration, PublicationContext, PublicationDeclaration, read_collection_file,
    read_publication_file,
};
pub use resolve::{Resolved, resolve};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for the discovery walk.
#[derive(Debug, Clone)]
pub struct DiscoverOptions {
    /// Directory names skipped wherever they occur.
    pub skip_directories: Vec<String>,
    /// Directories skipped by location, such as an output directory inside
    /// the source tree. Relative paths are taken from the working directory.
    pub exclude: Vec<PathBuf>,
    pub collection_file: String,
    pub publication_file: String,
    /// External variables, available as `${vars.*}`.
    pub vars: Map<String, Value>,
}

impl Default for DiscoverOptions {
    fn default() -> Self {
        Self {
            exclude: Vec::new(),
            ..Self::from(&PipelineConfig::default())
        }
    }
}

impl From<&PipelineConfig> for DiscoverOptions {
    /// The publish output directory is excluded so that published files are
    /// never mistaken for sources.
    fn from(config: &PipelineConfig) -> Self {
        Self {
            skip_directories: config.discover.skip_directories.clone(),
            exclude: vec![config.publish.output_dir.clone()],
            collection_file: config.discover.collection_file.clone(),
            publication_file: config.discover.publication_file.clone(),
            vars: config.vars.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Callbacks
// ---------------------------------------------------------------------------

/// What to do with a node announced by a start hook.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Visit {
    #[default]
    Continue,
    /// Leave this node out of the universe.
    Skip,
    /// End the walk, keeping what was discovered so far.
    Stop,
}

/// Hooks invoked during [`discover`]. Every method defaults to a no-op.
///
/// Start and end hooks are paired: every start hook that returns
/// [`Visit::Continue`] is followed by its end hook, unless the walk aborts.
/// The end hook gets `None` when the node failed and [`on_error`] chose to
/// continue.
///
/// [`on_error`]: DiscoverCallbacks::on_error
pub trait DiscoverCallbacks {
    fn on_collection_start(&mut self, _key: &str, _dir: &Path) -> Visit {
        Visit::Continue
    }

    fn on_collection_end(&mut self, _key: &str, _collection: Option<&Collection>) {}

    fn on_publication_start(&mut self, _key_path: &KeyPath, _dir: &Path) -> Visit {
        Visit::Continue
    }

    fn on_publication_end(&mut self, _key_path: &KeyPath, _publication: Option<&Publication>) {}

    /// A directory was left out because it is in the skip list or a start
    /// hook returned [`Visit::Skip`].
    fn on_skip(&mut self, _dir: &Path) {}

    /// A collection or publication failed. [`ErrorPolicy::Continue`] drops
    /// the failing node and keeps walking.
    fn on_error(&mut self, _error: &DiscoveryError) -> ErrorPolicy {
        ErrorPolicy::Abort
    }
}

/// Callbacks that do nothing and abort on the first error.
pub struct SilentCallbacks;

impl DiscoverCallbacks for SilentCallbacks {}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Discover every collection and publication under `root`.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn discover(
    root: &Path,
    options: &DiscoverOptions,
    callbacks: &mut dyn DiscoverCallbacks,
) -> Result<Universe, DiscoveryError> {
    let root = std::path::absolute(root).map_err(|e| DiscoveryError::io(root, e))?;
    let excluded = options
        .exclude
        .iter()
        .map(|path| std::path::absolute(path).map_err(|e| DiscoveryError::io(path, e)))
        .collect::<Result<Vec<_>, _>>()?;

    let mut walker = Walker {
        options,
        excluded,
        callbacks,
    };
    let universe = walker.walk(&root)?;

    info!(
        collections = universe.collections.len(),
        publications = universe.publications().len(),
        artifacts = universe.artifacts().len(),
        "discovery complete"
    );
    Ok(universe)
}

// ---------------------------------------------------------------------------
// Walker
// ---------------------------------------------------------------------------

enum Flow {
    Continue,
    Stop,
}

/// A top-level entry of the input directory.
enum Entry {
    Collection(PathBuf),
    /// The stand-alone publications making up the `default` collection.
    Default(Vec<(String, PathBuf)>),
}

struct Walker<'a> {
    options: &'a DiscoverOptions,
    excluded: Vec<PathBuf>,
    callbacks: &'a mut dyn DiscoverCallbacks,
}

impl Walker<'_> {
    fn walk(&mut self, root: &Path) -> Result<Universe, DiscoveryError> {
        let mut entries: BTreeMap<String, Entry> = BTreeMap::new();
        let mut standalone = Vec::new();

        for (key, dir) in self.subdirectories(root)? {
            if dir.join(&self.options.collection_file).is_file() {
                entries.insert(key, Entry::Collection(dir));
            } else if dir.join(&self.options.publication_file).is_file() {
                standalone.push((key, dir));
            } else {
                let err = DiscoveryError::MissingDeclaration {
                    dir,
                    expected: format!(
                        "{} or {}",
                        self.options.collection_file, self.options.publication_file
                    ),
                };
                self.recover(err)?;
            }
        }

        if !standalone.is_empty() {
            if entries.contains_key(DEFAULT_COLLECTION) {
                return Err(DiscoveryError::DuplicateKey {
                    key: DEFAULT_COLLECTION.to_string(),
                    path: root.join(DEFAULT_COLLECTION),
                });
            }
            entries.insert(DEFAULT_COLLECTION.to_string(), Entry::Default(standalone));
        }

        let mut collections = BTreeMap::new();
        for (key, entry) in entries {
            let (visited, flow) = match entry {
                Entry::Collection(dir) => self.visit_collection(&key, &dir)?,
                Entry::Default(publications) => self.visit_default(root, publications)?,
            };
            if let Some(collection) = visited {
                collections.insert(key, collection);
            }
            if let Flow::Stop = flow {
                debug!("walk stopped by callback");
                break;
            }
        }

        Ok(Universe::new(collections))
    }

    fn visit_collection(
        &mut self,
        key: &str,
        dir: &Path,
    ) -> Result<(Option<Collection>, Flow), DiscoveryError> {
        match self.callbacks.on_collection_start(key, dir) {
            Visit::Continue => {}
            Visit::Skip => {
                self.callbacks.on_skip(dir);
                return Ok((None, Flow::Continue));
            }
            Visit::Stop => return Ok((None, Flow::Stop)),
        }

        let file = dir.join(&self.options.collection_file);
        let mut collection = match read_collection_file(&file, &self.options.vars) {
            Ok(collection) => collection,
            Err(err) => return self.drop_collection(key, err),
        };
        debug!(collection = key, "found collection");

        let subdirectories = match self.subdirectories(dir) {
            Ok(subdirectories) => subdirectories,
            Err(err) => return self.drop_collection(key, err),
        };

        let mut publications = Vec::new();
        for (pub_key, pub_dir) in subdirectories {
            if pub_dir.join(&self.options.collection_file).is_file() {
                self.recover(DiscoveryError::NestedCollection { path: pub_dir })?;
            } else if !pub_dir.join(&self.options.publication_file).is_file() {
                self.recover(DiscoveryError::MissingDeclaration {
                    dir: pub_dir,
                    expected: self.options.publication_file.clone(),
                })?;
            } else {
                publications.push((pub_key, pub_dir));
            }
        }

        let flow = self.visit_publications(key, &mut collection, publications)?;
        self.callbacks.on_collection_end(key, Some(&collection));
        Ok((Some(collection), flow))
    }

    /// Report a failed collection and close it with an empty end hook.
    fn drop_collection(
        &mut self,
        key: &str,
        err: DiscoveryError,
    ) -> Result<(Option<Collection>, Flow), DiscoveryError> {
        self.recover(err)?;
        self.callbacks.on_collection_end(key, None);
        Ok((None, Flow::Continue))
    }

    fn visit_default(
        &mut self,
        root: &Path,
        publications: Vec<(String, PathBuf)>,
    ) -> Result<(Option<Collection>, Flow), DiscoveryError> {
        match self.callbacks.on_collection_start(DEFAULT_COLLECTION, root) {
            Visit::Continue => {}
            Visit::Skip => {
                for (_, dir) in &publications {
                    self.callbacks.on_skip(dir);
                }
                return Ok((None, Flow::Continue));
            }
            Visit::Stop => return Ok((None, Flow::Stop)),
        }

        let mut collection = Collection::new(PublicationSchema::permissive());
        let flow = self.visit_publications(DEFAULT_COLLECTION, &mut collection, publications)?;
        self.callbacks
            .on_collection_end(DEFAULT_COLLECTION, Some(&collection));

        if collection.publications.is_empty() {
            return Ok((None, flow));
        }
        Ok((Some(collection), flow))
    }

    fn visit_publications(
        &mut self,
        collection_key: &str,
        collection: &mut Collection,
        publications: Vec<(String, PathBuf)>,
    ) -> Result<Flow, DiscoveryError> {
        let base = KeyPath::collection(collection_key);
        let mut previous: Option<String> = None;

        for (key, dir) in publications {
            let key_path = base.publication(&key);
            match self.callbacks.on_publication_start(&key_path, &dir) {
                Visit::Continue => {}
                Visit::Skip => {
                    self.callbacks.on_skip(&dir);
                    continue;
                }
                Visit::Stop => return Ok(Flow::Stop),
            }

            let ctx = PublicationContext {
                collection_key,
                publication_key: &key,
                schema: &collection.publication_schema,
                vars: &self.options.vars,
                previous: previous
                    .as_ref()
                    .filter(|_| collection.publication_schema.is_ordered)
                    .and_then(|k| collection.publications.get(k)),
            };

            let file = dir.join(&self.options.publication_file);
            let declaration = match read_publication_file(&file, &ctx) {
                Ok(declaration) => declaration,
                Err(err) => {
                    self.recover(err)?;
                    self.callbacks.on_publication_end(&key_path, None);
                    continue;
                }
            };

            let mut publication = declaration.publication;
            publication.artifacts = scan_artifacts(&key_path, &dir, declaration.artifacts);

            debug!(
                publication = %key_path,
                artifacts = publication.artifacts.len(),
                "found publication"
            );
            self.callbacks.on_publication_end(&key_path, Some(&publication));
            collection.publications.insert(key.clone(), publication);
            previous = Some(key);
        }

        Ok(Flow::Continue)
    }

    /// Non-hidden, non-skipped subdirectories of `dir`, sorted by name.
    fn subdirectories(&mut self, dir: &Path) -> Result<Vec<(String, PathBuf)>, DiscoveryError> {
        let read_dir = std::fs::read_dir(dir).map_err(|e| DiscoveryError::io(dir, e))?;

        let mut found = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| DiscoveryError::io(dir, e))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let skipped = self.options.skip_directories.iter().any(|s| *s == name)
                || self.excluded.iter().any(|excluded| *excluded == path);
            if skipped {
                debug!(dir = %path.display(), "skipping directory");
                self.callbacks.on_skip(&path);
                continue;
            }
            found.push((name, path));
        }

        found.sort();
        Ok(found)
    }

    /// Hand an error to the callbacks; `Ok` means it was downgraded.
    fn recover(&mut self, err: DiscoveryError) -> Result<(), DiscoveryError> {
        match self.callbacks.on_error(&err) {
            ErrorPolicy::Abort => Err(err),
            ErrorPolicy::Continue => {
                warn!(error = %err, "continuing past discovery error");
                Ok(())
            }
        }
    }
}

/// Turn declared artifacts into unbuilt artifacts rooted at `dir`.
fn scan_artifacts(
    key_path: &KeyPath,
    dir: &Path,
    declarations: BTreeMap<String, ArtifactDeclaration>,
) -> BTreeMap<String, Artifact> {
    declarations
        .into_iter()
        .map(|(key, declaration)| {
            let artifact = UnbuiltArtifact {
                path: PathBuf::from(declaration.file.as_deref().unwrap_or(&key)),
                key: key.clone(),
                workdir: dir.to_path_buf(),
                recipe: declaration.recipe,
                release_time: declaration.release_time,
                ready: declaration.ready,
                missing_ok: declaration.missing_ok,
            };
            if artifact.recipe.is_none() && !artifact.source_path().exists() {
                warn!(
                    artifact = %key_path.artifact(&key),
                    path = %artifact.source_path().display(),
                    "declared artifact has no recipe and no file"
                );
            }
            (key, Artifact::Unbuilt(artifact))
        })
        .collect()
}
