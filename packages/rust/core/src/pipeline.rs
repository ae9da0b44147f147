//! End-to-end pipeline: discover → filter → build → publish → snapshot.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::NaiveDateTime;
use tracing::{info, instrument, warn};

use coursepub_artifacts::{
    BuildCallbacks, BuildOptions, BuildRecipe, PublishCallbacks, PublishOptions,
};
use coursepub_discovery::{DiscoverCallbacks, DiscoverOptions};
use coursepub_shared::{
    Artifact, BuiltArtifact, Error, KeyPath, PipelineConfig, Publication, PublishedArtifact,
    Result, Universe,
};

use crate::filter::{FilterCallbacks, FilterOptions, NodeRef, filter_nodes_with};
use crate::status::{Status, status};

/// Result of [`run_pipeline`].
#[derive(Debug)]
pub struct PipelineResult {
    /// The published universe, as written to the snapshot.
    pub universe: Universe,
    /// Where the snapshot was written.
    pub snapshot_path: PathBuf,
    /// Number of publications that made it to the output.
    pub publication_count: usize,
    /// Number of artifacts that made it to the output.
    pub artifact_count: usize,
    /// Artifacts held back by their release time or `ready` flag.
    pub status: Status,
    /// Total elapsed time.
    pub elapsed: std::time::Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when a single node has been handled.
    fn item(&self, detail: &str);
    /// Called when a node is left out for a reason worth surfacing.
    fn warning(&self, detail: &str);
    /// Called when the pipeline completes.
    fn done(&self, result: &PipelineResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item(&self, _detail: &str) {}
    fn warning(&self, _detail: &str) {}
    fn done(&self, _result: &PipelineResult) {}
}

/// Run the full pipeline described by `config`.
///
/// 1. Discover the materials under `discover.input_dir`
/// 2. Keep only `build.only_artifacts`, if set
/// 3. Build released artifacts with `recipe`
/// 4. Publish to `publish.output_dir`
/// 5. Write the published universe to `publish.snapshot_file`
#[instrument(
    skip_all,
    fields(
        input = %config.discover.input_dir.display(),
        output = %config.publish.output_dir.display(),
    )
)]
pub fn run_pipeline(
    config: &PipelineConfig,
    recipe: &dyn BuildRecipe,
    progress: &dyn ProgressReporter,
) -> Result<PipelineResult> {
    let start = Instant::now();
    config.validate()?;

    info!("starting publish pipeline");

    // --- Phase 1: Discovery ---
    progress.phase("Discovering materials");
    let mut adapter = PipelineCallbacks { inner: progress };
    let discovered = coursepub_discovery::discover(
        &config.discover.input_dir,
        &DiscoverOptions::from(config),
        &mut adapter,
    )?;

    // --- Phase 2: Artifact filter ---
    let only = &config.build.only_artifacts;
    let discovered = if only.is_empty() {
        discovered
    } else {
        progress.phase("Filtering artifacts");
        filter_nodes_with(
            &discovered,
            |_, node| match node {
                NodeRef::Artifact(Artifact::Unbuilt(artifact)) => only.contains(&artifact.key),
                _ => true,
            },
            &FilterOptions {
                remove_empty_nodes: true,
            },
            &mut adapter,
        )
    };

    // --- Phase 3: Build ---
    progress.phase("Building artifacts");
    let build_options = BuildOptions::from(config);
    let status = status(&discovered, build_options.now);
    for entry in &status.overdue {
        warn!(artifact = %entry.key_path, release_time = %entry.release_time, "overdue");
    }
    let built = coursepub_artifacts::build(&discovered, recipe, &build_options, &mut adapter)?;

    // --- Phase 4: Publish ---
    progress.phase("Publishing artifacts");
    let published = coursepub_artifacts::publish(
        &built,
        &config.publish.output_dir,
        &PublishOptions::from(config),
        &mut adapter,
    )?;

    // --- Phase 5: Snapshot ---
    progress.phase("Writing snapshot");
    let snapshot_path = config.publish.output_dir.join(&config.publish.snapshot_file);
    write_snapshot(&snapshot_path, &published)?;

    let result = PipelineResult {
        publication_count: published.publications().len(),
        artifact_count: published.artifacts().len(),
        status,
        universe: published,
        snapshot_path,
        elapsed: start.elapsed(),
    };

    progress.done(&result);

    info!(
        publications = result.publication_count,
        artifacts = result.artifact_count,
        elapsed_ms = result.elapsed.as_millis(),
        "publish pipeline complete"
    );

    Ok(result)
}

/// Write `universe` to `path` atomically (write to temp, then rename).
pub fn write_snapshot(path: &Path, universe: &Universe) -> Result<()> {
    let json = coursepub_shared::serialize(universe)?;

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            Error::config(format!("snapshot path {} has no file name", path.display()))
        })?;
    let temp = parent.join(format!(".{filename}.tmp"));

    std::fs::write(&temp, json).map_err(|e| Error::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| Error::io(path, e))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Progress adapter
// ---------------------------------------------------------------------------

/// Adapts a `ProgressReporter` to the stage callback interfaces.
struct PipelineCallbacks<'a> {
    inner: &'a dyn ProgressReporter,
}

impl DiscoverCallbacks for PipelineCallbacks<'_> {
    fn on_publication_end(&mut self, key_path: &KeyPath, publication: Option<&Publication>) {
        if publication.is_some() {
            self.inner.item(&format!("found {key_path}"));
        }
    }

    fn on_skip(&mut self, dir: &Path) {
        self.inner.item(&format!("skipped {}", dir.display()));
    }
}

impl FilterCallbacks for PipelineCallbacks<'_> {
    fn on_miss(&mut self, key_path: &KeyPath, _node: NodeRef<'_>) {
        self.inner.item(&format!("removing {key_path}"));
    }
}

impl BuildCallbacks for PipelineCallbacks<'_> {
    fn on_artifact_end(&mut self, key_path: &KeyPath, artifact: Option<&BuiltArtifact>) {
        if artifact.is_some() {
            self.inner.item(&format!("built {key_path}"));
        }
    }

    fn on_not_ready(&mut self, key_path: &KeyPath) {
        self.inner.warning(&format!("{key_path} is not ready, skipping"));
    }

    fn on_too_soon(&mut self, key_path: &KeyPath, release_time: NaiveDateTime) {
        self.inner
            .warning(&format!("{key_path} is not released until {release_time}, skipping"));
    }

    fn on_missing(&mut self, key_path: &KeyPath, path: &Path) {
        warn!(artifact = %key_path, path = %path.display(), "output missing, but missing_ok");
        self.inner
            .warning(&format!("{key_path}: {} is missing, but missing_ok", path.display()));
    }
}

impl PublishCallbacks for PipelineCallbacks<'_> {
    fn on_artifact_published(&mut self, key_path: &KeyPath, artifact: &PublishedArtifact) {
        self.inner
            .item(&format!("published {key_path} to {}", artifact.path.display()));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use coursepub_shared::{BuildFailure, UnbuiltArtifact};

    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cp-pipeline-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn copy_tree(src: &Path, dst: &Path) {
        std::fs::create_dir_all(dst).unwrap();
        for entry in std::fs::read_dir(src).unwrap() {
            let entry = entry.unwrap();
            let target = dst.join(entry.file_name());
            if entry.path().is_dir() {
                copy_tree(&entry.path(), &target);
            } else {
                std::fs::copy(entry.path(), target).unwrap();
            }
        }
    }

    /// A copy of the fixture tree, so recipes can write into it.
    fn fixture_config() -> (PathBuf, PipelineConfig) {
        let root = temp_dir();
        copy_tree(Path::new("../../../fixtures/materials"), &root);
        let config = coursepub_shared::load_config(&root).expect("fixture config");
        (root, config)
    }

    fn noop(_: &KeyPath, a: &UnbuiltArtifact) -> std::result::Result<PathBuf, BuildFailure> {
        Ok(a.path.clone())
    }

    #[derive(Default)]
    struct Recording {
        phases: Mutex<Vec<String>>,
        warnings: Mutex<Vec<String>>,
    }

    impl ProgressReporter for Recording {
        fn phase(&self, name: &str) {
            self.phases.lock().unwrap().push(name.to_string());
        }
        fn item(&self, _detail: &str) {}
        fn warning(&self, detail: &str) {
            self.warnings.lock().unwrap().push(detail.to_string());
        }
        fn done(&self, _result: &PipelineResult) {}
    }

    #[test]
    fn single_lecture_end_to_end() {
        let root = temp_dir();
        let input = root.join("materials");
        let out = root.join("out");
        std::fs::create_dir_all(input.join("lectures/01")).unwrap();
        std::fs::write(
            input.join("lectures/collection.yaml"),
            "publication_schema:\n  required_artifacts: [lecture.ipynb]\n",
        )
        .unwrap();
        std::fs::write(
            input.join("lectures/01/publication.yaml"),
            "metadata:\n  number: 1\n  topic: Intro\n  date: 2020-09-28\nartifacts:\n  lecture.ipynb:\n",
        )
        .unwrap();
        std::fs::write(input.join("lectures/01/lecture.ipynb"), "{}").unwrap();

        let mut config = PipelineConfig::default();
        config.discover.input_dir = input.clone();
        config.publish.output_dir = out.clone();

        let result = run_pipeline(&config, &noop, &SilentProgress).unwrap();

        assert_eq!(result.publication_count, 1);
        assert_eq!(result.artifact_count, 1);
        let artifact = result.universe.collections["lectures"].publications["01"].artifacts
            ["lecture.ipynb"]
            .as_published()
            .unwrap();
        assert_eq!(artifact.path, out.join("lectures/01/lecture.ipynb"));
        assert!(artifact.path.is_file());

        let snapshot = std::fs::read_to_string(out.join("materials.json")).unwrap();
        let restored: Universe = coursepub_shared::deserialize(&snapshot).unwrap();
        assert_eq!(restored, result.universe);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn fixture_tree_with_shell_recipes() {
        let (root, config) = fixture_config();
        let recipe = coursepub_artifacts::ShellRecipe::from(&config);
        let progress = Recording::default();

        let result = run_pipeline(&config, &recipe, &progress).unwrap();

        let published: Vec<String> = result
            .universe
            .artifacts()
            .into_iter()
            .map(|(k, _)| k.to_string())
            .collect();
        assert_eq!(
            published,
            [
                "default/syllabus/syllabus.md",
                "homeworks/01-intro/homework.pdf",
                "homeworks/01-intro/solution.pdf",
                "lectures/01-intro/lecture.ipynb",
                "lectures/02-python/lecture.ipynb",
            ]
        );
        assert!(root.join("_published/homeworks/01-intro/solution.pdf").is_file());
        assert!(result.snapshot_path.ends_with("_published/materials.json"));

        let warnings = progress.warnings.lock().unwrap();
        assert!(warnings.iter().any(|w| w.starts_with("homeworks/02-python is not ready")));
        assert!(warnings.iter().any(|w| w.contains("slides.pdf")));
        assert_eq!(
            *progress.phases.lock().unwrap(),
            [
                "Discovering materials",
                "Building artifacts",
                "Publishing artifacts",
                "Writing snapshot",
            ]
        );

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn only_artifacts_prunes_empty_nodes() {
        let (root, mut config) = fixture_config();
        config.build.only_artifacts = vec!["lecture.ipynb".into()];

        let result = run_pipeline(&config, &noop, &SilentProgress).unwrap();

        assert_eq!(
            result.universe.collections.keys().collect::<Vec<_>>(),
            ["lectures"]
        );
        assert_eq!(result.artifact_count, 2);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn build_failure_surfaces_key_path() {
        let (root, config) = fixture_config();
        let failing = |key_path: &KeyPath,
                       _: &UnbuiltArtifact|
         -> std::result::Result<PathBuf, BuildFailure> {
            Err(BuildFailure::Recipe(format!("cannot build {key_path}")))
        };

        let err = run_pipeline(&config, &failing, &SilentProgress).unwrap_err();
        match err {
            Error::Build(err) => {
                assert_eq!(err.key_path.to_string(), "default/syllabus/syllabus.md")
            }
            other => panic!("expected Build error, got {other:?}"),
        }
        assert!(!root.join("_published").exists());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn default_config_runs_twice_in_place() {
        let root = temp_dir();
        std::fs::create_dir_all(root.join("lectures/01")).unwrap();
        std::fs::write(
            root.join("lectures/collection.yaml"),
            "publication_schema:\n  required_artifacts: [lecture.ipynb]\n",
        )
        .unwrap();
        std::fs::write(
            root.join("lectures/01/publication.yaml"),
            "artifacts:\n  lecture.ipynb:\n",
        )
        .unwrap();
        std::fs::write(root.join("lectures/01/lecture.ipynb"), "{}").unwrap();

        let config = coursepub_shared::load_config(&root).expect("default config");
        let first = run_pipeline(&config, &noop, &SilentProgress).unwrap();
        assert!(root.join("_published/lectures/01/lecture.ipynb").is_file());

        let second = run_pipeline(&config, &noop, &SilentProgress).unwrap();
        assert_eq!(second.universe, first.universe);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn status_reports_held_back_artifacts() {
        let (root, mut config) = fixture_config();
        config.build.now = Some("2020-09-05 12:00".into());

        let result = run_pipeline(&config, &noop, &SilentProgress).unwrap();

        let pending: Vec<String> = result
            .status
            .pending
            .iter()
            .map(|e| e.key_path.to_string())
            .collect();
        assert_eq!(pending, ["homeworks/01-intro/solution.pdf"]);
        assert!(result.status.overdue.is_empty());
        let solution = KeyPath::collection("homeworks")
            .publication("01-intro")
            .artifact("solution.pdf");
        assert!(result.universe.artifact(&solution).is_none());

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn snapshot_write_is_atomic() {
        let dir = temp_dir();
        let path = dir.join("nested/materials.json");

        write_snapshot(&path, &Universe::default()).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("collections"));
        assert!(!dir.join("nested/.materials.json.tmp").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
