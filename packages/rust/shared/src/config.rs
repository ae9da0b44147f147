//! Pipeline configuration.
//!
//! Lives in `coursepub.toml`, usually at the root of the source tree.
//! Relative paths in the file are resolved against the file's directory.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use coursepub_schema::parse_datetime;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "coursepub.toml";

// ---------------------------------------------------------------------------
// Config structs (matching coursepub.toml schema)
// ---------------------------------------------------------------------------

/// Top-level pipeline config, deserialized from TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub discover: DiscoverConfig,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub publish: PublishConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// External variables, available as `${vars.*}` in declaration files.
    #[serde(default)]
    pub vars: serde_json::Map<String, serde_json::Value>,
}

/// `[discover]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoverConfig {
    /// Root of the source tree.
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,

    /// Directory names skipped wherever they occur. The publish output
    /// directory is always skipped as well.
    #[serde(default = "default_skip_directories")]
    pub skip_directories: Vec<String>,

    /// Name of the collection declaration file.
    #[serde(default = "default_collection_file")]
    pub collection_file: String,

    /// Name of the publication declaration file.
    #[serde(default = "default_publication_file")]
    pub publication_file: String,
}

impl Default for DiscoverConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            skip_directories: default_skip_directories(),
            collection_file: default_collection_file(),
            publication_file: default_publication_file(),
        }
    }
}

fn default_input_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_skip_directories() -> Vec<String> {
    vec!["template".into()]
}
fn default_collection_file() -> String {
    "collection.yaml".into()
}
fn default_publication_file() -> String {
    "publication.yaml".into()
}

/// `[build]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Shell used to run recipes (`<shell> -c <recipe>`).
    #[serde(default = "default_shell")]
    pub shell: String,

    /// Build artifacts even if their release time has not been reached.
    #[serde(default)]
    pub ignore_release_time: bool,

    /// If non-empty, only artifacts with these keys are built and published.
    #[serde(default)]
    pub only_artifacts: Vec<String>,

    /// Time release times are compared against, instead of the current
    /// time. Accepts anything a datetime metadata field does.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub now: Option<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            ignore_release_time: false,
            only_artifacts: Vec::new(),
            now: None,
        }
    }
}

impl BuildConfig {
    /// The configured `now`, parsed. `Ok(None)` means the current time.
    pub fn now(&self) -> Result<Option<NaiveDateTime>> {
        self.now
            .as_deref()
            .map(|now| {
                parse_datetime(now).map_err(|e| Error::config(format!("invalid build.now: {e}")))
            })
            .transpose()
    }
}

fn default_shell() -> String {
    "sh".into()
}

/// `[publish]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Destination for published artifacts.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default)]
    pub mode: PublishMode,

    /// Name of the JSON snapshot written at the root of `output_dir`.
    #[serde(default = "default_snapshot_file")]
    pub snapshot_file: String,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            mode: PublishMode::default(),
            snapshot_file: default_snapshot_file(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("_published")
}
fn default_snapshot_file() -> String {
    "materials.json".into()
}

/// How built outputs reach the destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishMode {
    #[default]
    Copy,
    Move,
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default `tracing` filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_level() -> String {
    "info".into()
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl PipelineConfig {
    /// Resolve relative input/output directories against `base`.
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        if self.discover.input_dir.is_relative() {
            self.discover.input_dir = base.join(&self.discover.input_dir);
        }
        if self.publish.output_dir.is_relative() {
            self.publish.output_dir = base.join(&self.publish.output_dir);
        }
        self
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.discover.collection_file == self.discover.publication_file {
            return Err(Error::config(
                "collection_file and publication_file must differ",
            ));
        }
        if self.publish.snapshot_file.is_empty() {
            return Err(Error::config("snapshot_file must not be empty"));
        }
        if self.build.shell.is_empty() {
            return Err(Error::config("shell must not be empty"));
        }
        self.build.now()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Load `coursepub.toml` from `dir`. Returns defaults (rooted at `dir`) if the
/// file does not exist.
pub fn load_config(dir: &Path) -> Result<PipelineConfig> {
    let path = dir.join(CONFIG_FILE_NAME);

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(PipelineConfig::default().resolve_paths(dir));
    }

    load_config_from(&path)
}

/// Load the pipeline config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<PipelineConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;

    let config: PipelineConfig = toml::from_str(&content)
        .map_err(|e| Error::config(format!("failed to parse {}: {e}", path.display())))?;
    config.validate()?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    Ok(config.resolve_paths(base))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = PipelineConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("collection.yaml"));
        assert!(toml_str.contains("materials.json"));
    }

    #[test]
    fn config_roundtrip() {
        let config = PipelineConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: PipelineConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed, config);
    }

    #[test]
    fn config_with_vars_and_sections() {
        let toml_str = r#"
[discover]
skip_directories = ["template"]

[publish]
output_dir = "/tmp/out"
mode = "move"

[logging]
format = "json"

[vars.course]
name = "Intro to Automata"
"#;
        let config: PipelineConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.discover.skip_directories, vec!["template"]);
        assert_eq!(config.discover.publication_file, "publication.yaml");
        assert_eq!(config.publish.mode, PublishMode::Move);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.vars["course"]["name"], "Intro to Automata");
    }

    #[test]
    fn relative_paths_resolve_against_base() {
        let config = PipelineConfig::default().resolve_paths(Path::new("/course"));
        assert_eq!(config.discover.input_dir, PathBuf::from("/course/."));
        assert_eq!(config.publish.output_dir, PathBuf::from("/course/_published"));

        let mut absolute = PipelineConfig::default();
        absolute.publish.output_dir = PathBuf::from("/srv/www");
        let absolute = absolute.resolve_paths(Path::new("/course"));
        assert_eq!(absolute.publish.output_dir, PathBuf::from("/srv/www"));
    }

    #[test]
    fn validation_rejects_identical_file_names() {
        let mut config = PipelineConfig::default();
        config.discover.publication_file = config.discover.collection_file.clone();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("must differ"));
    }

    #[test]
    fn template_directories_are_skipped_by_default() {
        let config: PipelineConfig = toml::from_str("").expect("parse");
        assert_eq!(config.discover.skip_directories, vec!["template"]);
        assert_eq!(config.discover, DiscoverConfig::default());
    }

    #[test]
    fn now_override_is_parsed_and_validated() {
        let config: PipelineConfig =
            toml::from_str("[build]\nnow = \"2020-09-05 12:00\"\n").expect("parse");
        let now = config.build.now().expect("valid now").expect("some now");
        assert_eq!(now.to_string(), "2020-09-05 12:00:00");

        assert_eq!(PipelineConfig::default().build.now().expect("no now"), None);

        let mut config = PipelineConfig::default();
        config.build.now = Some("someday".into());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("build.now"));
    }

    #[test]
    fn missing_config_file_yields_defaults() {
        let dir = std::env::temp_dir().join("coursepub-config-test-missing");
        let config = load_config(&dir).expect("defaults");
        assert_eq!(config.publish.output_dir, dir.join("_published"));
    }
}
