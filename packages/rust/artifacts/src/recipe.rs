//! Build recipes: how an unbuilt artifact becomes a file on disk.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use tracing::{debug, info};

use coursepub_shared::{BuildFailure, KeyPath, PipelineConfig, UnbuiltArtifact};

/// Produces the output file of one artifact.
///
/// Returns the output path, relative to the artifact's `workdir` or absolute.
pub trait BuildRecipe {
    fn run(&self, key_path: &KeyPath, artifact: &UnbuiltArtifact) -> Result<PathBuf, BuildFailure>;
}

impl<F> BuildRecipe for F
where
    F: Fn(&KeyPath, &UnbuiltArtifact) -> Result<PathBuf, BuildFailure>,
{
    fn run(&self, key_path: &KeyPath, artifact: &UnbuiltArtifact) -> Result<PathBuf, BuildFailure> {
        self(key_path, artifact)
    }
}

/// Runs each artifact's declared `recipe` through a shell, in the
/// publication directory.
///
/// Artifacts without a recipe are files provided as-is.
#[derive(Debug, Clone)]
pub struct ShellRecipe {
    shell: String,
}

impl ShellRecipe {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Default for ShellRecipe {
    fn default() -> Self {
        Self::new("sh")
    }
}

impl From<&PipelineConfig> for ShellRecipe {
    fn from(config: &PipelineConfig) -> Self {
        Self::new(config.build.shell.clone())
    }
}

impl BuildRecipe for ShellRecipe {
    fn run(&self, key_path: &KeyPath, artifact: &UnbuiltArtifact) -> Result<PathBuf, BuildFailure> {
        let Some(command) = &artifact.recipe else {
            return Ok(artifact.path.clone());
        };

        info!(artifact = %key_path, %command, "running recipe");

        let output = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .current_dir(&artifact.workdir)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| BuildFailure::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(BuildFailure::RecipeFailed {
                command: command.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!(artifact = %key_path, stdout = %stdout.trim(), "recipe output");
        }

        Ok(artifact.path.clone())
    }
}
