//! Config loading, logging setup, and the publish run.

use std::ffi::OsString;
use std::path::PathBuf;

use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use coursepub_artifacts::ShellRecipe;
use coursepub_core::{PipelineResult, ProgressReporter};
use coursepub_shared::{LogFormat, LoggingConfig, PipelineConfig};

// ---------------------------------------------------------------------------
// Config & logging
// ---------------------------------------------------------------------------

/// Load the pipeline config from `path`, or from the working directory.
pub(crate) fn load_config(path: Option<OsString>) -> Result<PipelineConfig> {
    let config = match path {
        Some(path) => coursepub_shared::load_config_from(&PathBuf::from(path))?,
        None => {
            let cwd = std::env::current_dir()
                .map_err(|e| eyre!("cannot determine working directory: {e}"))?;
            coursepub_shared::load_config(&cwd)?
        }
    };
    Ok(config)
}

/// Initialize the tracing subscriber. `RUST_LOG` overrides the configured level.
pub(crate) fn init_tracing(logging: &LoggingConfig) {
    use tracing_subscriber::{EnvFilter, fmt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    match logging.format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Run the pipeline and print a summary.
pub(crate) fn run(config: &PipelineConfig) -> Result<()> {
    info!(
        input = %config.discover.input_dir.display(),
        output = %config.publish.output_dir.display(),
        "publishing materials"
    );

    let recipe = ShellRecipe::from(config);
    let reporter = CliProgress::new();

    let result = coursepub_core::run_pipeline(config, &recipe, &reporter)?;

    println!();
    println!("  Materials published successfully!");
    println!("  Publications: {}", result.publication_count);
    println!("  Artifacts:    {}", result.artifact_count);
    println!("  Snapshot:     {}", result.snapshot_path.display());
    println!("  Time:         {:.1}s", result.elapsed.as_secs_f64());
    println!();
    print_status(&result);

    Ok(())
}

/// List artifacts still waiting for their release time, and those past it
/// that are not ready.
fn print_status(result: &PipelineResult) {
    let status = &result.status;
    if status.is_empty() {
        return;
    }

    if !status.pending.is_empty() {
        println!("  Pending:");
        for entry in &status.pending {
            println!("    {}  {}", entry.path.display(), entry.release_time);
        }
    }
    if !status.overdue.is_empty() {
        println!("  Overdue:");
        for entry in &status.overdue {
            println!("    {}  {}", entry.path.display(), entry.release_time);
        }
    }
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.println(format!("{name}:"));
        self.spinner.set_message(name.to_string());
    }

    fn item(&self, detail: &str) {
        self.spinner.set_message(detail.to_string());
    }

    fn warning(&self, detail: &str) {
        self.spinner.println(format!("  ! {detail}"));
    }

    fn done(&self, _result: &PipelineResult) {
        self.spinner.finish_and_clear();
    }
}
