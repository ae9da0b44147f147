//! coursepub CLI: discover, build, and publish course materials.
//!
//! Usage: `coursepub [path/to/coursepub.toml]`. Without an argument the
//! configuration is read from `coursepub.toml` in the working directory,
//! falling back to defaults.

mod commands;

use color_eyre::eyre::Result;

fn main() -> Result<()> {
    color_eyre::install()?;
    let config = commands::load_config(std::env::args_os().nth(1))?;
    commands::init_tracing(&config.logging);
    commands::run(&config)
}
