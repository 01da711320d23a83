mod cli;
mod display;
mod error;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use cli::{Cli, RunCommand};
use error::{FootprintCliError, FootprintCliResult};
use footprint::config::Config;
use log::{debug, info};

const DEFAULT_LOGGING_LEVEL: &str = "warn";

fn main() -> Result<()> {
    // Set RUST_LOG to `DEFAULT_LOGGING_LEVEL` if not set
    let _ =
        std::env::var("RUST_LOG").map_err(|_| std::env::set_var("RUST_LOG", DEFAULT_LOGGING_LEVEL));
    pretty_env_logger::init_timed();
    let args = Cli::parse();
    debug!("args: {args:?}");
    let config = read_config(args.config.as_deref())?;
    debug!("config: {config:?}");

    if let Some(command) = args.command {
        command.run(config)?;
    }
    Ok(())
}

fn default_config_path() -> Option<PathBuf> {
    // macOS: ~/Library/Application Support/footprint/config.toml
    dirs::config_dir().map(|dir| dir.join("footprint").join("config.toml"))
}

/// Reads the config from `path`, or from the user config directory when no path is given.
/// A missing default file falls back to the default config; a missing explicit file is an error.
fn read_config(path: Option<&Path>) -> FootprintCliResult<Config> {
    let (file_path, explicit) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => match default_config_path() {
            Some(path) => (path, false),
            None => return Ok(Config::default()),
        },
    };
    if !explicit && !file_path.exists() {
        info!("No config at {}, using defaults", file_path.display());
        return Ok(Config::default());
    }
    Config::from_toml_file(&file_path).map_err(|err| {
        FootprintCliError::ConfigError(format!("{err:#}"))
    })
}
