use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use enum_dispatch::enum_dispatch;
use footprint::{
    config::Config,
    loader::{BatchOutcome, Loader},
    pipeline::Pipeline,
    snapshot::{self, RunStamp},
};
use log::{debug, info};
use spinners::{Spinner, Spinners};

use crate::display::{display_load_outcome, display_run_summary};
use crate::error::{FootprintCliError, FootprintCliResult};

const DEFAULT_PROGRESS_SPINNER: Spinners = Spinners::Dots;
const COMPLETE_PROGRESS_STRING: &str = "✔";
const RUNNING_TAIL_STRING: &str = "...";

fn start_spinner(quiet: bool, message: &str) -> Option<Spinner> {
    (!quiet).then(|| {
        Spinner::with_timer(
            DEFAULT_PROGRESS_SPINNER,
            message.to_string() + RUNNING_TAIL_STRING,
        )
    })
}

fn stop_spinner(sp: Option<Spinner>) {
    if let Some(mut s) = sp {
        s.stop_with_symbol(COMPLETE_PROGRESS_STRING);
    }
}

fn parse_stamp(s: &str) -> Result<RunStamp, String> {
    RunStamp::parse(s).map_err(|err| err.to_string())
}

/// Trait that defines what to run when a given subcommand is invoked.
#[enum_dispatch]
pub trait RunCommand {
    fn run(&self, config: Config) -> FootprintCliResult<()>;
}

/// Overrides for the locations in the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct PathArgs {
    #[arg(long, help = "Directory holding the raw JSON folders")]
    raw_dir: Option<PathBuf>,
    #[arg(long, help = "Directory receiving the parquet snapshots")]
    snapshot_dir: Option<PathBuf>,
    #[arg(long, help = "DuckDB database file")]
    db_path: Option<PathBuf>,
}

impl PathArgs {
    fn apply(&self, mut config: Config) -> Config {
        if let Some(raw_dir) = &self.raw_dir {
            config.raw_data_path = raw_dir.display().to_string();
        }
        if let Some(snapshot_dir) = &self.snapshot_dir {
            config.transformed_data_path = snapshot_dir.display().to_string();
        }
        if let Some(db_path) = &self.db_path {
            config.db_path = db_path.display().to_string();
        }
        config
    }
}

/// The `transform` command cleans raw data and publishes a new run of snapshots.
#[derive(Args, Debug)]
pub struct TransformCommand {
    #[command(flatten)]
    paths: PathArgs,
    #[arg(from_global)]
    quiet: bool,
}

impl TransformCommand {
    fn transform(&self, config: &Config) -> FootprintCliResult<RunStamp> {
        let sp = start_spinner(self.quiet, "Transforming raw data");
        let summary = Pipeline::new(config.clone()).transform_dir(RunStamp::now())?;
        stop_spinner(sp);
        display_run_summary(&summary);
        println!("\nRun timestamp: {}", summary.stamp);
        Ok(summary.stamp)
    }
}

impl RunCommand for TransformCommand {
    fn run(&self, config: Config) -> FootprintCliResult<()> {
        info!("Running `transform` subcommand");
        self.transform(&self.paths.apply(config))?;
        Ok(())
    }
}

/// The `load` command imports one run of snapshots into the store and rebuilds indexes and views.
#[derive(Args, Debug)]
pub struct LoadCommand {
    #[command(flatten)]
    paths: PathArgs,
    #[arg(
        short = 't',
        long,
        value_parser = parse_stamp,
        help = "Run timestamp (YYYYMMDD_HHMMSS) to load; defaults to the most recent run"
    )]
    timestamp: Option<RunStamp>,
    #[arg(
        long = "all-runs",
        conflicts_with = "timestamp",
        help = "Load every run found in the snapshot directory, oldest first"
    )]
    all_runs: bool,
    #[arg(
        long = "no-transaction",
        help = "Import each table on its own instead of as one all-or-nothing batch"
    )]
    no_transaction: bool,
    #[arg(from_global)]
    quiet: bool,
}

impl LoadCommand {
    fn load(&self, mut config: Config, stamp: Option<RunStamp>) -> FootprintCliResult<()> {
        if self.no_transaction {
            config.transactional = false;
        }
        let stamp = match (stamp, self.all_runs) {
            (Some(stamp), _) => Some(stamp),
            (None, true) => None,
            (None, false) => {
                let latest = snapshot::latest_stamp(&config.transformed_data_path)?;
                Some(latest.ok_or_else(|| {
                    FootprintCliError::NoSnapshots(config.transformed_data_path.clone())
                })?)
            }
        };
        debug!("Loading run {stamp:?}");
        let sp = start_spinner(self.quiet, "Loading snapshots");
        let dir = config.transformed_data_path.clone();
        let outcome = Pipeline::new(config).load(&dir, stamp)?;
        stop_spinner(sp);
        display_load_outcome(&outcome);
        match outcome.report.outcome {
            BatchOutcome::RolledBack { table, reason } => {
                Err(FootprintCliError::BatchRolledBack { table, reason })
            }
            _ => Ok(()),
        }
    }
}

impl RunCommand for LoadCommand {
    fn run(&self, config: Config) -> FootprintCliResult<()> {
        info!("Running `load` subcommand");
        self.load(self.paths.apply(config), self.timestamp)
    }
}

/// The `run` command transforms raw data and loads the resulting run.
#[derive(Args, Debug)]
pub struct RunAllCommand {
    #[command(flatten)]
    paths: PathArgs,
    #[arg(
        long = "no-transaction",
        help = "Import each table on its own instead of as one all-or-nothing batch"
    )]
    no_transaction: bool,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for RunAllCommand {
    fn run(&self, config: Config) -> FootprintCliResult<()> {
        info!("Running `run` subcommand");
        let config = self.paths.apply(config);
        let transform = TransformCommand {
            paths: PathArgs::default(),
            quiet: self.quiet,
        };
        let stamp = transform.transform(&config)?;
        let load = LoadCommand {
            paths: PathArgs::default(),
            timestamp: Some(stamp),
            all_runs: false,
            no_transaction: self.no_transaction,
            quiet: self.quiet,
        };
        load.load(config, Some(stamp))
    }
}

/// The `init` command creates the keyed base tables in the store.
#[derive(Args, Debug)]
pub struct InitCommand {
    #[arg(long, help = "DuckDB database file")]
    db_path: Option<PathBuf>,
}

impl RunCommand for InitCommand {
    fn run(&self, mut config: Config) -> FootprintCliResult<()> {
        info!("Running `init` subcommand");
        if let Some(db_path) = &self.db_path {
            config.db_path = db_path.display().to_string();
        }
        let mut loader = Loader::from_config(&config);
        loader.create_base_tables()?;
        loader.close();
        println!("Base tables ready in {}", config.db_path);
        Ok(())
    }
}

#[derive(Parser, Debug)]
#[command(version, about="Transform ecological footprint data and load it into an analytical store", long_about = None, name="footprint")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
    #[arg(
        short = 'c',
        long = "config",
        help = "Config file to use instead of the one in the user config directory",
        global = true
    )]
    pub config: Option<PathBuf>,
    #[arg(
        short = 'q',
        long = "quiet",
        help = "\
            Do not print progress bar to stdout. Results and logs (when `RUST_LOG`\n\
            is set) will still be printed.",
        global = true
    )]
    quiet: bool,
}

/// Commands contains the list of subcommands avaliable for use in the CLI.
/// Each command should implmement the RunCommand trait and specify the list
/// of arguments available to the command.
#[derive(Subcommand, Debug)]
#[enum_dispatch(RunCommand)]
pub enum Commands {
    /// Clean raw data and publish a new run of snapshots
    Transform(TransformCommand),
    /// Load a run of snapshots into the store, then build indexes and views
    Load(LoadCommand),
    /// Transform and load in one go
    Run(RunAllCommand),
    /// Create the keyed base tables
    Init(InitCommand),
}
