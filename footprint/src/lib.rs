use anyhow::Result;
use log::debug;

use crate::config::Config;
use crate::pipeline::{LoadOutcome, Pipeline, RunSummary};
use crate::snapshot::RunStamp;

// Re-exports
pub use column_names as COL;

// Modules
pub mod aggregations;
pub mod catalog;
pub mod column_names;
pub mod config;
pub mod dimensions;
pub mod error;
pub mod facts;
pub mod indicators;
pub mod loader;
pub mod lookups;
pub mod pipeline;
pub mod raw;
pub mod records;
pub mod reshape;
pub mod schema;
pub mod snapshot;
pub mod table;

/// Entry point for the footprint transform and load pipeline
pub struct Footprint {
    pub config: Config,
    pipeline: Pipeline,
}

impl Footprint {
    /// Setup with default configuration
    pub fn new() -> Self {
        Self::new_with_config(Config::default())
    }

    /// Setup with custom configuration
    pub fn new_with_config(config: Config) -> Self {
        debug!("config: {config:?}");
        let pipeline = Pipeline::new(config.clone());
        Self { config, pipeline }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Transforms the configured raw data into a new run of snapshots
    pub fn transform(&self) -> Result<RunSummary> {
        self.pipeline.transform_dir(RunStamp::now())
    }

    /// Loads one run of snapshots, or every run when `stamp` is `None`, into the store
    pub fn load(&self, stamp: Option<RunStamp>) -> Result<LoadOutcome> {
        self.pipeline
            .load(&self.config.transformed_data_path, stamp)
    }

    /// Transforms then loads the run just produced
    pub fn run(&self) -> Result<(RunSummary, LoadOutcome)> {
        let summary = self.transform()?;
        let outcome = self.load(Some(summary.stamp))?;
        Ok((summary, outcome))
    }
}

impl Default for Footprint {
    fn default() -> Self {
        Self::new()
    }
}
