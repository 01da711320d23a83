use footprint::error::FootprintError;

#[derive(thiserror::Error, Debug)]
pub enum FootprintCliError {
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("footprint error: {0}")]
    FootprintError(#[from] FootprintError),
    #[error("std IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid config file: {0}")]
    ConfigError(String),
    #[error("No snapshots found in {0}")]
    NoSnapshots(String),
    #[error("Load rolled back after failing to import {table}: {reason}")]
    BatchRolledBack { table: String, reason: String },
}

pub type FootprintCliResult<T> = Result<T, FootprintCliError>;
