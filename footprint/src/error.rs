//! Error types.

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum FootprintError {
    #[error("Store connection failure: {0}")]
    FailedConnection(String),
    #[error("Store handle is closed.")]
    StoreClosed,
    #[error("Snapshot directory not found: {0}")]
    MissingSnapshotDir(PathBuf),
    #[error("Snapshot already exists: {0}")]
    SnapshotExists(PathBuf),
    #[error("Invalid snapshot file name: {0}")]
    InvalidSnapshotName(String),
    #[error("No key definition for upsert into table {0}")]
    MissingTableKey(String),
    #[error("Invalid run timestamp: {0}")]
    InvalidRunStamp(String),
    #[error("Wrapped polars error: {0}")]
    PolarsError(#[from] polars::error::PolarsError),
    #[error("Wrapped duckdb error: {0}")]
    DuckDbError(#[from] duckdb::Error),
    #[error("Wrapped serde JSON error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),
    #[error("Wrapped IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type FootprintResult<T> = Result<T, FootprintError>;
