//! Immutable, timestamped parquet snapshots of the produced tables.
//!
//! A snapshot file is named `{logical_name}_{YYYYMMDD_HHMMSS}.parquet`. Every table of one run
//! shares the run's stamp, which is how the loader selects a single run out of a directory.

use std::fmt::Display;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{Local, NaiveDateTime, Timelike};
use log::{debug, info};
use polars::prelude::{DataFrame, ParquetCompression, ParquetWriter};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{FootprintError, FootprintResult};

/// Logical snapshot names, one per produced table.
pub mod names {
    pub const COUNTRIES: &str = "dim_countries";
    pub const YEARS: &str = "dim_years";
    pub const RECORD_TYPES: &str = "dim_record_types";
    pub const MEASURES: &str = "fact_ecological_measures";
    pub const BALANCE: &str = "indicator_ecological_balance";
    pub const COMPOSITION: &str = "indicator_footprint_composition";
    pub const TIME_SERIES: &str = "indicator_time_series_changes";
    pub const BY_REGION: &str = "agg_by_region";
    pub const BY_INCOME: &str = "agg_by_income";
    pub const POPULATION_WEIGHTED: &str = "agg_population_weighted";
}

pub const EXTENSION: &str = "parquet";
const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Second-granularity creation time shared by all snapshots of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunStamp(NaiveDateTime);

impl RunStamp {
    pub fn now() -> Self {
        Self::from_datetime(Local::now().naive_local())
    }

    pub fn from_datetime(at: NaiveDateTime) -> Self {
        // Dropping sub-second precision cannot fail for a valid datetime.
        Self(at.with_nanosecond(0).unwrap_or(at))
    }

    pub fn parse(s: &str) -> FootprintResult<Self> {
        NaiveDateTime::parse_from_str(s, STAMP_FORMAT)
            .map(Self)
            .map_err(|_| FootprintError::InvalidRunStamp(s.to_string()))
    }

    pub fn datetime(&self) -> NaiveDateTime {
        self.0
    }
}

impl Display for RunStamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format(STAMP_FORMAT))
    }
}

impl Serialize for RunStamp {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RunStamp {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        RunStamp::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A snapshot file name split into its logical name and run stamp.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SnapshotName {
    pub name: String,
    pub stamp: RunStamp,
}

fn snapshot_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<name>.+)_(?P<stamp>\d{8}_\d{6})\.parquet$")
            .expect("snapshot name pattern is valid")
    })
}

impl SnapshotName {
    pub fn new(name: &str, stamp: RunStamp) -> Self {
        Self {
            name: name.to_string(),
            stamp,
        }
    }

    pub fn parse(file_name: &str) -> FootprintResult<Self> {
        let invalid = || FootprintError::InvalidSnapshotName(file_name.to_string());
        let captures = snapshot_regex().captures(file_name).ok_or_else(invalid)?;
        let stamp = RunStamp::parse(&captures["stamp"]).map_err(|_| invalid())?;
        Ok(Self {
            name: captures["name"].to_string(),
            stamp,
        })
    }

    pub fn file_name(&self) -> String {
        format!("{}_{}.{EXTENSION}", self.name, self.stamp)
    }
}

impl Display for SnapshotName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.file_name())
    }
}

/// Writes snapshots for one run into one directory.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    dir: PathBuf,
    stamp: RunStamp,
}

impl SnapshotWriter {
    pub fn new<P: AsRef<Path>>(dir: P, stamp: RunStamp) -> FootprintResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, stamp })
    }

    pub fn stamp(&self) -> RunStamp {
        self.stamp
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir
            .join(SnapshotName::new(name, self.stamp).file_name())
    }

    /// Write `df` as `{name}_{stamp}.parquet`. An existing snapshot is never overwritten.
    pub fn publish(&self, name: &str, df: &DataFrame) -> FootprintResult<PathBuf> {
        let path = self.path_for(name);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::AlreadyExists => FootprintError::SnapshotExists(path.clone()),
                _ => err.into(),
            })?;
        ParquetWriter::new(file)
            .with_compression(ParquetCompression::Zstd(None))
            .finish(&mut df.clone())?;
        info!("Saved {name} with {} rows to {}", df.height(), path.display());
        Ok(path)
    }
}

/// All parsable snapshots in `dir`, optionally restricted to one run, ordered by name then stamp.
/// Files that are not snapshots are ignored.
pub fn discover<P: AsRef<Path>>(
    dir: P,
    stamp: Option<RunStamp>,
) -> FootprintResult<Vec<(SnapshotName, PathBuf)>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(FootprintError::MissingSnapshotDir(dir.to_path_buf()));
    }
    let mut snapshots = vec![];
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        match SnapshotName::parse(file_name) {
            Ok(name) if stamp.map_or(true, |s| s == name.stamp) => snapshots.push((name, path)),
            Ok(_) => {}
            Err(_) => debug!("Ignoring non-snapshot file {}", path.display()),
        }
    }
    snapshots.sort();
    Ok(snapshots)
}

/// The stamp of the most recent run in `dir`, if any.
pub fn latest_stamp<P: AsRef<Path>>(dir: P) -> FootprintResult<Option<RunStamp>> {
    Ok(discover(dir, None)?
        .into_iter()
        .map(|(name, _)| name.stamp)
        .max())
}
