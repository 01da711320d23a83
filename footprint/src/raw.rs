//! Typed raw records as delivered by the footprint API, and a reader for the JSON folders the
//! extract step leaves on disk.
//!
//! Every field is optional: the API omits fields freely and sends identifiers either as strings
//! or as numbers. Validation of required keys happens in the cleaning stages, which decide
//! whether a record without a key is skipped.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::Context;
use itertools::Itertools;
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Raw folder names below the raw data root.
pub mod dirs {
    pub const COUNTRIES: &str = "countries";
    pub const YEARS: &str = "years";
    pub const RECORD_TYPES: &str = "types";
    pub const MEASURES: &str = "data";
}

/// Accept a JSON string or number and normalise it to a trimmed string.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_i32<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .and_then(|v| i32::try_from(v).ok()),
        Some(Value::String(s)) => s.trim().parse::<i32>().ok(),
        _ => None,
    })
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite()))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCountry {
    #[serde(default, deserialize_with = "lenient_string")]
    pub country_code: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub country_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub short_name: Option<String>,
    #[serde(default, rename = "isoa2", deserialize_with = "lenient_string")]
    pub iso_a2: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub score: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawYear {
    #[serde(default, deserialize_with = "lenient_i32")]
    pub year: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecordType {
    #[serde(default, deserialize_with = "lenient_string")]
    pub code: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub note: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub record: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMeasure {
    #[serde(default, deserialize_with = "lenient_string")]
    pub country_code: Option<String>,
    #[serde(default, deserialize_with = "lenient_i32")]
    pub year: Option<i32>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub record: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub crop_land: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub grazing_land: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub forest_land: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub fishing_ground: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub builtup_land: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub carbon: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub value: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub score: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub country_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub short_name: Option<String>,
    #[serde(default, rename = "isoa2", deserialize_with = "lenient_string")]
    pub iso_a2: Option<String>,
}

/// The four raw record families of one extraction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTables {
    pub countries: Vec<RawCountry>,
    pub years: Vec<RawYear>,
    pub record_types: Vec<RawRecordType>,
    pub measures: Vec<RawMeasure>,
}

/// Decode a JSON array element by element, skipping elements that do not fit `T`.
pub fn parse_records<T: DeserializeOwned>(json: &str, origin: &str) -> anyhow::Result<Vec<T>> {
    let values: Vec<Value> =
        serde_json::from_str(json).with_context(|| format!("Expected a JSON array in {origin}"))?;
    let total = values.len();
    let records = values
        .into_iter()
        .enumerate()
        .filter_map(|(idx, value)| match serde_json::from_value::<T>(value) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!("Skipping malformed record {idx} in {origin}: {err}");
                None
            }
        })
        .collect_vec();
    debug!("Decoded {}/{total} records from {origin}", records.len());
    Ok(records)
}

fn modified(path: &Path) -> SystemTime {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

/// JSON files in `dir`, newest first. A missing directory is an empty listing.
fn json_files_newest_first(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        warn!("Raw data directory {} not found", dir.display());
        return Ok(vec![]);
    }
    let files = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .sorted_by(|a, b| modified(b).cmp(&modified(a)).then_with(|| b.cmp(a)))
        .collect_vec();
    Ok(files)
}

fn read_latest<T: DeserializeOwned>(dir: &Path) -> anyhow::Result<Vec<T>> {
    match json_files_newest_first(dir)?.first() {
        Some(path) => read_file(path),
        None => {
            warn!("No raw data files found in {}", dir.display());
            Ok(vec![])
        }
    }
}

fn read_file<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    info!("Reading raw records from {}", path.display());
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_records(&json, &path.display().to_string())
}

impl RawTables {
    /// Read the latest country, year and record-type listings and every measures file below
    /// `root`. Unreadable measure files are logged and skipped.
    pub fn from_json_dir<P: AsRef<Path>>(root: P) -> anyhow::Result<Self> {
        let root = root.as_ref();
        let countries = read_latest(&root.join(dirs::COUNTRIES))?;
        let years = read_latest(&root.join(dirs::YEARS))?;
        let record_types = read_latest(&root.join(dirs::RECORD_TYPES))?;

        let mut measures = vec![];
        for path in json_files_newest_first(&root.join(dirs::MEASURES))? {
            match read_file::<RawMeasure>(&path) {
                Ok(mut records) => measures.append(&mut records),
                Err(err) => warn!("Failed to load measures from {}: {err:#}", path.display()),
            }
        }
        info!(
            "Raw tables: {} countries, {} years, {} record types, {} measures",
            countries.len(),
            years.len(),
            record_types.len(),
            measures.len()
        );
        Ok(Self {
            countries,
            years,
            record_types,
            measures,
        })
    }
}
