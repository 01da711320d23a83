use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::catalog;
use crate::loader::{ImportMode, TableMapping};
use crate::lookups::Lookups;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Root holding `countries/`, `years/`, `types/` and `data/` raw JSON folders.
    pub raw_data_path: String,
    /// Directory receiving the timestamped parquet snapshots.
    pub transformed_data_path: String,
    /// DuckDB database file. An empty string selects an in-memory store.
    pub db_path: String,
    /// Worker threads the store uses inside a single scan or aggregation.
    pub threads: usize,
    /// Wrap each load batch in a single transaction.
    pub transactional: bool,
    pub lookups: Lookups,
    pub load: LoadConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LoadConfig {
    pub table_mapping: TableMapping,
    /// Store tables loaded with keyed upsert rather than wholesale replacement.
    pub upsert_tables: Vec<String>,
    /// Store tables whose snapshots are appended to the existing rows.
    pub append_tables: Vec<String>,
}

impl LoadConfig {
    pub fn mode_for(&self, table: &str) -> ImportMode {
        if self.upsert_tables.iter().any(|t| t == table) {
            ImportMode::Upsert
        } else if self.append_tables.iter().any(|t| t == table) {
            ImportMode::Append
        } else {
            ImportMode::Replace
        }
    }
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            table_mapping: catalog::default_table_mapping(),
            upsert_tables: vec![catalog::tables::ECOLOGICAL_MEASURES.to_string()],
            append_tables: vec![],
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            raw_data_path: "data/raw".into(),
            transformed_data_path: "data/transformed".into(),
            db_path: "data/footprint_network.duckdb".into(),
            threads: 8,
            transactional: true,
            lookups: Lookups::default(),
            load: LoadConfig::default(),
        }
    }
}

impl Config {
    /// Read a TOML config file; missing keys take their default values.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Invalid TOML in config file {}", path.display()))
    }

    pub fn db_path(&self) -> Option<&Path> {
        (!self.db_path.is_empty()).then(|| Path::new(&self.db_path))
    }
}
