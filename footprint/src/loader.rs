//! The transactional bulk loader: snapshots into DuckDB tables, then indexes and views.
//!
//! The loader moves through `Idle -> Connected -> BatchInProgress -> (Committed | RolledBack)`
//! and finally `Closed`. Any operation on an idle loader opens the store first; operations on a
//! closed loader fail with [`FootprintError::StoreClosed`].

use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};

use duckdb::{params, Connection};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use strum_macros::{Display as StrumDisplay, EnumString};

use crate::catalog::{IndexSpec, ViewSpec};
use crate::config::{Config, LoadConfig};
use crate::error::{FootprintError, FootprintResult};
use crate::schema::{self, BASE_TABLES};
use crate::snapshot::{self, RunStamp};

/// Snapshot logical name to store table name. Names without an entry load into a table of the
/// same name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableMapping(BTreeMap<String, String>);

impl TableMapping {
    pub fn from_pairs<'a, I: IntoIterator<Item = (&'a str, &'a str)>>(pairs: I) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    pub fn table_for<'a>(&'a self, name: &'a str) -> &'a str {
        self.0.get(name).map(String::as_str).unwrap_or(name)
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, StrumDisplay, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ImportMode {
    /// Drop and recreate the table from the snapshot.
    #[default]
    Replace,
    /// Create the table if absent, otherwise insert the snapshot's rows.
    Append,
    /// Insert keyed rows into a base table, overwriting rows that share a key.
    Upsert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, StrumDisplay)]
pub enum LoaderState {
    Idle,
    Connected,
    BatchInProgress,
    Committed,
    RolledBack,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportStatus {
    Success,
    Error(String),
}

impl ImportStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ImportStatus::Success)
    }
}

impl Display for ImportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportStatus::Success => write!(f, "success"),
            ImportStatus::Error(reason) => write!(f, "error: {reason}"),
        }
    }
}

impl Serialize for ImportStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// What happened to one table of a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableImport {
    pub file: PathBuf,
    pub mode: ImportMode,
    /// Row count of the table after the import.
    pub rows: usize,
    /// Snapshot rows skipped because a key field was null.
    pub skipped: usize,
    pub status: ImportStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BatchOutcome {
    /// Every table was imported inside one transaction that committed.
    Committed,
    /// One table failed; nothing from the batch was persisted.
    RolledBack { table: String, reason: String },
    /// Tables were imported one by one, each persisted on its own.
    Independent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub stamp: Option<RunStamp>,
    pub tables: BTreeMap<String, TableImport>,
    pub outcome: BatchOutcome,
}

impl BatchReport {
    pub fn is_rolled_back(&self) -> bool {
        matches!(self.outcome, BatchOutcome::RolledBack { .. })
    }

    pub fn failures(&self) -> impl Iterator<Item = (&String, &TableImport)> {
        self.tables.iter().filter(|(_, t)| !t.status.is_success())
    }
}

/// Outcome of one best-effort index or view creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemOutcome {
    pub name: String,
    pub status: ImportStatus,
}

struct Imported {
    rows: usize,
    skipped: usize,
}

fn count_rows(conn: &Connection, table: &str) -> FootprintResult<usize> {
    let rows: i64 = conn.query_row(&schema::count_sql(table), [], |row| row.get(0))?;
    Ok(rows as usize)
}

fn table_exists(conn: &Connection, table: &str) -> FootprintResult<bool> {
    let n: i64 = conn.query_row(schema::TABLE_EXISTS_SQL, params![table], |row| row.get(0))?;
    Ok(n > 0)
}

fn import_into(
    conn: &Connection,
    path: &Path,
    table: &str,
    mode: ImportMode,
) -> FootprintResult<Imported> {
    let file = path.to_string_lossy();
    let mut skipped = 0;
    match mode {
        ImportMode::Replace => conn.execute_batch(&schema::replace_sql(table, &file))?,
        ImportMode::Append => {
            if table_exists(conn, table)? {
                conn.execute_batch(&schema::append_sql(table, &file))?
            } else {
                conn.execute_batch(&schema::create_from_parquet_sql(table, &file))?
            }
        }
        ImportMode::Upsert => {
            let keyed = schema::keyed_table(table)
                .ok_or_else(|| FootprintError::MissingTableKey(table.to_string()))?;
            conn.execute_batch(&keyed.create_sql())?;
            let nulls: i64 =
                conn.query_row(&keyed.null_key_count_sql(&file), [], |row| row.get(0))?;
            if nulls > 0 {
                warn!("Skipping {nulls} rows with a null key in {}", path.display());
                skipped = nulls as usize;
            }
            conn.execute_batch(&keyed.upsert_sql(&file))?;
        }
    }
    let rows = count_rows(conn, table)?;
    info!(
        "Imported {} into {table} ({mode}): {rows} rows",
        path.display()
    );
    Ok(Imported { rows, skipped })
}

pub struct Loader {
    db_path: Option<PathBuf>,
    threads: usize,
    conn: Option<Connection>,
    state: LoaderState,
}

impl Loader {
    /// A loader for the DuckDB file at `db_path`, or an in-memory store when `None`.
    pub fn new(db_path: Option<&Path>, threads: usize) -> Self {
        Self {
            db_path: db_path.map(Path::to_path_buf),
            threads,
            conn: None,
            state: LoaderState::Idle,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(None, 1)
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.db_path(), config.threads)
    }

    pub fn state(&self) -> LoaderState {
        self.state
    }

    /// Open the store and set its worker thread count. Connecting twice is a no-op.
    pub fn connect(&mut self) -> FootprintResult<()> {
        match self.state {
            LoaderState::Closed => return Err(FootprintError::StoreClosed),
            LoaderState::Idle => {}
            _ => return Ok(()),
        }
        let conn = match &self.db_path {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                Connection::open(path)
            }
            None => Connection::open_in_memory(),
        }
        .map_err(|err| FootprintError::FailedConnection(err.to_string()))?;
        conn.execute_batch(&schema::threads_sql(self.threads))?;
        info!(
            "Connected to {} with {} threads",
            self.db_path
                .as_deref()
                .map_or("in-memory store".to_string(), |p| p.display().to_string()),
            self.threads
        );
        self.conn = Some(conn);
        self.state = LoaderState::Connected;
        Ok(())
    }

    fn connection(&mut self) -> FootprintResult<&mut Connection> {
        self.connect()?;
        self.conn.as_mut().ok_or(FootprintError::StoreClosed)
    }

    /// Load one snapshot into `table`, returning the table's row count afterwards.
    pub fn import_one<P: AsRef<Path>>(
        &mut self,
        path: P,
        table: &str,
        mode: ImportMode,
    ) -> FootprintResult<usize> {
        let conn = self.connection()?;
        Ok(import_into(conn, path.as_ref(), table, mode)?.rows)
    }

    /// Create the keyed base tables if they do not exist yet.
    pub fn create_base_tables(&mut self) -> FootprintResult<()> {
        let conn = self.connection()?;
        for table in BASE_TABLES {
            conn.execute_batch(&table.create_sql())?;
            debug!("Ensured base table {}", table.name);
        }
        Ok(())
    }

    /// Import every snapshot in `dir`, optionally only those of run `stamp`.
    ///
    /// With `transactional` set the whole batch commits or rolls back as one; the report then
    /// names the failing table and marks earlier tables as successful even though their writes
    /// were discarded. Without it every table is persisted or skipped on its own.
    pub fn batch_import<P: AsRef<Path>>(
        &mut self,
        dir: P,
        load: &LoadConfig,
        stamp: Option<RunStamp>,
        transactional: bool,
    ) -> FootprintResult<BatchReport> {
        let snapshots = snapshot::discover(dir.as_ref(), stamp)?;
        if snapshots.is_empty() {
            warn!("No snapshots found in {}", dir.as_ref().display());
        }
        let plan = snapshots
            .into_iter()
            .map(|(name, path)| {
                let table = load.table_mapping.table_for(&name.name).to_string();
                let mode = load.mode_for(&table);
                (table, path, mode)
            })
            .collect::<Vec<_>>();

        self.connect()?;
        let conn = self.conn.as_mut().ok_or(FootprintError::StoreClosed)?;
        let mut tables = BTreeMap::new();

        if !transactional {
            for (table, path, mode) in plan {
                let entry = match import_into(conn, &path, &table, mode) {
                    Ok(imported) => TableImport {
                        file: path,
                        mode,
                        rows: imported.rows,
                        skipped: imported.skipped,
                        status: ImportStatus::Success,
                    },
                    Err(err) => {
                        error!("Failed to import {} into {table}: {err}", path.display());
                        TableImport {
                            file: path,
                            mode,
                            rows: 0,
                            skipped: 0,
                            status: ImportStatus::Error(err.to_string()),
                        }
                    }
                };
                tables.insert(table, entry);
            }
            return Ok(BatchReport {
                stamp,
                tables,
                outcome: BatchOutcome::Independent,
            });
        }

        let tx = conn.transaction()?;
        self.state = LoaderState::BatchInProgress;
        let mut failure = None;
        for (table, path, mode) in plan {
            match import_into(&tx, &path, &table, mode) {
                Ok(imported) => {
                    tables.insert(
                        table,
                        TableImport {
                            file: path,
                            mode,
                            rows: imported.rows,
                            skipped: imported.skipped,
                            status: ImportStatus::Success,
                        },
                    );
                }
                Err(err) => {
                    error!("Failed to import {} into {table}: {err}", path.display());
                    tables.insert(
                        table.clone(),
                        TableImport {
                            file: path,
                            mode,
                            rows: 0,
                            skipped: 0,
                            status: ImportStatus::Error(err.to_string()),
                        },
                    );
                    failure = Some((table, err.to_string()));
                    break;
                }
            }
        }

        let outcome = match failure {
            Some((table, reason)) => {
                tx.rollback()?;
                self.state = LoaderState::RolledBack;
                warn!("Rolled back batch after failure in {table}");
                BatchOutcome::RolledBack { table, reason }
            }
            None => {
                tx.commit()?;
                self.state = LoaderState::Committed;
                info!("Committed batch of {} tables", tables.len());
                BatchOutcome::Committed
            }
        };
        Ok(BatchReport {
            stamp,
            tables,
            outcome,
        })
    }

    /// Create each index unless it exists. Failures are logged and do not stop the others.
    pub fn create_indexes(&mut self, specs: &[IndexSpec]) -> FootprintResult<Vec<ItemOutcome>> {
        let conn = self.connection()?;
        Ok(specs
            .iter()
            .map(|spec| {
                let status = match conn.execute_batch(&spec.create_sql()) {
                    Ok(()) => {
                        info!("Created index {} on {}", spec.name, spec.table);
                        ImportStatus::Success
                    }
                    Err(err) => {
                        error!("Failed to create index {}: {err}", spec.name);
                        ImportStatus::Error(err.to_string())
                    }
                };
                ItemOutcome {
                    name: spec.name.clone(),
                    status,
                }
            })
            .collect())
    }

    /// Drop and recreate each view. Failures are logged and do not stop the others.
    pub fn create_views(&mut self, specs: &[ViewSpec]) -> FootprintResult<Vec<ItemOutcome>> {
        let conn = self.connection()?;
        Ok(specs
            .iter()
            .map(|spec| {
                let status = match conn.execute_batch(&spec.create_sql()) {
                    Ok(()) => {
                        info!("Created view {}", spec.name);
                        ImportStatus::Success
                    }
                    Err(err) => {
                        error!("Failed to create view {}: {err}", spec.name);
                        ImportStatus::Error(err.to_string())
                    }
                };
                ItemOutcome {
                    name: spec.name.clone(),
                    status,
                }
            })
            .collect())
    }

    /// Row count of `table` or view, `None` if it does not exist.
    pub fn row_count(&mut self, table: &str) -> FootprintResult<Option<usize>> {
        let conn = self.connection()?;
        if !table_exists(conn, table)? {
            return Ok(None);
        }
        count_rows(conn, table).map(Some)
    }

    /// Release the store handle. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err((_, err)) = conn.close() {
                warn!("Error while closing the store: {err}");
            }
            info!("Store connection closed");
        }
        self.state = LoaderState::Closed;
    }
}

impl Drop for Loader {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use polars::df;
    use polars::prelude::DataFrame;

    use super::*;
    use crate::catalog::{self, tables};
    use crate::snapshot::{names, SnapshotWriter};

    fn stamp(s: &str) -> RunStamp {
        RunStamp::parse(s).unwrap()
    }

    fn years(values: &[i32]) -> DataFrame {
        df!("year" => values).unwrap()
    }

    fn measures(value: f64) -> DataFrame {
        df!(
            "country_code" => &[Some("2"), Some("3"), None],
            "year" => &[2020i32, 2020, 2020],
            "record" => &["GDP", "GDP", "GDP"],
            "crop_land" => &[0.0, 0.0, 0.0],
            "grazing_land" => &[0.0, 0.0, 0.0],
            "forest_land" => &[0.0, 0.0, 0.0],
            "fishing_ground" => &[0.0, 0.0, 0.0],
            "builtup_land" => &[0.0, 0.0, 0.0],
            "carbon" => &[0.0, 0.0, 0.0],
            "value" => &[value, value, value],
            "score" => &[Some("3A"), None, None]
        )
        .unwrap()
    }

    #[test]
    fn state_machine_and_idempotent_close() -> anyhow::Result<()> {
        let mut loader = Loader::in_memory();
        assert_eq!(loader.state(), LoaderState::Idle);
        loader.create_base_tables()?;
        assert_eq!(loader.state(), LoaderState::Connected);
        assert_eq!(loader.row_count(tables::ECOLOGICAL_MEASURES)?, Some(0));
        assert_eq!(loader.row_count("missing")?, None);
        loader.close();
        loader.close();
        assert_eq!(loader.state(), LoaderState::Closed);
        assert!(matches!(
            loader.create_base_tables(),
            Err(FootprintError::StoreClosed)
        ));
        Ok(())
    }

    #[test]
    fn replace_and_append_modes() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let writer = SnapshotWriter::new(dir.path(), stamp("20240101_000000"))?;
        let path = writer.publish(names::YEARS, &years(&[2019, 2020]))?;

        let mut loader = Loader::in_memory();
        assert_eq!(loader.import_one(&path, "years", ImportMode::Replace)?, 2);
        assert_eq!(loader.import_one(&path, "years", ImportMode::Replace)?, 2);
        assert_eq!(loader.import_one(&path, "years", ImportMode::Append)?, 4);
        assert_eq!(loader.import_one(&path, "fresh", ImportMode::Append)?, 2);
        Ok(())
    }

    #[test]
    fn upsert_keeps_the_latest_values() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let first = SnapshotWriter::new(dir.path(), stamp("20240101_000000"))?
            .publish(names::MEASURES, &measures(1.0))?;
        let second = SnapshotWriter::new(dir.path(), stamp("20240102_000000"))?
            .publish(names::MEASURES, &measures(2.0))?;

        let mut loader = Loader::in_memory();
        let table = tables::ECOLOGICAL_MEASURES;
        assert_eq!(loader.import_one(&first, table, ImportMode::Upsert)?, 2);
        assert_eq!(loader.import_one(&second, table, ImportMode::Upsert)?, 2);
        let conn = loader.connection()?;
        let value: f64 = conn.query_row(
            "SELECT value FROM ecological_measures WHERE country_code = ?",
            params!["2"],
            |row| row.get(0),
        )?;
        assert_eq!(value, 2.0);
        let stamped: i64 = conn.query_row(
            "SELECT COUNT(*) FROM ecological_measures WHERE loaded_at IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(stamped, 2);

        let batch = loader.batch_import(dir.path(), &LoadConfig::default(), None, true)?;
        let entry = &batch.tables[table];
        assert_eq!(entry.mode, ImportMode::Upsert);
        assert_eq!(entry.skipped, 1);
        assert_eq!(entry.rows, 2);
        Ok(())
    }

    #[test]
    fn upsert_requires_a_keyed_table() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = SnapshotWriter::new(dir.path(), stamp("20240101_000000"))?
            .publish(names::BY_REGION, &years(&[2020]))?;
        let mut loader = Loader::in_memory();
        assert!(loader
            .import_one(&path, tables::REGION_AGGREGATIONS, ImportMode::Upsert)
            .is_err());
        Ok(())
    }

    /// A run whose last snapshot (in load order) is not valid parquet.
    fn broken_run(dir: &Path, run: RunStamp) -> anyhow::Result<()> {
        let writer = SnapshotWriter::new(dir, run)?;
        writer.publish(names::COUNTRIES, &df!("country_code" => &["2"], "country_name" => &["Afghanistan"])?)?;
        writer.publish(names::YEARS, &years(&[2018, 2019, 2020]))?;
        std::fs::write(writer.path_for("zz_broken"), b"definitely not parquet")?;
        Ok(())
    }

    #[test]
    fn failing_table_rolls_back_the_whole_batch() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let good = stamp("20240101_000000");
        SnapshotWriter::new(dir.path(), good)?.publish(names::YEARS, &years(&[2019]))?;
        let bad = stamp("20240102_000000");
        broken_run(dir.path(), bad)?;

        let mut loader = Loader::in_memory();
        let load = LoadConfig::default();
        let report = loader.batch_import(dir.path(), &load, Some(good), true)?;
        assert_eq!(report.outcome, BatchOutcome::Committed);
        assert_eq!(loader.state(), LoaderState::Committed);
        assert_eq!(loader.row_count(tables::YEARS)?, Some(1));

        let report = loader.batch_import(dir.path(), &load, Some(bad), true)?;
        assert!(report.is_rolled_back());
        assert_eq!(loader.state(), LoaderState::RolledBack);
        assert!(matches!(
            &report.outcome,
            BatchOutcome::RolledBack { table, .. } if table == "zz_broken"
        ));
        assert!(report.tables[tables::COUNTRIES].status.is_success());
        assert!(report.tables[tables::YEARS].status.is_success());
        assert_eq!(report.failures().count(), 1);

        // Nothing from the failed run is visible.
        assert_eq!(loader.row_count(tables::YEARS)?, Some(1));
        assert_eq!(loader.row_count(tables::COUNTRIES)?, None);
        Ok(())
    }

    #[test]
    fn independent_batch_keeps_successful_tables() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let run = stamp("20240102_000000");
        broken_run(dir.path(), run)?;

        let mut loader = Loader::in_memory();
        let report = loader.batch_import(dir.path(), &LoadConfig::default(), Some(run), false)?;
        assert_eq!(report.outcome, BatchOutcome::Independent);
        assert_eq!(report.failures().count(), 1);
        assert_eq!(loader.row_count(tables::COUNTRIES)?, Some(1));
        assert_eq!(loader.row_count(tables::YEARS)?, Some(3));
        assert_eq!(loader.row_count("zz_broken")?, None);
        Ok(())
    }

    #[test]
    fn index_and_view_failures_are_independent() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = SnapshotWriter::new(dir.path(), stamp("20240101_000000"))?
            .publish(names::YEARS, &years(&[2020]))?;
        let mut loader = Loader::in_memory();
        loader.import_one(&path, tables::YEARS, ImportMode::Replace)?;

        let indexes = loader.create_indexes(&[
            IndexSpec::new("idx_missing", "no_such_table", &["year"]),
            IndexSpec::new("idx_years", tables::YEARS, &["year"]),
        ])?;
        assert!(!indexes[0].status.is_success());
        assert!(indexes[1].status.is_success());

        let views = loader.create_views(&[
            ViewSpec {
                name: "v_broken".into(),
                query: "SELECT * FROM no_such_table".into(),
            },
            ViewSpec {
                name: "v_years".into(),
                query: "SELECT year FROM years".into(),
            },
        ])?;
        assert!(!views[0].status.is_success());
        assert!(views[1].status.is_success());
        assert_eq!(loader.row_count("v_years")?, Some(1));

        // Default indexes need their tables; missing ones fail without aborting.
        let defaults = loader.create_indexes(&catalog::default_indexes())?;
        assert_eq!(defaults.len(), 3);
        Ok(())
    }
}
