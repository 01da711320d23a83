//! One pipeline run: clean, derive, publish snapshots, then load the run into the store.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use log::{debug, info, warn};
use polars::prelude::DataFrame;
use serde::Serialize;

use crate::aggregations;
use crate::catalog;
use crate::config::Config;
use crate::dimensions::{Country, DimensionCleaner, RecordType, Year};
use crate::facts::{FactNormalizer, Measure};
use crate::error::FootprintResult;
use crate::indicators::{self, Composition, SeriesChange};
use crate::loader::{BatchReport, ItemOutcome, Loader};
use crate::raw::RawTables;
use crate::snapshot::{names, RunStamp, SnapshotWriter};
use crate::table::{self, TableRow};

/// Every table produced by one transform, stamped with the run's time.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformOutput {
    pub countries: DataFrame,
    pub years: DataFrame,
    pub record_types: DataFrame,
    pub measures: DataFrame,
    pub balance: DataFrame,
    pub composition: DataFrame,
    pub time_series: DataFrame,
    pub by_region: DataFrame,
    pub by_income: DataFrame,
    pub population_weighted: Option<DataFrame>,
}

impl TransformOutput {
    /// Tables in publication order, paired with their logical names. The weighted rollup is left
    /// out when there was no population data.
    pub fn tables(&self) -> Vec<(&'static str, &DataFrame)> {
        let mut tables = vec![
            (names::COUNTRIES, &self.countries),
            (names::YEARS, &self.years),
            (names::RECORD_TYPES, &self.record_types),
            (names::MEASURES, &self.measures),
            (names::BALANCE, &self.balance),
            (names::COMPOSITION, &self.composition),
            (names::TIME_SERIES, &self.time_series),
            (names::BY_REGION, &self.by_region),
            (names::BY_INCOME, &self.by_income),
        ];
        if let Some(weighted) = &self.population_weighted {
            tables.push((names::POPULATION_WEIGHTED, weighted));
        }
        tables
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishedTable {
    pub file: PathBuf,
    pub rows: usize,
}

/// What a publish wrote, saved next to the snapshots as `transform_summary_{stamp}.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub stamp: RunStamp,
    pub tables: BTreeMap<String, PublishedTable>,
    pub skipped: Vec<String>,
}

/// What a load did, saved as `load_summary_{stamp}.json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadOutcome {
    pub report: BatchReport,
    pub indexes: Vec<ItemOutcome>,
    pub views: Vec<ItemOutcome>,
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> FootprintResult<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    debug!("Wrote {}", path.display());
    Ok(())
}

pub struct Pipeline {
    config: Config,
    cleaner: DimensionCleaner,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        let cleaner = DimensionCleaner::new(config.lookups.clone());
        Self { config, cleaner }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run every transform stage in order. Only the `transformed_at` columns depend on `stamp`.
    pub fn transform(&self, raw: &RawTables, stamp: RunStamp) -> anyhow::Result<TransformOutput> {
        info!("Running all core transformations");
        let at = stamp.datetime();

        let countries = self.cleaner.countries(&raw.countries);
        let years = self.cleaner.years(&raw.years);
        let record_types = self.cleaner.record_types(&raw.record_types);
        let measures = FactNormalizer.normalize(&raw.measures);

        let composition = indicators::footprint_composition(&measures);
        let time_series = indicators::time_series_changes(&measures);

        let measures_df = Measure::to_frame(&measures)?;
        let countries_df = Country::to_frame(&countries)?;
        let balance = indicators::ecological_balance(&measures_df, &countries_df)
            .context("Failed to build ecological balance")?;
        let aggs = aggregations::aggregate(&measures_df, &countries_df)
            .context("Failed to build aggregations")?;

        Ok(TransformOutput {
            countries: table::stamp(countries_df, at)?,
            years: table::stamp(Year::to_frame(&years)?, at)?,
            record_types: table::stamp(RecordType::to_frame(&record_types)?, at)?,
            measures: table::stamp(measures_df, at)?,
            balance: table::stamp(balance, at)?,
            composition: table::stamp(Composition::to_frame(&composition)?, at)?,
            time_series: table::stamp(SeriesChange::to_frame(&time_series)?, at)?,
            by_region: table::stamp(aggs.by_region, at)?,
            by_income: table::stamp(aggs.by_income, at)?,
            population_weighted: aggs
                .population_weighted
                .map(|df| table::stamp(df, at))
                .transpose()?,
        })
    }

    /// Write every table as a snapshot of run `stamp` in `dir`, plus the run summary.
    pub fn publish<P: AsRef<Path>>(
        &self,
        output: &TransformOutput,
        dir: P,
        stamp: RunStamp,
    ) -> anyhow::Result<RunSummary> {
        let writer = SnapshotWriter::new(dir.as_ref(), stamp)?;
        let mut tables = BTreeMap::new();
        for (name, df) in output.tables() {
            let file = writer.publish(name, df)?;
            tables.insert(
                name.to_string(),
                PublishedTable {
                    file,
                    rows: df.height(),
                },
            );
        }
        let skipped = if output.population_weighted.is_none() {
            vec![names::POPULATION_WEIGHTED.to_string()]
        } else {
            vec![]
        };
        let summary = RunSummary {
            stamp,
            tables,
            skipped,
        };
        write_json(
            &writer.dir().join(format!("transform_summary_{stamp}.json")),
            &summary,
        )?;
        info!(
            "Published {} snapshots for run {stamp}",
            summary.tables.len()
        );
        Ok(summary)
    }

    /// Read raw JSON from the configured raw path, transform and publish to the snapshot path.
    pub fn transform_dir(&self, stamp: RunStamp) -> anyhow::Result<RunSummary> {
        let raw = RawTables::from_json_dir(&self.config.raw_data_path)?;
        let output = self.transform(&raw, stamp)?;
        self.publish(&output, &self.config.transformed_data_path, stamp)
    }

    /// Load the snapshots of run `stamp` (every run if `None`) into the configured store, then
    /// build indexes and views. A rolled-back batch skips indexes and views.
    pub fn load<P: AsRef<Path>>(
        &self,
        dir: P,
        stamp: Option<RunStamp>,
    ) -> anyhow::Result<LoadOutcome> {
        let dir = dir.as_ref();
        let mut loader = Loader::from_config(&self.config);
        let report = loader.batch_import(dir, &self.config.load, stamp, self.config.transactional)?;
        let (indexes, views) = if report.is_rolled_back() {
            warn!("Batch rolled back, skipping index and view creation");
            (vec![], vec![])
        } else {
            (
                loader.create_indexes(&catalog::default_indexes())?,
                loader.create_views(&catalog::default_views())?,
            )
        };
        loader.close();

        let outcome = LoadOutcome {
            report,
            indexes,
            views,
        };
        let summary_stamp = stamp.unwrap_or_else(RunStamp::now);
        write_json(
            &dir.join(format!("load_summary_{summary_stamp}.json")),
            &outcome,
        )?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tables;
    use crate::raw::parse_records;
    use crate::records;
    use crate::table::unstamped;
    use crate::COL;

    fn fixture() -> anyhow::Result<RawTables> {
        Ok(RawTables {
            countries: parse_records(
                r#"[{"countryCode": "2", "countryName": "Afghanistan", "isoa2": "AF"},
                    {"countryCode": "39", "countryName": "United States of America"},
                    {"countryCode": "39", "countryName": "Duplicate"}]"#,
                "countries",
            )?,
            years: parse_records(r#"[{"year": 2019}, {"year": 2020}]"#, "years")?,
            record_types: parse_records(
                r#"[{"code": "BCpc", "name": "Biocapacity per capita", "record": "BiocapPerCap"},
                    {"code": "EFCpc", "name": "Footprint per capita", "record": "EFConsPerCap"}]"#,
                "types",
            )?,
            measures: parse_records(
                r#"[{"countryCode": "2", "year": 2020, "record": "BiocapPerCap", "value": 0.5},
                    {"countryCode": "2", "year": 2020, "record": "EFConsPerCap", "value": 1.5,
                     "cropLand": 0.3, "carbon": 1.2},
                    {"countryCode": "2", "year": 2019, "record": "EFConsPerCap", "value": 1.2},
                    {"countryCode": "2", "year": 2020, "record": "Population", "value": 38.9},
                    {"countryCode": "39", "year": 2020, "record": "BiocapPerCap", "value": 3.4},
                    {"countryCode": "39", "year": 2020, "record": "EFConsPerCap", "value": 8.0},
                    {"countryCode": "39", "year": 2020, "record": "Population", "value": 331.0},
                    {"year": 2020, "record": "GDP", "value": 1.0}]"#,
                "measures",
            )?,
        })
    }

    #[test]
    fn transform_produces_every_table() -> anyhow::Result<()> {
        let pipeline = Pipeline::new(Config::default());
        let output = pipeline.transform(&fixture()?, RunStamp::now())?;
        assert_eq!(output.countries.height(), 2);
        assert_eq!(output.years.height(), 2);
        assert_eq!(output.record_types.height(), 2);
        assert_eq!(output.measures.height(), 7);
        // Afghanistan 2019 only has a footprint and still gets a balance row.
        assert_eq!(output.balance.height(), 3);
        assert_eq!(output.composition.height(), 3);
        assert!(output.population_weighted.is_some());
        assert_eq!(output.tables().len(), 10);
        for (name, df) in output.tables() {
            assert!(df.column(COL::TRANSFORMED_AT).is_ok(), "{name}");
        }
        Ok(())
    }

    #[test]
    fn transform_is_idempotent() -> anyhow::Result<()> {
        let pipeline = Pipeline::new(Config::default());
        let raw = fixture()?;
        let first = pipeline.transform(&raw, RunStamp::parse("20240101_000000")?)?;
        let second = pipeline.transform(&raw, RunStamp::parse("20240102_000000")?)?;
        for ((name, a), (_, b)) in first.tables().into_iter().zip(second.tables()) {
            assert!(unstamped(a).equals_missing(&unstamped(b)), "{name} differs");
        }
        Ok(())
    }

    #[test]
    fn weighted_rollup_is_skipped_without_population() -> anyhow::Result<()> {
        let mut raw = fixture()?;
        raw.measures
            .retain(|m| m.record.as_deref() != Some(records::POPULATION));
        let pipeline = Pipeline::new(Config::default());
        let output = pipeline.transform(&raw, RunStamp::now())?;
        assert!(output.population_weighted.is_none());

        let dir = tempfile::tempdir()?;
        let stamp = RunStamp::parse("20240101_000000")?;
        let summary = pipeline.publish(&output, dir.path(), stamp)?;
        assert_eq!(summary.tables.len(), 9);
        assert_eq!(summary.skipped, vec![names::POPULATION_WEIGHTED]);
        assert!(dir
            .path()
            .join("transform_summary_20240101_000000.json")
            .is_file());
        Ok(())
    }

    #[test]
    fn end_to_end_run_is_queryable() -> anyhow::Result<()> {
        let work = tempfile::tempdir()?;
        let config = Config {
            transformed_data_path: work.path().join("snapshots").display().to_string(),
            db_path: work.path().join("store.duckdb").display().to_string(),
            threads: 2,
            ..Config::default()
        };
        let pipeline = Pipeline::new(config.clone());
        let stamp = RunStamp::parse("20240101_000000")?;
        let output = pipeline.transform(&fixture()?, stamp)?;
        pipeline.publish(&output, &config.transformed_data_path, stamp)?;

        let outcome = pipeline.load(&config.transformed_data_path, Some(stamp))?;
        assert!(!outcome.report.is_rolled_back());
        assert_eq!(outcome.report.tables.len(), 10);
        assert!(outcome.indexes.iter().all(|i| i.status.is_success()));
        assert!(outcome.views.iter().all(|v| v.status.is_success()));

        let mut loader = Loader::from_config(&config);
        assert_eq!(loader.row_count(tables::ECOLOGICAL_MEASURES)?, Some(7));
        assert_eq!(loader.row_count("v_country_footprint_summary")?, Some(3));
        assert!(loader.row_count("v_regional_trends")?.is_some());
        assert!(loader.row_count("v_income_group_comparison")?.is_some());
        loader.close();

        // Reloading the same run leaves one row per fact key.
        pipeline.load(&config.transformed_data_path, Some(stamp))?;
        let mut loader = Loader::from_config(&config);
        assert_eq!(loader.row_count(tables::ECOLOGICAL_MEASURES)?, Some(7));
        Ok(())
    }
}
