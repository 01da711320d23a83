//! The fact normalizer: raw measures to the `ecological_measures` fact table.

use std::collections::HashSet;

use log::{info, warn};
use polars::prelude::*;

use crate::raw::RawMeasure;
use crate::table::TableRow;
use crate::COL;

/// One fact row keyed by `(country_code, year, record)`. Component quantities and the value are
/// never missing: an absent component counts as zero contribution.
#[derive(Debug, Clone, PartialEq)]
pub struct Measure {
    pub country_code: String,
    pub year: i32,
    pub record: String,
    pub crop_land: f64,
    pub grazing_land: f64,
    pub forest_land: f64,
    pub fishing_ground: f64,
    pub builtup_land: f64,
    pub carbon: f64,
    pub value: f64,
    pub score: Option<String>,
    pub country_name_orig: Option<String>,
    pub short_name_orig: Option<String>,
    pub iso_a2_orig: Option<String>,
}

impl Measure {
    /// Component quantities in `COL::COMPONENTS` order.
    pub fn components(&self) -> [f64; 6] {
        [
            self.crop_land,
            self.grazing_land,
            self.forest_land,
            self.fishing_ground,
            self.builtup_land,
            self.carbon,
        ]
    }

    pub fn key(&self) -> (&str, i32, &str) {
        (&self.country_code, self.year, &self.record)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FactNormalizer;

impl FactNormalizer {
    /// Drop rows missing a key field and duplicate keys (first occurrence kept), and zero-fill
    /// the numeric fields.
    pub fn normalize(&self, raw: &[RawMeasure]) -> Vec<Measure> {
        if raw.is_empty() {
            warn!("No ecological measures data to clean");
            return vec![];
        }
        info!(
            "Cleaning ecological measures fact table with {} rows",
            raw.len()
        );
        let mut seen = HashSet::new();
        let mut missing_key = 0usize;
        let mut duplicates = 0usize;
        let measures: Vec<Measure> = raw
            .iter()
            .filter_map(|m| {
                let (Some(country_code), Some(year), Some(record)) =
                    (&m.country_code, m.year, &m.record)
                else {
                    missing_key += 1;
                    return None;
                };
                if !seen.insert((country_code.clone(), year, record.clone())) {
                    duplicates += 1;
                    return None;
                }
                Some(Measure {
                    country_code: country_code.clone(),
                    year,
                    record: record.clone(),
                    crop_land: m.crop_land.unwrap_or(0.0),
                    grazing_land: m.grazing_land.unwrap_or(0.0),
                    forest_land: m.forest_land.unwrap_or(0.0),
                    fishing_ground: m.fishing_ground.unwrap_or(0.0),
                    builtup_land: m.builtup_land.unwrap_or(0.0),
                    carbon: m.carbon.unwrap_or(0.0),
                    value: m.value.unwrap_or(0.0),
                    score: m.score.clone(),
                    country_name_orig: m.country_name.clone(),
                    short_name_orig: m.short_name.clone(),
                    iso_a2_orig: m.iso_a2.clone(),
                })
            })
            .collect();
        if missing_key > 0 {
            warn!("Dropped {missing_key} measures missing country, year or record");
        }
        if duplicates > 0 {
            info!("Dropped {duplicates} duplicate measures");
        }
        measures
    }
}

impl TableRow for Measure {
    fn to_frame(rows: &[Self]) -> PolarsResult<DataFrame> {
        let mut columns = vec![
            Series::new(
                COL::COUNTRY_CODE,
                rows.iter().map(|r| r.country_code.as_str()).collect::<Vec<_>>(),
            ),
            Series::new(COL::YEAR, rows.iter().map(|r| r.year).collect::<Vec<_>>()),
            Series::new(
                COL::RECORD,
                rows.iter().map(|r| r.record.as_str()).collect::<Vec<_>>(),
            ),
        ];
        for (idx, name) in COL::COMPONENTS.iter().enumerate() {
            columns.push(Series::new(
                name,
                rows.iter().map(|r| r.components()[idx]).collect::<Vec<_>>(),
            ));
        }
        columns.push(Series::new(
            COL::VALUE,
            rows.iter().map(|r| r.value).collect::<Vec<_>>(),
        ));
        columns.extend([
            Series::new(
                COL::SCORE,
                rows.iter().map(|r| r.score.as_deref()).collect::<Vec<_>>(),
            ),
            Series::new(
                COL::COUNTRY_NAME_ORIG,
                rows.iter()
                    .map(|r| r.country_name_orig.as_deref())
                    .collect::<Vec<_>>(),
            ),
            Series::new(
                COL::SHORT_NAME_ORIG,
                rows.iter()
                    .map(|r| r.short_name_orig.as_deref())
                    .collect::<Vec<_>>(),
            ),
            Series::new(
                COL::ISO_A2_ORIG,
                rows.iter().map(|r| r.iso_a2_orig.as_deref()).collect::<Vec<_>>(),
            ),
        ]);
        DataFrame::new(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(code: &str, year: i32, record: &str, value: Option<f64>) -> RawMeasure {
        RawMeasure {
            country_code: Some(code.into()),
            year: Some(year),
            record: Some(record.into()),
            value,
            ..Default::default()
        }
    }

    #[test]
    fn missing_numbers_become_zero() {
        let mut first = raw("2", 2020, "EFConsPerCap", None);
        first.carbon = Some(0.7);
        first.score = Some("3A".into());
        first.country_name = Some("Afghanistan".into());
        let measures = FactNormalizer.normalize(&[first]);
        assert_eq!(measures.len(), 1);
        let m = &measures[0];
        assert_eq!(m.value, 0.0);
        assert_eq!(m.components(), [0.0, 0.0, 0.0, 0.0, 0.0, 0.7]);
        assert_eq!(m.score.as_deref(), Some("3A"));
        assert_eq!(m.country_name_orig.as_deref(), Some("Afghanistan"));
    }

    #[test]
    fn duplicate_keys_keep_the_first_row() {
        let measures = FactNormalizer.normalize(&[
            raw("2", 2020, "GDP", Some(1.0)),
            raw("2", 2020, "GDP", Some(2.0)),
            raw("2", 2021, "GDP", Some(3.0)),
        ]);
        assert_eq!(measures.len(), 2);
        assert_eq!(measures[0].value, 1.0);
        assert_eq!(measures[1].key(), ("2", 2021, "GDP"));
    }

    #[test]
    fn rows_without_a_key_are_dropped() {
        let mut no_year = raw("2", 2020, "GDP", Some(1.0));
        no_year.year = None;
        let mut no_code = raw("2", 2020, "GDP", Some(1.0));
        no_code.country_code = None;
        let measures =
            FactNormalizer.normalize(&[no_year, no_code, raw("5", 2020, "GDP", None)]);
        assert_eq!(measures.len(), 1);
        assert_eq!(measures[0].country_code, "5");
    }

    #[test]
    fn fact_frame_has_no_null_numbers() -> anyhow::Result<()> {
        let measures = FactNormalizer.normalize(&[
            raw("2", 2020, "GDP", None),
            raw("3", 2020, "GDP", Some(2.0)),
        ]);
        let df = Measure::to_frame(&measures)?;
        assert_eq!(df.height(), 2);
        for name in COL::COMPONENTS.iter().chain([&COL::VALUE]) {
            assert_eq!(df.column(name)?.null_count(), 0, "{name}");
        }
        assert_eq!(Measure::to_frame(&[])?.width(), 14);
        Ok(())
    }
}
