//! The dimension cleaner: deduplicated and enriched country, year and record-type tables.

use std::collections::HashSet;

use chrono::NaiveDate;
use log::{info, warn};
use polars::prelude::*;

use crate::lookups::{Lookups, RecordCategory};
use crate::raw::{RawCountry, RawRecordType, RawYear};
use crate::table::TableRow;
use crate::COL;

#[derive(Debug, Clone, PartialEq)]
pub struct Country {
    pub country_code: String,
    pub country_name: String,
    pub short_name: String,
    pub iso_a2: Option<String>,
    pub score: Option<String>,
    pub region: String,
    pub income_group: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Year {
    pub year: i32,
    pub decade: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordType {
    pub code: String,
    pub name: Option<String>,
    pub note: Option<String>,
    pub record: Option<String>,
    pub category: RecordCategory,
}

/// Cleans the three reference record families. Classification tables are injected so tests can
/// substitute their own.
#[derive(Debug, Clone, Default)]
pub struct DimensionCleaner {
    lookups: Lookups,
}

impl DimensionCleaner {
    pub fn new(lookups: Lookups) -> Self {
        Self { lookups }
    }

    /// One row per country code, first occurrence kept, with region and income group attached.
    pub fn countries(&self, raw: &[RawCountry]) -> Vec<Country> {
        if raw.is_empty() {
            warn!("No country data to clean");
            return vec![];
        }
        info!("Cleaning countries dimension with {} rows", raw.len());
        let mut seen = HashSet::new();
        let mut skipped = 0;
        let countries: Vec<Country> = raw
            .iter()
            .filter_map(|country| {
                let (Some(code), Some(name)) = (&country.country_code, &country.country_name)
                else {
                    skipped += 1;
                    return None;
                };
                if !seen.insert(code.clone()) {
                    return None;
                }
                Some(Country {
                    country_code: code.clone(),
                    country_name: name.clone(),
                    short_name: country.short_name.clone().unwrap_or_else(|| name.clone()),
                    iso_a2: country.iso_a2.clone(),
                    score: country.score.clone(),
                    region: self.lookups.region(code),
                    income_group: self.lookups.income_group(code),
                })
            })
            .collect();
        if skipped > 0 {
            warn!("Skipped {skipped} countries without a code or name");
        }
        countries
    }

    /// One row per year, newest first, with decade and calendar boundaries.
    pub fn years(&self, raw: &[RawYear]) -> Vec<Year> {
        if raw.is_empty() {
            warn!("No year data to clean");
            return vec![];
        }
        info!("Cleaning years dimension with {} rows", raw.len());
        let mut seen = HashSet::new();
        let mut years: Vec<Year> = raw
            .iter()
            .filter_map(|y| y.year)
            .filter(|year| seen.insert(*year))
            .filter_map(|year| {
                let start_date = NaiveDate::from_ymd_opt(year, 1, 1);
                let end_date = NaiveDate::from_ymd_opt(year, 12, 31);
                match (start_date, end_date) {
                    (Some(start_date), Some(end_date)) => Some(Year {
                        year,
                        decade: year.div_euclid(10) * 10,
                        start_date,
                        end_date,
                    }),
                    _ => {
                        warn!("Skipping out-of-range year {year}");
                        None
                    }
                }
            })
            .collect();
        years.sort_by(|a, b| b.year.cmp(&a.year));
        years
    }

    /// One row per record family and per code, first occurrence kept, with a category derived
    /// from the code prefix.
    pub fn record_types(&self, raw: &[RawRecordType]) -> Vec<RecordType> {
        if raw.is_empty() {
            warn!("No record type data to clean");
            return vec![];
        }
        info!("Cleaning record types dimension with {} rows", raw.len());
        let mut seen_records = HashSet::new();
        let mut seen_codes = HashSet::new();
        raw.iter()
            .filter_map(|rt| {
                let Some(code) = &rt.code else {
                    warn!("Skipping record type without a code: {rt:?}");
                    return None;
                };
                if !seen_records.insert(rt.record.clone()) || !seen_codes.insert(code.clone()) {
                    return None;
                }
                Some(RecordType {
                    code: code.clone(),
                    name: rt.name.clone(),
                    note: rt.note.clone(),
                    record: rt.record.clone(),
                    category: self.lookups.category(code),
                })
            })
            .collect()
    }
}

impl TableRow for Country {
    fn to_frame(rows: &[Self]) -> PolarsResult<DataFrame> {
        DataFrame::new(vec![
            Series::new(
                COL::COUNTRY_CODE,
                rows.iter().map(|r| r.country_code.as_str()).collect::<Vec<_>>(),
            ),
            Series::new(
                COL::COUNTRY_NAME,
                rows.iter().map(|r| r.country_name.as_str()).collect::<Vec<_>>(),
            ),
            Series::new(
                COL::SHORT_NAME,
                rows.iter().map(|r| r.short_name.as_str()).collect::<Vec<_>>(),
            ),
            Series::new(
                COL::ISO_A2,
                rows.iter().map(|r| r.iso_a2.as_deref()).collect::<Vec<_>>(),
            ),
            Series::new(
                COL::SCORE,
                rows.iter().map(|r| r.score.as_deref()).collect::<Vec<_>>(),
            ),
            Series::new(
                COL::REGION,
                rows.iter().map(|r| r.region.as_str()).collect::<Vec<_>>(),
            ),
            Series::new(
                COL::INCOME_GROUP,
                rows.iter().map(|r| r.income_group.as_str()).collect::<Vec<_>>(),
            ),
        ])
    }
}

impl TableRow for Year {
    fn to_frame(rows: &[Self]) -> PolarsResult<DataFrame> {
        DataFrame::new(vec![
            Series::new(COL::YEAR, rows.iter().map(|r| r.year).collect::<Vec<_>>()),
            Series::new(COL::DECADE, rows.iter().map(|r| r.decade).collect::<Vec<_>>()),
            Series::new(
                COL::START_DATE,
                rows.iter().map(|r| r.start_date).collect::<Vec<_>>(),
            ),
            Series::new(
                COL::END_DATE,
                rows.iter().map(|r| r.end_date).collect::<Vec<_>>(),
            ),
        ])
    }
}

impl TableRow for RecordType {
    fn to_frame(rows: &[Self]) -> PolarsResult<DataFrame> {
        DataFrame::new(vec![
            Series::new(
                COL::CODE,
                rows.iter().map(|r| r.code.as_str()).collect::<Vec<_>>(),
            ),
            Series::new(
                COL::NAME,
                rows.iter().map(|r| r.name.as_deref()).collect::<Vec<_>>(),
            ),
            Series::new(
                COL::NOTE,
                rows.iter().map(|r| r.note.as_deref()).collect::<Vec<_>>(),
            ),
            Series::new(
                COL::RECORD,
                rows.iter().map(|r| r.record.as_deref()).collect::<Vec<_>>(),
            ),
            Series::new(
                COL::CATEGORY,
                rows.iter()
                    .map(|r| r.category.to_string())
                    .collect::<Vec<_>>(),
            ),
        ])
    }
}
