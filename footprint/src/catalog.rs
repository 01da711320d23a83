//! Store-side names: where each snapshot lands, and the indexes and views built over the loaded
//! tables.

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::loader::TableMapping;
use crate::records::PER_CAPITA_FAMILIES;
use crate::snapshot::names;
use crate::COL;

/// Store table names.
pub mod tables {
    pub const COUNTRIES: &str = "countries";
    pub const YEARS: &str = "years";
    pub const RECORD_TYPES: &str = "record_types";
    pub const ECOLOGICAL_MEASURES: &str = "ecological_measures";
    pub const ECOLOGICAL_BALANCE: &str = "ecological_balance";
    pub const FOOTPRINT_COMPOSITION: &str = "footprint_composition";
    pub const TIME_SERIES_CHANGES: &str = "time_series_changes";
    pub const REGION_AGGREGATIONS: &str = "region_aggregations";
    pub const INCOME_AGGREGATIONS: &str = "income_aggregations";
    pub const WEIGHTED_AGGREGATIONS: &str = "weighted_aggregations";
}

pub fn default_table_mapping() -> TableMapping {
    TableMapping::from_pairs([
        (names::COUNTRIES, tables::COUNTRIES),
        (names::YEARS, tables::YEARS),
        (names::RECORD_TYPES, tables::RECORD_TYPES),
        (names::MEASURES, tables::ECOLOGICAL_MEASURES),
        (names::BALANCE, tables::ECOLOGICAL_BALANCE),
        (names::COMPOSITION, tables::FOOTPRINT_COMPOSITION),
        (names::TIME_SERIES, tables::TIME_SERIES_CHANGES),
        (names::BY_REGION, tables::REGION_AGGREGATIONS),
        (names::BY_INCOME, tables::INCOME_AGGREGATIONS),
        (names::POPULATION_WEIGHTED, tables::WEIGHTED_AGGREGATIONS),
    ])
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
}

impl IndexSpec {
    pub fn new(name: &str, table: &str, columns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            table: table.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewSpec {
    pub name: String,
    pub query: String,
}

pub fn default_indexes() -> Vec<IndexSpec> {
    vec![
        IndexSpec::new(
            "idx_ecological_balance_country",
            tables::ECOLOGICAL_BALANCE,
            &[COL::COUNTRY_CODE],
        ),
        IndexSpec::new(
            "idx_ecological_measures_record",
            tables::ECOLOGICAL_MEASURES,
            &[COL::RECORD],
        ),
        IndexSpec::new(
            "idx_ecological_measures_country_year",
            tables::ECOLOGICAL_MEASURES,
            &[COL::COUNTRY_CODE, COL::YEAR],
        ),
    ]
}

fn trend_view(name: &str, table: &str, group: &str) -> ViewSpec {
    let families = PER_CAPITA_FAMILIES
        .iter()
        .map(|f| format!("'{f}'"))
        .join(", ");
    ViewSpec {
        name: name.to_string(),
        query: format!(
            "SELECT {group}, year, record, value_mean, value_median, value_std \
             FROM {table} \
             WHERE record IN ({families}) \
             ORDER BY {group}, record, year"
        ),
    }
}

pub fn default_views() -> Vec<ViewSpec> {
    vec![
        ViewSpec {
            name: "v_country_footprint_summary".into(),
            query: format!(
                "SELECT c.country_name, c.region, c.income_group, eb.year, \
                 eb.biocapacity, eb.footprint, eb.ecological_balance, \
                 fc.carbon_pct, fc.crop_land_pct \
                 FROM {balance} eb \
                 JOIN {countries} c ON eb.country_code = c.country_code \
                 LEFT JOIN {composition} fc \
                 ON eb.country_code = fc.country_code AND eb.year = fc.year",
                balance = tables::ECOLOGICAL_BALANCE,
                countries = tables::COUNTRIES,
                composition = tables::FOOTPRINT_COMPOSITION,
            ),
        },
        trend_view(
            "v_regional_trends",
            tables::REGION_AGGREGATIONS,
            COL::REGION,
        ),
        trend_view(
            "v_income_group_comparison",
            tables::INCOME_AGGREGATIONS,
            COL::INCOME_GROUP,
        ),
    ]
}
