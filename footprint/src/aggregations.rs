//! Region, income-group and population-weighted rollups of the fact table.
//!
//! Facts are inner-joined to the country dimension, so measures for countries the dimension does
//! not know about are left out of every rollup. Only the core record families are aggregated.

use log::{info, warn};
use polars::prelude::*;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use crate::records::{self, CORE_FAMILIES};
use crate::COL;

/// Summary statistics computed over `value` per group. Output columns are flattened as
/// `value_{stat}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum AggStat {
    Mean,
    Median,
    Std,
    Min,
    Max,
    Count,
}

impl AggStat {
    pub fn apply(self, expr: Expr) -> Expr {
        match self {
            AggStat::Mean => expr.mean(),
            AggStat::Median => expr.median(),
            // Sample standard deviation.
            AggStat::Std => expr.std(1),
            AggStat::Min => expr.min(),
            AggStat::Max => expr.max(),
            AggStat::Count => expr.count(),
        }
    }

    pub fn column_name(self, column: &str) -> String {
        format!("{column}_{self}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregations {
    pub by_region: DataFrame,
    pub by_income: DataFrame,
    /// `None` when there is no population data to weight by.
    pub population_weighted: Option<DataFrame>,
}

/// Facts restricted to the core families, with region and income group attached.
fn geo_facts(measures: &DataFrame, countries: &DataFrame) -> LazyFrame {
    let families = Series::new("families", CORE_FAMILIES);
    measures
        .clone()
        .lazy()
        .select([
            col(COL::COUNTRY_CODE),
            col(COL::YEAR),
            col(COL::RECORD),
            col(COL::VALUE),
        ])
        .filter(col(COL::RECORD).is_in(lit(families)))
        .join(
            countries
                .clone()
                .lazy()
                .select([col(COL::COUNTRY_CODE), col(COL::REGION), col(COL::INCOME_GROUP)]),
            [col(COL::COUNTRY_CODE)],
            [col(COL::COUNTRY_CODE)],
            JoinArgs::new(JoinType::Inner),
        )
}

fn summarise(geo: LazyFrame, group: &str) -> PolarsResult<DataFrame> {
    let stats = AggStat::iter()
        .map(|stat| stat.apply(col(COL::VALUE)).alias(&stat.column_name(COL::VALUE)))
        .collect::<Vec<_>>();
    geo.group_by_stable([col(group), col(COL::YEAR), col(COL::RECORD)])
        .agg(stats)
        .sort_by_exprs(
            [col(group), col(COL::YEAR), col(COL::RECORD)],
            SortMultipleOptions::default(),
        )
        .collect()
}

fn population_weighted(geo: LazyFrame) -> PolarsResult<Option<DataFrame>> {
    let population = geo
        .clone()
        .filter(col(COL::RECORD).eq(lit(records::POPULATION)))
        .select([
            col(COL::COUNTRY_CODE),
            col(COL::YEAR),
            col(COL::VALUE).alias(COL::POPULATION),
        ])
        .collect()?;
    if population.height() == 0 {
        warn!("No population data, skipping population-weighted aggregation");
        return Ok(None);
    }
    let weighted = geo
        .filter(col(COL::RECORD).neq(lit(records::POPULATION)))
        .join(
            population.lazy(),
            [col(COL::COUNTRY_CODE), col(COL::YEAR)],
            [col(COL::COUNTRY_CODE), col(COL::YEAR)],
            JoinArgs::new(JoinType::Inner),
        )
        .with_column((col(COL::VALUE) * col(COL::POPULATION)).alias(COL::WEIGHTED_VALUE))
        .group_by_stable([col(COL::REGION), col(COL::YEAR), col(COL::RECORD)])
        .agg([col(COL::WEIGHTED_VALUE).sum(), col(COL::POPULATION).sum()])
        .with_column(
            when(col(COL::POPULATION).neq(lit(0.0)))
                .then(col(COL::WEIGHTED_VALUE) / col(COL::POPULATION))
                .otherwise(lit(NULL))
                .alias(COL::POPULATION_WEIGHTED_AVG),
        )
        .sort_by_exprs(
            [col(COL::REGION), col(COL::YEAR), col(COL::RECORD)],
            SortMultipleOptions::default(),
        )
        .collect()?;
    Ok(Some(weighted))
}

/// Build all rollups from the unstamped fact and country frames.
pub fn aggregate(measures: &DataFrame, countries: &DataFrame) -> PolarsResult<Aggregations> {
    if measures.height() == 0 || countries.height() == 0 {
        warn!("Missing data for geographical aggregations");
    }
    info!("Creating geographical aggregations");
    let geo = geo_facts(measures, countries);
    let aggregations = Aggregations {
        by_region: summarise(geo.clone(), COL::REGION)?,
        by_income: summarise(geo.clone(), COL::INCOME_GROUP)?,
        population_weighted: population_weighted(geo)?,
    };
    info!(
        "Aggregated {} region rows, {} income rows",
        aggregations.by_region.height(),
        aggregations.by_income.height()
    );
    Ok(aggregations)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::dimensions::{Country, DimensionCleaner};
    use crate::facts::{FactNormalizer, Measure};
    use crate::lookups::Lookups;
    use crate::raw::{RawCountry, RawMeasure};
    use crate::table::TableRow;

    fn frames(measures: &[(&str, i32, &str, f64)]) -> anyhow::Result<(DataFrame, DataFrame)> {
        let mut lookups = Lookups::default();
        for code in ["A", "B"] {
            lookups.regions.insert(code.into(), "Testland".into());
            lookups.income_groups.insert(code.into(), "High Income".into());
        }
        lookups.regions.insert("C".into(), "Elsewhere".into());
        let countries = DimensionCleaner::new(lookups).countries(
            &["A", "B", "C"]
                .map(|code| RawCountry {
                    country_code: Some(code.into()),
                    country_name: Some(format!("Country {code}")),
                    ..Default::default()
                }),
        );
        let raw = measures
            .iter()
            .map(|(code, year, record, value)| RawMeasure {
                country_code: Some(code.to_string()),
                year: Some(*year),
                record: Some(record.to_string()),
                value: Some(*value),
                ..Default::default()
            })
            .collect::<Vec<_>>();
        Ok((
            Measure::to_frame(&FactNormalizer.normalize(&raw))?,
            Country::to_frame(&countries)?,
        ))
    }

    #[test]
    fn stat_names_are_flat() {
        assert_eq!(AggStat::Std.column_name(COL::VALUE), "value_std");
        assert_eq!(AggStat::from_str("median").unwrap(), AggStat::Median);
        assert_eq!(AggStat::iter().count(), 6);
    }

    #[test]
    fn population_weighted_average() -> anyhow::Result<()> {
        let (measures, countries) = frames(&[
            ("A", 2020, records::POPULATION, 10.0),
            ("A", 2020, records::BIOCAP_PER_CAP, 5.0),
            ("B", 2020, records::POPULATION, 20.0),
            ("B", 2020, records::BIOCAP_PER_CAP, 8.0),
            // No population for 2021, so it is left out of the weighted rollup.
            ("A", 2021, records::BIOCAP_PER_CAP, 6.0),
        ])?;
        let aggs = aggregate(&measures, &countries)?;
        let weighted = aggs.population_weighted.expect("population data present");
        assert_eq!(weighted.height(), 1);
        let avg = weighted
            .column(COL::POPULATION_WEIGHTED_AVG)?
            .f64()?
            .get(0)
            .unwrap();
        assert!((avg - 7.0).abs() < 1e-12);
        assert_eq!(weighted.column(COL::POPULATION)?.f64()?.get(0), Some(30.0));
        assert_eq!(
            weighted.column(COL::REGION)?.str()?.get(0),
            Some("Testland")
        );
        Ok(())
    }

    #[test]
    fn region_and_income_statistics() -> anyhow::Result<()> {
        let (measures, countries) = frames(&[
            ("A", 2020, records::GDP, 1.0),
            ("B", 2020, records::GDP, 3.0),
            ("C", 2020, records::GDP, 10.0),
            ("A", 2020, "NotCore", 99.0),
            ("Z", 2020, records::GDP, 1000.0),
        ])?;
        let aggs = aggregate(&measures, &countries)?;
        assert!(aggs.population_weighted.is_none());

        let by_region = aggs.by_region;
        assert_eq!(
            by_region.get_column_names(),
            &[
                "region",
                "year",
                "record",
                "value_mean",
                "value_median",
                "value_std",
                "value_min",
                "value_max",
                "value_count"
            ]
        );
        assert_eq!(by_region.height(), 2);
        // Sorted by region: "Elsewhere" before "Testland".
        assert_eq!(by_region.column(COL::REGION)?.str()?.get(1), Some("Testland"));
        assert_eq!(by_region.column("value_mean")?.f64()?.get(1), Some(2.0));
        assert_eq!(by_region.column("value_median")?.f64()?.get(1), Some(2.0));
        let std = by_region.column("value_std")?.f64()?.get(1).unwrap();
        assert!((std - 2f64.sqrt()).abs() < 1e-12);
        assert_eq!(by_region.column("value_std")?.f64()?.get(0), None);
        assert_eq!(
            by_region
                .column("value_count")?
                .cast(&DataType::Int64)?
                .i64()?
                .get(1),
            Some(2)
        );

        // Country C has no income group entry and lands in "Unknown".
        let by_income = aggs.by_income;
        assert_eq!(by_income.height(), 2);
        assert_eq!(by_income.column("value_max")?.f64()?.get(0), Some(3.0));
        Ok(())
    }

    #[test]
    fn empty_dimension_gives_empty_rollups() -> anyhow::Result<()> {
        let (measures, _) = frames(&[("A", 2020, records::GDP, 1.0)])?;
        let countries = Country::to_frame(&[])?;
        let aggs = aggregate(&measures, &countries)?;
        assert_eq!(aggs.by_region.height(), 0);
        assert_eq!(aggs.by_income.height(), 0);
        assert!(aggs.population_weighted.is_none());
        Ok(())
    }
}
