//! Derived indicators over the fact table: ecological balance, footprint composition and
//! time-series deltas. The balance works on frames with polars joins; composition and the
//! time series work on typed rows.

use itertools::Itertools;
use log::{info, warn};
use polars::prelude::*;

use crate::facts::Measure;
use crate::records::{self, BIOCAP_PER_CAP, EF_CONS_PER_CAP};
use crate::reshape;
use crate::table::{finite, TableRow};
use crate::COL;

#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    pub measure: Measure,
    /// Component shares of the total value, in `COL::COMPONENT_PCTS` order.
    pub pcts: [Option<f64>; 6],
    pub carbon_dependency: Option<f64>,
}

/// One long-format time-series metric for a (country, record family).
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesChange {
    pub country_code: String,
    pub record: String,
    pub metric: String,
    pub value: Option<f64>,
}

fn family(measures: &DataFrame, record: &str, alias: &str) -> LazyFrame {
    measures
        .clone()
        .lazy()
        .filter(col(COL::RECORD).eq(lit(record)))
        .select([
            col(COL::COUNTRY_CODE),
            col(COL::YEAR),
            col(COL::VALUE).alias(alias),
        ])
}

/// Biocapacity against footprint per (country, year), from the unstamped fact and country
/// frames. Both families are full-joined, so a side missing from the facts is null and so is
/// everything computed from it, except `is_deficit`, which is then false. Country fields come
/// from a left join on the dimension.
///
/// Without either family or without any country the result is empty, with the full schema.
pub fn ecological_balance(measures: &DataFrame, countries: &DataFrame) -> PolarsResult<DataFrame> {
    let has_family = |record: &str| -> PolarsResult<bool> {
        Ok(measures
            .column(COL::RECORD)?
            .str()?
            .into_iter()
            .any(|r| r == Some(record)))
    };
    let measures = if countries.height() == 0 {
        warn!("Missing data for calculating ecological indicators");
        measures.clear()
    } else if !has_family(BIOCAP_PER_CAP)? || !has_family(EF_CONS_PER_CAP)? {
        warn!("Missing biocapacity or footprint data for calculating indicators");
        measures.clear()
    } else {
        info!("Calculating ecological indicators");
        measures.clone()
    };

    let keys = [col(COL::COUNTRY_CODE), col(COL::YEAR)];
    family(&measures, BIOCAP_PER_CAP, COL::BIOCAPACITY)
        .join(
            family(&measures, EF_CONS_PER_CAP, COL::FOOTPRINT),
            keys.clone(),
            keys,
            JoinArgs::new(JoinType::Full).with_coalesce(JoinCoalesce::CoalesceColumns),
        )
        .with_columns([
            (col(COL::BIOCAPACITY) - col(COL::FOOTPRINT)).alias(COL::ECOLOGICAL_BALANCE),
            when(col(COL::FOOTPRINT).neq(lit(0.0)))
                .then(col(COL::BIOCAPACITY) / col(COL::FOOTPRINT))
                .otherwise(lit(NULL))
                .alias(COL::ECOLOGICAL_RATIO),
        ])
        .with_column(
            col(COL::ECOLOGICAL_BALANCE)
                .lt(lit(0.0))
                .fill_null(lit(false))
                .alias(COL::IS_DEFICIT),
        )
        .join(
            countries.clone().lazy().select([
                col(COL::COUNTRY_CODE),
                col(COL::COUNTRY_NAME),
                col(COL::REGION),
                col(COL::INCOME_GROUP),
            ]),
            [col(COL::COUNTRY_CODE)],
            [col(COL::COUNTRY_CODE)],
            JoinArgs::new(JoinType::Left),
        )
        .sort_by_exprs(
            [col(COL::COUNTRY_CODE), col(COL::YEAR)],
            SortMultipleOptions::default(),
        )
        .collect()
}

/// Component shares of every footprint-per-capita row. A zero total yields null shares.
pub fn footprint_composition(measures: &[Measure]) -> Vec<Composition> {
    let composition = measures
        .iter()
        .filter(|m| m.record == EF_CONS_PER_CAP)
        .map(|m| Composition {
            pcts: m.components().map(|c| finite(c / m.value * 100.0)),
            carbon_dependency: finite(m.carbon / m.value * 100.0),
            measure: m.clone(),
        })
        .collect_vec();
    if composition.is_empty() {
        warn!("Missing footprint data for calculating composition");
    } else {
        info!("Calculated footprint composition for {} rows", composition.len());
    }
    composition
}

/// Year values, year-over-year changes and average annual changes per (country, record family)
/// for the core families, in long form.
pub fn time_series_changes(measures: &[Measure]) -> Vec<SeriesChange> {
    let cells = measures
        .iter()
        .filter(|m| records::is_core_family(&m.record))
        .map(|m| ((m.country_code.clone(), m.record.clone()), m.year, Some(m.value)))
        .collect_vec();
    if cells.is_empty() {
        warn!("No relevant records found for time series analysis");
        return vec![];
    }
    info!("Calculating time series changes over {} measures", cells.len());

    let (mut wide, years) = reshape::pivot(cells);
    let year_column = |wide: &reshape::Wide<_>, year: &i32| -> Vec<Option<f64>> {
        wide.column(&year.to_string())
            .map(<[_]>::to_vec)
            .unwrap_or_default()
    };

    for (prev, curr) in years.iter().tuple_windows() {
        let before = year_column(&wide, prev);
        let after = year_column(&wide, curr);
        wide.derive(format!("change_{prev}_to_{curr}"), |i| {
            finite(after[i]? - before[i]?)
        });
        wide.derive(format!("pct_change_{prev}_to_{curr}"), |i| {
            finite((after[i]? - before[i]?) / before[i]? * 100.0)
        });
    }

    if let (Some(first), Some(last)) = (years.first(), years.last()) {
        let span = last - first;
        if span > 0 {
            let start = year_column(&wide, first);
            let end = year_column(&wide, last);
            let span = f64::from(span);
            wide.derive(COL::AVG_ANNUAL_CHANGE.to_string(), |i| {
                finite((end[i]? - start[i]?) / span)
            });
            wide.derive(COL::AVG_ANNUAL_PCT_CHANGE.to_string(), |i| {
                finite(((end[i]? / start[i]?).powf(1.0 / span) - 1.0) * 100.0)
            });
        }
    }

    wide.melt()
        .into_iter()
        .map(|((country_code, record), metric, value)| SeriesChange {
            country_code,
            record,
            metric,
            value,
        })
        .collect()
}

impl TableRow for Composition {
    fn to_frame(rows: &[Self]) -> PolarsResult<DataFrame> {
        let measures = rows.iter().map(|r| r.measure.clone()).collect_vec();
        let mut df = Measure::to_frame(&measures)?;
        for (idx, name) in COL::COMPONENT_PCTS.iter().enumerate() {
            df.with_column(Series::new(
                name,
                rows.iter().map(|r| r.pcts[idx]).collect::<Vec<_>>(),
            ))?;
        }
        df.with_column(Series::new(
            COL::CARBON_DEPENDENCY,
            rows.iter().map(|r| r.carbon_dependency).collect::<Vec<_>>(),
        ))?;
        Ok(df)
    }
}

impl TableRow for SeriesChange {
    fn to_frame(rows: &[Self]) -> PolarsResult<DataFrame> {
        DataFrame::new(vec![
            Series::new(
                COL::COUNTRY_CODE,
                rows.iter().map(|r| r.country_code.as_str()).collect::<Vec<_>>(),
            ),
            Series::new(
                COL::RECORD,
                rows.iter().map(|r| r.record.as_str()).collect::<Vec<_>>(),
            ),
            Series::new(
                COL::METRIC,
                rows.iter().map(|r| r.metric.as_str()).collect::<Vec<_>>(),
            ),
            Series::new(COL::VALUE, rows.iter().map(|r| r.value).collect::<Vec<_>>()),
        ])
    }
}
