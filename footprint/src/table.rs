//! Conversion between the typed rows the stages work on and the polars frames that get
//! published.

use chrono::NaiveDateTime;
use polars::prelude::*;

use crate::COL;

/// A row type that can be laid out as a table. `to_frame` must produce the same schema for an
/// empty slice as for a populated one so that empty tables still publish with their columns.
pub trait TableRow: Sized {
    fn to_frame(rows: &[Self]) -> PolarsResult<DataFrame>;
}

/// Append a `transformed_at` column holding `at` on every row.
pub fn stamp(mut df: DataFrame, at: NaiveDateTime) -> PolarsResult<DataFrame> {
    let stamps = vec![at; df.height()];
    df.with_column(Series::new(COL::TRANSFORMED_AT, stamps))?;
    Ok(df)
}

/// Drop the `transformed_at` column if present, for comparisons across runs.
pub fn unstamped(df: &DataFrame) -> DataFrame {
    df.drop(COL::TRANSFORMED_AT).unwrap_or_else(|_| df.clone())
}

/// Keep only finite results; division by zero and friends become null.
pub fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn stamping_adds_a_datetime_column() -> anyhow::Result<()> {
        let at = NaiveDate::from_ymd_opt(2024, 5, 1)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap();
        let df = df!(COL::YEAR => &[2020i32, 2021])?;
        let stamped = stamp(df.clone(), at)?;
        assert_eq!(stamped.width(), 2);
        assert!(matches!(
            stamped.column(COL::TRANSFORMED_AT)?.dtype(),
            DataType::Datetime(_, _)
        ));
        assert!(unstamped(&stamped).equals(&df));

        let empty = stamp(df!(COL::YEAR => Vec::<i32>::new())?, at)?;
        assert_eq!(empty.height(), 0);
        assert_eq!(empty.width(), 2);
        Ok(())
    }

    #[test]
    fn non_finite_values_become_null() {
        assert_eq!(finite(1.0 / 0.0), None);
        assert_eq!(finite(f64::NAN), None);
        assert_eq!(finite(2.5), Some(2.5));
    }
}
