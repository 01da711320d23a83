//! Long/wide reshaping over keyed numeric cells.
//!
//! `pivot` turns `(key, column, value)` cells into a `Wide` table with one row per key and one
//! column per distinct column label, ordered by the label's natural order. `Wide::melt` is the
//! inverse and emits every cell, nulls included, column by column.

use std::collections::BTreeMap;
use std::fmt::Display;

use itertools::Itertools;

#[derive(Debug, Clone, PartialEq)]
pub struct Wide<K> {
    keys: Vec<K>,
    columns: Vec<(String, Vec<Option<f64>>)>,
}

/// Pivot long cells to wide form. When several cells share a `(key, column)` pair the first
/// non-null value wins.
pub fn pivot<K, C, I>(cells: I) -> (Wide<K>, Vec<C>)
where
    K: Ord + Clone,
    C: Ord + Clone + Display,
    I: IntoIterator<Item = (K, C, Option<f64>)>,
{
    let mut grid: BTreeMap<K, BTreeMap<C, Option<f64>>> = BTreeMap::new();
    for (key, column, value) in cells {
        let slot = grid.entry(key).or_default().entry(column).or_insert(None);
        if slot.is_none() {
            *slot = value;
        }
    }
    let labels = grid
        .values()
        .flat_map(|row| row.keys().cloned())
        .sorted()
        .dedup()
        .collect_vec();
    let columns = labels
        .iter()
        .map(|label| {
            let values = grid
                .values()
                .map(|row| row.get(label).copied().flatten())
                .collect_vec();
            (label.to_string(), values)
        })
        .collect_vec();
    let keys = grid.into_keys().collect_vec();
    (Wide { keys, columns }, labels)
}

impl<K: Clone> Wide<K> {
    pub fn height(&self) -> usize {
        self.keys.len()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, values)| values.as_slice())
    }

    /// Append a derived column computed row by row from the existing ones.
    pub fn derive<F>(&mut self, name: String, f: F)
    where
        F: Fn(usize) -> Option<f64>,
    {
        let values = (0..self.height()).map(f).collect_vec();
        self.columns.push((name, values));
    }

    /// Back to long form, one `(key, column, value)` per cell.
    pub fn melt(self) -> Vec<(K, String, Option<f64>)> {
        let keys = self.keys;
        self.columns
            .into_iter()
            .flat_map(|(name, values)| {
                keys.iter()
                    .zip(values)
                    .map(|(key, value)| (key.clone(), name.clone(), value))
                    .collect_vec()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells() -> Vec<((String, String), i32, Option<f64>)> {
        vec![
            (("2".into(), "GDP".into()), 2019, Some(1.0)),
            (("2".into(), "GDP".into()), 2020, Some(2.0)),
            (("3".into(), "GDP".into()), 2020, Some(4.0)),
            (("3".into(), "GDP".into()), 2021, Some(8.0)),
        ]
    }

    #[test]
    fn pivot_orders_columns_and_fills_gaps() {
        let (wide, years) = pivot(cells());
        assert_eq!(years, vec![2019, 2020, 2021]);
        assert_eq!(wide.height(), 2);
        assert_eq!(
            wide.column_names().collect_vec(),
            vec!["2019", "2020", "2021"]
        );
        assert_eq!(wide.column("2019"), Some(&[Some(1.0), None][..]));
        assert_eq!(wide.column("2021"), Some(&[None, Some(8.0)][..]));
    }

    #[test]
    fn first_value_wins_on_duplicate_cells() {
        let (wide, _) = pivot(vec![(1, 2020, Some(1.0)), (1, 2020, Some(9.0))]);
        assert_eq!(wide.column("2020"), Some(&[Some(1.0)][..]));
    }

    #[test]
    fn pivot_then_melt_reproduces_the_input() {
        let (wide, _) = pivot(cells());
        let mut back = wide
            .melt()
            .into_iter()
            .filter_map(|(key, year, value)| value.map(|v| (key, year.parse::<i32>().unwrap(), v)))
            .collect_vec();
        back.sort_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));
        let expected = cells()
            .into_iter()
            .map(|(k, y, v)| (k, y, v.unwrap()))
            .collect_vec();
        assert_eq!(back, expected);
    }

    #[test]
    fn derived_columns_are_melted_after_the_pivoted_ones() {
        let (mut wide, _) = pivot(vec![("a", 2020, Some(1.0)), ("a", 2021, Some(3.0))]);
        let first = wide.column("2020").unwrap().to_vec();
        let last = wide.column("2021").unwrap().to_vec();
        wide.derive("diff".into(), |i| Some(last[i]? - first[i]?));
        let long = wide.melt();
        assert_eq!(long.len(), 3);
        assert_eq!(long[2], ("a", "diff".to_string(), Some(2.0)));
    }
}
