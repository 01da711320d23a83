//! SQL text for the analytical store: keyed base tables and the statements that move parquet
//! snapshots into tables.

use itertools::Itertools;

use crate::catalog::{tables, IndexSpec, ViewSpec};
use crate::COL;

/// A base table with a primary key, loaded by keyed upsert.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyedTable {
    pub name: &'static str,
    /// `(column, type)` pairs in table order, key columns included.
    pub columns: &'static [(&'static str, &'static str)],
    pub key: &'static [&'static str],
    /// Whether the table carries a `loaded_at` column set on every write.
    pub stamped: bool,
}

pub const COUNTRIES: KeyedTable = KeyedTable {
    name: tables::COUNTRIES,
    columns: &[
        (COL::COUNTRY_CODE, "VARCHAR"),
        (COL::COUNTRY_NAME, "VARCHAR"),
        (COL::SHORT_NAME, "VARCHAR"),
        (COL::ISO_A2, "VARCHAR"),
    ],
    key: &[COL::COUNTRY_CODE],
    stamped: false,
};

pub const YEARS: KeyedTable = KeyedTable {
    name: tables::YEARS,
    columns: &[(COL::YEAR, "INTEGER")],
    key: &[COL::YEAR],
    stamped: false,
};

pub const RECORD_TYPES: KeyedTable = KeyedTable {
    name: tables::RECORD_TYPES,
    columns: &[
        (COL::CODE, "VARCHAR"),
        (COL::NAME, "VARCHAR"),
        (COL::NOTE, "VARCHAR"),
        (COL::RECORD, "VARCHAR"),
    ],
    key: &[COL::CODE],
    stamped: false,
};

pub const ECOLOGICAL_MEASURES: KeyedTable = KeyedTable {
    name: tables::ECOLOGICAL_MEASURES,
    columns: &[
        (COL::COUNTRY_CODE, "VARCHAR"),
        (COL::YEAR, "INTEGER"),
        (COL::RECORD, "VARCHAR"),
        (COL::CROP_LAND, "DOUBLE"),
        (COL::GRAZING_LAND, "DOUBLE"),
        (COL::FOREST_LAND, "DOUBLE"),
        (COL::FISHING_GROUND, "DOUBLE"),
        (COL::BUILTUP_LAND, "DOUBLE"),
        (COL::CARBON, "DOUBLE"),
        (COL::VALUE, "DOUBLE"),
        (COL::SCORE, "VARCHAR"),
    ],
    key: &[COL::COUNTRY_CODE, COL::YEAR, COL::RECORD],
    stamped: true,
};

pub const BASE_TABLES: [KeyedTable; 4] = [COUNTRIES, YEARS, RECORD_TYPES, ECOLOGICAL_MEASURES];

pub fn keyed_table(name: &str) -> Option<KeyedTable> {
    BASE_TABLES.into_iter().find(|t| t.name == name)
}

pub fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// A single-quoted SQL string literal.
pub fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn read_parquet(path: &str) -> String {
    format!("read_parquet({})", literal(path))
}

impl KeyedTable {
    fn column_list(&self) -> String {
        self.columns.iter().map(|(c, _)| quote(c)).join(", ")
    }

    pub fn create_sql(&self) -> String {
        let mut definitions = self
            .columns
            .iter()
            .map(|(c, ty)| format!("{} {ty}", quote(c)))
            .collect_vec();
        if self.stamped {
            definitions.push(format!("{} TIMESTAMP", quote(COL::LOADED_AT)));
        }
        definitions.push(format!(
            "PRIMARY KEY ({})",
            self.key.iter().map(|k| quote(k)).join(", ")
        ));
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote(self.name),
            definitions.join(", ")
        )
    }

    fn key_not_null(&self) -> String {
        self.key
            .iter()
            .map(|k| format!("{} IS NOT NULL", quote(k)))
            .join(" AND ")
    }

    /// Rows of the snapshot at `path` that cannot be keyed.
    pub fn null_key_count_sql(&self, path: &str) -> String {
        format!(
            "SELECT COUNT(*) FROM {} WHERE NOT ({})",
            read_parquet(path),
            self.key_not_null()
        )
    }

    /// Insert every keyed row of the snapshot at `path`, overwriting rows that share a key.
    pub fn upsert_sql(&self, path: &str) -> String {
        let mut insert_columns = self.column_list();
        let mut select_columns = self.column_list();
        let mut updates = self
            .columns
            .iter()
            .map(|(c, _)| *c)
            .filter(|c| !self.key.contains(c))
            .map(|c| format!("{0} = EXCLUDED.{0}", quote(c)))
            .collect_vec();
        if self.stamped {
            insert_columns.push_str(&format!(", {}", quote(COL::LOADED_AT)));
            select_columns.push_str(", now()::TIMESTAMP");
            updates.push(format!("{0} = EXCLUDED.{0}", quote(COL::LOADED_AT)));
        }
        let conflict = if updates.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", updates.join(", "))
        };
        format!(
            "INSERT INTO {} ({insert_columns}) SELECT {select_columns} FROM {} WHERE {} \
             ON CONFLICT ({}) {conflict}",
            quote(self.name),
            read_parquet(path),
            self.key_not_null(),
            self.key.iter().map(|k| quote(k)).join(", "),
        )
    }
}

/// Drop `table` and recreate it from the snapshot at `path`.
pub fn replace_sql(table: &str, path: &str) -> String {
    format!(
        "DROP TABLE IF EXISTS {0}; CREATE TABLE {0} AS SELECT * FROM {1}",
        quote(table),
        read_parquet(path)
    )
}

pub fn create_from_parquet_sql(table: &str, path: &str) -> String {
    format!(
        "CREATE TABLE {} AS SELECT * FROM {}",
        quote(table),
        read_parquet(path)
    )
}

pub fn append_sql(table: &str, path: &str) -> String {
    format!(
        "INSERT INTO {} SELECT * FROM {}",
        quote(table),
        read_parquet(path)
    )
}

pub fn count_sql(table: &str) -> String {
    format!("SELECT COUNT(*) FROM {}", quote(table))
}

pub const TABLE_EXISTS_SQL: &str =
    "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = ?";

pub fn threads_sql(threads: usize) -> String {
    format!("SET threads = {}", threads.max(1))
}

impl IndexSpec {
    pub fn create_sql(&self) -> String {
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
            quote(&self.name),
            quote(&self.table),
            self.columns.iter().map(|c| quote(c)).join(", ")
        )
    }
}

impl ViewSpec {
    pub fn create_sql(&self) -> String {
        format!(
            "DROP VIEW IF EXISTS {0}; CREATE VIEW {0} AS {1}",
            quote(&self.name),
            self.query
        )
    }
}
