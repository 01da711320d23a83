//! Canonical record-family names used by the indicator and aggregation stages.

pub const BIOCAP_PER_CAP: &str = "BiocapPerCap";
pub const EF_CONS_PER_CAP: &str = "EFConsPerCap";
pub const POPULATION: &str = "Population";
pub const GDP: &str = "GDP";

/// Record families that the time-series and aggregation stages restrict themselves to.
pub const CORE_FAMILIES: [&str; 4] = [BIOCAP_PER_CAP, EF_CONS_PER_CAP, POPULATION, GDP];

/// The two per-capita families the published views filter on.
pub const PER_CAPITA_FAMILIES: [&str; 2] = [BIOCAP_PER_CAP, EF_CONS_PER_CAP];

pub fn is_core_family(record: &str) -> bool {
    CORE_FAMILIES.contains(&record)
}
