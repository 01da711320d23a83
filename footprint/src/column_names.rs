//! This module stores the canonical column names of every table the pipeline produces. Raw
//! source fields are renamed to these snake-case names at the ingestion boundary, and the
//! store's views refer to them by name, so they must stay in sync with `catalog`.

pub const COUNTRY_CODE: &str = "country_code";
pub const COUNTRY_NAME: &str = "country_name";
pub const SHORT_NAME: &str = "short_name";
pub const ISO_A2: &str = "iso_a2";
pub const REGION: &str = "region";
pub const INCOME_GROUP: &str = "income_group";
pub const SCORE: &str = "score";

pub const YEAR: &str = "year";
pub const DECADE: &str = "decade";
pub const START_DATE: &str = "start_date";
pub const END_DATE: &str = "end_date";

pub const CODE: &str = "code";
pub const NAME: &str = "name";
pub const NOTE: &str = "note";
pub const RECORD: &str = "record";
pub const CATEGORY: &str = "category";

pub const CROP_LAND: &str = "crop_land";
pub const GRAZING_LAND: &str = "grazing_land";
pub const FOREST_LAND: &str = "forest_land";
pub const FISHING_GROUND: &str = "fishing_ground";
pub const BUILTUP_LAND: &str = "builtup_land";
pub const CARBON: &str = "carbon";
pub const VALUE: &str = "value";
pub const COUNTRY_NAME_ORIG: &str = "country_name_orig";
pub const SHORT_NAME_ORIG: &str = "short_name_orig";
pub const ISO_A2_ORIG: &str = "iso_a2_orig";

/// The six land-type components of a footprint or biocapacity measure, in publication order.
pub const COMPONENTS: [&str; 6] = [
    CROP_LAND,
    GRAZING_LAND,
    FOREST_LAND,
    FISHING_GROUND,
    BUILTUP_LAND,
    CARBON,
];

pub const BIOCAPACITY: &str = "biocapacity";
pub const FOOTPRINT: &str = "footprint";
pub const ECOLOGICAL_BALANCE: &str = "ecological_balance";
pub const ECOLOGICAL_RATIO: &str = "ecological_ratio";
pub const IS_DEFICIT: &str = "is_deficit";

pub const CROP_LAND_PCT: &str = "crop_land_pct";
pub const GRAZING_LAND_PCT: &str = "grazing_land_pct";
pub const FOREST_LAND_PCT: &str = "forest_land_pct";
pub const FISHING_GROUND_PCT: &str = "fishing_ground_pct";
pub const BUILTUP_LAND_PCT: &str = "builtup_land_pct";
pub const CARBON_PCT: &str = "carbon_pct";
pub const CARBON_DEPENDENCY: &str = "carbon_dependency";

/// Percentage columns matching `COMPONENTS` index for index.
pub const COMPONENT_PCTS: [&str; 6] = [
    CROP_LAND_PCT,
    GRAZING_LAND_PCT,
    FOREST_LAND_PCT,
    FISHING_GROUND_PCT,
    BUILTUP_LAND_PCT,
    CARBON_PCT,
];

pub const METRIC: &str = "metric";
pub const AVG_ANNUAL_CHANGE: &str = "avg_annual_change";
pub const AVG_ANNUAL_PCT_CHANGE: &str = "avg_annual_pct_change";

pub const POPULATION: &str = "population";
pub const WEIGHTED_VALUE: &str = "weighted_value";
pub const POPULATION_WEIGHTED_AVG: &str = "population_weighted_avg";

pub const TRANSFORMED_AT: &str = "transformed_at";
pub const LOADED_AT: &str = "loaded_at";
