//! Static classification tables used by the dimension cleaner. They are plain configuration data
//! so a `Config` file, or a test fixture, can replace any of them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Category assigned to countries without a region or income group entry.
pub const UNKNOWN: &str = "Unknown";

/// Default number of leading code characters compared when deriving a record category.
pub const DEFAULT_PREFIX_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum RecordCategory {
    Biocapacity,
    #[serde(rename = "Ecological Footprint")]
    #[strum(serialize = "Ecological Footprint")]
    EcologicalFootprint,
    Population,
    #[serde(rename = "Land Use")]
    #[strum(serialize = "Land Use")]
    LandUse,
    Economic,
    Other,
}

/// Maps a code prefix to a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub prefix: String,
    pub category: RecordCategory,
}

impl CategoryRule {
    pub fn new(prefix: &str, category: RecordCategory) -> Self {
        Self {
            prefix: prefix.to_string(),
            category,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Lookups {
    /// Country code to region name.
    pub regions: BTreeMap<String, String>,
    /// Country code to income group name.
    pub income_groups: BTreeMap<String, String>,
    /// Ordered prefix rules; the first match wins.
    pub categories: Vec<CategoryRule>,
    pub prefix_len: usize,
}

fn leading(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

impl Lookups {
    pub fn region(&self, country_code: &str) -> String {
        self.regions
            .get(country_code)
            .cloned()
            .unwrap_or_else(|| UNKNOWN.to_string())
    }

    pub fn income_group(&self, country_code: &str) -> String {
        self.income_groups
            .get(country_code)
            .cloned()
            .unwrap_or_else(|| UNKNOWN.to_string())
    }

    /// Look up the first `prefix_len` characters of `code` in the rule table. A rule matches
    /// only when its prefix equals that slice exactly, so rules longer than `prefix_len` never
    /// match.
    pub fn category(&self, code: &str) -> RecordCategory {
        let code_prefix = leading(code, self.prefix_len);
        self.categories
            .iter()
            .find(|rule| rule.prefix == code_prefix)
            .map(|rule| rule.category)
            .unwrap_or(RecordCategory::Other)
    }
}

fn to_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl Default for Lookups {
    fn default() -> Self {
        // TODO: load the full country classification from a published source instead of this
        // sample covering the largest economies per continent.
        let regions = to_map(&[
            ("4", "Europe"),
            ("5", "Europe"),
            ("40", "Europe"),
            ("203", "Europe"),
            ("233", "Europe"),
            ("232", "Europe"),
            ("39", "North America"),
            ("43", "North America"),
            ("142", "North America"),
            ("35", "Asia"),
            ("113", "Asia"),
            ("114", "Asia"),
            ("116", "Asia"),
            ("117", "Asia"),
            ("119", "Asia"),
            ("66", "Africa"),
            ("83", "Africa"),
            ("108", "Africa"),
            ("133", "Africa"),
            ("159", "Africa"),
            ("209", "Africa"),
            ("31", "South America"),
            ("48", "South America"),
            ("49", "South America"),
            ("63", "South America"),
            ("176", "South America"),
            ("238", "South America"),
            ("14", "Oceania"),
            ("166", "Oceania"),
            ("174", "Oceania"),
        ]);
        let income_groups = to_map(&[
            ("14", "High Income"),
            ("40", "High Income"),
            ("119", "High Income"),
            ("232", "High Income"),
            ("39", "High Income"),
            ("31", "Upper Middle Income"),
            ("35", "Upper Middle Income"),
            ("49", "Upper Middle Income"),
            ("133", "Upper Middle Income"),
            ("176", "Upper Middle Income"),
            ("63", "Lower Middle Income"),
            ("83", "Lower Middle Income"),
            ("113", "Lower Middle Income"),
            ("114", "Lower Middle Income"),
            ("116", "Lower Middle Income"),
            ("66", "Low Income"),
            ("108", "Low Income"),
            ("159", "Low Income"),
        ]);
        let categories = vec![
            CategoryRule::new("BCpc", RecordCategory::Biocapacity),
            CategoryRule::new("BC", RecordCategory::Biocapacity),
            CategoryRule::new("EFCpc", RecordCategory::EcologicalFootprint),
            CategoryRule::new("EFC", RecordCategory::EcologicalFootprint),
            CategoryRule::new("pop", RecordCategory::Population),
            CategoryRule::new("Land", RecordCategory::LandUse),
            CategoryRule::new("gdp", RecordCategory::Economic),
        ];
        Self {
            regions,
            income_groups,
            categories,
            prefix_len: DEFAULT_PREFIX_LEN,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn unmapped_codes_fall_back_to_unknown() {
        let lookups = Lookups::default();
        assert_eq!(lookups.region("39"), "North America");
        assert_eq!(lookups.income_group("39"), "High Income");
        assert_eq!(lookups.region("999"), UNKNOWN);
        assert_eq!(lookups.income_group("999"), UNKNOWN);
    }

    #[test]
    fn category_uses_fixed_length_prefix() {
        let lookups = Lookups::default();
        assert_eq!(lookups.category("BCpc"), RecordCategory::Biocapacity);
        assert_eq!(lookups.category("BC"), RecordCategory::Biocapacity);
        assert_eq!(lookups.category("EFC"), RecordCategory::EcologicalFootprint);
        assert_eq!(lookups.category("pop"), RecordCategory::Population);
        assert_eq!(lookups.category("LandTot"), RecordCategory::LandUse);
        assert_eq!(lookups.category("gdp"), RecordCategory::Economic);
        // Shares only two characters with "BCpc" and is longer than "BC".
        assert_eq!(lookups.category("BCtot"), RecordCategory::Other);
        assert_eq!(lookups.category("hdi"), RecordCategory::Other);
        assert_eq!(lookups.category(""), RecordCategory::Other);
    }

    #[test]
    fn rules_longer_than_the_prefix_never_match() {
        let lookups = Lookups::default();
        // "EFCpc" is cut to "EFCp", which no 4-character rule names.
        assert_eq!(lookups.category("EFCpc"), RecordCategory::Other);
        assert_eq!(lookups.category("EFCpX"), RecordCategory::Other);

        let wider = Lookups {
            prefix_len: 5,
            ..Lookups::default()
        };
        assert_eq!(wider.category("EFCpc"), RecordCategory::EcologicalFootprint);
        assert_eq!(wider.category("EFCpX"), RecordCategory::Other);
    }

    #[test]
    fn category_display_round_trips() {
        for category in [
            RecordCategory::Biocapacity,
            RecordCategory::EcologicalFootprint,
            RecordCategory::LandUse,
            RecordCategory::Other,
        ] {
            let shown = category.to_string();
            assert_eq!(RecordCategory::from_str(&shown).unwrap(), category);
        }
        assert_eq!(
            RecordCategory::EcologicalFootprint.to_string(),
            "Ecological Footprint"
        );
    }

    #[test]
    fn lookups_deserialize_from_toml_fixture() -> anyhow::Result<()> {
        let lookups: Lookups = toml::from_str(
            r#"
            prefix_len = 2
            [regions]
            A = "Testland"
            [[categories]]
            prefix = "zz"
            category = "Land Use"
            "#,
        )?;
        assert_eq!(lookups.region("A"), "Testland");
        assert_eq!(lookups.income_group("A"), UNKNOWN);
        assert_eq!(lookups.category("zzz"), RecordCategory::LandUse);
        Ok(())
    }
}
