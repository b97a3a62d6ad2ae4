//! Data types flowing between the pipeline stages.

use serde::{Deserialize, Serialize};

use crate::error::RecordError;

/// One census micro-observation: a single person of `age` living in
/// `small_area_id`, which belongs to `parent_unit_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAgeRecord {
    pub small_area_id: String,
    pub parent_unit_id: String,
    pub age: u32,
}

impl RawAgeRecord {
    pub fn new(small_area_id: &str, parent_unit_id: &str, age: u32) -> Self {
        RawAgeRecord {
            small_area_id: small_area_id.to_string(),
            parent_unit_id: parent_unit_id.to_string(),
            age,
        }
    }

    /// Builds a record from raw text fields.
    ///
    /// # Errors
    ///
    /// Returns a [`RecordError`] if either identifier is blank, or if the age
    /// is not an integer or is negative.
    pub fn parse(small_area_id: &str, parent_unit_id: &str, age: &str) -> Result<Self, RecordError> {
        let small_area_id = small_area_id.trim();
        let parent_unit_id = parent_unit_id.trim();
        let age = age.trim();

        if small_area_id.is_empty() {
            return Err(RecordError::MissingField("small_area_id"));
        }
        if parent_unit_id.is_empty() {
            return Err(RecordError::MissingField("parent_unit_id"));
        }

        let value: i64 = age
            .parse()
            .map_err(|_| RecordError::NonNumericAge(age.to_string()))?;
        if value < 0 {
            return Err(RecordError::NegativeAge(value));
        }
        let age = u32::try_from(value).map_err(|_| RecordError::NonNumericAge(age.to_string()))?;

        Ok(Self::new(small_area_id, parent_unit_id, age))
    }
}

/// Small area to parent unit mapping row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeoLookupEntry {
    pub small_area_id: String,
    pub parent_unit_id: String,
}

/// Population of one small area within one age band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BinnedCount {
    pub small_area_id: String,
    pub band_label: String,
    pub population: u64,
}

/// Real-valued outcome estimate for one (small area, band) pair.
///
/// Serialised as a row of the per-area outcome table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeEstimate {
    pub small_area_id: String,
    pub band_label: String,
    pub population: u64,
    pub hospitalisation: f64,
    pub critical_care: f64,
    pub fatality: f64,
}

/// Rounded totals for one parent unit, serialised as a row of the unit table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitTotal {
    pub parent_unit_id: String,
    pub population: u64,
    pub hospitalisation: u64,
    pub critical_care: u64,
    pub fatality: u64,
}

/// How band rates turn a population into outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EstimationMode {
    /// Each rate is a plain multiplier on the band population.
    Direct,
    /// Rates are percentages, each applied to the previous outcome.
    #[default]
    #[serde(alias = "cascading-percentage")]
    Cascading,
}

impl std::fmt::Display for EstimationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EstimationMode::Direct => write!(f, "direct"),
            EstimationMode::Cascading => write!(f, "cascading"),
        }
    }
}

/// Geography at which raw records are binned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Granularity {
    /// Bin per small area, then roll up through the lookup.
    #[default]
    SmallArea,
    /// Bin per parent unit directly; the small area id is ignored.
    ParentUnit,
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Granularity::SmallArea => write!(f, "small-area"),
            Granularity::ParentUnit => write!(f, "parent-unit"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_record() {
        let record = RawAgeRecord::parse("E02002483", "E06000001", "42").unwrap();
        assert_eq!(record, RawAgeRecord::new("E02002483", "E06000001", 42));
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let record = RawAgeRecord::parse(" A ", "X", " 7 ").unwrap();
        assert_eq!(record.small_area_id, "A");
        assert_eq!(record.age, 7);
    }

    #[test]
    fn test_parse_rejects_negative_age() {
        let err = RawAgeRecord::parse("A", "X", "-1").unwrap_err();
        assert_eq!(err, RecordError::NegativeAge(-1));
    }

    #[test]
    fn test_parse_rejects_non_numeric_age() {
        let err = RawAgeRecord::parse("A", "X", "abc").unwrap_err();
        assert_eq!(err, RecordError::NonNumericAge("abc".to_string()));
    }

    #[test]
    fn test_parse_rejects_missing_ids() {
        assert_eq!(
            RawAgeRecord::parse("", "X", "1").unwrap_err(),
            RecordError::MissingField("small_area_id")
        );
        assert_eq!(
            RawAgeRecord::parse("A", "  ", "1").unwrap_err(),
            RecordError::MissingField("parent_unit_id")
        );
    }

    #[test]
    fn test_mode_deserialises_both_spellings() {
        let a: EstimationMode = serde_json::from_str("\"cascading\"").unwrap();
        let b: EstimationMode = serde_json::from_str("\"cascading-percentage\"").unwrap();
        let c: EstimationMode = serde_json::from_str("\"direct\"").unwrap();
        assert_eq!(a, EstimationMode::Cascading);
        assert_eq!(b, EstimationMode::Cascading);
        assert_eq!(c, EstimationMode::Direct);
    }
}
