//! Age bands and their outcome rates.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{PipelineError, Result};

/// Built-in rate table: lower age, upper age,
/// hospitalisation, critical care, fatality.
pub static DEFAULT_RATES: &[(u32, u32, f64, f64, f64)] = &[
    (0, 9, 0.1, 5.0, 0.002),
    (10, 19, 0.3, 5.0, 0.006),
    (20, 29, 1.2, 5.0, 0.03),
    (30, 39, 3.2, 5.0, 0.08),
    (40, 49, 4.9, 6.3, 0.15),
    (50, 59, 10.2, 12.2, 0.6),
    (60, 69, 16.6, 27.4, 2.2),
    (70, 79, 24.3, 43.2, 5.1),
    (80, 200, 27.3, 70.9, 9.3),
];

/// Closed age interval `[lower, upper]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AgeBand {
    pub lower: u32,
    pub upper: u32,
}

impl AgeBand {
    pub fn new(lower: u32, upper: u32) -> Self {
        AgeBand { lower, upper }
    }

    /// Both endpoints are inclusive.
    pub fn contains(&self, age: u32) -> bool {
        self.lower <= age && age <= self.upper
    }

    pub fn label(&self) -> String {
        format!("{} to {}", self.lower, self.upper)
    }
}

/// One row of the rate table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandRates {
    pub lower: u32,
    pub upper: u32,
    pub hospitalisation_rate: f64,
    pub critical_care_rate: f64,
    pub fatality_rate: f64,
}

impl BandRates {
    pub fn band(&self) -> AgeBand {
        AgeBand::new(self.lower, self.upper)
    }

    pub fn label(&self) -> String {
        self.band().label()
    }
}

impl From<(u32, u32, f64, f64, f64)> for BandRates {
    fn from((lower, upper, h, c, f): (u32, u32, f64, f64, f64)) -> Self {
        BandRates {
            lower,
            upper,
            hospitalisation_rate: h,
            critical_care_rate: c,
            fatality_rate: f,
        }
    }
}

/// Returns the built-in rate table.
pub fn default_rates() -> Vec<BandRates> {
    DEFAULT_RATES.iter().copied().map(BandRates::from).collect()
}

/// A range of ages not covered by any band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CoverageGap {
    pub lower: u32,
    pub upper: u32,
}

impl std::fmt::Display for CoverageGap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to {}", self.lower, self.upper)
    }
}

/// Validated, ordered set of non-overlapping bands.
#[derive(Debug, Clone)]
pub struct BandSet {
    bands: Vec<AgeBand>,
    labels: Vec<String>,
}

impl BandSet {
    /// Validates the bands of a rate table, keeping their configured order.
    ///
    /// # Errors
    ///
    /// Fails on an empty table, an inverted band, or any two bands sharing an
    /// age. Gaps are not an error; see [`BandSet::coverage_gaps`].
    pub fn from_rates(rates: &[BandRates]) -> Result<Self> {
        Self::new(rates.iter().map(BandRates::band).collect())
    }

    pub fn new(bands: Vec<AgeBand>) -> Result<Self> {
        if bands.is_empty() {
            return Err(PipelineError::EmptyBandSet);
        }

        for band in &bands {
            if band.lower > band.upper {
                return Err(PipelineError::InvalidBand {
                    lower: band.lower,
                    upper: band.upper,
                });
            }
        }

        let mut sorted = bands.clone();
        sorted.sort_by_key(|b| (b.lower, b.upper));
        for pair in sorted.windows(2) {
            if pair[1].lower <= pair[0].upper {
                return Err(PipelineError::OverlappingBands {
                    first: pair[0].label(),
                    second: pair[1].label(),
                });
            }
        }

        let labels = bands.iter().map(AgeBand::label).collect();
        Ok(BandSet { bands, labels })
    }

    pub fn bands(&self) -> &[AgeBand] {
        &self.bands
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// Index of the band containing `age`, if any.
    pub fn position(&self, age: u32) -> Option<usize> {
        self.bands.iter().position(|b| b.contains(age))
    }

    /// Age ranges within `0..=max_age` that fall in no band.
    pub fn coverage_gaps(&self, max_age: u32) -> Vec<CoverageGap> {
        let mut sorted = self.bands.clone();
        sorted.sort_by_key(|b| b.lower);

        let mut gaps = Vec::new();
        let mut next = 0u32;
        for band in sorted {
            if band.lower > max_age {
                break;
            }
            if band.lower > next {
                gaps.push(CoverageGap {
                    lower: next,
                    upper: band.lower - 1,
                });
            }
            next = match band.upper.checked_add(1) {
                Some(n) => n.max(next),
                None => return gaps,
            };
            if next > max_age {
                return gaps;
            }
        }

        if next <= max_age {
            gaps.push(CoverageGap {
                lower: next,
                upper: max_age,
            });
        }
        gaps
    }

    /// Logs every gap as a warning and returns them.
    pub fn check_coverage(&self, max_age: u32) -> Vec<CoverageGap> {
        let gaps = self.coverage_gaps(max_age);
        for gap in &gaps {
            warn!(gap = %gap, max_age, "Ages not covered by any band will be excluded");
        }
        gaps
    }
}
