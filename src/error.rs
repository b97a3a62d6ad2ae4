//! Error types for the estimation pipeline.

use thiserror::Error;

/// Run-level errors: anything that invalidates the whole run.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A small area was seen under more than one parent unit.
    #[error("small area '{small_area_id}' maps to both '{first}' and '{second}'")]
    AmbiguousGeoMapping {
        small_area_id: String,
        first: String,
        second: String,
    },

    /// A band whose lower bound exceeds its upper bound.
    #[error("invalid age band {lower} to {upper}: lower bound exceeds upper bound")]
    InvalidBand { lower: u32, upper: u32 },

    /// Two bands share at least one age.
    #[error("age bands '{first}' and '{second}' overlap")]
    OverlappingBands { first: String, second: String },

    /// No bands were configured at all.
    #[error("no age bands configured")]
    EmptyBandSet,
}

/// Why a single raw record was rejected. Rejected records are skipped, the
/// run continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("missing value for field '{0}'")]
    MissingField(&'static str),

    #[error("age '{0}' is not an integer")]
    NonNumericAge(String),

    #[error("age {0} is negative")]
    NegativeAge(i64),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
