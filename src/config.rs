//! Pipeline configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::pipeline::bands::{BandRates, BandSet, default_rates};
use crate::pipeline::types::{EstimationMode, Granularity};

fn default_max_expected_age() -> u32 {
    100
}

/// Everything the pipeline needs besides the records themselves.
///
/// Stored as JSON on disk; every field is optional:
/// ```json
/// {
///   "mode": "cascading",
///   "granularity": "small-area",
///   "max_expected_age": 100,
///   "bands": [
///     { "lower": 0, "upper": 9, "hospitalisation_rate": 0.1,
///       "critical_care_rate": 5.0, "fatality_rate": 0.002 }
///   ]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub mode: EstimationMode,
    #[serde(default)]
    pub granularity: Granularity,
    /// Oldest age the bands are expected to cover; gaps below it are warned about.
    #[serde(default = "default_max_expected_age")]
    pub max_expected_age: u32,
    #[serde(default = "default_rates")]
    pub bands: Vec<BandRates>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            mode: EstimationMode::default(),
            granularity: Granularity::default(),
            max_expected_age: default_max_expected_age(),
            bands: default_rates(),
        }
    }
}

impl PipelineConfig {
    /// Loads the config from a JSON file at `path`.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: PipelineConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Loads from `path` if given, otherwise the built-in defaults.
    pub fn load_or_default(path: Option<&str>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn with_mode(mut self, mode: Option<EstimationMode>) -> Self {
        if let Some(mode) = mode {
            self.mode = mode;
        }
        self
    }

    pub fn with_granularity(mut self, granularity: Option<Granularity>) -> Self {
        if let Some(granularity) = granularity {
            self.granularity = granularity;
        }
        self
    }

    /// Validates the band table without touching any data.
    pub fn band_set(&self) -> crate::error::Result<BandSet> {
        BandSet::from_rates(&self.bands)
    }
}
