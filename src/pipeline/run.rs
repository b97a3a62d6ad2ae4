//! Pipeline driver: chains the stages and collects their diagnostics.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::pipeline::aggregate::aggregate_to_units;
use crate::pipeline::bands::CoverageGap;
use crate::pipeline::binning::bin_ages;
use crate::pipeline::estimate::estimate_outcomes;
use crate::pipeline::lookup::GeoLookup;
use crate::pipeline::types::{Granularity, OutcomeEstimate, RawAgeRecord, UnitTotal};

/// Warning-level conditions raised during a run. None of them stop the run,
/// but each one biases the totals.
#[derive(Debug, Default, Clone, Serialize)]
pub struct Diagnostics {
    pub coverage_gaps: Vec<CoverageGap>,
    /// Records whose age fell in no band, per area.
    pub excluded_by_area: BTreeMap<String, u64>,
    pub excluded_population: u64,
    pub unmatched_bands: BTreeSet<String>,
    pub unmapped_areas: BTreeSet<String>,
    pub unmapped_population: u64,
}

impl Diagnostics {
    pub fn is_clean(&self) -> bool {
        self.coverage_gaps.is_empty()
            && self.excluded_population == 0
            && self.unmatched_bands.is_empty()
            && self.unmapped_areas.is_empty()
    }

    /// One human readable line per condition.
    pub fn warnings(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for gap in &self.coverage_gaps {
            lines.push(format!("ages {gap} are not covered by any band"));
        }
        if self.excluded_population > 0 {
            lines.push(format!(
                "{} records in {} areas fell outside every band",
                self.excluded_population,
                self.excluded_by_area.len()
            ));
        }
        for band in &self.unmatched_bands {
            lines.push(format!("band '{band}' has no rates, outcomes set to zero"));
        }
        if !self.unmapped_areas.is_empty() {
            lines.push(format!(
                "{} small areas ({} people) have no parent unit",
                self.unmapped_areas.len(),
                self.unmapped_population
            ));
        }
        lines
    }
}

/// Both output tables of a run plus what went wrong along the way.
#[derive(Debug)]
pub struct PipelineOutput {
    /// Small area to parent unit mapping, whatever the granularity.
    pub lookup: GeoLookup,
    pub granularity: Granularity,
    /// Sorted by area id, then configured band order.
    pub area_outcomes: Vec<OutcomeEstimate>,
    /// Sorted by parent unit id.
    pub unit_totals: Vec<UnitTotal>,
    /// Number of records that entered the pipeline.
    pub raw_population: u64,
    pub diagnostics: Diagnostics,
}

impl PipelineOutput {
    /// Per-area rows grouped by the parent unit they roll up to.
    ///
    /// Rows of unmapped areas are left out.
    pub fn outcomes_by_unit(&self) -> BTreeMap<&str, Vec<&OutcomeEstimate>> {
        let mut grouped: BTreeMap<&str, Vec<&OutcomeEstimate>> = BTreeMap::new();
        for row in &self.area_outcomes {
            let parent = match self.granularity {
                Granularity::SmallArea => self.lookup.parent_of(&row.small_area_id),
                Granularity::ParentUnit => Some(row.small_area_id.as_str()),
            };
            if let Some(parent) = parent {
                grouped.entry(parent).or_default().push(row);
            }
        }
        grouped
    }

    pub fn total_population(&self) -> u64 {
        self.unit_totals.iter().map(|u| u.population).sum()
    }
}

/// Runs lookup, binning, estimation and aggregation over `records`.
///
/// # Errors
///
/// Fails before any data is processed if the band table is invalid, and on
/// any small area that maps to two parent units.
#[tracing::instrument(skip_all, fields(records = records.len(), mode = %config.mode, granularity = %config.granularity))]
pub fn run_pipeline(records: Vec<RawAgeRecord>, config: &PipelineConfig) -> Result<PipelineOutput> {
    let bands = config.band_set()?;
    let mut diagnostics = Diagnostics {
        coverage_gaps: bands.check_coverage(config.max_expected_age),
        ..Default::default()
    };

    let area_lookup = GeoLookup::build(&records)?;
    let raw_population = records.len() as u64;

    let binned = bin_ages(records, &bands, config.granularity);
    diagnostics.excluded_population = binned.total_excluded();
    if diagnostics.excluded_population > 0 {
        warn!(
            excluded = diagnostics.excluded_population,
            areas = binned.excluded.len(),
            "Population outside every age band excluded from totals"
        );
    }
    diagnostics.excluded_by_area = binned.excluded;

    let estimated = estimate_outcomes(binned.counts, &config.bands, config.mode);
    diagnostics.unmatched_bands = estimated.unmatched_bands;

    let aggregated = match config.granularity {
        Granularity::SmallArea => aggregate_to_units(&estimated.estimates, &area_lookup),
        Granularity::ParentUnit => {
            let units: BTreeSet<&str> = estimated
                .estimates
                .iter()
                .map(|e| e.small_area_id.as_str())
                .collect();
            aggregate_to_units(&estimated.estimates, &GeoLookup::identity(units))
        }
    };
    diagnostics.unmapped_areas = aggregated.unmapped_areas;
    diagnostics.unmapped_population = aggregated.unmapped_population;

    info!(
        areas = area_lookup.len(),
        units = aggregated.totals.len(),
        population = raw_population,
        "Pipeline finished"
    );

    Ok(PipelineOutput {
        lookup: area_lookup,
        granularity: config.granularity,
        area_outcomes: estimated.estimates,
        unit_totals: aggregated.totals,
        raw_population,
        diagnostics,
    })
}
