//! Rolls per-area estimates up to parent units.

use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;

use crate::pipeline::lookup::GeoLookup;
use crate::pipeline::types::{OutcomeEstimate, UnitTotal};

/// Unit totals plus the small areas that had no lookup entry.
#[derive(Debug, Default)]
pub struct Aggregated {
    /// Sorted by parent unit id.
    pub totals: Vec<UnitTotal>,
    pub unmapped_areas: BTreeSet<String>,
    /// Population of the unmapped areas, lost from every total.
    pub unmapped_population: u64,
}

#[derive(Default)]
struct Running {
    population: u64,
    hospitalisation: f64,
    critical_care: f64,
    fatality: f64,
}

/// Rounds half to even, so 2.5 becomes 2 and 3.5 becomes 4.
pub fn round_half_even(value: f64) -> u64 {
    let rounded = value.round_ties_even();
    if rounded <= 0.0 { 0 } else { rounded as u64 }
}

/// Sums estimates per parent unit and rounds each outcome total.
///
/// Estimates are summed in small area order (stable, so band order within an
/// area is kept) to make the floating point result reproducible.
pub fn aggregate_to_units(estimates: &[OutcomeEstimate], lookup: &GeoLookup) -> Aggregated {
    let mut ordered: Vec<&OutcomeEstimate> = estimates.iter().collect();
    ordered.sort_by(|a, b| a.small_area_id.cmp(&b.small_area_id));

    let mut units: BTreeMap<String, Running> = BTreeMap::new();
    let mut out = Aggregated::default();

    for estimate in ordered {
        let Some(parent) = lookup.parent_of(&estimate.small_area_id) else {
            if out.unmapped_areas.insert(estimate.small_area_id.clone()) {
                warn!(
                    small_area_id = %estimate.small_area_id,
                    "Small area missing from lookup, excluded from unit totals"
                );
            }
            out.unmapped_population += estimate.population;
            continue;
        };

        let running = units.entry(parent.to_string()).or_default();
        running.population += estimate.population;
        running.hospitalisation += estimate.hospitalisation;
        running.critical_care += estimate.critical_care;
        running.fatality += estimate.fatality;
    }

    out.totals = units
        .into_iter()
        .map(|(parent_unit_id, r)| UnitTotal {
            parent_unit_id,
            population: r.population,
            hospitalisation: round_half_even(r.hospitalisation),
            critical_care: round_half_even(r.critical_care),
            fatality: round_half_even(r.fatality),
        })
        .collect();

    out
}
