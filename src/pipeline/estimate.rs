//! Applies per-band rates to binned populations.

use std::collections::{BTreeSet, HashMap};

use tracing::warn;

use crate::pipeline::bands::BandRates;
use crate::pipeline::types::{BinnedCount, EstimationMode, OutcomeEstimate};

/// Estimates plus any band labels that had no rate-table entry.
#[derive(Debug, Default)]
pub struct Estimates {
    pub estimates: Vec<OutcomeEstimate>,
    pub unmatched_bands: BTreeSet<String>,
}

/// Hospitalisation, critical care and fatality for one band population.
///
/// In [`EstimationMode::Direct`] every rate multiplies the population. In
/// [`EstimationMode::Cascading`] rates are percentages and each outcome is
/// taken from the one before it.
pub fn apply_rates(population: u64, rates: &BandRates, mode: EstimationMode) -> (f64, f64, f64) {
    let population = population as f64;
    match mode {
        EstimationMode::Direct => (
            population * rates.hospitalisation_rate,
            population * rates.critical_care_rate,
            population * rates.fatality_rate,
        ),
        EstimationMode::Cascading => {
            let hospitalisation = population * (rates.hospitalisation_rate / 100.0);
            let critical_care = hospitalisation * (rates.critical_care_rate / 100.0);
            let fatality = critical_care * (rates.fatality_rate / 100.0);
            (hospitalisation, critical_care, fatality)
        }
    }
}

/// Turns every binned count into an outcome estimate.
///
/// A count whose label is missing from `rates` keeps its population, gets zero
/// outcomes, and is logged and listed in [`Estimates::unmatched_bands`].
pub fn estimate_outcomes(
    counts: Vec<BinnedCount>,
    rates: &[BandRates],
    mode: EstimationMode,
) -> Estimates {
    let by_label: HashMap<String, &BandRates> = rates.iter().map(|r| (r.label(), r)).collect();

    let mut out = Estimates::default();
    out.estimates.reserve(counts.len());

    for count in counts {
        let (hospitalisation, critical_care, fatality) = match by_label.get(&count.band_label) {
            Some(rates) => apply_rates(count.population, rates, mode),
            None => {
                warn!(
                    small_area_id = %count.small_area_id,
                    band = %count.band_label,
                    population = count.population,
                    "No rates configured for band, outcomes set to zero"
                );
                out.unmatched_bands.insert(count.band_label.clone());
                (0.0, 0.0, 0.0)
            }
        };

        out.estimates.push(OutcomeEstimate {
            small_area_id: count.small_area_id,
            band_label: count.band_label,
            population: count.population,
            hospitalisation,
            critical_care,
            fatality,
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::bands::default_rates;

    fn count(area: &str, label: &str, population: u64) -> BinnedCount {
        BinnedCount {
            small_area_id: area.into(),
            band_label: label.into(),
            population,
        }
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_direct_mode_is_plain_multiplier() {
        let rates = default_rates();
        for r in &rates {
            let (h, c, f) = apply_rates(40, r, EstimationMode::Direct);
            assert!(approx(h / 40.0, r.hospitalisation_rate));
            assert!(approx(c / 40.0, r.critical_care_rate));
            assert!(approx(f / 40.0, r.fatality_rate));
        }
    }

    #[test]
    fn test_cascading_mode_chains_percentages() {
        let rates = default_rates();
        for r in &rates {
            let (h, c, f) = apply_rates(1000, r, EstimationMode::Cascading);
            assert!(approx(h, 1000.0 * r.hospitalisation_rate / 100.0));
            assert!(approx(c, h * r.critical_care_rate / 100.0));
            assert!(approx(
                f,
                h * (r.critical_care_rate / 100.0) * (r.fatality_rate / 100.0)
            ));
            assert!(f <= h);
            assert!(c <= h);
        }
    }

    #[test]
    fn test_scenario_values() {
        let rates: Vec<BandRates> = vec![
            (0, 9, 0.1, 5.0, 0.002).into(),
            (80, 200, 27.3, 70.9, 9.3).into(),
        ];
        let est = estimate_outcomes(
            vec![count("A", "0 to 9", 2), count("A", "80 to 200", 1)],
            &rates,
            EstimationMode::Cascading,
        );

        assert!(est.unmatched_bands.is_empty());
        assert!(approx(est.estimates[0].hospitalisation, 0.002));
        assert!(approx(est.estimates[1].hospitalisation, 0.273));
        assert!(approx(est.estimates[1].critical_care, 0.273 * 0.709));
        assert!(approx(est.estimates[1].fatality, 0.273 * 0.709 * 0.093));
    }

    #[test]
    fn test_zero_population_gives_zero_outcomes() {
        let est = estimate_outcomes(
            vec![count("A", "0 to 9", 0)],
            &default_rates(),
            EstimationMode::Direct,
        );
        let e = &est.estimates[0];
        assert_eq!((e.hospitalisation, e.critical_care, e.fatality), (0.0, 0.0, 0.0));
    }

    #[test]
    fn test_unmatched_band_is_zero_filled_and_reported() {
        let est = estimate_outcomes(
            vec![count("A", "0 to 4", 12), count("A", "10 to 19", 3)],
            &default_rates(),
            EstimationMode::Cascading,
        );

        assert_eq!(est.estimates.len(), 2);
        assert_eq!(est.estimates[0].population, 12);
        assert_eq!(est.estimates[0].hospitalisation, 0.0);
        assert!(est.estimates[1].hospitalisation > 0.0);
        assert!(est.unmatched_bands.contains("0 to 4"));
        assert_eq!(est.unmatched_bands.len(), 1);
    }
}
