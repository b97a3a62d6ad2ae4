//! Groups single-year-of-age records into age bands.

use std::collections::BTreeMap;

use tracing::debug;

use crate::pipeline::bands::BandSet;
use crate::pipeline::types::{BinnedCount, Granularity, RawAgeRecord};

/// Result of binning: counts plus the population that fell outside every band.
#[derive(Debug, Default)]
pub struct BinnedAges {
    /// Sorted by area id, then configured band order. Every band is present for
    /// every observed area, with population 0 where nothing matched.
    pub counts: Vec<BinnedCount>,
    /// Records per area whose age fell in no band. Areas with none are absent.
    pub excluded: BTreeMap<String, u64>,
}

impl BinnedAges {
    pub fn total_population(&self) -> u64 {
        self.counts.iter().map(|c| c.population).sum()
    }

    pub fn total_excluded(&self) -> u64 {
        self.excluded.values().sum()
    }
}

/// Builds the area id → ages index the binner works from.
pub fn group_ages(records: Vec<RawAgeRecord>, granularity: Granularity) -> BTreeMap<String, Vec<u32>> {
    let mut index: BTreeMap<String, Vec<u32>> = BTreeMap::new();
    for record in records {
        let key = match granularity {
            Granularity::SmallArea => record.small_area_id,
            Granularity::ParentUnit => record.parent_unit_id,
        };
        index.entry(key).or_default().push(record.age);
    }
    index
}

/// Counts records per (area, band).
pub fn bin_ages(records: Vec<RawAgeRecord>, bands: &BandSet, granularity: Granularity) -> BinnedAges {
    let index = group_ages(records, granularity);
    let mut out = BinnedAges::default();

    for (area, ages) in index {
        let mut per_band = vec![0u64; bands.len()];
        let mut outside = 0u64;

        for age in ages {
            match bands.position(age) {
                Some(i) => per_band[i] += 1,
                None => outside += 1,
            }
        }

        if outside > 0 {
            debug!(area = %area, outside, "Records outside every age band");
            out.excluded.insert(area.clone(), outside);
        }

        for (label, population) in bands.labels().iter().zip(per_band) {
            out.counts.push(BinnedCount {
                small_area_id: area.clone(),
                band_label: label.clone(),
                population,
            });
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::bands::{AgeBand, default_rates};

    fn records(rows: &[(&str, &str, u32)]) -> Vec<RawAgeRecord> {
        rows.iter()
            .map(|(a, p, age)| RawAgeRecord::new(a, p, *age))
            .collect()
    }

    fn population_of(binned: &BinnedAges, area: &str, label: &str) -> u64 {
        binned
            .counts
            .iter()
            .find(|c| c.small_area_id == area && c.band_label == label)
            .map(|c| c.population)
            .unwrap()
    }

    #[test]
    fn test_counts_per_band() {
        let bands = BandSet::new(vec![AgeBand::new(0, 9), AgeBand::new(80, 200)]).unwrap();
        let binned = bin_ages(
            records(&[("A", "X", 5), ("A", "X", 5), ("A", "X", 85)]),
            &bands,
            Granularity::SmallArea,
        );

        assert_eq!(
            binned.counts,
            vec![
                BinnedCount {
                    small_area_id: "A".into(),
                    band_label: "0 to 9".into(),
                    population: 2
                },
                BinnedCount {
                    small_area_id: "A".into(),
                    band_label: "80 to 200".into(),
                    population: 1
                },
            ]
        );
        assert!(binned.excluded.is_empty());
    }

    #[test]
    fn test_boundary_ages_land_in_their_band() {
        let bands = BandSet::from_rates(&default_rates()).unwrap();
        let binned = bin_ages(
            records(&[("A", "X", 9), ("A", "X", 10), ("A", "X", 79), ("A", "X", 80)]),
            &bands,
            Granularity::SmallArea,
        );

        assert_eq!(population_of(&binned, "A", "0 to 9"), 1);
        assert_eq!(population_of(&binned, "A", "10 to 19"), 1);
        assert_eq!(population_of(&binned, "A", "70 to 79"), 1);
        assert_eq!(population_of(&binned, "A", "80 to 200"), 1);
    }

    #[test]
    fn test_empty_bands_are_zero_filled() {
        let bands = BandSet::from_rates(&default_rates()).unwrap();
        let binned = bin_ages(records(&[("A", "X", 30)]), &bands, Granularity::SmallArea);

        assert_eq!(binned.counts.len(), 9);
        assert_eq!(population_of(&binned, "A", "0 to 9"), 0);
        assert_eq!(population_of(&binned, "A", "30 to 39"), 1);
    }

    #[test]
    fn test_gap_free_bands_preserve_population() {
        let bands = BandSet::from_rates(&default_rates()).unwrap();
        let input: Vec<_> = (0..=105).map(|age| RawAgeRecord::new("A", "X", age)).collect();
        let raw = input.len() as u64;
        let binned = bin_ages(input, &bands, Granularity::SmallArea);

        assert_eq!(binned.total_population(), raw);
        assert_eq!(binned.total_excluded(), 0);
    }

    #[test]
    fn test_gapped_bands_drop_population() {
        let bands = BandSet::new(vec![AgeBand::new(0, 9), AgeBand::new(20, 29)]).unwrap();
        let binned = bin_ages(
            records(&[("A", "X", 5), ("A", "X", 15), ("A", "X", 25), ("B", "X", 99)]),
            &bands,
            Granularity::SmallArea,
        );

        assert_eq!(binned.total_population(), 2);
        assert!(binned.total_population() < 4);
        assert_eq!(binned.excluded.get("A"), Some(&1));
        assert_eq!(binned.excluded.get("B"), Some(&1));
        // area B is still emitted, all zeros
        assert_eq!(population_of(&binned, "B", "0 to 9"), 0);
    }

    #[test]
    fn test_parent_unit_granularity_merges_areas() {
        let bands = BandSet::new(vec![AgeBand::new(0, 200)]).unwrap();
        let binned = bin_ages(
            records(&[("A", "X", 5), ("B", "X", 50), ("C", "Y", 1)]),
            &bands,
            Granularity::ParentUnit,
        );

        assert_eq!(population_of(&binned, "X", "0 to 200"), 2);
        assert_eq!(population_of(&binned, "Y", "0 to 200"), 1);
    }

    #[test]
    fn test_output_is_sorted_by_area() {
        let bands = BandSet::new(vec![AgeBand::new(0, 200)]).unwrap();
        let binned = bin_ages(
            records(&[("C", "X", 5), ("A", "X", 50), ("B", "X", 1)]),
            &bands,
            Granularity::SmallArea,
        );
        let areas: Vec<_> = binned.counts.iter().map(|c| c.small_area_id.as_str()).collect();
        assert_eq!(areas, vec!["A", "B", "C"]);
    }
}
