//! Small area to parent unit lookup.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::pipeline::types::{GeoLookupEntry, RawAgeRecord};

/// Deduplicated mapping from small area id to parent unit id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeoLookup {
    entries: BTreeMap<String, String>,
}

impl GeoLookup {
    /// Builds the lookup from raw records.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::AmbiguousGeoMapping`] for the first small area
    /// (in arrival order) seen under two different parent units.
    pub fn build(records: &[RawAgeRecord]) -> Result<Self> {
        let mut entries: BTreeMap<String, String> = BTreeMap::new();

        for record in records {
            match entries.get(&record.small_area_id) {
                Some(parent) if parent != &record.parent_unit_id => {
                    return Err(PipelineError::AmbiguousGeoMapping {
                        small_area_id: record.small_area_id.clone(),
                        first: parent.clone(),
                        second: record.parent_unit_id.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    entries.insert(record.small_area_id.clone(), record.parent_unit_id.clone());
                }
            }
        }

        debug!(small_areas = entries.len(), "Geo lookup built");
        Ok(GeoLookup { entries })
    }

    /// Lookup where every id maps to itself, used when binning per parent unit.
    pub fn identity<'a>(ids: impl IntoIterator<Item = &'a str>) -> Self {
        GeoLookup {
            entries: ids
                .into_iter()
                .map(|id| (id.to_string(), id.to_string()))
                .collect(),
        }
    }

    pub fn parent_of(&self, small_area_id: &str) -> Option<&str> {
        self.entries.get(small_area_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by small area id.
    pub fn entries(&self) -> Vec<GeoLookupEntry> {
        self.entries
            .iter()
            .map(|(area, parent)| GeoLookupEntry {
                small_area_id: area.clone(),
                parent_unit_id: parent.clone(),
            })
            .collect()
    }
}
