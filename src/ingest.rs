//! Discovery and parsing of per-unit census age extracts.
//!
//! Each parent unit has one file named `ass_{UNIT}_MSOA11_2018.csv` (or the
//! same with `.gz`), holding one row per person.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::RecordError;
use crate::pipeline::types::RawAgeRecord;

/// Column holding the small area id.
pub const AREA_COLUMN: &str = "Area";
/// Column holding the single year of age.
pub const AGE_COLUMN: &str = "DC1117EW_C_AGE";

/// An extract file and the parent unit it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFile {
    pub unit_id: String,
    pub path: PathBuf,
}

/// A row that could not be turned into a [`RawAgeRecord`].
#[derive(Debug, Clone, Serialize)]
pub struct RejectedRecord {
    pub source: String,
    pub line: u64,
    pub reason: String,
}

/// Records parsed from one or more extracts.
#[derive(Debug, Default)]
pub struct IngestedBatch {
    pub records: Vec<RawAgeRecord>,
    pub rejected: Vec<RejectedRecord>,
}

impl IngestedBatch {
    pub fn extend(&mut self, other: IngestedBatch) {
        self.records.extend(other.records);
        self.rejected.extend(other.rejected);
    }
}

/// Parent unit id encoded in an extract file name: the second `_` token.
pub fn unit_id_from_file_name(name: &str) -> Option<&str> {
    if !(name.ends_with(".csv") || name.ends_with(".csv.gz")) {
        return None;
    }
    name.split('_').nth(1).filter(|id| !id.is_empty() && !id.contains('.'))
}

/// Lists extract files in `dir`, sorted by unit id.
///
/// Two extracts for the same unit (say `.csv` next to `.csv.gz`) are an
/// error, since reading both would count every person twice.
pub fn list_units(dir: &str) -> Result<Vec<UnitFile>> {
    let mut units = Vec::new();

    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read input directory: {dir}"))? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        match unit_id_from_file_name(name) {
            Some(unit_id) => units.push(UnitFile {
                unit_id: unit_id.to_string(),
                path: entry.path(),
            }),
            None => debug!(file = name, "Skipping file without a unit id"),
        }
    }

    units.sort_by(|a, b| a.unit_id.cmp(&b.unit_id));
    for pair in units.windows(2) {
        if pair[0].unit_id == pair[1].unit_id {
            anyhow::bail!(
                "Unit {} has more than one extract: {} and {}",
                pair[0].unit_id,
                pair[0].path.display(),
                pair[1].path.display()
            );
        }
    }
    Ok(units)
}

/// Parses extract rows from any reader. Malformed rows are logged and
/// returned in [`IngestedBatch::rejected`], including rows the csv reader
/// cannot decode. A missing column or an I/O error fails the file.
pub fn read_records<R: Read>(reader: R, unit_id: &str, source: &str) -> Result<IngestedBatch> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = rdr.headers()?.clone();

    let area_idx = headers
        .iter()
        .position(|h| h == AREA_COLUMN)
        .ok_or_else(|| anyhow::anyhow!("Column '{AREA_COLUMN}' not found in {source}"))?;
    let age_idx = headers
        .iter()
        .position(|h| h == AGE_COLUMN)
        .ok_or_else(|| anyhow::anyhow!("Column '{AGE_COLUMN}' not found in {source}"))?;

    let mut batch = IngestedBatch::default();

    for result in rdr.records() {
        let row = match result {
            Ok(row) => row,
            Err(e) if e.is_io_error() => {
                return Err(e).with_context(|| format!("Failed to read row in {source}"));
            }
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or(0);
                warn!(source, line, error = %e, "Rejected undecodable record");
                batch.rejected.push(RejectedRecord {
                    source: source.to_string(),
                    line,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        let line = row.position().map(|p| p.line()).unwrap_or(0);

        let parsed = match (row.get(area_idx), row.get(age_idx)) {
            (Some(area), Some(age)) => RawAgeRecord::parse(area, unit_id, age),
            (None, _) => Err(RecordError::MissingField("small_area_id")),
            (_, None) => Err(RecordError::MissingField("age")),
        };

        match parsed {
            Ok(record) => batch.records.push(record),
            Err(e) => {
                warn!(source, line, error = %e, "Rejected malformed record");
                batch.rejected.push(RejectedRecord {
                    source: source.to_string(),
                    line,
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(batch)
}

/// Reads one extract file, decompressing `.gz` files on the fly.
pub fn load_unit_records(file: &UnitFile) -> Result<IngestedBatch> {
    let source = file.path.display().to_string();
    let handle = File::open(&file.path).with_context(|| format!("Failed to open extract: {source}"))?;

    let reader: Box<dyn Read> = if is_gzip(&file.path) {
        Box::new(GzDecoder::new(handle))
    } else {
        Box::new(handle)
    };

    let batch = read_records(reader, &file.unit_id, &source)?;
    debug!(
        unit = %file.unit_id,
        records = batch.records.len(),
        rejected = batch.rejected.len(),
        "Extract loaded"
    );
    Ok(batch)
}

fn is_gzip(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("gz")
}

/// Loads every unit file concurrently, at most `concurrency` at a time.
///
/// Batches are merged in unit id order regardless of completion order.
#[tracing::instrument(skip(files), fields(files = files.len()))]
pub async fn load_all(files: Vec<UnitFile>, concurrency: usize) -> Result<IngestedBatch> {
    let semaphore = Arc::new(tokio::sync::Semaphore::new(concurrency.max(1)));
    let mut tasks = Vec::with_capacity(files.len());

    for file in files {
        let sem = semaphore.clone();
        tasks.push(tokio::spawn(async move {
            let _permit = sem.acquire_owned().await?;
            info!(unit = %file.unit_id, "Working on unit");
            let batch = tokio::task::spawn_blocking(move || load_unit_records(&file)).await??;
            Ok::<_, anyhow::Error>(batch)
        }));
    }

    let mut merged = IngestedBatch::default();
    for task in tasks {
        merged.extend(task.await??);
    }

    Ok(merged)
}
