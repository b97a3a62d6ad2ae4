//! Persistence of the result tables and the run summary.
//!
//! Nothing is written until the pipeline has finished, so a failed run
//! leaves no partial tables behind.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use csv::WriterBuilder;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::ingest::RejectedRecord;
use crate::pipeline::PipelineOutput;
use crate::pipeline::types::{EstimationMode, Granularity};

/// Columns of the per-area outcome table.
pub const AREA_COLUMNS: &[&str] = &[
    "small_area_id",
    "band_label",
    "population",
    "hospitalisation",
    "critical_care",
    "fatality",
];

/// Columns of the per-unit total table.
pub const UNIT_COLUMNS: &[&str] = &[
    "parent_unit_id",
    "population",
    "hospitalisation",
    "critical_care",
    "fatality",
];

/// Columns of the small area lookup table.
pub const LOOKUP_COLUMNS: &[&str] = &["small_area_id", "parent_unit_id"];

pub const AREA_RESULTS_FILE: &str = "area_results.csv";
pub const LOOKUP_FILE: &str = "lookup.csv";
pub const UNIT_RESULTS_FILE: &str = "lad_results.csv";
pub const SUMMARY_FILE: &str = "run_summary.json";

/// Overview of a finished run, written as `run_summary.json`.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub generated_at: DateTime<Utc>,
    pub mode: EstimationMode,
    pub granularity: Granularity,
    pub units: usize,
    pub small_areas: usize,
    pub population: u64,
    pub excluded_population: u64,
    pub unmapped_population: u64,
    pub rejected_records: usize,
    pub warnings: Vec<String>,
    pub rejected: Vec<RejectedRecord>,
}

impl RunSummary {
    pub fn new(output: &PipelineOutput, config: &PipelineConfig, rejected: &[RejectedRecord]) -> Self {
        RunSummary {
            generated_at: Utc::now(),
            mode: config.mode,
            granularity: config.granularity,
            units: output.unit_totals.len(),
            small_areas: output.lookup.len(),
            population: output.total_population(),
            excluded_population: output.diagnostics.excluded_population,
            unmapped_population: output.diagnostics.unmapped_population,
            rejected_records: rejected.len(),
            warnings: output.diagnostics.warnings(),
            rejected: rejected.to_vec(),
        }
    }
}

/// Writes `rows` as a CSV file with the given header, replacing any existing
/// file and creating parent directories as needed.
pub fn write_table<T: Serialize>(
    path: &Path,
    headers: &[&str],
    rows: impl IntoIterator<Item = T>,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let file = fs::File::create(path)
        .with_context(|| format!("Failed to create table: {}", path.display()))?;
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);

    writer.write_record(headers)?;
    let mut count = 0usize;
    for row in rows {
        writer.serialize(row)?;
        count += 1;
    }
    writer.flush()?;

    debug!(path = %path.display(), rows = count, "Table written");
    Ok(())
}

/// Logs the summary as pretty-printed JSON.
pub fn print_json(summary: &RunSummary) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(summary)?);
    Ok(())
}

pub fn write_summary(path: &Path, summary: &RunSummary) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = serde_json::to_vec_pretty(summary)?;
    fs::write(path, body).with_context(|| format!("Failed to write summary: {}", path.display()))?;
    Ok(())
}

/// Sub-directory holding one per-area table per unit.
pub fn unit_table_dir(granularity: Granularity) -> &'static str {
    match granularity {
        Granularity::SmallArea => "msoa",
        Granularity::ParentUnit => "lads",
    }
}

/// Writes every result file under `results_dir` and returns their paths.
///
/// The per-unit table directory is cleared first so tables from an earlier
/// run never sit next to this run's totals.
pub fn write_results(
    results_dir: &Path,
    output: &PipelineOutput,
    summary: &RunSummary,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();

    let unit_dir = results_dir.join(unit_table_dir(summary.granularity));
    if unit_dir.exists() {
        fs::remove_dir_all(&unit_dir)
            .with_context(|| format!("Failed to clear directory: {}", unit_dir.display()))?;
        debug!(dir = %unit_dir.display(), "Cleared previous unit tables");
    }
    for (unit, rows) in output.outcomes_by_unit() {
        let path = unit_dir.join(format!("{unit}.csv"));
        write_table(&path, AREA_COLUMNS, rows)?;
        written.push(path);
    }

    let path = results_dir.join(AREA_RESULTS_FILE);
    write_table(&path, AREA_COLUMNS, &output.area_outcomes)?;
    written.push(path);

    let path = results_dir.join(LOOKUP_FILE);
    write_table(&path, LOOKUP_COLUMNS, output.lookup.entries())?;
    written.push(path);

    let path = results_dir.join(UNIT_RESULTS_FILE);
    write_table(&path, UNIT_COLUMNS, &output.unit_totals)?;
    written.push(path);

    let path = results_dir.join(SUMMARY_FILE);
    write_summary(&path, summary)?;
    written.push(path);

    info!(
        results_dir = %results_dir.display(),
        files = written.len(),
        "Results written"
    );
    Ok(written)
}
