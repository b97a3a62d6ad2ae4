use spatial_impact::config::PipelineConfig;
use spatial_impact::error::PipelineError;
use spatial_impact::ingest::{list_units, load_all};
use spatial_impact::output::{RunSummary, UNIT_RESULTS_FILE, write_results};
use spatial_impact::pipeline::run_pipeline;
use spatial_impact::pipeline::types::{Granularity, UnitTotal};
use std::fs;
use std::path::PathBuf;

const FIXTURE_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/msoa_2018");
const DIRECT_CONFIG: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/direct_rates.json");

fn total(id: &str, population: u64, h: u64, c: u64, f: u64) -> UnitTotal {
    UnitTotal {
        parent_unit_id: id.to_string(),
        population,
        hospitalisation: h,
        critical_care: c,
        fatality: f,
    }
}

#[tokio::test]
async fn test_full_pipeline_cascading() {
    let units = list_units(FIXTURE_DIR).expect("Failed to list fixture units");
    assert_eq!(units.len(), 2);

    let batch = load_all(units, 2).await.expect("Failed to load fixtures");
    assert_eq!(batch.records.len(), 10);
    assert_eq!(batch.rejected.len(), 2);

    let output = run_pipeline(batch.records, &PipelineConfig::default()).unwrap();

    assert_eq!(
        output.unit_totals,
        vec![total("E06000001", 6, 1, 0, 0), total("E06000002", 4, 0, 0, 0)]
    );
    assert_eq!(output.lookup.len(), 3);
    assert!(output.diagnostics.is_clean());
}

#[tokio::test]
async fn test_full_pipeline_direct() {
    let config = PipelineConfig::load(DIRECT_CONFIG).unwrap();
    let batch = load_all(list_units(FIXTURE_DIR).unwrap(), 1).await.unwrap();
    let output = run_pipeline(batch.records, &config).unwrap();

    assert_eq!(output.unit_totals[0], total("E06000001", 6, 60, 135, 15));
}

#[tokio::test]
async fn test_parent_unit_granularity_matches_unit_totals() {
    let batch = load_all(list_units(FIXTURE_DIR).unwrap(), 2).await.unwrap();
    let by_area = run_pipeline(batch.records.clone(), &PipelineConfig::default()).unwrap();

    let config = PipelineConfig::default().with_granularity(Some(Granularity::ParentUnit));
    let by_unit = run_pipeline(batch.records, &config).unwrap();

    assert_eq!(by_area.total_population(), by_unit.total_population());
    assert_eq!(by_unit.area_outcomes.len(), 2 * 9);
}

#[tokio::test]
async fn test_area_in_two_units_is_rejected() {
    let dir = std::env::temp_dir().join("spatial_impact_it_ambiguous");
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("ass_E1_MSOA11_2018.csv"), "Area,DC1117EW_C_AGE\nM1,5\n").unwrap();
    fs::write(dir.join("ass_E2_MSOA11_2018.csv"), "Area,DC1117EW_C_AGE\nM1,6\n").unwrap();

    let batch = load_all(list_units(dir.to_str().unwrap()).unwrap(), 2).await.unwrap();
    let err = run_pipeline(batch.records, &PipelineConfig::default()).unwrap_err();

    assert!(matches!(err, PipelineError::AmbiguousGeoMapping { .. }));

    fs::remove_dir_all(&dir).unwrap();
}

#[tokio::test]
async fn test_results_written_to_disk() {
    let results_dir: PathBuf = std::env::temp_dir().join("spatial_impact_it_results");
    let _ = fs::remove_dir_all(&results_dir);

    let config = PipelineConfig::default();
    let batch = load_all(list_units(FIXTURE_DIR).unwrap(), 2).await.unwrap();
    let output = run_pipeline(batch.records, &config).unwrap();
    let summary = RunSummary::new(&output, &config, &batch.rejected);
    write_results(&results_dir, &output, &summary).unwrap();

    let units = fs::read_to_string(results_dir.join(UNIT_RESULTS_FILE)).unwrap();
    let lines: Vec<_> = units.lines().collect();
    assert_eq!(
        lines,
        vec![
            "parent_unit_id,population,hospitalisation,critical_care,fatality",
            "E06000001,6,1,0,0",
            "E06000002,4,0,0,0",
        ]
    );

    let unit_table = fs::read_to_string(results_dir.join("msoa").join("E06000001.csv")).unwrap();
    assert!(unit_table.starts_with("small_area_id,band_label,population"));
    // two areas, nine bands each, plus header
    assert_eq!(unit_table.lines().count(), 19);

    assert_eq!(summary.rejected_records, 2);

    fs::remove_dir_all(&results_dir).unwrap();
}
