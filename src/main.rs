//! CLI entry point for the spatial impact model.
//!
//! Provides subcommands for running the estimation pipeline over a directory
//! of per-unit census age extracts, listing the units found there, and
//! checking a band configuration.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use spatial_impact::config::PipelineConfig;
use spatial_impact::ingest::{list_units, load_all};
use spatial_impact::output::{RunSummary, print_json, write_results};
use spatial_impact::pipeline::run_pipeline;
use spatial_impact::pipeline::types::{EstimationMode, Granularity};
use std::ffi::OsStr;
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "spatial_impact")]
#[command(about = "Estimate health impacts from small-area census age extracts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    /// Rates are plain multipliers on the band population
    Direct,
    /// Rates are percentages, each applied to the previous outcome
    Cascading,
}

impl From<ModeArg> for EstimationMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Direct => EstimationMode::Direct,
            ModeArg::Cascading => EstimationMode::Cascading,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum GranularityArg {
    /// Bin per small area (MSOA) and roll up to units
    SmallArea,
    /// Bin per parent unit (LAD) directly
    ParentUnit,
}

impl From<GranularityArg> for Granularity {
    fn from(granularity: GranularityArg) -> Self {
        match granularity {
            GranularityArg::SmallArea => Granularity::SmallArea,
            GranularityArg::ParentUnit => Granularity::ParentUnit,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the estimation pipeline over every extract in a directory
    Run {
        /// Directory containing ass_{UNIT}_MSOA11_2018.csv extracts
        #[arg(short, long, default_value = "data/msoa_2018")]
        input_dir: String,

        /// Directory to write result tables to
        #[arg(short, long, default_value = "results")]
        results_dir: String,

        /// JSON file with rates, mode and granularity
        #[arg(short, long)]
        config: Option<String>,

        /// Override the estimation mode from the config
        #[arg(short, long, value_enum)]
        mode: Option<ModeArg>,

        /// Override the binning granularity from the config
        #[arg(short, long, value_enum)]
        granularity: Option<GranularityArg>,

        /// Only process the first N units (sorted by id)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Maximum number of extracts read concurrently
        #[arg(long, default_value_t = 4)]
        concurrency: usize,
    },
    /// List the units found in an input directory
    ListUnits {
        #[arg(short, long, default_value = "data/msoa_2018")]
        input_dir: String,
    },
    /// Validate a band configuration and report coverage gaps
    CheckBands {
        /// JSON file with rates; the built-in table is used when omitted
        #[arg(short, long)]
        config: Option<String>,

        /// Print the effective configuration as JSON
        #[arg(short, long, default_value_t = false)]
        print: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/spatial_impact.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("spatial_impact.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            input_dir,
            results_dir,
            config,
            mode,
            granularity,
            limit,
            concurrency,
        } => {
            let config = PipelineConfig::load_or_default(config.as_deref())?
                .with_mode(mode.map(Into::into))
                .with_granularity(granularity.map(Into::into));

            run(&input_dir, &results_dir, &config, limit, concurrency).await?;
        }
        Commands::ListUnits { input_dir } => {
            let units = list_units(&input_dir)?;
            for unit in &units {
                info!(unit = %unit.unit_id, path = %unit.path.display(), "Unit");
            }
            info!(total = units.len(), "Unit list summary");
        }
        Commands::CheckBands { config, print } => {
            let config = PipelineConfig::load_or_default(config.as_deref())?;
            let bands = config.band_set().context("Invalid band configuration")?;

            for label in bands.labels() {
                info!(band = %label, "Band");
            }

            let gaps = bands.check_coverage(config.max_expected_age);
            if gaps.is_empty() {
                info!(
                    bands = bands.len(),
                    max_age = config.max_expected_age,
                    "Bands cover every expected age"
                );
            }

            if print {
                info!("{}", serde_json::to_string_pretty(&config)?);
            }
        }
    }

    Ok(())
}

/// Loads extracts, runs the pipeline and writes every result file.
#[tracing::instrument(skip(config), fields(mode = %config.mode, granularity = %config.granularity))]
async fn run(
    input_dir: &str,
    results_dir: &str,
    config: &PipelineConfig,
    limit: Option<usize>,
    concurrency: usize,
) -> Result<()> {
    // Fail on bad bands before touching any data
    config.band_set().context("Invalid band configuration")?;

    let mut units = list_units(input_dir)?;
    if let Some(limit) = limit {
        units.truncate(limit);
    }
    if units.is_empty() {
        warn!(input_dir, "No extracts found");
    }

    info!(units = units.len(), concurrency, "Processing data");
    let batch = load_all(units, concurrency).await?;

    if !batch.rejected.is_empty() {
        warn!(
            rejected = batch.rejected.len(),
            "Malformed records were excluded from every total"
        );
    }

    info!(records = batch.records.len(), "Estimating results");
    let output = run_pipeline(batch.records, config).context("Pipeline run failed")?;

    let summary = RunSummary::new(&output, config, &batch.rejected);
    for warning in &summary.warnings {
        warn!(warning = %warning, "Run warning");
    }

    info!("Writing data");
    write_results(Path::new(results_dir), &output, &summary)?;
    print_json(&summary)?;

    Ok(())
}
