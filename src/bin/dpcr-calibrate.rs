use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::Value;

use dpcr_threshold::calibration::stats::mean;
use dpcr_threshold::extraction::SeriesExtractor;
use dpcr_threshold::plate::probe_from_path;
use dpcr_threshold::{
    classify_wells, init_logging, AppConfig, ControlRoles, ThresholdCalibrator, WellNameMap,
};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_level.into());
    match cli.execute() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("dpcr-calibrate error: {err:?}");
            ExitCode::from(1)
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "dpcr-calibrate",
    about = "Calibrate dPCR partition thresholds from control wells"
)]
struct Cli {
    /// Log verbosity written to stderr.
    #[arg(long, value_enum, global = true, default_value_t = LogLevel::Warn)]
    log_level: LogLevel,
    /// JSON configuration file (the bundled config is used when omitted).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn execute(self) -> Result<()> {
        let config = match &self.config {
            Some(path) => AppConfig::load_from_file(path),
            None => AppConfig::load(),
        };
        match self.command {
            Command::Calibrate(args) => calibrate_command(args, &config),
            Command::Extract(args) => extract_command(args, &config),
            Command::Classify(args) => classify_command(args, &config),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute the threshold from positive, mixed-positive and negative control wells.
    Calibrate(CalibrateArgs),
    /// Print the RFU series of selected wells.
    Extract(ExtractArgs),
    /// Count positive and negative partitions per well at a threshold.
    Classify(ClassifyArgs),
}

#[derive(Args, Debug, Clone)]
struct CalibrateArgs {
    /// Partition-level CSV export.
    #[arg(long)]
    file: PathBuf,
    /// Well names as a JSON object (identifier -> name) or an 8x3 JSON matrix.
    #[arg(long)]
    names: PathBuf,
    /// Display name of the positive control well.
    #[arg(long)]
    positive: String,
    /// Display name of the mixed-positive control well.
    #[arg(long)]
    mix_positive: String,
    /// Display name of the negative control well.
    #[arg(long)]
    negative: String,
    /// Write the full calibration report as JSON.
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
struct ExtractArgs {
    /// Partition-level CSV export.
    #[arg(long)]
    file: PathBuf,
    /// Well identifier to extract (repeatable).
    #[arg(long = "well", required = true)]
    wells: Vec<String>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,
}

#[derive(Args, Debug, Clone)]
struct ClassifyArgs {
    /// Partition-level CSV export.
    #[arg(long)]
    file: PathBuf,
    /// Threshold; partitions strictly above it are positive.
    #[arg(long)]
    threshold: f64,
    /// Optional well names file, same format as for `calibrate`.
    #[arg(long)]
    names: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

fn calibrate_command(args: CalibrateArgs, config: &AppConfig) -> Result<()> {
    let names = load_well_names(&args.names)?;
    let roles = ControlRoles::new(&args.positive, &args.mix_positive, &args.negative);
    tracing::info!("Probe: {}", probe_from_path(&args.file));

    let report = ThresholdCalibrator::new(config)
        .calibrate_report(&args.file, &names, &roles)
        .with_context(|| format!("calibrating {}", args.file.display()))?;

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
    }

    println!("{}", report.threshold);
    Ok(())
}

fn extract_command(args: ExtractArgs, config: &AppConfig) -> Result<()> {
    let extracted = SeriesExtractor::new(config.extraction.clone())
        .extract(&args.file, args.wells.iter().cloned())
        .with_context(|| format!("extracting {}", args.file.display()))?;

    match args.format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "series": extracted.series,
                "stats": extracted.stats,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Table => {
            println!("{:<8} {:>10} {:>14}", "well", "readings", "mean");
            for well in &args.wells {
                let values = extracted
                    .series
                    .get(well)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                let average = if values.is_empty() {
                    "-".to_string()
                } else {
                    format!("{:.3}", mean(values))
                };
                println!("{:<8} {:>10} {:>14}", well, values.len(), average);
            }
        }
    }
    Ok(())
}

fn classify_command(args: ClassifyArgs, config: &AppConfig) -> Result<()> {
    if !args.threshold.is_finite() {
        bail!("threshold must be a finite number");
    }
    let names = match &args.names {
        Some(path) => load_well_names(path)?,
        None => WellNameMap::new(),
    };

    let wells = classify_wells(&args.file, args.threshold, &names, &config.extraction)
        .with_context(|| format!("classifying {}", args.file.display()))?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&wells)?),
        OutputFormat::Table => {
            println!(
                "{:<8} {:<20} {:>10} {:>10}",
                "well", "name", "positive", "negative"
            );
            for well in &wells {
                println!(
                    "{:<8} {:<20} {:>10} {:>10}",
                    well.well, well.name, well.positives, well.negatives
                );
            }
        }
    }
    Ok(())
}

/// Load well names from a JSON object or a JSON matrix of names
fn load_well_names(path: &Path) -> Result<WellNameMap> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read well names from {}", path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;

    match value {
        Value::Object(_) => serde_json::from_value(value)
            .with_context(|| format!("{}: well names must be strings", path.display())),
        Value::Array(_) => {
            let matrix: Vec<Vec<String>> = serde_json::from_value(value).with_context(|| {
                format!("{}: expected a matrix of well name strings", path.display())
            })?;
            Ok(WellNameMap::from_matrix(&matrix))
        }
        _ => bail!(
            "{}: expected a JSON object or a JSON matrix of well names",
            path.display()
        ),
    }
}
