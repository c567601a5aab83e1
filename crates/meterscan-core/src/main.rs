//! meterscan - batch tamper scoring for monthly gas readings
//!
//! Usage:
//!   meterscan analyze readings.csv
//!   meterscan analyze readings.csv --low 50 --drop 60 --tier high --format csv
//!   meterscan analyze readings.csv --config engine.json --workers 8 --output report.json
//!   meterscan analyze readings.xlsx --format csv --output report.csv
//!   meterscan show readings.xlsx 1000123
//!   meterscan columns readings.csv

use clap::{Args, Parser, Subcommand, ValueEnum};
use meterscan_core::{
    AnalysisReport, AnomalyEngine, EngineConfig, FacilityDetail, RiskTier, analyze_table, export,
    metrics,
    preprocess::{preprocess, recognize_reading_columns},
    table::load_table_file,
};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::Level;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "meterscan")]
#[command(about = "Score gas meters for tampering from monthly consumption sheets")]
struct Cli {
    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyse a CSV or workbook sheet and print the report
    Analyze {
        file: PathBuf,

        /// JSON engine configuration
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        overrides: ThresholdOverrides,

        /// Only report findings of these tiers (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        tier: Vec<String>,

        /// Worker threads
        #[arg(short, long, default_value = "1")]
        workers: usize,

        /// Output format
        #[arg(short, long, default_value = "pretty")]
        format: OutputFormat,

        /// Write to a file instead of stdout. With `--format csv` the summary
        /// and building tables go to `<name>_summary.csv` and
        /// `<name>_buildings.csv` beside it.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Dump Prometheus metrics to stderr afterwards
        #[arg(long = "metrics")]
        dump_metrics: bool,
    },

    /// Score one meter and print its monthly series
    Show {
        file: PathBuf,

        meter_id: String,

        #[arg(short, long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        overrides: ThresholdOverrides,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// List the columns recognised as monthly readings
    Columns {
        file: PathBuf,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
    Csv,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();

    let result = match cli.command {
        Commands::Analyze {
            file,
            config,
            overrides,
            tier,
            workers,
            format,
            output,
            dump_metrics,
        } => run_analyze(
            &file,
            config.as_deref(),
            overrides,
            &tier,
            workers,
            format,
            output.as_deref(),
            dump_metrics,
        ),
        Commands::Show {
            file,
            meter_id,
            config,
            overrides,
            json,
        } => run_show(&file, &meter_id, config.as_deref(), overrides, json),
        Commands::Columns { file, config } => run_columns(&file, config.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

#[derive(Args)]
struct ThresholdOverrides {
    /// Low-consumption threshold (10-200)
    #[arg(long)]
    low: Option<f64>,

    /// Peer ratio threshold in percent (30-90)
    #[arg(long)]
    neighbor: Option<f64>,

    /// Sudden-drop threshold in percent (40-90)
    #[arg(long)]
    drop: Option<f64>,
}

fn load_config(path: Option<&Path>) -> CliResult<EngineConfig> {
    Ok(match path {
        Some(p) => EngineConfig::from_json_file(p)?,
        None => EngineConfig::default(),
    })
}

/// File config with command-line threshold overrides applied, validated.
fn effective_config(path: Option<&Path>, overrides: &ThresholdOverrides) -> CliResult<EngineConfig> {
    let mut config = load_config(path)?;
    if let Some(v) = overrides.low {
        config.thresholds.low_consumption_threshold = v;
    }
    if let Some(v) = overrides.neighbor {
        config.thresholds.neighbor_ratio_threshold = v;
    }
    if let Some(v) = overrides.drop {
        config.thresholds.sudden_drop_threshold = v;
    }
    config.validate()?;
    Ok(config)
}

#[allow(clippy::too_many_arguments)]
fn run_analyze(
    file: &Path,
    config_path: Option<&Path>,
    overrides: ThresholdOverrides,
    tiers: &[String],
    workers: usize,
    format: OutputFormat,
    output: Option<&Path>,
    dump_metrics: bool,
) -> CliResult<()> {
    let config = effective_config(config_path, &overrides)?;

    let tiers = tiers
        .iter()
        .map(|t| RiskTier::parse(t).ok_or_else(|| format!("unknown tier: {t}")))
        .collect::<Result<Vec<_>, _>>()?;

    let raw = load_table_file(file)?;
    let mut report = analyze_table(&raw, &config, workers)?;
    if !tiers.is_empty() {
        report.retain_tiers(&tiers);
    }

    match (format, output) {
        (OutputFormat::Csv, Some(path)) => {
            for written in export::write_csv_files(path, &report)? {
                eprintln!("wrote {}", written.display());
            }
        }
        (format, output) => {
            let mut out: Box<dyn Write> = match output {
                Some(path) => Box::new(BufWriter::new(File::create(path)?)),
                None => Box::new(BufWriter::new(io::stdout().lock())),
            };
            match format {
                OutputFormat::Json => {
                    serde_json::to_writer_pretty(&mut out, &report)?;
                    writeln!(out)?;
                }
                OutputFormat::Pretty => write_pretty(&mut out, &report)?,
                OutputFormat::Csv => export::write_csv_sections(&mut out, &report)?,
            }
            out.flush()?;
        }
    }

    if dump_metrics {
        eprint!("{}", metrics::render());
    }
    Ok(())
}

fn write_pretty(out: &mut dyn Write, report: &AnalysisReport) -> io::Result<()> {
    let ds = &report.dataset;
    writeln!(out, "Run {} at {}", report.run_id, report.generated_at.format("%Y-%m-%d %H:%M:%S"))?;
    writeln!(
        out,
        "Facilities: {}  Buildings: {}  Reading columns: {}",
        ds.facilities, ds.buildings, ds.reading_columns
    )?;
    if let (Some(first), Some(last)) = (ds.first_period, ds.last_period) {
        writeln!(out, "Period: {} .. {}", first.format("%Y-%m"), last.format("%Y-%m"))?;
    }
    writeln!(
        out,
        "Thresholds: low {:.0}  neighbor {:.0}%  drop {:.0}%",
        report.thresholds.low_consumption_threshold,
        report.thresholds.neighbor_ratio_threshold,
        report.thresholds.sudden_drop_threshold
    )?;
    writeln!(
        out,
        "Flagged: {} ({:.1}%)  High: {}  Medium: {}  Low: {}",
        report.flagged_count(),
        report.flagged_pct(),
        report.tier_counts.high,
        report.tier_counts.medium,
        report.tier_counts.low
    )?;

    let mut findings: Vec<_> = report.findings.iter().collect();
    findings.sort_by(|a, b| b.risk_score.cmp(&a.risk_score));

    writeln!(out)?;
    writeln!(out, "{:<12} {:<10} {:>6} {:<7} Reasons", "Meter", "Building", "Score", "Tier")?;
    for f in findings {
        writeln!(
            out,
            "{:<12} {:<10} {:>6} {:<7} {}",
            f.meter_id,
            f.building_id,
            f.risk_score,
            f.risk_tier.label(),
            f.reason()
        )?;
    }

    if !report.building_risk.is_empty() {
        writeln!(out)?;
        writeln!(out, "{:<10} {:>8} {:>10}", "Building", "Flagged", "Mean risk")?;
        for b in &report.building_risk {
            writeln!(out, "{:<10} {:>8} {:>10.1}", b.building_id, b.flagged, b.mean_risk)?;
        }
    }
    Ok(())
}

fn run_show(
    file: &Path,
    meter_id: &str,
    config_path: Option<&Path>,
    overrides: ThresholdOverrides,
    json: bool,
) -> CliResult<()> {
    let config = effective_config(config_path, &overrides)?;
    let raw = load_table_file(file)?;
    let dataset = preprocess(&raw, &config.preprocess)?;
    let details = AnomalyEngine::new(config.thresholds).detail(&dataset, meter_id);
    if details.is_empty() {
        return Err(format!("meter {meter_id} not found in {}", file.display()).into());
    }

    let mut out = BufWriter::new(io::stdout().lock());
    if json {
        serde_json::to_writer_pretty(&mut out, &details)?;
        writeln!(out)?;
    } else {
        for detail in &details {
            write_detail(&mut out, detail)?;
        }
    }
    out.flush()?;
    Ok(())
}

fn write_detail(out: &mut dyn Write, detail: &FacilityDetail) -> io::Result<()> {
    writeln!(out, "Meter {}  Building {}", detail.meter_id, detail.building_id)?;
    writeln!(
        out,
        "Score: {}  Tier: {}",
        detail.risk_score(),
        detail.risk_tier().label()
    )?;
    match &detail.finding {
        Some(finding) => {
            writeln!(out, "Average consumption: {:.1}", finding.summary_stats.mean)?;
            writeln!(out, "Anomalies:")?;
            for rule in &finding.triggered_rules {
                writeln!(out, "  [{:>3}] {}", rule.contribution, rule.description)?;
            }
        }
        None => writeln!(out, "No rule fired.")?,
    }

    writeln!(out)?;
    writeln!(out, "{:<12} {:>10}", "Month", "Reading")?;
    for (label, value) in &detail.series {
        writeln!(out, "{:<12} {:>10.1}", label, value)?;
    }
    writeln!(out)?;
    Ok(())
}

fn run_columns(file: &Path, config_path: Option<&Path>) -> CliResult<()> {
    let config = load_config(config_path)?;
    config.validate()?;
    let raw = load_table_file(file)?;
    let columns = recognize_reading_columns(&raw.headers, &config.preprocess);

    println!("{} reading columns", columns.len());
    for (idx, column) in columns {
        let period = column
            .period()
            .map(|p| p.format("%Y-%m").to_string())
            .unwrap_or_else(|| column.year.to_string());
        println!("{:>4}  {:<16} {}", idx, column.label, period);
    }
    Ok(())
}
