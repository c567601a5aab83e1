//! meterscan-sim - synthetic meter sheet generator
//!
//! Usage:
//!   meterscan-sim generate --buildings 200 --output sheet.csv --truth truth.json
//!   meterscan-sim generate --scenarios sudden_cut,bypass_low --tamper-rate 0.2 --seed 7
//!   meterscan-sim list

use clap::{Parser, Subcommand};
use meterscan_sim::{GeneratorConfig, SheetGenerator, list_scenarios};
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "meterscan-sim")]
#[command(about = "Synthetic gas meter sheets with injected tamper scenarios")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a CSV sheet
    Generate {
        #[arg(short, long, default_value = "50")]
        buildings: usize,

        #[arg(long, default_value = "2")]
        min_facilities: usize,

        #[arg(long, default_value = "8")]
        max_facilities: usize,

        /// Monthly columns, starting in January
        #[arg(short, long, default_value = "36")]
        months: usize,

        #[arg(long, default_value = "2016")]
        start_year: i32,

        /// Share of facilities to tamper with
        #[arg(short, long, default_value = "0.1")]
        tamper_rate: f64,

        /// Scenarios to draw from (comma-separated, default all)
        #[arg(short, long, value_delimiter = ',')]
        scenarios: Vec<String>,

        #[arg(long, default_value = "42")]
        seed: u64,

        /// CSV destination (default stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Ground truth JSON destination
        #[arg(long)]
        truth: Option<PathBuf>,
    },

    /// List available scenarios
    List,
}

fn main() {
    tracing_subscriber::fmt().with_writer(io::stderr).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Generate {
            buildings,
            min_facilities,
            max_facilities,
            months,
            start_year,
            tamper_rate,
            scenarios,
            seed,
            output,
            truth,
        } => {
            let mut config = GeneratorConfig {
                buildings,
                min_facilities,
                max_facilities,
                months,
                start_year,
                tamper_rate,
                seed,
                ..Default::default()
            };
            if !scenarios.is_empty() {
                config.scenarios = scenarios;
            }
            run_generate(config, output, truth)
        }
        Commands::List => {
            run_list();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run_generate(
    config: GeneratorConfig,
    output: Option<PathBuf>,
    truth: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut generator = SheetGenerator::new(config)?;
    let sheet = generator.generate();

    match &output {
        Some(path) => sheet.write_csv(BufWriter::new(File::create(path)?))?,
        None => sheet.write_csv(io::stdout().lock())?,
    }

    if let Some(path) = &truth {
        serde_json::to_writer_pretty(BufWriter::new(File::create(path)?), &sheet.truth)?;
    }

    eprintln!(
        "Generated {} facilities in {} buildings, {} tampered (seed {})",
        sheet.facilities.len(),
        generator.config().buildings,
        sheet.truth.len(),
        generator.config().seed
    );
    Ok(())
}

fn run_list() {
    println!("Available tamper scenarios:");
    for (name, description) in list_scenarios() {
        println!("  {:20} - {}", name, description);
    }
}
