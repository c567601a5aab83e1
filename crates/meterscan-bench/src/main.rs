//! meterscan-bench - Benchmark Suite for meterscan
//!
//! Usage:
//!   meterscan-bench run quick               # Run one preset
//!   meterscan-bench run district --workers 16 --seed 9
//!   meterscan-bench run-all --output results.json
//!   meterscan-bench list

use clap::{Parser, Subcommand};
use meterscan_bench::{BenchmarkConfig, BenchmarkResults, BenchmarkRunner, scenarios};
use tracing::Level;

#[derive(Parser)]
#[command(name = "meterscan-bench")]
#[command(about = "Accuracy and throughput benchmark for meterscan")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output file for results
    #[arg(short, long, global = true)]
    output: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single preset
    Run {
        /// Preset name (see `list`)
        #[arg(default_value = "quick")]
        preset: String,

        /// Worker threads override
        #[arg(short, long)]
        workers: Option<usize>,

        /// Generator seed override
        #[arg(short, long)]
        seed: Option<u64>,

        /// Building count override
        #[arg(short, long)]
        buildings: Option<usize>,
    },

    /// Run every preset
    RunAll,

    /// List presets
    List,
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let outcome = match cli.command {
        Commands::Run {
            preset,
            workers,
            seed,
            buildings,
        } => match scenarios::by_name(&preset) {
            Some(mut config) => {
                if let Some(w) = workers {
                    config.workers = w;
                }
                if let Some(s) = seed {
                    config.generator.seed = s;
                }
                if let Some(b) = buildings {
                    config.generator.buildings = b;
                }
                run_configs(vec![config])
            }
            None => Err(format!("unknown preset: {preset}").into()),
        },
        Commands::RunAll => run_configs(
            scenarios::list()
                .into_iter()
                .filter_map(|(name, _)| scenarios::by_name(name))
                .collect(),
        ),
        Commands::List => {
            for (name, description) in scenarios::list() {
                println!("  {:10} - {}", name, description);
            }
            Ok(Vec::new())
        }
    };

    match outcome {
        Ok(results) if !results.is_empty() => {
            if let Err(e) = export(&results, cli.output.as_deref()) {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
        Ok(_) => {}
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}

fn run_configs(
    configs: Vec<BenchmarkConfig>,
) -> Result<Vec<BenchmarkResults>, Box<dyn std::error::Error>> {
    let mut all_results = Vec::new();
    for config in configs {
        let runner = BenchmarkRunner::new(config);
        let results = runner.run()?;
        runner.print_results(&results);
        println!();
        all_results.push(results);
    }
    Ok(all_results)
}

fn export(
    results: &[BenchmarkResults],
    output: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string_pretty(results)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            println!("Results saved to: {}", path);
        }
        None => println!("{}", json),
    }
    Ok(())
}
