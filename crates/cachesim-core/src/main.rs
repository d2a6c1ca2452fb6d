//! cachesim CLI: evaluate in-network caching strategies by simulation.

use cachesim_core::config::SimConfig;
use cachesim_core::engine::RunError;
use cachesim_core::results::{self, RunReport};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "cachesim",
    about = "Evaluate in-network caching strategies by simulation",
    version
)]
struct Cli {
    /// Log filter used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single experiment.
    Run {
        /// Path to TOML configuration file.
        #[arg(short, long)]
        config: PathBuf,
        /// Replay the recorded snapshot instead of generating events.
        #[arg(long)]
        replay: bool,
        /// Override the snapshot path from the config.
        #[arg(long)]
        snapshot: Option<PathBuf>,
        /// Override the strategy name from the config.
        #[arg(short, long)]
        strategy: Option<String>,
        /// Output results to JSON file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Compare strategies on the same request stream.
    ///
    /// The first strategy runs fresh and records the snapshot. The others
    /// replay it in parallel.
    Compare {
        /// Path to TOML configuration file.
        #[arg(short, long)]
        config: PathBuf,
        /// Comma-separated list of strategy names.
        #[arg(short = 'S', long, value_delimiter = ',')]
        strategies: Vec<String>,
        /// Output results to JSON file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run several independent experiments in parallel.
    Batch {
        /// Comma-separated list of TOML configuration files.
        #[arg(short, long, value_delimiter = ',')]
        configs: Vec<PathBuf>,
        /// Output results to JSON file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List available strategies, cache policies, collectors and workloads.
    List,
}

fn main() {
    let cli = Cli::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            config,
            replay,
            snapshot,
            strategy,
            output,
        } => {
            let mut sim_config = load_config(&config);
            if replay {
                sim_config.simulation.replay = true;
            }
            if let Some(snapshot) = snapshot {
                sim_config.simulation.snapshot_path = snapshot;
            }
            if let Some(strategy) = strategy {
                sim_config.strategy.name = strategy;
            }

            let report = cachesim_core::run_simulation(&sim_config).unwrap_or_else(|e| {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            });
            println!("{}", results::format_table(&report));

            if let Some(output_path) = output {
                write_output(&output_path, &report);
            }
        }
        Commands::Compare {
            config,
            strategies,
            output,
        } => {
            let base = load_config(&config);
            let names: Vec<String> = if strategies.is_empty() {
                cachesim_strategies::available_strategies()
                    .into_iter()
                    .map(String::from)
                    .collect()
            } else {
                strategies
            };

            let mut configs = cachesim_core::comparison_configs(&base, &names);
            let mut reports: Vec<RunReport> = Vec::with_capacity(configs.len());
            if let Some(first) = configs.first().filter(|c| !c.simulation.replay) {
                reports.push(run_or_exit(first));
                configs.remove(0);
            }
            let batch = cachesim_core::run_batch(&configs).unwrap_or_else(|e| {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            });
            let labels = configs.iter().map(|c| c.strategy.name.clone());
            let (replayed, failed) = collect_reports(labels, batch);
            reports.extend(replayed);

            println!("{}", results::format_comparison_table(&reports));
            for report in &reports {
                println!("{}", results::format_table(report));
            }

            if let Some(output_path) = output {
                write_output(&output_path, &reports);
            }
            if failed > 0 {
                std::process::exit(1);
            }
        }
        Commands::Batch { configs, output } => {
            let sim_configs: Vec<SimConfig> = configs.iter().map(|p| load_config(p)).collect();
            let batch = cachesim_core::run_batch(&sim_configs).unwrap_or_else(|e| {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            });

            let labels = configs.iter().map(|p| p.display().to_string());
            let (reports, failed) = collect_reports(labels, batch);
            println!("{}", results::format_comparison_table(&reports));

            if let Some(output_path) = output {
                write_output(&output_path, &reports);
            }
            if failed > 0 {
                std::process::exit(1);
            }
        }
        Commands::List => {
            print_list("strategies", cachesim_strategies::available_strategies());
            print_list("cache policies", cachesim_core::cache::available_cache_policies());
            print_list("collectors", cachesim_core::collectors::available_collectors());
            print_list("workloads", cachesim_core::workload::available_workloads());
            print_list("content placements", cachesim_core::placement::available_placements());
        }
    }
}

fn load_config(path: &Path) -> SimConfig {
    SimConfig::from_file(path).unwrap_or_else(|e| {
        eprintln!("Error loading config {}: {}", path.display(), e);
        std::process::exit(1);
    })
}

fn run_or_exit(config: &SimConfig) -> RunReport {
    cachesim_core::run_simulation(config).unwrap_or_else(|e| {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    })
}

/// Split batch results into reports and a failure count, reporting each
/// failure against its label.
fn collect_reports(
    labels: impl Iterator<Item = String>,
    batch: Vec<Result<RunReport, RunError>>,
) -> (Vec<RunReport>, usize) {
    let mut reports = Vec::with_capacity(batch.len());
    let mut failed = 0;
    for (label, result) in labels.zip(batch) {
        match result {
            Ok(report) => reports.push(report),
            Err(e) => {
                failed += 1;
                eprintln!("Error in {}: {}", label, e);
            }
        }
    }
    (reports, failed)
}

fn write_output<T: Serialize + ?Sized>(path: &Path, value: &T) {
    let json = serde_json::to_string_pretty(value).unwrap_or_else(|e| {
        eprintln!("Error serializing results: {}", e);
        std::process::exit(1);
    });
    std::fs::write(path, json).unwrap_or_else(|e| {
        eprintln!("Error writing output: {}", e);
        std::process::exit(1);
    });
    println!("Results written to {}", path.display());
}

fn print_list(title: &str, names: Vec<&str>) {
    println!("Available {}:", title);
    for name in names {
        println!("  - {}", name);
    }
}
