//! Headless settlement scenario runner.
//!
//! This binary runs the logistics simulation without graphics. Scenarios
//! are RON files resolved against the built-in game data; reports go to
//! stdout and logs to stderr.
//!
//! # Usage
//!
//! ```bash
//! # Run the built-in scenario for a minute of simulated time
//! cargo run -p homestead_headless -- run --ticks 1200
//!
//! # Run a custom scenario and write the final state to a save file
//! cargo run -p homestead_headless -- run --scenario demo.ron --save final.bin
//!
//! # Verify determinism with five runs
//! cargo run -p homestead_headless -- verify --ticks 600 --runs 5
//!
//! # Summarize a save file without running it
//! cargo run -p homestead_headless -- inspect --save final.bin
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use homestead_headless::{inspect_save, run_scenario, verify_scenario, RunConfig, Scenario};

#[derive(Parser)]
#[command(name = "homestead_headless")]
#[command(about = "Headless settlement scenario runner for soak runs and CI")]
#[command(version)]
struct Cli {
    /// Turn on debug-level logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario for a fixed number of ticks and report the outcome
    Run {
        /// Scenario file to load (built-in scenario when omitted)
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Number of update ticks to run
        #[arg(short, long, default_value = "1200")]
        ticks: u64,

        /// Seconds of simulated time per tick
        #[arg(long, default_value = "0.05")]
        dt: f64,

        /// Write the final state to this save file
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Verify determinism by running the same scenario multiple times
    Verify {
        /// Scenario file to load (built-in scenario when omitted)
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Number of update ticks per run
        #[arg(short, long, default_value = "600")]
        ticks: u64,

        /// Seconds of simulated time per tick
        #[arg(long, default_value = "0.05")]
        dt: f64,

        /// How many independent runs to compare
        #[arg(short, long, default_value = "5")]
        runs: usize,
    },

    /// Summarize a save file without running the simulation
    Inspect {
        /// Save file to decode
        #[arg(short, long)]
        save: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging to stderr (stdout is for reports)
    let default_filter = if cli.verbose { "debug" } else { "info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    match cli.command {
        Commands::Run {
            scenario,
            ticks,
            dt,
            save,
        } => {
            cmd_run(scenario, ticks, dt, save);
        }
        Commands::Verify {
            scenario,
            ticks,
            dt,
            runs,
        } => {
            cmd_verify(scenario, ticks, dt, runs);
        }
        Commands::Inspect { save } => {
            cmd_inspect(save);
        }
    }
}

/// Load a scenario file, falling back to the built-in scenario.
fn load_scenario(path: Option<PathBuf>) -> Scenario {
    match path {
        Some(path) => match Scenario::load(&path) {
            Ok(scenario) => scenario,
            Err(e) => {
                eprintln!("Failed to load scenario {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => Scenario::default(),
    }
}

/// Run a scenario and print the final report
fn cmd_run(scenario: Option<PathBuf>, ticks: u64, dt: f64, save: Option<PathBuf>) {
    let scenario = load_scenario(scenario);
    let config = RunConfig {
        ticks,
        dt,
        save_path: save,
    };

    match run_scenario(&scenario, &config) {
        Ok(report) => {
            println!("{}", report.render());
            if let Some(path) = &config.save_path {
                eprintln!("Final state saved to: {}", path.display());
            }
        }
        Err(e) => {
            eprintln!("Failed to run scenario: {}", e);
            std::process::exit(1);
        }
    }
}

/// Verify determinism
fn cmd_verify(scenario: Option<PathBuf>, ticks: u64, dt: f64, runs: usize) {
    let scenario = load_scenario(scenario);

    match verify_scenario(&scenario, ticks, dt, runs) {
        Ok(result) if result.is_deterministic => {
            eprintln!("PASS: All {} runs produced identical results", runs);
        }
        Ok(result) => {
            eprintln!("FAIL: Non-determinism detected!");
            for (i, hash) in result.hashes.iter().enumerate() {
                eprintln!("  Run {}: {:016x}", i, hash);
            }
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Failed to verify scenario: {}", e);
            std::process::exit(1);
        }
    }
}

/// Summarize a save file
fn cmd_inspect(save: PathBuf) {
    match inspect_save(&save) {
        Ok(summary) => {
            println!("{}", summary.render());
        }
        Err(e) => {
            eprintln!("Failed to inspect save: {}", e);
            std::process::exit(1);
        }
    }
}
