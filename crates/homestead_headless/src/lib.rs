//! Headless scenario runner for soak runs and CI verification.
//!
//! This crate drives the simulation without any rendering layer. Scenarios
//! are described in RON files and resolved against the built-in game data,
//! which enables:
//!
//! - **Soak runs**: Run a scenario for thousands of ticks and report the
//!   final stocks, agent states, and state hash
//! - **CI verification**: Re-run a scenario several times and fail loudly
//!   when the final hashes diverge
//! - **Save inspection**: Decode a save file and summarize it without
//!   running a single tick
//!
//! All logs go to stderr; reports go to stdout.
//!
//! # Example
//!
//! ```bash
//! # Run the built-in scenario for a minute of simulated time
//! cargo run -p homestead_headless -- run --ticks 1200
//!
//! # Run a custom scenario and keep the final state
//! cargo run -p homestead_headless -- run --scenario demo.ron --save final.bin
//!
//! # Compare five runs of the same scenario
//! cargo run -p homestead_headless -- verify --ticks 600 --runs 5
//!
//! # Summarize a save file
//! cargo run -p homestead_headless -- inspect --save final.bin
//! ```

pub mod runner;
pub mod scenario;

pub use runner::{
    inspect_save, run_scenario, verify_scenario, RunConfig, RunReport, SaveSummary, DEFAULT_DT,
};
pub use scenario::{Scenario, ScenarioError};
