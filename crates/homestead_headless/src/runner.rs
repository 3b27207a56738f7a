//! Scenario execution, verification, and save inspection.
//!
//! The runner owns no state of its own; every entry point builds a
//! simulation from a [`Scenario`] (or a save file) and reduces the
//! outcome to a plain report struct that the binary prints.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use homestead_core::complex::ComplexBank;
use homestead_core::data::{DataRegistry, GameData};
use homestead_core::events::SimEvent;
use homestead_core::items::ItemStore;
use homestead_core::save;
use homestead_core::simulation::Simulation;
use homestead_core::vehicles::Carriage;
use homestead_test_utils::determinism::{verify_determinism, DeterminismResult};

use crate::scenario::{Scenario, ScenarioError};

/// Default seconds of simulated time per update tick.
pub const DEFAULT_DT: f64 = 0.05;

/// Configuration for a single headless run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Number of update ticks to run.
    pub ticks: u64,
    /// Seconds of simulated time per tick.
    pub dt: f64,
    /// Write the final state to this save file when set.
    pub save_path: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            ticks: 1_200,
            dt: DEFAULT_DT,
            save_path: None,
        }
    }
}

/// End-of-run snapshot of one complex.
#[derive(Debug, Clone)]
pub struct ComplexReport {
    /// Slot index of the complex.
    pub id: u32,
    /// Number of member buildings.
    pub members: usize,
    /// Stored items as (label, count) pairs.
    pub stocks: Vec<(String, u32)>,
}

/// End-of-run snapshot of one carriage.
#[derive(Debug, Clone)]
pub struct CarriageReport {
    /// Agent id of the carriage.
    pub id: u32,
    /// Agent state label.
    pub state: String,
    /// Carried items as (label, count) pairs.
    pub cargo: Vec<(String, u32)>,
}

/// Outcome of a headless run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Ticks executed.
    pub ticks: u64,
    /// Final simulation tick counter.
    pub final_tick: u64,
    /// Final state hash.
    pub state_hash: u64,
    /// Conversion cycles completed over the run.
    pub conversions: u64,
    /// Cargo exchanges completed over the run.
    pub exchanges: u64,
    /// Route losses over the run.
    pub path_losses: u64,
    /// Per-complex stocks at the end of the run.
    pub complexes: Vec<ComplexReport>,
    /// Per-carriage state at the end of the run.
    pub carriages: Vec<CarriageReport>,
}

impl RunReport {
    /// Render the report as a printable summary.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", "=".repeat(50));
        let _ = writeln!(out, "RUN COMPLETE");
        let _ = writeln!(out, "{}", "=".repeat(50));
        let _ = writeln!(out, "Ticks: {}", self.ticks);
        let _ = writeln!(out, "State hash: {:016x}", self.state_hash);
        let _ = writeln!(
            out,
            "Conversions: {}  Exchanges: {}  Route losses: {}",
            self.conversions, self.exchanges, self.path_losses
        );
        render_complexes(&mut out, &self.complexes);
        render_carriages(&mut out, &self.carriages);
        out
    }
}

/// Summary of a decoded save file.
#[derive(Debug, Clone)]
pub struct SaveSummary {
    /// Tick counter stored in the save.
    pub tick: u64,
    /// RNG state stored in the save.
    pub rng_state: u64,
    /// Per-complex stocks.
    pub complexes: Vec<ComplexReport>,
    /// Per-carriage state.
    pub carriages: Vec<CarriageReport>,
}

impl SaveSummary {
    /// Render the summary as a printable report.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", "=".repeat(50));
        let _ = writeln!(out, "SAVE SUMMARY");
        let _ = writeln!(out, "{}", "=".repeat(50));
        let _ = writeln!(out, "Tick: {}", self.tick);
        let _ = writeln!(out, "Rng state: {:016x}", self.rng_state);
        render_complexes(&mut out, &self.complexes);
        render_carriages(&mut out, &self.carriages);
        out
    }
}

fn render_complexes(out: &mut String, complexes: &[ComplexReport]) {
    let _ = writeln!(out, "\nComplexes: {}", complexes.len());
    for complex in complexes {
        let _ = writeln!(
            out,
            "  [{}] members={} stock: {}",
            complex.id,
            complex.members,
            render_items(&complex.stocks)
        );
    }
}

fn render_carriages(out: &mut String, carriages: &[CarriageReport]) {
    let _ = writeln!(out, "\nCarriages: {}", carriages.len());
    for carriage in carriages {
        let _ = writeln!(
            out,
            "  [{}] {} cargo: {}",
            carriage.id,
            carriage.state,
            render_items(&carriage.cargo)
        );
    }
}

fn render_items(items: &[(String, u32)]) -> String {
    if items.is_empty() {
        return "empty".to_string();
    }
    items
        .iter()
        .map(|(label, count)| format!("{label}={count}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn labelled_items(store: &ItemStore, registry: &DataRegistry) -> Vec<(String, u32)> {
    store
        .iter()
        .map(|(item, count)| {
            let label = registry
                .item_def(item)
                .map_or_else(|| format!("item{}", item.as_u16()), |def| def.id.clone());
            (label, count)
        })
        .collect()
}

fn complex_reports(bank: &ComplexBank, registry: &DataRegistry) -> Vec<ComplexReport> {
    bank.iter()
        .map(|(id, complex)| ComplexReport {
            id: id.0,
            members: complex.member_count(),
            stocks: labelled_items(complex.storage(), registry),
        })
        .collect()
}

fn carriage_reports(carriages: &[Carriage], registry: &DataRegistry) -> Vec<CarriageReport> {
    carriages
        .iter()
        .map(|carriage| CarriageReport {
            id: carriage.agent.id.0,
            state: format!("{:?}", carriage.agent.state),
            cargo: labelled_items(&carriage.agent.items, registry),
        })
        .collect()
}

/// Build a simulation from `scenario` and run it for the configured
/// number of ticks, collecting event counts along the way.
pub fn run_scenario(scenario: &Scenario, config: &RunConfig) -> Result<RunReport, ScenarioError> {
    let registry = DataRegistry::new(GameData::builtin())?;
    let mut sim = scenario.build()?;

    tracing::info!(
        name = %scenario.name,
        ticks = config.ticks,
        dt = config.dt,
        "starting run"
    );

    let mut conversions = 0u64;
    let mut exchanges = 0u64;
    let mut path_losses = 0u64;

    for _ in 0..config.ticks {
        // update borrows the events it returns, so the tick label for
        // this batch has to be captured first
        let tick = sim.tick() + 1;
        let events = sim.update(config.dt);
        for event in events.events() {
            match event {
                SimEvent::ConversionCompleted { .. } => conversions += 1,
                SimEvent::ExchangeCompleted { .. } => exchanges += 1,
                SimEvent::PathNotFound { agent } => {
                    path_losses += 1;
                    tracing::warn!(agent = agent.0, tick, "agent lost its route");
                }
                SimEvent::ComplexCreated { .. } | SimEvent::ComplexDeleted { .. } => {}
            }
            tracing::debug!(?event, tick, "event");
        }
    }

    if let Some(path) = &config.save_path {
        let bytes = sim.save();
        save::save_to_file(path, &bytes)?;
        tracing::info!(path = %path.display(), bytes = bytes.len(), "final state saved");
    }

    Ok(RunReport {
        ticks: config.ticks,
        final_tick: sim.tick(),
        state_hash: sim.state_hash(),
        conversions,
        exchanges,
        path_losses,
        complexes: complex_reports(sim.bank(), &registry),
        carriages: carriage_reports(sim.carriages(), &registry),
    })
}

/// Run `scenario` several times from the same starting state and compare
/// final state hashes.
///
/// Resolution errors surface once, before any run starts.
pub fn verify_scenario(
    scenario: &Scenario,
    ticks: u64,
    dt: f64,
    runs: usize,
) -> Result<DeterminismResult, ScenarioError> {
    let initial = scenario.build()?;

    tracing::info!(name = %scenario.name, ticks, runs, "verifying determinism");

    Ok(verify_determinism(
        runs,
        ticks,
        || initial.clone(),
        |sim| {
            sim.update(dt);
        },
        Simulation::state_hash,
    ))
}

/// Decode a save file and summarize it without running the simulation.
pub fn inspect_save<P: AsRef<Path>>(path: P) -> Result<SaveSummary, ScenarioError> {
    let data = save::load_from_file(path)?;
    let registry = DataRegistry::new(GameData::builtin())?;

    Ok(SaveSummary {
        tick: data.tick,
        rng_state: data.rng_state,
        complexes: complex_reports(&data.bank, &registry),
        carriages: carriage_reports(&data.carriages, &registry),
    })
}
