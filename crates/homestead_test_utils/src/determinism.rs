//! Determinism harness shared by integration tests and the headless
//! verifier.
//!
//! Settlement runs must replay bit-for-bit: desync detection compares
//! state hashes, and bug reports are replayed from a seed. The engine
//! holds up its end by iterating pools in index order, keying maps with
//! ordered containers, and drawing all randomness from one seeded
//! stream. The helpers here catch regressions on those guarantees:
//!
//! - [`verify_determinism`] replays a closed-over workload N times and
//!   compares final hashes.
//! - [`find_first_divergence`] narrows a failure down to the tick where
//!   two runs separate.
//! - [`run_parallel_simulations`] repeats the comparison across threads,
//!   where allocator and scheduling differences would surface any hidden
//!   dependence on ambient state.
//! - [`verify_save_determinism`] checks that a snapshot taken mid-run
//!   restores to the exact same hash.
//!
//! Runs are only comparable for identical `dt` sequences, so every
//! helper replays one fixed step.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use std::thread;

use homestead_core::simulation::Simulation;
use homestead_core::terrain::TileMap;

/// Outcome of repeated identical runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether every run hashed to the same value.
    pub is_deterministic: bool,
    /// Final hash of each run, in run order.
    pub hashes: Vec<u64>,
    /// Ticks simulated per run.
    pub ticks: u64,
}

impl DeterminismResult {
    /// The distinct hash values seen, sorted. A deterministic workload
    /// yields exactly one.
    #[must_use]
    pub fn distinct_hashes(&self) -> Vec<u64> {
        let distinct: BTreeSet<u64> = self.hashes.iter().copied().collect();
        distinct.into_iter().collect()
    }

    /// Panic with the run details unless every hash matched.
    ///
    /// # Panics
    ///
    /// Panics when the runs diverged.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            panic!(
                "hashes diverged over {} runs of {} ticks; {} distinct values, all: {:?}",
                self.hashes.len(),
                self.ticks,
                self.distinct_hashes().len(),
                self.hashes
            );
        }
    }
}

/// Outcome of simulations raced on separate threads.
#[derive(Debug, Clone)]
pub struct ParallelSimResult {
    /// Final hash of each simulation, in spawn order.
    pub hashes: Vec<u64>,
    /// Ticks each simulation ran.
    pub ticks: u64,
    /// How many simulations ran.
    pub num_sims: usize,
}

impl ParallelSimResult {
    /// Whether every thread hashed to the same value.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        all_equal(&self.hashes)
    }

    /// Panic with the thread hashes unless they all matched.
    ///
    /// # Panics
    ///
    /// Panics when any thread diverged.
    pub fn assert_deterministic(&self) {
        assert!(
            self.is_deterministic(),
            "{} parallel simulations of {} ticks diverged: {:?}",
            self.num_sims,
            self.ticks,
            self.hashes
        );
    }
}

fn all_equal(hashes: &[u64]) -> bool {
    hashes.windows(2).all(|pair| pair[0] == pair[1])
}

/// Run a workload `runs` times for `ticks` steps each and compare the
/// final hashes.
///
/// The workload is three closures: `setup` builds the initial state,
/// `step` advances it one tick, and `hash` digests it. Generic over the
/// state type so the harness itself can be exercised with plain values.
///
/// # Example
///
/// ```
/// use homestead_test_utils::determinism::verify_determinism;
/// use homestead_test_utils::fixtures;
///
/// let result = verify_determinism(
///     2,
///     40,
///     || fixtures::shuttle_fleet(2, 9),
///     |sim| {
///         sim.update(0.05);
///     },
///     |sim| sim.state_hash(),
/// );
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, SetupFn, StepFn, DigestFn>(
    runs: usize,
    ticks: u64,
    setup: SetupFn,
    step: StepFn,
    hash: DigestFn,
) -> DeterminismResult
where
    SetupFn: Fn() -> S,
    StepFn: Fn(&mut S),
    DigestFn: Fn(&S) -> u64,
{
    let hashes: Vec<u64> = (0..runs)
        .map(|run| {
            let mut state = setup();
            for _ in 0..ticks {
                step(&mut state);
            }
            let digest = hash(&state);
            tracing::debug!(run, ticks, digest, "determinism run complete");
            digest
        })
        .collect();

    DeterminismResult {
        is_deterministic: all_equal(&hashes),
        hashes,
        ticks,
    }
}

/// Two-run shorthand for full [`Simulation`] workloads with a fixed step.
pub fn verify_simulation_determinism<F>(setup_fn: F, ticks: u64, dt: f64) -> bool
where
    F: Fn() -> Simulation,
{
    verify_determinism(
        2,
        ticks,
        &setup_fn,
        |sim| {
            sim.update(dt);
        },
        Simulation::state_hash,
    )
    .is_deterministic
}

/// Race `num_sims` copies of a workload on separate threads and collect
/// their final hashes.
///
/// Thread timing and allocator state differ per thread, so agreement
/// here rules out dependence on anything outside the simulation's own
/// state.
///
/// # Panics
///
/// Panics if a worker thread panics.
pub fn run_parallel_simulations<F>(
    setup_fn: F,
    num_sims: usize,
    ticks: u64,
    dt: f64,
) -> ParallelSimResult
where
    F: Fn() -> Simulation + Sync,
{
    let hashes = thread::scope(|scope| {
        let mut workers = Vec::with_capacity(num_sims);
        for _ in 0..num_sims {
            workers.push(scope.spawn(|| {
                let mut sim = setup_fn();
                for _ in 0..ticks {
                    sim.update(dt);
                }
                sim.state_hash()
            }));
        }
        workers
            .into_iter()
            .map(|worker| worker.join().expect("simulation thread panicked"))
            .collect()
    });

    ParallelSimResult {
        hashes,
        ticks,
        num_sims,
    }
}

/// Step two identical runs in lockstep and report the first tick whose
/// hashes differ.
///
/// Returns `None` when the runs stay identical for all `ticks`;
/// `Some(0)` means the setup itself diverged.
pub fn find_first_divergence<F>(setup_fn: F, ticks: u64, dt: f64) -> Option<u64>
where
    F: Fn() -> Simulation,
{
    let mut left = setup_fn();
    let mut right = setup_fn();
    if left.state_hash() != right.state_hash() {
        return Some(0);
    }

    for tick in 1..=ticks {
        left.update(dt);
        right.update(dt);
        if left.state_hash() != right.state_hash() {
            return Some(tick);
        }
    }
    None
}

/// Check that a snapshot taken after `ticks` updates restores to the
/// same state hash.
///
/// `world_fn` must rebuild the terrain the setup used; decoded member
/// footprints are re-stamped onto it during load.
pub fn verify_save_determinism<F, W>(setup_fn: F, world_fn: W, ticks: u64, dt: f64) -> bool
where
    F: Fn() -> Simulation,
    W: Fn() -> TileMap,
{
    let mut sim = setup_fn();
    for _ in 0..ticks {
        sim.update(dt);
    }

    let live_hash = sim.state_hash();
    let bytes = sim.save();
    Simulation::load(world_fn(), &bytes).is_ok_and(|restored| restored.state_hash() == live_hash)
}

/// Hash any `Hash` value with the std hasher, for quick test digests.
pub fn hash_of<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies over engine inputs.
///
/// Generators for the randomizable parts of a workload; determinism
/// properties pair them with fixed seeds.
pub mod strategies {
    use proptest::prelude::*;

    use homestead_core::agent::{Target, TargetAction};
    use homestead_core::complex::ComplexId;
    use homestead_core::items::ItemId;
    use homestead_core::math::{TileCoord, Vec3};

    /// Generate a tile coordinate within a `width` x `height` map.
    pub fn arb_tile(width: u32, height: u32) -> impl Strategy<Value = TileCoord> {
        (0..width, 0..height).prop_map(|(x, z)| TileCoord::new(x, z))
    }

    /// Generate a world position on the ground plane within `extent`.
    pub fn arb_position(extent: f64) -> impl Strategy<Value = Vec3> {
        (0.0..extent, 0.0..extent).prop_map(|(x, z)| Vec3::new(x, 0.0, z))
    }

    /// Generate one of the built-in item kinds.
    pub fn arb_item() -> impl Strategy<Value = ItemId> {
        (0u16..5).prop_map(ItemId::new)
    }

    /// Generate a load or put action with modest amounts.
    pub fn arb_action() -> impl Strategy<Value = TargetAction> {
        prop_oneof![
            (1u32..20).prop_map(TargetAction::LoadFixed),
            (0.05f64..0.95).prop_map(TargetAction::LoadPercentage),
            (1u32..20).prop_map(TargetAction::PutFixed),
            (0.05f64..0.95).prop_map(TargetAction::PutPercentage),
        ]
    }

    /// Generate a schedule over the given complexes.
    pub fn arb_schedule(
        complexes: Vec<ComplexId>,
        max_len: usize,
    ) -> impl Strategy<Value = Vec<Target>> {
        let stop = (proptest::sample::select(complexes), arb_action(), arb_item())
            .prop_map(|(complex, action, item)| Target::new(complex, action, item));
        proptest::collection::vec(stop, 1..max_len)
    }

    /// Generate an update step duration in seconds.
    pub fn arb_dt() -> impl Strategy<Value = f64> {
        0.01f64..0.25
    }

    /// Generate a sequence of update step durations.
    pub fn arb_dt_sequence(max_len: usize) -> impl Strategy<Value = Vec<f64>> {
        proptest::collection::vec(arb_dt(), 1..max_len)
    }
}
