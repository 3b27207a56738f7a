//! Generic transport agent state machine.
//!
//! An agent walks a route toward the current target of a cyclic
//! schedule, waits out a load duration on arrival, performs one atomic
//! item exchange with the target complex, and departs for the next
//! target. The machine is generic over the [`TransportNetwork`]
//! capability trait, so carriages, trains, and boats share one state
//! machine and tests can drive it with a mock network.

use serde::{Deserialize, Serialize};

use crate::complex::{Complex, ComplexId};
use crate::events::{SimEvent, TickEvents};
use crate::items::{ItemId, ItemStore};
use crate::math::{heading_between, Vec3};
use crate::pathfinding::Path;

/// Distance along the path used to sample heading tangents, in world
/// units (a quarter tile at the default tile size). Sampling ahead and
/// behind smooths the facing over sharp waypoint turns.
const HEADING_SAMPLE_DISTANCE: f64 = 0.25;

/// Stable identifier of a transport agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub u32);

impl AgentId {
    /// Create a new agent ID.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// The agent's index in its owning collection.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Movement and loading parameters of one vehicle kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleParams {
    /// Travel speed in world units per second.
    pub speed: f64,
    /// Seconds spent stopped at a target before exchanging.
    pub load_duration: f64,
    /// Seconds between step sounds while moving. Cosmetic cadence;
    /// carried for renderers, never read by the state machine.
    pub step_sound_period: f64,
}

impl VehicleParams {
    /// Create new vehicle parameters.
    #[must_use]
    pub const fn new(speed: f64, load_duration: f64, step_sound_period: f64) -> Self {
        Self {
            speed,
            load_duration,
            step_sound_period,
        }
    }
}

/// State of a transport agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentState {
    /// Moving along a path, or waiting to request one.
    Travelling,
    /// Stopped at a target, waiting out the load duration.
    Loading,
    /// No route to the current target; waiting for a repath.
    Lost,
}

impl Default for AgentState {
    fn default() -> Self {
        Self::Travelling
    }
}

/// What to move when an agent reaches a target.
///
/// Fractions are of the stock present at exchange time and floor to
/// whole units, so a small stock can legitimately move nothing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TargetAction {
    /// Take a fixed number of units from the complex.
    LoadFixed(u32),
    /// Take a fraction of the complex's stock.
    LoadPercentage(f64),
    /// Deliver a fixed number of units to the complex.
    PutFixed(u32),
    /// Deliver a fraction of the agent's cargo.
    PutPercentage(f64),
}

/// One stop in an agent's schedule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// The complex to visit.
    pub complex: ComplexId,
    /// What to move on arrival.
    pub action: TargetAction,
    /// The item kind to move.
    pub item: ItemId,
}

impl Target {
    /// Create a new schedule stop.
    #[must_use]
    pub const fn new(complex: ComplexId, action: TargetAction, item: ItemId) -> Self {
        Self {
            complex,
            action,
            item,
        }
    }
}

/// Capabilities an agent needs from the surrounding simulation.
///
/// The simulation implements this over its obstacle grid, complex bank,
/// and rng; tests implement it with fixtures. Keeping the item exchange
/// on the trait keeps every storage mutation behind one seam.
pub trait TransportNetwork {
    /// Whether the tile can carry agent traffic.
    fn is_passable(&self, x: u32, z: u32) -> bool;

    /// Search a route from a world position to the loading radius of a
    /// complex.
    fn find_path_to(&mut self, start: Vec3, complex: ComplexId) -> Option<Path>;

    /// Move items between agent cargo and complex storage per the
    /// target's action, clamped to what is actually available.
    ///
    /// Returns the units actually moved.
    fn exchange(&mut self, complex: ComplexId, cargo: &mut ItemStore, target: &Target) -> u32;
}

/// Perform one target action against a complex's storage.
///
/// All four actions clamp to available stock; fractional amounts floor
/// to whole units. Returns the units moved.
pub fn execute_exchange(complex: &mut Complex, cargo: &mut ItemStore, target: &Target) -> u32 {
    let item = target.item;
    match target.action {
        TargetAction::LoadFixed(amount) => {
            let moved = complex.storage_mut().remove_up_to(item, amount);
            cargo.add(item, moved);
            moved
        }
        TargetAction::LoadPercentage(fraction) => {
            let amount = floor_fraction(complex.stored_count(item), fraction);
            let moved = complex.storage_mut().remove_up_to(item, amount);
            cargo.add(item, moved);
            moved
        }
        TargetAction::PutFixed(amount) => {
            let moved = cargo.remove_up_to(item, amount);
            complex.add_stored(item, moved);
            moved
        }
        TargetAction::PutPercentage(fraction) => {
            let amount = floor_fraction(cargo.count(item), fraction);
            let moved = cargo.remove_up_to(item, amount);
            complex.add_stored(item, moved);
            moved
        }
    }
}

/// Whole units in a fraction of a stock. Non-finite or non-positive
/// results move nothing.
fn floor_fraction(available: u32, fraction: f64) -> u32 {
    let amount = (f64::from(available) * fraction).floor();
    if amount.is_finite() && amount > 0.0 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            amount.min(f64::from(u32::MAX)) as u32
        }
    } else {
        0
    }
}

/// A schedule-driven transport vehicle.
///
/// Fields the renderer reads every frame (position, facing, state,
/// cargo) are public; schedule bookkeeping goes through methods so the
/// target index always stays in range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    /// Stable identifier, used in events.
    pub id: AgentId,
    /// World position.
    pub position: Vec3,
    /// Facing yaw in radians (0 faces +z).
    pub yaw: f64,
    /// Climb pitch in radians.
    pub pitch: f64,
    /// Current state.
    pub state: AgentState,
    /// Movement and loading parameters.
    pub params: VehicleParams,
    /// Cargo on board.
    pub items: ItemStore,
    /// Cyclic schedule of stops.
    pub(crate) schedule: Vec<Target>,
    /// Index of the current stop; always in range while the schedule is
    /// non-empty.
    pub(crate) curr_target_i: usize,
    /// Route being walked, if any.
    pub(crate) path: Option<Path>,
    /// World units travelled along the current path.
    pub(crate) path_progress: f64,
    /// Seconds accumulated in the `Loading` state.
    pub(crate) load_timer: f64,
    /// Whether the current loss was already reported. Cleared whenever a
    /// path or schedule arrives.
    pub(crate) lost_reported: bool,
}

impl Agent {
    /// Create a new idle agent at a position.
    #[must_use]
    pub fn new(id: AgentId, position: Vec3, params: VehicleParams) -> Self {
        Self {
            id,
            position,
            yaw: 0.0,
            pitch: 0.0,
            state: AgentState::Travelling,
            params,
            items: ItemStore::new(),
            schedule: Vec::new(),
            curr_target_i: 0,
            path: None,
            path_progress: 0.0,
            load_timer: 0.0,
            lost_reported: false,
        }
    }

    /// The schedule stops in visit order.
    #[must_use]
    pub fn schedule(&self) -> &[Target] {
        &self.schedule
    }

    /// The stop the agent is currently heading for or serving.
    #[must_use]
    pub fn current_target(&self) -> Option<Target> {
        self.schedule.get(self.curr_target_i).copied()
    }

    /// Index of the current stop.
    #[must_use]
    pub const fn current_target_index(&self) -> usize {
        self.curr_target_i
    }

    /// The route being walked, if any.
    #[must_use]
    pub const fn path(&self) -> Option<&Path> {
        self.path.as_ref()
    }

    /// World units travelled along the current path.
    #[must_use]
    pub const fn path_progress(&self) -> f64 {
        self.path_progress
    }

    /// Replace the schedule and restart it from the first stop.
    ///
    /// Clears any current path and loss, and forces `Travelling`; the
    /// agent requests a route to the new first stop on its next update.
    pub fn set_schedule(&mut self, schedule: Vec<Target>) {
        self.schedule = schedule;
        self.curr_target_i = 0;
        self.path = None;
        self.path_progress = 0.0;
        self.lost_reported = false;
        self.state = AgentState::Travelling;
    }

    /// Append a stop to the schedule.
    pub fn push_target(&mut self, target: Target) {
        self.schedule.push(target);
    }

    /// Install a route and force `Travelling` from its start.
    ///
    /// Used directly after a global re-route; any loss is cleared.
    pub fn set_path(&mut self, path: Path) {
        self.path = Some(path);
        self.path_progress = 0.0;
        self.lost_reported = false;
        self.state = AgentState::Travelling;
    }

    /// Drop the current route, keeping state and progress toward the
    /// schedule. The agent re-requests a path on its next update.
    pub fn clear_path(&mut self) {
        self.path = None;
        self.path_progress = 0.0;
    }

    /// Request a route to the current target.
    ///
    /// Returns `true` and forces `Travelling` on success. On failure the
    /// agent goes `Lost` and reports once; repeated failed attempts stay
    /// silent until a path or a new schedule arrives. Without a current
    /// target this is a no-op, which keeps "no target" distinct from "no
    /// path".
    pub fn try_find_path(
        &mut self,
        net: &mut impl TransportNetwork,
        events: &mut TickEvents,
    ) -> bool {
        let Some(target) = self.current_target() else {
            return false;
        };
        match net.find_path_to(self.position, target.complex) {
            Some(path) => {
                self.set_path(path);
                true
            }
            None => {
                self.state = AgentState::Lost;
                if !self.lost_reported {
                    self.lost_reported = true;
                    tracing::warn!(
                        agent = self.id.0,
                        complex = target.complex.0,
                        "no path to target"
                    );
                    events.push(SimEvent::PathNotFound { agent: self.id });
                }
                false
            }
        }
    }

    /// Advance the agent by `dt` seconds.
    ///
    /// `Travelling` walks the path (requesting one first if needed),
    /// `Loading` waits out the load duration and then performs the
    /// exchange and moves to the next stop, `Lost` waits for an external
    /// [`try_find_path`](Self::try_find_path).
    pub fn update(&mut self, dt: f64, net: &mut impl TransportNetwork, events: &mut TickEvents) {
        match self.state {
            AgentState::Travelling => {
                if self.path.is_none() && !self.schedule.is_empty() {
                    self.try_find_path(net, events);
                }
                let Some(path) = self.path.as_ref() else {
                    return;
                };
                self.path_progress += dt * self.params.speed;
                let ahead = path.position_at(self.path_progress + HEADING_SAMPLE_DISTANCE);
                let behind =
                    path.position_at((self.path_progress - HEADING_SAMPLE_DISTANCE).max(0.0));
                let new_position = path.position_at(self.path_progress);
                let arrived = self.path_progress >= path.length();

                if ahead.distance_squared(behind) > 1e-12 {
                    let (yaw, pitch) = heading_between(behind, ahead);
                    self.yaw = yaw;
                    self.pitch = pitch;
                }
                self.position = new_position;
                if arrived {
                    self.state = AgentState::Loading;
                    self.load_timer = 0.0;
                }
            }
            AgentState::Loading => {
                self.load_timer += dt;
                if self.load_timer >= self.params.load_duration && !self.schedule.is_empty() {
                    let target = self.schedule[self.curr_target_i];
                    let moved = net.exchange(target.complex, &mut self.items, &target);
                    if moved > 0 {
                        events.push(SimEvent::ExchangeCompleted {
                            agent: self.id,
                            complex: target.complex,
                            item: target.item,
                            amount: moved,
                        });
                    }
                    self.curr_target_i = (self.curr_target_i + 1) % self.schedule.len();
                    self.path = None;
                    self.path_progress = 0.0;
                    self.state = AgentState::Travelling;
                }
            }
            AgentState::Lost => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complex::ComplexBank;

    const GRAIN: ItemId = ItemId::new(1);

    /// Network fixture: a real bank plus a canned path answer.
    struct TestNet {
        bank: ComplexBank,
        path: Option<Path>,
        find_calls: usize,
    }

    impl TestNet {
        fn new() -> Self {
            Self {
                bank: ComplexBank::new(),
                path: Some(Path::new(vec![Vec3::ZERO])),
                find_calls: 0,
            }
        }

        fn stocked_complex(&mut self, amount: u32) -> ComplexId {
            let id = self.bank.create_complex();
            self.bank.complex_mut(id).add_stored(GRAIN, amount);
            id
        }
    }

    impl TransportNetwork for TestNet {
        fn is_passable(&self, _x: u32, _z: u32) -> bool {
            true
        }

        fn find_path_to(&mut self, _start: Vec3, _complex: ComplexId) -> Option<Path> {
            self.find_calls += 1;
            self.path.clone()
        }

        fn exchange(&mut self, complex: ComplexId, cargo: &mut ItemStore, target: &Target) -> u32 {
            match self.bank.get_mut(complex) {
                Some(c) => execute_exchange(c, cargo, target),
                None => 0,
            }
        }
    }

    fn test_agent() -> Agent {
        Agent::new(
            AgentId::new(0),
            Vec3::ZERO,
            VehicleParams::new(1.0, 1.0, 0.5),
        )
    }

    fn count_lost(events: &TickEvents) -> usize {
        events
            .events()
            .iter()
            .filter(|e| matches!(e, SimEvent::PathNotFound { .. }))
            .count()
    }

    #[test]
    fn test_load_fixed_clamps_to_stock() {
        let mut bank = ComplexBank::new();
        let id = bank.create_complex();
        bank.complex_mut(id).add_stored(GRAIN, 5);
        let mut cargo = ItemStore::new();

        let target = Target::new(id, TargetAction::LoadFixed(10), GRAIN);
        let moved = execute_exchange(bank.complex_mut(id), &mut cargo, &target);

        assert_eq!(moved, 5);
        assert_eq!(cargo.count(GRAIN), 5);
        assert_eq!(bank.complex(id).stored_count(GRAIN), 0);
    }

    #[test]
    fn test_load_percentage_floors() {
        let mut bank = ComplexBank::new();
        let id = bank.create_complex();
        bank.complex_mut(id).add_stored(GRAIN, 5);
        let mut cargo = ItemStore::new();

        let target = Target::new(id, TargetAction::LoadPercentage(0.5), GRAIN);
        let moved = execute_exchange(bank.complex_mut(id), &mut cargo, &target);

        assert_eq!(moved, 2);
        assert_eq!(bank.complex(id).stored_count(GRAIN), 3);
    }

    #[test]
    fn test_load_percentage_of_tiny_stock_moves_nothing() {
        let mut bank = ComplexBank::new();
        let id = bank.create_complex();
        bank.complex_mut(id).add_stored(GRAIN, 1);
        let mut cargo = ItemStore::new();

        let target = Target::new(id, TargetAction::LoadPercentage(0.5), GRAIN);
        assert_eq!(execute_exchange(bank.complex_mut(id), &mut cargo, &target), 0);
        assert_eq!(bank.complex(id).stored_count(GRAIN), 1);
    }

    #[test]
    fn test_put_actions_mirror_loads() {
        let mut bank = ComplexBank::new();
        let id = bank.create_complex();
        let mut cargo = ItemStore::new();
        cargo.add(GRAIN, 4);

        let put = Target::new(id, TargetAction::PutFixed(3), GRAIN);
        assert_eq!(execute_exchange(bank.complex_mut(id), &mut cargo, &put), 3);
        assert_eq!(cargo.count(GRAIN), 1);
        assert_eq!(bank.complex(id).stored_count(GRAIN), 3);

        let put_all = Target::new(id, TargetAction::PutPercentage(1.0), GRAIN);
        assert_eq!(
            execute_exchange(bank.complex_mut(id), &mut cargo, &put_all),
            1
        );
        assert_eq!(cargo.count(GRAIN), 0);
        assert_eq!(bank.complex(id).stored_count(GRAIN), 4);
    }

    #[test]
    fn test_agent_cycles_schedule_in_order() {
        let mut net = TestNet::new();
        let a = net.stocked_complex(10);
        let b = net.stocked_complex(10);
        let c = net.stocked_complex(10);

        let mut agent = test_agent();
        agent.set_schedule(vec![
            Target::new(a, TargetAction::LoadFixed(1), GRAIN),
            Target::new(b, TargetAction::LoadFixed(1), GRAIN),
            Target::new(c, TargetAction::LoadFixed(1), GRAIN),
        ]);
        let mut events = TickEvents::new();

        // Each stop takes one tick to arrive (trivial path) and one to load
        for _ in 0..6 {
            agent.update(1.0, &mut net, &mut events);
        }

        assert_eq!(net.bank.complex(a).stored_count(GRAIN), 9);
        assert_eq!(net.bank.complex(b).stored_count(GRAIN), 9);
        assert_eq!(net.bank.complex(c).stored_count(GRAIN), 9);
        assert_eq!(agent.items.count(GRAIN), 3);
        // Wrapped back to the first stop
        assert_eq!(agent.current_target_index(), 0);
        assert_eq!(net.find_calls, 3);
    }

    #[test]
    fn test_agent_idles_without_schedule() {
        let mut net = TestNet::new();
        let mut agent = test_agent();
        let mut events = TickEvents::new();

        for _ in 0..5 {
            agent.update(1.0, &mut net, &mut events);
        }

        assert_eq!(agent.state, AgentState::Travelling);
        assert_eq!(net.find_calls, 0);
        assert!(events.is_empty());
    }

    #[test]
    fn test_agent_reports_loss_once() {
        let mut net = TestNet::new();
        let id = net.stocked_complex(1);
        net.path = None;

        let mut agent = test_agent();
        agent.set_schedule(vec![Target::new(id, TargetAction::LoadFixed(1), GRAIN)]);
        let mut events = TickEvents::new();

        agent.update(1.0, &mut net, &mut events);
        assert_eq!(agent.state, AgentState::Lost);
        assert_eq!(count_lost(&events), 1);

        // Lost agents do not re-search on their own
        for _ in 0..5 {
            agent.update(1.0, &mut net, &mut events);
        }
        assert_eq!(net.find_calls, 1);

        // A failed external repath stays silent
        assert!(!agent.try_find_path(&mut net, &mut events));
        assert_eq!(count_lost(&events), 1);

        // Recovery clears the latch, so a later loss reports again
        net.path = Some(Path::new(vec![Vec3::ZERO]));
        assert!(agent.try_find_path(&mut net, &mut events));
        assert_eq!(agent.state, AgentState::Travelling);

        agent.clear_path();
        net.path = None;
        agent.update(1.0, &mut net, &mut events);
        assert_eq!(count_lost(&events), 2);
    }

    #[test]
    fn test_set_path_forces_travelling() {
        let mut agent = test_agent();
        agent.state = AgentState::Lost;
        agent.lost_reported = true;

        agent.set_path(Path::new(vec![Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0)]));

        assert_eq!(agent.state, AgentState::Travelling);
        assert!((agent.path_progress() - 0.0).abs() < f64::EPSILON);
        assert!(!agent.lost_reported);
    }

    #[test]
    fn test_set_schedule_restarts_from_first_stop() {
        let mut net = TestNet::new();
        let a = net.stocked_complex(5);
        let b = net.stocked_complex(5);

        let mut agent = test_agent();
        agent.set_schedule(vec![
            Target::new(a, TargetAction::LoadFixed(1), GRAIN),
            Target::new(b, TargetAction::LoadFixed(1), GRAIN),
        ]);
        let mut events = TickEvents::new();

        // Serve the first stop so the index advances
        agent.update(1.0, &mut net, &mut events);
        agent.update(1.0, &mut net, &mut events);
        assert_eq!(agent.current_target_index(), 1);

        agent.set_schedule(vec![Target::new(b, TargetAction::LoadFixed(1), GRAIN)]);
        assert_eq!(agent.current_target_index(), 0);
        assert!(agent.path().is_none());
        assert_eq!(agent.state, AgentState::Travelling);
    }

    #[test]
    fn test_heading_follows_path_tangent() {
        let mut net = TestNet::new();
        let mut agent = test_agent();
        agent.set_path(Path::new(vec![
            Vec3::new(0.5, 0.0, 0.5),
            Vec3::new(4.5, 0.0, 0.5),
        ]));
        let mut events = TickEvents::new();

        agent.update(0.5, &mut net, &mut events);

        // +x travel is yaw pi/2, flat ground is pitch 0
        assert!((agent.yaw - std::f64::consts::FRAC_PI_2).abs() < 1e-9);
        assert!(agent.pitch.abs() < 1e-9);
        assert!((agent.position.x - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_arrival_switches_to_loading() {
        let mut net = TestNet::new();
        let id = net.stocked_complex(5);
        let mut agent = test_agent();
        agent.set_schedule(vec![Target::new(id, TargetAction::LoadFixed(1), GRAIN)]);
        agent.set_path(Path::new(vec![Vec3::ZERO, Vec3::new(3.0, 0.0, 0.0)]));
        let mut events = TickEvents::new();

        agent.update(2.9, &mut net, &mut events);
        assert_eq!(agent.state, AgentState::Travelling);

        agent.update(0.1, &mut net, &mut events);
        assert_eq!(agent.state, AgentState::Loading);
        assert_eq!(agent.position, Vec3::new(3.0, 0.0, 0.0));
    }

    #[test]
    fn test_loading_waits_out_full_duration() {
        let mut net = TestNet::new();
        let id = net.stocked_complex(5);
        let mut agent = Agent::new(
            AgentId::new(0),
            Vec3::ZERO,
            VehicleParams::new(1.0, 2.0, 0.5),
        );
        agent.set_schedule(vec![Target::new(id, TargetAction::LoadFixed(1), GRAIN)]);
        let mut events = TickEvents::new();

        // Arrive (trivial path)
        agent.update(1.0, &mut net, &mut events);
        assert_eq!(agent.state, AgentState::Loading);

        agent.update(1.0, &mut net, &mut events);
        assert_eq!(agent.state, AgentState::Loading);
        assert_eq!(net.bank.complex(id).stored_count(GRAIN), 5);

        agent.update(1.0, &mut net, &mut events);
        assert_eq!(agent.state, AgentState::Travelling);
        assert_eq!(net.bank.complex(id).stored_count(GRAIN), 4);
    }

    #[test]
    fn test_exchange_with_recycled_complex_skips_stop() {
        let mut net = TestNet::new();
        let id = net.stocked_complex(5);
        let other = net.stocked_complex(5);
        net.bank.delete_complex(id);

        let mut agent = test_agent();
        agent.set_schedule(vec![
            Target::new(id, TargetAction::LoadFixed(1), GRAIN),
            Target::new(other, TargetAction::LoadFixed(1), GRAIN),
        ]);
        let mut events = TickEvents::new();

        agent.update(1.0, &mut net, &mut events);
        agent.update(1.0, &mut net, &mut events);

        // Nothing moved, no exchange event, but the schedule advanced
        assert_eq!(agent.items.count(GRAIN), 0);
        assert!(events
            .events()
            .iter()
            .all(|e| !matches!(e, SimEvent::ExchangeCompleted { .. })));
        assert_eq!(agent.current_target_index(), 1);
    }

    #[test]
    fn test_exchange_event_carries_amount() {
        let mut net = TestNet::new();
        let id = net.stocked_complex(5);

        let mut agent = test_agent();
        agent.set_schedule(vec![Target::new(id, TargetAction::LoadFixed(3), GRAIN)]);
        let mut events = TickEvents::new();

        agent.update(1.0, &mut net, &mut events);
        agent.update(1.0, &mut net, &mut events);

        assert!(events.events().iter().any(|e| matches!(
            e,
            SimEvent::ExchangeCompleted {
                complex,
                item: GRAIN,
                amount: 3,
                ..
            } if *complex == id
        )));
    }
}
