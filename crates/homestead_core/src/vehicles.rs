//! Vehicle kinds built on the transport agent.
//!
//! Every vehicle shares the [`Agent`] state machine; a kind contributes
//! only its movement constants and decorative state. The simulation
//! owns carriages, the canonical land vehicle. Trains and boats follow
//! the same contract against their own network implementations, which is
//! what keeps the agent generic instead of copied per kind.

use serde::{Deserialize, Serialize};

use crate::agent::{Agent, AgentId, TransportNetwork, VehicleParams};
use crate::events::TickEvents;
use crate::math::Vec3;

/// A draft animal harnessed to a carriage.
///
/// Purely decorative; only its rendering offset is simulated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DraftAnimal {
    /// Distance ahead of the carriage along its facing, in world units.
    pub offset: f64,
}

impl DraftAnimal {
    /// Harness an animal at a forward offset.
    #[must_use]
    pub const fn new(offset: f64) -> Self {
        Self { offset }
    }
}

/// A road carriage drawn by draft animals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Carriage {
    /// The underlying transport agent.
    pub agent: Agent,
    /// Draft animals, front to back.
    pub animals: Vec<DraftAnimal>,
}

impl Carriage {
    /// Fallback parameters when no vehicle data is loaded.
    pub const DEFAULT_PARAMS: VehicleParams = VehicleParams::new(1.4, 2.0, 0.45);

    /// Create a carriage with no animals harnessed.
    #[must_use]
    pub fn new(id: AgentId, position: Vec3, params: VehicleParams) -> Self {
        Self {
            agent: Agent::new(id, position, params),
            animals: Vec::new(),
        }
    }

    /// Harness draft animals at the given forward offsets.
    #[must_use]
    pub fn with_animals(mut self, offsets: &[f64]) -> Self {
        self.animals = offsets.iter().copied().map(DraftAnimal::new).collect();
        self
    }

    /// World positions of the animals, projected along the carriage's
    /// facing. Elevation follows the carriage itself.
    #[must_use]
    pub fn animal_positions(&self) -> Vec<Vec3> {
        let forward = Vec3::from_yaw(self.agent.yaw);
        self.animals
            .iter()
            .map(|animal| self.agent.position + forward * animal.offset)
            .collect()
    }

    /// Advance the carriage by `dt` seconds.
    pub fn update(&mut self, dt: f64, net: &mut impl TransportNetwork, events: &mut TickEvents) {
        self.agent.update(dt, net, events);
    }
}

/// A freight train. Rail movement constants, same state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Train {
    /// The underlying transport agent.
    pub agent: Agent,
}

impl Train {
    /// Fallback parameters when no vehicle data is loaded.
    pub const DEFAULT_PARAMS: VehicleParams = VehicleParams::new(8.0, 6.0, 0.3);

    /// Create a train.
    #[must_use]
    pub fn new(id: AgentId, position: Vec3, params: VehicleParams) -> Self {
        Self {
            agent: Agent::new(id, position, params),
        }
    }

    /// Advance the train by `dt` seconds.
    pub fn update(&mut self, dt: f64, net: &mut impl TransportNetwork, events: &mut TickEvents) {
        self.agent.update(dt, net, events);
    }
}

/// A cargo boat for waterways. Same state machine again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Boat {
    /// The underlying transport agent.
    pub agent: Agent,
}

impl Boat {
    /// Fallback parameters when no vehicle data is loaded.
    pub const DEFAULT_PARAMS: VehicleParams = VehicleParams::new(3.0, 5.0, 1.6);

    /// Create a boat.
    #[must_use]
    pub fn new(id: AgentId, position: Vec3, params: VehicleParams) -> Self {
        Self {
            agent: Agent::new(id, position, params),
        }
    }

    /// Advance the boat by `dt` seconds.
    pub fn update(&mut self, dt: f64, net: &mut impl TransportNetwork, events: &mut TickEvents) {
        self.agent.update(dt, net, events);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{execute_exchange, AgentState, Target, TargetAction};
    use crate::complex::{ComplexBank, ComplexId};
    use crate::items::{ItemId, ItemStore};
    use crate::pathfinding::Path;

    const ORE: ItemId = ItemId::new(4);

    /// A rail network: canned line, no grid.
    struct RailNet {
        bank: ComplexBank,
        line: Option<Path>,
    }

    impl TransportNetwork for RailNet {
        fn is_passable(&self, _x: u32, _z: u32) -> bool {
            true
        }

        fn find_path_to(&mut self, _start: Vec3, _complex: ComplexId) -> Option<Path> {
            self.line.clone()
        }

        fn exchange(&mut self, complex: ComplexId, cargo: &mut ItemStore, target: &Target) -> u32 {
            match self.bank.get_mut(complex) {
                Some(c) => execute_exchange(c, cargo, target),
                None => 0,
            }
        }
    }

    #[test]
    fn test_animal_positions_project_along_heading() {
        let mut carriage = Carriage::new(
            AgentId::new(0),
            Vec3::new(5.0, 0.0, 5.0),
            Carriage::DEFAULT_PARAMS,
        )
        .with_animals(&[1.0, 2.0]);

        // Facing +x
        carriage.agent.yaw = std::f64::consts::FRAC_PI_2;
        let positions = carriage.animal_positions();
        assert_eq!(positions.len(), 2);
        assert!((positions[0].x - 6.0).abs() < 1e-9);
        assert!((positions[0].z - 5.0).abs() < 1e-9);
        assert!((positions[1].x - 7.0).abs() < 1e-9);

        // Facing +z
        carriage.agent.yaw = 0.0;
        let positions = carriage.animal_positions();
        assert!((positions[0].x - 5.0).abs() < 1e-9);
        assert!((positions[0].z - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_unharnessed_carriage_has_no_animal_positions() {
        let carriage = Carriage::new(AgentId::new(0), Vec3::ZERO, Carriage::DEFAULT_PARAMS);
        assert!(carriage.animal_positions().is_empty());
    }

    #[test]
    fn test_train_runs_schedule_on_rail_network() {
        let mut net = RailNet {
            bank: ComplexBank::new(),
            line: Some(Path::new(vec![Vec3::ZERO])),
        };
        let depot = net.bank.create_complex();
        net.bank.complex_mut(depot).add_stored(ORE, 8);

        let mut train = Train::new(
            AgentId::new(3),
            Vec3::ZERO,
            VehicleParams::new(10.0, 1.0, 0.3),
        );
        train
            .agent
            .set_schedule(vec![Target::new(depot, TargetAction::LoadFixed(4), ORE)]);
        let mut events = TickEvents::new();

        // Arrive, then load
        train.update(1.0, &mut net, &mut events);
        train.update(1.0, &mut net, &mut events);

        assert_eq!(train.agent.items.count(ORE), 4);
        assert_eq!(net.bank.complex(depot).stored_count(ORE), 4);
    }

    #[test]
    fn test_boat_goes_lost_without_waterway() {
        let mut net = RailNet {
            bank: ComplexBank::new(),
            line: None,
        };
        let dock = net.bank.create_complex();

        let mut boat = Boat::new(AgentId::new(7), Vec3::ZERO, Boat::DEFAULT_PARAMS);
        boat.agent
            .set_schedule(vec![Target::new(dock, TargetAction::PutFixed(1), ORE)]);
        let mut events = TickEvents::new();

        boat.update(1.0, &mut net, &mut events);
        assert_eq!(boat.agent.state, AgentState::Lost);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_vehicle_kind_defaults_differ() {
        assert!(Train::DEFAULT_PARAMS.speed > Carriage::DEFAULT_PARAMS.speed);
        assert!(Boat::DEFAULT_PARAMS.step_sound_period > Carriage::DEFAULT_PARAMS.step_sound_period);
    }
}
