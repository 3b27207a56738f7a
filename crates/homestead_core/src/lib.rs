//! # Homestead Core
//!
//! Deterministic settlement logistics engine: terrain routing,
//! production complexes, and schedule-driven transport agents.
//!
//! This crate contains **only** simulation logic:
//! - No rendering
//! - No system randomness (one seeded generator, owned by the simulation)
//! - Stable iteration order everywhere shared state is touched
//! - No IO outside the explicit save-file helpers
//!
//! This separation enables:
//! - Headless scenario runs and batch balancing
//! - Lockstep determinism checks via state hashing
//! - Exact mid-flight save and resume
//!
//! ## Crate Structure
//!
//! - [`terrain`] - Tile world and the derived obstacle grid
//! - [`pathfinding`] - Route search over the obstacle grid
//! - [`complex`] - Production complexes with shared storage
//! - [`agent`] - The generic transport state machine
//! - [`vehicles`] - Carriage, train, and boat specializations
//! - [`simulation`] - The orchestrating update loop
//! - [`save`] - Flat-arena binary persistence
//! - [`data`] - RON definition files for items, buildings, vehicles

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod agent;
pub mod complex;
pub mod data;
pub mod error;
pub mod events;
pub mod items;
pub mod math;
pub mod pathfinding;
pub mod rng;
pub mod save;
pub mod simulation;
pub mod terrain;
pub mod vehicles;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::agent::{
        Agent, AgentId, AgentState, Target, TargetAction, TransportNetwork, VehicleParams,
    };
    pub use crate::complex::{Complex, ComplexBank, ComplexId, Conversion, Member};
    pub use crate::data::{BuildingDef, DataRegistry, GameData, ItemDef, VehicleDef};
    pub use crate::error::{CoreError, Result};
    pub use crate::events::{SimEvent, TickEvents};
    pub use crate::items::{ItemCount, ItemId, ItemStore};
    pub use crate::math::{TileCoord, TileRect, Vec3};
    pub use crate::pathfinding::Path;
    pub use crate::rng::SimRng;
    pub use crate::simulation::Simulation;
    pub use crate::terrain::{ObstacleGrid, TileMap, WorldMap};
    pub use crate::vehicles::Carriage;
}
