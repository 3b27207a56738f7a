//! Scenario loading and resolution.
//!
//! Scenarios define the initial state for headless runs: the map, the
//! buildings placed on it, starting stocks, and carriage schedules.
//! Schedules reference complexes by any tile of a member building, so a
//! scenario file never has to know complex slot numbers.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use homestead_core::agent::{Target, TargetAction};
use homestead_core::data::{DataRegistry, GameData};
use homestead_core::error::CoreError;
use homestead_core::math::{TileCoord, TileRect, Vec3};
use homestead_core::simulation::Simulation;
use homestead_core::terrain::TileMap;
use homestead_core::vehicles::DraftAnimal;

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// The engine rejected part of the scenario, such as an unknown
    /// definition id or a building outside the map.
    #[error("Failed to build scenario: {0}")]
    Core(#[from] CoreError),
    /// A road, bridge, or fill tile lies outside the map.
    #[error("Tile ({x}, {z}) is outside the {width}x{height} map")]
    TileOutOfBounds {
        /// Tile x coordinate.
        x: u32,
        /// Tile z coordinate.
        z: u32,
        /// Map width in tiles.
        width: u32,
        /// Map height in tiles.
        height: u32,
    },
    /// A stock entry or schedule stop references a tile with no building.
    #[error("No complex member at tile ({x}, {z})")]
    NoComplexAt {
        /// Tile x coordinate.
        x: u32,
        /// Tile z coordinate.
        z: u32,
    },
}

/// A tile rectangle given as a min corner plus a size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillRect {
    /// Minimum corner tile (x, z).
    pub min: (u32, u32),
    /// Extent in tiles (width, height).
    pub size: (u32, u32),
}

impl FillRect {
    /// Create a new fill rectangle.
    #[must_use]
    pub const fn new(x: u32, z: u32, width: u32, height: u32) -> Self {
        Self {
            min: (x, z),
            size: (width, height),
        }
    }

    /// The equivalent inclusive tile rectangle.
    #[must_use]
    pub const fn rect(&self) -> TileRect {
        TileRect::from_size(TileCoord::new(self.min.0, self.min.1), self.size.0, self.size.1)
    }
}

/// Map setup: dimensions plus the initial road and bridge network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapSetup {
    /// Map dimensions (width, height) in tiles.
    pub size: (u32, u32),
    /// Edge length of one tile in world units.
    pub tile_size: f64,
    /// Ground elevation applied to every tile.
    pub default_elevation: f64,
    /// Rectangles filled with roads.
    pub road_rects: Vec<FillRect>,
    /// Individual road tiles.
    pub roads: Vec<(u32, u32)>,
    /// Individual bridge tiles.
    pub bridges: Vec<(u32, u32)>,
}

/// Placement of a building at scenario start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildingPlacement {
    /// Building definition id.
    pub kind: String,
    /// Minimum corner tile (x, z) of the footprint.
    pub min_tile: (u32, u32),
}

impl BuildingPlacement {
    /// Create a new building placement.
    #[must_use]
    pub fn new(kind: impl Into<String>, x: u32, z: u32) -> Self {
        Self {
            kind: kind.into(),
            min_tile: (x, z),
        }
    }
}

/// Starting stock granted to the complex covering a tile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockEntry {
    /// Any tile covered by a member of the target complex.
    pub tile: (u32, u32),
    /// Item definition id.
    pub item: String,
    /// Units to add.
    pub count: u32,
}

impl StockEntry {
    /// Create a new stock entry.
    #[must_use]
    pub fn new(x: u32, z: u32, item: impl Into<String>, count: u32) -> Self {
        Self {
            tile: (x, z),
            item: item.into(),
            count,
        }
    }
}

/// One stop in a scenario carriage's schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleStop {
    /// Any tile covered by a member of the complex to visit.
    pub tile: (u32, u32),
    /// What to move on arrival.
    pub action: TargetAction,
    /// Item definition id.
    pub item: String,
}

impl ScheduleStop {
    /// Create a new schedule stop.
    #[must_use]
    pub fn new(x: u32, z: u32, action: TargetAction, item: impl Into<String>) -> Self {
        Self {
            tile: (x, z),
            action,
            item: item.into(),
        }
    }
}

/// A carriage spawned at scenario start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarriagePlacement {
    /// Vehicle definition id.
    pub vehicle: String,
    /// Spawn position in world units (x, y, z).
    pub position: (f64, f64, f64),
    /// Cyclic load/put schedule.
    pub schedule: Vec<ScheduleStop>,
}

/// A complete scenario configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Simulation seed.
    pub seed: u64,
    /// Map setup.
    pub map: MapSetup,
    /// Buildings placed before the first tick.
    pub buildings: Vec<BuildingPlacement>,
    /// Starting stocks, applied after buildings are placed.
    pub stocks: Vec<StockEntry>,
    /// Carriages spawned before the first tick.
    pub carriages: Vec<CarriagePlacement>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            name: "Farm To Mill".to_string(),
            description: "A farm feeding wheat to a mill by carriage".to_string(),
            seed: 42,
            map: MapSetup {
                size: (32, 32),
                tile_size: 1.0,
                default_elevation: 0.0,
                road_rects: vec![FillRect::new(0, 0, 32, 32)],
                roads: vec![],
                bridges: vec![],
            },
            buildings: vec![
                BuildingPlacement::new("farm", 4, 4),
                BuildingPlacement::new("mill", 20, 20),
            ],
            stocks: vec![StockEntry::new(4, 4, "wheat", 10)],
            carriages: vec![CarriagePlacement {
                vehicle: "carriage".to_string(),
                position: (2.5, 0.0, 2.5),
                schedule: vec![
                    ScheduleStop::new(4, 4, TargetAction::LoadFixed(5), "wheat"),
                    ScheduleStop::new(20, 20, TargetAction::PutFixed(5), "wheat"),
                ],
            }],
        }
    }
}

impl Scenario {
    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        let scenario: Scenario = ron::from_str(&contents)?;
        Ok(scenario)
    }

    /// Load from a RON string (useful for embedded scenarios).
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = ron::from_str(ron)?;
        Ok(scenario)
    }

    /// Resolve the scenario into a ready simulation.
    ///
    /// Builds the map, places every building, applies stocks, and spawns
    /// carriages with their schedules resolved to complex handles.
    pub fn build(&self) -> Result<Simulation, ScenarioError> {
        let registry = DataRegistry::new(GameData::builtin())?;
        let (width, height) = self.map.size;
        let mut world = TileMap::new(width, height, self.map.tile_size);

        if self.map.default_elevation != 0.0 {
            for z in 0..height {
                for x in 0..width {
                    world.set_elevation(x, z, self.map.default_elevation);
                }
            }
        }

        for fill in &self.map.road_rects {
            let rect = fill.rect();
            if !world.contains_rect(rect) {
                return Err(ScenarioError::TileOutOfBounds {
                    x: rect.max.x,
                    z: rect.max.z,
                    width,
                    height,
                });
            }
            world.fill_roads(rect);
        }
        for &(x, z) in &self.map.roads {
            if !world.set_road(x, z, true) {
                return Err(ScenarioError::TileOutOfBounds {
                    x,
                    z,
                    width,
                    height,
                });
            }
        }
        for &(x, z) in &self.map.bridges {
            if !world.set_bridge(x, z, true) {
                return Err(ScenarioError::TileOutOfBounds {
                    x,
                    z,
                    width,
                    height,
                });
            }
        }

        let mut sim = Simulation::new(world, self.seed);

        for placement in &self.buildings {
            let def = registry.building(&placement.kind)?;
            let min = TileCoord::new(placement.min_tile.0, placement.min_tile.1);
            sim.place_building(min, def, &registry)?;
        }

        for stock in &self.stocks {
            let tile = TileCoord::new(stock.tile.0, stock.tile.1);
            let item = registry.item_id(&stock.item)?;
            let complex = sim
                .bank()
                .complex_at(tile)
                .ok_or(ScenarioError::NoComplexAt {
                    x: tile.x,
                    z: tile.z,
                })?;
            sim.bank_mut().complex_mut(complex).add_stored(item, stock.count);
        }

        for placement in &self.carriages {
            let def = registry.vehicle(&placement.vehicle)?;
            let params = registry.vehicle_params(&placement.vehicle)?;

            let mut schedule = Vec::with_capacity(placement.schedule.len());
            for stop in &placement.schedule {
                let tile = TileCoord::new(stop.tile.0, stop.tile.1);
                let complex = sim
                    .bank()
                    .complex_at(tile)
                    .ok_or(ScenarioError::NoComplexAt {
                        x: tile.x,
                        z: tile.z,
                    })?;
                let item = registry.item_id(&stop.item)?;
                schedule.push(Target::new(complex, stop.action, item));
            }

            let position = Vec3::new(
                placement.position.0,
                placement.position.1,
                placement.position.2,
            );
            let id = sim.spawn_carriage(position, params);
            if let Some(carriage) = sim.carriage_mut(id) {
                carriage.agent.set_schedule(schedule);
                carriage.animals = def
                    .draft_animals
                    .iter()
                    .copied()
                    .map(DraftAnimal::new)
                    .collect();
            }
        }

        Ok(sim)
    }
}
