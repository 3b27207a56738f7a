//! Test fixtures and helpers.
//!
//! Pre-built worlds and simulations for consistent testing across the
//! workspace. Every builder here is deterministic for a given seed, so
//! the determinism harness and benchmarks can share them.

use homestead_core::agent::{Target, TargetAction};
use homestead_core::data::{DataRegistry, GameData};
use homestead_core::math::{TileCoord, TileRect, Vec3};
use homestead_core::simulation::Simulation;
use homestead_core::terrain::TileMap;

/// A validated registry over the built-in base game set.
///
/// # Panics
///
/// Panics if the built-in data set fails validation, which would be a
/// bug in the data itself.
#[must_use]
pub fn builtin_registry() -> DataRegistry {
    DataRegistry::new(GameData::builtin()).unwrap()
}

/// A square map with a road on every tile.
#[must_use]
pub fn open_world(size: u32) -> TileMap {
    let mut world = TileMap::new(size, size, 1.0);
    world.fill_roads(TileRect::from_size(TileCoord::new(0, 0), size, size));
    world
}

/// A fully roaded map crossed by walls with alternating gaps, so routes
/// have to serpentine instead of cutting straight across. Useful for
/// pathfinding stress tests; `size` should be at least 32.
#[must_use]
pub fn walled_world(size: u32) -> TileMap {
    let mut world = open_world(size);
    for (i, x) in (16..size - 8).step_by(16).enumerate() {
        let gap = if i % 2 == 0 { 2 } else { size - 3 };
        for z in 0..size {
            if z.abs_diff(gap) > 1 {
                world.set_occupied(TileRect::single(TileCoord::new(x, z)), true);
            }
        }
    }
    world
}

/// An empty simulation over an open `size` x `size` world.
#[must_use]
pub fn open_simulation(size: u32, seed: u64) -> Simulation {
    Simulation::new(open_world(size), seed)
}

/// Two warehouse complexes on a 64x64 open road grid with `carriages`
/// carriages shuttling wheat from the stocked one at (4, 4) to the
/// empty one at (52, 52).
///
/// # Panics
///
/// Panics if the built-in warehouse definition cannot be placed, which
/// would be a bug in the fixture itself.
#[must_use]
pub fn shuttle_fleet(carriages: u32, seed: u64) -> Simulation {
    let registry = builtin_registry();
    let warehouse = registry.building("warehouse").unwrap().clone();
    let wheat = registry.item_id("wheat").unwrap();
    let params = registry.vehicle_params("carriage").unwrap();

    let mut sim = Simulation::new(open_world(64), seed);
    let source = sim
        .place_building(TileCoord::new(4, 4), &warehouse, &registry)
        .unwrap();
    let sink = sim
        .place_building(TileCoord::new(52, 52), &warehouse, &registry)
        .unwrap();
    sim.bank_mut().complex_mut(source).add_stored(wheat, 100_000);

    for i in 0..carriages {
        let lane = f64::from(i % 8);
        let id = sim.spawn_carriage(Vec3::new(10.0 + lane, 0.0, 12.0), params);
        if let Some(carriage) = sim.carriage_mut(id) {
            carriage.agent.set_schedule(vec![
                Target::new(source, TargetAction::LoadFixed(5), wheat),
                Target::new(sink, TargetAction::PutFixed(5), wheat),
            ]);
        }
    }
    sim
}

#[cfg(test)]
mod tests {
    use super::*;
    use homestead_core::terrain::ObstacleGrid;

    #[test]
    fn test_open_world_is_fully_passable() {
        let world = open_world(8);
        let grid = ObstacleGrid::from_world(&world);
        for x in 0..8 {
            for z in 0..8 {
                assert!(grid.is_passable(x, z));
            }
        }
    }

    #[test]
    fn test_walled_world_blocks_wall_columns() {
        let world = walled_world(48);
        let grid = ObstacleGrid::from_world(&world);
        // First wall sits at x=16 with its gap near z=2
        assert!(!grid.is_passable(16, 24));
        assert!(grid.is_passable(16, 2));
        assert!(grid.is_passable(15, 24));
    }

    #[test]
    fn test_shuttle_fleet_shape() {
        let sim = shuttle_fleet(3, 9);
        assert_eq!(sim.bank().live_count(), 2);
        assert_eq!(sim.carriages().len(), 3);
        for carriage in sim.carriages() {
            assert_eq!(carriage.agent.schedule().len(), 2);
        }
    }

    #[test]
    fn test_shuttle_fleet_delivers() {
        let registry = builtin_registry();
        let wheat = registry.item_id("wheat").unwrap();
        let mut sim = shuttle_fleet(2, 9);
        let sink = sim.bank().complex_at(TileCoord::new(52, 52)).unwrap();

        // ~100 seconds covers the ~68 unit diagonal round trip
        for _ in 0..2_000 {
            sim.update(0.05);
        }
        assert!(sim.bank().complex(sink).stored_count(wheat) > 0);
    }
}
