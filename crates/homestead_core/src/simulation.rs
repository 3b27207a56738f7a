//! Settlement simulation loop.
//!
//! [`Simulation`] owns the terrain, the production complexes, and the
//! carriage fleet, and advances them together under one `update(dt)`
//! call. This module is where the collaborating parts meet: map edits
//! rebuild the obstacle grid and re-route every agent, carriages see
//! the rest of the world only through the [`TransportNetwork`] seam,
//! and the whole state round-trips through the arena save codec.
//!
//! # Determinism
//!
//! Two simulations built with the same world, seed, and operation
//! sequence stay bit-identical:
//! - Complexes update in slot order, carriages in spawn order
//! - All randomness flows through the owned [`SimRng`]
//! - Item stores iterate in key order
//! - [`state_hash`](Simulation::state_hash) digests the full mutable
//!   state for lockstep comparison
//!
//! # Example
//!
//! ```
//! use homestead_core::math::{TileCoord, TileRect};
//! use homestead_core::simulation::Simulation;
//! use homestead_core::terrain::TileMap;
//!
//! let mut world = TileMap::new(16, 16, 1.0);
//! world.fill_roads(TileRect::from_size(TileCoord::new(0, 0), 16, 16));
//!
//! let mut sim = Simulation::new(world, 42);
//! let events = sim.update(0.05);
//! assert!(events.is_empty());
//! assert_eq!(sim.tick(), 1);
//! ```

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path as FilePath;

use crate::agent::{execute_exchange, AgentId, AgentState, Target, TransportNetwork, VehicleParams};
use crate::complex::{ComplexBank, ComplexId, Member};
use crate::data::{BuildingDef, DataRegistry};
use crate::error::{CoreError, Result};
use crate::events::{SimEvent, TickEvents};
use crate::items::ItemStore;
use crate::math::{TileCoord, TileRect, Vec3};
use crate::pathfinding::{find_path, Path};
use crate::rng::SimRng;
use crate::save::{self, SaveData};
use crate::terrain::{ObstacleGrid, TileMap};
use crate::vehicles::Carriage;

/// Placing a building within this centroid distance (in tile units) of
/// an existing complex joins that complex instead of founding a new one.
pub const COMPLEX_JOIN_RADIUS: f64 = 8.0;

/// The carriages' view of the simulation, split-borrowed so agents can
/// path, exchange, and draw jitter while the carriage list itself is
/// being iterated mutably.
struct SimNetwork<'a> {
    grid: &'a ObstacleGrid,
    world: &'a TileMap,
    bank: &'a mut ComplexBank,
    rng: &'a mut SimRng,
}

impl TransportNetwork for SimNetwork<'_> {
    fn is_passable(&self, x: u32, z: u32) -> bool {
        self.grid.is_passable(x, z)
    }

    fn find_path_to(&mut self, start: Vec3, complex: ComplexId) -> Option<Path> {
        let targets = self.bank.get(complex)?.member_footprints();
        find_path(self.grid, self.world, start, &targets, self.rng)
    }

    fn exchange(&mut self, complex: ComplexId, cargo: &mut ItemStore, target: &Target) -> u32 {
        match self.bank.get_mut(complex) {
            Some(c) => execute_exchange(c, cargo, target),
            None => 0,
        }
    }
}

/// The settlement logistics simulation.
///
/// Owns all mutable game state and advances it deterministically. Map
/// edits go through the edit operations below; each one rebuilds the
/// obstacle grid and re-routes every carriage, so agents never walk a
/// stale route.
///
/// # Update Order
///
/// Each `update(dt)` pass runs in this order:
/// 1. **Events** - the previous tick's events are dropped
/// 2. **Production** - every complex advances its conversions
/// 3. **Transport** - every carriage moves, loads, and exchanges
/// 4. **Tick** - the counter increments
///
/// Production resolving before transport means cargo loaded this tick
/// can include items produced this tick.
#[derive(Debug, Clone)]
pub struct Simulation {
    /// Terrain and building occupancy.
    world: TileMap,
    /// Passability snapshot derived from the world.
    grid: ObstacleGrid,
    /// Production complexes.
    bank: ComplexBank,
    /// Carriage fleet in spawn order.
    carriages: Vec<Carriage>,
    /// Seeded generator for waypoint jitter.
    rng: SimRng,
    /// Completed update passes.
    tick: u64,
    /// Events since the start of the last update pass.
    events: TickEvents,
}

impl Simulation {
    /// Create a simulation over a world, building the obstacle grid
    /// immediately.
    ///
    /// The seed fixes the jitter sequence; two simulations with the same
    /// world, seed, and operations evolve identically.
    #[must_use]
    pub fn new(world: TileMap, seed: u64) -> Self {
        let grid = ObstacleGrid::from_world(&world);
        Self {
            world,
            grid,
            bank: ComplexBank::new(),
            carriages: Vec::new(),
            rng: SimRng::new(seed),
            tick: 0,
            events: TickEvents::new(),
        }
    }

    /// Number of completed update passes.
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// The terrain.
    #[must_use]
    pub fn world(&self) -> &TileMap {
        &self.world
    }

    /// The terrain, mutably.
    ///
    /// Direct edits bypass the simulation's bookkeeping: call
    /// [`rebuild_routes`](Self::rebuild_routes) afterwards so the
    /// obstacle grid and agent routes catch up. The named edit
    /// operations ([`place_road`](Self::place_road) and friends) do this
    /// automatically.
    pub fn world_mut(&mut self) -> &mut TileMap {
        &mut self.world
    }

    /// The current passability snapshot.
    #[must_use]
    pub fn grid(&self) -> &ObstacleGrid {
        &self.grid
    }

    /// The production complexes.
    #[must_use]
    pub fn bank(&self) -> &ComplexBank {
        &self.bank
    }

    /// The production complexes, mutably.
    pub fn bank_mut(&mut self) -> &mut ComplexBank {
        &mut self.bank
    }

    /// The carriage fleet in spawn order.
    #[must_use]
    pub fn carriages(&self) -> &[Carriage] {
        &self.carriages
    }

    /// The carriage with the given id.
    #[must_use]
    pub fn carriage(&self, id: AgentId) -> Option<&Carriage> {
        self.carriages.get(id.index())
    }

    /// The carriage with the given id, mutably.
    pub fn carriage_mut(&mut self, id: AgentId) -> Option<&mut Carriage> {
        self.carriages.get_mut(id.index())
    }

    /// The events recorded since the start of the last update pass.
    ///
    /// Edit operations between updates append here too; the collection
    /// is dropped when the next update begins.
    #[must_use]
    pub const fn events(&self) -> &TickEvents {
        &self.events
    }

    /// Advance the simulation by `dt` seconds.
    ///
    /// Returns the events of this pass; they stay readable through
    /// [`events`](Self::events) until the next update.
    pub fn update(&mut self, dt: f64) -> &TickEvents {
        self.events.clear();

        // 1. Production: conversions fire against the shared stores
        self.bank.update(dt, &mut self.events);

        // 2. Transport: carriages walk routes and exchange cargo
        let mut net = SimNetwork {
            grid: &self.grid,
            world: &self.world,
            bank: &mut self.bank,
            rng: &mut self.rng,
        };
        for carriage in &mut self.carriages {
            carriage.update(dt, &mut net, &mut self.events);
        }

        self.tick += 1;

        #[cfg(debug_assertions)]
        {
            let hash = self.state_hash();
            tracing::debug!(
                tick = self.tick,
                state_hash = hash,
                events = self.events.len(),
                "tick complete"
            );
        }

        &self.events
    }

    /// Lay a road on a tile.
    ///
    /// Returns `false` if the tile is out of bounds. On success the
    /// obstacle grid is rebuilt and every carriage re-routes.
    pub fn place_road(&mut self, x: u32, z: u32) -> bool {
        if self.world.set_road(x, z, true) {
            self.rebuild_routes();
            true
        } else {
            false
        }
    }

    /// Remove the road from a tile.
    ///
    /// Returns `false` if the tile is out of bounds. On success the
    /// obstacle grid is rebuilt and every carriage re-routes; a carriage
    /// whose only route crossed this tile goes lost.
    pub fn remove_road(&mut self, x: u32, z: u32) -> bool {
        if self.world.set_road(x, z, false) {
            self.rebuild_routes();
            true
        } else {
            false
        }
    }

    /// Set or clear a bridge span on a tile.
    ///
    /// Returns `false` if the tile is out of bounds. On success the
    /// obstacle grid is rebuilt and every carriage re-routes.
    pub fn set_bridge(&mut self, x: u32, z: u32, bridge: bool) -> bool {
        if self.world.set_bridge(x, z, bridge) {
            self.rebuild_routes();
            true
        } else {
            false
        }
    }

    /// Place a building with its minimum tile at `min_tile`.
    ///
    /// The building joins the nearest complex within
    /// [`COMPLEX_JOIN_RADIUS`] of its anchor, or founds a new one. Its
    /// footprint is marked occupied, the obstacle grid is rebuilt, and
    /// every carriage re-routes.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TileOutOfBounds`] if the footprint leaves
    /// the map, or [`CoreError::DataError`] if the definition references
    /// an unknown item.
    pub fn place_building(
        &mut self,
        min_tile: TileCoord,
        def: &BuildingDef,
        registry: &DataRegistry,
    ) -> Result<ComplexId> {
        let (width, height) = def.footprint;
        let footprint = TileRect::from_size(min_tile, width, height);
        if !self.world.contains_rect(footprint) {
            return Err(CoreError::TileOutOfBounds {
                x: min_tile.x,
                z: min_tile.z,
                width: self.world.width(),
                height: self.world.height(),
            });
        }
        let conversions = registry.conversions_for(def)?;

        let id = match self.bank.closest_to(min_tile) {
            Some(id) if self.bank.complex(id).center_distance(min_tile) <= COMPLEX_JOIN_RADIUS => {
                id
            }
            _ => {
                let id = self.bank.create_complex();
                self.events.push(SimEvent::ComplexCreated { complex: id });
                id
            }
        };
        self.bank
            .complex_mut(id)
            .add_member(min_tile, Member::new(footprint).with_conversions(conversions));
        self.world.set_occupied(footprint, true);
        tracing::info!(
            building = %def.id,
            x = min_tile.x,
            z = min_tile.z,
            complex = id.0,
            "building placed"
        );
        self.rebuild_routes();
        Ok(id)
    }

    /// Demolish the building covering `tile`.
    ///
    /// Frees the footprint, rebuilds the grid, and re-routes every
    /// carriage. A complex losing its last member is deleted and its
    /// slot recycled.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MemberNotFound`] if no building covers the
    /// tile.
    pub fn demolish_building(&mut self, tile: TileCoord) -> Result<()> {
        let id = self.bank.complex_at(tile).ok_or(CoreError::MemberNotFound {
            x: tile.x,
            z: tile.z,
        })?;
        let complex = self.bank.complex_mut(id);
        let (anchor, footprint) = match complex.member_covering(tile) {
            Some((anchor, member)) => (anchor, member.footprint()),
            None => {
                return Err(CoreError::MemberNotFound {
                    x: tile.x,
                    z: tile.z,
                })
            }
        };
        complex.remove_member(anchor);
        let emptied = complex.is_empty();
        self.world.set_occupied(footprint, false);
        if emptied {
            self.bank.delete_complex(id);
            self.events.push(SimEvent::ComplexDeleted { complex: id });
        }
        tracing::info!(x = tile.x, z = tile.z, complex = id.0, "building demolished");
        self.rebuild_routes();
        Ok(())
    }

    /// Rebuild the obstacle grid from the world and re-route every
    /// carriage.
    ///
    /// Called by every edit operation; call it directly after mutating
    /// the terrain through [`world_mut`](Self::world_mut).
    pub fn rebuild_routes(&mut self) {
        self.grid.fill_obstacle_data(&self.world);
        self.refind_all_paths();
    }

    /// Drop every carriage's route and search a fresh one toward its
    /// current target.
    ///
    /// A carriage that finds a route goes `Travelling`; one that cannot
    /// goes `Lost` and reports once. Carriages without a schedule are
    /// untouched.
    pub fn refind_all_paths(&mut self) {
        let mut net = SimNetwork {
            grid: &self.grid,
            world: &self.world,
            bank: &mut self.bank,
            rng: &mut self.rng,
        };
        for carriage in &mut self.carriages {
            carriage.agent.clear_path();
            carriage.agent.try_find_path(&mut net, &mut self.events);
        }
    }

    /// Spawn a carriage at a world position.
    ///
    /// Ids are assigned in spawn order and stay dense; carriages are
    /// never despawned.
    pub fn spawn_carriage(&mut self, position: Vec3, params: VehicleParams) -> AgentId {
        #[allow(clippy::cast_possible_truncation)]
        let id = AgentId::new(self.carriages.len() as u32);
        self.carriages.push(Carriage::new(id, position, params));
        tracing::debug!(agent = id.0, "carriage spawned");
        id
    }

    /// Digest the full mutable state into one value.
    ///
    /// Two simulations in lockstep produce the same hash every tick;
    /// the determinism harness and desync checks compare these instead
    /// of whole states. Iteration follows slot, key, and spawn order,
    /// so the digest is reproducible.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        self.tick.hash(&mut hasher);
        self.rng.state().hash(&mut hasher);

        let slots = self.bank.slots();
        slots.len().hash(&mut hasher);
        for slot in slots {
            match slot {
                Some(complex) => {
                    1u8.hash(&mut hasher);
                    for (tile, member) in complex.members() {
                        tile.x.hash(&mut hasher);
                        tile.z.hash(&mut hasher);
                        for conversion in member.conversions() {
                            conversion.elapsed().to_bits().hash(&mut hasher);
                        }
                    }
                    for (item, count) in complex.storage().iter() {
                        item.as_u16().hash(&mut hasher);
                        count.hash(&mut hasher);
                    }
                }
                None => 0u8.hash(&mut hasher),
            }
        }

        self.carriages.len().hash(&mut hasher);
        for carriage in &self.carriages {
            let agent = &carriage.agent;
            agent.id.0.hash(&mut hasher);
            agent.position.x.to_bits().hash(&mut hasher);
            agent.position.y.to_bits().hash(&mut hasher);
            agent.position.z.to_bits().hash(&mut hasher);
            agent.yaw.to_bits().hash(&mut hasher);
            let state = match agent.state {
                AgentState::Travelling => 0u8,
                AgentState::Loading => 1u8,
                AgentState::Lost => 2u8,
            };
            state.hash(&mut hasher);
            agent.current_target_index().hash(&mut hasher);
            agent.path_progress().to_bits().hash(&mut hasher);
            for (item, count) in agent.items.iter() {
                item.as_u16().hash(&mut hasher);
                count.hash(&mut hasher);
            }
        }

        hasher.finish()
    }

    /// Serialize the simulation into a save buffer.
    ///
    /// The terrain is not included; [`load`](Self::load) takes the world
    /// separately and re-stamps building occupancy from the bank.
    #[must_use]
    pub fn save(&self) -> Vec<u8> {
        save::encode(self.tick, self.rng.state(), &self.bank, &self.carriages)
    }

    /// Rebuild a simulation from a save buffer over a terrain-only
    /// world.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CorruptSave`] or
    /// [`CoreError::UnsupportedSaveVersion`] if the buffer does not
    /// decode.
    pub fn load(world: TileMap, bytes: &[u8]) -> Result<Self> {
        let data = save::decode(bytes)?;
        Ok(Self::from_save(world, data))
    }

    /// Rebuild a simulation from decoded save data.
    ///
    /// Member footprints are stamped back into the world's occupancy
    /// before the obstacle grid is derived, so a loaded simulation sees
    /// the same passability the saved one did.
    #[must_use]
    pub fn from_save(mut world: TileMap, data: SaveData) -> Self {
        for (_, complex) in data.bank.iter() {
            for (_, member) in complex.members() {
                world.set_occupied(member.footprint(), true);
            }
        }
        let grid = ObstacleGrid::from_world(&world);
        Self {
            world,
            grid,
            bank: data.bank,
            carriages: data.carriages,
            rng: SimRng::new(data.rng_state),
            tick: data.tick,
            events: TickEvents::new(),
        }
    }

    /// Save the simulation to a file.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Io`] if the file cannot be written.
    pub fn save_to_file<P: AsRef<FilePath>>(&self, path: P) -> Result<()> {
        save::save_to_file(path, &self.save())
    }

    /// Load a simulation from a file over a terrain-only world.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Io`] if the file cannot be read, or a decode
    /// error as in [`load`](Self::load).
    pub fn load_from_file<P: AsRef<FilePath>>(world: TileMap, path: P) -> Result<Self> {
        let data = save::load_from_file(path)?;
        Ok(Self::from_save(world, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::TargetAction;
    use crate::complex::Conversion;
    use crate::data::GameData;
    use crate::items::{ItemCount, ItemId};

    const WHEAT: ItemId = ItemId::new(0);

    fn open_world(size: u32) -> TileMap {
        let mut world = TileMap::new(size, size, 1.0);
        world.fill_roads(TileRect::from_size(TileCoord::new(0, 0), size, size));
        world
    }

    fn registry() -> DataRegistry {
        DataRegistry::new(GameData::builtin()).unwrap()
    }

    fn warehouse() -> BuildingDef {
        registry().building("warehouse").unwrap().clone()
    }

    /// Two distant storage-only complexes and a carriage shuttling
    /// between them.
    fn shuttle_sim() -> (Simulation, ComplexId, ComplexId, AgentId) {
        let registry = registry();
        let def = warehouse();
        let mut sim = Simulation::new(open_world(24), 7);

        let a = sim
            .place_building(TileCoord::new(2, 2), &def, &registry)
            .unwrap();
        let b = sim
            .place_building(TileCoord::new(16, 16), &def, &registry)
            .unwrap();
        assert_ne!(a, b);
        sim.bank_mut().complex_mut(a).add_stored(WHEAT, 3);

        let id = sim.spawn_carriage(Vec3::new(0.5, 0.0, 0.5), Carriage::DEFAULT_PARAMS);
        sim.carriage_mut(id).unwrap().agent.set_schedule(vec![
            Target::new(a, TargetAction::LoadFixed(5), WHEAT),
            Target::new(b, TargetAction::PutFixed(5), WHEAT),
        ]);
        (sim, a, b, id)
    }

    #[test]
    fn test_new_simulation_is_empty() {
        let sim = Simulation::new(open_world(8), 1);
        assert_eq!(sim.tick(), 0);
        assert!(sim.carriages().is_empty());
        assert_eq!(sim.bank().live_count(), 0);
        assert!(sim.events().is_empty());
    }

    #[test]
    fn test_update_increments_tick_and_clears_events() {
        let registry = registry();
        let mut sim = Simulation::new(open_world(12), 1);
        sim.place_building(TileCoord::new(2, 2), &warehouse(), &registry)
            .unwrap();
        assert!(sim
            .events()
            .events()
            .iter()
            .any(|e| matches!(e, SimEvent::ComplexCreated { .. })));

        sim.update(0.1);
        assert_eq!(sim.tick(), 1);
        // A storage-only complex produces nothing, so the pass is quiet
        assert!(sim.events().is_empty());
    }

    #[test]
    fn test_carriage_delivers_between_complexes() {
        let (mut sim, a, b, id) = shuttle_sim();

        for _ in 0..200 {
            sim.update(0.5);
        }

        // LoadFixed(5) clamps to the 3 in stock; the full load arrives
        assert_eq!(sim.bank().complex(a).stored_count(WHEAT), 0);
        assert_eq!(sim.bank().complex(b).stored_count(WHEAT), 3);
        let carriage = sim.carriage(id).unwrap();
        assert_eq!(carriage.agent.items.count(WHEAT), 0);
    }

    #[test]
    fn test_join_radius_clusters_buildings() {
        let registry = registry();
        let def = warehouse();
        let mut sim = Simulation::new(open_world(20), 1);

        let first = sim
            .place_building(TileCoord::new(2, 2), &def, &registry)
            .unwrap();
        // (7, 7) is ~7.1 tiles from the centroid at (2, 2): joins
        let second = sim
            .place_building(TileCoord::new(7, 7), &def, &registry)
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(sim.bank().complex(first).member_count(), 2);

        // (16, 16) is ~16.3 tiles from the centroid at (4.5, 4.5): new
        let third = sim
            .place_building(TileCoord::new(16, 16), &def, &registry)
            .unwrap();
        assert_ne!(first, third);
        assert_eq!(sim.bank().live_count(), 2);
    }

    #[test]
    fn test_place_building_rejects_out_of_bounds() {
        let registry = registry();
        let mut sim = Simulation::new(open_world(10), 1);

        // 4x4 warehouse at (8, 8) would reach (11, 11)
        let err = sim
            .place_building(TileCoord::new(8, 8), &warehouse(), &registry)
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::TileOutOfBounds {
                x: 8,
                z: 8,
                width: 10,
                height: 10
            }
        ));
        assert_eq!(sim.bank().live_count(), 0);
        assert!(sim.events().is_empty());
    }

    #[test]
    fn test_building_occupancy_blocks_and_frees_tiles() {
        let registry = registry();
        let mut sim = Simulation::new(open_world(12), 1);

        sim.place_building(TileCoord::new(3, 3), &warehouse(), &registry)
            .unwrap();
        assert!(!sim.grid().is_passable(4, 4));
        assert!(sim.grid().is_passable(2, 3));

        sim.demolish_building(TileCoord::new(4, 4)).unwrap();
        assert!(sim.grid().is_passable(4, 4));
    }

    #[test]
    fn test_demolish_recycles_complex_slot() {
        let registry = registry();
        let def = warehouse();
        let mut sim = Simulation::new(open_world(12), 1);

        let id = sim
            .place_building(TileCoord::new(3, 3), &def, &registry)
            .unwrap();
        // Any covered tile demolishes, not just the anchor
        sim.demolish_building(TileCoord::new(5, 5)).unwrap();
        assert!(sim.bank().get(id).is_none());
        assert!(sim
            .events()
            .events()
            .iter()
            .any(|e| matches!(e, SimEvent::ComplexDeleted { complex } if *complex == id)));

        let err = sim.demolish_building(TileCoord::new(5, 5)).unwrap_err();
        assert!(matches!(err, CoreError::MemberNotFound { x: 5, z: 5 }));

        // The freed slot is reused by the next placement
        let again = sim
            .place_building(TileCoord::new(3, 3), &def, &registry)
            .unwrap();
        assert_eq!(again, id);
    }

    #[test]
    fn test_road_edit_loses_and_recovers_carriage() {
        let registry = registry();
        let mut world = TileMap::new(12, 3, 1.0);
        world.fill_roads(TileRect::from_size(TileCoord::new(0, 1), 12, 1));
        let mut sim = Simulation::new(world, 3);

        // Storage shed at the far end of the single road
        let shed = BuildingDef::new("shed", "building.shed");
        let target = sim
            .place_building(TileCoord::new(11, 1), &shed, &registry)
            .unwrap();

        let id = sim.spawn_carriage(Vec3::new(0.5, 0.0, 1.5), Carriage::DEFAULT_PARAMS);
        sim.carriage_mut(id)
            .unwrap()
            .agent
            .set_schedule(vec![Target::new(target, TargetAction::LoadFixed(1), WHEAT)]);

        sim.update(0.1);
        assert_eq!(sim.carriage(id).unwrap().agent.state, AgentState::Travelling);
        assert!(sim.carriage(id).unwrap().agent.path().is_some());

        // Cutting the only road strands the carriage immediately
        assert!(sim.remove_road(5, 1));
        assert_eq!(sim.carriage(id).unwrap().agent.state, AgentState::Lost);
        assert!(sim
            .events()
            .events()
            .iter()
            .any(|e| matches!(e, SimEvent::PathNotFound { agent } if *agent == id)));

        // Restoring it routes the carriage again in the same call
        assert!(sim.place_road(5, 1));
        assert_eq!(sim.carriage(id).unwrap().agent.state, AgentState::Travelling);
        assert!(sim.carriage(id).unwrap().agent.path().is_some());
    }

    #[test]
    fn test_bridge_spans_route_traffic() {
        let mut world = TileMap::new(7, 1, 1.0);
        world.set_road(0, 0, true);
        world.set_road(1, 0, true);
        world.set_road(5, 0, true);
        world.set_road(6, 0, true);
        let mut sim = Simulation::new(world, 1);

        assert!(!sim.grid().is_passable(3, 0));
        sim.set_bridge(2, 0, true);
        sim.set_bridge(3, 0, true);
        sim.set_bridge(4, 0, true);
        assert!(sim.grid().is_passable(3, 0));

        sim.set_bridge(3, 0, false);
        assert!(!sim.grid().is_passable(3, 0));
    }

    #[test]
    fn test_production_resolves_before_transport() {
        let mut sim = Simulation::new(open_world(8), 1);

        // Producer one update away from firing, empty store
        let id = sim.bank_mut().create_complex();
        let tile = TileCoord::new(2, 2);
        let mut producing = Conversion::new(Vec::new(), vec![ItemCount::new(1, WHEAT)], 1.0);
        producing.set_elapsed(0.95);
        sim.bank_mut().complex_mut(id).add_member(
            tile,
            Member::new(TileRect::single(tile)).with_conversions(vec![producing]),
        );

        // Carriage parked at the member, ready to exchange this pass
        let agent_id = sim.spawn_carriage(Vec3::new(1.5, 0.0, 2.5), Carriage::DEFAULT_PARAMS);
        let carriage = sim.carriage_mut(agent_id).unwrap();
        carriage
            .agent
            .set_schedule(vec![Target::new(id, TargetAction::LoadFixed(1), WHEAT)]);
        carriage.agent.state = AgentState::Loading;
        carriage.agent.load_timer = 5.0;

        sim.update(0.1);

        // The wheat produced this pass was loaded this pass
        assert_eq!(sim.carriage(agent_id).unwrap().agent.items.count(WHEAT), 1);
        assert_eq!(sim.bank().complex(id).stored_count(WHEAT), 0);
        let events = sim.events().events();
        assert!(matches!(events[0], SimEvent::ConversionCompleted { .. }));
        assert!(matches!(events[1], SimEvent::ExchangeCompleted { .. }));
    }

    #[test]
    fn test_spawn_ids_are_sequential() {
        let mut sim = Simulation::new(open_world(8), 1);
        let a = sim.spawn_carriage(Vec3::new(0.5, 0.0, 0.5), Carriage::DEFAULT_PARAMS);
        let b = sim.spawn_carriage(Vec3::new(1.5, 0.0, 1.5), Carriage::DEFAULT_PARAMS);
        let c = sim.spawn_carriage(Vec3::new(2.5, 0.0, 2.5), Carriage::DEFAULT_PARAMS);

        assert_eq!((a.0, b.0, c.0), (0, 1, 2));
        assert_eq!(sim.carriages().len(), 3);
        assert_eq!(sim.carriage(b).unwrap().agent.id, b);
        assert!(sim.carriage(AgentId::new(9)).is_none());
    }

    #[test]
    fn test_world_mut_edits_take_effect_after_rebuild() {
        let mut sim = Simulation::new(open_world(8), 1);
        assert!(sim.grid().is_passable(4, 4));

        sim.world_mut().set_road(4, 4, false);
        // The grid is a snapshot; stale until rebuilt
        assert!(sim.grid().is_passable(4, 4));

        sim.rebuild_routes();
        assert!(!sim.grid().is_passable(4, 4));
    }

    #[test]
    fn test_lockstep_simulations_stay_identical() {
        let (mut left, ..) = shuttle_sim();
        let (mut right, ..) = shuttle_sim();
        assert_eq!(left.state_hash(), right.state_hash());

        for step in 0..200 {
            left.update(0.1);
            right.update(0.1);
            assert_eq!(
                left.state_hash(),
                right.state_hash(),
                "diverged at step {step}"
            );
        }
    }

    #[test]
    fn test_different_seeds_diverge() {
        let a = Simulation::new(open_world(8), 1);
        let b = Simulation::new(open_world(8), 2);
        assert_ne!(a.state_hash(), b.state_hash());
    }

    #[test]
    fn test_save_load_resumes_mid_flight() {
        let (mut sim, ..) = shuttle_sim();
        for _ in 0..37 {
            sim.update(0.25);
        }

        let bytes = sim.save();
        // Loading gets terrain only; buildings come back from the save
        let mut restored = Simulation::load(open_world(24), &bytes).unwrap();

        assert_eq!(restored.tick(), sim.tick());
        assert_eq!(restored.state_hash(), sim.state_hash());

        // Both continue in lockstep, so the restored grid and rng match
        for step in 0..50 {
            sim.update(0.25);
            restored.update(0.25);
            assert_eq!(
                sim.state_hash(),
                restored.state_hash(),
                "diverged at step {step}"
            );
        }
    }

    #[test]
    fn test_save_load_file_round_trip() {
        let (mut sim, ..) = shuttle_sim();
        for _ in 0..10 {
            sim.update(0.5);
        }

        let path = std::env::temp_dir().join("homestead_sim_round_trip.save");
        sim.save_to_file(&path).unwrap();
        let restored = Simulation::load_from_file(open_world(24), &path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(restored.state_hash(), sim.state_hash());
    }

    #[test]
    fn test_load_rejects_wrong_version() {
        let (sim, ..) = shuttle_sim();
        let mut bytes = sim.save();
        bytes[4..8].copy_from_slice(&99u32.to_le_bytes());

        let err = Simulation::load(open_world(24), &bytes).unwrap_err();
        assert!(matches!(
            err,
            CoreError::UnsupportedSaveVersion {
                found: 99,
                expected: 1
            }
        ));
    }
}
