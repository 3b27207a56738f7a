//! Grid-based route search for transport agents.
//!
//! The search is a best-first expansion over the obstacle grid: nodes are
//! ordered by accumulated cost plus a Euclidean estimate to the nearest
//! member tile of the target complex. It is deliberately not strict A*;
//! the greedy combination is the behavior agents are balanced around, and
//! its path shapes are part of the visible game. The search does not stop
//! on a target tile (members occupy their tiles) but on any tile within
//! the loading radius of a member's bounding box.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use serde::{Deserialize, Serialize};

use crate::math::{TileCoord, TileRect, Vec3};
use crate::rng::SimRng;
use crate::terrain::{ObstacleGrid, WorldMap};

/// How far from a member's bounding box an agent may stop and still
/// load, as a per-axis tile distance sum.
const LOADING_RADIUS: u32 = 1;

/// Waypoint jitter as a fraction of tile size, per axis.
const WAYPOINT_JITTER: f64 = 0.05;

/// Expansion cap. Exceeding it means the map is degenerate (or enormous);
/// the search gives up rather than stall the tick.
const MAX_EXPANSIONS: usize = 65_536;

/// Direction offsets for 8-directional movement with step costs in tile
/// units: 1.0 axis-aligned, 1.4 diagonal.
const DIRECTIONS: [(i32, i32, f64); 8] = [
    (1, 0, 1.0),    // East
    (1, 1, 1.4),    // Southeast
    (0, 1, 1.0),    // South
    (-1, 1, 1.4),   // Southwest
    (-1, 0, 1.0),   // West
    (-1, -1, 1.4),  // Northwest
    (0, -1, 1.0),   // North
    (1, -1, 1.4),   // Northeast
];

/// An ordered sequence of world-space waypoints with cached arc lengths.
///
/// Paths are produced once per search and consumed by interpolation as an
/// agent advances its progress; they are never restarted or spliced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path {
    points: Vec<Vec3>,
    /// Arc length from the first point to each point; starts at 0.
    cumulative: Vec<f64>,
}

impl Path {
    /// Build a path from waypoints.
    ///
    /// # Panics
    ///
    /// Panics if `points` is empty; a search always yields at least the
    /// start tile.
    #[must_use]
    pub fn new(points: Vec<Vec3>) -> Self {
        assert!(!points.is_empty(), "Path must have at least one waypoint");
        let mut cumulative = Vec::with_capacity(points.len());
        cumulative.push(0.0);
        for i in 1..points.len() {
            let prev = cumulative[i - 1];
            cumulative.push(prev + points[i - 1].distance(points[i]));
        }
        Self { points, cumulative }
    }

    /// Total arc length in world units.
    #[must_use]
    pub fn length(&self) -> f64 {
        *self.cumulative.last().unwrap_or(&0.0)
    }

    /// Number of waypoints.
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// The waypoints in travel order.
    #[must_use]
    pub fn points(&self) -> &[Vec3] {
        &self.points
    }

    /// The final waypoint.
    #[must_use]
    pub fn end(&self) -> Vec3 {
        self.points[self.points.len() - 1]
    }

    /// Position after travelling `progress` world units along the path.
    ///
    /// Progress is clamped to `[0, length]`.
    #[must_use]
    pub fn position_at(&self, progress: f64) -> Vec3 {
        if self.points.len() == 1 {
            return self.points[0];
        }
        let clamped = progress.clamp(0.0, self.length());
        // First segment whose end lies past the clamped progress
        let i = self
            .cumulative
            .partition_point(|&d| d <= clamped)
            .min(self.points.len() - 1);
        let seg_start = self.cumulative[i - 1];
        let seg_len = self.cumulative[i] - seg_start;
        if seg_len <= f64::EPSILON {
            return self.points[i];
        }
        let t = (clamped - seg_start) / seg_len;
        self.points[i - 1].lerp(self.points[i], t)
    }
}

/// A node in the open-set priority queue.
#[derive(Debug, Clone, Copy)]
struct SearchNode {
    /// Tile coordinates.
    x: u32,
    z: u32,
    /// Accumulated cost plus heuristic estimate.
    score: f64,
    /// Tie-breaker for determinism: lower coordinates first.
    /// This ensures consistent ordering when scores are equal.
    tie_breaker: u64,
}

impl PartialEq for SearchNode {
    fn eq(&self, other: &Self) -> bool {
        self.score.total_cmp(&other.score) == Ordering::Equal
            && self.tie_breaker == other.tie_breaker
    }
}

impl Eq for SearchNode {}

impl Ord for SearchNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap, so we reverse the comparison for min-heap
        // behavior. Lower score = higher priority, so we use other vs self.
        match other.score.total_cmp(&self.score) {
            Ordering::Equal => {
                // Deterministic tie-breaking: prefer lower tie_breaker
                other.tie_breaker.cmp(&self.tie_breaker)
            }
            ord => ord,
        }
    }
}

impl PartialOrd for SearchNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Convert coordinates to a tie-breaker value for deterministic ordering.
#[inline]
fn coords_to_tie_breaker(tile: TileCoord) -> u64 {
    (u64::from(tile.z) << 32) | u64::from(tile.x)
}

/// Euclidean estimate in tile units to the closest covered tile of any
/// target rectangle.
#[inline]
fn heuristic(tile: TileCoord, targets: &[TileRect]) -> f64 {
    targets
        .iter()
        .map(|rect| tile.euclidean_distance(rect.clamp_tile(tile)))
        .fold(f64::INFINITY, f64::min)
}

/// Whether the tile is close enough to some target rectangle to stop and
/// load.
#[inline]
fn within_loading_radius(tile: TileCoord, targets: &[TileRect]) -> bool {
    targets
        .iter()
        .any(|rect| rect.edge_distance(tile) <= LOADING_RADIUS)
}

/// Find a route from a world position to the loading radius of any target
/// rectangle (the member footprints of one complex).
///
/// Returns `None` when the start lies outside the grid, the target list
/// is empty, or no passable tile within the loading radius is reachable.
/// The start tile is admitted to the search even if currently blocked, so
/// an agent stranded by a map edit can still path out.
///
/// Waypoints are tile centers offset by a small random jitter (at most
/// ±5% of tile size per axis) drawn from `rng`, with elevation sampled
/// from the world; the jitter keeps simultaneous agents from overlapping
/// visually.
pub fn find_path(
    grid: &ObstacleGrid,
    world: &impl WorldMap,
    start: Vec3,
    targets: &[TileRect],
    rng: &mut SimRng,
) -> Option<Path> {
    if targets.is_empty() {
        return None;
    }
    let start_tile = grid.world_to_tile(start)?;

    let mut open_set: BinaryHeap<SearchNode> = BinaryHeap::new();
    let mut came_from: HashMap<TileCoord, TileCoord> = HashMap::new();
    let mut g_score: HashMap<TileCoord, f64> = HashMap::new();
    let mut expansions = 0usize;

    g_score.insert(start_tile, 0.0);
    open_set.push(SearchNode {
        x: start_tile.x,
        z: start_tile.z,
        score: heuristic(start_tile, targets),
        tie_breaker: coords_to_tie_breaker(start_tile),
    });

    while let Some(current) = open_set.pop() {
        let tile = TileCoord::new(current.x, current.z);

        if within_loading_radius(tile, targets) {
            return Some(build_path(grid, world, &came_from, tile, rng));
        }

        expansions += 1;
        if expansions > MAX_EXPANSIONS {
            tracing::warn!(
                start_x = start_tile.x,
                start_z = start_tile.z,
                expansions,
                "route search hit the expansion cap, giving up"
            );
            return None;
        }

        let current_g = g_score.get(&tile).copied().unwrap_or(f64::INFINITY);

        for &(dx, dz, step_cost) in &DIRECTIONS {
            let nx = i64::from(current.x) + i64::from(dx);
            let nz = i64::from(current.z) + i64::from(dz);
            if nx < 0 || nz < 0 {
                continue;
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let neighbor = TileCoord::new(nx as u32, nz as u32);

            if !grid.is_passable(neighbor.x, neighbor.z) {
                continue;
            }

            let tentative_g = current_g + step_cost;
            let neighbor_g = g_score.get(&neighbor).copied().unwrap_or(f64::INFINITY);

            if tentative_g < neighbor_g {
                // This route is better
                came_from.insert(neighbor, tile);
                g_score.insert(neighbor, tentative_g);
                open_set.push(SearchNode {
                    x: neighbor.x,
                    z: neighbor.z,
                    score: tentative_g + heuristic(neighbor, targets),
                    tie_breaker: coords_to_tie_breaker(neighbor),
                });
            }
        }
    }

    // Frontier exhausted with no tile inside the loading radius
    None
}

/// Reconstruct the waypoint list from the parent chain, applying jitter
/// and sampling elevation.
fn build_path(
    grid: &ObstacleGrid,
    world: &impl WorldMap,
    came_from: &HashMap<TileCoord, TileCoord>,
    accepted: TileCoord,
    rng: &mut SimRng,
) -> Path {
    let mut tiles = vec![accepted];
    let mut current = accepted;
    while let Some(&prev) = came_from.get(&current) {
        tiles.push(prev);
        current = prev;
    }
    tiles.reverse();

    let jitter_range = grid.tile_size() * WAYPOINT_JITTER;
    let points = tiles
        .into_iter()
        .map(|tile| {
            let center = grid.tile_to_world(tile);
            let x = center.x + rng.jitter(jitter_range);
            let z = center.z + rng.jitter(jitter_range);
            Vec3::new(x, world.elevation_at(x, z), z)
        })
        .collect();
    Path::new(points)
}
