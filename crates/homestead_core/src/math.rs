//! World-space and tile-space math for the logistics engine.
//!
//! World positions are f64 with x/z in the ground plane and y up; tile
//! coordinates are unsigned grid cells. Conversion between the two
//! (`tile * tile_size + sub-tile offset`) lives on the obstacle grid,
//! which knows the tile size.

use serde::{Deserialize, Serialize};

/// World-space position or offset (y is up).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    /// X coordinate (ground plane).
    pub x: f64,
    /// Y coordinate (elevation).
    pub y: f64,
    /// Z coordinate (ground plane).
    pub z: f64,
}

impl Vec3 {
    /// Create a new vector.
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    /// Unit vector pointing along the given yaw in the ground plane.
    ///
    /// Yaw 0 faces +z; positive yaw turns toward +x.
    #[must_use]
    pub fn from_yaw(yaw: f64) -> Self {
        Self::new(yaw.sin(), 0.0, yaw.cos())
    }

    /// Straight-line distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Squared distance (avoids sqrt for comparisons).
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    /// Distance ignoring elevation (ground-plane only).
    #[must_use]
    pub fn horizontal_distance(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        (dx * dx + dz * dz).sqrt()
    }

    /// Linearly interpolate between two points.
    #[must_use]
    pub fn lerp(self, other: Self, t: f64) -> Self {
        Self {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
            z: self.z + (other.z - self.z) * t,
        }
    }
}

impl std::ops::Add for Vec3 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
            z: self.z + rhs.z,
        }
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
            z: self.z - rhs.z,
        }
    }
}

impl std::ops::Mul<f64> for Vec3 {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self::Output {
        Self {
            x: self.x * rhs,
            y: self.y * rhs,
            z: self.z * rhs,
        }
    }
}

/// Yaw and pitch of the direction from one point to another.
///
/// Yaw 0 faces +z with positive yaw toward +x; pitch is the climb angle
/// above the ground plane. Returns (0, 0) for coincident points.
#[must_use]
pub fn heading_between(from: Vec3, to: Vec3) -> (f64, f64) {
    let dx = to.x - from.x;
    let dy = to.y - from.y;
    let dz = to.z - from.z;
    let horizontal = (dx * dx + dz * dz).sqrt();
    if horizontal < f64::EPSILON && dy.abs() < f64::EPSILON {
        return (0.0, 0.0);
    }
    (dx.atan2(dz), dy.atan2(horizontal))
}

/// Unsigned tile coordinate on the terrain grid.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct TileCoord {
    /// Tile column.
    pub x: u32,
    /// Tile row.
    pub z: u32,
}

impl TileCoord {
    /// Create a new tile coordinate.
    #[must_use]
    pub const fn new(x: u32, z: u32) -> Self {
        Self { x, z }
    }

    /// Manhattan distance to another tile.
    #[must_use]
    pub const fn manhattan_distance(self, other: Self) -> u32 {
        self.x.abs_diff(other.x) + self.z.abs_diff(other.z)
    }

    /// Straight-line distance in tile units.
    #[must_use]
    pub fn euclidean_distance(self, other: Self) -> f64 {
        let dx = f64::from(self.x.abs_diff(other.x));
        let dz = f64::from(self.z.abs_diff(other.z));
        (dx * dx + dz * dz).sqrt()
    }
}

/// Inclusive tile-space bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileRect {
    /// Lowest covered tile.
    pub min: TileCoord,
    /// Highest covered tile (inclusive).
    pub max: TileCoord,
}

impl TileRect {
    /// Create a rectangle from corner tiles.
    #[must_use]
    pub const fn new(min: TileCoord, max: TileCoord) -> Self {
        Self { min, max }
    }

    /// Rectangle covering a single tile.
    #[must_use]
    pub const fn single(tile: TileCoord) -> Self {
        Self {
            min: tile,
            max: tile,
        }
    }

    /// Rectangle from a min tile and a footprint size in tiles.
    ///
    /// Zero-sized footprints are treated as 1x1.
    #[must_use]
    pub const fn from_size(min: TileCoord, width: u32, height: u32) -> Self {
        Self {
            min,
            max: TileCoord::new(
                min.x + width.saturating_sub(1),
                min.z + height.saturating_sub(1),
            ),
        }
    }

    /// Whether the rectangle covers the given tile.
    #[must_use]
    pub const fn contains(self, tile: TileCoord) -> bool {
        tile.x >= self.min.x && tile.x <= self.max.x && tile.z >= self.min.z && tile.z <= self.max.z
    }

    /// Sum of per-axis tile distances from the rectangle edge (0 inside).
    ///
    /// A tile one step off along a single axis scores 1; one step off
    /// diagonally scores 2.
    #[must_use]
    pub const fn edge_distance(self, tile: TileCoord) -> u32 {
        let dx = if tile.x < self.min.x {
            self.min.x - tile.x
        } else if tile.x > self.max.x {
            tile.x - self.max.x
        } else {
            0
        };
        let dz = if tile.z < self.min.z {
            self.min.z - tile.z
        } else if tile.z > self.max.z {
            tile.z - self.max.z
        } else {
            0
        };
        dx + dz
    }

    /// Closest covered tile to the given tile (clamped per axis).
    #[must_use]
    pub fn clamp_tile(self, tile: TileCoord) -> TileCoord {
        TileCoord::new(
            tile.x.clamp(self.min.x, self.max.x),
            tile.z.clamp(self.min.z, self.max.z),
        )
    }

    /// Iterate every tile covered by the rectangle, row by row.
    pub fn tiles(self) -> impl Iterator<Item = TileCoord> {
        (self.min.z..=self.max.z)
            .flat_map(move |z| (self.min.x..=self.max.x).map(move |x| TileCoord::new(x, z)))
    }
}
