//! World, chunk, and chunk-local coordinates.
//!
//! A world is split into columns of [`CHUNK_EDGE`]×[`CHUNK_EDGE`] blocks that
//! span the full world height. A [`BlockPos`] decomposes into a [`ChunkCoord`]
//! (floor division of x/z) and a [`LocalCoord`] (non-negative remainder of x/z,
//! y shifted by the world's minimum height). The decomposition is a bijection
//! for every y inside the world's [`WorldBounds`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Edge length of a chunk column in blocks.
pub const CHUNK_EDGE: i32 = 16;

/// `log2(CHUNK_EDGE)`, used for floor division by shifting.
const CHUNK_SHIFT: u32 = 4;

/// Mask selecting the in-chunk part of an x/z coordinate.
const CHUNK_MASK: i32 = CHUNK_EDGE - 1;

/// Number of flag positions in one horizontal layer of a chunk.
pub const LAYER_AREA: usize = (CHUNK_EDGE * CHUNK_EDGE) as usize;

/// Tallest world height a chunk record may describe.
pub const MAX_WORLD_HEIGHT: u32 = 4096;

/// Opaque name of one independent world.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorldId(String);

impl WorldId {
    /// Creates a world identifier from its name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The world name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for WorldId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for WorldId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Absolute block position in a world.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The neighbouring position one block along `direction`, or `None` past
    /// the edge of the coordinate range.
    pub fn offset(self, direction: Direction) -> Option<Self> {
        let (dx, dy, dz) = direction.offset();
        Some(Self::new(
            self.x.checked_add(dx)?,
            self.y.checked_add(dy)?,
            self.z.checked_add(dz)?,
        ))
    }

    /// The chunk column containing this position.
    pub fn chunk(self) -> ChunkCoord {
        ChunkCoord::containing(self.x, self.z)
    }
}

/// Identifies a chunk column by its chunk-grid x/z.
///
/// Ordering is by `cx` then `cz`; bulk operations lock chunks in this order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkCoord {
    pub cx: i32,
    pub cz: i32,
}

impl ChunkCoord {
    pub fn new(cx: i32, cz: i32) -> Self {
        Self { cx, cz }
    }

    /// The chunk containing world column `(x, z)` (floor division by 16).
    pub fn containing(x: i32, z: i32) -> Self {
        Self {
            cx: x >> CHUNK_SHIFT,
            cz: z >> CHUNK_SHIFT,
        }
    }

    /// The chunk offset by `(dx, dz)` chunk units.
    pub fn offset(self, dx: i32, dz: i32) -> Self {
        Self::new(self.cx + dx, self.cz + dz)
    }

    /// World x of this chunk's western edge.
    pub fn origin_x(self) -> i32 {
        self.cx << CHUNK_SHIFT
    }

    /// World z of this chunk's northern edge.
    pub fn origin_z(self) -> i32 {
        self.cz << CHUNK_SHIFT
    }

    /// Squared Euclidean distance in chunk units.
    pub fn distance_sq(self, other: ChunkCoord) -> u64 {
        let dx = i64::from(self.cx) - i64::from(other.cx);
        let dz = i64::from(self.cz) - i64::from(other.cz);
        (dx * dx + dz * dz) as u64
    }

    /// Chebyshev (square-ring) distance in chunk units.
    pub fn ring_distance(self, other: ChunkCoord) -> u32 {
        let dx = (i64::from(self.cx) - i64::from(other.cx)).unsigned_abs();
        let dz = (i64::from(self.cz) - i64::from(other.cz)).unsigned_abs();
        dx.max(dz).min(u64::from(u32::MAX)) as u32
    }
}

impl fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.cx, self.cz)
    }
}

/// Position of a block relative to its chunk origin.
///
/// `lx` and `lz` are in `[0, 16)`; `ly` is in `[0, height)` for the owning
/// world's [`WorldBounds`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LocalCoord {
    pub lx: u8,
    pub ly: u32,
    pub lz: u8,
}

impl LocalCoord {
    pub fn new(lx: u8, ly: u32, lz: u8) -> Self {
        Self { lx, ly, lz }
    }

    /// Decomposes a world position, or `None` when `y` is outside `bounds`.
    pub fn of(pos: BlockPos, bounds: WorldBounds) -> Option<Self> {
        let ly = bounds.layer_of(pos.y)?;
        Some(Self {
            lx: (pos.x & CHUNK_MASK) as u8,
            ly,
            lz: (pos.z & CHUNK_MASK) as u8,
        })
    }

    /// Reassembles the world position from this local coordinate and its chunk.
    pub fn to_world(self, chunk: ChunkCoord, bounds: WorldBounds) -> BlockPos {
        BlockPos::new(
            chunk.origin_x() + i32::from(self.lx),
            bounds.min_y() + self.ly as i32,
            chunk.origin_z() + i32::from(self.lz),
        )
    }

    /// Linear flag index: x varies fastest, then z, then y.
    pub fn index(self) -> usize {
        usize::from(self.lx) + usize::from(self.lz) * CHUNK_EDGE as usize + self.ly as usize * LAYER_AREA
    }

    /// Inverse of [`LocalCoord::index`].
    pub fn from_index(index: usize) -> Self {
        let edge = CHUNK_EDGE as usize;
        Self {
            lx: (index % edge) as u8,
            lz: ((index / edge) % edge) as u8,
            ly: (index / LAYER_AREA) as u32,
        }
    }

    /// Whether this coordinate addresses a block of a chunk in `bounds`.
    pub fn in_bounds(self, bounds: WorldBounds) -> bool {
        i32::from(self.lx) < CHUNK_EDGE && i32::from(self.lz) < CHUNK_EDGE && self.ly < bounds.height()
    }
}

/// Vertical extent of a world: layers `min_y .. min_y + height`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WorldBounds {
    min_y: i32,
    height: u32,
}

impl WorldBounds {
    /// Validates and creates world bounds.
    ///
    /// The height must be in `1..=4096` and the top layer must fit in `i32`.
    pub fn new(min_y: i32, height: u32) -> Result<Self, StoreError> {
        let fits = i64::from(min_y) + i64::from(height) <= i64::from(i32::MAX);
        if height == 0 || height > MAX_WORLD_HEIGHT || !fits {
            return Err(StoreError::InvalidBounds { min_y, height });
        }
        Ok(Self { min_y, height })
    }

    /// Lowest addressable y (inclusive).
    pub fn min_y(self) -> i32 {
        self.min_y
    }

    /// Number of layers.
    pub fn height(self) -> u32 {
        self.height
    }

    /// Highest addressable y (exclusive).
    pub fn max_y(self) -> i32 {
        self.min_y + self.height as i32
    }

    /// Whether `y` is inside the world.
    pub fn contains_y(self, y: i32) -> bool {
        y >= self.min_y && y < self.max_y()
    }

    /// Number of flag positions in one chunk of this world.
    pub fn chunk_volume(self) -> usize {
        LAYER_AREA * self.height as usize
    }

    fn layer_of(self, y: i32) -> Option<u32> {
        self.contains_y(y).then(|| (i64::from(y) - i64::from(self.min_y)) as u32)
    }
}

impl Default for WorldBounds {
    /// The modern overworld: y in `-64..320`.
    fn default() -> Self {
        Self {
            min_y: -64,
            height: 384,
        }
    }
}

impl TryFrom<blockstore_config::WorldBoundsConfig> for WorldBounds {
    type Error = StoreError;

    fn try_from(config: blockstore_config::WorldBoundsConfig) -> Result<Self, Self::Error> {
        Self::new(config.min_y, config.height)
    }
}

/// One of the six axis-aligned unit directions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// -z
    North,
    /// +z
    South,
    /// +x
    East,
    /// -x
    West,
    /// +y
    Up,
    /// -y
    Down,
}

impl Direction {
    /// All six directions.
    pub const ALL: [Direction; 6] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
        Direction::Up,
        Direction::Down,
    ];

    /// Unit offset `(dx, dy, dz)`.
    pub fn offset(self) -> (i32, i32, i32) {
        match self {
            Direction::North => (0, 0, -1),
            Direction::South => (0, 0, 1),
            Direction::East => (1, 0, 0),
            Direction::West => (-1, 0, 0),
            Direction::Up => (0, 1, 0),
            Direction::Down => (0, -1, 0),
        }
    }

    /// The direction pointing the other way.
    pub fn opposite(self) -> Self {
        match self {
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::East => Direction::West,
            Direction::West => Direction::East,
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }

    /// The direction with the given unit offset, if it is one.
    pub fn from_offset(dx: i32, dy: i32, dz: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.offset() == (dx, dy, dz))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
