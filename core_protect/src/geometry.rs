//! Axis-aligned box math for claims.
//!
//! Claims are inclusive integer cuboids: a box from (0,0,0) to (15,255,15)
//! covers 16 blocks along each horizontal axis. Two boxes that share a face
//! therefore overlap; adjacency begins one block out.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Horizontal edge length of one spatial-index cell, in blocks.
pub const CELL_SIZE: i32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Spatial-index cell holding this position's horizontal footprint.
    pub fn cell(&self) -> (i32, i32) {
        (self.x.div_euclid(CELL_SIZE), self.z.div_euclid(CELL_SIZE))
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// An axis-aligned inclusive box with `lesser <= greater` componentwise.
///
/// The invariant is established at construction and preserved by every
/// operation; a `ClaimBox` with inverted corners cannot exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimBox {
    lesser: BlockPos,
    greater: BlockPos,
}

impl ClaimBox {
    /// Build a box from any two opposite corners, normalizing per axis.
    pub fn new(a: BlockPos, b: BlockPos) -> Self {
        Self {
            lesser: BlockPos::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            greater: BlockPos::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Build a box that must already be ordered. Returns `None` if any axis
    /// is inverted; used on paths where silent normalization would mask a
    /// caller bug (resize, persistence load).
    pub fn try_new(lesser: BlockPos, greater: BlockPos) -> Option<Self> {
        if lesser.x > greater.x || lesser.y > greater.y || lesser.z > greater.z {
            None
        } else {
            Some(Self { lesser, greater })
        }
    }

    pub fn lesser(&self) -> BlockPos {
        self.lesser
    }

    pub fn greater(&self) -> BlockPos {
        self.greater
    }

    /// Componentwise containment: every point of `inner` lies in `self`.
    pub fn contains(&self, inner: &ClaimBox) -> bool {
        self.lesser.x <= inner.lesser.x
            && self.lesser.y <= inner.lesser.y
            && self.lesser.z <= inner.lesser.z
            && self.greater.x >= inner.greater.x
            && self.greater.y >= inner.greater.y
            && self.greater.z >= inner.greater.z
    }

    pub fn contains_point(&self, point: BlockPos) -> bool {
        point.x >= self.lesser.x
            && point.x <= self.greater.x
            && point.y >= self.lesser.y
            && point.y <= self.greater.y
            && point.z >= self.lesser.z
            && point.z <= self.greater.z
    }

    /// Inclusive interval intersection on all three axes.
    pub fn overlaps(&self, other: &ClaimBox) -> bool {
        self.lesser.x <= other.greater.x
            && self.greater.x >= other.lesser.x
            && self.lesser.y <= other.greater.y
            && self.greater.y >= other.lesser.y
            && self.lesser.z <= other.greater.z
            && self.greater.z >= other.lesser.z
    }

    /// Horizontal footprint in blocks (width x length). Height is not counted:
    /// claim cost and minimum-size rules are surface rules.
    pub fn area(&self) -> u64 {
        let width = (self.greater.x - self.lesser.x) as u64 + 1;
        let length = (self.greater.z - self.lesser.z) as u64 + 1;
        width * length
    }

    pub fn width_x(&self) -> i32 {
        self.greater.x - self.lesser.x + 1
    }

    pub fn width_z(&self) -> i32 {
        self.greater.z - self.lesser.z + 1
    }

    /// Iterate the spatial-index cells this box's footprint touches.
    pub fn cells(&self) -> impl Iterator<Item = (i32, i32)> {
        let cx0 = self.lesser.x.div_euclid(CELL_SIZE);
        let cx1 = self.greater.x.div_euclid(CELL_SIZE);
        let cz0 = self.lesser.z.div_euclid(CELL_SIZE);
        let cz1 = self.greater.z.div_euclid(CELL_SIZE);
        (cx0..=cx1).flat_map(move |cx| (cz0..=cz1).map(move |cz| (cx, cz)))
    }
}
