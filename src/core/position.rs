//! Grid Positions
//!
//! Integer cell coordinates on the cyclic 20x20 match grid.

use serde::{Deserialize, Serialize};

use crate::GRID_SIZE;

/// A cell on the match grid, 0-based.
///
/// Serialized as a `[x, y]` pair to match the snapshot document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "[i32; 2]", into = "[i32; 2]")]
pub struct Position {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl Position {
    /// Create a position.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Add a delta without wrapping.
    pub fn plus(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Correct a single unit of underflow or overflow on either axis.
    ///
    /// Only `-1` and `GRID_SIZE` are rewritten. Moves are unit steps, so a
    /// position is never further than one cell outside the grid.
    pub fn normalized(self) -> Self {
        Self::new(wrap_axis(self.x), wrap_axis(self.y))
    }

    /// Whether the position lies inside the grid.
    pub fn in_bounds(self) -> bool {
        (0..GRID_SIZE).contains(&self.x) && (0..GRID_SIZE).contains(&self.y)
    }

    /// Iterate every cell in row-major order.
    pub fn all() -> impl Iterator<Item = Position> {
        (0..GRID_SIZE).flat_map(|y| (0..GRID_SIZE).map(move |x| Position::new(x, y)))
    }
}

fn wrap_axis(v: i32) -> i32 {
    if v == -1 {
        GRID_SIZE - 1
    } else if v == GRID_SIZE {
        0
    } else {
        v
    }
}

impl From<[i32; 2]> for Position {
    fn from([x, y]: [i32; 2]) -> Self {
        Self::new(x, y)
    }
}

impl From<Position> for [i32; 2] {
    fn from(p: Position) -> Self {
        [p.x, p.y]
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}
