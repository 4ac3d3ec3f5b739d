use serde::{Deserialize, Serialize};

/// Map coordinate on a non-wrapping rectangular grid. `y` grows southward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pos {
    pub x: i32,
    pub y: i32,
}

impl Pos {
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// All eight neighbor offsets, in `Direction` order.
    pub const OFFSETS: [(i32, i32); 8] = [
        (0, -1),  // North
        (1, -1),  // Northeast
        (1, 0),   // East
        (1, 1),   // Southeast
        (0, 1),   // South
        (-1, 1),  // Southwest
        (-1, 0),  // West
        (-1, -1), // Northwest
    ];

    pub fn neighbors(self) -> impl Iterator<Item = Pos> {
        Self::OFFSETS
            .into_iter()
            .map(move |(dx, dy)| Pos::new(self.x + dx, self.y + dy))
    }

    /// Manhattan distance. Used as the pathfinding heuristic.
    #[inline]
    pub fn manhattan(self, other: Pos) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    /// Chebyshev (king-move) distance. Used for city spacing.
    #[inline]
    pub fn chebyshev(self, other: Pos) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }

    /// Squared Euclidean distance. Used for border radii and vision ranges.
    #[inline]
    pub fn distance_sq(self, other: Pos) -> i64 {
        let dx = i64::from(self.x - other.x);
        let dy = i64::from(self.y - other.y);
        dx * dx + dy * dy
    }
}

/// Eight-way compass direction for path steps, reported to clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    North,
    Northeast,
    East,
    Southeast,
    South,
    Southwest,
    West,
    Northwest,
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::North,
        Direction::Northeast,
        Direction::East,
        Direction::Southeast,
        Direction::South,
        Direction::Southwest,
        Direction::West,
        Direction::Northwest,
    ];

    /// Direction of a single step from `from` to `to`, if they are 8-adjacent.
    pub fn between(from: Pos, to: Pos) -> Option<Direction> {
        let delta = (to.x - from.x, to.y - from.y);
        Pos::OFFSETS
            .iter()
            .position(|&o| o == delta)
            .map(|i| Direction::ALL[i])
    }

    #[inline]
    pub fn offset(self) -> (i32, i32) {
        let index = Direction::ALL
            .iter()
            .position(|&d| d == self)
            .unwrap_or(0);
        Pos::OFFSETS[index]
    }
}
