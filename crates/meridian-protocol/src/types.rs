use serde::{Deserialize, Serialize};

use crate::{Direction, Pos};

/// Lifecycle state of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SessionStatus {
    #[default]
    Waiting,
    Active,
    Paused,
    Ended,
}

/// Sub-phase of one turn. Movement waits on players; the other two are
/// synchronous server-side passes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TurnPhase {
    #[default]
    Movement,
    Production,
    Cleanup,
}

/// Unit movement class, deciding which terrain a unit may occupy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveClass {
    Land,
    Sea,
    Air,
}

/// Kind of entity projecting territorial claim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BorderSourceKind {
    City,
    Base,
}

/// Pending multi-turn orders on a unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UnitOrders {
    /// Keep walking toward `target` on each turn start until arrival.
    Goto { target: Pos },
    Fortify,
}

/// One step of a computed path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathStep {
    pub pos: Pos,
    /// Movement cost of entering this tile. Zero for the start tile.
    pub cost: i32,
    /// Compass direction of the step, absent for the start tile.
    pub dir: Option<Direction>,
}

/// Result of one pathfinding query. Ephemeral, never persisted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PathResult {
    /// Start tile first, goal tile last. Empty when no path exists.
    pub steps: Vec<PathStep>,
    pub total_cost: i32,
    pub valid: bool,
}

impl PathResult {
    pub fn invalid() -> Self {
        Self {
            steps: Vec::new(),
            total_cost: 0,
            valid: false,
        }
    }

    /// Whole turns needed to walk the path with `moves_per_turn` allowance.
    pub fn turns_to_arrival(&self, moves_per_turn: i32) -> i32 {
        if !self.valid || moves_per_turn <= 0 {
            return 0;
        }
        (self.total_cost + moves_per_turn - 1) / moves_per_turn
    }
}
