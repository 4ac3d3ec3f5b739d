use serde::{Deserialize, Serialize};

use crate::{Pos, UnitId};

/// All player-submitted actions. Applied strictly in arrival order by the
/// session task that owns the match.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Action {
    /// Move a unit along the cheapest path toward `target`, spending this
    /// turn's movement. Leftover distance becomes a Goto continuation order.
    Move { unit: UnitId, target: Pos },
    /// Found a city with the given unit at its current tile.
    FoundCity { unit: UnitId, name: String },
    /// Fortify a unit in place, ending its movement for the turn.
    Fortify { unit: UnitId },
    /// Clear a unit's pending orders.
    ClearOrders { unit: UnitId },
    /// Signal that the player is done moving this turn.
    EndTurn,
}
