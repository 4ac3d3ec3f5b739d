use serde::{Deserialize, Serialize};

use meridian_protocol::{PlayerId, Pos, UnitOrders, UnitTypeId};

use crate::rules::CompiledRules;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Unit {
    pub type_id: UnitTypeId,
    pub owner: PlayerId,
    pub position: Pos,
    /// Remaining movement this turn. Reset at turn start, never negative.
    pub moves_left: i32,
    pub fortified: bool,
    /// Pending multi-turn orders, resolved at turn start.
    pub orders: Option<UnitOrders>,
}

impl Unit {
    pub fn new(type_id: UnitTypeId, owner: PlayerId, position: Pos, rules: &CompiledRules) -> Self {
        let moves = rules.unit_type(type_id).map_or(0, |t| t.moves);
        Self {
            type_id,
            owner,
            position,
            moves_left: moves,
            fortified: false,
            orders: None,
        }
    }

    /// Per-turn reset: refill movement. Fortified units stay fortified.
    pub fn begin_turn(&mut self, rules: &CompiledRules) {
        self.moves_left = rules.unit_type(self.type_id).map_or(0, |t| t.moves);
    }

    pub fn spend_moves(&mut self, cost: i32) {
        self.moves_left = (self.moves_left - cost).max(0);
    }
}
