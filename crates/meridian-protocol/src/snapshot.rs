use serde::{Deserialize, Serialize};

use crate::{
    BorderSourceId, BorderSourceKind, CityId, PlayerId, Pos, SessionId, SessionStatus, TerrainId,
    TurnPhase, UnitId, UnitOrders, UnitTypeId,
};

/// Static per-match configuration, fixed at session creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub max_players: u8,
    pub map_width: u32,
    pub map_height: u32,
    /// Named ruleset supplying terrain costs, founding rules, border settings.
    pub ruleset: String,
    /// Seconds per movement phase; None disables the turn timer.
    #[serde(default)]
    pub turn_time_limit_secs: Option<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_players: 4,
            map_width: 64,
            map_height: 64,
            ruleset: "classic".to_string(),
            turn_time_limit_secs: None,
        }
    }
}

/// Persisted state of one session, sufficient to rebuild an equivalent
/// in-memory simulation without re-running the world generator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session: SessionId,
    pub config: SessionConfig,
    pub status: SessionStatus,
    pub turn: u32,
    pub phase: TurnPhase,
    pub players: Vec<PlayerSnapshot>,
    /// Sparse overrides against the all-ocean, unexplored baseline grid.
    pub tile_diffs: Vec<TileDiff>,
    pub units: Vec<UnitSnapshot>,
    pub cities: Vec<CitySnapshot>,
    pub border_sources: Vec<BorderSourceSnapshot>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    pub name: String,
    pub connected: bool,
    pub ready: bool,
    pub turn_ended: bool,
}

/// One tile differing from the baseline. Only the overridden fields are set;
/// `explored_by` is a player-index bitmask (bit n = player n has explored).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TileDiff {
    pub pos: Pos,
    #[serde(default)]
    pub terrain: Option<TerrainId>,
    #[serde(default)]
    pub elevation: Option<u8>,
    #[serde(default)]
    pub river: Option<bool>,
    #[serde(default)]
    pub explored_by: u16,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UnitSnapshot {
    pub id: UnitId,
    pub type_id: UnitTypeId,
    pub owner: PlayerId,
    pub pos: Pos,
    pub moves_left: i32,
    pub fortified: bool,
    #[serde(default)]
    pub orders: Option<UnitOrders>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CitySnapshot {
    pub id: CityId,
    pub name: String,
    pub owner: PlayerId,
    pub pos: Pos,
    pub population: u8,
}

/// Border sources persist by identity; strength and radius are recomputed at
/// replay from the linked city's population and the active ruleset.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BorderSourceSnapshot {
    pub id: BorderSourceId,
    pub pos: Pos,
    pub owner: PlayerId,
    pub kind: BorderSourceKind,
}
