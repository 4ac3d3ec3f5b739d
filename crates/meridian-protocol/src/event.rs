use serde::{Deserialize, Serialize};

use crate::{CityId, PlayerId, Pos, SessionStatus, TerrainId, TurnPhase, UnitId, UnitTypeId};

/// Addressing for an outbound event. Visibility-filtered data must only ever
/// be addressed to the player allowed to see it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventScope {
    /// Everyone in the session.
    Session,
    /// One specific player.
    Player(PlayerId),
}

/// All sim→client events. Fully serializable; the transport layer decides
/// framing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // Session flow
    SessionStatusChanged {
        status: SessionStatus,
    },
    TurnStarted {
        turn: u32,
    },
    PhaseChanged {
        turn: u32,
        phase: TurnPhase,
    },

    // Players
    PlayerConnected {
        player: PlayerId,
    },
    PlayerDisconnected {
        player: PlayerId,
    },
    TurnEnded {
        player: PlayerId,
    },

    // Units
    UnitCreated {
        unit: UnitId,
        type_id: UnitTypeId,
        pos: Pos,
        owner: PlayerId,
    },
    UnitMoved {
        unit: UnitId,
        path: Vec<Pos>,
        moves_left: i32,
    },
    UnitFortified {
        unit: UnitId,
    },
    UnitDied {
        unit: UnitId,
    },

    // Cities
    CityFounded {
        city: CityId,
        name: String,
        pos: Pos,
        owner: PlayerId,
    },
    CityDestroyed {
        city: CityId,
    },

    // Borders
    BordersChanged {
        /// Tiles whose owner changed, with the new owner (None = unclaimed).
        tiles: Vec<(Pos, Option<PlayerId>)>,
    },

    // Visibility (always player-scoped)
    TileRevealed {
        pos: Pos,
        terrain: TerrainId,
    },
    TileHidden {
        pos: Pos,
    },

    // Feedback to the acting player
    ActionRejected {
        reason: String,
    },
}
