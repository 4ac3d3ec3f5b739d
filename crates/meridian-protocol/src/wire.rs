use rmp_serde::{decode, encode};
use thiserror::Error;

use crate::{Action, Event, SessionSnapshot};

#[derive(Debug, Error)]
pub enum WireError {
    #[error("encode error: {0}")]
    Encode(#[from] encode::Error),
    #[error("decode error: {0}")]
    Decode(#[from] decode::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn serialize_action(action: &Action) -> Result<Vec<u8>, WireError> {
    Ok(encode::to_vec(action)?)
}

pub fn deserialize_action(bytes: &[u8]) -> Result<Action, WireError> {
    Ok(decode::from_slice(bytes)?)
}

pub fn serialize_events(events: &[Event]) -> Result<Vec<u8>, WireError> {
    Ok(encode::to_vec(events)?)
}

pub fn deserialize_events(bytes: &[u8]) -> Result<Vec<Event>, WireError> {
    Ok(decode::from_slice(bytes)?)
}

pub fn serialize_snapshot(snapshot: &SessionSnapshot) -> Result<Vec<u8>, WireError> {
    Ok(encode::to_vec(snapshot)?)
}

pub fn deserialize_snapshot(bytes: &[u8]) -> Result<SessionSnapshot, WireError> {
    Ok(decode::from_slice(bytes)?)
}

/// Human-readable snapshot dump, for debugging persisted state.
pub fn snapshot_to_json(snapshot: &SessionSnapshot) -> Result<String, WireError> {
    Ok(serde_json::to_string_pretty(snapshot)?)
}

/// Deterministic snapshot hash for recovery verification and desync checks.
///
/// Hashes the MessagePack-serialized snapshot using FNV-1a 64-bit.
pub fn snapshot_hash(snapshot: &SessionSnapshot) -> Result<u64, WireError> {
    let bytes = serialize_snapshot(snapshot)?;
    Ok(hash_bytes_fnv1a64(&bytes))
}

/// Deterministic, stable 64-bit hash for raw bytes (FNV-1a).
pub fn hash_bytes_fnv1a64(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    let mut hash = OFFSET_BASIS;
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Pos, SessionConfig, SessionId, SessionStatus, TurnPhase, UnitId, UnitTypeId};

    fn sample_snapshot() -> SessionSnapshot {
        SessionSnapshot {
            session: SessionId::new("match-1"),
            config: SessionConfig::default(),
            status: SessionStatus::Active,
            turn: 7,
            phase: TurnPhase::Movement,
            players: Vec::new(),
            tile_diffs: Vec::new(),
            units: vec![crate::UnitSnapshot {
                id: UnitId::new(0, 0),
                type_id: UnitTypeId::new(1),
                owner: crate::PlayerId(0),
                pos: Pos::new(3, 4),
                moves_left: 2,
                fortified: false,
                orders: None,
            }],
            cities: Vec::new(),
            border_sources: Vec::new(),
        }
    }

    #[test]
    fn snapshot_roundtrip() {
        let snapshot = sample_snapshot();
        let bytes = serialize_snapshot(&snapshot).expect("encode");
        let back = deserialize_snapshot(&bytes).expect("decode");
        assert_eq!(back.turn, 7);
        assert_eq!(back.units.len(), 1);
        assert_eq!(back.units[0].pos, Pos::new(3, 4));
    }

    #[test]
    fn snapshot_hash_is_stable() {
        let a = snapshot_hash(&sample_snapshot()).expect("hash");
        let b = snapshot_hash(&sample_snapshot()).expect("hash");
        assert_eq!(a, b);
    }

    #[test]
    fn fnv1a_known_vector() {
        // FNV-1a("a") = 0xaf63dc4c8601ec8c
        assert_eq!(hash_bytes_fnv1a64(b"a"), 0xaf63dc4c8601ec8c);
    }
}
