//! Snapshot persistence seam.
//!
//! Sessions are persisted as MessagePack blobs keyed by session id. The
//! in-memory implementation backs tests and single-process deployments;
//! durable backends implement the same trait.

use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;

use meridian_protocol::wire::{self, WireError};
use meridian_protocol::{SessionId, SessionSnapshot};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no snapshot stored for session {0}")]
    NotFound(SessionId),
    #[error(transparent)]
    Wire(#[from] WireError),
}

pub trait SnapshotStore: Send + Sync {
    fn save(&self, snapshot: &SessionSnapshot) -> Result<(), StoreError>;
    fn load(&self, session: &SessionId) -> Result<SessionSnapshot, StoreError>;
    fn remove(&self, session: &SessionId);
}

/// Keeps encoded snapshots in a mutex-guarded map. Encoding up front means a
/// snapshot that cannot round-trip fails at save time, not at recovery.
#[derive(Default)]
pub struct MemoryStore {
    snapshots: Mutex<HashMap<SessionId, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.snapshots.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SnapshotStore for MemoryStore {
    fn save(&self, snapshot: &SessionSnapshot) -> Result<(), StoreError> {
        let bytes = wire::serialize_snapshot(snapshot)?;
        if let Ok(mut snapshots) = self.snapshots.lock() {
            snapshots.insert(snapshot.session.clone(), bytes);
        }
        Ok(())
    }

    fn load(&self, session: &SessionId) -> Result<SessionSnapshot, StoreError> {
        let bytes = self
            .snapshots
            .lock()
            .ok()
            .and_then(|snapshots| snapshots.get(session).cloned())
            .ok_or_else(|| StoreError::NotFound(session.clone()))?;
        Ok(wire::deserialize_snapshot(&bytes)?)
    }

    fn remove(&self, session: &SessionId) {
        if let Ok(mut snapshots) = self.snapshots.lock() {
            snapshots.remove(session);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_protocol::SessionConfig;

    fn snapshot(id: &str) -> SessionSnapshot {
        SessionSnapshot {
            session: SessionId::new(id),
            config: SessionConfig::default(),
            status: Default::default(),
            turn: 3,
            phase: Default::default(),
            players: Vec::new(),
            tile_diffs: Vec::new(),
            units: Vec::new(),
            cities: Vec::new(),
            border_sources: Vec::new(),
        }
    }

    #[test]
    fn save_then_load_round_trips() {
        let store = MemoryStore::new();
        store.save(&snapshot("alpha")).expect("save");

        let loaded = store.load(&SessionId::new("alpha")).expect("load");
        assert_eq!(loaded.turn, 3);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn missing_session_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.load(&SessionId::new("ghost")),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn remove_forgets_the_snapshot() {
        let store = MemoryStore::new();
        store.save(&snapshot("alpha")).expect("save");
        store.remove(&SessionId::new("alpha"));
        assert!(store.is_empty());
    }
}
