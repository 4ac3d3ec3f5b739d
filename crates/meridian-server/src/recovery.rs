//! Session recovery.
//!
//! Brings persisted sessions back to life after a process restart: load the
//! snapshot, rebuild the simulation, and park it on a fresh task. Recovery is
//! idempotent per session, and one broken snapshot never takes down the rest
//! of the host.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

use meridian_core::{GameSession, RecoveryError};
use meridian_protocol::{Event, EventScope, SessionId};

use crate::config::TurnTimerConfig;
use crate::runtime::{spawn_session, SessionHandle};
use crate::store::{SnapshotStore, StoreError};

#[derive(Debug, Error)]
pub enum RecoverError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Rebuild(#[from] RecoveryError),
}

/// Outcome of a recovery request.
pub enum Recovered {
    /// The session was already running; no work was done.
    Resident(SessionHandle),
    /// The session was rebuilt from its snapshot and spawned. The event
    /// stream belongs to the caller.
    Restored(
        SessionHandle,
        mpsc::UnboundedReceiver<(EventScope, Event)>,
    ),
}

impl Recovered {
    pub fn handle(&self) -> &SessionHandle {
        match self {
            Recovered::Resident(handle) => handle,
            Recovered::Restored(handle, _) => handle,
        }
    }
}

pub struct SessionRecoveryService {
    store: Arc<dyn SnapshotStore>,
    timer: TurnTimerConfig,
    active: Mutex<HashMap<SessionId, SessionHandle>>,
}

impl SessionRecoveryService {
    pub fn new(store: Arc<dyn SnapshotStore>, timer: TurnTimerConfig) -> Self {
        Self {
            store,
            timer,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Make `session` resident, rebuilding it from its snapshot if needed.
    pub fn recover(&self, session: &SessionId) -> Result<Recovered, RecoverError> {
        if let Some(handle) = self.resident(session) {
            return Ok(Recovered::Resident(handle));
        }

        let snapshot = self.store.load(session)?;
        let mut rebuilt = GameSession::from_snapshot(snapshot)?;

        // Sockets did not survive the restart; every seat reconnects.
        let connected: Vec<_> = rebuilt
            .players()
            .iter()
            .filter(|p| p.connected)
            .map(|p| p.id)
            .collect();
        for player in connected {
            let _ = rebuilt.set_connected(player, false);
        }

        info!(session = %session, turn = rebuilt.turn(), "session restored from snapshot");
        let (handle, events) = spawn_session(rebuilt, self.store.clone(), self.timer.clone());
        self.register(handle.clone());
        Ok(Recovered::Restored(handle, events))
    }

    /// Track a freshly created session so later recover calls find it.
    pub fn register(&self, handle: SessionHandle) {
        if let Ok(mut active) = self.active.lock() {
            active.insert(handle.session_id().clone(), handle);
        }
    }

    /// Forget a session whose task has stopped.
    pub fn release(&self, session: &SessionId) {
        if let Ok(mut active) = self.active.lock() {
            if active.remove(session).is_some() {
                info!(session = %session, "session released");
            }
        }
    }

    pub fn resident(&self, session: &SessionId) -> Option<SessionHandle> {
        self.active
            .lock()
            .ok()
            .and_then(|active| active.get(session).cloned())
    }

    /// Recover every persisted session id in the list, skipping the broken
    /// ones. Used at host startup.
    pub fn recover_all(&self, sessions: &[SessionId]) -> Vec<Recovered> {
        let mut recovered = Vec::new();
        for session in sessions {
            match self.recover(session) {
                Ok(outcome) => recovered.push(outcome),
                Err(err) => {
                    warn!(session = %session, %err, "session recovery failed");
                }
            }
        }
        recovered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use meridian_core::{load_named_ruleset, TileGrid};
    use meridian_protocol::{wire, Pos, SessionConfig, TileDiff};

    fn saved_session(store: &MemoryStore, id: &str) -> GameSession {
        let config = SessionConfig {
            max_players: 2,
            map_width: 12,
            map_height: 12,
            ruleset: "classic".to_string(),
            turn_time_limit_secs: None,
        };
        let rules = load_named_ruleset("classic").expect("rules");
        let grassland = rules.terrain_id("grassland").expect("grassland");
        let grid = TileGrid::new(12, 12, grassland);
        let mut session = GameSession::new(SessionId::new(id), config, grid).expect("session");
        let player = session.add_player("ada").expect("seat");
        session
            .spawn_unit(player, "settlers", Pos::new(6, 6))
            .expect("spawn");
        session.start().expect("start");
        store.save(&session.snapshot()).expect("save");
        session
    }

    fn service(store: Arc<MemoryStore>) -> SessionRecoveryService {
        let timer = TurnTimerConfig {
            enabled: false,
            ..TurnTimerConfig::default()
        };
        SessionRecoveryService::new(store, timer)
    }

    #[tokio::test]
    async fn recovery_restores_the_persisted_state() {
        let store = Arc::new(MemoryStore::new());
        let original = saved_session(&store, "alpha");
        let service = service(store);

        let recovered = service.recover(&SessionId::new("alpha")).expect("recover");
        let Recovered::Restored(handle, _events) = recovered else {
            panic!("expected a restored session");
        };
        let snapshot = handle.snapshot().await.expect("snapshot");
        assert_eq!(
            wire::snapshot_hash(&snapshot).expect("hash"),
            wire::snapshot_hash(&original.snapshot()).expect("hash")
        );
    }

    #[tokio::test]
    async fn recovery_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        saved_session(&store, "alpha");
        let service = service(store);

        let first = service.recover(&SessionId::new("alpha")).expect("recover");
        assert!(matches!(first, Recovered::Restored(..)));
        let second = service.recover(&SessionId::new("alpha")).expect("recover");
        assert!(matches!(second, Recovered::Resident(_)));
        assert_eq!(
            first.handle().session_id(),
            second.handle().session_id()
        );
    }

    #[tokio::test]
    async fn one_broken_snapshot_does_not_block_others() {
        let store = Arc::new(MemoryStore::new());
        let healthy = saved_session(&store, "alpha");

        // Corrupt a second snapshot with an out-of-range tile diff.
        let mut broken = healthy.snapshot();
        broken.session = SessionId::new("beta");
        broken.tile_diffs.push(TileDiff {
            pos: Pos::new(99, 99),
            terrain: None,
            elevation: None,
            river: None,
            explored_by: 1,
        });
        store.save(&broken).expect("save");

        let service = service(store);
        assert!(matches!(
            service.recover(&SessionId::new("beta")),
            Err(RecoverError::Rebuild(_))
        ));
        assert!(matches!(
            service.recover(&SessionId::new("missing")),
            Err(RecoverError::Store(StoreError::NotFound(_)))
        ));

        let recovered =
            service.recover_all(&[SessionId::new("beta"), SessionId::new("alpha")]);
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].handle().session_id().as_str(), "alpha");
    }
}
