//! Per-session task runtime.
//!
//! Each session runs on its own tokio task which exclusively owns the
//! `GameSession`. Commands arrive on an unbounded queue and are applied in
//! arrival order; outbound events leave on a second channel for the
//! transport layer to fan out. The turn timer is a `select!` branch, so a
//! deadline never interrupts a command mid-application, and every command
//! already queued when the timer fires is drained before the turn advances.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use meridian_core::GameSession;
use meridian_protocol::{
    Action, Event, EventScope, PlayerId, SessionId, SessionSnapshot, SessionStatus,
};

use crate::config::TurnTimerConfig;
use crate::store::SnapshotStore;

pub enum SessionCommand {
    Action { player: PlayerId, action: Action },
    Connect { player: PlayerId },
    Disconnect { player: PlayerId },
    Start,
    Pause,
    Resume,
    Snapshot { reply: oneshot::Sender<SessionSnapshot> },
    Shutdown,
}

/// Cheap, cloneable address of a running session task.
#[derive(Clone)]
pub struct SessionHandle {
    session: SessionId,
    commands: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &SessionId {
        &self.session
    }

    /// Queue a command; false means the task has already exited.
    pub fn send(&self, command: SessionCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    pub fn action(&self, player: PlayerId, action: Action) -> bool {
        self.send(SessionCommand::Action { player, action })
    }

    pub fn connect(&self, player: PlayerId) -> bool {
        self.send(SessionCommand::Connect { player })
    }

    pub fn disconnect(&self, player: PlayerId) -> bool {
        self.send(SessionCommand::Disconnect { player })
    }

    pub fn start(&self) -> bool {
        self.send(SessionCommand::Start)
    }

    pub fn pause(&self) -> bool {
        self.send(SessionCommand::Pause)
    }

    pub fn resume(&self) -> bool {
        self.send(SessionCommand::Resume)
    }

    pub fn shutdown(&self) -> bool {
        self.send(SessionCommand::Shutdown)
    }

    /// Ask the task for a snapshot of its current state.
    pub async fn snapshot(&self) -> Option<SessionSnapshot> {
        let (reply, rx) = oneshot::channel();
        if !self.send(SessionCommand::Snapshot { reply }) {
            return None;
        }
        rx.await.ok()
    }
}

/// Move a session onto its own task. Returns the handle and the outbound
/// event stream; the task runs until `Shutdown`, until every handle is
/// dropped, or until the session ends.
pub fn spawn_session(
    session: GameSession,
    store: Arc<dyn SnapshotStore>,
    timer: TurnTimerConfig,
) -> (SessionHandle, mpsc::UnboundedReceiver<(EventScope, Event)>) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let handle = SessionHandle {
        session: session.session_id().clone(),
        commands: command_tx,
    };

    let task = SessionTask {
        session,
        store,
        timer,
        events: event_tx,
        deadline: None,
    };
    tokio::spawn(task.run(command_rx));

    (handle, event_rx)
}

struct SessionTask {
    session: GameSession,
    store: Arc<dyn SnapshotStore>,
    timer: TurnTimerConfig,
    events: mpsc::UnboundedSender<(EventScope, Event)>,
    /// When the current movement phase times out; None waits indefinitely.
    deadline: Option<Instant>,
}

impl SessionTask {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<SessionCommand>) {
        info!(session = %self.session.session_id(), "session task started");
        loop {
            let timer_sleep = self
                .deadline
                .unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            let timer_fired = tokio::select! {
                command = commands.recv() => {
                    match command {
                        None | Some(SessionCommand::Shutdown) => break,
                        Some(command) => {
                            self.handle(command);
                            false
                        }
                    }
                }
                _ = sleep_until(timer_sleep), if self.deadline.is_some() => true,
            };

            if timer_fired {
                // Everything already queued still belongs to this turn.
                loop {
                    match commands.try_recv() {
                        Ok(SessionCommand::Shutdown) => {
                            self.persist();
                            return;
                        }
                        Ok(command) => self.handle(command),
                        Err(_) => break,
                    }
                }
                debug!(session = %self.session.session_id(), turn = self.session.turn(), "turn timer elapsed");
                let events = self.session.advance_turn();
                self.forward(events);
                self.reset_deadline();
                self.persist();
            }

            if self.session.status() == SessionStatus::Ended {
                break;
            }
        }
        self.persist();
        info!(session = %self.session.session_id(), "session task stopped");
    }

    fn handle(&mut self, command: SessionCommand) {
        let turn_before = self.session.turn();
        let status_before = self.session.status();

        match command {
            SessionCommand::Action { player, action } => {
                match self.session.apply_action(player, action) {
                    Ok(events) => self.forward(events),
                    Err(err) => {
                        debug!(session = %self.session.session_id(), player = player.0, %err, "action rejected");
                        self.forward(vec![(
                            EventScope::Player(player),
                            Event::ActionRejected {
                                reason: err.to_string(),
                            },
                        )]);
                    }
                }
            }
            SessionCommand::Connect { player } => {
                match self.session.set_connected(player, true) {
                    Ok(events) => self.forward(events),
                    Err(err) => debug!(%err, "connect ignored"),
                }
            }
            SessionCommand::Disconnect { player } => {
                match self.session.set_connected(player, false) {
                    Ok(events) => self.forward(events),
                    Err(err) => debug!(%err, "disconnect ignored"),
                }
            }
            SessionCommand::Start => match self.session.start() {
                Ok(events) => {
                    self.forward(events);
                    self.persist();
                }
                Err(err) => warn!(session = %self.session.session_id(), %err, "start failed"),
            },
            SessionCommand::Pause => match self.session.pause() {
                Ok(events) => self.forward(events),
                Err(err) => debug!(%err, "pause ignored"),
            },
            SessionCommand::Resume => match self.session.resume() {
                Ok(events) => self.forward(events),
                Err(err) => debug!(%err, "resume ignored"),
            },
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.session.snapshot());
            }
            SessionCommand::Shutdown => {}
        }

        if self.session.turn() != turn_before || self.session.status() != status_before {
            self.reset_deadline();
        }
    }

    fn turn_limit(&self) -> Option<Duration> {
        if let Some(secs) = self.session.config().turn_time_limit_secs {
            return Some(Duration::from_secs(secs as u64));
        }
        if !self.timer.enabled {
            return None;
        }
        Some(self.timer.calculate_turn_time(
            self.session.units().len() as u32,
            self.session.cities().len() as u32,
        ))
    }

    fn reset_deadline(&mut self) {
        self.deadline = if self.session.status() == SessionStatus::Active {
            self.turn_limit().map(|limit| Instant::now() + limit)
        } else {
            None
        };
    }

    fn forward(&self, events: Vec<(EventScope, Event)>) {
        for pair in events {
            // A closed channel just means no transport is listening.
            let _ = self.events.send(pair);
        }
    }

    fn persist(&self) {
        if let Err(err) = self.store.save(&self.session.snapshot()) {
            warn!(session = %self.session.session_id(), %err, "snapshot save failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use meridian_core::{load_named_ruleset, TileGrid};
    use meridian_protocol::{Pos, SessionConfig, UnitId};

    fn test_session(turn_limit: Option<u32>) -> (GameSession, UnitId) {
        let config = SessionConfig {
            max_players: 2,
            map_width: 12,
            map_height: 12,
            ruleset: "classic".to_string(),
            turn_time_limit_secs: turn_limit,
        };
        let rules = load_named_ruleset("classic").expect("rules");
        let grassland = rules.terrain_id("grassland").expect("grassland");
        let grid = TileGrid::new(12, 12, grassland);
        let mut session =
            GameSession::new(SessionId::new("runtime-test"), config, grid).expect("session");
        let player = session.add_player("ada").expect("seat");
        let (unit, _) = session
            .spawn_unit(player, "explorer", Pos::new(4, 4))
            .expect("spawn");
        (session, unit)
    }

    async fn next_matching(
        events: &mut mpsc::UnboundedReceiver<(EventScope, Event)>,
        mut predicate: impl FnMut(&Event) -> bool,
    ) -> Event {
        loop {
            let (_, event) = events.recv().await.expect("event stream open");
            if predicate(&event) {
                return event;
            }
        }
    }

    #[tokio::test]
    async fn commands_drive_the_session() {
        let (session, unit) = test_session(None);
        let store = Arc::new(MemoryStore::new());
        let timer = TurnTimerConfig {
            enabled: false,
            ..TurnTimerConfig::default()
        };
        let (handle, mut events) = spawn_session(session, store.clone(), timer);

        handle.start();
        next_matching(&mut events, |e| matches!(e, Event::TurnStarted { turn: 1 })).await;

        handle.action(
            PlayerId(0),
            Action::Move {
                unit,
                target: Pos::new(6, 4),
            },
        );
        let moved = next_matching(&mut events, |e| matches!(e, Event::UnitMoved { .. })).await;
        match moved {
            Event::UnitMoved { moves_left, .. } => assert_eq!(moves_left, 1),
            _ => unreachable!(),
        }

        let snapshot = handle.snapshot().await.expect("snapshot");
        assert_eq!(snapshot.turn, 1);
        assert_eq!(snapshot.units.len(), 1);

        handle.shutdown();
        while events.recv().await.is_some() {}
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn rejected_actions_notify_only_the_sender() {
        let (session, unit) = test_session(None);
        let store = Arc::new(MemoryStore::new());
        let timer = TurnTimerConfig {
            enabled: false,
            ..TurnTimerConfig::default()
        };
        let (handle, mut events) = spawn_session(session, store, timer);

        handle.start();
        handle.action(
            PlayerId(1),
            Action::Move {
                unit,
                target: Pos::new(6, 4),
            },
        );
        let (scope, event) = loop {
            let pair = events.recv().await.expect("event stream open");
            if matches!(pair.1, Event::ActionRejected { .. }) {
                break pair;
            }
        };
        assert_eq!(scope, EventScope::Player(PlayerId(1)));
        match event {
            Event::ActionRejected { reason } => assert!(!reason.is_empty()),
            _ => unreachable!(),
        }
        handle.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn turn_timer_advances_the_session() {
        let (session, _) = test_session(Some(30));
        let store = Arc::new(MemoryStore::new());
        let (handle, mut events) = spawn_session(session, store, TurnTimerConfig::default());

        handle.start();
        next_matching(&mut events, |e| matches!(e, Event::TurnStarted { turn: 1 })).await;
        // Nobody ends their turn; the 30s session limit does it for them.
        next_matching(&mut events, |e| matches!(e, Event::TurnStarted { turn: 2 })).await;

        handle.shutdown();
        while events.recv().await.is_some() {}
    }
}
