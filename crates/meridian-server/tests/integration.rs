//! Integration tests for the session host.
//!
//! Drive a full match through the public surface: seat players, start the
//! session over the command channel, play actions, then kill the task and
//! recover the same match from its snapshot.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use meridian_core::{load_named_ruleset, GameSession, TileGrid};
use meridian_protocol::{
    wire, Action, Event, EventScope, PlayerId, Pos, SessionConfig, SessionId, UnitId,
};
use meridian_server::{
    spawn_session, MemoryStore, Recovered, SessionRecoveryService, SessionRoster, TurnTimerConfig,
};

struct Match {
    session: GameSession,
    settler: UnitId,
    scout: UnitId,
}

/// 16x16 grass map, two seated players, a settler and a scout.
fn two_player_match(id: &str) -> Match {
    let config = SessionConfig {
        max_players: 2,
        map_width: 16,
        map_height: 16,
        ruleset: "classic".to_string(),
        turn_time_limit_secs: None,
    };
    let rules = load_named_ruleset("classic").expect("rules");
    let grassland = rules.terrain_id("grassland").expect("grassland");
    let grid = TileGrid::new(16, 16, grassland);
    let mut session = GameSession::new(SessionId::new(id), config, grid).expect("session");

    let ada = session.add_player("ada").expect("seat");
    let brin = session.add_player("brin").expect("seat");
    let (settler, _) = session
        .spawn_unit(ada, "settlers", Pos::new(4, 4))
        .expect("spawn");
    let (scout, _) = session
        .spawn_unit(brin, "explorer", Pos::new(12, 12))
        .expect("spawn");
    Match {
        session,
        settler,
        scout,
    }
}

fn no_timer() -> TurnTimerConfig {
    TurnTimerConfig {
        enabled: false,
        ..TurnTimerConfig::default()
    }
}

async fn next_matching(
    events: &mut mpsc::UnboundedReceiver<(EventScope, Event)>,
    mut predicate: impl FnMut(&EventScope, &Event) -> bool,
) -> (EventScope, Event) {
    loop {
        let (scope, event) = events.recv().await.expect("event stream open");
        if predicate(&scope, &event) {
            return (scope, event);
        }
    }
}

/// Seating flow: the roster mirrors the session's player ids and hands out
/// working reconnect tokens.
#[test]
fn roster_mirrors_session_seats() {
    let mut game = two_player_match("roster-flow");
    let mut roster = SessionRoster::new(2, Duration::from_secs(60));

    let token_ada = roster.join(PlayerId(0), 100, "ada").expect("join");
    let token_brin = roster.join(PlayerId(1), 101, "brin").expect("join");
    assert_ne!(token_ada, token_brin);
    assert_eq!(roster.len(), game.session.players().len());

    roster.mark_started();
    game.session.start().expect("start");

    // Socket drops, client returns with its token.
    assert_eq!(roster.disconnect(100), Some(PlayerId(0)));
    game.session
        .set_connected(PlayerId(0), false)
        .expect("disconnect");
    assert_eq!(roster.reconnect(200, &token_ada), Ok(PlayerId(0)));
    let events = game
        .session
        .set_connected(PlayerId(0), true)
        .expect("reconnect");
    assert!(events
        .iter()
        .any(|(_, e)| matches!(e, Event::PlayerConnected { player: PlayerId(0) })));
}

/// Full match over the runtime: start, scout, found a city, end turns.
#[tokio::test]
async fn session_task_runs_a_match() {
    let game = two_player_match("full-match");
    let store = Arc::new(MemoryStore::new());
    let (handle, mut events) = spawn_session(game.session, store.clone(), no_timer());

    handle.connect(PlayerId(0));
    handle.connect(PlayerId(1));
    handle.start();
    next_matching(&mut events, |_, e| {
        matches!(e, Event::TurnStarted { turn: 1 })
    })
    .await;

    // brin scouts; the reveal is addressed to brin alone.
    handle.action(
        PlayerId(1),
        Action::Move {
            unit: game.scout,
            target: Pos::new(10, 12),
        },
    );
    let (scope, _) = next_matching(&mut events, |_, e| {
        matches!(e, Event::TileRevealed { .. })
    })
    .await;
    assert_eq!(scope, EventScope::Player(PlayerId(1)));

    // ada founds a city where the settler stands.
    handle.action(
        PlayerId(0),
        Action::FoundCity {
            unit: game.settler,
            name: "Meridian".to_string(),
        },
    );
    next_matching(&mut events, |_, e| matches!(e, Event::CityFounded { .. })).await;
    let (scope, _) = next_matching(&mut events, |_, e| {
        matches!(e, Event::BordersChanged { .. })
    })
    .await;
    assert_eq!(scope, EventScope::Player(PlayerId(0)));

    // Both end their turn; the session advances on its own.
    handle.action(PlayerId(0), Action::EndTurn);
    handle.action(PlayerId(1), Action::EndTurn);
    next_matching(&mut events, |_, e| {
        matches!(e, Event::TurnStarted { turn: 2 })
    })
    .await;

    let snapshot = handle.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.turn, 2);
    assert_eq!(snapshot.cities.len(), 1);

    handle.shutdown();
    while events.recv().await.is_some() {}
    assert_eq!(store.len(), 1);
}

/// Kill the task, recover from the store, and keep playing: the recovered
/// session is indistinguishable from the original.
#[tokio::test]
async fn recovered_session_continues_the_match() {
    let game = two_player_match("recover-match");
    let scout = game.scout;
    let store = Arc::new(MemoryStore::new());
    let (handle, mut events) = spawn_session(game.session, store.clone(), no_timer());

    handle.start();
    handle.action(
        PlayerId(0),
        Action::FoundCity {
            unit: game.settler,
            name: "Meridian".to_string(),
        },
    );
    let before = handle.snapshot().await.expect("snapshot");
    handle.shutdown();
    while events.recv().await.is_some() {}

    let service = SessionRecoveryService::new(store, no_timer());
    let recovered = service
        .recover(&SessionId::new("recover-match"))
        .expect("recover");
    let Recovered::Restored(handle, mut events) = recovered else {
        panic!("expected a restored session");
    };

    let after = handle.snapshot().await.expect("snapshot");
    assert_eq!(
        wire::snapshot_hash(&before).expect("hash"),
        wire::snapshot_hash(&after).expect("hash")
    );

    // A second recover call is a no-op returning the live handle.
    assert!(matches!(
        service.recover(&SessionId::new("recover-match")),
        Ok(Recovered::Resident(_))
    ));

    // The restored session keeps accepting actions.
    handle.action(
        PlayerId(1),
        Action::Move {
            unit: scout,
            target: Pos::new(10, 12),
        },
    );
    let (_, event) = next_matching(&mut events, |_, e| {
        matches!(e, Event::UnitMoved { .. })
    })
    .await;
    match event {
        Event::UnitMoved { path, .. } => assert_eq!(path.last(), Some(&Pos::new(10, 12))),
        _ => unreachable!(),
    }
    handle.shutdown();
}
