//! Transport-side seat tracking.
//!
//! The session owns the authoritative player list; the roster tracks which
//! client socket sits in which seat, hands out reconnect tokens, and watches
//! the disconnect grace period. Seat ids always mirror the session's
//! `PlayerId` assignment.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::Rng;
use thiserror::Error;

use meridian_protocol::PlayerId;

/// Seat lifecycle state
#[derive(Clone, Debug)]
pub enum SeatState {
    /// Waiting for the session to start
    Lobby { ready: bool },
    /// Connected and playing
    Playing { last_activity: Instant },
    /// Disconnected mid-session, in the grace period
    Disconnected { disconnected_at: Instant },
    /// Grace period expired; the seat idles until reconnect
    Abandoned,
}

#[derive(Clone, Debug)]
pub struct Seat {
    pub player: PlayerId,
    pub name: String,
    pub client: Option<u64>,
    pub reconnect_token: String,
    pub state: SeatState,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum JoinError {
    #[error("session is full")]
    SessionFull,
    #[error("session already started")]
    SessionInProgress,
    #[error("client already holds a seat")]
    AlreadySeated,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ReconnectError {
    #[error("invalid reconnect token")]
    InvalidToken,
    #[error("seat is still connected")]
    AlreadyConnected,
    #[error("cannot reconnect before the session starts")]
    NotInGame,
}

pub struct SessionRoster {
    seats: HashMap<PlayerId, Seat>,
    client_to_player: HashMap<u64, PlayerId>,
    tokens: HashMap<String, PlayerId>,
    started: bool,
    max_players: u8,
    disconnect_grace: Duration,
}

impl SessionRoster {
    pub fn new(max_players: u8, disconnect_grace: Duration) -> Self {
        Self {
            seats: HashMap::new(),
            client_to_player: HashMap::new(),
            tokens: HashMap::new(),
            started: false,
            max_players,
            disconnect_grace,
        }
    }

    pub fn seat(&self, player: PlayerId) -> Option<&Seat> {
        self.seats.get(&player)
    }

    pub fn player_for_client(&self, client: u64) -> Option<PlayerId> {
        self.client_to_player.get(&client).copied()
    }

    pub fn len(&self) -> usize {
        self.seats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seats.is_empty()
    }

    /// Seat a new client. The caller must have already allocated the same
    /// `PlayerId` in the session. Returns the reconnect token.
    pub fn join(
        &mut self,
        player: PlayerId,
        client: u64,
        name: &str,
    ) -> Result<String, JoinError> {
        if self.started {
            return Err(JoinError::SessionInProgress);
        }
        if self.seats.len() >= self.max_players as usize {
            return Err(JoinError::SessionFull);
        }
        if self.client_to_player.contains_key(&client) {
            return Err(JoinError::AlreadySeated);
        }

        let token = generate_token();
        self.seats.insert(
            player,
            Seat {
                player,
                name: name.to_string(),
                client: Some(client),
                reconnect_token: token.clone(),
                state: SeatState::Lobby { ready: false },
            },
        );
        self.client_to_player.insert(client, player);
        self.tokens.insert(token.clone(), player);
        Ok(token)
    }

    /// Lock the roster and move every seated player into play.
    pub fn mark_started(&mut self) {
        self.started = true;
        let now = Instant::now();
        for seat in self.seats.values_mut() {
            if matches!(seat.state, SeatState::Lobby { .. }) {
                seat.state = SeatState::Playing { last_activity: now };
            }
        }
    }

    /// Re-seat a returning client using their token.
    pub fn reconnect(&mut self, client: u64, token: &str) -> Result<PlayerId, ReconnectError> {
        let player = self
            .tokens
            .get(token)
            .copied()
            .ok_or(ReconnectError::InvalidToken)?;
        let Some(seat) = self.seats.get_mut(&player) else {
            return Err(ReconnectError::InvalidToken);
        };

        match seat.state {
            SeatState::Lobby { .. } => Err(ReconnectError::NotInGame),
            SeatState::Playing { .. } => Err(ReconnectError::AlreadyConnected),
            SeatState::Disconnected { .. } | SeatState::Abandoned => {
                if let Some(old) = seat.client.take() {
                    self.client_to_player.remove(&old);
                }
                seat.client = Some(client);
                seat.state = SeatState::Playing {
                    last_activity: Instant::now(),
                };
                self.client_to_player.insert(client, player);
                Ok(player)
            }
        }
    }

    /// Record a dropped socket. Returns the seat that went dark, if any.
    pub fn disconnect(&mut self, client: u64) -> Option<PlayerId> {
        let player = self.client_to_player.remove(&client)?;
        let seat = self.seats.get_mut(&player)?;
        seat.client = None;
        seat.state = SeatState::Disconnected {
            disconnected_at: Instant::now(),
        };
        Some(player)
    }

    /// Seats whose grace period has run out since the last sweep. Each seat
    /// is reported once.
    pub fn sweep_expired(&mut self, now: Instant) -> Vec<PlayerId> {
        let grace = self.disconnect_grace;
        let mut expired = Vec::new();
        for seat in self.seats.values_mut() {
            if let SeatState::Disconnected { disconnected_at } = seat.state {
                if now.duration_since(disconnected_at) >= grace {
                    seat.state = SeatState::Abandoned;
                    expired.push(seat.player);
                }
            }
        }
        expired.sort_unstable_by_key(|p| p.0);
        expired
    }
}

fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    (0..32)
        .map(|_| {
            let idx = rng.gen_range(0..36);
            if idx < 10 {
                (b'0' + idx) as char
            } else {
                (b'a' + idx - 10) as char
            }
        })
        .collect()
}
