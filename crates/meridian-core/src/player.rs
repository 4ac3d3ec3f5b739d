use std::time::Instant;

use meridian_protocol::PlayerId;

/// Per-seat player state. Exclusively owned by the session; only the
/// orchestrator mutates it, in response to connection and turn events.
#[derive(Clone, Debug)]
pub struct PlayerState {
    pub id: PlayerId,
    pub name: String,
    pub connected: bool,
    pub ready: bool,
    pub turn_ended: bool,
    pub last_activity: Instant,
}

impl PlayerState {
    pub fn new(id: PlayerId, name: String) -> Self {
        Self {
            id,
            name,
            connected: false,
            ready: false,
            turn_ended: false,
            last_activity: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}
