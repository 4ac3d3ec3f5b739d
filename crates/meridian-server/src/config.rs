//! Server configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use meridian_protocol::SessionConfig;

/// Host-wide configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Maximum concurrent sessions
    pub max_sessions: usize,
    /// Defaults applied to newly created sessions
    pub session: SessionConfig,
    /// Grace period before a disconnected seat is abandoned
    pub disconnect_grace: Duration,
    /// Turn timer settings
    pub turn_timer: TurnTimerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_sessions: 64,
            session: SessionConfig::default(),
            disconnect_grace: Duration::from_secs(60),
            turn_timer: TurnTimerConfig::default(),
        }
    }
}

/// Turn timer configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TurnTimerConfig {
    /// Timer on/off; disabled sessions wait indefinitely for players
    pub enabled: bool,
    /// Base time per turn in seconds
    pub base_time_secs: u32,
    /// Bonus seconds per active unit (capped)
    pub unit_bonus_secs: u32,
    /// Maximum unit bonus
    pub unit_bonus_cap_secs: u32,
    /// Bonus seconds per city (capped)
    pub city_bonus_secs: u32,
    /// Maximum city bonus
    pub city_bonus_cap_secs: u32,
    /// Maximum total turn time
    pub max_time_secs: u32,
}

impl Default for TurnTimerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_time_secs: 60,
            unit_bonus_secs: 2,
            unit_bonus_cap_secs: 60,
            city_bonus_secs: 5,
            city_bonus_cap_secs: 30,
            max_time_secs: 300,
        }
    }
}

impl TurnTimerConfig {
    /// Calculate the movement-phase time limit for a session of this size.
    pub fn calculate_turn_time(&self, unit_count: u32, city_count: u32) -> Duration {
        let unit_bonus = (unit_count * self.unit_bonus_secs).min(self.unit_bonus_cap_secs);
        let city_bonus = (city_count * self.city_bonus_secs).min(self.city_bonus_cap_secs);

        let total = (self.base_time_secs + unit_bonus + city_bonus).min(self.max_time_secs);
        Duration::from_secs(total as u64)
    }
}
