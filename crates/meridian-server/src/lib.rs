//! Meridian session host.
//!
//! Runs authoritative game sessions: one tokio task per session owns all
//! mutation, actions arrive over channels, snapshots persist through the
//! `SnapshotStore` seam.

pub mod config;
pub mod recovery;
pub mod roster;
pub mod runtime;
pub mod store;

pub use config::{ServerConfig, TurnTimerConfig};
pub use recovery::{RecoverError, Recovered, SessionRecoveryService};
pub use roster::{JoinError, ReconnectError, Seat, SeatState, SessionRoster};
pub use runtime::{spawn_session, SessionCommand, SessionHandle};
pub use store::{MemoryStore, SnapshotStore, StoreError};
