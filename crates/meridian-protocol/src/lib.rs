//! Shared wire types for Meridian.
//!
//! Everything that crosses a process or serialization boundary lives here:
//! ids, coordinates, actions, events, snapshots, and the MessagePack codec.

mod action;
mod event;
mod ids;
mod pos;
mod snapshot;
mod types;
pub mod wire;

pub use crate::action::*;
pub use crate::event::*;
pub use crate::ids::*;
pub use crate::pos::*;
pub use crate::snapshot::*;
pub use crate::types::*;
