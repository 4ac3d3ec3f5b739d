//! Meridian simulation core.
//!
//! Deterministic, transport-free game state: the tile map, rulesets,
//! pathfinding, territorial borders, fog of war, and the `GameSession`
//! orchestrator that ties them together.

mod borders;
mod city;
mod entities;
mod founding;
mod map;
mod path;
mod player;
mod rules;
mod session;
mod unit;
mod visibility;

pub use crate::borders::*;
pub use crate::city::*;
pub use crate::entities::*;
pub use crate::founding::*;
pub use crate::map::*;
pub use crate::path::*;
pub use crate::player::*;
pub use crate::rules::*;
pub use crate::session::*;
pub use crate::unit::*;
pub use crate::visibility::*;
