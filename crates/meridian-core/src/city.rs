use serde::{Deserialize, Serialize};

use meridian_protocol::{PlayerId, Pos};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct City {
    pub name: String,
    pub owner: PlayerId,
    pub position: Pos,
    pub population: u8,
}

impl City {
    pub fn new(name: String, position: Pos, owner: PlayerId) -> Self {
        Self {
            name,
            owner,
            position,
            population: 1,
        }
    }
}
