use std::collections::HashMap;

use serde::Deserialize;
use tracing::warn;

use meridian_protocol::{MoveClass, TerrainId, UnitTypeId};

/// Raw YAML shape of one terrain entry.
#[derive(Debug, Deserialize)]
pub(crate) struct RawTerrainType {
    pub name: String,
    pub movement_cost: i32,
    /// Movement classes native to this terrain. Air is native everywhere and
    /// need not be listed.
    pub native: Vec<MoveClass>,
    #[serde(default)]
    pub no_cities: bool,
}

#[derive(Clone, Debug)]
pub struct TerrainType {
    pub name: String,
    pub movement_cost: i32,
    pub native: Vec<MoveClass>,
    pub no_cities: bool,
}

impl TerrainType {
    /// Whether a unit of `class` may occupy this terrain.
    pub fn native_to(&self, class: MoveClass) -> bool {
        class == MoveClass::Air || self.native.contains(&class)
    }
}

impl RawTerrainType {
    pub(crate) fn compile(self) -> TerrainType {
        TerrainType {
            name: self.name,
            movement_cost: self.movement_cost,
            native: self.native,
            no_cities: self.no_cities,
        }
    }
}

/// Raw YAML shape of one unit type.
#[derive(Debug, Deserialize)]
pub(crate) struct RawUnitType {
    pub name: String,
    pub moves: i32,
    pub vision_range: i32,
    pub class: MoveClass,
    #[serde(default)]
    pub can_found_city: bool,
}

#[derive(Clone, Debug)]
pub struct UnitType {
    pub name: String,
    pub moves: i32,
    pub vision_range: i32,
    pub class: MoveClass,
    pub can_found_city: bool,
}

impl RawUnitType {
    pub(crate) fn compile(self) -> UnitType {
        UnitType {
            name: self.name,
            moves: self.moves,
            vision_range: self.vision_range,
            class: self.class,
            can_found_city: self.can_found_city,
        }
    }
}

/// How much of the map a founding player must have explored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RequireExplored {
    #[default]
    None,
    /// The founding player must have explored the target tile.
    Founder,
}

#[derive(Clone, Debug, Deserialize)]
pub struct FoundingSettings {
    /// Founding on another player's territory.
    #[serde(default)]
    pub allow_foreign: bool,
    #[serde(default)]
    pub require_explored: RequireExplored,
    /// A hostile unit on the tile blocks founding.
    #[serde(default = "default_true")]
    pub enemy_blocks: bool,
    /// Air units may found without the tile being native to them.
    #[serde(default = "default_true")]
    pub air_can_found: bool,
}

impl Default for FoundingSettings {
    fn default() -> Self {
        Self {
            allow_foreign: false,
            require_explored: RequireExplored::None,
            enemy_blocks: true,
            air_can_found: true,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct BorderSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Squared radius every source projects before size bonuses.
    #[serde(default = "default_radius_sq_base")]
    pub radius_sq_base: i64,
    /// Squared-radius bonus per point of city population.
    #[serde(default = "default_size_effect")]
    pub size_effect: i64,
    /// Cap on the population-derived bonus.
    #[serde(default = "default_size_bonus_cap")]
    pub size_bonus_cap: i64,
}

impl Default for BorderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            radius_sq_base: default_radius_sq_base(),
            size_effect: default_size_effect(),
            size_bonus_cap: default_size_bonus_cap(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_radius_sq_base() -> i64 {
    10
}

fn default_size_effect() -> i64 {
    1
}

fn default_size_bonus_cap() -> i64 {
    15
}

pub(crate) const CITYMINDIST_DEFAULT: i32 = 2;
pub(crate) const CITYMINDIST_MIN: i32 = 1;
pub(crate) const CITYMINDIST_MAX: i32 = 11;

/// Raw YAML shape of the game-settings document.
#[derive(Debug, Deserialize)]
pub(crate) struct RawGameSettings {
    pub citymindist: Option<i32>,
    #[serde(default)]
    pub founding: Option<FoundingSettings>,
    #[serde(default)]
    pub borders: Option<BorderSettings>,
}

#[derive(Clone, Debug)]
pub struct GameSettings {
    /// Minimum Chebyshev distance between two cities, clamped to [1, 11].
    pub citymindist: i32,
    pub founding: FoundingSettings,
    pub borders: BorderSettings,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            citymindist: CITYMINDIST_DEFAULT,
            founding: FoundingSettings::default(),
            borders: BorderSettings::default(),
        }
    }
}

impl RawGameSettings {
    pub(crate) fn compile(self) -> GameSettings {
        let citymindist = match self.citymindist {
            Some(value) => {
                let clamped = value.clamp(CITYMINDIST_MIN, CITYMINDIST_MAX);
                if clamped != value {
                    warn!(value, clamped, "citymindist outside [1, 11], clamped");
                }
                clamped
            }
            None => {
                warn!(
                    default = CITYMINDIST_DEFAULT,
                    "citymindist missing from ruleset, using default"
                );
                CITYMINDIST_DEFAULT
            }
        };
        let founding = self.founding.unwrap_or_else(|| {
            warn!("founding settings missing from ruleset, using defaults");
            FoundingSettings::default()
        });
        let borders = self.borders.unwrap_or_else(|| {
            warn!("border settings missing from ruleset, using defaults");
            BorderSettings::default()
        });
        GameSettings {
            citymindist,
            founding,
            borders,
        }
    }
}

/// Ruleset compiled to dense, id-indexed tables. Shared read-only between
/// sessions.
#[derive(Clone, Debug)]
pub struct CompiledRules {
    pub terrains: Vec<TerrainType>,
    pub unit_types: Vec<UnitType>,
    pub terrain_ids: HashMap<String, TerrainId>,
    pub unit_type_ids: HashMap<String, UnitTypeId>,
    pub settings: GameSettings,
}

impl CompiledRules {
    pub fn terrain(&self, id: TerrainId) -> Option<&TerrainType> {
        self.terrains.get(id.raw as usize)
    }

    pub fn unit_type(&self, id: UnitTypeId) -> Option<&UnitType> {
        self.unit_types.get(id.raw as usize)
    }

    pub fn terrain_id(&self, key: &str) -> Option<TerrainId> {
        self.terrain_ids.get(key).copied()
    }

    pub fn unit_type_id(&self, key: &str) -> Option<UnitTypeId> {
        self.unit_type_ids.get(key).copied()
    }

    /// Terrain the recovery baseline grid is filled with. Named default:
    /// the `ocean` terrain, falling back to id 0 if the ruleset lacks one.
    pub fn baseline_terrain(&self) -> TerrainId {
        match self.terrain_id("ocean") {
            Some(id) => id,
            None => {
                warn!("ruleset has no 'ocean' terrain, baseline falls back to id 0");
                TerrainId::new(0)
            }
        }
    }
}
