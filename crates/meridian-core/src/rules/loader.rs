use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;

use meridian_protocol::{TerrainId, UnitTypeId};

use crate::rules::types::{RawGameSettings, RawTerrainType, RawUnitType};
use crate::rules::CompiledRules;

#[derive(Debug, Error)]
pub enum RulesError {
    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("unknown ruleset: {0}")]
    UnknownRuleset(String),
    #[error("utf-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub enum RulesSource<'a> {
    /// The built-in "classic" ruleset.
    Embedded,
    /// Directory containing `terrain.yaml`, `units.yaml`, `game.yaml`.
    Path(String),
    Bytes {
        terrain: &'a [u8],
        units: &'a [u8],
        game: &'a [u8],
    },
}

#[derive(Debug, Deserialize)]
struct RawRules {
    terrains: BTreeMap<String, RawTerrainType>,
    units: BTreeMap<String, RawUnitType>,
    game: RawGameSettings,
}

/// Resolve a ruleset by the name a session config carries.
pub fn load_named_ruleset(name: &str) -> Result<CompiledRules, RulesError> {
    match name {
        "classic" => load_rules(RulesSource::Embedded),
        other => Err(RulesError::UnknownRuleset(other.to_string())),
    }
}

pub fn load_rules(source: RulesSource<'_>) -> Result<CompiledRules, RulesError> {
    let raw = match source {
        RulesSource::Embedded => {
            let terrain_yaml = include_str!("../../data/classic/terrain.yaml");
            let units_yaml = include_str!("../../data/classic/units.yaml");
            let game_yaml = include_str!("../../data/classic/game.yaml");
            parse_raw_rules(terrain_yaml, units_yaml, game_yaml)?
        }
        RulesSource::Path(path) => {
            let terrain_yaml = std::fs::read_to_string(format!("{path}/terrain.yaml"))?;
            let units_yaml = std::fs::read_to_string(format!("{path}/units.yaml"))?;
            let game_yaml = std::fs::read_to_string(format!("{path}/game.yaml"))?;
            parse_raw_rules(&terrain_yaml, &units_yaml, &game_yaml)?
        }
        RulesSource::Bytes {
            terrain,
            units,
            game,
        } => parse_raw_rules(
            std::str::from_utf8(terrain)?,
            std::str::from_utf8(units)?,
            std::str::from_utf8(game)?,
        )?,
    };

    Ok(compile_rules(raw))
}

fn parse_raw_rules(
    terrain_yaml: &str,
    units_yaml: &str,
    game_yaml: &str,
) -> Result<RawRules, RulesError> {
    let terrains = serde_yaml::from_str(terrain_yaml)?;
    let units = serde_yaml::from_str(units_yaml)?;
    let game = serde_yaml::from_str(game_yaml)?;
    Ok(RawRules {
        terrains,
        units,
        game,
    })
}

fn compile_rules(raw: RawRules) -> CompiledRules {
    // BTreeMap iteration is key-sorted, so id assignment is deterministic.
    let terrain_ids = raw
        .terrains
        .keys()
        .enumerate()
        .map(|(i, k)| (k.clone(), TerrainId::new(i as u16)))
        .collect();
    let unit_type_ids = raw
        .units
        .keys()
        .enumerate()
        .map(|(i, k)| (k.clone(), UnitTypeId::new(i as u16)))
        .collect();

    let terrains = raw
        .terrains
        .into_values()
        .map(|t| t.compile())
        .collect::<Vec<_>>();
    let unit_types = raw
        .units
        .into_values()
        .map(|u| u.compile())
        .collect::<Vec<_>>();
    let settings = raw.game.compile();

    CompiledRules {
        terrains,
        unit_types,
        terrain_ids,
        unit_type_ids,
        settings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_protocol::MoveClass;

    #[test]
    fn embedded_ruleset_loads() {
        let rules = load_rules(RulesSource::Embedded).expect("classic rules");
        assert!(!rules.terrains.is_empty());
        assert!(!rules.unit_types.is_empty());

        let grassland = rules.terrain_id("grassland").expect("grassland");
        let terrain = rules.terrain(grassland).expect("terrain entry");
        assert_eq!(terrain.movement_cost, 1);
        assert!(terrain.native_to(MoveClass::Land));
        assert!(!terrain.native_to(MoveClass::Sea));

        let ocean = rules.terrain_id("ocean").expect("ocean");
        let terrain = rules.terrain(ocean).expect("terrain entry");
        assert!(terrain.no_cities);
        assert!(terrain.native_to(MoveClass::Sea));
        assert!(terrain.native_to(MoveClass::Air));
        assert_eq!(rules.baseline_terrain(), ocean);
    }

    #[test]
    fn settler_can_found_cities() {
        let rules = load_rules(RulesSource::Embedded).expect("classic rules");
        let settlers = rules.unit_type_id("settlers").expect("settlers");
        assert!(rules.unit_type(settlers).expect("type").can_found_city);

        let warriors = rules.unit_type_id("warriors").expect("warriors");
        assert!(!rules.unit_type(warriors).expect("type").can_found_city);
    }

    #[test]
    fn citymindist_is_clamped() {
        let game = b"citymindist: 99\n";
        let terrain = include_bytes!("../../data/classic/terrain.yaml");
        let units = include_bytes!("../../data/classic/units.yaml");
        let rules = load_rules(RulesSource::Bytes {
            terrain,
            units,
            game,
        })
        .expect("rules");
        assert_eq!(rules.settings.citymindist, 11);
    }

    #[test]
    fn unknown_ruleset_is_an_error() {
        assert!(matches!(
            load_named_ruleset("nonexistent"),
            Err(RulesError::UnknownRuleset(_))
        ));
    }
}
