use thiserror::Error;
use tracing::warn;

use meridian_protocol::{MoveClass, PlayerId, Pos};

use crate::borders::BorderEngine;
use crate::city::City;
use crate::entities::EntityStore;
use crate::map::TileGrid;
use crate::rules::{CompiledRules, RequireExplored};
use crate::unit::Unit;
use crate::visibility::VisibilityEngine;

/// One named reason per rejection, so callers can produce a precise message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum FoundingError {
    #[error("coordinates are outside the map")]
    BadCoordinates,
    #[error("terrain does not allow cities")]
    TerrainForbidden,
    #[error("a city already occupies this tile")]
    CityPresent,
    #[error("too close to an existing city")]
    TooClose,
    #[error("this unit type cannot found cities")]
    WrongUnitType,
    #[error("unit cannot exist on this terrain")]
    NotNativeTerrain,
    #[error("tile belongs to another player")]
    ForeignTerritory,
    #[error("tile has not been explored")]
    NotExplored,
    #[error("an enemy unit occupies this tile")]
    EnemyPresent,
}

/// How the founding attempt is being made.
#[derive(Clone, Copy, Debug)]
pub enum FoundingContext<'a> {
    /// No acting unit: tile-only validation (previews, AI scans).
    TileOnly,
    /// Bonus founding granted by a hut: relaxed unit checks.
    Hut { unit: &'a Unit },
    /// Normal founding by a settler-type unit.
    Normal { unit: &'a Unit },
}

/// Decides whether a city may legally be founded at a tile. Short-circuits
/// at the first failing check.
pub struct CityFoundingValidator;

impl CityFoundingValidator {
    pub fn validate(
        grid: &TileGrid,
        rules: &CompiledRules,
        cities: &EntityStore<City>,
        borders: &BorderEngine,
        visibility: &VisibilityEngine,
        player: PlayerId,
        pos: Pos,
        context: FoundingContext<'_>,
    ) -> Result<(), FoundingError> {
        let Some(index) = grid.index_of(pos) else {
            return Err(FoundingError::BadCoordinates);
        };

        Self::validate_tile(grid, rules, cities, pos)?;

        match context {
            FoundingContext::TileOnly => return Ok(()),
            FoundingContext::Hut { unit } => {
                Self::check_native(grid, rules, unit, pos, false)?;
                if let Some(owner) = borders.owner_at(grid, pos) {
                    if owner != player {
                        return Err(FoundingError::ForeignTerritory);
                    }
                }
            }
            FoundingContext::Normal { unit } => {
                let can_found = rules
                    .unit_type(unit.type_id)
                    .map(|t| t.can_found_city)
                    .unwrap_or_else(|| {
                        warn!(type_id = unit.type_id.raw, "unknown unit type, denying founding");
                        false
                    });
                if !can_found {
                    return Err(FoundingError::WrongUnitType);
                }
                Self::check_native(grid, rules, unit, pos, rules.settings.founding.air_can_found)?;
                if !rules.settings.founding.allow_foreign {
                    if let Some(owner) = borders.owner_at(grid, pos) {
                        if owner != player {
                            return Err(FoundingError::ForeignTerritory);
                        }
                    }
                }
            }
        }

        if rules.settings.founding.require_explored == RequireExplored::Founder
            && !visibility.is_explored(player, index)
        {
            return Err(FoundingError::NotExplored);
        }

        Ok(())
    }

    /// Tile-only checks, shared by every context.
    fn validate_tile(
        grid: &TileGrid,
        rules: &CompiledRules,
        cities: &EntityStore<City>,
        pos: Pos,
    ) -> Result<(), FoundingError> {
        let Some(tile) = grid.get(pos) else {
            return Err(FoundingError::BadCoordinates);
        };
        let Some(terrain) = rules.terrain(tile.terrain) else {
            // Missing data cannot be decided; deny rather than permit.
            warn!(terrain = tile.terrain.raw, "terrain missing from ruleset, denying founding");
            return Err(FoundingError::TerrainForbidden);
        };
        if terrain.no_cities {
            return Err(FoundingError::TerrainForbidden);
        }

        for (_city_id, city) in cities.iter_ordered() {
            if city.position == pos {
                return Err(FoundingError::CityPresent);
            }
            // citymindist is a Chebyshev radius: anything strictly closer
            // than the configured distance is too close.
            if city.position.chebyshev(pos) < rules.settings.citymindist {
                return Err(FoundingError::TooClose);
            }
        }

        Ok(())
    }

    fn check_native(
        grid: &TileGrid,
        rules: &CompiledRules,
        unit: &Unit,
        pos: Pos,
        air_exempt: bool,
    ) -> Result<(), FoundingError> {
        let Some(unit_type) = rules.unit_type(unit.type_id) else {
            warn!(type_id = unit.type_id.raw, "unknown unit type, denying founding");
            return Err(FoundingError::NotNativeTerrain);
        };
        if air_exempt && unit_type.class == MoveClass::Air {
            return Ok(());
        }
        let native = grid
            .get(pos)
            .and_then(|tile| rules.terrain(tile.terrain))
            .is_some_and(|terrain| terrain.native_to(unit_type.class));
        if !native {
            return Err(FoundingError::NotNativeTerrain);
        }
        Ok(())
    }

    /// Separate occupancy check, invoked by the caller when relevant rather
    /// than as part of the short-circuit chain.
    pub fn check_enemy_occupancy(
        rules: &CompiledRules,
        units: &EntityStore<Unit>,
        player: PlayerId,
        pos: Pos,
    ) -> Result<(), FoundingError> {
        if !rules.settings.founding.enemy_blocks {
            return Ok(());
        }
        let hostile = units
            .iter_ordered()
            .any(|(_, unit)| unit.position == pos && unit.owner != player);
        if hostile {
            return Err(FoundingError::EnemyPresent);
        }
        Ok(())
    }
}
