use std::collections::BTreeMap;

use meridian_protocol::{BorderSourceId, BorderSourceKind, PlayerId, Pos};

use crate::map::TileGrid;
use crate::rules::BorderSettings;

/// An entity projecting territorial claim onto nearby tiles.
#[derive(Clone, Debug)]
pub struct BorderSource {
    pub id: BorderSourceId,
    pub position: Pos,
    pub owner: PlayerId,
    pub kind: BorderSourceKind,
    pub strength: i64,
    pub radius_sq: i64,
}

/// Maintains the derived tile→owner mapping consistent with the current set
/// of border sources. Never fails: the result is always a total (possibly
/// partial) ownership mapping, or an empty one when borders are disabled.
#[derive(Clone, Debug)]
pub struct BorderEngine {
    settings: BorderSettings,
    /// Keyed by id so full recomputes replay sources in ascending id order.
    sources: BTreeMap<BorderSourceId, BorderSource>,
    ownership: Vec<Option<PlayerId>>,
    next_id: u32,
}

impl BorderEngine {
    pub fn new(map_len: usize, settings: BorderSettings) -> Self {
        Self {
            settings,
            sources: BTreeMap::new(),
            ownership: vec![None; map_len],
            next_id: 0,
        }
    }

    pub fn owner_at(&self, grid: &TileGrid, pos: Pos) -> Option<PlayerId> {
        let index = grid.index_of(pos)?;
        self.ownership.get(index).copied().flatten()
    }

    pub fn ownership(&self) -> &[Option<PlayerId>] {
        &self.ownership
    }

    pub fn sources(&self) -> impl Iterator<Item = &BorderSource> {
        self.sources.values()
    }

    fn strength_for(&self, kind: BorderSourceKind, population: u8) -> i64 {
        match kind {
            BorderSourceKind::City => i64::from(population) + 2,
            BorderSourceKind::Base => 1,
        }
    }

    fn radius_sq_for(&self, kind: BorderSourceKind, population: u8) -> i64 {
        if !self.settings.enabled {
            return 0;
        }
        let bonus = match kind {
            BorderSourceKind::City => {
                (i64::from(population) * self.settings.size_effect).min(self.settings.size_bonus_cap)
            }
            BorderSourceKind::Base => 0,
        };
        self.settings.radius_sq_base + bonus
    }

    /// Add a source and claim tiles incrementally. Returns the indices whose
    /// owner changed.
    pub fn add_source(
        &mut self,
        grid: &TileGrid,
        position: Pos,
        owner: PlayerId,
        kind: BorderSourceKind,
        population: u8,
    ) -> (BorderSourceId, Vec<usize>) {
        let id = BorderSourceId(self.next_id);
        self.next_id += 1;
        self.insert_source(id, position, owner, kind, population);
        let changed = self.claim_source(grid, id);
        (id, changed)
    }

    /// Re-seat a persisted source under its original id (recovery replay).
    pub fn add_source_with_id(
        &mut self,
        id: BorderSourceId,
        position: Pos,
        owner: PlayerId,
        kind: BorderSourceKind,
        population: u8,
    ) {
        self.next_id = self.next_id.max(id.0 + 1);
        self.insert_source(id, position, owner, kind, population);
    }

    fn insert_source(
        &mut self,
        id: BorderSourceId,
        position: Pos,
        owner: PlayerId,
        kind: BorderSourceKind,
        population: u8,
    ) {
        let source = BorderSource {
            id,
            position,
            owner,
            kind,
            strength: self.strength_for(kind, population),
            radius_sq: self.radius_sq_for(kind, population),
        };
        self.sources.insert(id, source);
    }

    /// Update a city source after growth and re-claim with the new strength.
    pub fn sync_city_population(
        &mut self,
        grid: &TileGrid,
        position: Pos,
        population: u8,
    ) -> Vec<usize> {
        let id = self
            .sources
            .values()
            .find(|s| s.kind == BorderSourceKind::City && s.position == position)
            .map(|s| s.id);
        let Some(id) = id else {
            return Vec::new();
        };
        let strength = self.strength_for(BorderSourceKind::City, population);
        let radius_sq = self.radius_sq_for(BorderSourceKind::City, population);
        if let Some(source) = self.sources.get_mut(&id) {
            source.strength = strength;
            source.radius_sq = radius_sq;
        }
        self.claim_source(grid, id)
    }

    /// Remove the source at `position` and rebuild ownership from scratch.
    /// Removal can retroactively invalidate claims that depended on the
    /// removed source, so a full replay is required. Known O(sources ×
    /// radius²); kept acceptable because removal is rare (city destruction).
    pub fn remove_source_at(&mut self, grid: &TileGrid, position: Pos) -> Vec<usize> {
        let ids: Vec<BorderSourceId> = self
            .sources
            .values()
            .filter(|s| s.position == position)
            .map(|s| s.id)
            .collect();
        if ids.is_empty() {
            return Vec::new();
        }
        for id in ids {
            self.sources.remove(&id);
        }
        self.recompute_all(grid)
    }

    /// Clear all ownership and replay every source in ascending id order.
    /// Returns the indices whose owner differs from before.
    pub fn recompute_all(&mut self, grid: &TileGrid) -> Vec<usize> {
        let before = self.ownership.clone();
        self.ownership = vec![None; self.ownership.len()];

        let ids: Vec<BorderSourceId> = self.sources.keys().copied().collect();
        for id in ids {
            self.claim_source(grid, id);
        }

        before
            .iter()
            .zip(self.ownership.iter())
            .enumerate()
            .filter(|(_, (old, new))| old != new)
            .map(|(index, _)| index)
            .collect()
    }

    /// Iterate one source's radius and resolve claims tile by tile.
    fn claim_source(&mut self, grid: &TileGrid, id: BorderSourceId) -> Vec<usize> {
        if !self.settings.enabled {
            return Vec::new();
        }
        let Some(source) = self.sources.get(&id).cloned() else {
            return Vec::new();
        };

        let mut changed = Vec::new();
        for index in grid.indices_in_radius_sq(source.position, source.radius_sq) {
            let Some(tile_pos) = grid.pos_at_index(index) else {
                continue;
            };
            let incumbent = self.ownership.get(index).copied().flatten();

            let claims = match incumbent {
                None => true,
                Some(owner) if owner == source.owner => false,
                Some(owner) => {
                    self.beats_incumbent(&source, owner, tile_pos)
                }
            };

            if claims {
                self.ownership[index] = Some(source.owner);
                changed.push(index);
            }
        }
        changed
    }

    /// Whether `source`'s strength-at-distance for `tile_pos` strictly
    /// exceeds the best any source of `incumbent` produces there. Strength
    /// decays with squared distance (`strength² / d²`, maximal at d = 0);
    /// comparison cross-multiplies to stay exact.
    fn beats_incumbent(&self, source: &BorderSource, incumbent: PlayerId, tile_pos: Pos) -> bool {
        let cand_d2 = source.position.distance_sq(tile_pos);
        if cand_d2 == 0 {
            return true;
        }
        let cand_s2 = source.strength * source.strength;

        for defender in self.sources.values() {
            if defender.owner != incumbent {
                continue;
            }
            let def_d2 = defender.position.distance_sq(tile_pos);
            if def_d2 > defender.radius_sq {
                continue;
            }
            if def_d2 == 0 {
                return false;
            }
            let def_s2 = defender.strength * defender.strength;
            // cand_s2 / cand_d2 > def_s2 / def_d2
            if cand_s2 * def_d2 <= def_s2 * cand_d2 {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_protocol::TerrainId;

    fn grid(width: u32, height: u32) -> TileGrid {
        TileGrid::new(width, height, TerrainId::new(0))
    }

    fn engine(grid: &TileGrid) -> BorderEngine {
        BorderEngine::new(grid.len(), BorderSettings::default())
    }

    #[test]
    fn single_source_claims_exactly_its_radius() {
        let grid = grid(12, 12);
        let mut borders = engine(&grid);
        let center = Pos::new(6, 6);
        // Population 1 city: radius_sq = 10 + min(1*1, 15) = 11.
        borders.add_source(&grid, center, PlayerId(0), BorderSourceKind::City, 1);

        for index in 0..grid.len() {
            let pos = grid.pos_at_index(index).expect("pos");
            let owner = borders.ownership()[index];
            if center.distance_sq(pos) <= 11 {
                assert_eq!(owner, Some(PlayerId(0)), "{pos:?}");
            } else {
                assert_eq!(owner, None, "{pos:?}");
            }
        }
    }

    #[test]
    fn stronger_city_owns_the_midpoint() {
        let grid = grid(16, 8);
        let mut borders = engine(&grid);
        // Two cities four tiles apart; the midpoint sits at distance 2 from
        // each. Population 6 beats population 3 at equal distance.
        borders.add_source(&grid, Pos::new(4, 4), PlayerId(0), BorderSourceKind::City, 3);
        borders.add_source(&grid, Pos::new(8, 4), PlayerId(1), BorderSourceKind::City, 6);

        assert_eq!(
            borders.owner_at(&grid, Pos::new(6, 4)),
            Some(PlayerId(1))
        );
        // Each city keeps its own tile regardless of the neighbor's strength.
        assert_eq!(borders.owner_at(&grid, Pos::new(4, 4)), Some(PlayerId(0)));
        assert_eq!(borders.owner_at(&grid, Pos::new(8, 4)), Some(PlayerId(1)));
        // The ownership mapping stays total over the grid.
        assert_eq!(borders.ownership().len(), grid.len());
    }

    #[test]
    fn equal_strength_does_not_flip_ownership() {
        let grid = grid(16, 8);
        let mut borders = engine(&grid);
        borders.add_source(&grid, Pos::new(4, 4), PlayerId(0), BorderSourceKind::City, 3);
        borders.add_source(&grid, Pos::new(8, 4), PlayerId(1), BorderSourceKind::City, 3);

        // Equal strength at equal distance: the incumbent keeps the midpoint.
        assert_eq!(borders.owner_at(&grid, Pos::new(6, 4)), Some(PlayerId(0)));
    }

    #[test]
    fn removal_triggers_full_recompute() {
        let grid = grid(16, 8);
        let mut borders = engine(&grid);
        borders.add_source(&grid, Pos::new(4, 4), PlayerId(0), BorderSourceKind::City, 3);
        borders.add_source(&grid, Pos::new(7, 4), PlayerId(1), BorderSourceKind::City, 8);

        // The strong city grabbed tiles near the weak one.
        assert_eq!(borders.owner_at(&grid, Pos::new(6, 4)), Some(PlayerId(1)));

        let changed = borders.remove_source_at(&grid, Pos::new(7, 4));
        assert!(!changed.is_empty());
        // With the strong city gone, the weak one re-owns its full radius.
        assert_eq!(borders.owner_at(&grid, Pos::new(6, 4)), Some(PlayerId(0)));
        assert!(borders
            .ownership()
            .iter()
            .all(|o| *o != Some(PlayerId(1))));
    }

    #[test]
    fn base_sources_project_strength_one() {
        let grid = grid(12, 12);
        let mut borders = engine(&grid);
        borders.add_source(&grid, Pos::new(5, 5), PlayerId(0), BorderSourceKind::Base, 0);

        assert_eq!(borders.owner_at(&grid, Pos::new(5, 5)), Some(PlayerId(0)));
        assert_eq!(borders.owner_at(&grid, Pos::new(5, 8)), Some(PlayerId(0)));
        // Base radius has no population bonus: radius_sq = 10, d2 = 16 is out.
        assert_eq!(borders.owner_at(&grid, Pos::new(5, 9)), None);
    }

    #[test]
    fn disabled_borders_claim_nothing() {
        let grid = grid(8, 8);
        let mut borders = BorderEngine::new(
            grid.len(),
            BorderSettings {
                enabled: false,
                ..BorderSettings::default()
            },
        );
        borders.add_source(&grid, Pos::new(4, 4), PlayerId(0), BorderSourceKind::City, 5);
        assert!(borders.ownership().iter().all(Option::is_none));
    }

    #[test]
    fn growth_extends_the_claim() {
        let grid = grid(16, 16);
        let mut borders = engine(&grid);
        borders.add_source(&grid, Pos::new(8, 8), PlayerId(0), BorderSourceKind::City, 1);
        // radius_sq 11: d2 = 16 not owned yet.
        assert_eq!(borders.owner_at(&grid, Pos::new(12, 8)), None);

        let changed = borders.sync_city_population(&grid, Pos::new(8, 8), 6);
        assert!(!changed.is_empty());
        // radius_sq 16 now covers it.
        assert_eq!(borders.owner_at(&grid, Pos::new(12, 8)), Some(PlayerId(0)));
    }

    #[test]
    fn recompute_is_order_stable() {
        let grid = grid(16, 8);
        let mut a = engine(&grid);
        a.add_source(&grid, Pos::new(4, 4), PlayerId(0), BorderSourceKind::City, 3);
        a.add_source(&grid, Pos::new(8, 4), PlayerId(1), BorderSourceKind::City, 6);
        a.recompute_all(&grid);
        let first = a.ownership().to_vec();
        a.recompute_all(&grid);
        assert_eq!(a.ownership(), first.as_slice());
    }
}
