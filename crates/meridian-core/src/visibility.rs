use meridian_protocol::{Event, PlayerId, Pos, TerrainId};

use crate::entities::EntityStore;
use crate::map::{Tile, TileGrid};
use crate::rules::CompiledRules;
use crate::unit::Unit;

/// Per-player fog-of-war masks, indexed like the tile grid.
#[derive(Clone, Debug)]
pub struct PlayerVisibility {
    explored: Vec<bool>,
    visible: Vec<bool>,
}

impl PlayerVisibility {
    pub fn new(map_len: usize) -> Self {
        Self {
            explored: vec![false; map_len],
            visible: vec![false; map_len],
        }
    }

    pub fn explored(&self) -> &[bool] {
        &self.explored
    }

    pub fn visible(&self) -> &[bool] {
        &self.visible
    }

    pub fn mark_explored(&mut self, index: usize) {
        if let Some(slot) = self.explored.get_mut(index) {
            *slot = true;
        }
    }
}

/// What one player is allowed to know about a tile.
#[derive(Clone, Debug, PartialEq)]
pub enum TileView {
    /// Never explored: terrain withheld.
    Unknown,
    /// Explored but not currently visible: static terrain only.
    Fogged { terrain: TerrainId },
    /// Currently visible: full tile state.
    Visible { tile: Tile },
}

/// Computes, per player, the tiles currently visible and accumulates the
/// tiles ever explored. The explored set never shrinks.
#[derive(Clone, Debug)]
pub struct VisibilityEngine {
    map_len: usize,
    players: Vec<PlayerVisibility>,
}

impl VisibilityEngine {
    pub fn new(map_len: usize, player_count: usize) -> Self {
        Self {
            map_len,
            players: (0..player_count)
                .map(|_| PlayerVisibility::new(map_len))
                .collect(),
        }
    }

    pub fn player(&self, player: PlayerId) -> Option<&PlayerVisibility> {
        self.players.get(player.0 as usize)
    }

    pub fn player_mut(&mut self, player: PlayerId) -> Option<&mut PlayerVisibility> {
        self.players.get_mut(player.0 as usize)
    }

    pub fn is_explored(&self, player: PlayerId, index: usize) -> bool {
        self.player(player)
            .and_then(|v| v.explored.get(index).copied())
            .unwrap_or(false)
    }

    pub fn is_visible(&self, player: PlayerId, index: usize) -> bool {
        self.player(player)
            .and_then(|v| v.visible.get(index).copied())
            .unwrap_or(false)
    }

    /// Clear and rebuild `player`'s visible set as the union of sight circles
    /// around their units, then fold it into the explored set. Returns
    /// player-scoped reveal/hide events for the delta.
    ///
    /// Triggered on unit create/move/destroy and on explicit refresh; absent
    /// map data just yields an empty result.
    pub fn refresh(
        &mut self,
        grid: &TileGrid,
        rules: &CompiledRules,
        units: &EntityStore<Unit>,
        player: PlayerId,
    ) -> Vec<Event> {
        let new_visible = Self::compute_visible(grid, rules, units, player, self.map_len);

        let Some(vis) = self.players.get_mut(player.0 as usize) else {
            return Vec::new();
        };
        if new_visible.len() != vis.visible.len() {
            return Vec::new();
        }

        let mut events = Vec::new();
        for (index, &now_visible) in new_visible.iter().enumerate() {
            let was_visible = vis.visible[index];

            if now_visible {
                vis.explored[index] = true;
            }

            if now_visible && !was_visible {
                if let (Some(pos), Some(tile)) =
                    (grid.pos_at_index(index), grid.tiles().get(index))
                {
                    events.push(Event::TileRevealed {
                        pos,
                        terrain: tile.terrain,
                    });
                }
            } else if !now_visible && was_visible {
                if let Some(pos) = grid.pos_at_index(index) {
                    events.push(Event::TileHidden { pos });
                }
            }

            vis.visible[index] = now_visible;
        }

        events
    }

    fn compute_visible(
        grid: &TileGrid,
        rules: &CompiledRules,
        units: &EntityStore<Unit>,
        player: PlayerId,
        map_len: usize,
    ) -> Vec<bool> {
        let mut visible = vec![false; map_len];

        for (_unit_id, unit) in units.iter_ordered() {
            if unit.owner != player {
                continue;
            }
            let range = rules.unit_type(unit.type_id).map_or(0, |t| t.vision_range);
            if range < 0 {
                continue;
            }
            let range_sq = i64::from(range) * i64::from(range);
            for index in grid.indices_in_radius_sq(unit.position, range_sq) {
                if let Some(slot) = visible.get_mut(index) {
                    *slot = true;
                }
            }
        }

        visible
    }

    /// Project a tile for one player: unknown, fogged (terrain only), or
    /// fully visible.
    pub fn tile_view(&self, grid: &TileGrid, player: PlayerId, pos: Pos) -> TileView {
        let Some(index) = grid.index_of(pos) else {
            return TileView::Unknown;
        };
        let Some(tile) = grid.tiles().get(index).copied() else {
            return TileView::Unknown;
        };
        if self.is_visible(player, index) {
            TileView::Visible { tile }
        } else if self.is_explored(player, index) {
            TileView::Fogged {
                terrain: tile.terrain,
            }
        } else {
            TileView::Unknown
        }
    }
}
