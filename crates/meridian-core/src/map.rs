use serde::{Deserialize, Serialize};

use meridian_protocol::{Pos, TerrainId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub terrain: TerrainId,
    pub elevation: u8,
    pub river: bool,
}

/// Row-major tile storage for one match. Non-wrapping rectangle; anything
/// outside the bounds simply does not exist.
#[derive(Clone, Debug)]
pub struct TileGrid {
    width: u32,
    height: u32,
    tiles: Vec<Tile>,
}

impl TileGrid {
    pub fn new(width: u32, height: u32, default_terrain: TerrainId) -> Self {
        let tiles = vec![
            Tile {
                terrain: default_terrain,
                elevation: 0,
                river: false,
            };
            (width as usize) * (height as usize)
        ];
        Self {
            width,
            height,
            tiles,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn in_bounds(&self, pos: Pos) -> bool {
        pos.x >= 0 && pos.y >= 0 && pos.x < self.width as i32 && pos.y < self.height as i32
    }

    pub fn index_of(&self, pos: Pos) -> Option<usize> {
        if !self.in_bounds(pos) {
            return None;
        }
        Some((pos.y as usize) * (self.width as usize) + (pos.x as usize))
    }

    pub fn pos_at_index(&self, index: usize) -> Option<Pos> {
        if index >= self.tiles.len() || self.width == 0 {
            return None;
        }
        let x = (index % self.width as usize) as i32;
        let y = (index / self.width as usize) as i32;
        Some(Pos::new(x, y))
    }

    pub fn get(&self, pos: Pos) -> Option<&Tile> {
        self.index_of(pos).map(|i| &self.tiles[i])
    }

    pub fn get_mut(&mut self, pos: Pos) -> Option<&mut Tile> {
        self.index_of(pos).map(move |i| &mut self.tiles[i])
    }

    /// Indices of the up-to-eight in-bounds neighbors, in `Pos::OFFSETS`
    /// order. Out-of-bounds slots are `None`.
    pub fn neighbors_indices(&self, index: usize) -> [Option<usize>; 8] {
        let Some(pos) = self.pos_at_index(index) else {
            return [None; 8];
        };
        let mut out = [None; 8];
        for (i, (dx, dy)) in Pos::OFFSETS.into_iter().enumerate() {
            out[i] = self.index_of(Pos::new(pos.x + dx, pos.y + dy));
        }
        out
    }

    /// Tile indices whose squared Euclidean distance from `center` is at most
    /// `radius_sq`, in ascending index order. Empty when `center` is out of
    /// bounds or `radius_sq` is negative.
    pub fn indices_in_radius_sq(&self, center: Pos, radius_sq: i64) -> Vec<usize> {
        if !self.in_bounds(center) || radius_sq < 0 {
            return Vec::new();
        }
        let reach = (radius_sq as f64).sqrt().floor() as i32;

        let min_y = (center.y - reach).max(0);
        let max_y = (center.y + reach).min(self.height as i32 - 1);

        let mut out = Vec::new();
        for y in min_y..=max_y {
            let min_x = (center.x - reach).max(0);
            let max_x = (center.x + reach).min(self.width as i32 - 1);
            for x in min_x..=max_x {
                let pos = Pos::new(x, y);
                if center.distance_sq(pos) > radius_sq {
                    continue;
                }
                if let Some(index) = self.index_of(pos) {
                    out.push(index);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> TileGrid {
        TileGrid::new(8, 6, TerrainId::new(0))
    }

    #[test]
    fn index_roundtrip() {
        let grid = grid();
        for index in 0..grid.len() {
            let pos = grid.pos_at_index(index).expect("in range");
            assert_eq!(grid.index_of(pos), Some(index));
        }
    }

    #[test]
    fn out_of_bounds_rejected() {
        let grid = grid();
        assert_eq!(grid.index_of(Pos::new(-1, 0)), None);
        assert_eq!(grid.index_of(Pos::new(8, 0)), None);
        assert_eq!(grid.index_of(Pos::new(0, 6)), None);
    }

    #[test]
    fn corner_has_three_neighbors() {
        let grid = grid();
        let corner = grid.index_of(Pos::new(0, 0)).expect("corner");
        let count = grid
            .neighbors_indices(corner)
            .into_iter()
            .flatten()
            .count();
        assert_eq!(count, 3);
    }

    #[test]
    fn interior_has_eight_neighbors() {
        let grid = grid();
        let interior = grid.index_of(Pos::new(3, 3)).expect("interior");
        let count = grid
            .neighbors_indices(interior)
            .into_iter()
            .flatten()
            .count();
        assert_eq!(count, 8);
    }

    #[test]
    fn radius_sq_zero_is_center_only() {
        let grid = grid();
        let center = Pos::new(4, 3);
        let indices = grid.indices_in_radius_sq(center, 0);
        assert_eq!(indices, vec![grid.index_of(center).unwrap()]);
    }

    #[test]
    fn radius_sq_two_includes_diagonals() {
        let grid = grid();
        let center = Pos::new(4, 3);
        let indices = grid.indices_in_radius_sq(center, 2);
        // Center plus all eight neighbors: orthogonals at d2=1, diagonals at d2=2.
        assert_eq!(indices.len(), 9);
    }

    #[test]
    fn radius_clipped_at_map_edge() {
        let grid = grid();
        let indices = grid.indices_in_radius_sq(Pos::new(0, 0), 2);
        assert_eq!(indices.len(), 4);
    }
}
