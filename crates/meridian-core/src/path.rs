use std::cmp::Reverse;
use std::collections::BinaryHeap;

use meridian_protocol::{Direction, MoveClass, PathResult, PathStep, Pos};

use crate::map::TileGrid;
use crate::rules::CompiledRules;

/// Narrow capability the pathfinder reads terrain through. Keeps the engine
/// free of back-references into session state.
pub trait TerrainCosts {
    /// Movement cost for a unit of `class` entering the tile at `index`.
    /// `None` means the tile is impassable for the class or has no terrain
    /// data; such tiles are never expanded.
    fn enter_cost(&self, index: usize, class: MoveClass) -> Option<i32>;

    /// Lower bound on `enter_cost` across every tile the class can enter.
    /// The heuristic scales by this, so it must never exceed the true
    /// minimum; returning less only costs speed, never correctness.
    fn min_enter_cost(&self, class: MoveClass) -> i32 {
        let _ = class;
        1
    }
}

/// Terrain costs backed by the tile grid and the compiled ruleset.
pub struct RulesetCosts<'a> {
    grid: &'a TileGrid,
    rules: &'a CompiledRules,
}

impl<'a> RulesetCosts<'a> {
    pub fn new(grid: &'a TileGrid, rules: &'a CompiledRules) -> Self {
        Self { grid, rules }
    }
}

impl TerrainCosts for RulesetCosts<'_> {
    fn enter_cost(&self, index: usize, class: MoveClass) -> Option<i32> {
        let tile = self.grid.tiles().get(index)?;
        let terrain = self.rules.terrain(tile.terrain)?;
        if !terrain.native_to(class) {
            return None;
        }
        Some(terrain.movement_cost)
    }

    fn min_enter_cost(&self, class: MoveClass) -> i32 {
        self.rules
            .terrains
            .iter()
            .filter(|terrain| terrain.native_to(class))
            .map(|terrain| terrain.movement_cost)
            .min()
            .unwrap_or(1)
            .max(1)
    }
}

/// Computes legal movement paths over terrain. Stateless between queries;
/// every call reads the map through the injected capability.
pub struct PathfindingEngine;

impl PathfindingEngine {
    /// Per-tile entry cost for client previews: the terrain cost, or -1 when
    /// the tile is impassable for the class or carries no terrain data.
    pub fn tile_cost(
        grid: &TileGrid,
        costs: &dyn TerrainCosts,
        class: MoveClass,
        pos: Pos,
    ) -> i32 {
        grid.index_of(pos)
            .and_then(|index| costs.enter_cost(index, class))
            .unwrap_or(-1)
    }

    /// Cheapest legal path from `start` to `goal`, or an invalid result when
    /// none exists.
    ///
    /// A* over the 8-connected grid. The heuristic is Chebyshev distance
    /// scaled by the cheapest enterable terrain for the class: a step moves at
    /// most one Chebyshev unit and pays at least that minimum, so the estimate
    /// never overcounts and stays consistent along any edge.
    /// Ties on f-cost break toward the lower heuristic (closer to the goal),
    /// then the lower tile index, so repeated queries are byte-identical.
    /// Diagonal steps pay the destination tile's full terrain cost.
    pub fn find_path(
        grid: &TileGrid,
        costs: &dyn TerrainCosts,
        class: MoveClass,
        start: Pos,
        goal: Pos,
    ) -> PathResult {
        let Some(start_index) = grid.index_of(start) else {
            return PathResult::invalid();
        };
        let Some(goal_index) = grid.index_of(goal) else {
            return PathResult::invalid();
        };

        if start_index == goal_index {
            return PathResult {
                steps: vec![PathStep {
                    pos: start,
                    cost: 0,
                    dir: None,
                }],
                total_cost: 0,
                valid: true,
            };
        }

        if costs.enter_cost(goal_index, class).is_none() {
            return PathResult::invalid();
        }

        let mut dist = vec![i32::MAX; grid.len()];
        let mut parent: Vec<Option<usize>> = vec![None; grid.len()];
        dist[start_index] = 0;

        let min_cost = costs.min_enter_cost(class).max(1);
        let heuristic = |index: usize| -> i32 {
            grid.pos_at_index(index)
                .map_or(0, |pos| pos.chebyshev(goal).saturating_mul(min_cost))
        };

        // Heap entries are (f, h, index); stale entries are skipped on pop.
        let mut heap: BinaryHeap<Reverse<(i32, i32, usize)>> = BinaryHeap::new();
        let start_h = heuristic(start_index);
        heap.push(Reverse((start_h, start_h, start_index)));

        // Guards against pathological inputs; a tile is normally popped once.
        let max_pops = grid.len();
        let mut pops = 0usize;

        while let Some(Reverse((f, _h, index))) = heap.pop() {
            let g = dist[index];
            if g == i32::MAX || f != g.saturating_add(heuristic(index)) {
                continue;
            }

            if index == goal_index {
                return Self::reconstruct(grid, costs, class, &parent, start_index, goal_index, g);
            }

            pops += 1;
            if pops > max_pops {
                return PathResult::invalid();
            }

            for neighbor in grid.neighbors_indices(index).into_iter().flatten() {
                let Some(step_cost) = costs.enter_cost(neighbor, class) else {
                    continue;
                };
                let new_g = g.saturating_add(step_cost);
                if new_g < dist[neighbor] {
                    dist[neighbor] = new_g;
                    parent[neighbor] = Some(index);
                    let h = heuristic(neighbor);
                    heap.push(Reverse((new_g.saturating_add(h), h, neighbor)));
                }
            }
        }

        PathResult::invalid()
    }

    fn reconstruct(
        grid: &TileGrid,
        costs: &dyn TerrainCosts,
        class: MoveClass,
        parent: &[Option<usize>],
        start_index: usize,
        goal_index: usize,
        total_cost: i32,
    ) -> PathResult {
        let mut indices = vec![goal_index];
        let mut cursor = goal_index;
        while cursor != start_index {
            let Some(prev) = parent.get(cursor).copied().flatten() else {
                return PathResult::invalid();
            };
            indices.push(prev);
            cursor = prev;
        }
        indices.reverse();

        let mut steps = Vec::with_capacity(indices.len());
        let mut prev_pos: Option<Pos> = None;
        for index in indices {
            let Some(pos) = grid.pos_at_index(index) else {
                return PathResult::invalid();
            };
            let (cost, dir) = match prev_pos {
                None => (0, None),
                Some(prev) => (
                    costs.enter_cost(index, class).unwrap_or(-1),
                    Direction::between(prev, pos),
                ),
            };
            steps.push(PathStep { pos, cost, dir });
            prev_pos = Some(pos);
        }

        PathResult {
            steps,
            total_cost,
            valid: true,
        }
    }
}
