use std::cmp::Reverse;
use std::collections::BinaryHeap;

use tracing::error;

use super::types::{CellCoord, MAX_ASTAR_ITERATIONS};
use crate::sim::flow_field::{FlowField, COST_OBSTACLE};

#[derive(Clone, Copy, Debug)]
struct AStarCell {
    g: u32,
    visited: bool,
    parent: Option<CellCoord>,
}

impl Default for AStarCell {
    fn default() -> Self {
        Self {
            g: u32::MAX,
            visited: false,
            parent: None,
        }
    }
}

fn heuristic(a: CellCoord, b: CellCoord) -> u32 {
    a.manhattan(b)
}

/// Single-region A* over a fixed window of the fine grid.
///
/// The cell arena is owned by the pathfinder and reused across queries;
/// `reset_cells` runs at the start of every query so no state leaks between
/// them. Expansion is 4-directional with the Manhattan heuristic and integer
/// costs. Obstacle cells are marked visited on first touch and never
/// expanded.
#[derive(Clone, Debug, Default)]
pub struct AStarPathfinder {
    width: usize,
    height: usize,
    cells: Vec<AStarCell>,
}

impl AStarPathfinder {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![AStarCell::default(); width * height],
        }
    }

    pub fn reset_cells(&mut self) {
        self.cells.fill(AStarCell::default());
    }

    #[inline]
    fn local_index(&self, base: CellCoord, c: CellCoord) -> Option<usize> {
        let lx = c.x.checked_sub(base.x)?;
        let ly = c.y.checked_sub(base.y)?;
        if lx < self.width && ly < self.height {
            Some(ly * self.width + lx)
        } else {
            None
        }
    }

    /// Shortest path from `start` to `goal`, both in fine-grid coordinates,
    /// confined to the window anchored at `base`. Returns the full cell
    /// sequence including both endpoints, or `None` when either endpoint is
    /// invalid or no path exists within the window.
    pub fn find_path(
        &mut self,
        flow: &FlowField,
        base: CellCoord,
        start: CellCoord,
        goal: CellCoord,
    ) -> Option<Vec<CellCoord>> {
        let start_idx = self.local_index(base, start)?;
        self.local_index(base, goal)?;
        if !flow.is_walkable(start.x, start.y) || !flow.is_walkable(goal.x, goal.y) {
            return None;
        }

        self.reset_cells();
        self.cells[start_idx].g = 0;

        let mut open: BinaryHeap<Reverse<(u32, CellCoord)>> = BinaryHeap::new();
        open.push(Reverse((heuristic(start, goal), start)));

        let mut iterations = 0usize;
        while let Some(Reverse((_, current))) = open.pop() {
            iterations += 1;
            if iterations > MAX_ASTAR_ITERATIONS {
                error!(
                    "[ASTAR] exceeded {} iterations, start {:?} goal {:?} base {:?}",
                    MAX_ASTAR_ITERATIONS, start, goal, base
                );
                return None;
            }

            // The open set only ever holds in-window cells.
            let Some(current_idx) = self.local_index(base, current) else {
                continue;
            };
            if self.cells[current_idx].visited {
                continue;
            }
            self.cells[current_idx].visited = true;

            if current == goal {
                return Some(self.reconstruct(base, current));
            }

            let neighbors = [
                (current.x.wrapping_sub(1), current.y),
                (current.x + 1, current.y),
                (current.x, current.y.wrapping_sub(1)),
                (current.x, current.y + 1),
            ];

            for (nx, ny) in neighbors {
                let neighbor = CellCoord::new(nx, ny);
                let Some(n_idx) = self.local_index(base, neighbor) else {
                    continue;
                };
                if self.cells[n_idx].visited {
                    continue;
                }
                if flow.cost(nx, ny) == Some(COST_OBSTACLE) {
                    // First touch of an obstacle closes it for good.
                    self.cells[n_idx].visited = true;
                    continue;
                }

                let tentative = self.cells[current_idx].g + 1;
                if tentative < self.cells[n_idx].g {
                    self.cells[n_idx].g = tentative;
                    self.cells[n_idx].parent = Some(current);
                    open.push(Reverse((tentative + heuristic(neighbor, goal), neighbor)));
                }
            }
        }

        None
    }

    /// Path length in cells (including both endpoints), or `None`.
    pub fn path_len(
        &mut self,
        flow: &FlowField,
        base: CellCoord,
        start: CellCoord,
        goal: CellCoord,
    ) -> Option<u32> {
        self.find_path(flow, base, start, goal).map(|p| p.len() as u32)
    }

    fn reconstruct(&self, base: CellCoord, goal: CellCoord) -> Vec<CellCoord> {
        let mut path = vec![goal];
        let mut current = goal;
        while let Some(parent) = self
            .local_index(base, current)
            .and_then(|idx| self.cells[idx].parent)
        {
            path.push(parent);
            current = parent;
        }
        path.reverse();
        path
    }
}
