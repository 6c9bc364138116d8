use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::fixed_math::{FixedNum, FixedVec2};
use super::grid::SpatialGrid;

/// Traversal cost of an unobstructed cell.
pub const COST_FREE: u8 = 1;

/// Impermeable obstacle sentinel. Once a cell carries this cost, ordinary
/// cost writes are rejected until the obstacle is explicitly cleared.
pub const COST_OBSTACLE: u8 = u8::MAX;

/// "Not part of this pass" sentinel: the cell neither blocks nor is
/// traversed. Used to confine integration to a pre-validated subset of the
/// map during global routing.
pub const COST_IGNORED: u8 = u8::MAX - 1;

/// Costs at or above this ceiling never propagate in the integration pass.
pub const MAX_INTEGRATION_COST: u8 = COST_IGNORED;

/// Integration cost of a cell the propagation never reached.
pub const INTEGRATION_UNREACHABLE: u32 = u32::MAX;

/// Symbolic movement direction: `None` plus the eight compass directions.
///
/// The mapping to grid offsets and world vectors is an explicit pure
/// function, never an implicit conversion.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowDirection {
    #[default]
    None,
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl FlowDirection {
    /// The eight compass directions, cardinals first. Scan order matters:
    /// ties in the vector-field descent resolve toward the earliest entry.
    pub const COMPASS: [FlowDirection; 8] = [
        FlowDirection::West,
        FlowDirection::East,
        FlowDirection::South,
        FlowDirection::North,
        FlowDirection::SouthWest,
        FlowDirection::NorthWest,
        FlowDirection::SouthEast,
        FlowDirection::NorthEast,
    ];

    /// Grid offset of this direction; `None` maps to (0, 0).
    pub fn to_offset(self) -> (i32, i32) {
        match self {
            FlowDirection::None => (0, 0),
            FlowDirection::North => (0, 1),
            FlowDirection::NorthEast => (1, 1),
            FlowDirection::East => (1, 0),
            FlowDirection::SouthEast => (1, -1),
            FlowDirection::South => (0, -1),
            FlowDirection::SouthWest => (-1, -1),
            FlowDirection::West => (-1, 0),
            FlowDirection::NorthWest => (-1, 1),
        }
    }

    pub fn from_offset(dx: i32, dy: i32) -> FlowDirection {
        match (dx.signum(), dy.signum()) {
            (0, 1) => FlowDirection::North,
            (1, 1) => FlowDirection::NorthEast,
            (1, 0) => FlowDirection::East,
            (1, -1) => FlowDirection::SouthEast,
            (0, -1) => FlowDirection::South,
            (-1, -1) => FlowDirection::SouthWest,
            (-1, 0) => FlowDirection::West,
            (-1, 1) => FlowDirection::NorthWest,
            _ => FlowDirection::None,
        }
    }

    /// Unit world-space vector for this direction; zero for `None`.
    pub fn to_vec2(self) -> FixedVec2 {
        let (dx, dy) = self.to_offset();
        FixedVec2::new(FixedNum::from_num(dx), FixedNum::from_num(dy)).normalize()
    }
}

/// Per-cell navigation state.
///
/// `best_cost` starts at max and only ever decreases during a propagation
/// pass; `best_direction` is derived strictly from neighbors with lower
/// `best_cost`, so it can never point uphill or into an obstacle.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct FlowCell {
    pub cost: u8,
    pub best_cost: u32,
    pub best_direction: FlowDirection,
}

impl Default for FlowCell {
    fn default() -> Self {
        Self {
            cost: COST_FREE,
            best_cost: INTEGRATION_UNREACHABLE,
            best_direction: FlowDirection::None,
        }
    }
}

/// Flow-field navigation grid: cost field, Dijkstra-propagated integration
/// field and derived best-direction field, all stored per cell.
///
/// # Algorithm
///
/// 1. **Cost field:** obstacles carry [`COST_OBSTACLE`], walkable cells
///    [`COST_FREE`] (or higher for rough terrain).
/// 2. **Integration field:** breadth-first cost relaxation outward from the
///    target over the 4 cardinal neighbors.
/// 3. **Vector field:** 8-neighbor steepest descent; each cell records the
///    symbolic direction toward its cheapest strictly-better neighbor.
///
/// Regeneration is O(cells) and synchronous; it is the expensive operation
/// of the whole engine and is only run on target or obstacle change, never
/// per tick.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct FlowField {
    pub grid: SpatialGrid<FlowCell>,
    target_cell: Option<(usize, usize)>,
}

impl FlowField {
    pub fn new(width: usize, height: usize, cell_size: FixedNum, origin: FixedVec2) -> Self {
        Self {
            grid: SpatialGrid::new(width, height, cell_size, origin),
            target_cell: None,
        }
    }

    pub fn width(&self) -> usize {
        self.grid.width()
    }

    pub fn height(&self) -> usize {
        self.grid.height()
    }

    pub fn target_cell(&self) -> Option<(usize, usize)> {
        self.target_cell
    }

    pub fn world_to_cell(&self, pos: FixedVec2) -> Option<(usize, usize)> {
        self.grid.world_to_cell(pos)
    }

    pub fn cell_to_world_center(&self, x: usize, y: usize) -> FixedVec2 {
        self.grid.cell_to_world_center(x, y)
    }

    pub fn cost(&self, x: usize, y: usize) -> Option<u8> {
        self.grid.get(x, y).map(|c| c.cost)
    }

    pub fn best_cost(&self, x: usize, y: usize) -> Option<u32> {
        self.grid.get(x, y).map(|c| c.best_cost)
    }

    /// Direction at a cell; out-of-range reads back as `None`.
    pub fn best_direction(&self, x: usize, y: usize) -> FlowDirection {
        self.grid
            .get(x, y)
            .map(|c| c.best_direction)
            .unwrap_or(FlowDirection::None)
    }

    pub fn is_walkable(&self, x: usize, y: usize) -> bool {
        matches!(self.cost(x, y), Some(c) if c != COST_OBSTACLE)
    }

    /// Ordinary cost write. Rejected on obstacle cells (clear the obstacle
    /// first) and for the obstacle sentinel itself (use `mark_obstacle`).
    pub fn set_cost(&mut self, x: usize, y: usize, cost: u8) -> bool {
        if cost == COST_OBSTACLE {
            return false;
        }
        match self.grid.get(x, y) {
            Some(cell) if cell.cost != COST_OBSTACLE => {
                let mut cell = *cell;
                cell.cost = cost;
                self.grid.set(x, y, cell)
            }
            _ => false,
        }
    }

    pub fn mark_obstacle(&mut self, x: usize, y: usize) -> bool {
        match self.grid.get(x, y) {
            Some(cell) => {
                let mut cell = *cell;
                cell.cost = COST_OBSTACLE;
                self.grid.set(x, y, cell)
            }
            None => false,
        }
    }

    /// Clear the obstacle sentinel, restoring the free traversal cost.
    pub fn clear_obstacle(&mut self, x: usize, y: usize) -> bool {
        match self.grid.get(x, y) {
            Some(cell) if cell.cost == COST_OBSTACLE => {
                let mut cell = *cell;
                cell.cost = COST_FREE;
                self.grid.set(x, y, cell)
            }
            _ => false,
        }
    }

    /// Reset costs to free (obstacles preserved), integration costs to max
    /// and directions to `None`. Bulk pass: one generation bump.
    pub fn reset_all(&mut self) {
        for cell in self.grid.cells_mut() {
            if cell.cost != COST_OBSTACLE {
                cell.cost = COST_FREE;
            }
            cell.best_cost = INTEGRATION_UNREACHABLE;
            cell.best_direction = FlowDirection::None;
        }
        self.target_cell = None;
        self.grid.touch();
    }

    /// Stamp a cell as excluded from the next integration pass without
    /// blocking it. Obstacle cells are left alone.
    pub(crate) fn mark_ignored_bulk(&mut self, x: usize, y: usize) {
        if self.grid.in_bounds(x, y) {
            let idx = self.grid.index(x, y);
            let cell = &mut self.grid.cells_mut()[idx];
            if cell.cost != COST_OBSTACLE {
                cell.cost = COST_IGNORED;
            }
        }
    }

    /// Breadth-first cost propagation outward from `target` over the 4
    /// cardinal neighbors.
    ///
    /// A cell may be enqueued multiple times; that is correct because its
    /// `best_cost` strictly decreases on every re-enqueue (standard Dijkstra
    /// relaxation with uniform per-cell edge weight).
    pub fn compute_integration_field(&mut self, target: (usize, usize)) -> bool {
        let (tx, ty) = target;
        if !self.grid.in_bounds(tx, ty) {
            return false;
        }

        for cell in self.grid.cells_mut() {
            cell.best_cost = INTEGRATION_UNREACHABLE;
        }

        let width = self.grid.width();
        let height = self.grid.height();
        let target_idx = self.grid.index(tx, ty);
        self.grid.cells_mut()[target_idx].best_cost = 0;
        self.target_cell = Some(target);

        let mut queue = VecDeque::new();
        queue.push_back((tx, ty));

        while let Some((cx, cy)) = queue.pop_front() {
            let current_cost = self.grid.cells()[self.grid.index(cx, cy)].best_cost;

            let neighbors = [
                (cx.wrapping_sub(1), cy),
                (cx + 1, cy),
                (cx, cy.wrapping_sub(1)),
                (cx, cy + 1),
            ];

            for (nx, ny) in neighbors {
                if nx >= width || ny >= height {
                    continue;
                }

                let n_idx = self.grid.index(nx, ny);
                let n_cost = self.grid.cells()[n_idx].cost;

                if n_cost == COST_OBSTACLE || n_cost >= MAX_INTEGRATION_COST {
                    continue;
                }

                let candidate = current_cost + n_cost as u32;
                if candidate < self.grid.cells()[n_idx].best_cost {
                    self.grid.cells_mut()[n_idx].best_cost = candidate;
                    queue.push_back((nx, ny));
                }
            }
        }

        self.grid.touch();
        true
    }

    /// Derive the best-direction field: each cell points at its 8-neighbor
    /// with the lowest `best_cost` strictly below its own. The target cell
    /// and unreachable pockets keep `FlowDirection::None`.
    pub fn compute_vector_field(&mut self) {
        let width = self.grid.width();
        let height = self.grid.height();

        for y in 0..height {
            for x in 0..width {
                let idx = self.grid.index(x, y);
                let own = self.grid.cells()[idx];

                if own.cost == COST_OBSTACLE || own.best_cost == INTEGRATION_UNREACHABLE {
                    self.grid.cells_mut()[idx].best_direction = FlowDirection::None;
                    continue;
                }

                let mut best_cost = own.best_cost;
                let mut best_dir = FlowDirection::None;

                for dir in FlowDirection::COMPASS {
                    let (dx, dy) = dir.to_offset();
                    let nx = x as isize + dx as isize;
                    let ny = y as isize + dy as isize;
                    if nx < 0 || ny < 0 || nx >= width as isize || ny >= height as isize {
                        continue;
                    }

                    let n = self.grid.cells()[self.grid.index(nx as usize, ny as usize)];
                    if n.best_cost < best_cost {
                        best_cost = n.best_cost;
                        best_dir = dir;
                    }
                }

                self.grid.cells_mut()[idx].best_direction = best_dir;
            }
        }

        self.grid.touch();
    }

    /// Full regeneration: reset (obstacles preserved), integrate, derive
    /// directions. An unwalkable target is rejected up front and the
    /// previous field is retained untouched.
    pub fn calculate(&mut self, target: (usize, usize)) -> bool {
        if !self.is_walkable(target.0, target.1) {
            return false;
        }
        self.reset_all();
        self.compute_integration_field(target);
        self.compute_vector_field();
        true
    }
}
