use serde::{Deserialize, Serialize};

use super::fixed_math::{FixedNum, FixedVec2};

/// Generic dense 2D grid with world-space addressing.
///
/// Every spatial subsystem (flow field, region map, agent index) is a view
/// over one of these: a `width × height` array of cells of size `cell_size`,
/// anchored at `origin` (bottom-left corner in world space).
///
/// # Bounds behavior
///
/// All accessors are bounds-checked and return `Option`; an out-of-range
/// coordinate is an ordinary recoverable condition, never a panic. Grids
/// never share storage.
///
/// # Change notification
///
/// Instead of engine event handlers, the grid carries an explicit generation
/// counter plus a drainable change list: every tracked `set` bumps
/// `generation` and records the cell, and consumers drain the list
/// synchronously within the same tick via [`take_changes`](Self::take_changes).
/// Bulk recomputation passes that rewrite the whole array go through
/// [`cells_mut`](Self::cells_mut) and announce themselves with a single
/// [`touch`](Self::touch).
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct SpatialGrid<T> {
    width: usize,
    height: usize,
    cell_size: FixedNum,
    origin: FixedVec2,
    cells: Vec<T>,
    generation: u64,
    #[serde(skip)]
    changes: Vec<(usize, usize)>,
}

impl<T: Clone + Default> SpatialGrid<T> {
    pub fn new(width: usize, height: usize, cell_size: FixedNum, origin: FixedVec2) -> Self {
        Self {
            width,
            height,
            cell_size,
            origin,
            cells: vec![T::default(); width * height],
            generation: 0,
            changes: Vec::new(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn cell_size(&self) -> FixedNum {
        self.cell_size
    }

    pub fn origin(&self) -> FixedVec2 {
        self.origin
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    #[inline]
    pub fn in_bounds(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height
    }

    /// Map a world position to grid coordinates by floor division.
    pub fn world_to_cell(&self, pos: FixedVec2) -> Option<(usize, usize)> {
        let local = pos - self.origin;
        if local.x < FixedNum::ZERO || local.y < FixedNum::ZERO {
            return None;
        }

        let x = (local.x / self.cell_size).to_num::<usize>();
        let y = (local.y / self.cell_size).to_num::<usize>();

        if self.in_bounds(x, y) {
            Some((x, y))
        } else {
            None
        }
    }

    /// World position of a cell's center.
    pub fn cell_to_world_center(&self, x: usize, y: usize) -> FixedVec2 {
        let half = self.cell_size / FixedNum::from_num(2.0);
        self.origin
            + FixedVec2::new(
                FixedNum::from_num(x) * self.cell_size + half,
                FixedNum::from_num(y) * self.cell_size + half,
            )
    }

    pub fn get(&self, x: usize, y: usize) -> Option<&T> {
        if self.in_bounds(x, y) {
            Some(&self.cells[self.index(x, y)])
        } else {
            None
        }
    }

    /// Tracked write: bumps the generation and records the changed cell.
    /// Returns false (and writes nothing) out of bounds.
    pub fn set(&mut self, x: usize, y: usize, value: T) -> bool {
        if !self.in_bounds(x, y) {
            return false;
        }
        let idx = self.index(x, y);
        self.cells[idx] = value;
        self.generation += 1;
        self.changes.push((x, y));
        true
    }

    /// Drain the accumulated change list. Consumers call this once per tick.
    pub fn take_changes(&mut self) -> Vec<(usize, usize)> {
        std::mem::take(&mut self.changes)
    }

    /// Raw cell access for bulk recomputation passes. Callers that rewrite
    /// the array this way follow up with [`touch`](Self::touch).
    pub(crate) fn cells(&self) -> &[T] {
        &self.cells
    }

    pub(crate) fn cells_mut(&mut self) -> &mut [T] {
        &mut self.cells
    }

    /// Bump the generation once for a bulk rewrite.
    pub(crate) fn touch(&mut self) {
        self.generation += 1;
    }
}
