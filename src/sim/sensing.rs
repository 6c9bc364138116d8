use super::fixed_math::{FixedNum, FixedVec2};
use super::flow_field::FlowField;

/// Ray/shape queries against the static obstacle layer.
///
/// The steering engine only ever consumes this capability; it does not care
/// who answers. The built-in [`GridCaster`] marches the flow-field cost
/// grid, an engine integration can substitute a real physics backend.
pub trait ObstacleCaster: Sync {
    /// First blocked point along a ray, or `None` within `max_dist`.
    fn cast_ray(&self, origin: FixedVec2, dir: FixedVec2, max_dist: FixedNum) -> Option<FixedVec2>;

    /// Whether an axis-aligned box overlaps any obstacle.
    fn overlap_box(&self, center: FixedVec2, extents: FixedVec2) -> bool;
}

/// Obstacle queries answered directly from the flow field's cost grid.
pub struct GridCaster<'a> {
    flow: &'a FlowField,
}

impl<'a> GridCaster<'a> {
    pub fn new(flow: &'a FlowField) -> Self {
        Self { flow }
    }

    fn blocked_at(&self, pos: FixedVec2) -> bool {
        match self.flow.world_to_cell(pos) {
            Some((x, y)) => !self.flow.is_walkable(x, y),
            // Outside the grid counts as blocked so rays stop at the edge.
            None => true,
        }
    }
}

impl ObstacleCaster for GridCaster<'_> {
    fn cast_ray(&self, origin: FixedVec2, dir: FixedVec2, max_dist: FixedNum) -> Option<FixedVec2> {
        let dir = dir.normalize();
        if dir == FixedVec2::ZERO || max_dist <= FixedNum::ZERO {
            return None;
        }

        // March in quarter-cell steps; fine enough that a cell cannot be
        // stepped over diagonally.
        let step = self.flow.grid.cell_size() / FixedNum::from_num(4.0);
        let mut travelled = step;
        while travelled <= max_dist {
            let sample = origin + dir * travelled;
            if self.blocked_at(sample) {
                return Some(sample);
            }
            travelled += step;
        }
        None
    }

    fn overlap_box(&self, center: FixedVec2, extents: FixedVec2) -> bool {
        let min = center - extents;
        let max = center + extents;
        let cell = self.flow.grid.cell_size();

        let mut y = min.y;
        loop {
            let mut x = min.x;
            loop {
                if self.blocked_at(FixedVec2::new(x, y)) {
                    return true;
                }
                if x >= max.x {
                    break;
                }
                x = (x + cell).min(max.x);
            }
            if y >= max.y {
                break;
            }
            y = (y + cell).min(max.y);
        }
        false
    }
}
