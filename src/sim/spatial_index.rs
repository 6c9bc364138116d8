use smallvec::SmallVec;

use super::agent::AgentId;
use super::fixed_math::{FixedNum, FixedVec2};

/// Grid-hashed index of agent positions for bounded-cost neighbor queries.
///
/// The world is bucketed into coarse cells; each bucket holds the ids of
/// the agents currently inside it. Updates are lazy and incremental: only
/// agents whose coarse cell changed since the last tick move buckets, there
/// is never a full rebuild. A neighbor query scans the 3×3 block around the
/// querying agent's bucket, so its cost is independent of the total agent
/// count; neighbors slightly beyond one cell can be missed, which is the
/// accepted trade.
///
/// Buckets use plain `Vec`s rather than hash sets for cache locality.
pub struct SpatialIndex {
    cell_size: FixedNum,
    cols: usize,
    rows: usize,
    origin: FixedVec2,
    cells: Vec<Vec<AgentId>>,
}

impl SpatialIndex {
    pub fn new(map_width: FixedNum, map_height: FixedNum, cell_size: FixedNum, origin: FixedVec2) -> Self {
        let cols = (map_width / cell_size).ceil().to_num::<usize>() + 1;
        let rows = (map_height / cell_size).ceil().to_num::<usize>() + 1;

        Self {
            cell_size,
            cols,
            rows,
            origin,
            cells: vec![Vec::new(); cols * rows],
        }
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Coarse bucket of a world position, or `None` outside the map.
    pub fn bucket_of(&self, pos: FixedVec2) -> Option<(usize, usize)> {
        let local = pos - self.origin;
        if local.x < FixedNum::ZERO || local.y < FixedNum::ZERO {
            return None;
        }
        let col = (local.x / self.cell_size).to_num::<usize>();
        let row = (local.y / self.cell_size).to_num::<usize>();
        if col < self.cols && row < self.rows {
            Some((col, row))
        } else {
            None
        }
    }

    #[inline]
    fn index(&self, col: usize, row: usize) -> usize {
        row * self.cols + col
    }

    pub fn insert(&mut self, id: AgentId, bucket: (usize, usize)) {
        let idx = self.index(bucket.0, bucket.1);
        if idx < self.cells.len() {
            self.cells[idx].push(id);
        }
    }

    pub fn remove(&mut self, id: AgentId, bucket: (usize, usize)) {
        let idx = self.index(bucket.0, bucket.1);
        if idx < self.cells.len() {
            self.cells[idx].retain(|&e| e != id);
        }
    }

    /// Move an agent between buckets. No-op when old and new are equal.
    pub fn relocate(&mut self, id: AgentId, old: Option<(usize, usize)>, new: (usize, usize)) {
        if old == Some(new) {
            return;
        }
        if let Some(old) = old {
            self.remove(id, old);
        }
        self.insert(id, new);
    }

    /// Collect every agent in the 3×3 block of buckets around `bucket`,
    /// excluding `exclude`. Appends into the caller's reusable buffer.
    pub fn query_block(
        &self,
        bucket: (usize, usize),
        exclude: AgentId,
        out: &mut SmallVec<[AgentId; 16]>,
    ) {
        out.clear();
        let (col, row) = bucket;
        for dr in -1i32..=1 {
            for dc in -1i32..=1 {
                let c = col as i64 + dc as i64;
                let r = row as i64 + dr as i64;
                if c < 0 || r < 0 || c as usize >= self.cols || r as usize >= self.rows {
                    continue;
                }
                for &id in &self.cells[self.index(c as usize, r as usize)] {
                    if id != exclude {
                        out.push(id);
                    }
                }
            }
        }
    }

    /// Total entries across all buckets, for diagnostics.
    pub fn total_entries(&self) -> usize {
        self.cells.iter().map(|c| c.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn index() -> SpatialIndex {
        SpatialIndex::new(
            FixedNum::from_num(100.0),
            FixedNum::from_num(100.0),
            FixedNum::from_num(10.0),
            FixedVec2::ZERO,
        )
    }

    fn ids(n: usize) -> Vec<AgentId> {
        let mut map: SlotMap<AgentId, ()> = SlotMap::with_key();
        (0..n).map(|_| map.insert(())).collect()
    }

    #[test]
    fn test_bucket_handoff_on_cell_change() {
        let mut idx = index();
        let all = ids(2);
        let agent = all[0];
        let querier = all[1];

        idx.insert(agent, (2, 2));
        idx.relocate(agent, Some((2, 2)), (2, 3));

        let mut out = SmallVec::new();
        // Query from a bucket far enough that (2,2) is outside its 3x3
        // block but (2,3) is inside.
        idx.query_block((2, 4), querier, &mut out);
        assert!(out.contains(&agent), "agent must be found at its new bucket");

        idx.query_block((2, 1), querier, &mut out);
        assert!(!out.contains(&agent), "agent must be gone from its old bucket");
    }

    #[test]
    fn test_relocate_same_bucket_is_noop() {
        let mut idx = index();
        let agent = ids(1)[0];
        idx.insert(agent, (4, 4));
        idx.relocate(agent, Some((4, 4)), (4, 4));
        assert_eq!(idx.total_entries(), 1, "no duplicate entries after a same-bucket move");
    }

    #[test]
    fn test_query_block_excludes_self_and_respects_edges() {
        let mut idx = index();
        let all = ids(3);

        idx.insert(all[0], (0, 0));
        idx.insert(all[1], (1, 1));
        idx.insert(all[2], (5, 5));

        let mut out = SmallVec::new();
        idx.query_block((0, 0), all[0], &mut out);
        assert_eq!(out.as_slice(), &[all[1]], "corner query finds only the adjacent agent");
    }

    #[test]
    fn test_bucket_of_maps_world_positions() {
        let idx = index();
        assert_eq!(idx.bucket_of(FixedVec2::from_f32(25.0, 31.0)), Some((2, 3)));
        assert_eq!(idx.bucket_of(FixedVec2::from_f32(-0.1, 5.0)), None);
    }
}
