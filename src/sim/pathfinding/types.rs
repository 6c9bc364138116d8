use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Default region edge length in fine-grid cells.
///
/// The world is partitioned into `area_size × area_size` windows; larger
/// regions mean fewer portals but more expensive local A* queries.
pub const DEFAULT_AREA_SIZE: usize = 10;

/// Safety valve for a single local A* query. A region window is at most
/// `area_size²` cells, so hitting this indicates a logic error, not a hard
/// map.
pub const MAX_ASTAR_ITERATIONS: usize = 10_000;

/// Identifier of a region in the coarse region grid.
pub type RegionId = (usize, usize);

/// Fine-grid cell coordinate.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize, PartialOrd, Ord)]
pub struct CellCoord {
    pub x: usize,
    pub y: usize,
}

impl CellCoord {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    pub fn manhattan(self, other: CellCoord) -> u32 {
        let dx = (self.x as i64 - other.x as i64).unsigned_abs();
        let dy = (self.y as i64 - other.y as i64).unsigned_abs();
        (dx + dy) as u32
    }

    /// Cardinal-or-diagonal adjacency (Chebyshev distance 1).
    pub fn is_adjacent(self, other: CellCoord) -> bool {
        let dx = (self.x as i64 - other.x as i64).abs();
        let dy = (self.y as i64 - other.y as i64).abs();
        dx <= 1 && dy <= 1 && (dx + dy) > 0
    }
}

/// Undirected walkable connection between two adjacent regions.
///
/// Each side stores the run of border cells that were mutually reachable
/// across the boundary at build time, plus one representative entrance cell
/// (the border cell closest to the centroid of that side's run). The two
/// entrance cells are walkable and adjacent across the boundary at creation
/// time; portals are rebuilt wholesale when obstacles change, never patched.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Portal {
    pub id: usize,
    /// The two regions this portal connects, in scan order.
    pub regions: [RegionId; 2],
    /// Connected border cells per side, same index = paired across boundary.
    pub cells: [SmallVec<[CellCoord; 8]>; 2],
    /// Representative entrance cell per side.
    pub entrances: [CellCoord; 2],
}

impl Portal {
    /// Which side of this portal lies in `region`, if any.
    pub fn side_in(&self, region: RegionId) -> Option<usize> {
        self.regions.iter().position(|&r| r == region)
    }
}

/// Transient A* bookkeeping for one portal during a hierarchical query.
/// Reset before every query; never persisted.
#[derive(Clone, Copy, Debug)]
pub(super) struct PortalNode {
    pub g: u32,
    pub h: u32,
    pub f: u32,
    pub visited: bool,
    pub came_from: Option<usize>,
}

impl Default for PortalNode {
    fn default() -> Self {
        Self {
            g: u32::MAX,
            h: 0,
            f: u32::MAX,
            visited: false,
            came_from: None,
        }
    }
}

/// Counters describing a built portal graph, for diagnostics and logs.
#[derive(Debug, Clone, Copy)]
pub struct GraphStats {
    pub region_count: usize,
    pub portal_count: usize,
    pub connection_count: usize,
}
