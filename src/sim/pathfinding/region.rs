use tracing::info;

use super::astar::AStarPathfinder;
use super::types::{CellCoord, RegionId};
use crate::sim::flow_field::FlowField;

/// One coarse tile of the world: a window of `area_size × area_size` fine
/// cells (smaller on the map's far edges) with its own embedded pathfinder.
///
/// Regions are created once from static obstacle data and never resized;
/// obstacle changes rebuild the whole [`RegionMap`].
#[derive(Clone, Debug)]
pub struct Region {
    pub id: RegionId,
    /// Fine-grid cell at the window's bottom-left corner.
    pub base: CellCoord,
    pub width: usize,
    pub height: usize,
    pub pathfinder: AStarPathfinder,
}

impl Region {
    pub fn contains(&self, c: CellCoord) -> bool {
        c.x >= self.base.x
            && c.y >= self.base.y
            && c.x < self.base.x + self.width
            && c.y < self.base.y + self.height
    }
}

/// Coarse partition of the map into regions, addressable by fine-grid cell.
#[derive(Clone, Debug)]
pub struct RegionMap {
    pub area_size: usize,
    pub cols: usize,
    pub rows: usize,
    regions: Vec<Region>,
}

impl RegionMap {
    /// Partition `flow`'s grid into `area_size`-sized windows.
    pub fn build(flow: &FlowField, area_size: usize) -> Self {
        let cols = flow.width().div_ceil(area_size);
        let rows = flow.height().div_ceil(area_size);

        let mut regions = Vec::with_capacity(cols * rows);
        for ry in 0..rows {
            for rx in 0..cols {
                let base = CellCoord::new(rx * area_size, ry * area_size);
                let width = area_size.min(flow.width() - base.x);
                let height = area_size.min(flow.height() - base.y);
                regions.push(Region {
                    id: (rx, ry),
                    base,
                    width,
                    height,
                    pathfinder: AStarPathfinder::new(width, height),
                });
            }
        }

        info!(
            "[REGIONS] Partitioned {}x{} map into {}x{} regions of {} cells",
            flow.width(),
            flow.height(),
            cols,
            rows,
            area_size
        );

        Self {
            area_size,
            cols,
            rows,
            regions,
        }
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Dense index of a region id, usable as a bitset position.
    pub fn region_index(&self, id: RegionId) -> usize {
        id.1 * self.cols + id.0
    }

    /// Region that owns a fine-grid cell.
    pub fn region_of_cell(&self, c: CellCoord) -> Option<RegionId> {
        let rx = c.x / self.area_size;
        let ry = c.y / self.area_size;
        if rx < self.cols && ry < self.rows {
            Some((rx, ry))
        } else {
            None
        }
    }

    pub fn get(&self, id: RegionId) -> Option<&Region> {
        if id.0 < self.cols && id.1 < self.rows {
            self.regions.get(self.region_index(id))
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, id: RegionId) -> Option<&mut Region> {
        if id.0 < self.cols && id.1 < self.rows {
            let idx = self.region_index(id);
            self.regions.get_mut(idx)
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    /// Local path length between two cells of the same region, in cells.
    /// `None` when the cells span regions or no path exists in the window.
    pub fn local_path_len(
        &mut self,
        flow: &FlowField,
        start: CellCoord,
        goal: CellCoord,
    ) -> Option<u32> {
        let region = self.region_of_cell(start)?;
        if self.region_of_cell(goal)? != region {
            return None;
        }
        let region = self.get_mut(region)?;
        let base = region.base;
        region.pathfinder.path_len(flow, base, start, goal)
    }
}
