use std::sync::atomic::{AtomicBool, Ordering};

use fixedbitset::FixedBitSet;
use tracing::{debug, info, warn};

use super::error::NavError;
use super::fixed_math::FixedVec2;
use super::flow_field::{FlowDirection, FlowField};
use super::pathfinding::{CellCoord, PortalGraph, RegionMap};

/// Lifecycle of the active navigation target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteState {
    /// No target. Queries answer `None`.
    Idle,
    /// Target accepted; no flow field generated yet. The first query from
    /// an uncovered region schedules global routing.
    TargetSet,
    /// A hierarchical route has been expanded into a flow field covering
    /// every checked region.
    GloballyRouted,
}

/// Owns the active target and decides when local data is enough versus when
/// a hierarchical route (and the flow-field regeneration it implies) is
/// needed.
///
/// Queries are read-only and safe from the parallel agent phase: a query
/// that discovers an uncovered region raises a request flag, and the
/// actual routing plus field regeneration runs in the next tick's
/// single-writer phase ([`process_pending`](Self::process_pending)). Until
/// then callers receive `FlowDirection::None` and simply hold position; the
/// previous field stays readable throughout, and a new target discards any
/// still-pending work for the old one before it can be observed.
pub struct NavigationCoordinator {
    pub flow: FlowField,
    regions: Option<RegionMap>,
    portals: Option<PortalGraph>,
    state: RouteState,
    target_world: Option<FixedVec2>,
    target_cell: Option<CellCoord>,
    /// Regions already proven reachable for the current target, by dense
    /// region index.
    checked: FixedBitSet,
    /// Raised from query paths (possibly in parallel), consumed by
    /// `process_pending`.
    route_requested: AtomicBool,
    /// Deterministic origin for the next routing pass: the smallest
    /// requesting cell wins when several agents ask in the same tick.
    route_from: Option<CellCoord>,
    /// Consecutive failed routing passes for the current target.
    failed_attempts: u32,
    max_route_attempts: u32,
}

impl NavigationCoordinator {
    pub fn new(flow: FlowField, max_route_attempts: u32) -> Self {
        Self {
            flow,
            regions: None,
            portals: None,
            state: RouteState::Idle,
            target_world: None,
            target_cell: None,
            checked: FixedBitSet::new(),
            route_requested: AtomicBool::new(false),
            route_from: None,
            failed_attempts: 0,
            max_route_attempts,
        }
    }

    pub fn state(&self) -> RouteState {
        self.state
    }

    pub fn target_cell(&self) -> Option<CellCoord> {
        self.target_cell
    }

    pub fn regions(&self) -> Option<&RegionMap> {
        self.regions.as_ref()
    }

    pub fn portal_graph(&self) -> Option<&PortalGraph> {
        self.portals.as_ref()
    }

    pub fn is_finalized(&self) -> bool {
        self.regions.is_some()
    }

    /// Build the region partition and portal graph from the current
    /// obstacle layout. Second phase of startup: call once all static
    /// obstacles are placed, and again (via [`rebuild_graph`]) whenever the
    /// layout changes.
    pub fn finalize_obstacles(&mut self, area_size: usize) {
        // The rebuild consumes every obstacle change recorded on the grid.
        self.flow.grid.take_changes();
        let mut regions = RegionMap::build(&self.flow, area_size);
        let portals = PortalGraph::build(&self.flow, &mut regions);
        self.checked = FixedBitSet::with_capacity(regions.len());
        self.regions = Some(regions);
        self.portals = Some(portals);
        self.invalidate_routing();
    }

    /// Wholesale rebuild after an obstacle change. Portals are never
    /// patched incrementally; the previous flow field is dropped because
    /// its directions may now cross walls.
    pub fn rebuild_graph(&mut self) {
        let Some(area_size) = self.regions.as_ref().map(|r| r.area_size) else {
            return;
        };
        info!("[NAV] Obstacle layout changed, rebuilding region/portal graph");
        self.finalize_obstacles(area_size);

        // Re-validate the target: the new layout may have buried it.
        if let Some(cell) = self.target_cell {
            if !self.flow.is_walkable(cell.x, cell.y) {
                warn!("[NAV] Target cell {:?} is now blocked, dropping target", cell);
                self.state = RouteState::Idle;
                self.target_world = None;
                self.target_cell = None;
            }
        }
    }

    fn invalidate_routing(&mut self) {
        self.checked.clear();
        self.route_requested.store(false, Ordering::Relaxed);
        self.route_from = None;
        self.failed_attempts = 0;
        self.flow.reset_all();
        if self.state == RouteState::GloballyRouted {
            self.state = RouteState::TargetSet;
        }
    }

    /// Accept a new target. Rejects positions outside the grid or on an
    /// obstacle cell, keeping the previous target and field intact.
    /// Acceptance invalidates the flow field, the checked-region set and
    /// any pending routing work for the old target.
    pub fn set_target(&mut self, world: FixedVec2) -> Result<(), NavError> {
        if !self.is_finalized() {
            return Err(NavError::NotFinalized);
        }
        let Some((x, y)) = self.flow.world_to_cell(world) else {
            return Err(NavError::OutOfBounds(world));
        };
        if !self.flow.is_walkable(x, y) {
            return Err(NavError::Blocked(world));
        }

        self.target_world = Some(world);
        self.target_cell = Some(CellCoord::new(x, y));
        self.state = RouteState::TargetSet;
        self.invalidate_routing();
        debug!("[NAV] Target set to cell ({}, {})", x, y);
        Ok(())
    }

    /// Direction an agent at `world` should move. Read-only; callable from
    /// the parallel agent phase.
    ///
    /// `None` means: no target, position out of range, already at the
    /// target cell, or this cell is not covered yet (routing has been
    /// requested and a later tick will fill it in; callers hold position,
    /// they are not removed).
    pub fn get_direction(&self, world: FixedVec2) -> FlowDirection {
        if self.state == RouteState::Idle {
            return FlowDirection::None;
        }
        let Some((x, y)) = self.flow.world_to_cell(world) else {
            return FlowDirection::None;
        };
        if self.target_cell == Some(CellCoord::new(x, y)) {
            return FlowDirection::None;
        }

        let dir = self.flow.best_direction(x, y);
        if dir != FlowDirection::None {
            return dir;
        }

        // Uncovered cell: ask the single-writer phase for a global route,
        // unless its region is already known-checked (then this is a real
        // unreachable pocket) or the attempt budget is spent.
        if self.failed_attempts < self.max_route_attempts && !self.cell_region_checked(x, y) {
            self.route_requested.store(true, Ordering::Relaxed);
        }
        FlowDirection::None
    }

    /// The cell a global routing pass should start from, if a query at
    /// `world` needs one. Pure companion to [`get_direction`]: the parallel
    /// phase records the result per agent and the single-writer phase feeds
    /// it to [`note_route_origin`](Self::note_route_origin).
    pub fn wants_route_from(&self, world: FixedVec2) -> Option<CellCoord> {
        if self.state == RouteState::Idle || self.failed_attempts >= self.max_route_attempts {
            return None;
        }
        let (x, y) = self.flow.world_to_cell(world)?;
        if self.target_cell == Some(CellCoord::new(x, y)) {
            return None;
        }
        if self.flow.best_direction(x, y) != FlowDirection::None || self.cell_region_checked(x, y) {
            return None;
        }
        Some(CellCoord::new(x, y))
    }

    fn cell_region_checked(&self, x: usize, y: usize) -> bool {
        let Some(regions) = self.regions.as_ref() else {
            return false;
        };
        match regions.region_of_cell(CellCoord::new(x, y)) {
            Some(id) => self.checked.contains(regions.region_index(id)),
            None => false,
        }
    }

    /// Record a deterministic routing origin. Called from the single-writer
    /// phase with each requesting cell; the smallest cell wins the tick.
    pub fn note_route_origin(&mut self, from: CellCoord) {
        match self.route_from {
            Some(existing) if existing <= from => {}
            _ => self.route_from = Some(from),
        }
    }

    /// Single-writer phase entry point: run at most one global routing pass
    /// if one was requested since the last tick.
    pub fn process_pending(&mut self) {
        if !self.route_requested.swap(false, Ordering::Relaxed) {
            return;
        }
        let Some(from) = self.route_from.take() else {
            return;
        };
        if self.state == RouteState::Idle || self.failed_attempts >= self.max_route_attempts {
            return;
        }
        self.route_globally(from);
    }

    /// Hierarchical routing: find a portal path from `from` to the target,
    /// mark every region it touches as checked, then regenerate the flow
    /// field restricted to checked regions with a final integration/vector
    /// pass from the literal target cell.
    fn route_globally(&mut self, from: CellCoord) {
        let Some(target) = self.target_cell else {
            return;
        };
        let (Some(regions), Some(portals)) = (self.regions.as_mut(), self.portals.as_mut()) else {
            return;
        };

        let start_region = regions.region_of_cell(from);
        let target_region = regions.region_of_cell(target);
        let (Some(start_region), Some(target_region)) = (start_region, target_region) else {
            self.failed_attempts += 1;
            return;
        };

        let mut newly_checked: Vec<usize> = Vec::new();
        if start_region == target_region {
            newly_checked.push(regions.region_index(start_region));
        } else {
            match portals.find_portal_path(&self.flow, regions, from, target) {
                Some(path) => {
                    newly_checked.push(regions.region_index(start_region));
                    newly_checked.push(regions.region_index(target_region));
                    for portal_id in path {
                        for region in portals.portals[portal_id].regions {
                            newly_checked.push(regions.region_index(region));
                        }
                    }
                }
                None => {
                    self.failed_attempts += 1;
                    warn!(
                        "[NAV] Global routing from {:?} failed (attempt {}/{})",
                        from, self.failed_attempts, self.max_route_attempts
                    );
                    return;
                }
            }
        }

        for idx in newly_checked {
            self.checked.insert(idx);
        }
        self.failed_attempts = 0;
        self.regenerate_restricted();
        self.state = RouteState::GloballyRouted;
        debug!(
            "[NAV] Globally routed from {:?}; {} regions checked",
            from,
            self.checked.count_ones(..)
        );
    }

    /// Regenerate the flow field across checked regions only. Cells outside
    /// them are stamped with the ignored sentinel so they neither block nor
    /// get traversed; obstacle cells keep their sentinel throughout.
    fn regenerate_restricted(&mut self) {
        let Some(target) = self.target_cell else {
            return;
        };
        let Some(regions) = self.regions.as_ref() else {
            return;
        };

        self.flow.reset_all();
        for region in regions.iter() {
            if self.checked.contains(regions.region_index(region.id)) {
                continue;
            }
            for y in region.base.y..region.base.y + region.height {
                for x in region.base.x..region.base.x + region.width {
                    self.flow.mark_ignored_bulk(x, y);
                }
            }
        }
        self.flow.compute_integration_field((target.x, target.y));
        self.flow.compute_vector_field();
    }
}
