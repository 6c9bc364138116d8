use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};

use smallvec::SmallVec;
use tracing::{info, warn};

use super::region::RegionMap;
use super::types::{CellCoord, GraphStats, Portal, PortalNode, RegionId};
use crate::sim::flow_field::FlowField;

/// Precomputed intra-region route between two portals sharing a region.
#[derive(Clone, Debug)]
pub struct PortalLink {
    pub to: usize,
    /// Path length in cells, used as the edge weight of the portal graph.
    pub cost: u32,
    /// Representative cell path between the two entrances.
    pub path: Vec<CellCoord>,
}

/// Coarse routing graph over region boundaries.
///
/// Nodes are portals (walkable runs of border cells between adjacent
/// regions), edges are precomputed local A* routes between portals that
/// share a region. Built once after obstacles are finalized and rebuilt
/// wholesale on any obstacle change; there is no incremental repair.
///
/// Run grouping during the border scan is greedy and single-pass: a
/// connected border pair joins the most recent portal on its boundary when
/// it is adjacent to that portal's newest first-side cell, otherwise it
/// starts a new portal. This is not an exact connected-components pass; a
/// boundary with several disjoint walkable runs can in principle be
/// under-split, which is accepted degraded behavior rather than a bug.
#[derive(Clone, Debug, Default)]
pub struct PortalGraph {
    pub portals: Vec<Portal>,
    region_portals: BTreeMap<RegionId, SmallVec<[usize; 8]>>,
    connections: BTreeMap<usize, Vec<PortalLink>>,
    /// Transient per-portal A* state, reset before every query.
    nodes: Vec<PortalNode>,
}

impl PortalGraph {
    /// Detect portals along every shared region boundary, then wire up the
    /// inter-portal connection table.
    pub fn build(flow: &FlowField, regions: &mut RegionMap) -> Self {
        let mut graph = Self::default();

        for ry in 0..regions.rows {
            for rx in 0..regions.cols {
                if rx + 1 < regions.cols {
                    graph.scan_boundary(flow, regions, (rx, ry), (rx + 1, ry), true);
                }
                if ry + 1 < regions.rows {
                    graph.scan_boundary(flow, regions, (rx, ry), (rx, ry + 1), false);
                }
            }
        }

        graph.build_connections(flow, regions);
        graph.nodes = vec![PortalNode::default(); graph.portals.len()];

        let stats = graph.stats();
        info!(
            "[PORTALS] Built {} portals, {} connections across {} regions",
            stats.portal_count, stats.connection_count, stats.region_count
        );

        graph
    }

    /// Scan the paired border cells of one shared boundary, greedily
    /// grouping contiguous connected pairs into portals.
    fn scan_boundary(
        &mut self,
        flow: &FlowField,
        regions: &RegionMap,
        a: RegionId,
        b: RegionId,
        vertical_boundary: bool,
    ) {
        let (Some(ra), Some(rb)) = (regions.get(a), regions.get(b)) else {
            return;
        };

        // Pairs are (a-side cell, b-side cell). A pair only connects when
        // both cells are walkable and mutually adjacent across the boundary.
        let pairs: Vec<(CellCoord, CellCoord)> = if vertical_boundary {
            let xa = ra.base.x + ra.width - 1;
            let xb = rb.base.x;
            let span = ra.height.min(rb.height);
            (0..span)
                .map(|i| {
                    let y = ra.base.y + i;
                    (CellCoord::new(xa, y), CellCoord::new(xb, y))
                })
                .collect()
        } else {
            let ya = ra.base.y + ra.height - 1;
            let yb = rb.base.y;
            let span = ra.width.min(rb.width);
            (0..span)
                .map(|i| {
                    let x = ra.base.x + i;
                    (CellCoord::new(x, ya), CellCoord::new(x, yb))
                })
                .collect()
        };

        // Index of the most recent portal created for this boundary, plus
        // the newest a-side cell appended to it (the run's growing tip).
        let mut last: Option<(usize, CellCoord)> = None;

        for (ca, cb) in pairs {
            let connected = flow.is_walkable(ca.x, ca.y)
                && flow.is_walkable(cb.x, cb.y)
                && ca.is_adjacent(cb);
            if !connected {
                continue;
            }

            match last {
                Some((portal_idx, tip)) if ca.is_adjacent(tip) => {
                    let portal = &mut self.portals[portal_idx];
                    portal.cells[0].push(ca);
                    portal.cells[1].push(cb);
                    last = Some((portal_idx, ca));
                }
                _ => {
                    let id = self.portals.len();
                    let portal = Portal {
                        id,
                        regions: [a, b],
                        cells: [SmallVec::from_slice(&[ca]), SmallVec::from_slice(&[cb])],
                        entrances: [ca, cb],
                    };
                    self.portals.push(portal);
                    self.region_portals.entry(a).or_default().push(id);
                    self.region_portals.entry(b).or_default().push(id);
                    last = Some((id, ca));
                }
            }
        }

        // Finalize entrances: the a-side cell closest to the centroid of the
        // run, and its paired b-side cell (keeps the two entrances mutually
        // adjacent across the boundary).
        if let Some((first_new, _)) = last {
            let start = self
                .portals
                .iter()
                .position(|p| p.regions == [a, b])
                .unwrap_or(first_new);
            for portal in &mut self.portals[start..] {
                if portal.regions != [a, b] {
                    continue;
                }
                let cells = &portal.cells[0];
                let n = cells.len() as i64;
                let cx: i64 = cells.iter().map(|c| c.x as i64).sum::<i64>();
                let cy: i64 = cells.iter().map(|c| c.y as i64).sum::<i64>();
                let mut best = 0usize;
                let mut best_d = i64::MAX;
                for (i, c) in cells.iter().enumerate() {
                    // Squared distance to the centroid, scaled by n to stay
                    // in integers.
                    let dx = c.x as i64 * n - cx;
                    let dy = c.y as i64 * n - cy;
                    let d = dx * dx + dy * dy;
                    if d < best_d {
                        best_d = d;
                        best = i;
                    }
                }
                portal.entrances = [portal.cells[0][best], portal.cells[1][best]];
            }
        }
    }

    /// Build the `Portal -> {Portal -> representative path}` table by
    /// running each region's local A* between every pair of its portals'
    /// entrance cells. When two portals share both regions, the shorter
    /// direction wins; when only one side yields a path, that side wins.
    fn build_connections(&mut self, flow: &FlowField, regions: &mut RegionMap) {
        let mut best: BTreeMap<(usize, usize), (u32, Vec<CellCoord>)> = BTreeMap::new();

        let region_portals = self.region_portals.clone();
        for (&region_id, portal_ids) in &region_portals {
            let Some(region) = regions.get_mut(region_id) else {
                continue;
            };
            let base = region.base;

            for (i, &p) in portal_ids.iter().enumerate() {
                for &q in &portal_ids[i + 1..] {
                    let (Some(ps), Some(qs)) = (
                        self.portals[p].side_in(region_id),
                        self.portals[q].side_in(region_id),
                    ) else {
                        continue;
                    };
                    let ep = self.portals[p].entrances[ps];
                    let eq = self.portals[q].entrances[qs];

                    let Some(path) = region.pathfinder.find_path(flow, base, ep, eq) else {
                        continue;
                    };
                    let cost = path.len() as u32;

                    let key = (p.min(q), p.max(q));
                    match best.get(&key) {
                        Some((prev_cost, _)) if *prev_cost <= cost => {}
                        _ => {
                            best.insert(key, (cost, path));
                        }
                    }
                }
            }
        }

        for ((p, q), (cost, path)) in best {
            let mut reversed = path.clone();
            reversed.reverse();
            self.connections.entry(p).or_default().push(PortalLink {
                to: q,
                cost,
                path,
            });
            self.connections.entry(q).or_default().push(PortalLink {
                to: p,
                cost,
                path: reversed,
            });
        }
    }

    pub fn portals_of_region(&self, region: RegionId) -> &[usize] {
        self.region_portals
            .get(&region)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn links_of(&self, portal: usize) -> &[PortalLink] {
        self.connections
            .get(&portal)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            region_count: self.region_portals.len(),
            portal_count: self.portals.len(),
            connection_count: self.connections.values().map(|v| v.len()).sum::<usize>() / 2,
        }
    }

    /// Hierarchical A* over the portal graph.
    ///
    /// The open set is seeded with every portal touching the start region
    /// (cost = local path length from `start` to that portal's entrance,
    /// unreachable seeds skipped); every portal touching the target region
    /// is a goal. Heuristic is Manhattan distance in fine-grid coordinates,
    /// edge weights are the precomputed inter-portal path lengths. Returns
    /// the portal id sequence from start side to target side, or `None`.
    pub fn find_portal_path(
        &mut self,
        flow: &FlowField,
        regions: &mut RegionMap,
        start: CellCoord,
        target: CellCoord,
    ) -> Option<Vec<usize>> {
        let start_region = regions.region_of_cell(start)?;
        let target_region = regions.region_of_cell(target)?;

        let goal_ids = self.region_portals.get(&target_region)?.clone();
        if goal_ids.is_empty() {
            return None;
        }

        // PortalNode state is transient; reset it for this query.
        self.nodes.clear();
        self.nodes.resize(self.portals.len(), PortalNode::default());

        let mut open: BinaryHeap<Reverse<(u32, usize)>> = BinaryHeap::new();

        let seed_ids = self.region_portals.get(&start_region)?.clone();
        for &p in &seed_ids {
            let side = match self.portals[p].side_in(start_region) {
                Some(side) => side,
                None => continue,
            };
            let entrance = self.portals[p].entrances[side];
            let Some(region) = regions.get_mut(start_region) else {
                continue;
            };
            let base = region.base;
            let Some(seed_cost) = region.pathfinder.path_len(flow, base, start, entrance) else {
                continue;
            };

            let node = &mut self.nodes[p];
            if seed_cost < node.g {
                node.g = seed_cost;
                node.h = self.portals[p].entrances[0].manhattan(target);
                node.f = node.g + node.h;
                open.push(Reverse((node.f, p)));
            }
        }

        if open.is_empty() {
            warn!(
                "[PORTALS] No reachable seed portal from {:?} in region {:?}",
                start, start_region
            );
            return None;
        }

        while let Some(Reverse((_, current))) = open.pop() {
            if self.nodes[current].visited {
                continue;
            }
            self.nodes[current].visited = true;

            if goal_ids.contains(&current) {
                return Some(self.reconstruct(current));
            }

            let g = self.nodes[current].g;
            let links = match self.connections.get(&current) {
                Some(links) => links,
                None => continue,
            };
            let mut relaxed: SmallVec<[(usize, u32); 8]> = SmallVec::new();
            for link in links {
                let candidate = g.saturating_add(link.cost);
                if candidate < self.nodes[link.to].g {
                    relaxed.push((link.to, candidate));
                }
            }
            for (to, candidate) in relaxed {
                let h = self.portals[to].entrances[0].manhattan(target);
                let node = &mut self.nodes[to];
                node.g = candidate;
                node.h = h;
                node.f = candidate + h;
                node.came_from = Some(current);
                open.push(Reverse((node.f, to)));
            }
        }

        None
    }

    fn reconstruct(&self, goal: usize) -> Vec<usize> {
        let mut path = vec![goal];
        let mut current = goal;
        while let Some(prev) = self.nodes[current].came_from {
            path.push(prev);
            current = prev;
        }
        path.reverse();
        path
    }
}
