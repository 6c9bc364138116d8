use super::*;
use crate::sim::fixed_math::{FixedNum, FixedVec2};
use crate::sim::flow_field::FlowField;

fn flow(width: usize, height: usize) -> FlowField {
    FlowField::new(width, height, FixedNum::from_num(1.0), FixedVec2::ZERO)
}

// ============================================================================
// Single-region A*
// ============================================================================

#[test]
fn test_astar_straight_corridor() {
    let f = flow(5, 1);
    let mut finder = AStarPathfinder::new(5, 1);

    let path = finder
        .find_path(&f, CellCoord::new(0, 0), CellCoord::new(0, 0), CellCoord::new(4, 0))
        .expect("unobstructed corridor must have a path");

    assert_eq!(path.len(), 5, "corridor path visits every cell once");
    for (i, c) in path.iter().enumerate() {
        assert_eq!(c.x, i, "x must increase monotonically");
        assert_eq!(c.y, 0);
    }
}

#[test]
fn test_astar_routes_around_wall() {
    let mut f = flow(5, 5);
    // Wall at x=2, open only at y=4.
    for y in 0..4 {
        f.mark_obstacle(2, y);
    }
    let mut finder = AStarPathfinder::new(5, 5);

    let path = finder
        .find_path(&f, CellCoord::new(0, 0), CellCoord::new(0, 0), CellCoord::new(4, 0))
        .expect("gap at the top keeps the goal reachable");

    assert!(path.iter().any(|c| c.y == 4), "path must detour through the gap");
    assert!(
        path.iter().all(|c| f.is_walkable(c.x, c.y)),
        "path must avoid obstacle cells"
    );
}

#[test]
fn test_astar_unreachable_and_invalid_goals() {
    let mut f = flow(5, 5);
    for y in 0..5 {
        f.mark_obstacle(2, y);
    }
    let mut finder = AStarPathfinder::new(5, 5);
    let base = CellCoord::new(0, 0);

    assert_eq!(
        finder.find_path(&f, base, CellCoord::new(0, 0), CellCoord::new(4, 0)),
        None,
        "sealed wall must be unreachable"
    );
    assert_eq!(
        finder.find_path(&f, base, CellCoord::new(0, 0), CellCoord::new(2, 2)),
        None,
        "obstacle goal is invalid"
    );
    assert_eq!(
        finder.find_path(&f, base, CellCoord::new(0, 0), CellCoord::new(9, 0)),
        None,
        "out-of-window goal is invalid"
    );
}

#[test]
fn test_astar_instance_reuse_does_not_leak_state() {
    let mut f = flow(4, 4);
    let mut finder = AStarPathfinder::new(4, 4);
    let base = CellCoord::new(0, 0);

    let first = finder.find_path(&f, base, CellCoord::new(0, 0), CellCoord::new(3, 3));
    assert!(first.is_some());

    // Now block the goal; the stale arena from the first query must not
    // resurrect a path.
    f.mark_obstacle(3, 3);
    assert_eq!(
        finder.find_path(&f, base, CellCoord::new(0, 0), CellCoord::new(3, 3)),
        None
    );

    f.clear_obstacle(3, 3);
    let again = finder.find_path(&f, base, CellCoord::new(0, 0), CellCoord::new(3, 3));
    assert_eq!(
        first.map(|p| p.len()),
        again.map(|p| p.len()),
        "repeat query must match the first"
    );
}

// ============================================================================
// Region map
// ============================================================================

#[test]
fn test_region_map_partition_and_lookup() {
    let f = flow(25, 18);
    let regions = RegionMap::build(&f, 10);

    assert_eq!((regions.cols, regions.rows), (3, 2));
    assert_eq!(regions.region_of_cell(CellCoord::new(0, 0)), Some((0, 0)));
    assert_eq!(regions.region_of_cell(CellCoord::new(24, 17)), Some((2, 1)));
    assert_eq!(regions.region_of_cell(CellCoord::new(10, 9)), Some((1, 0)));

    // Far-edge regions are clipped to the map.
    let edge = regions.get((2, 1)).unwrap();
    assert_eq!((edge.width, edge.height), (5, 8));
}

#[test]
fn test_local_path_len_validates_reachability_within_a_region() {
    let mut f = flow(20, 20);
    for y in 0..9 {
        f.mark_obstacle(5, y);
    }
    let mut regions = RegionMap::build(&f, 10);

    assert_eq!(
        regions.local_path_len(&f, CellCoord::new(1, 1), CellCoord::new(8, 1)),
        Some(24),
        "detour over the wall: 7 east + 16 vertical, plus the start cell"
    );
    assert_eq!(
        regions.local_path_len(&f, CellCoord::new(1, 1), CellCoord::new(15, 1)),
        None,
        "cells in different regions are not a local query"
    );
}

// ============================================================================
// Portal construction
// ============================================================================

/// Two 10x10 regions side by side, boundary walled except for a gap of
/// `gap` cells starting at `gap_start`.
fn two_region_world(gap_start: usize, gap: usize) -> (FlowField, RegionMap) {
    let mut f = flow(20, 10);
    for y in 0..10 {
        if y < gap_start || y >= gap_start + gap {
            f.mark_obstacle(9, y);
            f.mark_obstacle(10, y);
        }
    }
    let regions = RegionMap::build(&f, 10);
    (f, regions)
}

#[test]
fn test_single_gap_yields_exactly_one_portal() {
    let (f, mut regions) = two_region_world(4, 3);
    let graph = PortalGraph::build(&f, &mut regions);

    assert_eq!(graph.portals.len(), 1, "one 3-cell gap must yield one portal");
    let portal = &graph.portals[0];
    assert_eq!(portal.regions, [(0, 0), (1, 0)]);
    assert_eq!(portal.cells[0].len(), 3);

    let [ea, eb] = portal.entrances;
    assert!(f.is_walkable(ea.x, ea.y), "entrance A must be walkable");
    assert!(f.is_walkable(eb.x, eb.y), "entrance B must be walkable");
    assert!(ea.is_adjacent(eb), "entrances must be mutually adjacent across the boundary");
    // Middle of a 3-cell run at y = 4..7.
    assert_eq!(ea, CellCoord::new(9, 5));
    assert_eq!(eb, CellCoord::new(10, 5));
}

#[test]
fn test_disjoint_gaps_yield_separate_portals() {
    let mut f = flow(20, 10);
    // Two gaps: y in 1..3 and y in 7..9, wall elsewhere.
    for y in 0..10 {
        let open = (1..3).contains(&y) || (7..9).contains(&y);
        if !open {
            f.mark_obstacle(9, y);
            f.mark_obstacle(10, y);
        }
    }
    let mut regions = RegionMap::build(&f, 10);
    let graph = PortalGraph::build(&f, &mut regions);

    assert_eq!(graph.portals.len(), 2, "disjoint runs must not merge");
    assert_eq!(graph.portals_of_region((0, 0)).len(), 2);
}

#[test]
fn test_open_boundary_yields_single_wide_portal() {
    let (f, mut regions) = two_region_world(0, 10);
    let graph = PortalGraph::build(&f, &mut regions);

    assert_eq!(graph.portals.len(), 1, "a fully open boundary is one contiguous run");
    assert_eq!(graph.portals[0].cells[0].len(), 10);
}

#[test]
fn test_sealed_boundary_yields_no_portals() {
    let (f, mut regions) = two_region_world(0, 0);
    let graph = PortalGraph::build(&f, &mut regions);
    assert!(graph.portals.is_empty());
    assert!(graph.portals_of_region((0, 0)).is_empty());
}

// ============================================================================
// Hierarchical query
// ============================================================================

/// Three 10x10 regions in a line; each boundary open only through a 3-cell
/// gap, so region 0 reaches region 2 only through region 1.
fn three_region_line(seal_middle: bool) -> (FlowField, RegionMap, PortalGraph) {
    let mut f = flow(30, 10);
    for y in 0..10 {
        if !(4..7).contains(&y) {
            f.mark_obstacle(9, y);
            f.mark_obstacle(10, y);
        }
        if seal_middle || !(4..7).contains(&y) {
            f.mark_obstacle(19, y);
            f.mark_obstacle(20, y);
        }
    }
    let mut regions = RegionMap::build(&f, 10);
    let graph = PortalGraph::build(&f, &mut regions);
    (f, regions, graph)
}

#[test]
fn test_hierarchical_query_across_three_regions() {
    let (f, mut regions, mut graph) = three_region_line(false);

    let path = graph
        .find_portal_path(&f, &mut regions, CellCoord::new(1, 1), CellCoord::new(28, 8))
        .expect("chain of open gaps must be routable");

    assert_eq!(path.len(), 2, "one portal per crossed boundary");
    assert_eq!(graph.portals[path[0]].regions, [(0, 0), (1, 0)]);
    assert_eq!(graph.portals[path[1]].regions, [(1, 0), (2, 0)]);
}

#[test]
fn test_hierarchical_query_fails_when_gap_sealed() {
    let (f, mut regions, mut graph) = three_region_line(true);

    assert_eq!(
        graph.find_portal_path(&f, &mut regions, CellCoord::new(1, 1), CellCoord::new(28, 8)),
        None,
        "sealing the middle boundary must make the query fail"
    );

    // The first boundary is still routable.
    let partial = graph.find_portal_path(&f, &mut regions, CellCoord::new(1, 1), CellCoord::new(15, 5));
    assert!(partial.is_some(), "first gap alone must still be routable");
}

#[test]
fn test_hierarchical_query_skips_unreachable_seed_portals() {
    let (mut f, _, _) = three_region_line(false);
    // Box in the start cell so it cannot reach its region's portal.
    f.mark_obstacle(3, 0);
    f.mark_obstacle(3, 1);
    f.mark_obstacle(3, 2);
    f.mark_obstacle(0, 2);
    f.mark_obstacle(1, 2);
    f.mark_obstacle(2, 2);
    let mut regions = RegionMap::build(&f, 10);
    let mut graph = PortalGraph::build(&f, &mut regions);

    assert_eq!(
        graph.find_portal_path(&f, &mut regions, CellCoord::new(1, 1), CellCoord::new(28, 8)),
        None,
        "a boxed-in start has no reachable seed portal"
    );
}

#[test]
fn test_portal_graph_query_is_repeatable() {
    let (f, mut regions, mut graph) = three_region_line(false);

    let first = graph.find_portal_path(&f, &mut regions, CellCoord::new(1, 1), CellCoord::new(28, 8));
    let second = graph.find_portal_path(&f, &mut regions, CellCoord::new(1, 1), CellCoord::new(28, 8));
    assert_eq!(first, second, "transient node state must reset between queries");
}

#[test]
fn test_connections_pick_shorter_of_overlapping_regions() {
    // A 20x20 map of four 10x10 regions with fully open boundaries: every
    // pair of portals that shares two regions must keep one representative
    // path, the shorter one.
    let f = flow(20, 20);
    let mut regions = RegionMap::build(&f, 10);
    let graph = PortalGraph::build(&f, &mut regions);

    for portal in &graph.portals {
        for link in graph.links_of(portal.id) {
            assert!(link.cost >= 2, "a representative path includes both entrances");
            assert_eq!(link.path.len() as u32, link.cost);
        }
    }
    let stats = graph.stats();
    assert_eq!(stats.portal_count, 4);
    assert!(stats.connection_count > 0);
}
