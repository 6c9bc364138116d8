//! Hierarchical routing: per-region A*, the coarse region partition and the
//! portal graph that connects regions across their shared boundaries.

mod astar;
mod portal;
mod region;
mod types;

#[cfg(test)]
mod tests;

pub use astar::AStarPathfinder;
pub use portal::{PortalGraph, PortalLink};
pub use region::{Region, RegionMap};
pub use types::{CellCoord, GraphStats, Portal, RegionId, DEFAULT_AREA_SIZE};
