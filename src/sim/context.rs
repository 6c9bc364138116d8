use rayon::prelude::*;
use slotmap::SlotMap;
use tracing::info;

use super::agent::{AgentId, AgentParams, AgentRecord};
use super::config::SimConfig;
use super::coordinator::NavigationCoordinator;
use super::error::NavError;
use super::fixed_math::{FixedNum, FixedVec2};
use super::flow_field::{FlowDirection, FlowField};
use super::pathfinding::GraphStats;
use super::sensing::{GridCaster, ObstacleCaster};
use super::spatial_index::SpatialIndex;
use super::steering::{steer_agent, AgentUpdate, SteeringInput};
use crate::profile_log;

/// The whole crowd simulation behind one explicit context object.
///
/// Constructed once and passed by reference wherever it is needed; there
/// are no singletons and no lazy lookups. Startup is two-phase: construct,
/// register all static obstacles, then [`finalize_obstacles`] exactly once
/// before the first target is set.
///
/// # Tick structure
///
/// Each [`tick`](Self::tick) runs two phases with a barrier between them:
///
/// 1. **Single-writer phase:** graph rebuilds after obstacle changes,
///    pending global routing, spatial-index bucket maintenance. All global
///    mutation happens here, so readers of the previous field are never
///    exposed to a half-written one.
/// 2. **Parallel agent phase:** every agent independently computes its own
///    [`AgentUpdate`] from the tick-stable snapshot (rayon fan-out), then
///    the updates are applied serially. Agents write only their own record.
///
/// Expensive work (flow-field and portal-graph recomputation) never runs in
/// the parallel phase and never runs per tick; it is driven by target and
/// obstacle changes only, and a superseded target's pending work is
/// discarded before it can be observed.
pub struct Simulation {
    config: SimConfig,
    pub coordinator: NavigationCoordinator,
    index: SpatialIndex,
    agents: SlotMap<AgentId, AgentRecord>,
    tick: u64,
    spawn_seq: u64,
    graph_dirty: bool,
}

impl Simulation {
    pub fn new(config: SimConfig) -> Self {
        let (width, height) = config.grid_dimensions();
        let flow = FlowField::new(width, height, config.cell_size, config.origin);
        let coordinator = NavigationCoordinator::new(flow, config.max_route_attempts);
        let index = SpatialIndex::new(
            config.map_width,
            config.map_height,
            config.index_cell_size,
            config.origin,
        );

        Self {
            config,
            coordinator,
            index,
            agents: SlotMap::with_key(),
            tick: 0,
            spawn_seq: 0,
            graph_dirty: false,
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    pub fn agent(&self, id: AgentId) -> Option<&AgentRecord> {
        self.agents.get(id)
    }

    pub fn agent_ids(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.agents.keys()
    }

    pub fn graph_stats(&self) -> Option<GraphStats> {
        self.coordinator.portal_graph().map(|g| g.stats())
    }

    // ------------------------------------------------------------------
    // Obstacle layer
    // ------------------------------------------------------------------

    /// Mark every cell overlapping the world-space AABB as an obstacle.
    /// Invalidates the portal graph and flow field (rebuilt next tick).
    pub fn register_obstacle_region(&mut self, min: FixedVec2, max: FixedVec2) {
        self.stamp_region(min, max, true);
    }

    /// Clear the obstacle sentinel from every cell overlapping the AABB.
    pub fn clear_obstacle_region(&mut self, min: FixedVec2, max: FixedVec2) {
        self.stamp_region(min, max, false);
    }

    fn stamp_region(&mut self, min: FixedVec2, max: FixedVec2, obstacle: bool) {
        let flow = &mut self.coordinator.flow;
        let cell = flow.grid.cell_size();
        let origin = flow.grid.origin();

        let lo_x = ((min.x - origin.x) / cell).floor().to_num::<i64>().max(0);
        let lo_y = ((min.y - origin.y) / cell).floor().to_num::<i64>().max(0);
        let hi_x = ((max.x - origin.x) / cell)
            .floor()
            .to_num::<i64>()
            .min(flow.width() as i64 - 1);
        let hi_y = ((max.y - origin.y) / cell)
            .floor()
            .to_num::<i64>()
            .min(flow.height() as i64 - 1);

        if lo_x > hi_x || lo_y > hi_y {
            return;
        }
        for y in lo_y..=hi_y {
            for x in lo_x..=hi_x {
                if obstacle {
                    flow.mark_obstacle(x as usize, y as usize);
                } else {
                    flow.clear_obstacle(x as usize, y as usize);
                }
            }
        }
        self.graph_dirty = true;
    }

    /// Second phase of startup: build the region partition and portal graph
    /// once all static obstacles are placed. Synchronous and explicit; no
    /// waiting on engine frame timing.
    pub fn finalize_obstacles(&mut self) {
        self.coordinator.finalize_obstacles(self.config.area_size);
        self.graph_dirty = false;
        info!(
            "[SIM] Obstacles finalized, {} portals",
            self.graph_stats().map(|s| s.portal_count).unwrap_or(0)
        );
    }

    // ------------------------------------------------------------------
    // Navigation surface
    // ------------------------------------------------------------------

    /// Set the active navigation target. Fails on obstacle or out-of-range
    /// positions; the previous target stays active on failure.
    pub fn set_target(&mut self, world: FixedVec2) -> Result<(), NavError> {
        self.coordinator.set_target(world)
    }

    /// Movement direction for a world position; `None` while routing is
    /// pending or the position is unreachable/at-target.
    pub fn get_direction(&mut self, world: FixedVec2) -> FlowDirection {
        let dir = self.coordinator.get_direction(world);
        if let Some(cell) = self.coordinator.wants_route_from(world) {
            self.coordinator.note_route_origin(cell);
        }
        dir
    }

    // ------------------------------------------------------------------
    // Agents
    // ------------------------------------------------------------------

    /// Spawn an agent. Rejects positions outside the grid or on obstacle
    /// cells.
    pub fn spawn_agent(&mut self, world: FixedVec2, params: AgentParams) -> Result<AgentId, NavError> {
        let Some((x, y)) = self.coordinator.flow.world_to_cell(world) else {
            return Err(NavError::OutOfBounds(world));
        };
        if !self.coordinator.flow.is_walkable(x, y) {
            return Err(NavError::Blocked(world));
        }

        let slice = self.spawn_seq % self.config.refresh_interval;
        self.spawn_seq += 1;

        let mut record = AgentRecord::new(world, params, slice);
        let bucket = self.index.bucket_of(world);
        record.bucket = bucket;
        let id = self.agents.insert(record);
        if let Some(bucket) = bucket {
            self.index.insert(id, bucket);
        }
        Ok(id)
    }

    /// Remove an agent, purging it from the spatial index and from every
    /// other agent's cached neighbor list in the same tick.
    pub fn remove_agent(&mut self, id: AgentId) -> bool {
        let Some(record) = self.agents.remove(id) else {
            return false;
        };
        if let Some(bucket) = record.bucket {
            self.index.remove(id, bucket);
        }
        for (_, other) in self.agents.iter_mut() {
            other.neighbors.retain(|n| *n != id);
        }
        true
    }

    /// Agents that have been starved of directions longer than the
    /// configured budget. The core stops retrying for them; the caller
    /// decides what happens next (typically removal).
    pub fn stranded_agents(&self) -> Vec<AgentId> {
        self.agents
            .iter()
            .filter(|(_, r)| r.stranded_ticks > self.config.stranded_tick_limit)
            .map(|(id, _)| id)
            .collect()
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Advance the simulation one step using the built-in grid-backed
    /// obstacle caster.
    pub fn tick(&mut self, dt: FixedNum) {
        self.single_writer_phase();
        let caster = GridCaster::new(&self.coordinator.flow);
        let updates = Self::parallel_phase(
            &self.agents,
            &self.index,
            &self.coordinator,
            &caster,
            &self.config,
            self.tick,
            dt,
        );
        self.apply_updates(updates);
        self.tick += 1;
    }

    /// Advance one step with an external obstacle backend (engine physics)
    /// substituted for the built-in grid caster.
    pub fn tick_with_caster(&mut self, dt: FixedNum, caster: &dyn ObstacleCaster) {
        self.single_writer_phase();
        let updates = Self::parallel_phase(
            &self.agents,
            &self.index,
            &self.coordinator,
            caster,
            &self.config,
            self.tick,
            dt,
        );
        self.apply_updates(updates);
        self.tick += 1;
    }

    /// Global, single-writer work: graph rebuilds, pending routing, index
    /// bucket maintenance. Completes before any agent runs.
    fn single_writer_phase(&mut self) {
        if self.graph_dirty && self.coordinator.is_finalized() {
            self.coordinator.rebuild_graph();
            self.graph_dirty = false;
        }

        self.coordinator.process_pending();

        // Lazy bucket handoff: only agents whose coarse cell changed since
        // last tick move.
        let mut moves: Vec<(AgentId, Option<(usize, usize)>, (usize, usize))> = Vec::new();
        for (id, record) in self.agents.iter() {
            let new_bucket = self.index.bucket_of(record.pos);
            if let Some(new_bucket) = new_bucket {
                if record.bucket != Some(new_bucket) {
                    moves.push((id, record.bucket, new_bucket));
                }
            }
        }
        for (id, old, new) in moves {
            self.index.relocate(id, old, new);
            if let Some(record) = self.agents.get_mut(id) {
                record.bucket = Some(new);
            }
        }
    }

    /// Fan agent steering out across threads. Pure reads of the shared
    /// snapshot; each agent produces only its own update.
    fn parallel_phase(
        agents: &SlotMap<AgentId, AgentRecord>,
        index: &SpatialIndex,
        nav: &NavigationCoordinator,
        caster: &dyn ObstacleCaster,
        config: &SimConfig,
        tick: u64,
        dt: FixedNum,
    ) -> Vec<AgentUpdate> {
        let input = SteeringInput {
            agents,
            index,
            nav,
            caster,
            config,
            tick,
        };
        let ids: Vec<AgentId> = agents.keys().collect();
        ids.par_iter()
            .map(|&id| steer_agent(id, &agents[id], &input, dt))
            .collect()
    }

    /// Serial write-back of the parallel phase's results.
    fn apply_updates(&mut self, updates: Vec<AgentUpdate>) {
        let has_target = self.coordinator.target_cell().is_some();

        for update in updates {
            if let Some(cell) = update.route_request {
                self.coordinator.note_route_origin(cell);
            }
            let Some(record) = self.agents.get_mut(update.id) else {
                continue;
            };
            record.pos = update.pos;
            record.vel = update.vel;
            record.speed = update.speed;
            record.alignment.force = update.alignment_force;
            record.cohesion.force = update.cohesion_force;
            record.separation.force = update.separation_force;
            record.avoidance.force = update.avoidance_force;
            record.blocked_left = update.blocked_left;
            record.blocked_right = update.blocked_right;
            if let Some(neighbors) = update.neighbors {
                record.neighbors = neighbors;
            }
            record.stranded_ticks = if update.nav_starved && has_target {
                record.stranded_ticks + 1
            } else {
                0
            };
        }

        profile_log!(
            self.tick,
            "[TICK] {} agents, {} index entries",
            self.agents.len(),
            self.index.total_entries()
        );
    }
}
