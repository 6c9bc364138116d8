use slotmap::SlotMap;
use smallvec::SmallVec;

use super::agent::{AgentId, AgentRecord};
use super::config::SimConfig;
use super::coordinator::NavigationCoordinator;
use super::fixed_math::{FixedNum, FixedVec2};
use super::pathfinding::CellCoord;
use super::sensing::ObstacleCaster;
use super::spatial_index::SpatialIndex;

/// Read-only world view handed to every agent during the parallel phase.
///
/// Everything in here is tick-stable: the flow field, index and agent
/// records were finalized by the preceding single-writer phase and nothing
/// mutates them until every agent's [`AgentUpdate`] has been computed.
pub struct SteeringInput<'a> {
    pub agents: &'a SlotMap<AgentId, AgentRecord>,
    pub index: &'a SpatialIndex,
    pub nav: &'a NavigationCoordinator,
    pub caster: &'a dyn ObstacleCaster,
    pub config: &'a SimConfig,
    pub tick: u64,
}

/// Everything one agent computed for itself this tick. Applied serially
/// after the parallel phase; agents never write each other's state.
pub struct AgentUpdate {
    pub id: AgentId,
    pub pos: FixedVec2,
    pub vel: FixedVec2,
    pub speed: FixedNum,
    pub alignment_force: FixedVec2,
    pub cohesion_force: FixedVec2,
    pub separation_force: FixedVec2,
    pub avoidance_force: FixedVec2,
    pub blocked_left: bool,
    pub blocked_right: bool,
    /// Fresh neighbor cache, present only on this agent's refresh slice.
    pub neighbors: Option<SmallVec<[AgentId; 16]>>,
    /// The navigation query answered `None` while a target was active.
    pub nav_starved: bool,
    /// Cell to seed global routing from, if this agent needs coverage.
    pub route_request: Option<CellCoord>,
}

/// Compute one agent's steering, velocity and position for this tick.
///
/// Force model: navigation direction plus alignment, cohesion, separation
/// and obstacle avoidance, each accumulated, averaged, safe-normalized and
/// independently weighted. Neighbor gathering and raycasts only run on the
/// agent's amortization slice (1-in-N agents per tick); between refreshes
/// the cached neighbor list and avoidance force are reused. Missing
/// (removed) neighbors are skipped, never an error.
pub fn steer_agent(id: AgentId, rec: &AgentRecord, input: &SteeringInput<'_>, dt: FixedNum) -> AgentUpdate {
    let cfg = input.config;
    let refresh = rec.slice == input.tick % cfg.refresh_interval;

    // --- Neighbor gathering (amortized) ---
    let fresh_neighbors: Option<SmallVec<[AgentId; 16]>> = if refresh {
        let mut out = SmallVec::new();
        if let Some(bucket) = input.index.bucket_of(rec.pos) {
            input.index.query_block(bucket, id, &mut out);
        }
        Some(out)
    } else {
        None
    };
    let neighbors: &[AgentId] = fresh_neighbors
        .as_ref()
        .map(|n| n.as_slice())
        .unwrap_or(&rec.neighbors);

    // --- Flocking accumulators ---
    let mut alignment_accum = FixedVec2::ZERO;
    let mut alignment_count = 0u32;
    let mut cohesion_accum = FixedVec2::ZERO;
    let mut cohesion_count = 0u32;
    let mut separation_accum = FixedVec2::ZERO;
    let mut separation_count = 0u32;

    let alignment_r_sq = rec.alignment.radius * rec.alignment.radius;
    let cohesion_r_sq = rec.cohesion.radius * rec.cohesion.radius;
    let separation_r_sq = rec.separation.radius * rec.separation.radius;

    for &other_id in neighbors {
        if other_id == id {
            continue;
        }
        // Stale ids (agents removed mid-interval) are simply absent.
        let Some(other) = input.agents.get(other_id) else {
            continue;
        };

        let away = rec.pos - other.pos;
        let dist_sq = away.length_squared();

        if dist_sq <= alignment_r_sq {
            alignment_accum = alignment_accum + other.vel;
            alignment_count += 1;
        }
        if dist_sq <= cohesion_r_sq {
            cohesion_accum = cohesion_accum + other.pos;
            cohesion_count += 1;
        }
        if dist_sq <= separation_r_sq {
            separation_accum = separation_accum + away.normalize();
            separation_count += 1;
        }
    }

    let alignment_force = if alignment_count > 0 {
        (alignment_accum / FixedNum::from_num(alignment_count)).normalize()
    } else {
        FixedVec2::ZERO
    };
    let cohesion_force = if cohesion_count > 0 {
        let center = cohesion_accum / FixedNum::from_num(cohesion_count);
        (center - rec.pos).normalize()
    } else {
        FixedVec2::ZERO
    };
    let separation_force = if separation_count > 0 {
        (separation_accum / FixedNum::from_num(separation_count)).normalize()
    } else {
        FixedVec2::ZERO
    };

    // --- Navigation direction ---
    let nav_dir = input.nav.get_direction(rec.pos);
    let nav_vec = nav_dir.to_vec2();
    let at_target = input
        .nav
        .target_cell()
        .zip(input.nav.flow.world_to_cell(rec.pos))
        .map(|(t, (x, y))| t == CellCoord::new(x, y))
        .unwrap_or(false);
    let nav_starved = nav_vec == FixedVec2::ZERO && input.nav.target_cell().is_some() && !at_target;
    let route_request = input.nav.wants_route_from(rec.pos);

    // --- Obstacle avoidance and sensing (amortized) ---
    let (avoidance_force, blocked_left, blocked_right) = if refresh {
        let heading = if rec.vel.length_squared() > FixedNum::ZERO {
            rec.vel.normalize()
        } else {
            nav_vec
        };
        if heading == FixedVec2::ZERO {
            (FixedVec2::ZERO, false, false)
        } else {
            let left_dir = heading.rotated(cfg.sense_cos, cfg.sense_sin);
            let right_dir = heading.rotated(cfg.sense_cos, -cfg.sense_sin);
            let reach = rec.avoidance.radius;

            let mut accum = FixedVec2::ZERO;
            let left_hit = input.caster.cast_ray(rec.pos, left_dir, reach);
            let right_hit = input.caster.cast_ray(rec.pos, right_dir, reach);
            if let Some(hit) = left_hit {
                accum = accum + (rec.pos - hit);
            }
            if let Some(hit) = right_hit {
                accum = accum + (rec.pos - hit);
            }
            (accum.normalize(), left_hit.is_some(), right_hit.is_some())
        }
    } else {
        (rec.avoidance.force, rec.blocked_left, rec.blocked_right)
    };

    // --- Blend ---
    let mut steer = nav_vec * rec.nav_weight
        + alignment_force * rec.alignment.weight
        + cohesion_force * rec.cohesion.weight
        + separation_force * rec.separation.weight
        + avoidance_force * rec.avoidance.weight;

    // Asymmetric blocking: nudge the heading toward the open side.
    if blocked_left != blocked_right {
        steer = if blocked_left {
            steer.rotated(cfg.nudge_cos, -cfg.nudge_sin)
        } else {
            steer.rotated(cfg.nudge_cos, cfg.nudge_sin)
        };
    }

    // --- Speed ramp ---
    let blocked = blocked_left || blocked_right;
    let mut speed = rec.speed;
    if blocked {
        speed = (speed - cfg.speed_ramp_down * dt).max(FixedNum::ZERO);
    } else {
        speed = (speed + cfg.speed_ramp_up * dt).min(rec.max_speed);
    }
    if at_target || (steer == FixedVec2::ZERO && nav_starved) {
        // Arrived, or holding position while routing completes.
        speed = FixedNum::ZERO;
    }

    // --- Velocity integration, bounded turn rate ---
    let desired = steer.normalize() * speed;
    let mut vel = rec.vel + (desired - rec.vel).clamp_length(cfg.turn_rate * dt);
    let pos = integrate_position(rec.pos, &mut vel, input, dt);

    AgentUpdate {
        id,
        pos,
        vel,
        speed,
        alignment_force,
        cohesion_force,
        separation_force,
        avoidance_force,
        blocked_left,
        blocked_right,
        neighbors: fresh_neighbors,
        nav_starved,
        route_request,
    }
}

/// Advance a position by one tick of velocity without ever entering an
/// obstacle cell: blocked moves fall back to sliding along one axis, then
/// to holding still.
fn integrate_position(
    pos: FixedVec2,
    vel: &mut FixedVec2,
    input: &SteeringInput<'_>,
    dt: FixedNum,
) -> FixedVec2 {
    let flow = &input.nav.flow;
    let walkable = |p: FixedVec2| match flow.world_to_cell(p) {
        Some((x, y)) => flow.is_walkable(x, y),
        None => false,
    };

    let full = pos + *vel * dt;
    if walkable(full) {
        return full;
    }

    let x_only = pos + FixedVec2::new(vel.x, FixedNum::ZERO) * dt;
    if walkable(x_only) {
        vel.y = FixedNum::ZERO;
        return x_only;
    }

    let y_only = pos + FixedVec2::new(FixedNum::ZERO, vel.y) * dt;
    if walkable(y_only) {
        vel.x = FixedNum::ZERO;
        return y_only;
    }

    *vel = FixedVec2::ZERO;
    pos
}

#[cfg(test)]
#[path = "steering_tests.rs"]
mod tests;
