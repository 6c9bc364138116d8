use slotmap::SlotMap;

use super::*;
use crate::sim::agent::{AgentParams, AgentRecord};
use crate::sim::config::SimConfig;
use crate::sim::coordinator::NavigationCoordinator;
use crate::sim::flow_field::FlowField;
use crate::sim::sensing::GridCaster;

struct World {
    agents: SlotMap<AgentId, AgentRecord>,
    index: SpatialIndex,
    nav: NavigationCoordinator,
    config: SimConfig,
}

fn world() -> World {
    let config = SimConfig::default();
    let flow = FlowField::new(20, 20, FixedNum::from_num(1.0), FixedVec2::ZERO);
    let mut nav = NavigationCoordinator::new(flow, config.max_route_attempts);
    nav.finalize_obstacles(10);

    World {
        agents: SlotMap::with_key(),
        index: SpatialIndex::new(
            FixedNum::from_num(20.0),
            FixedNum::from_num(20.0),
            FixedNum::from_num(5.0),
            FixedVec2::ZERO,
        ),
        nav,
        config,
    }
}

fn spawn(w: &mut World, x: f32, y: f32, slice: u64) -> AgentId {
    let pos = FixedVec2::from_f32(x, y);
    let mut rec = AgentRecord::new(pos, AgentParams::default(), slice);
    let bucket = w.index.bucket_of(pos).expect("test agents spawn inside the map");
    rec.bucket = Some(bucket);
    let id = w.agents.insert(rec);
    w.index.insert(id, bucket);
    id
}

fn dt() -> FixedNum {
    FixedNum::from_num(1.0) / FixedNum::from_num(30.0)
}

#[test]
fn test_separation_pushes_close_agents_apart() {
    let mut w = world();
    let a = spawn(&mut w, 5.0, 5.0, 0);
    let _b = spawn(&mut w, 5.5, 5.0, 0);

    let caster = GridCaster::new(&w.nav.flow);
    let input = SteeringInput {
        agents: &w.agents,
        index: &w.index,
        nav: &w.nav,
        caster: &caster,
        config: &w.config,
        tick: 0,
    };

    let update = steer_agent(a, &w.agents[a], &input, dt());
    let (fx, _) = update.separation_force.to_f32();
    assert!(fx < 0.0, "separation must point away from the neighbor, got {}", fx);
    let (vx, _) = update.vel.to_f32();
    assert!(vx < 0.0, "velocity must move the agent away, got {}", vx);
}

#[test]
fn test_alignment_and_cohesion_follow_the_flock() {
    let mut w = world();
    let a = spawn(&mut w, 5.0, 5.0, 0);
    // Outside the separation radius, inside alignment/cohesion radii.
    let b = spawn(&mut w, 7.0, 5.0, 0);
    w.agents[b].vel = FixedVec2::from_f32(1.0, 0.0);

    let caster = GridCaster::new(&w.nav.flow);
    let input = SteeringInput {
        agents: &w.agents,
        index: &w.index,
        nav: &w.nav,
        caster: &caster,
        config: &w.config,
        tick: 0,
    };

    let update = steer_agent(a, &w.agents[a], &input, dt());
    let (ax, _) = update.alignment_force.to_f32();
    assert!(ax > 0.9, "alignment must match the neighbor's heading, got {}", ax);
    let (cx, _) = update.cohesion_force.to_f32();
    assert!(cx > 0.9, "cohesion must pull toward the neighbor, got {}", cx);
    let (vx, _) = update.vel.to_f32();
    assert!(vx > 0.0, "agent must start following the flock");
}

#[test]
fn test_lone_agent_accumulates_no_flocking_forces() {
    let mut w = world();
    let a = spawn(&mut w, 5.0, 5.0, 0);

    let caster = GridCaster::new(&w.nav.flow);
    let input = SteeringInput {
        agents: &w.agents,
        index: &w.index,
        nav: &w.nav,
        caster: &caster,
        config: &w.config,
        tick: 0,
    };

    let update = steer_agent(a, &w.agents[a], &input, dt());
    assert_eq!(update.alignment_force, FixedVec2::ZERO);
    assert_eq!(update.cohesion_force, FixedVec2::ZERO);
    assert_eq!(update.separation_force, FixedVec2::ZERO);
    assert_eq!(update.vel, FixedVec2::ZERO, "no forces, no movement");
}

#[test]
fn test_neighbor_cache_refresh_is_amortized() {
    let mut w = world();
    let a = spawn(&mut w, 5.0, 5.0, 1);
    let _b = spawn(&mut w, 6.0, 5.0, 0);

    let caster = GridCaster::new(&w.nav.flow);
    let mut input = SteeringInput {
        agents: &w.agents,
        index: &w.index,
        nav: &w.nav,
        caster: &caster,
        config: &w.config,
        tick: 0,
    };

    // Off-slice tick: the stale (empty) cache is reused.
    let update = steer_agent(a, &w.agents[a], &input, dt());
    assert!(update.neighbors.is_none(), "off-slice ticks must not re-query the index");

    // On-slice tick: fresh gather.
    input.tick = 1;
    let update = steer_agent(a, &w.agents[a], &input, dt());
    let fresh = update.neighbors.expect("refresh slice must re-query the index");
    assert_eq!(fresh.len(), 1, "the neighbor must be found on refresh");
}

#[test]
fn test_stale_neighbor_ids_are_skipped() {
    let mut w = world();
    let a = spawn(&mut w, 5.0, 5.0, 1);
    let b = spawn(&mut w, 5.5, 5.0, 0);

    // b dies but stays in a's cached neighbor list.
    w.agents.remove(b);
    w.agents[a].neighbors.push(b);

    let caster = GridCaster::new(&w.nav.flow);
    let input = SteeringInput {
        agents: &w.agents,
        index: &w.index,
        nav: &w.nav,
        caster: &caster,
        config: &w.config,
        tick: 0,
    };

    let update = steer_agent(a, &w.agents[a], &input, dt());
    assert_eq!(
        update.separation_force,
        FixedVec2::ZERO,
        "a removed neighbor must contribute nothing"
    );
}

#[test]
fn test_sense_rays_report_blocking_and_cut_speed() {
    let mut w = world();
    for y in 0..20 {
        w.nav.flow.mark_obstacle(10, y);
    }
    let a = spawn(&mut w, 9.5, 5.5, 0);
    w.agents[a].vel = FixedVec2::from_f32(1.0, 0.0);
    w.agents[a].speed = FixedNum::from_num(5.0);

    let caster = GridCaster::new(&w.nav.flow);
    let input = SteeringInput {
        agents: &w.agents,
        index: &w.index,
        nav: &w.nav,
        caster: &caster,
        config: &w.config,
        tick: 0,
    };

    let update = steer_agent(a, &w.agents[a], &input, dt());
    assert!(update.blocked_left && update.blocked_right, "both rays face the wall");
    let (fx, _) = update.avoidance_force.to_f32();
    assert!(fx < 0.0, "avoidance must push away from the wall, got {}", fx);
    assert!(
        update.speed < FixedNum::from_num(5.0),
        "speed must ramp down while blocked"
    );
}

#[test]
fn test_position_integration_never_enters_obstacles() {
    let mut w = world();
    for y in 0..20 {
        w.nav.flow.mark_obstacle(10, y);
    }
    // Slice 1: no refresh on tick 0, so no avoidance kicks in and the raw
    // velocity drives straight at the wall.
    let a = spawn(&mut w, 9.9, 5.5, 1);
    w.agents[a].vel = FixedVec2::from_f32(20.0, 0.0);
    w.agents[a].speed = FixedNum::from_num(5.0);

    let caster = GridCaster::new(&w.nav.flow);
    let input = SteeringInput {
        agents: &w.agents,
        index: &w.index,
        nav: &w.nav,
        caster: &caster,
        config: &w.config,
        tick: 0,
    };

    let update = steer_agent(a, &w.agents[a], &input, dt());
    let (x, y) = update.pos.to_f32();
    let cell = w.nav.flow.world_to_cell(update.pos).expect("agent stays on the map");
    assert!(
        w.nav.flow.is_walkable(cell.0, cell.1),
        "agent must not end up inside the wall at ({}, {})",
        x,
        y
    );
}

#[test]
fn test_navigation_direction_drives_velocity() {
    let mut w = world();
    let a = spawn(&mut w, 2.5, 2.5, 0);

    w.nav.set_target(FixedVec2::from_f32(18.5, 2.5)).expect("open target");
    assert_eq!(w.nav.get_direction(FixedVec2::from_f32(2.5, 2.5)), crate::sim::flow_field::FlowDirection::None);
    w.nav.note_route_origin(CellCoord::new(2, 2));
    w.nav.process_pending();

    let caster = GridCaster::new(&w.nav.flow);
    let input = SteeringInput {
        agents: &w.agents,
        index: &w.index,
        nav: &w.nav,
        caster: &caster,
        config: &w.config,
        tick: 0,
    };

    let update = steer_agent(a, &w.agents[a], &input, dt());
    assert!(!update.nav_starved, "routed field must feed the agent");
    let (vx, _) = update.vel.to_f32();
    assert!(vx > 0.0, "agent must head toward the target, got {}", vx);
}

#[test]
fn test_unrouted_agent_requests_coverage_and_holds() {
    let mut w = world();
    let a = spawn(&mut w, 2.5, 2.5, 1);
    w.nav.set_target(FixedVec2::from_f32(18.5, 2.5)).expect("open target");

    let caster = GridCaster::new(&w.nav.flow);
    let input = SteeringInput {
        agents: &w.agents,
        index: &w.index,
        nav: &w.nav,
        caster: &caster,
        config: &w.config,
        tick: 0,
    };

    let update = steer_agent(a, &w.agents[a], &input, dt());
    assert!(update.nav_starved, "no coverage yet");
    assert_eq!(update.route_request, Some(CellCoord::new(2, 2)));
    assert_eq!(update.vel, FixedVec2::ZERO, "agent holds position for the tick");
}
