use slotmap::new_key_type;
use smallvec::SmallVec;

use super::fixed_math::{FixedNum, FixedVec2};

new_key_type! {
    /// Stable generational handle for agents. A removed agent's id never
    /// aliases a newcomer, so stale ids in cached neighbor lists resolve to
    /// "absent" instead of the wrong agent.
    pub struct AgentId;
}

/// One steering behavior's tuning plus its last-computed force.
///
/// The force is cached because neighbor gathering and raycasting are
/// amortized across ticks; off-slice ticks reuse the stored vector.
#[derive(Clone, Copy, Debug)]
pub struct SteeringForce {
    pub weight: FixedNum,
    pub radius: FixedNum,
    pub force: FixedVec2,
}

impl SteeringForce {
    pub fn new(weight: FixedNum, radius: FixedNum) -> Self {
        Self {
            weight,
            radius,
            force: FixedVec2::ZERO,
        }
    }
}

/// Per-agent spawn parameters, in world units.
#[derive(Clone, Copy, Debug)]
pub struct AgentParams {
    pub max_speed: FixedNum,
    pub nav_weight: FixedNum,
    pub alignment: (FixedNum, FixedNum),
    pub cohesion: (FixedNum, FixedNum),
    pub separation: (FixedNum, FixedNum),
    /// Weight and ray length of obstacle avoidance / sensing.
    pub avoidance: (FixedNum, FixedNum),
}

impl Default for AgentParams {
    fn default() -> Self {
        Self {
            max_speed: FixedNum::from_num(5.0),
            nav_weight: FixedNum::from_num(2.0),
            alignment: (FixedNum::from_num(0.6), FixedNum::from_num(4.0)),
            cohesion: (FixedNum::from_num(0.4), FixedNum::from_num(5.0)),
            separation: (FixedNum::from_num(1.2), FixedNum::from_num(1.5)),
            avoidance: (FixedNum::from_num(1.5), FixedNum::from_num(2.0)),
        }
    }
}

/// Full mutable state of one simulated agent.
///
/// The simulation owns exactly one record per live agent; everything an
/// agent writes during the parallel phase lands back here, and nowhere
/// else. The neighbor list is an owned, reusable buffer refilled on the
/// agent's amortization slice.
#[derive(Clone, Debug)]
pub struct AgentRecord {
    pub pos: FixedVec2,
    pub vel: FixedVec2,
    /// Current scalar speed, ramped toward `max_speed`.
    pub speed: FixedNum,
    pub max_speed: FixedNum,

    pub nav_weight: FixedNum,
    pub alignment: SteeringForce,
    pub cohesion: SteeringForce,
    pub separation: SteeringForce,
    pub avoidance: SteeringForce,

    /// Sense-ray results from the last refresh slice.
    pub blocked_left: bool,
    pub blocked_right: bool,

    /// Spatial-index bucket currently holding this agent.
    pub bucket: Option<(usize, usize)>,
    /// Cached neighborhood, refreshed once per amortization interval.
    pub neighbors: SmallVec<[AgentId; 16]>,
    /// Round-robin slice this agent refreshes on.
    pub slice: u64,

    /// Consecutive ticks of `FlowDirection::None` while off-target.
    pub stranded_ticks: u32,
}

impl AgentRecord {
    pub fn new(pos: FixedVec2, params: AgentParams, slice: u64) -> Self {
        Self {
            pos,
            vel: FixedVec2::ZERO,
            speed: FixedNum::ZERO,
            max_speed: params.max_speed,
            nav_weight: params.nav_weight,
            alignment: SteeringForce::new(params.alignment.0, params.alignment.1),
            cohesion: SteeringForce::new(params.cohesion.0, params.cohesion.1),
            separation: SteeringForce::new(params.separation.0, params.separation.1),
            avoidance: SteeringForce::new(params.avoidance.0, params.avoidance.1),
            blocked_left: false,
            blocked_right: false,
            bucket: None,
            neighbors: SmallVec::new(),
            slice,
            stranded_ticks: 0,
        }
    }
}
