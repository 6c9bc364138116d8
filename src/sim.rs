//! Layered crowd-navigation engine.
//!
//! A flow field answers "which way to the target" per grid cell, a
//! region/portal graph keeps long-range queries from scanning the whole
//! map, a spatial hash gives every agent bounded-cost neighbor lookups, and
//! a steering layer blends navigation with flocking into per-agent motion.
//! [`Simulation`] ties the layers together behind one context object.

pub mod agent;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fixed_math;
pub mod flow_field;
pub mod grid;
pub mod pathfinding;
pub mod sensing;
pub mod spatial_index;
pub mod steering;

mod context;

pub use agent::{AgentId, AgentParams, AgentRecord};
pub use config::{RawSimConfig, SimConfig};
pub use context::Simulation;
pub use coordinator::{NavigationCoordinator, RouteState};
pub use error::NavError;
pub use fixed_math::{FixedNum, FixedVec2};
pub use flow_field::{FlowDirection, FlowField};
pub use sensing::{GridCaster, ObstacleCaster};
