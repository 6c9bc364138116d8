//! Deterministic fixed-point mathematics.
//!
//! All world-space quantities in the simulation use fixed-point arithmetic so
//! that every run produces identical results regardless of platform or
//! compiler flags. Steering, integration-field propagation and portal costs
//! all feed back into each other across ticks; a single nondeterministic
//! float would diverge the whole crowd.

use fixed::types::I48F16;

pub use vec2::FixedVec2;

mod vec2;

/// Fixed-point number type used throughout the simulation.
///
/// I48F16 format: 48 integer bits, 16 fractional bits. Range is roughly
/// ±140 trillion with a precision of ~0.000015, which comfortably covers
/// world coordinates, squared distances and accumulated path costs.
pub type FixedNum = I48F16;
