use thiserror::Error;

use super::fixed_math::FixedVec2;

/// Recoverable failures surfaced by the public simulation API.
///
/// Unreachability is deliberately NOT an error: "no path exists" comes back
/// as `FlowDirection::None` / `Option::None` from the query paths, because
/// it is an ordinary answer the caller polls for, not a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NavError {
    /// The position lies outside the navigable grid.
    #[error("position {0:?} is outside the navigable grid")]
    OutOfBounds(FixedVec2),

    /// The position falls on an obstacle cell.
    #[error("position {0:?} is blocked by an obstacle")]
    Blocked(FixedVec2),

    /// The region/portal graph has not been built yet; call
    /// `finalize_obstacles` after placing static geometry.
    #[error("obstacles have not been finalized")]
    NotFinalized,
}
