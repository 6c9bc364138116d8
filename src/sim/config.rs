use serde::{Deserialize, Serialize};
use tracing::info;

use super::fixed_math::{FixedNum, FixedVec2};
use super::pathfinding::DEFAULT_AREA_SIZE;

/// User-facing configuration, loaded from RON files with ordinary floats.
///
/// Float values are converted to fixed-point exactly once, when a
/// [`SimConfig`] is built from this; the simulation layer never touches a
/// float after that single conversion point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSimConfig {
    /// Simulation ticks per second; the demo binary derives its fixed
    /// timestep from this.
    pub tick_rate: f64,

    // World layout
    pub map_width: f32,
    pub map_height: f32,
    pub origin_x: f32,
    pub origin_y: f32,
    /// Fine flow-field cell edge length.
    pub cell_size: f32,
    /// Region edge length in fine cells.
    pub area_size: usize,
    /// Coarse agent-index cell edge length.
    pub index_cell_size: f32,

    // Steering
    /// Maximum velocity change per second.
    pub turn_rate: f32,
    /// Speed gained per second while unblocked.
    pub speed_ramp_up: f32,
    /// Speed lost per second while sense rays report blocking.
    pub speed_ramp_down: f32,
    /// Offset of the two sense/avoidance rays from the heading, degrees.
    pub sense_angle_deg: f32,
    /// Corrective heading rotation when exactly one side is blocked,
    /// degrees.
    pub yaw_nudge_deg: f32,

    // Scheduling
    /// Neighbor gathering and raycasts refresh 1-in-N agents per tick.
    pub refresh_interval: u64,
    /// Failed global-routing passes tolerated per target.
    pub max_route_attempts: u32,
    /// Consecutive `None`-direction ticks before an agent counts as
    /// stranded.
    pub stranded_tick_limit: u32,
}

impl Default for RawSimConfig {
    fn default() -> Self {
        Self {
            tick_rate: 30.0,
            map_width: 50.0,
            map_height: 50.0,
            origin_x: 0.0,
            origin_y: 0.0,
            cell_size: 1.0,
            area_size: DEFAULT_AREA_SIZE,
            index_cell_size: 5.0,
            turn_rate: 20.0,
            speed_ramp_up: 8.0,
            speed_ramp_down: 16.0,
            sense_angle_deg: 25.0,
            yaw_nudge_deg: 15.0,
            refresh_interval: 4,
            max_route_attempts: 3,
            stranded_tick_limit: 120,
        }
    }
}

impl RawSimConfig {
    pub fn from_ron_str(s: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(s)
    }

    pub fn load_from_path(path: &std::path::Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron_str(&text).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

/// Runtime configuration with all physics parameters in fixed-point.
///
/// Built once from a [`RawSimConfig`]; changing values mid-run would break
/// determinism, so the simulation holds this by value and never reloads.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub tick_rate: f64,

    pub map_width: FixedNum,
    pub map_height: FixedNum,
    pub origin: FixedVec2,
    pub cell_size: FixedNum,
    pub area_size: usize,
    pub index_cell_size: FixedNum,

    pub turn_rate: FixedNum,
    pub speed_ramp_up: FixedNum,
    pub speed_ramp_down: FixedNum,
    /// (cos, sin) of the sense-ray offset angle.
    pub sense_cos: FixedNum,
    pub sense_sin: FixedNum,
    /// (cos, sin) of the corrective yaw nudge.
    pub nudge_cos: FixedNum,
    pub nudge_sin: FixedNum,

    pub refresh_interval: u64,
    pub max_route_attempts: u32,
    pub stranded_tick_limit: u32,
}

impl From<&RawSimConfig> for SimConfig {
    fn from(raw: &RawSimConfig) -> Self {
        let sense = raw.sense_angle_deg.to_radians();
        let nudge = raw.yaw_nudge_deg.to_radians();

        info!(
            "[CONFIG] {}x{} world, cell {}, area {}, tick rate {}",
            raw.map_width, raw.map_height, raw.cell_size, raw.area_size, raw.tick_rate
        );

        Self {
            tick_rate: raw.tick_rate,
            map_width: FixedNum::from_num(raw.map_width),
            map_height: FixedNum::from_num(raw.map_height),
            origin: FixedVec2::from_f32(raw.origin_x, raw.origin_y),
            cell_size: FixedNum::from_num(raw.cell_size),
            area_size: raw.area_size.max(1),
            index_cell_size: FixedNum::from_num(raw.index_cell_size),
            turn_rate: FixedNum::from_num(raw.turn_rate),
            speed_ramp_up: FixedNum::from_num(raw.speed_ramp_up),
            speed_ramp_down: FixedNum::from_num(raw.speed_ramp_down),
            sense_cos: FixedNum::from_num(sense.cos()),
            sense_sin: FixedNum::from_num(sense.sin()),
            nudge_cos: FixedNum::from_num(nudge.cos()),
            nudge_sin: FixedNum::from_num(nudge.sin()),
            refresh_interval: raw.refresh_interval.max(1),
            max_route_attempts: raw.max_route_attempts,
            stranded_tick_limit: raw.stranded_tick_limit,
        }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self::from(&RawSimConfig::default())
    }
}

impl SimConfig {
    /// Grid dimensions implied by the map extents.
    pub fn grid_dimensions(&self) -> (usize, usize) {
        let w = (self.map_width / self.cell_size).ceil().to_num::<usize>();
        let h = (self.map_height / self.cell_size).ceil().to_num::<usize>();
        (w, h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ron_round_trip() {
        let raw = RawSimConfig::default();
        let text = ron::to_string(&raw).expect("config must serialize");
        let back = RawSimConfig::from_ron_str(&text).expect("serialized config must parse");
        assert_eq!(back.map_width, raw.map_width);
        assert_eq!(back.refresh_interval, raw.refresh_interval);
    }

    #[test]
    fn test_partial_ron_is_rejected() {
        // Missing fields are a config error, not a silent default.
        assert!(RawSimConfig::from_ron_str("(tick_rate: 30.0)").is_err());
    }

    #[test]
    fn test_conversion_produces_sane_fixed_values() {
        let cfg = SimConfig::default();
        assert_eq!(cfg.grid_dimensions(), (50, 50));
        let cos: f32 = cfg.sense_cos.to_num();
        let sin: f32 = cfg.sense_sin.to_num();
        assert!((cos * cos + sin * sin - 1.0).abs() < 0.001, "unit rotation pair");
        assert!(cfg.refresh_interval >= 1);
    }
}
