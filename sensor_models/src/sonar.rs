//! Sonar head parameters and acoustic timing.

use serde::{Deserialize, Serialize};
use sonar_core::config::{
    MIN_PING_INTERVAL_S, PING360_PROCESSING_OVERHEAD_S, POOL_LENGTH_M, POOL_WIDTH_M,
    SCAN_STEP_ANGLE_DEG, SECTOR_HALF_WIDTH_DEG, SPEED_OF_SOUND_M_S,
};
use sonar_core::math::ang_diff_deg;
use sonar_core::types::{SonarId, Vec2};

/// Physical configuration of one mechanically-rotating single-beam sonar.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SonarParams {
    pub id: SonarId,
    /// Mount position in world coordinates (meters).
    pub position: Vec2,
    /// Boresight of the mount (deg, absolute); the head sweeps ± the
    /// sector half-width around this.
    pub mount_bearing_deg: f64,
    /// Half-width of the mechanical sector (deg).
    pub half_width_deg: f64,
}

impl SonarParams {
    /// The standard four-corner arrangement: one sonar per pool corner,
    /// boresight on the inward diagonal so each 90° sector covers its
    /// quadrant.
    pub fn corner_array() -> Vec<SonarParams> {
        let corners = [
            (Vec2::new(0.0, 0.0), 45.0),
            (Vec2::new(POOL_WIDTH_M, 0.0), 135.0),
            (Vec2::new(POOL_WIDTH_M, POOL_LENGTH_M), 225.0),
            (Vec2::new(0.0, POOL_LENGTH_M), 315.0),
        ];
        corners
            .iter()
            .enumerate()
            .map(|(i, &(position, mount_bearing_deg))| SonarParams {
                id: SonarId(i as u32),
                position,
                mount_bearing_deg,
                half_width_deg: SECTOR_HALF_WIDTH_DEG,
            })
            .collect()
    }

    /// Lowest absolute bearing of the sector (deg); angle column 0.
    pub fn sector_min_deg(&self) -> f64 {
        self.mount_bearing_deg - self.half_width_deg
    }

    /// Highest absolute bearing of the sector (deg).
    pub fn sector_max_deg(&self) -> f64 {
        self.mount_bearing_deg + self.half_width_deg
    }

    /// Whether an absolute bearing falls inside the sector.
    pub fn covers_bearing(&self, bearing_deg: f64) -> bool {
        ang_diff_deg(bearing_deg, self.mount_bearing_deg).abs() <= self.half_width_deg
    }

    /// Signed bearing relative to the boresight, in `(-180, 180]` deg.
    pub fn relative_bearing(&self, bearing_deg: f64) -> f64 {
        ang_diff_deg(bearing_deg, self.mount_bearing_deg)
    }
}

/// Acoustic round-trip time to `range` meters and back.
pub fn round_trip_time(range_m: f64) -> f64 {
    2.0 * range_m / SPEED_OF_SOUND_M_S
}

/// Time between pings at the commanded range: round trip plus the head's
/// fixed processing overhead, floored so the cadence stays finite as the
/// range approaches zero.
pub fn ping_interval(range_m: f64) -> f64 {
    (round_trip_time(range_m) + PING360_PROCESSING_OVERHEAD_S).max(MIN_PING_INTERVAL_S)
}

/// Rotation speed while scanning: one scan step per ping interval (deg/s).
pub fn effective_scan_speed(range_m: f64) -> f64 {
    SCAN_STEP_ANGLE_DEG / ping_interval(range_m)
}

/// Duration of one full one-way sector sweep at `range` (s).
pub fn sweep_duration(sector_deg: f64, range_m: f64) -> f64 {
    sector_deg / effective_scan_speed(range_m)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use sonar_core::config::MAX_RANGE_NAIVE_M;

    #[test]
    fn corner_array_points_inward() {
        let sonars = SonarParams::corner_array();
        assert_eq!(sonars.len(), 4);
        let center = Vec2::new(POOL_WIDTH_M / 2.0, POOL_LENGTH_M / 2.0);
        for s in &sonars {
            let to_center = sonar_core::math::bearing_deg(s.position, center);
            assert!(
                s.covers_bearing(to_center),
                "{} must see the pool center",
                s.id
            );
        }
    }

    #[test]
    fn full_range_sweep_takes_about_six_seconds() {
        // 90 pings at 50 m: (2·50/1500 + 0.002) ≈ 68.7 ms each.
        let t = sweep_duration(90.0, MAX_RANGE_NAIVE_M);
        assert_abs_diff_eq!(t, 6.18, epsilon = 0.01);
    }

    #[test]
    fn ping_interval_is_floored() {
        assert_abs_diff_eq!(ping_interval(0.0), MIN_PING_INTERVAL_S);
        assert!(ping_interval(50.0) > ping_interval(10.0));
    }

    #[test]
    fn sector_bounds_bracket_the_mount() {
        let s = &SonarParams::corner_array()[1];
        assert_abs_diff_eq!(s.sector_min_deg(), 90.0);
        assert_abs_diff_eq!(s.sector_max_deg(), 180.0);
        assert!(s.covers_bearing(100.0));
        assert!(!s.covers_bearing(80.0));
    }
}
