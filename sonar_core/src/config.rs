//! Physical constants of the pool/sonar setup and the runtime tuning record.
//!
//! # Design choices
//! - Everything the simulation treats as fixed hardware or measured
//!   calibration lives here as a `pub const`, grouped by concern.
//! - The handful of operator-adjustable knobs live in [`Tuning`]; they are
//!   merged through [`Tuning::apply`], which clamps every field into its
//!   allowed interval instead of rejecting bad input.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Pool geometry
// ---------------------------------------------------------------------------

/// Pool extent along x (meters).
pub const POOL_WIDTH_M: f64 = 20.0;
/// Pool extent along y (meters).
pub const POOL_LENGTH_M: f64 = 50.0;
/// Swim lanes across the width; `POOL_LANE_COUNT - 1` rope lines echo.
pub const POOL_LANE_COUNT: usize = 8;

// ---------------------------------------------------------------------------
// Acoustics and mechanics
// ---------------------------------------------------------------------------

/// Speed of sound in water (m/s).
pub const SPEED_OF_SOUND_M_S: f64 = 1500.0;
/// Non-emitting (mechanical) rotation rate (deg/s).
pub const SLEW_SPEED_DEG_S: f64 = 45.0;
/// Head advance per ping while scanning (deg).
pub const SCAN_STEP_ANGLE_DEG: f64 = 1.0;
/// Fixed per-ping processing overhead of the Ping360-class head (s).
pub const PING360_PROCESSING_OVERHEAD_S: f64 = 0.002;
/// Commanded maximum range of the baseline sweep (m).
pub const MAX_RANGE_NAIVE_M: f64 = 50.0;
/// Lower bound on the ping interval; keeps the cadence finite as range → 0.
pub const MIN_PING_INTERVAL_S: f64 = 0.01;
/// Sweep half-width of every sonar (deg); the sector is twice this.
pub const SECTOR_HALF_WIDTH_DEG: f64 = 45.0;

// ---------------------------------------------------------------------------
// Polar imaging frame
// ---------------------------------------------------------------------------

/// Angle columns per frame (1° each across the 90° sector).
pub const FRAME_ANGLE_BINS: usize = 90;
/// Range cells per angle column.
pub const FRAME_RANGE_BINS: usize = 256;
/// Horizontal field of view of one ping (deg).
pub const PING_FOV_DEG: f64 = 2.0;
/// Radius of a swimmer echo blob in range bins.
pub const BLOB_RADIUS_BINS: f64 = 2.0;
/// Cap on surviving clusters per finalized frame.
pub const MAX_CLUSTERS_PER_FRAME: usize = 6;
/// Frames consumed to seed the background model when the pool is empty.
pub const BACKGROUND_WARMUP_FRAMES: u32 = 5;

/// Degrees covered by one angle column.
pub const fn angle_step_deg() -> f64 {
    90.0 / FRAME_ANGLE_BINS as f64
}

/// Meters covered by one range cell.
pub const fn range_step_m() -> f64 {
    MAX_RANGE_NAIVE_M / FRAME_RANGE_BINS as f64
}

// ---------------------------------------------------------------------------
// Echo synthesis
// ---------------------------------------------------------------------------

/// Additive intensity floor present in every cell.
pub const NOISE_FLOOR: f64 = 0.35;
/// Std of the per-cell Gaussian noise (scaled by `Tuning::noise_scale`).
pub const NOISE_STD: f64 = 0.35;
/// Amplitude of the Pareto-like speckle impulses.
pub const SPECKLE_STRENGTH: f64 = 1.4;
/// Shape parameter of the speckle tail.
pub const SPECKLE_SHAPE: f64 = 2.2;
/// Per-ping probability of a surface-wave / multipath band.
pub const WEAK_BAND_PROB: f64 = 0.02;
/// Peak amplitude of a weak band.
pub const WEAK_BAND_STRENGTH: f64 = 0.8;
/// Sigma of a weak band along the column (bins).
pub const WEAK_BAND_SIGMA_BINS: f64 = 6.0;
/// Peak amplitude of the wall reflection.
pub const WALL_ECHO_STRENGTH: f64 = 2.2;
/// Sigma of the wall reflection (bins).
pub const WALL_ECHO_SIGMA_BINS: f64 = 2.0;
/// Peak amplitude of a lane-rope echo.
pub const LANE_ECHO_STRENGTH: f64 = 1.1;
/// Sigma of a lane-rope echo (bins).
pub const LANE_ECHO_SIGMA_BINS: f64 = 1.5;
/// Ghost amplitude relative to its parent echo.
pub const GHOST_REL_STRENGTH: f64 = 0.35;
/// Nominal range offset of a multipath ghost (m); jittered per ping.
/// Small enough that a ghost merged into its parent blob cannot stretch
/// the cluster past `MAX_RANGE_EXTENT_M`.
pub const GHOST_RANGE_OFFSET_M: f64 = 1.2;
/// Peak amplitude of a swimmer echo at zero range.
pub const ECHO_STRENGTH: f64 = 6.0;
/// E-folding distance of swimmer echo attenuation (m).
pub const ECHO_ATTEN_M: f64 = 60.0;

// ---------------------------------------------------------------------------
// Background model
// ---------------------------------------------------------------------------

/// EMA blend factor for the steady-state background update.
pub const BACKGROUND_ALPHA: f64 = 0.08;
/// Faster EMA used while seeding the background during warmup.
pub const WARMUP_ALPHA: f64 = 0.45;
/// Positive deviation above background that still counts as background.
pub const BACKGROUND_UPDATE_SLACK: f64 = 0.25;

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// Quantile of the strided subtracted sample used as the adaptive threshold.
pub const WEAK_ECHO_PERCENTILE: f64 = 0.80;
/// Floor of the adaptive weak-echo threshold.
pub const WEAK_ECHO_MIN: f64 = 0.55;
/// Stride of the subtracted-frame sample feeding the quantile.
pub const WEAK_ECHO_SAMPLE_STRIDE: usize = 7;
/// Hard cap on the denoising kernel; larger kernels start eating swimmers.
pub const KERNEL_CAP_LIMIT: usize = 13;
/// Minimum fraction of a cluster that must survive the large kernel.
pub const DENOISE_OVERLAP_MIN: f64 = 0.4;
/// Plausible cross-range extent of a swimmer (m).
pub const MIN_CROSS_RANGE_M: f64 = 0.15;
pub const MAX_CROSS_RANGE_M: f64 = 2.5;
/// Plausible down-range extent of a swimmer (m).
pub const MIN_RANGE_EXTENT_M: f64 = 0.15;
pub const MAX_RANGE_EXTENT_M: f64 = 3.0;
/// Plausible cross-range / down-range aspect ratio.
pub const MIN_ASPECT: f64 = 0.1;
pub const MAX_ASPECT: f64 = 8.0;

// ---------------------------------------------------------------------------
// Measurement model
// ---------------------------------------------------------------------------

/// Base 1σ localization uncertainty (m).
pub const MEAS_SIGMA_BASE_M: f64 = 0.25;
/// Range-proportional 1σ growth (m per m).
pub const MEAS_SIGMA_PER_M: f64 = 0.01;
/// Conversion from normalized noise-over-threshold to meters of sigma.
pub const NOISE_TO_MEAS_SIGMA_M: f64 = 0.3;
/// Fraction of the measurement sigma applied as candidate jitter.
pub const MEAS_JITTER_SCALE: f64 = 0.5;

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Cartesian gate for both matchers (m).
pub const MATCH_GATE_RADIUS_M: f64 = 2.5;
/// Minimum polar-bbox IoU for the paper-metric matcher.
pub const IOU_MATCH_THRESHOLD: f64 = 0.1;
/// Effective acoustic diameter of a swimmer (m).
pub const SWIMMER_DIAMETER_M: f64 = 0.6;

// ---------------------------------------------------------------------------
// Track-driven planner
// ---------------------------------------------------------------------------

/// Angular padding around predicted targets (deg).
pub const TARGET_PADDING_ANGLE_DEG: f64 = 6.0;
/// Range padding beyond the farthest predicted target (m).
pub const TARGET_PADDING_RANGE_M: f64 = 3.0;
/// Minimum width of an adaptive sweep (deg).
pub const OPT_SWEEP_MIN_DEG: f64 = 16.0;
/// Bound drift that justifies replanning mid-sweep (deg).
pub const OPT_SWEEP_REPLAN_DEG: f64 = 5.0;
/// Maximum age of stored sweep bounds before drift may replan them (s).
pub const OPT_SWEEP_MAX_HOLD_SEC: f64 = 1.5;

// ---------------------------------------------------------------------------
// PSO assignment
// ---------------------------------------------------------------------------

/// Period of the cross-sonar reassignment (s).
pub const PSO_UPDATE_INTERVAL_S: f64 = 0.8;
pub const PSO_SWARM_SIZE: usize = 24;
pub const PSO_ITERATIONS: usize = 30;
pub const PSO_INERTIA: f64 = 0.72;
pub const PSO_COGNITIVE: f64 = 1.49;
pub const PSO_SOCIAL: f64 = 1.49;
/// Cost added per track assigned to a sonar that cannot see it (s).
pub const PSO_INVALID_PENALTY_S: f64 = 5.0;

// ---------------------------------------------------------------------------
// Tracking and evaluation
// ---------------------------------------------------------------------------

/// Process-noise acceleration std of the constant-velocity filter (m/s²).
pub const KALMAN_ACCEL_STD: f64 = 0.6;
/// Initial velocity variance of a freshly born track ((m/s)²).
pub const TRACK_INIT_VEL_VAR: f64 = 25.0;
/// Horizon metric buffers are pruned to (s); `metrics(window)` caps here.
pub const METRIC_RETENTION_SEC: f64 = 60.0;
/// Largest tick the engine will integrate in one step (s).
pub const MAX_TICK_DT_S: f64 = 0.1;
/// Capacity of the per-sonar visualization FIFOs.
pub const VIS_POINT_CAP: usize = 15;

// ---------------------------------------------------------------------------
// Tuning
// ---------------------------------------------------------------------------

/// Operator-adjustable detection knobs. All setters clamp; out-of-range
/// values are never an error.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tuning {
    /// Multiplier on `NOISE_STD`, in `[0, 5]`.
    pub noise_scale: f64,
    /// Per-cell speckle probability, in `[0, 0.5]`.
    pub speckle_prob: f64,
    /// Manual floor of the weak-echo threshold, in `[0, 10]`.
    pub threshold: f64,
    /// DBSCAN neighborhood radius in polar bins, in `[0.5, 12]`.
    pub dbscan_eps_bins: f64,
    /// DBSCAN core-point minimum, in `[2, 200]`.
    pub dbscan_min_pts: usize,
    /// Largest denoising kernel tried; odd, in `[3, KERNEL_CAP_LIMIT]`.
    pub kernel_cap: usize,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            noise_scale: 0.85,
            speckle_prob: 0.05,
            threshold: 1.05,
            dbscan_eps_bins: 2.5,
            dbscan_min_pts: 5,
            kernel_cap: 11,
        }
    }
}

/// A partial tuning update; `None` fields keep their current value.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct TuningPatch {
    pub noise_scale: Option<f64>,
    pub speckle_prob: Option<f64>,
    pub threshold: Option<f64>,
    pub dbscan_eps_bins: Option<f64>,
    pub dbscan_min_pts: Option<usize>,
    pub kernel_cap: Option<usize>,
}

impl Tuning {
    /// Merge a patch into this tuning, clamping every field into its
    /// allowed interval. Returns the merged value for caller convenience.
    pub fn apply(&mut self, patch: &TuningPatch) -> Tuning {
        if let Some(v) = patch.noise_scale {
            self.noise_scale = v.clamp(0.0, 5.0);
        }
        if let Some(v) = patch.speckle_prob {
            self.speckle_prob = v.clamp(0.0, 0.5);
        }
        if let Some(v) = patch.threshold {
            self.threshold = v.clamp(0.0, 10.0);
        }
        if let Some(v) = patch.dbscan_eps_bins {
            self.dbscan_eps_bins = v.clamp(0.5, 12.0);
        }
        if let Some(v) = patch.dbscan_min_pts {
            self.dbscan_min_pts = v.clamp(2, 200);
        }
        if let Some(v) = patch.kernel_cap {
            let v = v.clamp(3, KERNEL_CAP_LIMIT);
            // round down to the next odd width
            self.kernel_cap = if v % 2 == 0 { v - 1 } else { v };
        }
        *self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_clamps_every_field() {
        let mut t = Tuning::default();
        t.apply(&TuningPatch {
            noise_scale: Some(99.0),
            speckle_prob: Some(-1.0),
            threshold: Some(11.0),
            dbscan_eps_bins: Some(0.0),
            dbscan_min_pts: Some(1),
            kernel_cap: Some(40),
        });
        assert_eq!(t.noise_scale, 5.0);
        assert_eq!(t.speckle_prob, 0.0);
        assert_eq!(t.threshold, 10.0);
        assert_eq!(t.dbscan_eps_bins, 0.5);
        assert_eq!(t.dbscan_min_pts, 2);
        assert_eq!(t.kernel_cap, 13);
    }

    #[test]
    fn kernel_cap_rounds_down_to_odd() {
        let mut t = Tuning::default();
        t.apply(&TuningPatch {
            kernel_cap: Some(8),
            ..Default::default()
        });
        assert_eq!(t.kernel_cap, 7);
        t.apply(&TuningPatch {
            kernel_cap: Some(9),
            ..Default::default()
        });
        assert_eq!(t.kernel_cap, 9);
    }

    #[test]
    fn untouched_fields_survive_a_patch() {
        let mut t = Tuning::default();
        let before = t;
        t.apply(&TuningPatch {
            threshold: Some(1.8),
            ..Default::default()
        });
        assert_eq!(t.threshold, 1.8);
        assert_eq!(t.noise_scale, before.noise_scale);
        assert_eq!(t.dbscan_min_pts, before.dbscan_min_pts);
    }

    #[test]
    fn bin_steps_match_the_sector() {
        assert_eq!(angle_step_deg(), 1.0);
        assert!((range_step_m() - 0.1953125).abs() < 1e-12);
    }
}
