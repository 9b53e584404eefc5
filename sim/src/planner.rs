//! Sweep planners: the baseline full-sector sweep and the track-driven
//! adaptive sweep.
//!
//! The baseline ping-pongs between the sector extremes at maximum range.
//! The adaptive planner shrinks the sweep to the padded bearing span of
//! the sonar's assigned tracks (all tracks when the assignment is empty)
//! and trims the commanded range to the farthest track; stored bounds are
//! reused under hysteresis so the head finishes passes instead of chasing
//! every prediction update. A sonar with no visible tracks degrades to the
//! baseline behavior until tracks reappear.
//!
//! Planners see targets exclusively through Kalman-track predictions —
//! ground-truth swimmer state never reaches this module.

use crate::sonar::{ScanMode, SonarUnit};
use sonar_core::config::{
    MAX_RANGE_NAIVE_M, OPT_SWEEP_MAX_HOLD_SEC, OPT_SWEEP_MIN_DEG, OPT_SWEEP_REPLAN_DEG,
    TARGET_PADDING_ANGLE_DEG, TARGET_PADDING_RANGE_M,
};
use sonar_core::math::bearing_deg;
use sonar_core::types::{SwimmerId, Vec2};

/// Head tolerance for "target reached" (deg).
const REACHED_TOL_DEG: f64 = 1.0;

/// One tick's commanded pose for a sonar.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlanDecision {
    pub target_angle_deg: f64,
    pub mode: ScanMode,
    pub scan_range_m: f64,
}

/// Stored adaptive sweep bounds, per sonar.
#[derive(Clone, Copy, Debug, Default)]
pub struct SweepMemory {
    /// Absolute (min, max) bounds of the sweep in use.
    pub bounds: Option<(f64, f64)>,
    /// When the bounds were last adopted.
    pub updated_at: f64,
}

/// Baseline: bang-bang across the full sector at maximum range.
pub fn plan_naive(sonar: &SonarUnit) -> PlanDecision {
    PlanDecision {
        target_angle_deg: bang_bang_target(
            sonar,
            sonar.params.sector_min_deg(),
            sonar.params.sector_max_deg(),
        ),
        mode: ScanMode::Scanning,
        scan_range_m: MAX_RANGE_NAIVE_M,
    }
}

/// Track-driven adaptive sweep.
///
/// `targets` are the Kalman-predicted positions of all tracks;
/// `assigned` is this sonar's PSO assignment (empty ⇒ consider all).
pub fn plan_optimized(
    sonar: &SonarUnit,
    mem: &mut SweepMemory,
    targets: &[(SwimmerId, Vec2)],
    assigned: &[SwimmerId],
    now: f64,
) -> PlanDecision {
    let params = &sonar.params;
    let half = params.half_width_deg;

    // Visible tracks as (relative bearing, distance).
    let visible: Vec<(f64, f64)> = targets
        .iter()
        .filter(|(id, _)| assigned.is_empty() || assigned.contains(id))
        .filter_map(|&(_, pos)| {
            let rel = params.relative_bearing(bearing_deg(params.position, pos));
            (rel.abs() <= half).then(|| (rel, (pos - params.position).norm()))
        })
        .collect();

    if visible.is_empty() {
        // Degrade to the baseline sweep until tracks reappear.
        mem.bounds = Some((params.sector_min_deg(), params.sector_max_deg()));
        mem.updated_at = now;
        return plan_naive(sonar);
    }

    // Desired padded bounds, width-floored, clamped into the sector with
    // the width preserved where possible.
    let pad = TARGET_PADDING_ANGLE_DEG;
    let mut rel_min = visible.iter().map(|&(r, _)| r).fold(f64::INFINITY, f64::min) - pad;
    let mut rel_max = visible
        .iter()
        .map(|&(r, _)| r)
        .fold(f64::NEG_INFINITY, f64::max)
        + pad;
    let min_width = OPT_SWEEP_MIN_DEG.max(2.0 * pad);
    if rel_max - rel_min < min_width {
        let center = 0.5 * (rel_min + rel_max);
        rel_min = center - min_width / 2.0;
        rel_max = center + min_width / 2.0;
    }
    let width = rel_max - rel_min;
    if rel_min < -half {
        rel_min = -half;
        rel_max = (rel_min + width).min(half);
    }
    if rel_max > half {
        rel_max = half;
        rel_min = (rel_max - width).max(-half);
    }
    let desired = (
        params.mount_bearing_deg + rel_min,
        params.mount_bearing_deg + rel_max,
    );

    let max_dist = visible.iter().map(|&(_, d)| d).fold(0.0, f64::max);
    let scan_range_m = (max_dist + TARGET_PADDING_RANGE_M).clamp(1.0, MAX_RANGE_NAIVE_M);

    // Hysteresis: keep the stored bounds unless there are none, the head
    // finished its pass, the head sits outside them, or the desired bounds
    // drifted far for long enough. The outside case additionally requires
    // a material difference, so prediction drift of a few millidegrees per
    // tick cannot re-adopt (and re-target) on every tick while the head is
    // still traveling into the bounds.
    let adopt = match mem.bounds {
        None => true,
        Some((lo, hi)) => {
            let reached =
                (sonar.current_angle_deg - sonar.target_angle_deg).abs() < REACHED_TOL_DEG;
            let outside = sonar.current_angle_deg < lo - REACHED_TOL_DEG
                || sonar.current_angle_deg > hi + REACHED_TOL_DEG;
            let drift = (desired.0 - lo).abs().max((desired.1 - hi).abs());
            reached
                || (outside && drift >= 0.5)
                || (drift >= OPT_SWEEP_REPLAN_DEG && now - mem.updated_at >= OPT_SWEEP_MAX_HOLD_SEC)
        }
    };
    if adopt {
        mem.bounds = Some(desired);
        mem.updated_at = now;
    }
    let (lo, hi) = mem.bounds.expect("bounds set above");

    PlanDecision {
        target_angle_deg: bang_bang_target(sonar, lo, hi),
        mode: ScanMode::Scanning,
        scan_range_m,
    }
}

/// Ping-pong target selection between `lo` and `hi`: flip at the bounds,
/// otherwise keep the last nonzero sweep direction. An exactly-on-target
/// head therefore keeps its previous direction rather than stalling.
fn bang_bang_target(sonar: &SonarUnit, lo: f64, hi: f64) -> f64 {
    let cur = sonar.current_angle_deg;
    let dir = if cur <= lo + REACHED_TOL_DEG {
        1.0
    } else if cur >= hi - REACHED_TOL_DEG {
        -1.0
    } else if (cur - sonar.target_angle_deg).abs() < REACHED_TOL_DEG {
        // Mid-span arrival (bounds just moved): continue the old direction.
        if sonar.sweep_dir != 0.0 {
            sonar.sweep_dir
        } else {
            1.0
        }
    } else {
        // Still traveling: keep heading for whichever bound lies ahead.
        (sonar.target_angle_deg - cur).signum()
    };
    if dir > 0.0 {
        hi
    } else {
        lo
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use sensor_models::sonar::SonarParams;

    fn unit() -> SonarUnit {
        SonarUnit::new(SonarParams::corner_array().remove(0)) // sector [0°, 90°]
    }

    #[test]
    fn naive_sweeps_the_full_sector_at_max_range() {
        let mut s = unit();
        s.current_angle_deg = 30.0;
        s.target_angle_deg = 90.0;
        let d = plan_naive(&s);
        assert_eq!(d.mode, ScanMode::Scanning);
        assert_eq!(d.scan_range_m, MAX_RANGE_NAIVE_M);
        assert_eq!(d.target_angle_deg, 90.0, "keeps its target mid-sweep");
    }

    #[test]
    fn naive_flips_at_the_extremes() {
        let mut s = unit();
        s.current_angle_deg = 89.5;
        s.target_angle_deg = 90.0;
        assert_eq!(plan_naive(&s).target_angle_deg, 0.0);
        s.current_angle_deg = 0.2;
        s.target_angle_deg = 0.0;
        assert_eq!(plan_naive(&s).target_angle_deg, 90.0);
    }

    #[test]
    fn flip_preserves_direction_when_exactly_on_target() {
        let mut s = unit();
        // Head exactly on a mid-sector target: sign(target − current) is 0,
        // so the persisted direction must decide.
        s.current_angle_deg = 40.0;
        s.target_angle_deg = 40.0;
        s.sweep_dir = -1.0;
        let d = plan_naive(&s);
        assert_eq!(d.target_angle_deg, 0.0, "keeps sweeping downward");
        s.sweep_dir = 1.0;
        assert_eq!(plan_naive(&s).target_angle_deg, 90.0);
    }

    #[test]
    fn optimized_narrows_to_the_padded_track_span() {
        let s = unit();
        let mut mem = SweepMemory::default();
        // Two tracks near bearing 45°, ~14 m out.
        let targets = [
            (SwimmerId(0), Vec2::new(10.0, 10.0)),
            (SwimmerId(1), Vec2::new(10.0, 12.0)),
        ];
        let d = plan_optimized(&s, &mut mem, &targets, &[], 0.0);
        let (lo, hi) = mem.bounds.unwrap();
        assert!(lo > 0.0 && hi < 90.0, "narrower than the sector");
        assert!(hi - lo >= OPT_SWEEP_MIN_DEG - 1e-9);
        assert!(d.scan_range_m < MAX_RANGE_NAIVE_M);
        assert!(d.scan_range_m >= 14.0, "range covers the farthest track");
    }

    #[test]
    fn optimized_without_tracks_degrades_to_naive() {
        let mut s = unit();
        s.current_angle_deg = 45.0;
        s.target_angle_deg = 90.0;
        let mut mem = SweepMemory {
            bounds: Some((30.0, 60.0)),
            updated_at: 0.0,
        };
        let d = plan_optimized(&s, &mut mem, &[], &[], 5.0);
        assert_eq!(d, plan_naive(&s));
        assert_eq!(mem.bounds, Some((0.0, 90.0)), "bounds reset to the sector");
    }

    #[test]
    fn hysteresis_holds_bounds_until_the_pass_ends() {
        let mut s = unit();
        s.current_angle_deg = 45.0;
        s.target_angle_deg = 60.0;
        s.sweep_dir = 1.0;
        let mut mem = SweepMemory {
            bounds: Some((30.0, 60.0)),
            updated_at: 0.0,
        };
        // A track far from the stored bounds, but the head is mid-pass and
        // the hold time has not elapsed: bounds must not move yet.
        let targets = [(SwimmerId(0), Vec2::new(18.0, 2.0))];
        plan_optimized(&s, &mut mem, &targets, &[], 0.5);
        assert_eq!(mem.bounds, Some((30.0, 60.0)));

        // Same drift after the hold expires: replan.
        plan_optimized(&s, &mut mem, &targets, &[], 0.5 + OPT_SWEEP_MAX_HOLD_SEC);
        assert_ne!(mem.bounds, Some((30.0, 60.0)));
    }

    #[test]
    fn assigned_subset_restricts_the_sweep() {
        let s = unit();
        let mut mem = SweepMemory::default();
        let targets = [
            (SwimmerId(0), Vec2::new(10.0, 2.0)),  // low bearing
            (SwimmerId(1), Vec2::new(2.0, 15.0)),  // high bearing
        ];
        plan_optimized(&s, &mut mem, &targets, &[SwimmerId(0)], 0.0);
        let (_, hi) = mem.bounds.unwrap();
        let all_bearing_hi = bearing_deg(s.params.position, targets[1].1);
        assert!(
            hi < all_bearing_hi,
            "sweep must not stretch to the unassigned track"
        );
    }

    #[test]
    fn clamped_bounds_preserve_width() {
        let s = unit();
        let mut mem = SweepMemory::default();
        // Track hugging the low sector edge.
        let targets = [(SwimmerId(0), Vec2::new(14.0, 0.5))];
        plan_optimized(&s, &mut mem, &targets, &[], 0.0);
        let (lo, hi) = mem.bounds.unwrap();
        assert_abs_diff_eq!(lo, 0.0, epsilon = 1e-9);
        let min_width = OPT_SWEEP_MIN_DEG.max(2.0 * TARGET_PADDING_ANGLE_DEG);
        assert_abs_diff_eq!(hi - lo, min_width, epsilon = 1e-9);
    }
}
