//! Analytic pool-geometry raycasts for the echo synthesizer.
//!
//! The pool is the axis-aligned box `[0, POOL_WIDTH] × [0, POOL_LENGTH]`;
//! lane ropes are `POOL_LANE_COUNT − 1` equally-spaced lines of constant x
//! spanning the full length.

use sonar_core::config::{POOL_LANE_COUNT, POOL_LENGTH_M, POOL_WIDTH_M};
use sonar_core::math::dir_of_deg;
use sonar_core::types::Vec2;

const EPS: f64 = 1e-9;

/// Distance along the bearing ray from `origin` to the first pool wall,
/// or `None` when the origin sits on a wall and the ray leaves immediately
/// (grazing rays from a corner mount).
pub fn wall_intersection(origin: Vec2, bearing_deg: f64) -> Option<f64> {
    let d = dir_of_deg(bearing_deg);
    let mut best: Option<f64> = None;

    // Vertical walls x = 0 and x = W.
    if d.x.abs() > EPS {
        for wall_x in [0.0, POOL_WIDTH_M] {
            let t = (wall_x - origin.x) / d.x;
            if t > EPS {
                let y = origin.y + t * d.y;
                if (-EPS..=POOL_LENGTH_M + EPS).contains(&y) {
                    best = Some(best.map_or(t, |b: f64| b.min(t)));
                }
            }
        }
    }
    // Horizontal walls y = 0 and y = L.
    if d.y.abs() > EPS {
        for wall_y in [0.0, POOL_LENGTH_M] {
            let t = (wall_y - origin.y) / d.y;
            if t > EPS {
                let x = origin.x + t * d.x;
                if (-EPS..=POOL_WIDTH_M + EPS).contains(&x) {
                    best = Some(best.map_or(t, |b: f64| b.min(t)));
                }
            }
        }
    }
    best
}

/// Distances along the bearing ray at which it crosses lane ropes, up to
/// `max_range`. Sorted ascending; empty for rays parallel to the ropes.
pub fn lane_crossings(origin: Vec2, bearing_deg: f64, max_range: f64) -> Vec<f64> {
    let d = dir_of_deg(bearing_deg);
    if d.x.abs() <= EPS {
        return Vec::new();
    }
    let lane_pitch = POOL_WIDTH_M / POOL_LANE_COUNT as f64;
    let mut out = Vec::new();
    for k in 1..POOL_LANE_COUNT {
        let line_x = k as f64 * lane_pitch;
        let t = (line_x - origin.x) / d.x;
        if t > EPS && t <= max_range {
            let y = origin.y + t * d.y;
            if (0.0..=POOL_LENGTH_M).contains(&y) {
                out.push(t);
            }
        }
    }
    out.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn straight_shot_across_the_width() {
        let d = wall_intersection(Vec2::new(0.0, 25.0), 0.0).unwrap();
        assert_abs_diff_eq!(d, POOL_WIDTH_M, epsilon = 1e-9);
    }

    #[test]
    fn diagonal_from_the_corner() {
        // 45° from (0,0): hits x = 20 at (20, 20), distance 20·√2.
        let d = wall_intersection(Vec2::new(0.0, 0.0), 45.0).unwrap();
        assert_abs_diff_eq!(d, 20.0 * 2f64.sqrt(), epsilon = 1e-9);
    }

    #[test]
    fn lane_crossings_are_sorted_and_bounded() {
        let xs = lane_crossings(Vec2::new(0.0, 25.0), 0.0, 50.0);
        assert_eq!(xs.len(), POOL_LANE_COUNT - 1);
        assert_abs_diff_eq!(xs[0], 2.5, epsilon = 1e-9);
        assert!(xs.windows(2).all(|w| w[0] < w[1]));

        let capped = lane_crossings(Vec2::new(0.0, 25.0), 0.0, 6.0);
        assert_eq!(capped.len(), 2, "only ropes within range");
    }

    #[test]
    fn rays_parallel_to_ropes_cross_nothing() {
        assert!(lane_crossings(Vec2::new(10.1, 0.0), 90.0, 50.0).is_empty());
    }
}
