//! Small math primitives: angle arithmetic, bearings, percentiles.

use crate::types::Vec2;

/// Wrap an angle into `[0, 360)` degrees.
pub fn wrap_deg(a: f64) -> f64 {
    a.rem_euclid(360.0)
}

/// Signed shortest angular difference `a − b`, in `(-180, 180]` degrees.
pub fn ang_diff_deg(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(360.0);
    if d > 180.0 {
        d - 360.0
    } else {
        d
    }
}

/// Absolute bearing from `from` to `to`, degrees in `[0, 360)`.
pub fn bearing_deg(from: Vec2, to: Vec2) -> f64 {
    wrap_deg((to.y - from.y).atan2(to.x - from.x).to_degrees())
}

/// Unit direction of an absolute bearing in degrees.
pub fn dir_of_deg(bearing: f64) -> Vec2 {
    let r = bearing.to_radians();
    Vec2::new(r.cos(), r.sin())
}

/// Arithmetic mean; 0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Linearly-interpolated quantile `q ∈ [0, 1]` of `values`; 0 when empty.
/// Sorts a scratch copy, so keep inputs small or pre-strided.
pub fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = pos - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn ang_diff_takes_the_short_way() {
        assert_abs_diff_eq!(ang_diff_deg(350.0, 10.0), -20.0, epsilon = 1e-12);
        assert_abs_diff_eq!(ang_diff_deg(10.0, 350.0), 20.0, epsilon = 1e-12);
        assert_abs_diff_eq!(ang_diff_deg(180.0, 0.0), 180.0, epsilon = 1e-12);
    }

    #[test]
    fn bearing_of_cardinal_directions() {
        let o = Vec2::new(0.0, 0.0);
        assert_abs_diff_eq!(bearing_deg(o, Vec2::new(1.0, 0.0)), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(bearing_deg(o, Vec2::new(0.0, 1.0)), 90.0, epsilon = 1e-12);
        assert_abs_diff_eq!(bearing_deg(o, Vec2::new(-1.0, 0.0)), 180.0, epsilon = 1e-12);
    }

    #[test]
    fn percentile_interpolates() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_abs_diff_eq!(percentile(&v, 0.0), 1.0);
        assert_abs_diff_eq!(percentile(&v, 1.0), 4.0);
        assert_abs_diff_eq!(percentile(&v, 0.5), 2.5);
    }

    #[test]
    fn percentile_of_empty_is_zero() {
        assert_eq!(percentile(&[], 0.9), 0.0);
    }
}
