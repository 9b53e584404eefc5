//! Kalman filter: predict and update steps.
//!
//! # Design choices
//! - A **linear KF** with a constant-velocity (CV) motion model; swimmers
//!   maneuver gently, so CV plus DWNA process noise is enough.
//! - All math is done in `f64` via `nalgebra` fixed-size matrices.
//! - Measurements are position-only, so H and the innovation algebra are
//!   specialized to 2-D instead of carried as dynamic matrices.
//!
//! ## State vector
//! x = [px, py, vx, vy]ᵀ  (4-dimensional)
//!
//! ## CV transition model
//! F = I₄ with F[(0,2)] = F[(1,3)] = dt, i.e. px += vx·dt, py += vy·dt.
//!
//! ## Process noise Q (discrete white noise acceleration)
//! Per axis: q_pp = σ²·dt⁴/4, q_pv = σ²·dt³/2, q_vv = σ²·dt².

use crate::types::{StateCov, StateVec, Vec2};
use nalgebra::{Matrix2, Matrix4};

/// Configuration for the CV Kalman filter.
#[derive(Clone, Copy, Debug)]
pub struct CvKfConfig {
    /// Acceleration standard deviation driving Q (m/s²).
    /// Higher = more maneuvering allowed.
    pub accel_std: f64,
}

impl Default for CvKfConfig {
    fn default() -> Self {
        Self {
            accel_std: crate::config::KALMAN_ACCEL_STD,
        }
    }
}

/// Constant-velocity Kalman filter (4-state, linear).
#[derive(Clone, Copy, Debug, Default)]
pub struct CvKalmanFilter {
    pub config: CvKfConfig,
}

impl CvKalmanFilter {
    pub fn new(config: CvKfConfig) -> Self {
        Self { config }
    }

    /// Build state transition matrix F for timestep dt.
    pub fn transition_matrix(dt: f64) -> Matrix4<f64> {
        let mut f = Matrix4::<f64>::identity();
        f[(0, 2)] = dt;
        f[(1, 3)] = dt;
        f
    }

    /// Build process noise matrix Q for timestep dt.
    fn process_noise(dt: f64, accel_std: f64) -> Matrix4<f64> {
        let q = accel_std * accel_std;
        let dt2 = dt * dt;
        let dt3 = dt2 * dt;
        let dt4 = dt3 * dt;

        let mut qm = Matrix4::<f64>::zeros();
        for i in 0..2usize {
            qm[(i, i)] = q * dt4 / 4.0;
            qm[(i + 2, i + 2)] = q * dt2;
            qm[(i, i + 2)] = q * dt3 / 2.0;
            qm[(i + 2, i)] = q * dt3 / 2.0;
        }
        qm
    }

    /// Predict state and covariance forward by `dt` seconds.
    /// `dt ≤ 0` is a no-op: only the caller's timestamp advances.
    pub fn predict(&self, state: &StateVec, cov: &StateCov, dt: f64) -> (StateVec, StateCov) {
        if dt <= 0.0 {
            return (*state, *cov);
        }
        let f = Self::transition_matrix(dt);
        let q = Self::process_noise(dt, self.config.accel_std);
        (f * state, f * cov * f.transpose() + q)
    }

    /// Update with a position measurement `z` of standard deviation
    /// `meas_sigma`. Returns `None` when the innovation covariance is
    /// singular; the caller keeps the prior state unchanged.
    pub fn update(
        &self,
        state: &StateVec,
        cov: &StateCov,
        z: Vec2,
        meas_sigma: f64,
    ) -> Option<(StateVec, StateCov)> {
        // Innovation: ν = z − H·x, with H selecting (px, py).
        let innovation = Vec2::new(z.x - state[0], z.y - state[1]);

        // S = H·P·Hᵀ + R is the position block of P plus σ²·I.
        let r = meas_sigma * meas_sigma;
        let s = Matrix2::new(cov[(0, 0)] + r, cov[(0, 1)], cov[(1, 0)], cov[(1, 1)] + r);
        let s_inv = s.try_inverse()?;

        // Kalman gain: K = P·Hᵀ·S⁻¹ (4×2).
        let p_ht = cov.fixed_view::<4, 2>(0, 0).into_owned();
        let k = p_ht * s_inv;

        let new_state = state + k * innovation;

        // Joseph form: P' = (I−KH)·P·(I−KH)ᵀ + K·R·Kᵀ.
        let mut kh = Matrix4::<f64>::zeros();
        kh.fixed_view_mut::<4, 2>(0, 0).copy_from(&k);
        let i_kh = Matrix4::<f64>::identity() - kh;
        let new_cov = i_kh * cov * i_kh.transpose() + k * Matrix2::identity() * r * k.transpose();

        Some((new_state, new_cov))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::Vector4;

    #[test]
    fn predict_constant_velocity() {
        let kf = CvKalmanFilter::default();
        // Swimmer at (0, 0) moving at (1.2, 0) m/s
        let state = Vector4::new(0.0, 0.0, 1.2, 0.0);
        let cov = StateCov::identity();

        let (pred_state, _pred_cov) = kf.predict(&state, &cov, 1.0);
        assert_abs_diff_eq!(pred_state[0], 1.2, epsilon = 1e-9); // x moved
        assert_abs_diff_eq!(pred_state[2], 1.2, epsilon = 1e-9); // vx unchanged
    }

    #[test]
    fn predict_then_unpredict_restores_state() {
        let kf = CvKalmanFilter::default();
        let state = Vector4::new(5.0, 12.0, -0.4, 0.9);
        let cov = StateCov::identity() * 3.0;

        let (fwd, _) = kf.predict(&state, &cov, 0.7);
        // Applying F(-dt) to the mean must invert F(dt) exactly.
        let back = CvKalmanFilter::transition_matrix(-0.7) * fwd;
        for i in 0..4 {
            assert_abs_diff_eq!(back[i], state[i], epsilon = 1e-9);
        }
    }

    #[test]
    fn nonpositive_dt_is_a_noop() {
        let kf = CvKalmanFilter::default();
        let state = Vector4::new(1.0, 2.0, 3.0, 4.0);
        let cov = StateCov::identity() * 7.0;
        let (s, p) = kf.predict(&state, &cov, -0.25);
        assert_eq!(s, state);
        assert_eq!(p, cov);
    }

    #[test]
    fn update_reduces_uncertainty() {
        let kf = CvKalmanFilter::default();
        let state = Vector4::new(10.0, 25.0, 0.5, 0.2);
        let cov = StateCov::identity() * 100.0;

        let (_, new_cov) = kf
            .update(&state, &cov, Vec2::new(10.5, 25.5), 0.5)
            .expect("well-conditioned update");
        let prior_trace: f64 = (0..4).map(|i| cov[(i, i)]).sum();
        let post_trace: f64 = (0..4).map(|i| new_cov[(i, i)]).sum();
        assert!(post_trace < prior_trace, "Update should reduce uncertainty");
    }

    #[test]
    fn singular_innovation_is_skipped() {
        let kf = CvKalmanFilter::default();
        let state = Vector4::zeros();
        // Degenerate covariance plus zero measurement noise makes S singular.
        let cov = StateCov::zeros();
        assert!(kf.update(&state, &cov, Vec2::new(1.0, 1.0), 0.0).is_none());
    }
}
