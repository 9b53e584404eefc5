//! Per-swimmer track: state, covariance, timestamps.
//!
//! Tracks are born on the first accepted distance match of a swimmer and
//! live exactly as long as the swimmer does; there is no tentative /
//! confirmed lifecycle. The planner side of the engine sees targets only
//! through these tracks.

use crate::kalman::CvKalmanFilter;
use crate::types::{StateCov, StateVec, Vec2};
use nalgebra::Vector4;

/// A single swimmer track maintained by the evaluation harness.
#[derive(Clone, Debug)]
pub struct SwimmerTrack {
    /// Estimated state vector [px, py, vx, vy]
    pub state: StateVec,
    /// State estimation covariance
    pub cov: StateCov,
    /// Simulation time of last predict/update
    pub last_updated: f64,
    /// Simulation time of birth
    pub born_at: f64,
    /// Total number of accepted updates
    pub total_hits: u32,
}

impl SwimmerTrack {
    /// Birth a track from its first accepted measurement.
    /// Position variance scales with the measurement sigma but never drops
    /// below 4 m²; velocity starts unknown at 25 (m/s)².
    pub fn spawn(pos: Vec2, meas_sigma: f64, now: f64) -> Self {
        let pos_var = (9.0 * meas_sigma * meas_sigma).max(4.0);
        let vel_var = crate::config::TRACK_INIT_VEL_VAR;
        let mut cov = StateCov::zeros();
        cov[(0, 0)] = pos_var;
        cov[(1, 1)] = pos_var;
        cov[(2, 2)] = vel_var;
        cov[(3, 3)] = vel_var;
        Self {
            state: Vector4::new(pos.x, pos.y, 0.0, 0.0),
            cov,
            last_updated: now,
            born_at: now,
            total_hits: 1,
        }
    }

    /// Advance the stored state to `t` (mutating). Called before an update.
    pub fn predict_to(&mut self, kf: &CvKalmanFilter, t: f64) {
        let dt = t - self.last_updated;
        let (s, p) = kf.predict(&self.state, &self.cov, dt);
        self.state = s;
        self.cov = p;
        self.last_updated = self.last_updated.max(t);
    }

    /// Apply a position measurement. A singular innovation covariance
    /// silently leaves the state unchanged.
    pub fn update(&mut self, kf: &CvKalmanFilter, z: Vec2, meas_sigma: f64) {
        if let Some((s, p)) = kf.update(&self.state, &self.cov, z, meas_sigma) {
            self.state = s;
            self.cov = p;
        }
        self.total_hits += 1;
    }

    /// Position the track predicts for time `t`, without mutating.
    pub fn predicted_position(&self, t: f64) -> Vec2 {
        let dt = (t - self.last_updated).max(0.0);
        Vec2::new(
            self.state[0] + self.state[2] * dt,
            self.state[1] + self.state[3] * dt,
        )
    }

    /// Current estimated position.
    pub fn position(&self) -> Vec2 {
        Vec2::new(self.state[0], self.state[1])
    }

    /// Current estimated velocity.
    pub fn velocity(&self) -> Vec2 {
        Vec2::new(self.state[2], self.state[3])
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
