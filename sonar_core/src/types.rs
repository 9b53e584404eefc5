//! Fundamental types used across the entire workspace.

use nalgebra::{Matrix4, Vector2, Vector4};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Scalar type: use f64 throughout for numerical precision in the Kalman
// filter and planners; the heavy polar frame buffers are f32.
// ---------------------------------------------------------------------------

/// 2-D world coordinate or velocity (meters / meters per second).
pub type Vec2 = Vector2<f64>;

/// 4-DOF track state vector: [px, py, vx, vy]
pub type StateVec = Vector4<f64>;

/// 4×4 track state covariance matrix
pub type StateCov = Matrix4<f64>;

// ---------------------------------------------------------------------------
// Identifier types — newtype wrappers so IDs are never confused at compile time
// ---------------------------------------------------------------------------

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SwimmerId(pub u64);

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SonarId(pub u32);

impl fmt::Display for SwimmerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "W{}", self.0)
    }
}

impl fmt::Display for SonarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}
