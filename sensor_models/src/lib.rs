//! `sensor_models` — Physical sonar description: mounting geometry,
//! acoustic timing, and pool-geometry raycasts.

pub mod geometry;
pub mod sonar;

pub use geometry::{lane_crossings, wall_intersection};
pub use sonar::SonarParams;
