//! `sonar_core` — Per-frame algorithms of the multi-sonar pool scanner.
//!
//! # Module layout
//! - [`types`]    — Fundamental types (IDs, vectors, track state)
//! - [`config`]   — Physical constants and the clamped tuning record
//! - [`rng`]      — Named-stream deterministic RNG (FNV-1a keyed LCG)
//! - [`math`]     — Angle helpers, percentile, mean
//! - [`kalman`]   — Constant-velocity Kalman filter (predict / update)
//! - [`track`]    — Per-swimmer track state
//! - [`frame`]    — Polar frame buffers and background model storage
//! - [`detect`]   — Detection pipeline (subtraction → threshold →
//!   dual-kernel denoise → DBSCAN → plausibility → candidates)
//! - [`matching`] — IoU and distance candidate↔truth association
//! - [`metrics`]  — Sliding-window evaluation metrics

pub mod config;
pub mod detect;
pub mod frame;
pub mod kalman;
pub mod matching;
pub mod math;
pub mod metrics;
pub mod rng;
pub mod track;
pub mod types;

pub use config::{Tuning, TuningPatch};
pub use detect::{Candidate, FrameContext, PolarBox};
pub use frame::FrameBuffers;
pub use metrics::{EvalMetrics, MetricBuffers};
pub use track::SwimmerTrack;
pub use types::{SonarId, StateCov, StateVec, SwimmerId, Vec2};
