//! `sim` — The scanning engine: world kinematics, sonar scheduling, echo
//! synthesis, planners, PSO assignment, and the tick orchestrator.

pub mod engine;
pub mod ping;
pub mod planner;
pub mod pso;
pub mod scenarios;
pub mod sonar;
pub mod swimmer;

pub use engine::{Engine, Strategy};
pub use scenarios::{Scenario, ScenarioKind};
pub use sonar::{ScanMode, SonarUnit};
pub use swimmer::{Swimmer, SwimmerSpec};
