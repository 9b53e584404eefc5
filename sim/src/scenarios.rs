//! Scenario definitions.
//!
//! Each scenario is a named, seeded set of swimmer entries over time; the
//! sonar array is always the four-corner arrangement. All scenarios are
//! deterministic given the same seed.

use crate::swimmer::SwimmerSpec;
use serde::{Deserialize, Serialize};
use sonar_core::config::{POOL_LENGTH_M, POOL_WIDTH_M};
use sonar_core::types::Vec2;

/// Which pre-defined scenario to load.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
pub enum ScenarioKind {
    /// No swimmers; background warmup and idle-sweep behavior
    Empty,
    /// One swimmer crossing the pool lengthwise
    SingleCrosser,
    /// Four swimmers, one entering from each side
    FourSides,
    /// Six swimmers with staggered entries
    Busy,
}

/// A timed swimmer entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Entry {
    /// Simulation time at which the swimmer enters (s).
    pub at: f64,
    /// Fixed initial conditions; `None` draws from the spawn stream.
    pub spec: Option<SwimmerSpec>,
}

/// A fully configured simulation scenario.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub seed: u32,
    pub duration: f64, // seconds
    pub sim_dt: f64,   // tick size (s)
    pub entries: Vec<Entry>,
}

impl Scenario {
    /// Build the named scenario. Uses `seed` for repeatability.
    pub fn build(kind: ScenarioKind, seed: u32) -> Self {
        match kind {
            ScenarioKind::Empty => Self::empty(seed),
            ScenarioKind::SingleCrosser => Self::single_crosser(seed),
            ScenarioKind::FourSides => Self::four_sides(seed),
            ScenarioKind::Busy => Self::busy(seed),
        }
    }

    fn empty(seed: u32) -> Self {
        Self {
            name: "empty".into(),
            seed,
            duration: 20.0,
            sim_dt: 0.05,
            entries: Vec::new(),
        }
    }

    fn single_crosser(seed: u32) -> Self {
        Self {
            name: "single-crosser".into(),
            seed,
            duration: 30.0,
            sim_dt: 0.05,
            entries: vec![entry_at(
                0.0,
                [POOL_WIDTH_M / 2.0, 0.0],
                [0.0, 1.2],
            )],
        }
    }

    fn four_sides(seed: u32) -> Self {
        Self {
            name: "four-sides".into(),
            seed,
            duration: 60.0,
            sim_dt: 0.05,
            entries: vec![
                entry_at(0.0, [POOL_WIDTH_M / 2.0, 0.0], [0.2, 1.0]),
                entry_at(0.0, [POOL_WIDTH_M / 2.0, POOL_LENGTH_M], [-0.2, -1.0]),
                entry_at(0.0, [0.0, POOL_LENGTH_M / 2.0], [1.0, 0.2]),
                entry_at(0.0, [POOL_WIDTH_M, POOL_LENGTH_M / 2.0], [-1.0, -0.2]),
            ],
        }
    }

    fn busy(seed: u32) -> Self {
        let mut entries = vec![
            entry_at(0.0, [4.0, 0.0], [0.3, 1.1]),
            entry_at(0.0, [16.0, 50.0], [-0.3, -0.9]),
            entry_at(5.0, [0.0, 20.0], [1.2, 0.1]),
            entry_at(10.0, [20.0, 35.0], [-1.0, -0.3]),
        ];
        // Two more swimmers with stream-drawn entries.
        entries.push(Entry {
            at: 15.0,
            spec: None,
        });
        entries.push(Entry {
            at: 20.0,
            spec: None,
        });
        Self {
            name: "busy".into(),
            seed,
            duration: 90.0,
            sim_dt: 0.05,
            entries,
        }
    }
}

fn entry_at(at: f64, pos: [f64; 2], vel: [f64; 2]) -> Entry {
    Entry {
        at,
        spec: Some(SwimmerSpec {
            pos: Vec2::new(pos[0], pos[1]),
            vel: Vec2::new(vel[0], vel[1]),
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
