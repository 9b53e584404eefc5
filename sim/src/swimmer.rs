//! Swimmer trajectories and world stepping.
//!
//! Swimmers are point targets with a mild sinusoidal maneuver: each tick
//! the velocity is rotated by `amp·sin(ω·(t+ϕ))·dt` before the position
//! advances, so paths wander without the speed changing. Wall contact
//! flips the offending velocity component and clamps the coordinate back
//! into the pool. Swimmers are mutually independent.

use serde::{Deserialize, Serialize};
use sonar_core::config::{POOL_LENGTH_M, POOL_WIDTH_M};
use sonar_core::rng::StreamRng;
use sonar_core::types::{SwimmerId, Vec2};

/// Per-swimmer maneuver parameters, drawn once from the swimmer's own
/// named stream so re-running a seed reproduces every path.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Maneuver {
    /// Turn-rate oscillation frequency (rad/s).
    pub omega: f64,
    /// Phase offset (s).
    pub phase: f64,
    /// Peak turn rate (rad/s).
    pub amp: f64,
}

impl Maneuver {
    pub fn draw(seed: u32, id: SwimmerId) -> Self {
        let mut rng = StreamRng::keyed(seed, &format!("maneuver|{}", id.0));
        Self {
            omega: rng.range(0.1, 0.6),
            phase: rng.range(0.0, std::f64::consts::TAU),
            amp: rng.range(0.05, 0.5),
        }
    }
}

/// Caller-supplied initial conditions for a swimmer.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SwimmerSpec {
    pub pos: Vec2,
    pub vel: Vec2,
}

/// A simulated swimmer with ground-truth state.
#[derive(Clone, Debug)]
pub struct Swimmer {
    pub id: SwimmerId,
    pub pos: Vec2,
    pub vel: Vec2,
    /// Simulation time the swimmer entered the pool.
    pub entered_at: f64,
    pub maneuver: Maneuver,
}

impl Swimmer {
    pub fn new(id: SwimmerId, spec: SwimmerSpec, entered_at: f64, seed: u32) -> Self {
        Self {
            id,
            pos: spec.pos,
            vel: spec.vel,
            entered_at,
            maneuver: Maneuver::draw(seed, id),
        }
    }

    /// Draw a default entry: somewhere on a pool edge, heading inward at a
    /// casual swimming speed.
    pub fn spawn_spec(seed: u32, id: SwimmerId) -> SwimmerSpec {
        let mut rng = StreamRng::keyed(seed, &format!("spawn|{}", id.0));
        let speed = rng.range(0.6, 1.4);
        let along = rng.next_f64();
        let (pos, inward) = match rng.index(4) {
            0 => (Vec2::new(along * POOL_WIDTH_M, 0.0), Vec2::new(0.0, 1.0)),
            1 => (
                Vec2::new(along * POOL_WIDTH_M, POOL_LENGTH_M),
                Vec2::new(0.0, -1.0),
            ),
            2 => (Vec2::new(0.0, along * POOL_LENGTH_M), Vec2::new(1.0, 0.0)),
            _ => (
                Vec2::new(POOL_WIDTH_M, along * POOL_LENGTH_M),
                Vec2::new(-1.0, 0.0),
            ),
        };
        // Lean the heading up to ±60° off the inward normal.
        let tilt = rng.range(-1.05, 1.05);
        let (sin, cos) = tilt.sin_cos();
        let vel = Vec2::new(
            inward.x * cos - inward.y * sin,
            inward.x * sin + inward.y * cos,
        ) * speed;
        SwimmerSpec { pos, vel }
    }

    /// Advance by `dt` from simulation time `t`.
    pub fn step(&mut self, t: f64, dt: f64) {
        let m = &self.maneuver;
        let dtheta = m.amp * (m.omega * (t + m.phase)).sin() * dt;
        let (sin, cos) = dtheta.sin_cos();
        self.vel = Vec2::new(
            self.vel.x * cos - self.vel.y * sin,
            self.vel.x * sin + self.vel.y * cos,
        );
        self.pos += self.vel * dt;

        if self.pos.x <= 0.0 {
            self.vel.x = -self.vel.x;
            self.pos.x = 0.0;
        } else if self.pos.x >= POOL_WIDTH_M {
            self.vel.x = -self.vel.x;
            self.pos.x = POOL_WIDTH_M;
        }
        if self.pos.y <= 0.0 {
            self.vel.y = -self.vel.y;
            self.pos.y = 0.0;
        } else if self.pos.y >= POOL_LENGTH_M {
            self.vel.y = -self.vel.y;
            self.pos.y = POOL_LENGTH_M;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn swimmer(spec: SwimmerSpec) -> Swimmer {
        Swimmer::new(SwimmerId(0), spec, 0.0, 1337)
    }

    #[test]
    fn straight_step_advances_position() {
        let mut s = swimmer(SwimmerSpec {
            pos: Vec2::new(10.0, 10.0),
            vel: Vec2::new(0.0, 1.2),
        });
        s.maneuver.amp = 0.0; // no turning
        s.step(0.0, 0.5);
        assert_abs_diff_eq!(s.pos.y, 10.6, epsilon = 1e-12);
        assert_abs_diff_eq!(s.pos.x, 10.0, epsilon = 1e-12);
    }

    #[test]
    fn maneuver_preserves_speed() {
        let mut s = swimmer(SwimmerSpec {
            pos: Vec2::new(10.0, 25.0),
            vel: Vec2::new(1.0, 0.3),
        });
        let speed0 = s.vel.norm();
        for i in 0..200 {
            s.step(i as f64 * 0.05, 0.05);
        }
        assert_abs_diff_eq!(s.vel.norm(), speed0, epsilon = 1e-9);
    }

    #[test]
    fn wall_bounce_flips_and_clamps() {
        let mut s = swimmer(SwimmerSpec {
            pos: Vec2::new(0.05, 25.0),
            vel: Vec2::new(-1.0, 0.0),
        });
        s.maneuver.amp = 0.0;
        s.step(0.0, 0.1);
        assert_eq!(s.pos.x, 0.0);
        assert!(s.vel.x > 0.0, "x velocity must flip inward");
    }

    #[test]
    fn swimmers_stay_inside_the_pool() {
        let mut s = swimmer(Swimmer::spawn_spec(7, SwimmerId(3)));
        for i in 0..4000 {
            s.step(i as f64 * 0.05, 0.05);
            assert!((0.0..=POOL_WIDTH_M).contains(&s.pos.x));
            assert!((0.0..=POOL_LENGTH_M).contains(&s.pos.y));
        }
    }

    #[test]
    fn maneuver_draw_is_deterministic() {
        let a = Maneuver::draw(1337, SwimmerId(5));
        let b = Maneuver::draw(1337, SwimmerId(5));
        assert_eq!(a.omega, b.omega);
        assert_eq!(a.phase, b.phase);
        assert_eq!(a.amp, b.amp);
    }
}
