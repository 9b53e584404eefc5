//! Per-sonar scheduling state: the SCANNING / SLEWING machine, ping
//! cadence, and the head's motion within a tick.
//!
//! While SCANNING the head turns at the acoustically-limited speed (one
//! scan step per ping interval) and emits pings on a fixed cadence; while
//! SLEWING it turns at the mechanical rate and stays silent. The engine
//! decides targets and mode transitions through the planners; this type
//! only executes motion and emission.

use crate::ping::{write_ping, PingEnv};
use sensor_models::sonar::{effective_scan_speed, ping_interval, SonarParams};
use sonar_core::config::{MAX_RANGE_NAIVE_M, SLEW_SPEED_DEG_S, VIS_POINT_CAP};
use sonar_core::frame::FrameBuffers;
use sonar_core::types::Vec2;
use std::collections::VecDeque;

/// Motion mode of the head.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanMode {
    /// Emitting pings, rotating at the acoustically-limited speed.
    Scanning,
    /// Repositioning at the mechanical rate, no emission.
    Slewing,
}

/// One sonar's mutable scheduling state plus its frame buffers.
#[derive(Clone, Debug)]
pub struct SonarUnit {
    pub params: SonarParams,
    /// Head angle (deg, absolute).
    pub current_angle_deg: f64,
    /// Commanded angle the head is moving toward (deg, absolute).
    pub target_angle_deg: f64,
    pub mode: ScanMode,
    /// Commanded maximum range (m).
    pub scan_range_m: f64,
    /// Seconds accumulated toward the next ping while scanning.
    pub ping_accumulator_s: f64,
    /// Finalization time of the previous frame.
    pub last_scan_time: f64,
    /// Duration of the most recent completed frame.
    pub cycle_duration_s: f64,
    /// Last nonzero sweep direction (+1 / −1).
    pub sweep_dir: f64,
    /// Recent candidate positions, for visualization only.
    pub detected_points: VecDeque<Vec2>,
    /// Recent accepted-match positions, for visualization only.
    pub matched_points: VecDeque<Vec2>,
    pub frame: FrameBuffers,
}

impl SonarUnit {
    pub fn new(params: SonarParams) -> Self {
        let current_angle_deg = params.mount_bearing_deg;
        let target_angle_deg = params.sector_max_deg();
        Self {
            params,
            current_angle_deg,
            target_angle_deg,
            mode: ScanMode::Scanning,
            scan_range_m: MAX_RANGE_NAIVE_M,
            ping_accumulator_s: 0.0,
            last_scan_time: 0.0,
            cycle_duration_s: 0.0,
            sweep_dir: 1.0,
            detected_points: VecDeque::with_capacity(VIS_POINT_CAP),
            matched_points: VecDeque::with_capacity(VIS_POINT_CAP),
            frame: FrameBuffers::new(),
        }
    }

    /// Execute this tick's motion (and emission when scanning).
    /// `t0` is the simulation time at the start of the tick.
    pub fn advance(&mut self, t0: f64, dt: f64, env: &PingEnv) {
        match self.mode {
            ScanMode::Scanning => self.advance_scanning(t0, dt, env),
            ScanMode::Slewing => self.advance_slewing(dt),
        }
    }

    fn advance_scanning(&mut self, t0: f64, dt: f64, env: &PingEnv) {
        let interval = ping_interval(self.scan_range_m);
        let speed = effective_scan_speed(self.scan_range_m);

        let to_target = self.target_angle_deg - self.current_angle_deg;
        let dir = if to_target == 0.0 { 0.0 } else { to_target.signum() };
        let start_angle = self.current_angle_deg;
        let reach = to_target.abs();

        self.current_angle_deg = start_angle + dir * reach.min(speed * dt);
        if dir != 0.0 {
            self.sweep_dir = dir;
        }

        // Emit every ping whose cadence boundary falls inside this tick, at
        // the head angle of that moment.
        let acc0 = self.ping_accumulator_s;
        let mut emitted = 0u32;
        loop {
            let tau = (emitted + 1) as f64 * interval - acc0;
            if tau > dt {
                break;
            }
            let angle = start_angle + dir * (speed * tau).min(reach);
            write_ping(
                &mut self.frame,
                &self.params,
                self.scan_range_m,
                angle,
                t0 + tau,
                env,
            );
            emitted += 1;
        }
        self.ping_accumulator_s = acc0 + dt - emitted as f64 * interval;
    }

    fn advance_slewing(&mut self, dt: f64) {
        let to_target = self.target_angle_deg - self.current_angle_deg;
        let max_move = SLEW_SPEED_DEG_S * dt;
        if to_target.abs() <= max_move {
            // Snap on arrival.
            self.current_angle_deg = self.target_angle_deg;
        } else {
            self.current_angle_deg += to_target.signum() * max_move;
            self.sweep_dir = to_target.signum();
        }
    }

    pub fn push_detected(&mut self, p: Vec2) {
        push_capped(&mut self.detected_points, p);
    }

    pub fn push_matched(&mut self, p: Vec2) {
        push_capped(&mut self.matched_points, p);
    }
}

fn push_capped(q: &mut VecDeque<Vec2>, p: Vec2) {
    if q.len() >= VIS_POINT_CAP {
        q.pop_front();
    }
    q.push_back(p);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use sonar_core::Tuning;

    fn unit() -> SonarUnit {
        SonarUnit::new(SonarParams::corner_array().remove(0))
    }

    fn quiet_env(tuning: &Tuning) -> PingEnv<'_> {
        PingEnv {
            seed: 1,
            tuning,
            swimmers: &[],
        }
    }

    #[test]
    fn scanning_speed_is_acoustically_limited() {
        let tuning = Tuning::default();
        let mut s = unit();
        s.current_angle_deg = 45.0;
        s.target_angle_deg = 90.0;
        s.advance(0.0, 0.1, &quiet_env(&tuning));
        // ≈ 1° / 68.7 ms ≈ 14.56 °/s, so ≈ 1.456° in 0.1 s.
        let moved = s.current_angle_deg - 45.0;
        assert_abs_diff_eq!(moved, 0.1 / ping_interval(50.0), epsilon = 1e-9);
        assert!(moved < SLEW_SPEED_DEG_S * 0.1, "slower than slewing");
    }

    #[test]
    fn slewing_snaps_on_arrival() {
        let tuning = Tuning::default();
        let mut s = unit();
        s.mode = ScanMode::Slewing;
        s.current_angle_deg = 50.0;
        s.target_angle_deg = 52.0;
        s.advance(0.0, 0.1, &quiet_env(&tuning));
        assert_eq!(s.current_angle_deg, 52.0);
    }

    #[test]
    fn ping_cadence_carries_the_accumulator() {
        let tuning = Tuning::default();
        let mut s = unit();
        s.current_angle_deg = 45.0;
        s.target_angle_deg = 90.0;
        let interval = ping_interval(s.scan_range_m);
        // Two ticks of 0.05 s: one interval (68.7 ms) fits only once, and
        // the remainder must carry over, not reset.
        s.advance(0.0, 0.05, &quiet_env(&tuning));
        assert_abs_diff_eq!(s.ping_accumulator_s, 0.05, epsilon = 1e-12);
        s.advance(0.05, 0.05, &quiet_env(&tuning));
        assert_abs_diff_eq!(s.ping_accumulator_s, 0.1 - interval, epsilon = 1e-12);
        assert!(s.frame.observed_angles.iter().any(|&o| o), "one ping landed");
    }

    #[test]
    fn vis_fifos_are_capped() {
        let mut s = unit();
        for i in 0..40 {
            s.push_detected(Vec2::new(i as f64, 0.0));
        }
        assert_eq!(s.detected_points.len(), VIS_POINT_CAP);
        assert_eq!(s.detected_points.front().unwrap().x, 25.0);
    }
}
