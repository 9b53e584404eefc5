//! The engine: one strategy's complete simulation state and its tick
//! orchestrator.
//!
//! # Processing steps per tick
//! 1. Advance every swimmer (world step)
//! 2. Per sonar, in id order: plan → detect a frame boundary → finalize the
//!    completed frame (detection, matching, tracking, metrics) → adopt the
//!    new target/mode/range → move the head and emit pings
//! 3. Replan the cross-sonar assignment (optimized strategy, periodic or on
//!    track-count change)
//! 4. Prune metric buffers to the retention horizon
//!
//! Two engines built on the same seed and fed the same calls produce
//! byte-identical histories; all randomness flows through named streams.
//! The optimized planner and the PSO see targets only through Kalman
//! tracks, never through ground-truth swimmer state.

use crate::ping::PingEnv;
use crate::planner::{plan_naive, plan_optimized, SweepMemory};
use crate::pso;
use crate::sonar::{ScanMode, SonarUnit};
use crate::swimmer::{Swimmer, SwimmerSpec};
use sensor_models::sonar::SonarParams;
use serde::{Deserialize, Serialize};
use sonar_core::config::{self, Tuning, TuningPatch};
use sonar_core::detect::{finalize_frame, FrameContext};
use sonar_core::kalman::CvKalmanFilter;
use sonar_core::matching::{distance_match, iou_match, TruthObs};
use sonar_core::math::bearing_deg;
use sonar_core::metrics::{EvalMetrics, MetricBuffers};
use sonar_core::track::SwimmerTrack;
use sonar_core::types::{SonarId, SwimmerId, Vec2};
use std::collections::BTreeMap;

/// Scheduling strategy of an engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    /// Full-sector bang-bang sweep at maximum range.
    Naive,
    /// Track-driven adaptive sweep with PSO cross-sonar assignment.
    Optimized,
}

/// A complete simulation instance for one strategy.
pub struct Engine {
    strategy: Strategy,
    seed: u32,
    time: f64,
    tuning: Tuning,
    swimmers: Vec<Swimmer>,
    next_swimmer_id: u64,
    sonars: Vec<SonarUnit>,
    sweep_mem: Vec<SweepMemory>,
    kf: CvKalmanFilter,
    tracks: BTreeMap<SwimmerId, SwimmerTrack>,
    assignments: BTreeMap<SonarId, Vec<SwimmerId>>,
    last_pso_time: f64,
    pso_track_count: usize,
    metrics: MetricBuffers,
}

impl Engine {
    pub fn new(strategy: Strategy, seed: u32) -> Self {
        let sonars: Vec<SonarUnit> = SonarParams::corner_array()
            .into_iter()
            .map(SonarUnit::new)
            .collect();
        let sweep_mem = vec![SweepMemory::default(); sonars.len()];
        let mut assignments = BTreeMap::new();
        for s in &sonars {
            assignments.insert(s.params.id, Vec::new());
        }
        Self {
            strategy,
            seed,
            time: 0.0,
            tuning: Tuning::default(),
            swimmers: Vec::new(),
            next_swimmer_id: 0,
            sonars,
            sweep_mem,
            kf: CvKalmanFilter::default(),
            tracks: BTreeMap::new(),
            assignments,
            last_pso_time: f64::NEG_INFINITY,
            pso_track_count: 0,
            metrics: MetricBuffers::new(),
        }
    }

    // -----------------------------------------------------------------
    // Public surface
    // -----------------------------------------------------------------

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn swimmers(&self) -> &[Swimmer] {
        &self.swimmers
    }

    pub fn sonars(&self) -> &[SonarUnit] {
        &self.sonars
    }

    pub fn tuning(&self) -> Tuning {
        self.tuning
    }

    pub fn optimized_assignments(&self) -> &BTreeMap<SonarId, Vec<SwimmerId>> {
        &self.assignments
    }

    /// Merge a tuning patch; every field is clamped on entry.
    pub fn set_tuning(&mut self, patch: TuningPatch) -> Tuning {
        self.tuning.apply(&patch)
    }

    /// Add a swimmer. With no spec, entry point and velocity come from the
    /// swimmer's own named stream.
    pub fn add_swimmer(&mut self, spec: Option<SwimmerSpec>) -> Swimmer {
        let id = SwimmerId(self.next_swimmer_id);
        self.next_swimmer_id += 1;
        let spec = spec.unwrap_or_else(|| Swimmer::spawn_spec(self.seed, id));
        let swimmer = Swimmer::new(id, spec, self.time, self.seed);
        self.swimmers.push(swimmer.clone());
        swimmer
    }

    /// Remove a swimmer and all of its per-swimmer state.
    /// Returns `false` for an unknown id.
    pub fn remove_swimmer(&mut self, id: SwimmerId) -> bool {
        let before = self.swimmers.len();
        self.swimmers.retain(|s| s.id != id);
        if self.swimmers.len() == before {
            return false;
        }
        self.tracks.remove(&id);
        self.metrics.remove_swimmer(id);
        for assigned in self.assignments.values_mut() {
            assigned.retain(|&a| a != id);
        }
        true
    }

    /// Evaluate the sliding window ending now.
    pub fn metrics(&self, window_sec: f64) -> EvalMetrics {
        let swimmers: Vec<(SwimmerId, f64)> =
            self.swimmers.iter().map(|s| (s.id, s.entered_at)).collect();
        self.metrics.compute(self.time, window_sec, &swimmers)
    }

    // -----------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------

    /// Advance the simulation by `dt` seconds. `dt ≤ 0` is a no-op; the
    /// step is capped at `MAX_TICK_DT_S` to stay stable across host pauses.
    pub fn tick(&mut self, dt: f64) {
        if dt <= 0.0 {
            return;
        }
        let dt = dt.min(config::MAX_TICK_DT_S);
        let t0 = self.time;
        self.time += dt;
        let now = self.time;

        for swimmer in &mut self.swimmers {
            swimmer.step(t0, dt);
        }

        // Planner inputs: predicted track positions, never ground truth.
        let track_positions: Vec<(SwimmerId, Vec2)> = self
            .tracks
            .iter()
            .map(|(&id, tr)| (id, tr.predicted_position(now)))
            .collect();

        for i in 0..self.sonars.len() {
            let decision = match self.strategy {
                Strategy::Naive => plan_naive(&self.sonars[i]),
                Strategy::Optimized => {
                    let assigned = self
                        .assignments
                        .get(&self.sonars[i].params.id)
                        .map(|v| v.as_slice())
                        .unwrap_or(&[]);
                    plan_optimized(
                        &self.sonars[i],
                        &mut self.sweep_mem[i],
                        &track_positions,
                        assigned,
                        now,
                    )
                }
            };

            // A scanning segment ends when the sonar leaves SCANNING or is
            // redirected; the accumulated frame is finalized before the
            // transition takes effect.
            let sonar = &self.sonars[i];
            let boundary = sonar.mode == ScanMode::Scanning
                && (decision.mode != ScanMode::Scanning
                    || decision.target_angle_deg != sonar.target_angle_deg);
            if boundary {
                self.finalize_sonar_frame(i, now);
            }

            let sonar = &mut self.sonars[i];
            if sonar.mode == ScanMode::Scanning && decision.mode != ScanMode::Scanning {
                sonar.ping_accumulator_s = 0.0;
            }
            sonar.mode = decision.mode;
            sonar.target_angle_deg = decision.target_angle_deg;
            sonar.scan_range_m = decision.scan_range_m;

            let env = PingEnv {
                seed: self.seed,
                tuning: &self.tuning,
                swimmers: &self.swimmers,
            };
            self.sonars[i].advance(t0, dt, &env);
        }

        if self.strategy == Strategy::Optimized {
            let n = self.tracks.len();
            let due = now - self.last_pso_time >= config::PSO_UPDATE_INTERVAL_S;
            if due || n != self.pso_track_count {
                let positions: Vec<(SwimmerId, Vec2)> = self
                    .tracks
                    .iter()
                    .map(|(&id, tr)| (id, tr.predicted_position(now)))
                    .collect();
                let params: Vec<SonarParams> =
                    self.sonars.iter().map(|s| s.params.clone()).collect();
                self.assignments = pso::plan_assignments(&positions, &params, self.seed, now);
                self.last_pso_time = now;
                self.pso_track_count = n;
                tracing::debug!(tracks = n, time = now, "cross-sonar assignment replanned");
            }
        }

        self.metrics.prune(now);
    }

    // -----------------------------------------------------------------
    // Frame finalization
    // -----------------------------------------------------------------

    fn finalize_sonar_frame(&mut self, i: usize, now: f64) {
        let any_swimmers = !self.swimmers.is_empty();

        let (ctx, truths) = {
            let sonar = &self.sonars[i];
            let p = &sonar.params;
            let ctx = FrameContext {
                seed: self.seed,
                sonar_id: p.id.0,
                sonar_pos: p.position,
                sector_min_deg: p.sector_min_deg(),
                frame_id: sonar.frame.frame_id,
                time_bucket_ms: (now * 1000.0).floor() as u64,
            };
            // Ground truth for evaluation: swimmers inside the sector and
            // inside the instrumented range at frame-end time.
            let truths: Vec<TruthObs> = self
                .swimmers
                .iter()
                .filter_map(|sw| {
                    let b = bearing_deg(p.position, sw.pos);
                    let r = (sw.pos - p.position).norm();
                    (p.covers_bearing(b) && r <= config::MAX_RANGE_NAIVE_M).then(|| TruthObs {
                        id: sw.id,
                        pos: sw.pos,
                        bearing_deg: b,
                        range_m: r,
                    })
                })
                .collect();
            (ctx, truths)
        };

        let candidates = finalize_frame(&mut self.sonars[i].frame, &self.tuning, &ctx, any_swimmers);

        {
            let sonar = &mut self.sonars[i];
            sonar.cycle_duration_s = now - sonar.last_scan_time;
            sonar.last_scan_time = now;
            for c in &candidates {
                sonar.push_detected(c.pos);
            }
            self.metrics.record_frame(sonar.params.id, now);
        }

        // Paper metric: IoU-gated confusion counts.
        self.metrics
            .record_paper_frame(now, iou_match(&candidates, &truths));

        // Tracker metric: distance-gated one-to-one matches.
        let (pairs, false_alarms) = distance_match(&candidates, &truths);
        self.metrics.record_false_alarms(now, false_alarms.len());
        self.metrics
            .record_detection_stats(now, truths.len(), pairs.len());

        for pair in &pairs {
            let cand = &candidates[pair.cand_idx];
            self.metrics.record_match(now, pair.swimmer);
            self.metrics
                .record_localization_error(now, (cand.pos - pair.truth_pos).norm());
            let track = self
                .tracks
                .entry(pair.swimmer)
                .or_insert_with(|| SwimmerTrack::spawn(cand.pos, cand.meas_sigma, now));
            track.predict_to(&self.kf, now);
            track.update(&self.kf, cand.pos, cand.meas_sigma);
            self.sonars[i].push_matched(cand.pos);
        }

        // Tracking-error samples: track prediction against truth, for every
        // present swimmer that has a track.
        for sw in &self.swimmers {
            if let Some(track) = self.tracks.get(&sw.id) {
                let err = (track.predicted_position(now) - sw.pos).norm();
                self.metrics.record_tracking_error(now, err);
            }
        }

        tracing::debug!(
            sonar = %self.sonars[i].params.id,
            time = now,
            candidates = candidates.len(),
            truths = truths.len(),
            "frame finalized"
        );
        self.sonars[i].frame.begin_frame();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonpositive_dt_is_a_noop() {
        let mut e = Engine::new(Strategy::Naive, 1);
        e.tick(0.0);
        e.tick(-1.0);
        assert_eq!(e.time(), 0.0);
    }

    #[test]
    fn oversized_dt_is_capped() {
        let mut e = Engine::new(Strategy::Naive, 1);
        e.tick(5.0);
        assert_eq!(e.time(), config::MAX_TICK_DT_S);
    }

    #[test]
    fn swimmer_ids_are_stable_and_removal_reports() {
        let mut e = Engine::new(Strategy::Naive, 1);
        let a = e.add_swimmer(None);
        let b = e.add_swimmer(None);
        assert_eq!(a.id, SwimmerId(0));
        assert_eq!(b.id, SwimmerId(1));
        assert!(e.remove_swimmer(a.id));
        assert!(!e.remove_swimmer(a.id), "double remove must fail");
        assert_eq!(e.swimmers().len(), 1);
    }

    #[test]
    fn set_tuning_returns_the_clamped_merge() {
        let mut e = Engine::new(Strategy::Optimized, 1);
        let t = e.set_tuning(TuningPatch {
            threshold: Some(99.0),
            ..Default::default()
        });
        assert_eq!(t.threshold, 10.0);
        assert_eq!(e.tuning().threshold, 10.0);
    }

    #[test]
    fn naive_engine_always_scans_at_max_range() {
        let mut e = Engine::new(Strategy::Naive, 1337);
        e.add_swimmer(Some(SwimmerSpec {
            pos: Vec2::new(10.0, 25.0),
            vel: Vec2::new(0.3, 0.5),
        }));
        for _ in 0..400 {
            e.tick(0.05);
            for s in e.sonars() {
                assert_eq!(s.mode, ScanMode::Scanning);
                assert_eq!(s.scan_range_m, config::MAX_RANGE_NAIVE_M);
            }
        }
    }

    #[test]
    fn heads_stay_inside_their_sectors() {
        let mut e = Engine::new(Strategy::Optimized, 7);
        e.add_swimmer(None);
        e.add_swimmer(None);
        for _ in 0..600 {
            e.tick(0.05);
            for s in e.sonars() {
                let lo = s.params.sector_min_deg() - 1.0;
                let hi = s.params.sector_max_deg() + 1.0;
                assert!(
                    (lo..=hi).contains(&s.current_angle_deg),
                    "{} at {}",
                    s.params.id,
                    s.current_angle_deg
                );
            }
        }
    }

    #[test]
    fn same_seed_same_history() {
        let run = || {
            let mut e = Engine::new(Strategy::Optimized, 1337);
            e.add_swimmer(None);
            e.add_swimmer(None);
            let mut trace = Vec::new();
            for _ in 0..300 {
                e.tick(0.05);
                trace.push(e.metrics(10.0));
            }
            trace
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn assignments_empty_without_tracks() {
        let mut e = Engine::new(Strategy::Optimized, 1);
        for _ in 0..40 {
            e.tick(0.05);
        }
        assert!(e.optimized_assignments().values().all(|v| v.is_empty()));
    }
}
