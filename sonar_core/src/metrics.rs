//! Sliding-window evaluation metrics: AoI / freshness, localization and
//! tracking error, precision/recall/F1, MDR, mean IoU, fps, tracking rate,
//! time-to-first-detection.
//!
//! Every event is tagged with its simulation time and kept in a buffer
//! pruned to `METRIC_RETENTION_SEC`; `compute(window)` then aggregates the
//! suffix that falls inside the requested window. Buffers are per-engine,
//! so the two strategies never share state.

use crate::config::METRIC_RETENTION_SEC;
use crate::math::{mean, percentile};
use crate::matching::IouFrameStats;
use crate::types::{SonarId, SwimmerId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

// ---------------------------------------------------------------------------
// Output record
// ---------------------------------------------------------------------------

/// One evaluated snapshot over a sliding window. All fields nonnegative;
/// ratios are 0 when their denominator is empty.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalMetrics {
    pub active_swimmers: usize,
    /// Mean seconds since each present swimmer was last matched.
    pub avg_aoi_sec: f64,
    pub p90_aoi_sec: f64,
    /// Accepted update events per second per present swimmer.
    pub avg_scan_rate_hz: f64,
    /// Mean gap between consecutive updates of the same swimmer.
    pub avg_revisit_interval_sec: f64,
    pub tracking_rmse_m: f64,
    pub p90_tracking_error_m: f64,
    pub false_alarms_per_sec: f64,
    /// Hits / opportunities of the distance matcher, in [0, 1].
    pub detection_hit_rate: f64,
    pub avg_localization_error_m: f64,
    pub p90_localization_error_m: f64,
    pub avg_time_to_first_detection_sec: f64,
    pub p90_time_to_first_detection_sec: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Missed-detection rate, `fn / (tp + fn)`.
    pub mdr: f64,
    pub mean_iou: f64,
    /// Finalized frames per second, averaged over sonars.
    pub fps: f64,
    /// Fraction of present swimmers with ≥1 update inside the window.
    pub tracking_rate: f64,
}

// ---------------------------------------------------------------------------
// Buffers
// ---------------------------------------------------------------------------

/// Time-tagged event buffers feeding [`EvalMetrics`].
#[derive(Clone, Debug, Default)]
pub struct MetricBuffers {
    false_alarms: VecDeque<(f64, u32)>,
    /// (t, opportunities, hits) per finalized frame.
    detection_stats: VecDeque<(f64, u32, u32)>,
    paper: VecDeque<(f64, IouFrameStats)>,
    frame_times: BTreeMap<SonarId, VecDeque<f64>>,
    loc_errors: VecDeque<(f64, f64)>,
    tracking_errors: VecDeque<(f64, f64)>,
    last_seen: BTreeMap<SwimmerId, f64>,
    update_times: BTreeMap<SwimmerId, VecDeque<f64>>,
    /// Millisecond bucket of the latest accepted update per swimmer, used
    /// to deduplicate simultaneous matches from different sonars.
    last_update_bucket: BTreeMap<SwimmerId, u64>,
    first_detection: BTreeMap<SwimmerId, f64>,
}

impl MetricBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame(&mut self, sonar: SonarId, t: f64) {
        self.frame_times.entry(sonar).or_default().push_back(t);
    }

    pub fn record_false_alarms(&mut self, t: f64, count: usize) {
        if count > 0 {
            self.false_alarms.push_back((t, count as u32));
        }
    }

    pub fn record_detection_stats(&mut self, t: f64, opportunities: usize, hits: usize) {
        if opportunities > 0 {
            self.detection_stats
                .push_back((t, opportunities as u32, hits as u32));
        }
    }

    pub fn record_paper_frame(&mut self, t: f64, stats: IouFrameStats) {
        if stats.tp + stats.fp + stats.fn_ > 0 {
            self.paper.push_back((t, stats));
        }
    }

    pub fn record_localization_error(&mut self, t: f64, err_m: f64) {
        self.loc_errors.push_back((t, err_m));
    }

    pub fn record_tracking_error(&mut self, t: f64, err_m: f64) {
        self.tracking_errors.push_back((t, err_m));
    }

    /// Register an accepted distance match. Updates within the same
    /// millisecond bucket (e.g. two sonars finishing frames on one tick)
    /// count once.
    pub fn record_match(&mut self, t: f64, id: SwimmerId) {
        self.last_seen.insert(id, t);
        let bucket = (t * 1000.0).floor() as u64;
        if self.last_update_bucket.get(&id) == Some(&bucket) {
            return;
        }
        self.last_update_bucket.insert(id, bucket);
        self.update_times.entry(id).or_default().push_back(t);
        self.first_detection.entry(id).or_insert(t);
    }

    pub fn remove_swimmer(&mut self, id: SwimmerId) {
        self.last_seen.remove(&id);
        self.update_times.remove(&id);
        self.last_update_bucket.remove(&id);
        self.first_detection.remove(&id);
    }

    /// Drop events older than the retention horizon.
    pub fn prune(&mut self, now: f64) {
        let cutoff = now - METRIC_RETENTION_SEC;
        prune_deque(&mut self.false_alarms, cutoff);
        prune_deque3(&mut self.detection_stats, cutoff);
        prune_deque(&mut self.paper, cutoff);
        prune_deque(&mut self.loc_errors, cutoff);
        prune_deque(&mut self.tracking_errors, cutoff);
        for q in self.frame_times.values_mut() {
            while q.front().is_some_and(|&t| t < cutoff) {
                q.pop_front();
            }
        }
        for q in self.update_times.values_mut() {
            while q.front().is_some_and(|&t| t < cutoff) {
                q.pop_front();
            }
        }
    }

    /// Aggregate the window `[now − window, now]`.
    /// `swimmers` lists the currently-present swimmers as `(id, entered_at)`.
    pub fn compute(&self, now: f64, window: f64, swimmers: &[(SwimmerId, f64)]) -> EvalMetrics {
        let window = window.clamp(1e-9, METRIC_RETENTION_SEC);
        let cutoff = now - window;
        let mut m = EvalMetrics {
            active_swimmers: swimmers.len(),
            ..Default::default()
        };

        // AoI across present swimmers; never-matched swimmers age from entry.
        let aois: Vec<f64> = swimmers
            .iter()
            .map(|&(id, entered)| (now - self.last_seen.get(&id).copied().unwrap_or(entered)).max(0.0))
            .collect();
        m.avg_aoi_sec = mean(&aois);
        m.p90_aoi_sec = percentile(&aois, 0.90);

        // Freshness: update events per swimmer, and revisit gaps.
        if !swimmers.is_empty() {
            let mut events = 0usize;
            let mut gaps: Vec<f64> = Vec::new();
            let mut tracked = 0usize;
            for &(id, _) in swimmers {
                let Some(times) = self.update_times.get(&id) else {
                    continue;
                };
                let in_window: Vec<f64> =
                    times.iter().copied().filter(|&t| t >= cutoff).collect();
                events += in_window.len();
                if !in_window.is_empty() {
                    tracked += 1;
                }
                for pair in in_window.windows(2) {
                    gaps.push(pair[1] - pair[0]);
                }
            }
            m.avg_scan_rate_hz = events as f64 / window / swimmers.len() as f64;
            m.avg_revisit_interval_sec = mean(&gaps);
            m.tracking_rate = tracked as f64 / swimmers.len() as f64;
        }

        // Tracking error.
        let terrs: Vec<f64> = in_window_values(&self.tracking_errors, cutoff);
        if !terrs.is_empty() {
            m.tracking_rmse_m =
                (terrs.iter().map(|e| e * e).sum::<f64>() / terrs.len() as f64).sqrt();
            m.p90_tracking_error_m = percentile(&terrs, 0.90);
        }

        // False alarms.
        let fa: u32 = self
            .false_alarms
            .iter()
            .filter(|&&(t, _)| t >= cutoff)
            .map(|&(_, c)| c)
            .sum();
        m.false_alarms_per_sec = fa as f64 / window;

        // Detection hit rate.
        let (mut opp, mut hits) = (0u32, 0u32);
        for &(t, o, h) in &self.detection_stats {
            if t >= cutoff {
                opp += o;
                hits += h;
            }
        }
        if opp > 0 {
            m.detection_hit_rate = hits as f64 / opp as f64;
        }

        // Localization error.
        let lerrs: Vec<f64> = in_window_values(&self.loc_errors, cutoff);
        m.avg_localization_error_m = mean(&lerrs);
        m.p90_localization_error_m = percentile(&lerrs, 0.90);

        // Time to first detection: only swimmers that entered inside the
        // window; undetected ones are censored at `now`.
        let ttfds: Vec<f64> = swimmers
            .iter()
            .filter(|&&(_, entered)| entered >= cutoff)
            .map(|&(id, entered)| {
                let detected_at = self.first_detection.get(&id).copied().unwrap_or(now);
                (detected_at - entered).max(0.0)
            })
            .collect();
        m.avg_time_to_first_detection_sec = mean(&ttfds);
        m.p90_time_to_first_detection_sec = percentile(&ttfds, 0.90);

        // Paper confusion counts.
        let mut agg = IouFrameStats::default();
        for &(t, s) in &self.paper {
            if t >= cutoff {
                agg.tp += s.tp;
                agg.fp += s.fp;
                agg.fn_ += s.fn_;
                agg.iou_sum += s.iou_sum;
            }
        }
        if agg.tp + agg.fp > 0 {
            m.precision = agg.tp as f64 / (agg.tp + agg.fp) as f64;
        }
        if agg.tp + agg.fn_ > 0 {
            m.recall = agg.tp as f64 / (agg.tp + agg.fn_) as f64;
            m.mdr = agg.fn_ as f64 / (agg.tp + agg.fn_) as f64;
        }
        if m.precision + m.recall > 0.0 {
            m.f1 = 2.0 * m.precision * m.recall / (m.precision + m.recall);
        }
        if agg.tp > 0 {
            m.mean_iou = agg.iou_sum / agg.tp as f64;
        }

        // Frames per second, averaged over sonars with at least two frames
        // in the window (the interval estimate needs a gap).
        let mut rates: Vec<f64> = Vec::new();
        for times in self.frame_times.values() {
            let tw: Vec<f64> = times.iter().copied().filter(|&t| t >= cutoff).collect();
            if tw.len() >= 2 {
                let span = tw[tw.len() - 1] - tw[0];
                if span > 0.0 {
                    rates.push((tw.len() - 1) as f64 / span);
                }
            }
        }
        m.fps = mean(&rates);

        m
    }
}

fn prune_deque<T>(q: &mut VecDeque<(f64, T)>, cutoff: f64) {
    while q.front().is_some_and(|&(t, _)| t < cutoff) {
        q.pop_front();
    }
}

fn prune_deque3<T, U>(q: &mut VecDeque<(f64, T, U)>, cutoff: f64) {
    while q.front().is_some_and(|&(t, _, _)| t < cutoff) {
        q.pop_front();
    }
}

fn in_window_values(q: &VecDeque<(f64, f64)>, cutoff: f64) -> Vec<f64> {
    q.iter()
        .filter(|&&(t, _)| t >= cutoff)
        .map(|&(_, v)| v)
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn empty_buffers_report_zeros() {
        let m = MetricBuffers::new().compute(10.0, 10.0, &[]);
        assert_eq!(m, EvalMetrics::default());
    }

    #[test]
    fn aoi_ages_from_entry_until_first_match() {
        let mut b = MetricBuffers::new();
        let swimmers = [(SwimmerId(0), 2.0)];
        let m = b.compute(8.0, 10.0, &swimmers);
        assert_abs_diff_eq!(m.avg_aoi_sec, 6.0, epsilon = 1e-12);

        b.record_match(7.5, SwimmerId(0));
        let m = b.compute(8.0, 10.0, &swimmers);
        assert_abs_diff_eq!(m.avg_aoi_sec, 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(m.tracking_rate, 1.0);
    }

    #[test]
    fn same_millisecond_matches_deduplicate() {
        let mut b = MetricBuffers::new();
        b.record_match(5.0001, SwimmerId(0));
        b.record_match(5.0004, SwimmerId(0)); // same 1 ms bucket
        b.record_match(5.1, SwimmerId(0));
        let m = b.compute(6.0, 10.0, &[(SwimmerId(0), 0.0)]);
        // 2 deduplicated events over 10 s for one swimmer
        assert_abs_diff_eq!(m.avg_scan_rate_hz, 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(m.avg_revisit_interval_sec, 0.0999, epsilon = 1e-9);
    }

    #[test]
    fn fps_uses_frame_intervals() {
        let mut b = MetricBuffers::new();
        for &t in &[6.18, 12.36, 18.54] {
            b.record_frame(SonarId(0), t);
        }
        let m = b.compute(20.0, 10.0, &[]);
        // Frames at 12.36 and 18.54 fall inside [10, 20]: one 6.18 s gap.
        assert_abs_diff_eq!(m.fps, 1.0 / 6.18, epsilon = 1e-9);
    }

    #[test]
    fn confusion_ratios_follow_the_window() {
        let mut b = MetricBuffers::new();
        b.record_paper_frame(
            1.0,
            IouFrameStats {
                tp: 3,
                fp: 1,
                fn_: 1,
                iou_sum: 1.8,
            },
        );
        let m = b.compute(5.0, 10.0, &[]);
        assert_abs_diff_eq!(m.precision, 0.75);
        assert_abs_diff_eq!(m.recall, 0.75);
        assert_abs_diff_eq!(m.mdr, 0.25);
        assert_abs_diff_eq!(m.mean_iou, 0.6);
        assert_abs_diff_eq!(m.f1, 0.75);

        // Outside the window nothing remains.
        let m = b.compute(20.0, 5.0, &[]);
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.mdr, 0.0);
    }

    #[test]
    fn ttfd_censors_undetected_swimmers() {
        let mut b = MetricBuffers::new();
        b.record_match(4.0, SwimmerId(0));
        let swimmers = [(SwimmerId(0), 3.0), (SwimmerId(1), 6.0)];
        let m = b.compute(10.0, 10.0, &swimmers);
        // detected: 4 − 3 = 1 s; censored: 10 − 6 = 4 s
        assert_abs_diff_eq!(m.avg_time_to_first_detection_sec, 2.5, epsilon = 1e-12);
    }

    #[test]
    fn prune_drops_old_events_only() {
        let mut b = MetricBuffers::new();
        b.record_false_alarms(1.0, 2);
        b.record_false_alarms(70.0, 1);
        b.prune(70.0);
        let m = b.compute(70.0, 60.0, &[]);
        assert_abs_diff_eq!(m.false_alarms_per_sec, 1.0 / 60.0, epsilon = 1e-12);
    }

    #[test]
    fn removing_a_swimmer_clears_its_state() {
        let mut b = MetricBuffers::new();
        b.record_match(5.0, SwimmerId(9));
        b.remove_swimmer(SwimmerId(9));
        let m = b.compute(6.0, 10.0, &[(SwimmerId(9), 5.5)]);
        assert_abs_diff_eq!(m.avg_aoi_sec, 0.5, epsilon = 1e-12);
        assert_eq!(m.tracking_rate, 0.0);
    }
}
