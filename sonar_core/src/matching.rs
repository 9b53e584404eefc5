//! Candidate ↔ ground-truth association for one finalized frame.
//!
//! Two independent matchings run on every frame:
//! - **IoU matching** — the paper metric: polar-bbox IoU gated additionally
//!   by Cartesian distance, greedy by descending IoU, one-to-one. Feeds
//!   precision / recall / F1 / MDR / mean-IoU.
//! - **Distance matching** — the tracker metric: Cartesian distance gate,
//!   greedy by ascending distance, one-to-one. Feeds AoI, localization
//!   error, first-detection and the Kalman tracks.
//!
//! Both resolve conflicts with claimed-sets over a sorted pair list, so the
//! result is deterministic for a deterministic input order.

use crate::config::{
    self, BLOB_RADIUS_BINS, IOU_MATCH_THRESHOLD, MATCH_GATE_RADIUS_M, PING_FOV_DEG,
    SWIMMER_DIAMETER_M,
};
use crate::detect::{Candidate, PolarBox};
use crate::types::{SwimmerId, Vec2};

/// Ground truth for one swimmer inside the frame's sector.
#[derive(Clone, Copy, Debug)]
pub struct TruthObs {
    pub id: SwimmerId,
    pub pos: Vec2,
    /// Absolute bearing from the sonar (deg).
    pub bearing_deg: f64,
    /// Distance from the sonar (m).
    pub range_m: f64,
}

/// Polar bbox a perfect detector would draw around a swimmer: at least the
/// beam footprint, widened to the swimmer's angular/radial subtense.
pub fn truth_polar_box(t: &TruthObs) -> PolarBox {
    let range_step = config::range_step_m();
    let half_angle_deg = (PING_FOV_DEG / 2.0)
        .max(((SWIMMER_DIAMETER_M / 2.0) / t.range_m.max(1e-6)).atan().to_degrees());
    let half_range_m = (BLOB_RADIUS_BINS * range_step).max(SWIMMER_DIAMETER_M / 2.0);
    PolarBox {
        angle_min_deg: t.bearing_deg - half_angle_deg,
        angle_max_deg: t.bearing_deg + half_angle_deg,
        range_min_m: t.range_m - half_range_m,
        range_max_m: t.range_m + half_range_m,
    }
}

/// Per-frame confusion counts from the IoU matcher.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct IouFrameStats {
    pub tp: u32,
    pub fp: u32,
    pub fn_: u32,
    pub iou_sum: f64,
}

/// Greedy one-to-one IoU matching, gated by `IOU_MATCH_THRESHOLD` and the
/// Cartesian match gate.
pub fn iou_match(candidates: &[Candidate], truths: &[TruthObs]) -> IouFrameStats {
    let mut pairs: Vec<(usize, usize, f64)> = Vec::new();
    for (ci, c) in candidates.iter().enumerate() {
        for (ti, t) in truths.iter().enumerate() {
            if (c.pos - t.pos).norm() > MATCH_GATE_RADIUS_M {
                continue;
            }
            let iou = c.bbox.iou(&truth_polar_box(t));
            if iou >= IOU_MATCH_THRESHOLD {
                pairs.push((ci, ti, iou));
            }
        }
    }
    pairs.sort_by(|a, b| {
        b.2.partial_cmp(&a.2)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
            .then(a.1.cmp(&b.1))
    });

    let mut cand_taken = vec![false; candidates.len()];
    let mut truth_taken = vec![false; truths.len()];
    let mut stats = IouFrameStats::default();
    for (ci, ti, iou) in pairs {
        if cand_taken[ci] || truth_taken[ti] {
            continue;
        }
        cand_taken[ci] = true;
        truth_taken[ti] = true;
        stats.tp += 1;
        stats.iou_sum += iou;
    }
    stats.fp = cand_taken.iter().filter(|&&t| !t).count() as u32;
    stats.fn_ = truth_taken.iter().filter(|&&t| !t).count() as u32;
    stats
}

/// One accepted candidate↔swimmer pair from the distance matcher.
#[derive(Clone, Copy, Debug)]
pub struct DistancePair {
    pub cand_idx: usize,
    pub swimmer: SwimmerId,
    pub truth_pos: Vec2,
    pub dist_m: f64,
}

/// Greedy one-to-one nearest-first matching under the Cartesian gate.
/// Returns accepted pairs plus the indices of unmatched candidates
/// (this frame's false alarms).
pub fn distance_match(
    candidates: &[Candidate],
    truths: &[TruthObs],
) -> (Vec<DistancePair>, Vec<usize>) {
    let mut pairs: Vec<(usize, usize, f64)> = Vec::new();
    for (ci, c) in candidates.iter().enumerate() {
        for (ti, t) in truths.iter().enumerate() {
            let d = (c.pos - t.pos).norm();
            if d <= MATCH_GATE_RADIUS_M {
                pairs.push((ci, ti, d));
            }
        }
    }
    pairs.sort_by(|a, b| {
        a.2.partial_cmp(&b.2)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
            .then(a.1.cmp(&b.1))
    });

    let mut cand_taken = vec![false; candidates.len()];
    let mut truth_taken = vec![false; truths.len()];
    let mut accepted = Vec::new();
    for (ci, ti, d) in pairs {
        if cand_taken[ci] || truth_taken[ti] {
            continue;
        }
        cand_taken[ci] = true;
        truth_taken[ti] = true;
        accepted.push(DistancePair {
            cand_idx: ci,
            swimmer: truths[ti].id,
            truth_pos: truths[ti].pos,
            dist_m: d,
        });
    }
    let false_alarms = (0..candidates.len()).filter(|&i| !cand_taken[i]).collect();
    (accepted, false_alarms)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(pos: Vec2, bbox: PolarBox) -> Candidate {
        Candidate {
            angle_deg: (bbox.angle_min_deg + bbox.angle_max_deg) / 2.0,
            range_m: (bbox.range_min_m + bbox.range_max_m) / 2.0,
            pos,
            meas_sigma: 0.3,
            bbox,
            cells: 10,
            sum_intensity: 20.0,
        }
    }

    fn truth(id: u64, pos: Vec2, bearing: f64, range: f64) -> TruthObs {
        TruthObs {
            id: SwimmerId(id),
            pos,
            bearing_deg: bearing,
            range_m: range,
        }
    }

    #[test]
    fn truth_box_never_narrower_than_the_beam() {
        let far = truth(0, Vec2::new(10.0, 40.0), 30.0, 40.0);
        let b = truth_polar_box(&far);
        assert!(b.angle_max_deg - b.angle_min_deg >= PING_FOV_DEG);
    }

    #[test]
    fn iou_match_counts_hits_and_misses() {
        let t = truth(0, Vec2::new(10.0, 20.0), 45.0, 22.0);
        let good = cand(Vec2::new(10.2, 20.1), truth_polar_box(&t));
        // A candidate far outside the gate, boxes disjoint.
        let bad = cand(
            Vec2::new(2.0, 2.0),
            PolarBox {
                angle_min_deg: 80.0,
                angle_max_deg: 83.0,
                range_min_m: 2.0,
                range_max_m: 3.0,
            },
        );
        let stats = iou_match(&[good, bad], &[t]);
        assert_eq!(stats.tp, 1);
        assert_eq!(stats.fp, 1);
        assert_eq!(stats.fn_, 0);
        assert!(stats.iou_sum > 0.0);
    }

    #[test]
    fn iou_match_is_one_to_one() {
        let t = truth(0, Vec2::new(10.0, 20.0), 45.0, 22.0);
        let c1 = cand(Vec2::new(10.1, 20.0), truth_polar_box(&t));
        let c2 = cand(Vec2::new(10.3, 20.2), truth_polar_box(&t));
        let stats = iou_match(&[c1, c2], &[t]);
        assert_eq!(stats.tp, 1, "one truth can absorb only one candidate");
        assert_eq!(stats.fp, 1);
    }

    #[test]
    fn distance_match_prefers_the_nearest_pair() {
        let t = truth(3, Vec2::new(5.0, 5.0), 45.0, 7.0);
        let near = cand(
            Vec2::new(5.2, 5.0),
            truth_polar_box(&t),
        );
        let far = cand(
            Vec2::new(6.5, 5.0),
            truth_polar_box(&t),
        );
        let (accepted, fas) = distance_match(&[far, near], &[t]);
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].cand_idx, 1, "nearest candidate wins");
        assert_eq!(fas, vec![0]);
    }

    #[test]
    fn distance_match_respects_the_gate() {
        let t = truth(1, Vec2::new(5.0, 5.0), 45.0, 7.0);
        let outside = cand(Vec2::new(9.0, 5.0), truth_polar_box(&t));
        let (accepted, fas) = distance_match(&[outside], &[t]);
        assert!(accepted.is_empty());
        assert_eq!(fas, vec![0]);
    }
}
