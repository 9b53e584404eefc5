//! Frame finalization: the detection pipeline run once per completed scan
//! segment.
//!
//! # Processing steps per frame
//! 1. Warmup shortcut — seed the background and bail out while the pool
//!    is known to be empty
//! 2. Background subtraction
//! 3. Weak-echo elimination (strided percentile threshold)
//! 4. Adaptive dual-kernel search: edge-aware majority filter at width k
//!    and k+4, DBSCAN on the small mask, physical-plausibility filtering;
//!    grow k only while nothing plausible survives
//! 5. Candidate construction (centroid → world position, measurement
//!    sigma, deterministic jitter, pool clamp)
//! 6. Background EMA update on observed columns with positive-deviation
//!    slack
//!
//! The adaptive search implements the observation that a small kernel
//! preserves human-sized blobs while the larger cross-check kernel
//! suppresses elongated noise streaks; widths above `KERNEL_CAP_LIMIT`
//! start eating the blobs themselves.

use crate::config::{self, Tuning};
use crate::frame::{FrameBuffers, FRAME_CELLS};
use crate::math::{dir_of_deg, percentile};
use crate::rng::StreamRng;
use crate::types::Vec2;
use std::collections::VecDeque;

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// Axis-aligned box in polar image space: absolute degrees × meters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PolarBox {
    pub angle_min_deg: f64,
    pub angle_max_deg: f64,
    pub range_min_m: f64,
    pub range_max_m: f64,
}

impl PolarBox {
    /// Intersection-over-union in (deg × m) space.
    pub fn iou(&self, other: &PolarBox) -> f64 {
        let aw = (self.angle_max_deg.min(other.angle_max_deg)
            - self.angle_min_deg.max(other.angle_min_deg))
        .max(0.0);
        let rw = (self.range_max_m.min(other.range_max_m)
            - self.range_min_m.max(other.range_min_m))
        .max(0.0);
        let inter = aw * rw;
        if inter == 0.0 {
            return 0.0;
        }
        let area_a = (self.angle_max_deg - self.angle_min_deg) * (self.range_max_m - self.range_min_m);
        let area_b =
            (other.angle_max_deg - other.angle_min_deg) * (other.range_max_m - other.range_min_m);
        inter / (area_a + area_b - inter)
    }
}

/// A surviving cluster, localized and ready for matching.
#[derive(Clone, Debug)]
pub struct Candidate {
    /// Absolute bearing of the amplitude-weighted centroid (deg).
    pub angle_deg: f64,
    /// Range of the centroid (m).
    pub range_m: f64,
    /// World position after jitter and pool clamp.
    pub pos: Vec2,
    /// 1σ localization uncertainty (m).
    pub meas_sigma: f64,
    /// Cluster bounding box in polar image space.
    pub bbox: PolarBox,
    /// Cluster size in cells.
    pub cells: usize,
    /// Total subtracted intensity of the cluster.
    pub sum_intensity: f64,
}

/// Everything the pipeline needs to know about the frame's sonar.
#[derive(Clone, Copy, Debug)]
pub struct FrameContext {
    pub seed: u32,
    pub sonar_id: u32,
    /// Mount position in world coordinates.
    pub sonar_pos: Vec2,
    /// Absolute bearing of angle column 0 (deg).
    pub sector_min_deg: f64,
    /// Frame counter of the finalized frame; salts the jitter stream.
    pub frame_id: u64,
    /// Millisecond bucket of the finalization time; salts the jitter stream.
    pub time_bucket_ms: u64,
}

// ---------------------------------------------------------------------------
// Pipeline entry
// ---------------------------------------------------------------------------

/// Run the detection pipeline on a completed frame. Returns at most
/// `MAX_CLUSTERS_PER_FRAME` candidates, strongest first.
pub fn finalize_frame(
    frame: &mut FrameBuffers,
    tuning: &Tuning,
    ctx: &FrameContext,
    any_swimmers: bool,
) -> Vec<Candidate> {
    // Step 1: warmup — consume the frame to seed the background.
    if frame.warmup_frames_left > 0 && !any_swimmers {
        for i in 0..FRAME_CELLS {
            let d = frame.intensity[i] - frame.background[i];
            frame.background[i] += (config::WARMUP_ALPHA as f32) * d;
        }
        frame.warmup_frames_left -= 1;
        return Vec::new();
    }

    // Step 2: background subtraction.
    for i in 0..FRAME_CELLS {
        frame.subtracted[i] = (frame.intensity[i] - frame.background[i]).max(0.0);
    }

    // Step 3: weak-echo elimination.
    let sample: Vec<f64> = frame
        .subtracted
        .iter()
        .step_by(config::WEAK_ECHO_SAMPLE_STRIDE)
        .map(|&v| v as f64)
        .collect();
    let quantile = percentile(&sample, config::WEAK_ECHO_PERCENTILE);
    let threshold = tuning.threshold.max(config::WEAK_ECHO_MIN.max(quantile));
    for i in 0..FRAME_CELLS {
        frame.mask[i] = (frame.subtracted[i] as f64 >= threshold) as u8;
    }

    // Step 4: adaptive dual-kernel search.
    let cap = tuning.kernel_cap;
    let mut survivors: Vec<ClusterStats> = Vec::new();
    let mut k = 3usize;
    while k <= cap {
        majority_filter(
            &frame.mask,
            &mut frame.mask_small,
            config::FRAME_ANGLE_BINS,
            config::FRAME_RANGE_BINS,
            k,
        );
        majority_filter(
            &frame.mask,
            &mut frame.mask_large,
            config::FRAME_ANGLE_BINS,
            config::FRAME_RANGE_BINS,
            cap.min(k + 4),
        );
        let n_clusters = dbscan(
            &frame.mask_small,
            &mut frame.labels,
            config::FRAME_ANGLE_BINS,
            config::FRAME_RANGE_BINS,
            tuning.dbscan_eps_bins,
            tuning.dbscan_min_pts,
        );
        let stats = collect_clusters(frame, n_clusters);
        survivors = stats.into_iter().filter(passes_physical_filter).collect();
        if !survivors.is_empty() {
            break;
        }
        k += 2;
    }

    // Strongest clusters first, capped.
    survivors.sort_by(|a, b| {
        b.sum_i
            .partial_cmp(&a.sum_i)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.label.cmp(&b.label))
    });
    survivors.truncate(config::MAX_CLUSTERS_PER_FRAME);

    // Step 5: candidate construction.
    let candidates: Vec<Candidate> = survivors
        .iter()
        .enumerate()
        .map(|(i, s)| build_candidate(i, s, threshold, tuning, ctx))
        .collect();

    // Step 6: background update on observed columns only. Cells that rose
    // more than the slack above background are withheld so targets do not
    // burn into the model.
    let alpha = config::BACKGROUND_ALPHA as f32;
    let slack = config::BACKGROUND_UPDATE_SLACK as f32;
    for a in 0..config::FRAME_ANGLE_BINS {
        if !frame.observed_angles[a] {
            continue;
        }
        for r in 0..config::FRAME_RANGE_BINS {
            let i = FrameBuffers::idx(a, r);
            if frame.intensity[i] <= frame.background[i] + slack {
                frame.background[i] += alpha * (frame.intensity[i] - frame.background[i]);
            }
        }
    }

    candidates
}

// ---------------------------------------------------------------------------
// Majority filter
// ---------------------------------------------------------------------------

/// Range-direction 1-D edge-aware majority filter.
///
/// For each angle row, `dst[r] = 1` iff the number of set cells in the
/// window of nominal width `window` centered on `r` — truncated at the row
/// edges — exceeds `floor(len/2)` of the truncated length. Computed with a
/// sliding sum, O(R) per row.
pub fn majority_filter(src: &[u8], dst: &mut [u8], a_bins: usize, r_bins: usize, window: usize) {
    let half = window / 2;
    for a in 0..a_bins {
        let row = &src[a * r_bins..(a + 1) * r_bins];
        let out = &mut dst[a * r_bins..(a + 1) * r_bins];
        let mut lo = 0usize;
        let mut hi = half.min(r_bins - 1);
        let mut sum: usize = row[lo..=hi].iter().map(|&v| v as usize).sum();
        for r in 0..r_bins {
            let want_lo = r.saturating_sub(half);
            let want_hi = (r + half).min(r_bins - 1);
            while lo < want_lo {
                sum -= row[lo] as usize;
                lo += 1;
            }
            while hi < want_hi {
                hi += 1;
                sum += row[hi] as usize;
            }
            let len = hi - lo + 1;
            out[r] = (sum > len / 2) as u8;
        }
    }
}

// ---------------------------------------------------------------------------
// DBSCAN on the polar mask
// ---------------------------------------------------------------------------

/// DBSCAN over set cells of `mask` with Euclidean distance on
/// `(a_idx, r_idx)`. Writes labels (0 unvisited → -1 noise / ≥1 cluster id)
/// and returns the cluster count. Noise points reached from a core cell are
/// reclassified as border members.
pub fn dbscan(
    mask: &[u8],
    labels: &mut [i32],
    a_bins: usize,
    r_bins: usize,
    eps: f64,
    min_pts: usize,
) -> usize {
    labels.fill(0);

    // Neighborhood stencil within eps, center included.
    let reach = eps.floor() as i32;
    let eps_sq = eps * eps;
    let mut offsets: Vec<(i32, i32)> = Vec::new();
    for da in -reach..=reach {
        for dr in -reach..=reach {
            if (da * da + dr * dr) as f64 <= eps_sq {
                offsets.push((da, dr));
            }
        }
    }

    let neighbors = |idx: usize, out: &mut Vec<usize>| {
        out.clear();
        let a = (idx / r_bins) as i32;
        let r = (idx % r_bins) as i32;
        for &(da, dr) in &offsets {
            let (na, nr) = (a + da, r + dr);
            if na < 0 || nr < 0 || na >= a_bins as i32 || nr >= r_bins as i32 {
                continue;
            }
            let j = na as usize * r_bins + nr as usize;
            if mask[j] != 0 {
                out.push(j);
            }
        }
    };

    let mut scratch: Vec<usize> = Vec::new();
    let mut queue: VecDeque<usize> = VecDeque::new();
    let mut next_label = 0i32;

    for i in 0..a_bins * r_bins {
        if mask[i] == 0 || labels[i] != 0 {
            continue;
        }
        neighbors(i, &mut scratch);
        if scratch.len() < min_pts {
            labels[i] = -1;
            continue;
        }
        next_label += 1;
        labels[i] = next_label;
        queue.clear();
        queue.extend(scratch.iter().copied());
        while let Some(j) = queue.pop_front() {
            if labels[j] == -1 {
                // Border: reachable from a core cell but not core itself.
                labels[j] = next_label;
                continue;
            }
            if labels[j] != 0 {
                continue;
            }
            labels[j] = next_label;
            neighbors(j, &mut scratch);
            if scratch.len() >= min_pts {
                queue.extend(scratch.iter().copied());
            }
        }
    }
    next_label as usize
}

// ---------------------------------------------------------------------------
// Cluster statistics and plausibility
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug)]
struct ClusterStats {
    label: i32,
    cells: usize,
    sum_i: f64,
    /// Amplitude-weighted centroid in continuous bins (cell centers).
    cent_a: f64,
    cent_r: f64,
    a_min: usize,
    a_max: usize,
    r_min: usize,
    r_max: usize,
    overlap_cells: usize,
}

fn collect_clusters(frame: &FrameBuffers, n_clusters: usize) -> Vec<ClusterStats> {
    let mut stats: Vec<ClusterStats> = (0..n_clusters)
        .map(|l| ClusterStats {
            label: l as i32 + 1,
            cells: 0,
            sum_i: 0.0,
            cent_a: 0.0,
            cent_r: 0.0,
            a_min: usize::MAX,
            a_max: 0,
            r_min: usize::MAX,
            r_max: 0,
            overlap_cells: 0,
        })
        .collect();

    for a in 0..config::FRAME_ANGLE_BINS {
        for r in 0..config::FRAME_RANGE_BINS {
            let i = FrameBuffers::idx(a, r);
            let label = frame.labels[i];
            if label <= 0 {
                continue;
            }
            let s = &mut stats[(label - 1) as usize];
            let w = frame.subtracted[i] as f64;
            s.cells += 1;
            s.sum_i += w;
            s.cent_a += w * (a as f64 + 0.5);
            s.cent_r += w * (r as f64 + 0.5);
            s.a_min = s.a_min.min(a);
            s.a_max = s.a_max.max(a);
            s.r_min = s.r_min.min(r);
            s.r_max = s.r_max.max(r);
            s.overlap_cells += (frame.mask_large[i] != 0) as usize;
        }
    }

    for s in &mut stats {
        if s.sum_i > 0.0 {
            s.cent_a /= s.sum_i;
            s.cent_r /= s.sum_i;
        } else if s.cells > 0 {
            s.cent_a = (s.a_min + s.a_max) as f64 / 2.0 + 0.5;
            s.cent_r = (s.r_min + s.r_max) as f64 / 2.0 + 0.5;
        }
    }
    stats.retain(|s| s.cells > 0);
    stats
}

/// Keep clusters whose shape could be a swimmer: enough of the cluster
/// must survive the large kernel, and the metric extents and aspect must
/// fall inside the plausible human envelope.
fn passes_physical_filter(s: &ClusterStats) -> bool {
    if (s.overlap_cells as f64) < config::DENOISE_OVERLAP_MIN * s.cells as f64 {
        return false;
    }
    let angle_span_deg = (s.a_max - s.a_min + 1) as f64 * config::angle_step_deg();
    let range_at_cent = s.cent_r * config::range_step_m();
    let cross = range_at_cent * angle_span_deg.to_radians();
    let extent = (s.r_max - s.r_min + 1) as f64 * config::range_step_m();
    if !(config::MIN_CROSS_RANGE_M..=config::MAX_CROSS_RANGE_M).contains(&cross) {
        return false;
    }
    if !(config::MIN_RANGE_EXTENT_M..=config::MAX_RANGE_EXTENT_M).contains(&extent) {
        return false;
    }
    let aspect = cross / extent;
    (config::MIN_ASPECT..=config::MAX_ASPECT).contains(&aspect)
}

fn build_candidate(
    i: usize,
    s: &ClusterStats,
    threshold: f64,
    tuning: &Tuning,
    ctx: &FrameContext,
) -> Candidate {
    let angle_step = config::angle_step_deg();
    let range_step = config::range_step_m();

    let angle_deg = ctx.sector_min_deg + s.cent_a * angle_step;
    let range_m = s.cent_r * range_step;

    // Quantization noise of one polar cell, range and arc combined.
    let inv_sqrt12 = 1.0 / 12f64.sqrt();
    let quant_r = range_step * inv_sqrt12;
    let quant_arc = range_m * angle_step.to_radians() * inv_sqrt12;
    let quant_std = (quant_r * quant_r + quant_arc * quant_arc).sqrt();
    let noise_sigma = config::NOISE_TO_MEAS_SIGMA_M
        * (config::NOISE_STD * tuning.noise_scale / threshold.max(0.05));
    let meas_sigma =
        config::MEAS_SIGMA_BASE_M + config::MEAS_SIGMA_PER_M * range_m + quant_std + noise_sigma;

    let mut rng = StreamRng::keyed(
        ctx.seed,
        &format!(
            "meas|{}|{}|{}|{}",
            ctx.sonar_id, ctx.frame_id, ctx.time_bucket_ms, i
        ),
    );
    let jitter = meas_sigma * config::MEAS_JITTER_SCALE;
    let raw = ctx.sonar_pos + dir_of_deg(angle_deg) * range_m;
    let pos = Vec2::new(
        (raw.x + rng.gaussian() * jitter).clamp(0.0, config::POOL_WIDTH_M),
        (raw.y + rng.gaussian() * jitter).clamp(0.0, config::POOL_LENGTH_M),
    );

    Candidate {
        angle_deg,
        range_m,
        pos,
        meas_sigma,
        bbox: PolarBox {
            angle_min_deg: ctx.sector_min_deg + s.a_min as f64 * angle_step,
            angle_max_deg: ctx.sector_min_deg + (s.a_max + 1) as f64 * angle_step,
            range_min_m: s.r_min as f64 * range_step,
            range_max_m: (s.r_max + 1) as f64 * range_step,
        },
        cells: s.cells,
        sum_intensity: s.sum_i,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
