//! The ping writer: one acoustic emission renders one angle column of the
//! sonar's polar frame.
//!
//! Each column carries, in order: the noise floor with Gaussian texture and
//! Pareto-like speckle, an occasional weak surface-wave band, the wall
//! reflection with a range-shifted multipath ghost, lane-rope echoes, and
//! finally swimmer echoes with their own ghosts. Ghosts and speckle exist
//! to produce realistic false alarms for the detection pipeline.
//!
//! Randomness comes from two named streams per ping: the static texture
//! stream and a separate `dyn` stream for the multipath artifacts, both
//! salted by sonar, frame, millisecond bucket, and angle column.

use crate::swimmer::Swimmer;
use sensor_models::geometry::{lane_crossings, wall_intersection};
use sensor_models::sonar::SonarParams;
use sonar_core::config::{
    angle_step_deg, range_step_m, Tuning, BLOB_RADIUS_BINS, ECHO_ATTEN_M, ECHO_STRENGTH,
    FRAME_ANGLE_BINS, FRAME_RANGE_BINS, GHOST_RANGE_OFFSET_M, GHOST_REL_STRENGTH,
    LANE_ECHO_SIGMA_BINS, LANE_ECHO_STRENGTH, NOISE_FLOOR, NOISE_STD, PING_FOV_DEG,
    SPECKLE_SHAPE, SPECKLE_STRENGTH, WALL_ECHO_SIGMA_BINS, WALL_ECHO_STRENGTH, WEAK_BAND_PROB,
    WEAK_BAND_SIGMA_BINS, WEAK_BAND_STRENGTH,
};
use sonar_core::frame::FrameBuffers;
use sonar_core::math::{ang_diff_deg, bearing_deg};
use sonar_core::rng::StreamRng;

/// World state visible to a single ping.
#[derive(Clone, Copy, Debug)]
pub struct PingEnv<'a> {
    pub seed: u32,
    pub tuning: &'a Tuning,
    pub swimmers: &'a [Swimmer],
}

/// Render one ping at `bearing_deg` into the frame.
pub fn write_ping(
    frame: &mut FrameBuffers,
    sonar: &SonarParams,
    scan_range_m: f64,
    bearing_deg_abs: f64,
    time_s: f64,
    env: &PingEnv,
) {
    let rel = sonar.relative_bearing(bearing_deg_abs);
    let a_idx = (((rel + sonar.half_width_deg) / angle_step_deg()).floor() as isize)
        .clamp(0, FRAME_ANGLE_BINS as isize - 1) as usize;
    let r_max = ((scan_range_m / range_step_m()).floor() as usize).min(FRAME_RANGE_BINS - 1);

    let bucket_ms = (time_s * 1000.0).floor() as u64;
    let sid = sonar.id.0;
    let fid = frame.frame_id;
    let mut rng = StreamRng::keyed(env.seed, &format!("ping|{sid}|{fid}|{bucket_ms}|{a_idx}"));
    let mut rng_dyn = StreamRng::keyed(env.seed, &format!("dyn|{sid}|{fid}|{bucket_ms}|{a_idx}"));

    let col = frame.observe_column(a_idx);

    // Noise floor, Gaussian texture, speckle impulses.
    let noise_std = NOISE_STD * env.tuning.noise_scale;
    for cell in col.iter_mut().take(r_max + 1) {
        let mut v = (NOISE_FLOOR + rng.gaussian() * noise_std).max(0.0);
        if rng.next_f64() < env.tuning.speckle_prob {
            let u = rng.next_f64();
            v += SPECKLE_STRENGTH * ((1.0 - u).powf(-1.0 / SPECKLE_SHAPE) - 1.0);
        }
        *cell = v as f32;
    }

    // Occasional weak band from surface waves / shallow multipath.
    if rng.next_f64() < WEAK_BAND_PROB {
        let center = rng.next_f64() * r_max as f64;
        add_gaussian(col, r_max, center, WEAK_BAND_SIGMA_BINS, WEAK_BAND_STRENGTH);
    }

    // Wall reflection and its range-shifted ghost.
    if let Some(wall_dist) = wall_intersection(sonar.position, bearing_deg_abs) {
        if wall_dist <= scan_range_m {
            add_gaussian(
                col,
                r_max,
                wall_dist / range_step_m(),
                WALL_ECHO_SIGMA_BINS,
                WALL_ECHO_STRENGTH,
            );
            let ghost_dist =
                wall_dist + GHOST_RANGE_OFFSET_M * (0.6 + 0.8 * rng_dyn.next_f64());
            add_gaussian(
                col,
                r_max,
                ghost_dist / range_step_m(),
                WALL_ECHO_SIGMA_BINS,
                WALL_ECHO_STRENGTH * GHOST_REL_STRENGTH,
            );
        }
    }

    // Lane ropes crossed by this bearing.
    for dist in lane_crossings(sonar.position, bearing_deg_abs, scan_range_m) {
        add_gaussian(
            col,
            r_max,
            dist / range_step_m(),
            LANE_ECHO_SIGMA_BINS,
            LANE_ECHO_STRENGTH,
        );
    }

    // Swimmer echoes within the beam, with ghosts.
    for sw in env.swimmers {
        let to_swimmer = bearing_deg(sonar.position, sw.pos);
        if ang_diff_deg(to_swimmer, bearing_deg_abs).abs() > PING_FOV_DEG / 2.0 {
            continue;
        }
        let dist = (sw.pos - sonar.position).norm();
        if dist > scan_range_m {
            continue;
        }
        let amp = ECHO_STRENGTH * (-dist / ECHO_ATTEN_M).exp();
        add_gaussian(col, r_max, dist / range_step_m(), BLOB_RADIUS_BINS, amp);
        let ghost_dist = dist + GHOST_RANGE_OFFSET_M * (0.6 + 0.8 * rng_dyn.next_f64());
        add_gaussian(
            col,
            r_max,
            ghost_dist / range_step_m(),
            BLOB_RADIUS_BINS,
            amp * GHOST_REL_STRENGTH,
        );
    }
}

/// Add a Gaussian bump centered at `center` (continuous bins, cell-center
/// convention) to the column, out to 4σ, never past `r_max`.
fn add_gaussian(col: &mut [f32], r_max: usize, center: f64, sigma: f64, amp: f64) {
    let lo = ((center - 4.0 * sigma).floor().max(0.0)) as usize;
    let hi = ((center + 4.0 * sigma).ceil() as usize).min(r_max);
    let denom = 2.0 * sigma * sigma;
    for r in lo..=hi {
        let d = (r as f64 + 0.5) - center;
        col[r] += (amp * (-d * d / denom).exp()) as f32;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
