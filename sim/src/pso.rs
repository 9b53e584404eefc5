//! Cross-sonar assignment by particle-swarm optimization.
//!
//! Decision variables: one continuous value per track in `[0, m−1]`,
//! rounded to a sonar index. The cost of a candidate assignment is the
//! slowest sonar's estimated optimized cycle duration — padded per-target
//! scan intervals merged after sorting, slews across the gaps, times two
//! for the return pass — plus a fixed penalty for every track assigned to
//! a sonar whose sector cannot see it. Minimizing the maximum keeps every
//! swimmer's revisit interval bounded instead of optimizing the average.
//!
//! The swarm is seeded from the named stream
//! `pso|{floor(now / interval)}|{n_tracks}`, so replanning at the same
//! wall-clock bucket with the same track count reproduces exactly.

use sensor_models::sonar::{effective_scan_speed, SonarParams};
use sonar_core::config::{
    MAX_RANGE_NAIVE_M, PSO_COGNITIVE, PSO_INERTIA, PSO_INVALID_PENALTY_S, PSO_ITERATIONS,
    PSO_SOCIAL, PSO_SWARM_SIZE, PSO_UPDATE_INTERVAL_S, SLEW_SPEED_DEG_S,
    TARGET_PADDING_ANGLE_DEG, TARGET_PADDING_RANGE_M,
};
use sonar_core::math::bearing_deg;
use sonar_core::rng::StreamRng;
use sonar_core::types::{SonarId, SwimmerId, Vec2};
use std::collections::BTreeMap;

/// Track geometry relative to one sonar.
#[derive(Clone, Copy, Debug)]
struct RelTarget {
    rel_deg: f64,
    dist_m: f64,
}

/// Estimated duration of one optimized scan cycle over `targets`
/// (given as relative bearing / distance pairs): merged padded intervals
/// scanned at their range-limited speed, slews across the gaps, ×2 for
/// the return pass. Empty assignments cost nothing.
fn cycle_duration_optimized(half_width_deg: f64, targets: &[RelTarget]) -> f64 {
    if targets.is_empty() {
        return 0.0;
    }
    let pad = TARGET_PADDING_ANGLE_DEG;
    let mut intervals: Vec<(f64, f64, f64)> = targets
        .iter()
        .map(|t| {
            (
                (t.rel_deg - pad).max(-half_width_deg),
                (t.rel_deg + pad).min(half_width_deg),
                (t.dist_m + TARGET_PADDING_RANGE_M).clamp(1.0, MAX_RANGE_NAIVE_M),
            )
        })
        .collect();
    intervals.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut merged: Vec<(f64, f64, f64)> = Vec::with_capacity(intervals.len());
    for iv in intervals {
        match merged.last_mut() {
            Some(last) if iv.0 <= last.1 => {
                last.1 = last.1.max(iv.1);
                last.2 = last.2.max(iv.2);
            }
            _ => merged.push(iv),
        }
    }

    let mut one_way = 0.0;
    let mut prev_hi: Option<f64> = None;
    for &(lo, hi, range) in &merged {
        if let Some(p) = prev_hi {
            one_way += (lo - p) / SLEW_SPEED_DEG_S;
        }
        one_way += (hi - lo) / effective_scan_speed(range);
        prev_hi = Some(hi);
    }
    2.0 * one_way
}

/// Assign tracks to sonars. Returns `sonar id → assigned track ids`; every
/// sonar appears, possibly with an empty list.
pub fn plan_assignments(
    targets: &[(SwimmerId, Vec2)],
    sonars: &[SonarParams],
    seed: u32,
    now: f64,
) -> BTreeMap<SonarId, Vec<SwimmerId>> {
    let mut out: BTreeMap<SonarId, Vec<SwimmerId>> = BTreeMap::new();
    for s in sonars {
        out.insert(s.id, Vec::new());
    }
    let n = targets.len();
    let m = sonars.len();
    if n == 0 || m == 0 {
        return out;
    }

    // Geometry of every track relative to every sonar, plus eligibility:
    // sonars whose sector covers the predicted bearing, else the closest.
    let rel: Vec<Vec<RelTarget>> = sonars
        .iter()
        .map(|s| {
            targets
                .iter()
                .map(|&(_, pos)| RelTarget {
                    rel_deg: s.relative_bearing(bearing_deg(s.position, pos)),
                    dist_m: (pos - s.position).norm(),
                })
                .collect()
        })
        .collect();
    let eligible: Vec<Vec<usize>> = (0..n)
        .map(|j| {
            let covering: Vec<usize> = (0..m)
                .filter(|&i| rel[i][j].rel_deg.abs() <= sonars[i].half_width_deg)
                .collect();
            if covering.is_empty() {
                let closest = (0..m)
                    .min_by(|&a, &b| {
                        rel[a][j]
                            .dist_m
                            .partial_cmp(&rel[b][j].dist_m)
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .unwrap_or(0);
                vec![closest]
            } else {
                covering
            }
        })
        .collect();

    let decode = |x: f64| -> usize { (x.round() as isize).clamp(0, m as isize - 1) as usize };
    let cost = |position: &[f64]| -> f64 {
        let mut per_sonar: Vec<Vec<RelTarget>> = vec![Vec::new(); m];
        let mut invalid = 0usize;
        for (j, &x) in position.iter().enumerate() {
            let s = decode(x);
            if !eligible[j].contains(&s) {
                invalid += 1;
            }
            per_sonar[s].push(rel[s][j]);
        }
        let worst = per_sonar
            .iter()
            .enumerate()
            .map(|(i, ts)| cycle_duration_optimized(sonars[i].half_width_deg, ts))
            .fold(0.0, f64::max);
        worst + PSO_INVALID_PENALTY_S * invalid as f64
    };

    let bucket = (now / PSO_UPDATE_INTERVAL_S).floor() as u64;
    let mut rng = StreamRng::keyed(seed, &format!("pso|{bucket}|{n}"));

    let hi = (m - 1) as f64;
    let mut positions: Vec<Vec<f64>> = (0..PSO_SWARM_SIZE)
        .map(|_| (0..n).map(|_| rng.range(0.0, hi.max(1e-9))).collect())
        .collect();
    let mut velocities: Vec<Vec<f64>> = (0..PSO_SWARM_SIZE)
        .map(|_| (0..n).map(|_| rng.range(-1.0, 1.0)).collect())
        .collect();
    let mut pbest = positions.clone();
    let mut pbest_cost: Vec<f64> = positions.iter().map(|p| cost(p)).collect();
    let gbest_idx = pbest_cost
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let mut gbest = pbest[gbest_idx].clone();
    let mut gbest_cost = pbest_cost[gbest_idx];

    for _ in 0..PSO_ITERATIONS {
        for p in 0..PSO_SWARM_SIZE {
            for j in 0..n {
                let r1 = rng.next_f64();
                let r2 = rng.next_f64();
                velocities[p][j] = PSO_INERTIA * velocities[p][j]
                    + PSO_COGNITIVE * r1 * (pbest[p][j] - positions[p][j])
                    + PSO_SOCIAL * r2 * (gbest[j] - positions[p][j]);
                positions[p][j] = (positions[p][j] + velocities[p][j]).clamp(0.0, hi);
            }
            let c = cost(&positions[p]);
            if c < pbest_cost[p] {
                pbest_cost[p] = c;
                pbest[p] = positions[p].clone();
                if c < gbest_cost {
                    gbest_cost = c;
                    gbest = positions[p].clone();
                }
            }
        }
    }

    // Decode the winner; any residual invalid choice falls back to the
    // first eligible sonar.
    for (j, &(id, _)) in targets.iter().enumerate() {
        let mut s = decode(gbest[j]);
        if !eligible[j].contains(&s) {
            s = eligible[j][0];
        }
        out.get_mut(&sonars[s].id).expect("sonar present").push(id);
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use sonar_core::config::SECTOR_HALF_WIDTH_DEG;

    #[test]
    fn empty_cycle_costs_nothing() {
        assert_eq!(cycle_duration_optimized(SECTOR_HALF_WIDTH_DEG, &[]), 0.0);
    }

    #[test]
    fn overlapping_intervals_merge() {
        let close = [
            RelTarget {
                rel_deg: 0.0,
                dist_m: 20.0,
            },
            RelTarget {
                rel_deg: 4.0,
                dist_m: 20.0,
            },
        ];
        // 4° apart with 6° padding: one merged interval of 16°.
        let merged_cost = cycle_duration_optimized(SECTOR_HALF_WIDTH_DEG, &close);
        let speed = effective_scan_speed(23.0);
        assert_abs_diff_eq!(merged_cost, 2.0 * 16.0 / speed, epsilon = 1e-9);
    }

    #[test]
    fn separated_intervals_pay_for_the_slew() {
        let spread = [
            RelTarget {
                rel_deg: -30.0,
                dist_m: 20.0,
            },
            RelTarget {
                rel_deg: 30.0,
                dist_m: 20.0,
            },
        ];
        // Padded intervals (−36°,−24°) and (24°,36°): 24° scanned, 48° slewed.
        let speed = effective_scan_speed(23.0);
        let expect = 2.0 * (2.0 * 12.0 / speed + 48.0 / SLEW_SPEED_DEG_S);
        assert_abs_diff_eq!(
            cycle_duration_optimized(SECTOR_HALF_WIDTH_DEG, &spread),
            expect,
            epsilon = 1e-9
        );
    }

    #[test]
    fn every_sonar_appears_in_the_output() {
        let sonars = SonarParams::corner_array();
        let out = plan_assignments(&[], &sonars, 1337, 1.0);
        assert_eq!(out.len(), 4);
        assert!(out.values().all(|v| v.is_empty()));
    }

    #[test]
    fn single_track_goes_to_a_covering_sonar() {
        let sonars = SonarParams::corner_array();
        let targets = [(SwimmerId(0), Vec2::new(5.0, 5.0))];
        let out = plan_assignments(&targets, &sonars, 1337, 1.0);
        let (owner, _) = out
            .iter()
            .find(|(_, v)| !v.is_empty())
            .expect("track assigned somewhere");
        let params = sonars.iter().find(|s| s.id == *owner).unwrap();
        let b = bearing_deg(params.position, targets[0].1);
        assert!(params.covers_bearing(b));
    }

    #[test]
    fn assignment_is_deterministic_for_a_bucket() {
        let sonars = SonarParams::corner_array();
        let targets = [
            (SwimmerId(0), Vec2::new(5.0, 5.0)),
            (SwimmerId(1), Vec2::new(15.0, 45.0)),
            (SwimmerId(2), Vec2::new(10.0, 25.0)),
        ];
        let a = plan_assignments(&targets, &sonars, 1337, 1.0);
        // 1.0 and 1.5 share the floor(now / 0.8) = 1 bucket.
        let b = plan_assignments(&targets, &sonars, 1337, 1.5);
        assert_eq!(a, b);
    }

    #[test]
    fn spread_tracks_use_more_than_one_sonar() {
        let sonars = SonarParams::corner_array();
        // One swimmer near each corner: serving all four from one sonar
        // would be far slower than spreading them.
        let targets = [
            (SwimmerId(0), Vec2::new(4.0, 6.0)),
            (SwimmerId(1), Vec2::new(16.0, 6.0)),
            (SwimmerId(2), Vec2::new(16.0, 44.0)),
            (SwimmerId(3), Vec2::new(4.0, 44.0)),
        ];
        let out = plan_assignments(&targets, &sonars, 1337, 1.0);
        let used = out.values().filter(|v| !v.is_empty()).count();
        assert!(used >= 2, "load must spread, got {used} sonar(s)");
    }
}
