use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::game::judgment::{HitRecord, JudgePhase};
use crate::game::timing_windows::Rating;

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct TimingStats {
    pub mean_abs_ms: f64,
    pub mean_ms: f64,
    pub stddev_ms: f64,
    pub max_abs_ms: f64,
    pub count: usize,
}

/// Attack deltas of every successful hit; misses carry no offset.
#[inline(always)]
fn hit_offsets(records: &[HitRecord]) -> impl Iterator<Item = f64> + '_ {
    records
        .iter()
        .filter(|r| r.phase == JudgePhase::Attack && r.rating != Rating::Miss)
        .filter_map(|r| r.hit_delta_ms)
        .map(|d| d as f64)
}

pub fn compute_timing_stats(records: &[HitRecord]) -> TimingStats {
    // First pass: sums and maxima
    let mut sum_abs = 0.0_f64;
    let mut sum_signed = 0.0_f64;
    let mut max_abs = 0.0_f64;
    let mut count: usize = 0;
    for e in hit_offsets(records) {
        let a = e.abs();
        sum_abs += a;
        sum_signed += e;
        if a > max_abs {
            max_abs = a;
        }
        count += 1;
    }
    if count == 0 {
        return TimingStats::default();
    }

    let mean_ms = sum_signed / count as f64;
    let mean_abs_ms = sum_abs / count as f64;

    // Second pass: sample standard deviation of signed offsets
    let stddev_ms = if count > 1 {
        let sum_diff_sq: f64 = hit_offsets(records)
            .map(|e| {
                let d = e - mean_ms;
                d * d
            })
            .sum();
        (sum_diff_sq / (count as f64 - 1.0)).sqrt()
    } else {
        0.0
    };

    TimingStats { mean_abs_ms, mean_ms, stddev_ms, max_abs_ms: max_abs, count }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct HistogramMs {
    pub bins: Vec<(i64, u32)>, // (bin start ms, count), sorted by bin
    pub max_count: u32,
}

/// Offset histogram for the evaluation screen. Bins floor toward negative
/// infinity, so -0.5ms and 0.5ms land in different bins at 1ms width.
pub fn build_histogram_ms(records: &[HitRecord], bin_ms: i64) -> HistogramMs {
    let bin_ms = bin_ms.max(1);
    let mut counts: FxHashMap<i64, u32> = FxHashMap::default();
    let mut max_count = 0;
    for e in hit_offsets(records) {
        let bin = (e / bin_ms as f64).floor() as i64 * bin_ms;
        let c = counts.entry(bin).or_insert(0);
        *c = c.saturating_add(1);
        max_count = max_count.max(*c);
    }
    let mut bins: Vec<(i64, u32)> = counts.into_iter().collect();
    bins.sort_unstable_by_key(|(bin, _)| *bin);
    HistogramMs { bins, max_count }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(delta: i64) -> HitRecord {
        HitRecord::attack(0, 0, 1000, delta, Rating::Slap, 1000 - delta)
    }

    #[test]
    fn stats_ignore_misses_and_releases() {
        let records = vec![
            hit(10),
            hit(-10),
            hit(-20),
            HitRecord::missed(0, 1, 2000, 2100),
            HitRecord::release(0, 2, 3000, Some(0), 40, Rating::Slip, 2960),
        ];
        let stats = compute_timing_stats(&records);
        assert_eq!(stats.count, 3);
        assert!((stats.mean_ms - (-20.0 / 3.0)).abs() < 1e-9);
        assert!((stats.mean_abs_ms - 40.0 / 3.0).abs() < 1e-9);
        assert!((stats.max_abs_ms - 20.0).abs() < f64::EPSILON);
        // Sample variance of [10, -10, -20] around -20/3.
        let mean = -20.0 / 3.0;
        let var = ((10.0 - mean) * (10.0 - mean) + (-10.0 - mean) * (-10.0 - mean) + (-20.0 - mean) * (-20.0 - mean)) / 2.0;
        assert!((stats.stddev_ms - f64::sqrt(var)).abs() < 1e-9);
    }

    #[test]
    fn empty_and_single_samples() {
        assert_eq!(compute_timing_stats(&[]), TimingStats::default());
        let one = compute_timing_stats(&[hit(5)]);
        assert_eq!(one.count, 1);
        assert!(one.stddev_ms.abs() < f64::EPSILON);
    }

    #[test]
    fn histogram_bins_floor_and_sort() {
        let records = vec![hit(-3), hit(-1), hit(0), hit(4), hit(5)];
        let hist = build_histogram_ms(&records, 5);
        assert_eq!(hist.bins, vec![(-5, 2), (0, 2), (5, 1)]);
        assert_eq!(hist.max_count, 2);
    }
}
