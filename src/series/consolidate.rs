//! Max-data-points consolidation
//!
//! When a render window holds more points than the client can draw, each
//! run of `vpp` (values per point) samples is reduced to one. With nudging
//! enabled, leading samples are dropped so bucket boundaries stay fixed in
//! absolute time as the window slides, keeping graphs from jittering
//! between refreshes.

use super::types::Series;
use crate::consolidations::ConsolidationFunc;

/// Samples folded into each output point for a window of `range` seconds
pub fn values_per_point(range: i64, step: i64, max_data_points: usize) -> usize {
    if range <= 0 || step <= 0 || max_data_points == 0 {
        return 1;
    }
    let points = (range / step) as usize;
    if points <= max_data_points {
        1
    } else {
        points.div_ceil(max_data_points)
    }
}

/// Leading samples to drop so the first kept timestamp is congruent to
/// `step` modulo the bucket width
fn nudge_offset(series: &Series, vpp: usize) -> usize {
    if series.len() <= 2 * vpp {
        return 0;
    }
    let step = series.step_time;
    let bucket = step * vpp as i64;
    ((step - series.start_time).rem_euclid(bucket) / step) as usize
}

/// Reduce runs of `vpp` samples with the series' consolidation function
///
/// A trailing partial bucket is kept. Under nudge the output start is the
/// last timestamp of the first bucket.
pub fn consolidate_by(series: &Series, vpp: usize, nudge: bool) -> Series {
    if vpp <= 1 || series.step_time <= 0 {
        return series.clone();
    }
    let step = series.step_time;
    let skip = if nudge { nudge_offset(series, vpp) } else { 0 };
    let func = ConsolidationFunc::parse(&series.consolidation_func).unwrap_or(ConsolidationFunc::Average);

    let values: Vec<f64> = series.values[skip..]
        .chunks(vpp)
        .map(|bucket| func.reduce(bucket, series.x_files_factor))
        .collect();

    let bucket = step * vpp as i64;
    let mut start = series.start_time + skip as i64 * step;
    if nudge {
        start += bucket - step;
    }

    let mut out = series.clone_shell(series.name.clone());
    out.step_time = bucket;
    out.with_start(start).with_values(values)
}

/// Consolidate one series to at most `max_data_points` points
pub fn consolidate(series: &Series, max_data_points: usize, nudge: bool) -> Series {
    let vpp = values_per_point(series.stop_time - series.start_time, series.step_time, max_data_points);
    consolidate_by(series, vpp, nudge)
}

/// Consolidate a render result, measuring the range across all series
pub fn consolidate_all(series: &[Series], max_data_points: usize, nudge: bool) -> Vec<Series> {
    let start = series.iter().map(|s| s.start_time).min();
    let stop = series.iter().map(|s| s.stop_time).max();
    let (Some(start), Some(stop)) = (start, stop) else {
        return Vec::new();
    };
    let range = stop - start;

    series
        .iter()
        .map(|s| consolidate_by(s, values_per_point(range, s.step_time, max_data_points), nudge))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::assert_values;

    fn run(values: &[f64], start: i64, step: i64, mdp: usize) -> Series {
        let mut s = Series::new("m", values.to_vec(), step, start);
        s.consolidation_func = "sum".to_string();
        let out = consolidate_all(&[s], mdp, true);
        assert_eq!(out.len(), 1);
        assert!(out[0].is_consistent());
        out.into_iter().next().unwrap()
    }

    fn range(from: i32, to: i32) -> Vec<f64> {
        (from..=to).map(f64::from).collect()
    }

    #[test]
    fn test_values_per_point() {
        assert_eq!(values_per_point(0, 60, 100), 1);
        assert_eq!(values_per_point(600, 60, 10), 1);
        assert_eq!(values_per_point(660, 60, 10), 2);
        assert_eq!(values_per_point(130, 10, 3), 5);
    }

    #[test]
    fn test_nudge_empty() {
        let out = run(&[], 0, 60, 100);
        assert!(out.values.is_empty());
        assert_eq!((out.step_time, out.start_time), (60, 0));
    }

    #[test]
    fn test_nudge_one_point() {
        let out = run(&[1.0, 2.0, 3.0, 4.0], 10, 10, 1);
        assert_values(&out.values, &[10.0]);
        assert_eq!((out.step_time, out.start_time), (40, 40));
    }

    #[test]
    fn test_nudge_too_short_to_trim() {
        let out = run(&[1.0, 2.0, 3.0, 4.0], 7, 3, 2);
        assert_values(&out.values, &[3.0, 7.0]);
        assert_eq!((out.step_time, out.start_time), (6, 10));
    }

    #[test]
    fn test_nudge_no_trim() {
        let out = run(&[1.0, 2.0, 3.0, 4.0], 20, 10, 1);
        assert_values(&out.values, &[10.0]);
        assert_eq!((out.step_time, out.start_time), (40, 50));
    }

    #[test]
    fn test_nudge_trims_first_point() {
        let out = run(&range(1, 6), 20, 10, 3);
        assert_values(&out.values, &[5.0, 9.0, 6.0]);
        assert_eq!((out.step_time, out.start_time), (20, 40));
    }

    #[test]
    fn test_nudge_already_aligned() {
        let out = run(&range(2, 7), 30, 10, 3);
        assert_values(&out.values, &[5.0, 9.0, 13.0]);
        assert_eq!((out.step_time, out.start_time), (20, 40));
    }

    #[test]
    fn test_nudge_trims_to_bucket() {
        let out = run(&range(2, 14), 20, 10, 3);
        assert_values(&out.values, &[40.0, 50.0]);
        assert_eq!((out.step_time, out.start_time), (50, 100));
    }

    #[test]
    fn test_nudge_even_start() {
        let out = run(&range(1, 14), 10, 10, 3);
        assert_values(&out.values, &[15.0, 40.0, 50.0]);
        assert_eq!((out.step_time, out.start_time), (50, 50));
    }

    #[test]
    fn test_without_nudge() {
        let mut s = Series::new("m", range(1, 6), 10, 20);
        s.consolidation_func = "max".to_string();
        let out = consolidate(&s, 3, false);
        assert_values(&out.values, &[2.0, 4.0, 6.0]);
        assert_eq!((out.step_time, out.start_time), (20, 20));
    }

    #[test]
    fn test_range_spans_all_series() {
        let short = Series::new("short", vec![1.0, 2.0], 10, 0);
        let long = Series::new("long", range(1, 8), 10, 0);
        let out = consolidate_all(&[short, long], 4, false);
        assert_eq!(out[0].step_time, 20);
        assert_values(&out[0].values, &[1.5]);
        assert_eq!(out[1].len(), 4);
    }
}
