//! Alignment and cross-series aggregation
//!
//! Series fetched from different archives may disagree on step and window.
//! These helpers bring them onto one grid before values are combined
//! index by index.

use super::tags::NAME_TAG;
use super::types::Series;
use crate::consolidations::{x_files_factor, ConsolidationFunc};
use std::collections::BTreeMap;

fn gcd(a: i64, b: i64) -> i64 {
    if b == 0 {
        a.abs()
    } else {
        gcd(b, a % b)
    }
}

/// Least common multiple of two steps
pub fn lcm(a: i64, b: i64) -> i64 {
    if a == 0 || b == 0 {
        return 0;
    }
    (a / gcd(a, b) * b).abs()
}

fn downsample(series: &Series, values: Vec<f64>, vpp: usize) -> Vec<f64> {
    if vpp <= 1 {
        return values;
    }
    let func = ConsolidationFunc::parse(&series.consolidation_func).unwrap_or(ConsolidationFunc::Average);
    values
        .chunks(vpp)
        .map(|bucket| func.reduce(bucket, series.x_files_factor))
        .collect()
}

/// Bring every series onto one step
///
/// A `common_step` of zero uses the LCM of all steps. The shared start is
/// the earliest start aligned down to that step. Finer series are
/// downsampled with their own consolidation function, series already on
/// the step get leading NaN back to the shared start, and everything is
/// padded with trailing NaN to the longest length. Series coarser than an
/// explicit `common_step` are returned unchanged; nothing is upsampled.
pub fn scale_to_common_step(series: &[Series], common_step: i64) -> Vec<Series> {
    let Some(first) = series.first() else {
        return Vec::new();
    };
    let step = if common_step > 0 {
        common_step
    } else {
        series.iter().fold(first.step_time, |acc, s| lcm(acc, s.step_time))
    };
    if step <= 0 {
        return series.to_vec();
    }

    let min_start = series.iter().map(|s| s.start_time).min().unwrap_or(first.start_time);
    let min_start = min_start - min_start.rem_euclid(step);

    let mut scaled: Vec<Series> = series
        .iter()
        .map(|s| {
            if s.step_time > step {
                return s.clone();
            }
            if s.step_time == step {
                let lead = (s.start_time - min_start) / step;
                if lead <= 0 {
                    return s.clone();
                }
                let mut values = vec![f64::NAN; lead as usize];
                values.extend_from_slice(&s.values);
                return s
                    .clone_shell(s.name.clone())
                    .with_start(s.start_time - lead * step)
                    .with_values(values);
            }
            let lead = ((s.start_time - min_start) / s.step_time).max(0) as usize;
            let mut values = vec![f64::NAN; lead];
            values.extend_from_slice(&s.values);
            let vpp = (step / s.step_time) as usize;
            let values = downsample(s, values, vpp);

            let mut out = s.clone_shell(s.name.clone());
            out.step_time = step;
            out.with_start(min_start).with_values(values)
        })
        .collect();

    let max_len = scaled.iter().map(Series::len).max().unwrap_or(0);
    for s in scaled.iter_mut() {
        if s.len() < max_len {
            let mut values = std::mem::take(&mut s.values);
            values.resize(max_len, f64::NAN);
            *s = s.clone_shell(s.name.clone()).with_values(values);
        }
    }
    scaled
}

/// Pad series with NaN so they share one `[start, stop)` window
///
/// Steps are unified first when they differ.
pub fn align_series(series: &[Series]) -> Vec<Series> {
    let Some(first) = series.first() else {
        return Vec::new();
    };
    let series = if series.iter().any(|s| s.step_time != first.step_time) {
        scale_to_common_step(series, 0)
    } else {
        series.to_vec()
    };

    let start = series.iter().map(|s| s.start_time).min().unwrap_or(0);
    let stop = series.iter().map(|s| s.stop_time).max().unwrap_or(0);

    series
        .into_iter()
        .map(|s| {
            let lead = ((s.start_time - start) / s.step_time).max(0) as usize;
            let trail = ((stop - s.stop_time) / s.step_time).max(0) as usize;
            if lead == 0 && trail == 0 {
                return s;
            }
            let mut values = vec![f64::NAN; lead];
            values.extend_from_slice(&s.values);
            values.resize(values.len() + trail, f64::NAN);
            let new_start = s.start_time - lead as i64 * s.step_time;
            s.clone_shell(s.name.clone())
                .with_start(new_start)
                .with_values(values)
        })
        .collect()
}

/// Tags whose key and value are shared by every series
pub fn common_tags(series: &[Series]) -> BTreeMap<String, String> {
    let Some((first, rest)) = series.split_first() else {
        return BTreeMap::new();
    };
    let mut tags = first.tags.clone();
    for s in rest {
        tags.retain(|k, v| s.tags.get(k) == Some(v));
    }
    tags
}

/// Combine series index by index into one output series
///
/// Missing samples are dropped before `reducer` runs; an index whose
/// present ratio fails the xFilesFactor gate yields NaN. Empty input gives
/// empty output.
pub fn aggregate_series(
    name: &str,
    series: &[Series],
    reducer: &dyn Fn(&[f64]) -> f64,
    xff: f32,
) -> Vec<Series> {
    if series.is_empty() {
        return Vec::new();
    }
    let aligned = align_series(series);
    let len = aligned.iter().map(Series::len).max().unwrap_or(0);

    let mut present = Vec::with_capacity(aligned.len());
    let values = (0..len)
        .map(|i| {
            present.clear();
            present.extend(
                aligned
                    .iter()
                    .filter_map(|s| s.values.get(i).copied())
                    .filter(|v| !v.is_nan()),
            );
            if x_files_factor(present.len(), aligned.len(), xff) {
                reducer(&present)
            } else {
                f64::NAN
            }
        })
        .collect();

    let mut tags = common_tags(&aligned);
    tags.entry(NAME_TAG.to_string()).or_insert_with(|| name.to_string());

    let mut out = aligned[0].clone_shell(name);
    out.tags = tags;
    vec![out.with_values(values)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::assert_values;

    const NAN: f64 = f64::NAN;

    #[test]
    fn test_lcm() {
        assert_eq!(lcm(10, 15), 30);
        assert_eq!(lcm(60, 60), 60);
        assert_eq!(lcm(0, 60), 0);
    }

    #[test]
    fn test_scale_to_common_step() {
        let fine = Series::new("fine", vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 10, 0);
        let coarse = Series::new("coarse", vec![10.0, 20.0, 30.0], 20, 0);
        let scaled = scale_to_common_step(&[fine, coarse], 0);

        assert_eq!(scaled[0].step_time, 20);
        assert_values(&scaled[0].values, &[1.5, 3.5, 5.5]);
        assert_values(&scaled[1].values, &[10.0, 20.0, 30.0]);
        assert!(scaled.iter().all(Series::is_consistent));
    }

    #[test]
    fn test_scale_uses_own_consolidation_and_pads() {
        let mut fine = Series::new("fine", vec![1.0, 2.0, 3.0, 4.0], 10, 10);
        fine.consolidation_func = "sum".to_string();
        let coarse = Series::new("coarse", vec![1.0, 1.0, 1.0, 1.0], 20, 0);
        let scaled = scale_to_common_step(&[fine, coarse], 0);

        // fine gets one leading NaN at t=0 so buckets line up on 20s
        assert_values(&scaled[0].values, &[1.0, 5.0, 4.0, NAN]);
        assert_eq!(scaled[0].start_time, 0);
        assert_eq!(scaled[0].len(), scaled[1].len());
    }

    #[test]
    fn test_scale_snaps_same_step_to_shared_start() {
        let a = Series::new("a", vec![1.0, 2.0, 3.0], 20, 0);
        let b = Series::new("b", vec![5.0], 20, 40);
        let scaled = scale_to_common_step(&[a, b], 0);

        assert_values(&scaled[1].values, &[NAN, NAN, 5.0]);
        assert_eq!(scaled[1].start_time, 0);
        assert!(scaled.iter().all(Series::is_consistent));

        let coarse = Series::new("c", vec![1.0], 60, 30);
        let scaled = scale_to_common_step(&[coarse.clone()], 20);
        assert_eq!(scaled[0], coarse);
    }

    #[test]
    fn test_align_series_pads_window() {
        let a = Series::new("a", vec![1.0, 2.0], 10, 0);
        let b = Series::new("b", vec![3.0, 4.0], 10, 10);
        let aligned = align_series(&[a, b]);

        assert_values(&aligned[0].values, &[1.0, 2.0, NAN]);
        assert_values(&aligned[1].values, &[NAN, 3.0, 4.0]);
        assert!(aligned.iter().all(|s| s.start_time == 0 && s.stop_time == 30));
    }

    #[test]
    fn test_aggregate_series() {
        let a = Series::new("a.x;dc=east", vec![1.0, NAN, 3.0], 60, 0);
        let b = Series::new("b.x;dc=east", vec![2.0, NAN, NAN], 60, 0);
        let sum = |v: &[f64]| v.iter().sum::<f64>();

        let out = aggregate_series("sumSeries(*.x)", &[a.clone(), b.clone()], &sum, 0.0);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "sumSeries(*.x)");
        assert_values(&out[0].values, &[3.0, NAN, 3.0]);
        assert_eq!(out[0].tags["dc"], "east");
        assert_eq!(out[0].tags["name"], "sumSeries(*.x)");

        let gated = aggregate_series("s", &[a, b], &sum, 0.6);
        assert_values(&gated[0].values, &[3.0, NAN, NAN]);
    }

    #[test]
    fn test_aggregate_series_empty() {
        let sum = |v: &[f64]| v.iter().sum::<f64>();
        assert!(aggregate_series("sumSeries()", &[], &sum, 0.0).is_empty());
    }

    #[test]
    fn test_common_tags() {
        let a = Series::new("a;dc=east;host=1", vec![], 60, 0);
        let b = Series::new("a;dc=east;host=2", vec![], 60, 0);
        let tags = common_tags(&[a, b]);
        assert_eq!(tags.get("dc").map(String::as_str), Some("east"));
        assert_eq!(tags.get("name").map(String::as_str), Some("a"));
        assert!(!tags.contains_key("host"));
    }
}
