//! Functions that move or rebucket series in time

use super::{consolidation_func, offset_time, positive_interval, series_list};
use crate::consolidations::ConsolidationFunc;
use crate::expr::description::{FunctionDescription, FunctionParam, ParamType};
use crate::expr::error::{EvalError, EvalResult};
use crate::expr::evaluator::Evaluator;
use crate::expr::fetch::MetricMap;
use crate::expr::helper::{for_each_series, series_arg, try_for_each_series};
use crate::expr::registry::{Function, FunctionRegistry};
use crate::parser::{start_align_to, Call};
use crate::series::Series;
use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;

const MINUTE: i64 = 60;
const HOUR: i64 = 3_600;
const DAY: i64 = 86_400;

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.register(Arc::new(TimeShift));
    registry.register(Arc::new(TimeShiftByMetric));
    registry.register(Arc::new(Summarize));
    registry.register(Arc::new(SmartSummarize));
    registry.register(Arc::new(Hitcount));
}

/// Argument as written, minus quotes, for output names and tags
fn raw_text(call: &Call, key: &str, index: usize) -> String {
    match call.named_or_pos(key, index) {
        Some(crate::parser::Expr::String { value, .. }) => value.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// Reduce samples into `count` buckets of `interval` seconds from `start`
///
/// Each bucket is gated by the series' xFilesFactor over the samples that
/// fall into it.
fn bucketize(series: &Series, start: i64, interval: i64, count: usize, func: ConsolidationFunc) -> Vec<f64> {
    let mut buckets: Vec<Vec<f64>> = vec![Vec::new(); count];
    for (i, &v) in series.values.iter().enumerate() {
        let index = (series.timestamp(i) - start).div_euclid(interval);
        if let Some(bucket) = usize::try_from(index).ok().and_then(|i| buckets.get_mut(i)) {
            bucket.push(v);
        }
    }
    buckets.iter().map(|b| func.reduce(b, series.x_files_factor)).collect()
}

fn bucket_count(span: i64, interval: i64) -> usize {
    if span <= 0 {
        return 0;
    }
    (span / interval + i64::from(span % interval != 0)) as usize
}

/// Bucket count and end of an `interval` grid from `start` covering `stop`
fn grid(start: i64, stop: i64, interval: i64) -> EvalResult<(usize, i64)> {
    let out_of_range = || EvalError::InvalidInterval(format!("{}s", interval));
    let count = bucket_count(stop.checked_sub(start).ok_or_else(out_of_range)?, interval);
    let end = i64::try_from(count)
        .ok()
        .and_then(|n| n.checked_mul(interval))
        .and_then(|width| start.checked_add(width))
        .ok_or_else(out_of_range)?;
    Ok((count, end))
}

struct TimeShift;

impl TimeShift {
    fn shift(call: &Call) -> EvalResult<i64> {
        call.interval_named_or_pos_default("timeShift", 1, -1, 0)
    }
}

#[async_trait]
impl Function for TimeShift {
    fn descriptions(&self) -> Vec<FunctionDescription> {
        vec![FunctionDescription::new(
            "timeShift",
            "Transform",
            "Draw the series as it was at another time. Unsigned shifts go into the past.",
        )
        .param(series_list())
        .param(
            FunctionParam::new("timeShift", ParamType::Interval)
                .required()
                .suggestions(["1h", "6h", "12h", "1d", "2d", "7d", "14d", "30d"]),
        )
        .param(FunctionParam::new("resetEnd", ParamType::Boolean).default(true))]
    }

    fn fetch_window(&self, call: &Call, from: i64, until: i64) -> EvalResult<(i64, i64)> {
        let shift = Self::shift(call)?;
        Ok((offset_time(from, shift)?, offset_time(until, shift)?))
    }

    async fn evaluate(
        &self,
        eval: &Evaluator,
        call: &Call,
        from: i64,
        until: i64,
        values: &mut MetricMap,
    ) -> EvalResult<Vec<Series>> {
        let shift = Self::shift(call)?;
        let reset_end = call.bool_named_or_pos_default("resetEnd", 2, true)?;
        let (shifted_from, shifted_until) = self.fetch_window(call, from, until)?;
        let series = series_arg(eval, call, 0, shifted_from, shifted_until, values).await?;
        let text = raw_text(call, "timeShift", 1);

        Ok(for_each_series(series, |s| {
            let start = s.start_time - shift;
            let mut kept = s.values.clone();
            if reset_end && start + kept.len() as i64 * s.step_time > until {
                kept.truncate(bucket_count(until - start, s.step_time));
            }
            s.clone_shell(format!("timeShift({},'{}')", s.name, text))
                .with_start(start)
                .with_values(kept)
                .tag("timeShift", text.as_str())
        }))
    }
}

/// Highest release seen for one major version and the last point it fired at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct VersionMark {
    major: u64,
    minor: u64,
    position: usize,
}

/// `(major, minor)` from the first `N_M` run in `text`
fn parse_version(re: &Regex, text: &str) -> Option<(u64, u64)> {
    let caps = re.captures(text)?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}

/// Newest minor of every major, newest major first
///
/// A mark fires where it holds a present non-zero value; marks that never
/// fire or carry no version in their last node are skipped.
fn latest_marks(re: &Regex, marks: &[Series]) -> Vec<VersionMark> {
    let mut found: Vec<VersionMark> = marks
        .iter()
        .filter_map(|m| {
            let (major, minor) = parse_version(re, m.name.rsplit('.').next()?)?;
            let position = m.values.iter().rposition(|v| !v.is_nan() && *v != 0.0)?;
            Some(VersionMark { major, minor, position })
        })
        .collect();
    found.sort_by(|a, b| (b.major, b.minor).cmp(&(a.major, a.minor)));
    found.dedup_by_key(|m| m.major);
    found
}

/// Move every sample `offset` points later, NaN-filling the gap
fn shift_points(values: &[f64], offset: i64) -> Vec<f64> {
    (0..values.len())
        .map(|i| {
            usize::try_from(i as i64 - offset)
                .ok()
                .and_then(|j| values.get(j))
                .copied()
                .unwrap_or(f64::NAN)
        })
        .collect()
}

struct TimeShiftByMetric;

impl TimeShiftByMetric {
    fn check_lists(call: &Call, metrics: &[Series], marks: &[Series]) -> EvalResult<()> {
        let bad_data = |message: String| EvalError::BadData {
            target: call.name.clone(),
            message,
        };
        for (kind, list) in [("metrics", metrics), ("marks", marks)] {
            if list.len() < 2 {
                return Err(bad_data(format!("need at least 2 {} series, got {}", kind, list.len())));
            }
        }
        let points = metrics[0].len();
        if points == 0 {
            return Err(bad_data(format!("empty series {}", metrics[0].name)));
        }
        if let Some(odd) = metrics.iter().chain(marks).find(|s| s.len() != points) {
            return Err(bad_data(format!("series {} differs in length from the others", odd.name)));
        }
        Ok(())
    }
}

#[async_trait]
impl Function for TimeShiftByMetric {
    fn descriptions(&self) -> Vec<FunctionDescription> {
        vec![FunctionDescription::new(
            "timeShiftByMetric",
            "Transform",
            "Shift each series so the release mark of its major version lines up with the newest release mark.",
        )
        .param(series_list())
        .param(FunctionParam::new("markSource", ParamType::SeriesList).required())
        .param(FunctionParam::new("versionRankIndex", ParamType::Integer).required())]
    }

    async fn evaluate(
        &self,
        eval: &Evaluator,
        call: &Call,
        from: i64,
        until: i64,
        values: &mut MetricMap,
    ) -> EvalResult<Vec<Series>> {
        let metrics = series_arg(eval, call, 0, from, until, values).await?;
        let marks = series_arg(eval, call, 1, from, until, values).await?;
        let rank = call.int_named_or_pos_default("versionRankIndex", 2, 0)?;
        let rank = usize::try_from(rank)
            .map_err(|_| EvalError::invalid_argument(&call.name, format!("negative version rank {}", rank)))?;
        Self::check_lists(call, &metrics, &marks)?;

        let re = Regex::new(r"(\d+)_(\d+)")
            .map_err(|e| EvalError::invalid_argument(&call.name, e.to_string()))?;
        let latest = latest_marks(&re, &marks);
        let Some(newest) = latest.first().filter(|_| latest.len() >= 2) else {
            return Err(EvalError::BadData {
                target: call.name.clone(),
                message: format!("need release marks for at least 2 major versions, found {}", latest.len()),
            });
        };

        let mut out = Vec::with_capacity(metrics.len());
        for s in &metrics {
            let Some((major, _)) = s.name.split('.').nth(rank).and_then(|node| parse_version(&re, node)) else {
                continue;
            };
            let Some(mark) = latest.iter().find(|m| m.major == major) else {
                continue;
            };
            let offset = newest.position as i64 - mark.position as i64;
            out.push(
                s.clone_shell(format!("timeShiftByMetric({})", s.name))
                    .with_values(shift_points(&s.values, offset))
                    .tag("timeShiftByMetric", (offset * s.step_time).to_string()),
            );
        }
        Ok(out)
    }
}

struct Summarize;

#[async_trait]
impl Function for Summarize {
    fn descriptions(&self) -> Vec<FunctionDescription> {
        vec![FunctionDescription::new(
            "summarize",
            "Transform",
            "Rebucket into fixed intervals aligned to the clock, or to the series start.",
        )
        .param(series_list())
        .param(FunctionParam::new("intervalString", ParamType::Interval).required())
        .param(super::agg_func("func").default("sum"))
        .param(FunctionParam::new("alignToFrom", ParamType::Boolean).default(false))]
    }

    async fn evaluate(
        &self,
        eval: &Evaluator,
        call: &Call,
        from: i64,
        until: i64,
        values: &mut MetricMap,
    ) -> EvalResult<Vec<Series>> {
        let series = series_arg(eval, call, 0, from, until, values).await?;
        let text = raw_text(call, "intervalString", 1);
        let interval = positive_interval(&call.name, call.interval_arg(1, 1)?.abs())?;
        let func_name = call.string_named_or_pos_default("func", 2, "sum")?;
        let func = consolidation_func(&func_name)?;
        let align_to_from = call.bool_named_or_pos_default("alignToFrom", 3, false)?;

        try_for_each_series(series, |s| {
            let start = if align_to_from {
                s.start_time
            } else {
                offset_time(s.start_time, -s.start_time.rem_euclid(interval))?
            };
            let (count, _) = grid(start, s.stop_time, interval)?;
            let name = format!(
                "summarize({}, \"{}\", \"{}\"{})",
                s.name,
                text,
                func_name,
                if align_to_from { ", true" } else { "" }
            );
            let mut out = s.clone_shell(name).with_start(start);
            out.step_time = interval;
            Ok(out
                .with_values(bucketize(s, start, interval, count, func))
                .tag("summarize", text.as_str())
                .tag("summarizeFunction", func_name.as_str()))
        })
    }
}

struct SmartSummarize;

impl SmartSummarize {
    fn align_to(call: &Call) -> EvalResult<Option<String>> {
        call.string_named_or_pos_opt("alignTo", 3)
    }
}

#[async_trait]
impl Function for SmartSummarize {
    fn descriptions(&self) -> Vec<FunctionDescription> {
        vec![FunctionDescription::new(
            "smartSummarize",
            "Transform",
            "Rebucket into fixed intervals counted from the series start, optionally aligning the query start first.",
        )
        .param(series_list())
        .param(FunctionParam::new("intervalString", ParamType::Interval).required())
        .param(super::agg_func("func").default("sum"))
        .param(FunctionParam::new("alignTo", ParamType::String).suggestions(["seconds", "minutes", "hours", "days", "weeks", "months", "years"]))]
    }

    fn fetch_window(&self, call: &Call, from: i64, until: i64) -> EvalResult<(i64, i64)> {
        match Self::align_to(call)? {
            Some(unit) => Ok((start_align_to(from, &unit)?, until)),
            None => Ok((from, until)),
        }
    }

    async fn evaluate(
        &self,
        eval: &Evaluator,
        call: &Call,
        from: i64,
        until: i64,
        values: &mut MetricMap,
    ) -> EvalResult<Vec<Series>> {
        let (aligned_from, until) = self.fetch_window(call, from, until)?;
        let series = series_arg(eval, call, 0, aligned_from, until, values).await?;
        let text = raw_text(call, "intervalString", 1);
        let interval = positive_interval(&call.name, call.interval_arg(1, 1)?.abs())?;
        let func_name = call.string_named_or_pos_default("func", 2, "sum")?;
        let func = consolidation_func(&func_name)?;
        let suffix = match Self::align_to(call)? {
            Some(unit) => format!(",'{}'", unit),
            None => String::new(),
        };

        try_for_each_series(series, |s| {
            let (count, _) = grid(s.start_time, s.stop_time, interval)?;
            let name = format!("smartSummarize({},'{}','{}'{})", s.name, text, func_name, suffix);
            let mut out = s.clone_shell(name);
            out.step_time = interval;
            Ok(out
                .with_values(bucketize(s, s.start_time, interval, count, func))
                .tag("smartSummarize", interval.to_string())
                .tag("smartSummarizeFunction", func_name.as_str()))
        })
    }
}

struct Hitcount;

impl Hitcount {
    fn align(call: &Call) -> EvalResult<bool> {
        call.bool_named_or_pos_default("alignToInterval", 2, false)
    }
}

#[async_trait]
impl Function for Hitcount {
    fn descriptions(&self) -> Vec<FunctionDescription> {
        vec![FunctionDescription::new(
            "hitcount",
            "Transform",
            "Turn a rate into hit counts per interval, spreading each sample over the buckets it covers.",
        )
        .param(series_list())
        .param(FunctionParam::new("intervalString", ParamType::Interval).required())
        .param(FunctionParam::new("alignToInterval", ParamType::Boolean).default(false))]
    }

    /// Aligned requests start at the enclosing day, hour or minute
    fn fetch_window(&self, call: &Call, from: i64, until: i64) -> EvalResult<(i64, i64)> {
        if !Self::align(call)? {
            return Ok((from, until));
        }
        let interval = call.interval_arg(1, 1)?.abs();
        let unit = if interval >= DAY {
            DAY
        } else if interval >= HOUR {
            HOUR
        } else if interval >= MINUTE {
            MINUTE
        } else {
            return Ok((from, until));
        };
        Ok((offset_time(from, -from.rem_euclid(unit))?, until))
    }

    async fn evaluate(
        &self,
        eval: &Evaluator,
        call: &Call,
        from: i64,
        until: i64,
        values: &mut MetricMap,
    ) -> EvalResult<Vec<Series>> {
        let (aligned_from, until) = self.fetch_window(call, from, until)?;
        let series = series_arg(eval, call, 0, aligned_from, until, values).await?;
        let text = raw_text(call, "intervalString", 1);
        let interval = positive_interval(&call.name, call.interval_arg(1, 1)?.abs())?;
        let align = Self::align(call)?;

        try_for_each_series(series, |s| {
            let (count, end) = grid(s.start_time, s.stop_time, interval)?;
            let start = if align {
                s.start_time
            } else {
                offset_time(s.stop_time, s.start_time - end)?
            };
            let name = format!("hitcount({}, \"{}\"{})", s.name, text, if align { ", true" } else { "" });
            let mut out = s.clone_shell(name).with_start(start);
            out.step_time = interval;
            Ok(out
                .with_values(hits(s, start, interval, count))
                .tag("hitcount", text.as_str()))
        })
    }
}

/// Spread `value * step` hits over the buckets each sample overlaps
fn hits(series: &Series, start: i64, interval: i64, count: usize) -> Vec<f64> {
    let mut buckets: Vec<Option<f64>> = vec![None; count];
    let mut add = |index: i64, hits: f64| {
        if let Some(slot) = usize::try_from(index).ok().and_then(|i| buckets.get_mut(i)) {
            *slot = Some(slot.unwrap_or(0.0) + hits);
        }
    };
    let last = count as i64 - 1;

    for (i, &v) in series.values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        let t = series.timestamp(i);
        let (start_bucket, start_mod) = ((t - start).div_euclid(interval), (t - start).rem_euclid(interval));
        let end = t + series.step_time;
        let (mut end_bucket, mut end_mod) = ((end - start).div_euclid(interval), (end - start).rem_euclid(interval));
        if end_bucket > last {
            end_bucket = last;
            end_mod = interval;
        }

        if start_bucket == end_bucket {
            add(start_bucket, v * (end_mod - start_mod) as f64);
            continue;
        }
        add(start_bucket, v * (interval - start_mod) as f64);
        for bucket in start_bucket + 1..end_bucket {
            add(bucket, v * interval as f64);
        }
        if end_mod > 0 {
            add(end_bucket, v * end_mod as f64);
        }
    }
    buckets.into_iter().map(|b| b.unwrap_or(f64::NAN)).collect()
}
