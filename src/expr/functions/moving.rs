//! Moving-window functions
//!
//! The window is either a point count or an interval string. Interval
//! windows widen the fetch window up front; point windows only know how
//! far back to reach once the step is known, so they evaluate the argument
//! once and then fetch again over the widened range.

use super::{consolidation_func, offset_time, positive_interval, series_list};
use crate::consolidations::{x_files_factor, ConsolidationFunc};
use crate::expr::description::{FunctionDescription, FunctionParam, ParamType};
use crate::expr::error::{EvalError, EvalResult};
use crate::expr::evaluator::Evaluator;
use crate::expr::fetch::MetricMap;
use crate::expr::helper::{for_each_series, round_to, series_arg};
use crate::expr::registry::{Function, FunctionRegistry};
use crate::parser::{parse_interval, Call, Expr};
use crate::series::Series;
use async_trait::async_trait;
use std::sync::Arc;

const WINDOW: &str = "windowSize";

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.register(Arc::new(MovingWindow { name: "movingWindow", func: None }));
    for (name, func) in [
        ("movingAverage", ConsolidationFunc::Average),
        ("movingSum", ConsolidationFunc::Sum),
        ("movingMin", ConsolidationFunc::Min),
        ("movingMax", ConsolidationFunc::Max),
        ("movingMedian", ConsolidationFunc::Median),
    ] {
        registry.register(Arc::new(MovingWindow { name, func: Some(func) }));
    }
    registry.register(Arc::new(ExponentialMovingAverage));
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Window {
    Points(i64),
    Seconds(i64),
}

impl Window {
    fn from_call(call: &Call) -> EvalResult<Self> {
        match call.named_or_pos(WINDOW, 1) {
            Some(Expr::String { value, .. }) => {
                let seconds = parse_interval(value, 1)?.abs();
                Ok(Self::Seconds(positive_interval(&call.name, seconds)?))
            }
            _ => {
                let points = call.int_named_or_pos_default(WINDOW, 1, 0)?;
                if points <= 0 {
                    return Err(EvalError::invalid_argument(
                        &call.name,
                        format!("window must be positive, got {}", points),
                    ));
                }
                Ok(Self::Points(points))
            }
        }
    }

    /// Window length in points for a series with this step, at least one
    fn points(&self, step: i64) -> usize {
        match *self {
            Self::Points(n) => n as usize,
            Self::Seconds(secs) => (secs / step).max(1) as usize,
        }
    }

    fn fetch_window(&self, from: i64, until: i64) -> EvalResult<(i64, i64)> {
        match *self {
            Self::Seconds(secs) => Ok((offset_time(from, -secs)?, until)),
            Self::Points(_) => Ok((from, until)),
        }
    }
}

/// Series argument fetched far enough back to fill the first window
async fn windowed_series(
    eval: &Evaluator,
    call: &Call,
    window: Window,
    from: i64,
    until: i64,
    values: &mut MetricMap,
) -> EvalResult<Vec<Series>> {
    match window {
        Window::Seconds(_) => {
            let (from, until) = window.fetch_window(from, until)?;
            series_arg(eval, call, 0, from, until, values).await
        }
        Window::Points(n) => {
            let sampled = series_arg(eval, call, 0, from, until, values).await?;
            let Some(max_step) = sampled.iter().map(|s| s.step_time).max() else {
                return Ok(sampled);
            };
            let reach = max_step
                .checked_mul(n)
                .ok_or_else(|| EvalError::InvalidInterval(format!("{} points of {}s", n, max_step)))?;
            let widened = offset_time(from, -reach)?;
            tracing::debug!(function = %call.name, widened, "refetching for point window");
            let Some(arg) = call.arg(0) else {
                return Ok(sampled);
            };
            eval.fetch(std::slice::from_ref(arg), widened, until, values).await?;
            series_arg(eval, call, 0, widened, until, values).await
        }
    }
}

/// Shift the start past the first `points` samples, clamping to the end
fn skip_points(series: &Series, points: usize) -> i64 {
    series.timestamp(points.min(series.len()))
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

struct MovingWindow {
    name: &'static str,
    /// Fixed reducer; `None` reads it from the `func` argument
    func: Option<ConsolidationFunc>,
}

impl MovingWindow {
    fn xff_index(&self) -> usize {
        if self.func.is_some() {
            2
        } else {
            3
        }
    }
}

#[async_trait]
impl Function for MovingWindow {
    fn descriptions(&self) -> Vec<FunctionDescription> {
        let mut desc = FunctionDescription::new(
            self.name,
            "Calculate",
            "Reduce the window of points preceding each point. The window is a point count or an interval.",
        )
        .param(series_list())
        .param(FunctionParam::new(WINDOW, ParamType::IntOrInterval).required());
        if self.func.is_none() {
            desc = desc.param(super::agg_func("func").default("average"));
        }
        vec![desc.param(FunctionParam::new("xFilesFactor", ParamType::Float))]
    }

    fn fetch_window(&self, call: &Call, from: i64, until: i64) -> EvalResult<(i64, i64)> {
        Window::from_call(call)?.fetch_window(from, until)
    }

    async fn evaluate(
        &self,
        eval: &Evaluator,
        call: &Call,
        from: i64,
        until: i64,
        values: &mut MetricMap,
    ) -> EvalResult<Vec<Series>> {
        let window = Window::from_call(call)?;
        let (func, name) = match self.func {
            Some(func) => (func, self.name.to_string()),
            None => {
                let func_name = call.string_named_or_pos_default("func", 2, "average")?;
                (consolidation_func(&func_name)?, format!("moving{}", capitalize(&func_name)))
            }
        };
        let xff = call.float_named_or_pos_opt("xFilesFactor", self.xff_index())?;
        let series = windowed_series(eval, call, window, from, until, values).await?;
        let text = call.named_or_pos(WINDOW, 1).map(ToString::to_string).unwrap_or_default();
        let tag = match call.named_or_pos(WINDOW, 1) {
            Some(Expr::String { value, .. }) => value.clone(),
            _ => text.clone(),
        };

        Ok(for_each_series(series, |s| {
            let points = window.points(s.step_time);
            let effective_xff = xff.map(|x| x as f32).unwrap_or(s.x_files_factor);
            let moved = (points..s.len())
                .map(|i| {
                    let present: Vec<f64> = s.values[i - points..i].iter().copied().filter(|v| !v.is_nan()).collect();
                    if x_files_factor(present.len(), points, effective_xff) {
                        func.apply(&present)
                    } else {
                        f64::NAN
                    }
                })
                .collect();
            s.clone_shell(format!("{}({},{})", name, s.name, text))
                .with_start(skip_points(s, points))
                .with_values(moved)
                .tag(name.as_str(), tag.as_str())
        }))
    }
}

struct ExponentialMovingAverage;

#[async_trait]
impl Function for ExponentialMovingAverage {
    fn descriptions(&self) -> Vec<FunctionDescription> {
        vec![FunctionDescription::new(
            "exponentialMovingAverage",
            "Calculate",
            "Exponential moving average seeded with the mean of the first window.",
        )
        .param(series_list())
        .param(FunctionParam::new(WINDOW, ParamType::IntOrInterval).required())]
    }

    fn fetch_window(&self, call: &Call, from: i64, until: i64) -> EvalResult<(i64, i64)> {
        Window::from_call(call)?.fetch_window(from, until)
    }

    async fn evaluate(
        &self,
        eval: &Evaluator,
        call: &Call,
        from: i64,
        until: i64,
        values: &mut MetricMap,
    ) -> EvalResult<Vec<Series>> {
        let window = Window::from_call(call)?;
        let series = windowed_series(eval, call, window, from, until, values).await?;
        let text = call.named_or_pos(WINDOW, 1).map(ToString::to_string).unwrap_or_default();
        let tag = match call.named_or_pos(WINDOW, 1) {
            Some(Expr::String { value, .. }) => value.clone(),
            _ => text.clone(),
        };

        Ok(for_each_series(series, |s| {
            let points = window.points(s.step_time);
            let first = points.min(s.len().saturating_sub(1));
            s.clone_shell(format!("exponentialMovingAverage({},{})", s.name, text))
                .with_start(s.timestamp(first))
                .with_values(ema(&s.values, points))
                .tag("exponentialMovingAverage", tag.as_str())
        }))
    }
}

/// EMA over `values` after the first `points`, which only seed it
///
/// The seed is the mean of the present samples in the first window, zero
/// when they are all missing. Missing samples yield NaN and leave the
/// average untouched. A series no longer than the window yields the mean
/// of its present samples as a single point.
fn ema(values: &[f64], points: usize) -> Vec<f64> {
    let mean = |window: &[f64]| ConsolidationFunc::Average.reduce(window, 0.0);
    if values.is_empty() {
        return Vec::new();
    }
    if points >= values.len() {
        return vec![round_to(mean(values), 6)];
    }

    let seed = mean(&values[..points]);
    let mut current = if seed.is_nan() { 0.0 } else { seed };
    let c = 2.0 / (points as f64 + 1.0);

    values[points..]
        .iter()
        .map(|&v| {
            if v.is_nan() {
                return f64::NAN;
            }
            current = c * v + (1.0 - c) * current;
            round_to(current, 6)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{assert_values, eval_target};

    const NAN: f64 = f64::NAN;

    fn metric(values: Vec<f64>) -> Vec<Series> {
        vec![Series::new("m", values, 60, 0)]
    }

    fn ramp() -> Vec<Series> {
        metric(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
    }

    #[tokio::test]
    async fn test_point_window_refetches() {
        let out = eval_target("movingAverage(m, 2)", 120, 360, ramp()).await.unwrap();
        assert_eq!(out[0].name, "movingAverage(m,2)");
        assert_eq!(out[0].start_time, 120);
        assert_eq!(out[0].stop_time, 360);
        assert_values(&out[0].values, &[1.5, 2.5, 3.5, 4.5]);
        assert_eq!(out[0].tags["movingAverage"], "2");
    }

    #[tokio::test]
    async fn test_interval_window() {
        let out = eval_target("movingSum(m, '2min')", 120, 360, ramp()).await.unwrap();
        assert_eq!(out[0].name, "movingSum(m,'2min')");
        assert_eq!(out[0].start_time, 120);
        assert_values(&out[0].values, &[3.0, 5.0, 7.0, 9.0]);
        assert_eq!(out[0].tags["movingSum"], "2min");

        let out = eval_target("movingMax(m, '2min')", 120, 360, ramp()).await.unwrap();
        assert_values(&out[0].values, &[2.0, 3.0, 4.0, 5.0]);

        let out = eval_target("movingWindow(m, '2min', 'min')", 120, 360, ramp()).await.unwrap();
        assert_eq!(out[0].name, "movingMin(m,'2min')");
        assert_eq!(out[0].tags["movingMin"], "2min");
        assert_values(&out[0].values, &[1.0, 2.0, 3.0, 4.0]);
    }

    #[tokio::test]
    async fn test_x_files_factor_gate() {
        let data = metric(vec![1.0, NAN, NAN, 4.0, 5.0, 6.0]);
        let out = eval_target("movingAverage(m, 2, 0.5)", 120, 360, data.clone()).await.unwrap();
        assert_values(&out[0].values, &[1.0, NAN, 4.0, 4.5]);

        let out = eval_target("movingWindow(m, 2, 'sum', 0.6)", 120, 360, data).await.unwrap();
        assert_values(&out[0].values, &[NAN, NAN, NAN, 9.0]);
    }

    #[tokio::test]
    async fn test_window_longer_than_series() {
        let out = eval_target("movingMedian(m, '10min')", 0, 360, ramp()).await.unwrap();
        assert!(out[0].values.is_empty());
        assert_eq!(out[0].start_time, out[0].stop_time);
    }

    #[tokio::test]
    async fn test_bad_window() {
        let err = eval_target("movingAverage(m, 0)", 0, 360, ramp()).await.unwrap_err();
        assert!(matches!(err, EvalError::InvalidArgument { .. }));
        let err = eval_target("movingAverage(m, '1fortnight')", 0, 360, ramp()).await.unwrap_err();
        assert!(matches!(err, EvalError::UnknownTimeUnits(_)));
    }

    #[tokio::test]
    async fn test_exponential_moving_average() {
        let out = eval_target("exponentialMovingAverage(m, 2)", 120, 360, ramp()).await.unwrap();
        assert_eq!(out[0].name, "exponentialMovingAverage(m,2)");
        assert_eq!(out[0].start_time, 120);
        assert_values(&out[0].values, &[2.5, 3.5, 4.5, 5.5]);

        let out = eval_target("exponentialMovingAverage(m, '2min')", 120, 360, ramp()).await.unwrap();
        assert_eq!(out[0].tags["exponentialMovingAverage"], "2min");
        assert_values(&out[0].values, &[2.5, 3.5, 4.5, 5.5]);
    }

    #[test]
    fn test_ema_gaps() {
        assert_values(&ema(&[NAN, 2.0, NAN, 4.0], 2), &[NAN, 3.333333]);
        assert_values(&ema(&[NAN, NAN, 3.0], 2), &[2.0]);
    }

    #[test]
    fn test_ema_short_series() {
        assert_values(&ema(&[1.0, 2.0], 5), &[1.5]);
        assert_values(&ema(&[1.0, NAN, 4.0], 3), &[2.5]);
        assert_values(&ema(&[NAN, NAN], 3), &[NAN]);
        assert!(ema(&[], 3).is_empty());
    }

    #[tokio::test]
    async fn test_exponential_moving_average_short_series() {
        let data = metric(vec![1.0, 2.0, 3.0]);
        let out = eval_target("exponentialMovingAverage(m, '10min')", 0, 180, data).await.unwrap();
        assert_values(&out[0].values, &[2.0]);
        assert_eq!(out[0].start_time, 120);
        assert!(out[0].is_consistent());
    }

    #[tokio::test]
    async fn test_window_out_of_range() {
        let err = eval_target("movingAverage(m, '290000000000y')", -1_000_000_000_000_000_000, 0, ramp())
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::InvalidInterval(_)));

        let start = -4_000_000_000_000_000_000;
        let data = vec![Series::new("m", vec![1.0, 2.0], 60, start)];
        let err = eval_target("movingSum(m, 100000000000000000)", start, start + 120, data)
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::InvalidInterval(_)));
    }
}
