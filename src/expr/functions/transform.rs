//! Point-wise and running transforms, one output series per input

use super::{consolidation_func, positive_interval, series_list};
use crate::expr::description::{FunctionDescription, FunctionParam, ParamType};
use crate::expr::error::EvalResult;
use crate::expr::evaluator::Evaluator;
use crate::expr::fetch::MetricMap;
use crate::expr::helper::{for_each_series, series_arg, series_expr};
use crate::expr::registry::{Function, FunctionRegistry};
use crate::parser::Call;
use crate::series::Series;
use async_trait::async_trait;
use std::sync::Arc;

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.register(Arc::new(Absolute));
    registry.register(Arc::new(Scale));
    registry.register(Arc::new(Offset));
    registry.register(Arc::new(Derivative));
    registry.register(Arc::new(NonNegativeDerivative));
    registry.register(Arc::new(Integral));
    registry.register(Arc::new(IntegralByInterval));
    registry.register(Arc::new(KeepLastValue));
    registry.register(Arc::new(TransformNull));
    registry.register(Arc::new(ConsolidateBy));
}

/// Source text of a literal argument, for output names
fn literal(call: &Call, key: &str, index: usize) -> String {
    call.named_or_pos(key, index).map(ToString::to_string).unwrap_or_default()
}

struct Absolute;

#[async_trait]
impl Function for Absolute {
    fn descriptions(&self) -> Vec<FunctionDescription> {
        vec![FunctionDescription::new("absolute", "Transform", "Absolute value of every point.")
            .param(series_list())]
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
        Ok(for_each_series(series, |s| {
            s.clone_shell(format!("absolute({})", s.name))
                .with_values(s.values.iter().map(|v| v.abs()).collect())
                .tag("absolute", "1")
        }))
    }
}

struct Scale;

#[async_trait]
impl Function for Scale {
    fn descriptions(&self) -> Vec<FunctionDescription> {
        vec![FunctionDescription::new("scale", "Transform", "Multiply every point by a constant.")
            .param(series_list())
            .param(FunctionParam::new("factor", ParamType::Float).required())]
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
        let factor = call.float_named_or_pos_default("factor", 1, 1.0)?;
        let text = literal(call, "factor", 1);
        Ok(for_each_series(series, |s| {
            s.clone_shell(format!("scale({},{})", s.name, text))
                .with_values(s.values.iter().map(|v| v * factor).collect())
                .tag("scale", text.as_str())
        }))
    }
}

struct Offset;

#[async_trait]
impl Function for Offset {
    fn descriptions(&self) -> Vec<FunctionDescription> {
        vec![FunctionDescription::new("offset", "Transform", "Add a constant to every point.")
            .param(series_list())
            .param(FunctionParam::new("factor", ParamType::Float).required())]
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
        let amount = call.float_named_or_pos_default("factor", 1, 0.0)?;
        let text = literal(call, "factor", 1);
        Ok(for_each_series(series, |s| {
            s.clone_shell(format!("offset({},{})", s.name, text))
                .with_values(s.values.iter().map(|v| v + amount).collect())
                .tag("offset", text.as_str())
        }))
    }
}

struct Derivative;

#[async_trait]
impl Function for Derivative {
    fn descriptions(&self) -> Vec<FunctionDescription> {
        vec![FunctionDescription::new(
            "derivative",
            "Transform",
            "Difference between each point and the one before it.",
        )
        .param(series_list())]
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
        Ok(for_each_series(series, |s| {
            let mut prev = f64::NAN;
            let deltas = s
                .values
                .iter()
                .map(|&v| {
                    let delta = v - prev;
                    prev = v;
                    delta
                })
                .collect();
            s.clone_shell(format!("derivative({})", s.name))
                .with_values(deltas)
                .tag("derivative", "1")
        }))
    }
}

/// Delta for counters that only grow, handling wraps and resets
///
/// Returns the output point and the new previous value.
fn non_negative_delta(val: f64, prev: f64, max: Option<f64>, min: Option<f64>) -> (f64, f64) {
    if max.is_some_and(|m| val > m) || min.is_some_and(|m| val < m) {
        return (f64::NAN, f64::NAN);
    }
    if prev.is_nan() || val.is_nan() {
        return (f64::NAN, val);
    }
    if val >= prev {
        return (val - prev, val);
    }
    if let Some(max) = max {
        return (max + 1.0 + val - prev - min.unwrap_or(0.0), val);
    }
    if let Some(min) = min {
        return (val - min, val);
    }
    (f64::NAN, val)
}

struct NonNegativeDerivative;

#[async_trait]
impl Function for NonNegativeDerivative {
    fn descriptions(&self) -> Vec<FunctionDescription> {
        vec![FunctionDescription::new(
            "nonNegativeDerivative",
            "Transform",
            "Derivative of a counter; drops negative deltas unless a wrap can be computed.",
        )
        .param(series_list())
        .param(FunctionParam::new("maxValue", ParamType::Float))
        .param(FunctionParam::new("minValue", ParamType::Float))]
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
        let max = call.float_named_or_pos_opt("maxValue", 1)?;
        let min = call.float_named_or_pos_opt("minValue", 2)?;
        Ok(for_each_series(series, |s| {
            let mut prev = f64::NAN;
            let deltas = s
                .values
                .iter()
                .map(|&v| {
                    let (delta, next) = non_negative_delta(v, prev, max, min);
                    prev = next;
                    delta
                })
                .collect();
            s.clone_shell(format!("nonNegativeDerivative({})", s.name))
                .with_values(deltas)
                .tag("nonNegativeDerivative", "1")
        }))
    }
}

struct Integral;

#[async_trait]
impl Function for Integral {
    fn descriptions(&self) -> Vec<FunctionDescription> {
        vec![FunctionDescription::new("integral", "Transform", "Running total of every point.")
            .param(series_list())]
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
        Ok(for_each_series(series, |s| {
            let mut total = 0.0;
            let sums = s
                .values
                .iter()
                .map(|&v| {
                    if v.is_nan() {
                        return f64::NAN;
                    }
                    total += v;
                    total
                })
                .collect();
            s.clone_shell(format!("integral({})", s.name))
                .with_values(sums)
                .tag("integral", "1")
        }))
    }
}

struct IntegralByInterval;

#[async_trait]
impl Function for IntegralByInterval {
    fn descriptions(&self) -> Vec<FunctionDescription> {
        vec![FunctionDescription::new(
            "integralByInterval",
            "Transform",
            "Running total that resets at every interval boundary counted from the query start.",
        )
        .param(series_list())
        .param(FunctionParam::new("intervalUnit", ParamType::Interval).required())]
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
        let unit = call.string_named_or_pos_default("intervalUnit", 1, "")?;
        let interval = positive_interval(&call.name, call.interval_named_or_pos_default("intervalUnit", 1, 1, 0)?.abs())?;

        Ok(for_each_series(series, |s| {
            let mut total = 0.0;
            let sums = (0..s.len())
                .map(|i| {
                    let t = s.timestamp(i) - from;
                    if t.div_euclid(interval) != (t - s.step_time).div_euclid(interval) {
                        total = 0.0;
                    }
                    let v = s.values[i];
                    if !v.is_nan() {
                        total += v;
                    }
                    total
                })
                .collect();
            s.clone_shell(format!("integralByInterval({},'{}')", s.name, unit))
                .with_values(sums)
                .tag("integralByInterval", unit.as_str())
        }))
    }
}

struct KeepLastValue;

#[async_trait]
impl Function for KeepLastValue {
    fn descriptions(&self) -> Vec<FunctionDescription> {
        vec![FunctionDescription::new(
            "keepLastValue",
            "Transform",
            "Fill gaps of at most `limit` points with the last value seen.",
        )
        .param(series_list())
        .param(FunctionParam::new("limit", ParamType::Integer).default("INF"))]
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
        let limit = call.float_named_or_pos_default("limit", 1, f64::INFINITY)?;
        Ok(for_each_series(series, |s| {
            let filled = keep_last_value(&s.values, limit);
            s.clone_shell(format!("keepLastValue({})", s.name))
                .with_values(filled)
                .tag("keepLastValue", limit.to_string())
        }))
    }
}

/// Backfill runs of NaN no longer than `limit`; the first point is never filled
fn keep_last_value(values: &[f64], limit: f64) -> Vec<f64> {
    let mut out = values.to_vec();
    let fits = |run: usize| run > 0 && run as f64 <= limit;
    let mut run = 0usize;
    for i in 1..out.len() {
        if out[i].is_nan() {
            run += 1;
            continue;
        }
        if fits(run) {
            let last = out[i - run - 1];
            out[i - run..i].fill(last);
        }
        run = 0;
    }
    if fits(run) {
        let len = out.len();
        let last = out[len - run - 1];
        out[len - run..].fill(last);
    }
    out
}

struct TransformNull;

#[async_trait]
impl Function for TransformNull {
    fn descriptions(&self) -> Vec<FunctionDescription> {
        vec![FunctionDescription::new(
            "transformNull",
            "Transform",
            "Replace missing points with a default, optionally only where a reference series has data.",
        )
        .param(series_list())
        .param(FunctionParam::new("default", ParamType::Float).default(0i64))
        .param(FunctionParam::new("referenceSeries", ParamType::SeriesList))]
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
        let default = call.float_named_or_pos_default("default", 1, 0.0)?;

        // per index: fill value, or NaN where no reference series has data
        let mut defaults: Option<Vec<f64>> = None;
        if let Some(expr) = call.named_or_pos("referenceSeries", 2) {
            let reference = series_expr(eval, call, 2, expr, from, until, values).await?;
            let len = reference.iter().map(Series::len).max().unwrap_or(0);
            defaults = Some(
                (0..len)
                    .map(|i| {
                        let present = reference.iter().any(|r| r.values.get(i).is_some_and(|v| !v.is_nan()));
                        if present {
                            default
                        } else {
                            f64::NAN
                        }
                    })
                    .collect(),
            );
        }

        Ok(for_each_series(series, |s| {
            let filled = s
                .values
                .iter()
                .enumerate()
                .map(|(i, &v)| match &defaults {
                    _ if !v.is_nan() => v,
                    Some(d) => d.get(i).copied().unwrap_or(f64::NAN),
                    None => default,
                })
                .collect();
            let name = match defaults {
                Some(_) => format!("transformNull({},{},referenceSeries)", s.name, default),
                None => format!("transformNull({},{})", s.name, default),
            };
            s.clone_shell(name)
                .with_values(filled)
                .tag("transformNull", default.to_string())
        }))
    }
}

struct ConsolidateBy;

#[async_trait]
impl Function for ConsolidateBy {
    fn descriptions(&self) -> Vec<FunctionDescription> {
        vec![FunctionDescription::new(
            "consolidateBy",
            "Special",
            "Set the reducer used when the series is downsampled for display.",
        )
        .param(series_list())
        .param(super::agg_func("consolidationFunc").required())]
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
        let func = call.string_named_or_pos_default("consolidationFunc", 1, "")?;
        consolidation_func(&func)?;
        Ok(for_each_series(series, |s| {
            let mut out = s
                .clone_shell(format!("consolidateBy({},\"{}\")", s.name, func))
                .with_values(s.values.clone())
                .tag("consolidateBy", func.as_str());
            out.consolidation_func = func.clone();
            out
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::EvalError;
    use crate::testing::{assert_values, eval_target};

    const NAN: f64 = f64::NAN;

    async fn run(target: &str, values: Vec<f64>) -> EvalResult<Vec<Series>> {
        eval_target(target, 0, values.len() as i64 * 60, vec![Series::new("m", values, 60, 0)]).await
    }

    #[tokio::test]
    async fn test_point_wise() {
        let out = run("absolute(m)", vec![-1.0, NAN, 2.0]).await.unwrap();
        assert_eq!(out[0].name, "absolute(m)");
        assert_values(&out[0].values, &[1.0, NAN, 2.0]);

        let out = run("scale(m, 2.5)", vec![-1.0, NAN, 2.0]).await.unwrap();
        assert_eq!(out[0].name, "scale(m,2.5)");
        assert_values(&out[0].values, &[-2.5, NAN, 5.0]);
        assert_eq!(out[0].tags["name"], "m");

        let out = run("offset(m, -1)", vec![-1.0, NAN, 2.0]).await.unwrap();
        assert_eq!(out[0].name, "offset(m,-1)");
        assert_values(&out[0].values, &[-2.0, NAN, 1.0]);
    }

    #[tokio::test]
    async fn test_derivative() {
        let out = run("derivative(m)", vec![1.0, 3.0, NAN, 4.0, 6.0, 5.0]).await.unwrap();
        assert_eq!(out[0].name, "derivative(m)");
        assert_values(&out[0].values, &[NAN, 2.0, NAN, NAN, 2.0, -1.0]);
    }

    #[tokio::test]
    async fn test_non_negative_derivative() {
        let input = vec![1.0, 3.0, NAN, 4.0, 6.0, 2.0, 5.0];
        let out = run("nonNegativeDerivative(m)", input.clone()).await.unwrap();
        assert_values(&out[0].values, &[NAN, 2.0, NAN, NAN, 2.0, NAN, 3.0]);

        let out = run("nonNegativeDerivative(m, 7)", input.clone()).await.unwrap();
        assert_values(&out[0].values, &[NAN, 2.0, NAN, NAN, 2.0, 4.0, 3.0]);

        let out = run("nonNegativeDerivative(m, minValue=1)", input.clone()).await.unwrap();
        assert_values(&out[0].values, &[NAN, 2.0, NAN, NAN, 2.0, 1.0, 3.0]);

        let out = run("nonNegativeDerivative(m, 5)", input).await.unwrap();
        assert_values(&out[0].values, &[NAN, 2.0, NAN, NAN, NAN, NAN, 3.0]);
    }

    #[tokio::test]
    async fn test_integral() {
        let out = run("integral(m)", vec![1.0, NAN, 2.0, 3.0]).await.unwrap();
        assert_eq!(out[0].name, "integral(m)");
        assert_values(&out[0].values, &[1.0, NAN, 3.0, 6.0]);
    }

    #[tokio::test]
    async fn test_integral_by_interval() {
        let out = run("integralByInterval(m, '2min')", vec![1.0, 2.0, 3.0, NAN, 5.0, 6.0])
            .await
            .unwrap();
        assert_eq!(out[0].name, "integralByInterval(m,'2min')");
        assert_eq!(out[0].tags["integralByInterval"], "2min");
        assert_values(&out[0].values, &[1.0, 3.0, 3.0, 3.0, 5.0, 11.0]);
    }

    #[tokio::test]
    async fn test_keep_last_value() {
        let input = vec![NAN, 1.0, NAN, NAN, 2.0, NAN, NAN, NAN];
        let out = run("keepLastValue(m)", input.clone()).await.unwrap();
        assert_eq!(out[0].name, "keepLastValue(m)");
        assert_values(&out[0].values, &[NAN, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 2.0]);

        let out = run("keepLastValue(m, 2)", input).await.unwrap();
        assert_values(&out[0].values, &[NAN, 1.0, 1.0, 1.0, 2.0, NAN, NAN, NAN]);
    }

    #[tokio::test]
    async fn test_transform_null() {
        let out = run("transformNull(m)", vec![NAN, 1.0, NAN]).await.unwrap();
        assert_eq!(out[0].name, "transformNull(m,0)");
        assert_values(&out[0].values, &[0.0, 1.0, 0.0]);

        let data = vec![
            Series::new("m", vec![NAN, 1.0, NAN, NAN], 60, 0),
            Series::new("ref", vec![5.0, NAN, NAN, 7.0], 60, 0),
        ];
        let out = eval_target("transformNull(m, -1, ref)", 0, 240, data).await.unwrap();
        assert_eq!(out[0].name, "transformNull(m,-1,referenceSeries)");
        assert_values(&out[0].values, &[-1.0, 1.0, NAN, -1.0]);
    }

    #[tokio::test]
    async fn test_consolidate_by() {
        let out = run("consolidateBy(m, 'max')", vec![1.0]).await.unwrap();
        assert_eq!(out[0].name, "consolidateBy(m,\"max\")");
        assert_eq!(out[0].consolidation_func, "max");

        let err = run("consolidateBy(m, 'bogus')", vec![1.0]).await.unwrap_err();
        assert!(matches!(err, EvalError::UnsupportedConsolidationFunction(_)));
    }
}
