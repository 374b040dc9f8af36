//! Holt-Winters forecasting
//!
//! Triple exponential smoothing with fixed coefficients. Every function
//! fetches a bootstrap interval before the query window to warm the model
//! up, then drops the bootstrap points from its output.

use super::{offset_time, series_list};
use crate::expr::description::{FunctionDescription, FunctionParam, ParamType};
use crate::expr::error::EvalResult;
use crate::expr::evaluator::Evaluator;
use crate::expr::fetch::MetricMap;
use crate::expr::helper::series_arg;
use crate::expr::registry::{Function, FunctionRegistry};
use crate::parser::Call;
use crate::series::Series;
use async_trait::async_trait;
use std::sync::Arc;

const ALPHA: f64 = 0.1;
const BETA: f64 = 0.0035;
const GAMMA: f64 = 0.1;

const DEFAULT_BOOTSTRAP: i64 = 7 * 86_400;
const DEFAULT_SEASONALITY: i64 = 86_400;
const DEFAULT_DELTA: f64 = 3.0;

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.register(Arc::new(HoltWinters { kind: Kind::Forecast }));
    registry.register(Arc::new(HoltWinters { kind: Kind::ConfidenceBands }));
    registry.register(Arc::new(HoltWinters { kind: Kind::Aberration }));
}

/// Model output, aligned with the input samples
#[derive(Debug, Clone, PartialEq)]
struct Analysis {
    predictions: Vec<f64>,
    deviations: Vec<f64>,
}

/// Run the model over `values`; a season spans `season_length` points
fn analyze(values: &[f64], season_length: usize) -> Analysis {
    let mut intercepts: Vec<Option<f64>> = Vec::with_capacity(values.len());
    let mut slopes = Vec::with_capacity(values.len());
    let mut seasonals = Vec::with_capacity(values.len());
    let mut predictions = Vec::with_capacity(values.len());
    let mut deviations = Vec::with_capacity(values.len());
    let mut next_prediction: Option<f64> = None;

    let seasonal_at = |history: &[f64], i: usize| i.checked_sub(season_length).map_or(0.0, |j| history[j]);

    for (i, &actual) in values.iter().enumerate() {
        if actual.is_nan() {
            // a gap breaks the recurrence; carry on from the next sample
            intercepts.push(None);
            slopes.push(0.0);
            seasonals.push(0.0);
            predictions.push(next_prediction.unwrap_or(f64::NAN));
            deviations.push(0.0);
            next_prediction = None;
            continue;
        }

        let (last_intercept, last_slope, prediction) = match i {
            0 => (actual, 0.0, Some(actual)),
            _ => (
                intercepts[i - 1].unwrap_or(actual),
                slopes[i - 1],
                next_prediction,
            ),
        };

        let last_seasonal = seasonal_at(&seasonals, i);
        let next_last_seasonal = if i + 1 >= season_length {
            seasonals.get(i + 1 - season_length).copied().unwrap_or(0.0)
        } else {
            0.0
        };
        let last_deviation = seasonal_at(&deviations, i);

        let intercept = ALPHA * (actual - last_seasonal) + (1.0 - ALPHA) * (last_intercept + last_slope);
        let slope = BETA * (intercept - last_intercept) + (1.0 - BETA) * last_slope;
        let seasonal = GAMMA * (actual - intercept) + (1.0 - GAMMA) * last_seasonal;
        let deviation = GAMMA * (actual - prediction.unwrap_or(0.0)).abs() + (1.0 - GAMMA) * last_deviation;

        intercepts.push(Some(intercept));
        slopes.push(slope);
        seasonals.push(seasonal);
        predictions.push(prediction.unwrap_or(f64::NAN));
        deviations.push(deviation);
        next_prediction = Some(intercept + slope + next_last_seasonal);
    }

    Analysis {
        predictions,
        deviations,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Forecast,
    ConfidenceBands,
    Aberration,
}

struct HoltWinters {
    kind: Kind,
}

impl HoltWinters {
    fn name(&self) -> &'static str {
        match self.kind {
            Kind::Forecast => "holtWintersForecast",
            Kind::ConfidenceBands => "holtWintersConfidenceBands",
            Kind::Aberration => "holtWintersAberration",
        }
    }

    /// Position of `bootstrapInterval`; `delta` comes first where it exists
    fn bootstrap_index(&self) -> usize {
        match self.kind {
            Kind::Forecast => 1,
            _ => 2,
        }
    }

    fn bootstrap(&self, call: &Call) -> EvalResult<i64> {
        Ok(call
            .interval_named_or_pos_default("bootstrapInterval", self.bootstrap_index(), 1, DEFAULT_BOOTSTRAP)?
            .abs())
    }

    fn seasonality(&self, call: &Call) -> EvalResult<i64> {
        Ok(call
            .interval_named_or_pos_default("seasonality", self.bootstrap_index() + 1, 1, DEFAULT_SEASONALITY)?
            .abs())
    }
}

/// Lower and upper band values from forecast and deviation
fn bands(predictions: &[f64], deviations: &[f64], delta: f64) -> (Vec<f64>, Vec<f64>) {
    predictions
        .iter()
        .zip(deviations)
        .map(|(p, d)| (p - delta * d, p + delta * d))
        .unzip()
}

#[async_trait]
impl Function for HoltWinters {
    fn descriptions(&self) -> Vec<FunctionDescription> {
        let description = match self.kind {
            Kind::Forecast => "Holt-Winters forecast of each series.",
            Kind::ConfidenceBands => "Upper and lower Holt-Winters confidence bands, `delta` deviations from the forecast.",
            Kind::Aberration => "Distance of each point outside its Holt-Winters confidence band, zero inside it.",
        };
        let mut desc = FunctionDescription::new(self.name(), "Calculate", description).param(series_list());
        if self.kind != Kind::Forecast {
            desc = desc.param(FunctionParam::new("delta", ParamType::Integer).default(3i64));
        }
        vec![desc
            .param(FunctionParam::new("bootstrapInterval", ParamType::Interval).default("7d"))
            .param(FunctionParam::new("seasonality", ParamType::Interval).default("1d"))]
    }

    fn fetch_window(&self, call: &Call, from: i64, until: i64) -> EvalResult<(i64, i64)> {
        Ok((offset_time(from, -self.bootstrap(call)?)?, until))
    }

    async fn evaluate(
        &self,
        eval: &Evaluator,
        call: &Call,
        from: i64,
        until: i64,
        values: &mut MetricMap,
    ) -> EvalResult<Vec<Series>> {
        let bootstrap = self.bootstrap(call)?;
        let seasonality = self.seasonality(call)?;
        let delta = match self.kind {
            Kind::Forecast => DEFAULT_DELTA,
            _ => call.float_named_or_pos_default("delta", 1, DEFAULT_DELTA)?,
        };
        let series = series_arg(eval, call, 0, offset_time(from, -bootstrap)?, until, values).await?;

        let mut out = Vec::with_capacity(series.len());
        for s in &series {
            let season_length = (seasonality / s.step_time).max(1) as usize;
            let analysis = analyze(&s.values, season_length);
            let skip = ((bootstrap / s.step_time) as usize).min(s.len());
            let start = s.timestamp(skip);
            let shell = |name: String| s.clone_shell(name).with_start(start);

            let predictions = &analysis.predictions[skip..];
            let deviations = &analysis.deviations[skip..];
            match self.kind {
                Kind::Forecast => {
                    out.push(shell(format!("holtWintersForecast({})", s.name)).with_values(predictions.to_vec()));
                }
                Kind::ConfidenceBands => {
                    let (lower, upper) = bands(predictions, deviations, delta);
                    out.push(shell(format!("holtWintersConfidenceLower({})", s.name)).with_values(lower));
                    out.push(shell(format!("holtWintersConfidenceUpper({})", s.name)).with_values(upper));
                }
                Kind::Aberration => {
                    let (lower, upper) = bands(predictions, deviations, delta);
                    let aberration = s.values[skip..]
                        .iter()
                        .zip(lower.iter().zip(&upper))
                        .map(|(&actual, (&lo, &hi))| {
                            if actual > hi {
                                actual - hi
                            } else if actual < lo {
                                actual - lo
                            } else {
                                0.0
                            }
                        })
                        .collect();
                    out.push(shell(format!("holtWintersAberration({})", s.name)).with_values(aberration));
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{assert_values, eval_target};

    const NAN: f64 = f64::NAN;

    /// Flat at 5 with a spike on the last point
    fn spiky() -> Vec<Series> {
        let mut values = vec![5.0; 14];
        values[13] = 8.0;
        vec![Series::new("m", values, 60, 0)]
    }

    #[test]
    fn test_analyze_flat_series() {
        let analysis = analyze(&[5.0; 6], 1_440);
        assert_values(&analysis.predictions, &[5.0; 6]);
        assert_values(&analysis.deviations, &[0.0; 6]);
    }

    #[test]
    fn test_analyze_gaps() {
        let analysis = analyze(&[NAN, 2.0], 1_440);
        assert_values(&analysis.predictions, &[NAN, NAN]);
        assert_values(&analysis.deviations, &[0.0, 0.2]);
    }

    #[tokio::test]
    async fn test_forecast() {
        let out = eval_target("holtWintersForecast(m, '10min')", 600, 840, spiky()).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "holtWintersForecast(m)");
        assert_eq!(out[0].start_time, 600);
        assert_values(&out[0].values, &[5.0; 4]);
        assert!(out[0].is_consistent());
    }

    #[tokio::test]
    async fn test_confidence_bands() {
        let out = eval_target("holtWintersConfidenceBands(m, 3, '10min')", 600, 840, spiky())
            .await
            .unwrap();
        let names: Vec<&str> = out.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["holtWintersConfidenceLower(m)", "holtWintersConfidenceUpper(m)"]);
        assert_values(&out[0].values, &[5.0, 5.0, 5.0, 4.1]);
        assert_values(&out[1].values, &[5.0, 5.0, 5.0, 5.9]);
    }

    #[tokio::test]
    async fn test_bootstrap_out_of_range() {
        let err = eval_target(
            "holtWintersForecast(m, '290000000000y')",
            -1_000_000_000_000_000_000,
            0,
            spiky(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, crate::expr::EvalError::InvalidInterval(_)));
    }

    #[tokio::test]
    async fn test_aberration() {
        let out = eval_target("holtWintersAberration(m, bootstrapInterval='10min')", 600, 840, spiky())
            .await
            .unwrap();
        assert_eq!(out[0].name, "holtWintersAberration(m)");
        assert_values(&out[0].values, &[0.0, 0.0, 0.0, 2.1]);
    }
}
