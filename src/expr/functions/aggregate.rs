//! Combine functions: many series in, fewer series out

use super::{agg_func, consolidation_func, series_list};
use crate::consolidations::{percentile, ConsolidationFunc, SUMMARIZER_NAMES};
use crate::expr::args::NodeOrTag;
use crate::expr::description::{FunctionDescription, FunctionParam, ParamType};
use crate::expr::error::{EvalError, EvalResult};
use crate::expr::evaluator::Evaluator;
use crate::expr::fetch::MetricMap;
use crate::expr::helper::{agg_key, series_arg, series_args_remove_missing, single_series_arg};
use crate::expr::registry::{Function, FunctionRegistry};
use crate::parser::{Call, Expr};
use crate::series::{aggregate_series, align_series, Series};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.register(Arc::new(Aggregate));
    for base in SUMMARIZER_NAMES {
        if let Some(func) = ConsolidationFunc::parse(base) {
            registry.register(Arc::new(Summarizer { base, func }));
        }
    }
    registry.register(Arc::new(AggregateWithWildcards));
    registry.register(Arc::new(GroupByNode));
    registry.register(Arc::new(GroupByNodes));
    registry.register(Arc::new(PercentileOfSeries));
    registry.register(Arc::new(DivideSeries));
}

/// Split series into groups by key, keeping first-seen key order
fn group_by<F>(series: Vec<Series>, mut key: F) -> Vec<(String, Vec<Series>)>
where
    F: FnMut(&Series) -> String,
{
    let mut groups: Vec<(String, Vec<Series>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for s in series {
        let k = key(&s);
        match index.get(&k) {
            Some(&i) => groups[i].1.push(s),
            None => {
                index.insert(k.clone(), groups.len());
                groups.push((k, vec![s]));
            }
        }
    }
    groups
}

fn aggregate_groups(groups: Vec<(String, Vec<Series>)>, func: ConsolidationFunc) -> Vec<Series> {
    groups
        .into_iter()
        .flat_map(|(key, members)| {
            let xff = members[0].x_files_factor;
            aggregate_series(&key, &members, &|v| func.apply(v), xff)
        })
        .collect()
}

struct Aggregate;

#[async_trait]
impl Function for Aggregate {
    fn descriptions(&self) -> Vec<FunctionDescription> {
        vec![FunctionDescription::new(
            "aggregate",
            "Combine",
            "Aggregate series using the specified function.",
        )
        .param(series_list())
        .param(agg_func("func").required())
        .param(FunctionParam::new("xFilesFactor", ParamType::Float))]
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
        let name = call.string_named_or_pos_default("func", 1, "")?;
        let func = consolidation_func(&name)?;
        let Some(first) = series.first() else {
            return Ok(Vec::new());
        };
        let xff = match call.float_named_or_pos_opt("xFilesFactor", 2)? {
            Some(xff) => xff as f32,
            None => first.x_files_factor,
        };
        let base = name.strip_suffix("Series").unwrap_or(&name);
        let target = format!("{}Series({})", base, call.args[0]);
        Ok(aggregate_series(&target, &series, &|v| func.apply(v), xff))
    }
}

/// `sumSeries` and friends, each also answering to its short name
struct Summarizer {
    base: &'static str,
    func: ConsolidationFunc,
}

#[async_trait]
impl Function for Summarizer {
    fn descriptions(&self) -> Vec<FunctionDescription> {
        let desc = FunctionDescription::new(
            format!("{}Series", self.base),
            "Combine",
            format!("Combine series point by point with '{}'.", self.base),
        )
        .param(FunctionParam::new("seriesLists", ParamType::SeriesLists).required().multiple());
        let alias = desc.alias(self.base);
        vec![desc, alias]
    }

    async fn evaluate(
        &self,
        eval: &Evaluator,
        call: &Call,
        from: i64,
        until: i64,
        values: &mut MetricMap,
    ) -> EvalResult<Vec<Series>> {
        let (series, arg_string) = series_args_remove_missing(eval, call, from, until, values).await?;
        let xff = series.first().map(|s| s.x_files_factor).unwrap_or(0.0);
        let name = format!("{}Series({})", self.base, arg_string);
        let func = self.func;
        Ok(aggregate_series(&name, &series, &|v| func.apply(v), xff))
    }
}

struct AggregateWithWildcards;

#[async_trait]
impl Function for AggregateWithWildcards {
    fn descriptions(&self) -> Vec<FunctionDescription> {
        vec![FunctionDescription::new(
            "aggregateWithWildcards",
            "Combine",
            "Aggregate series after removing the given name nodes, grouping by what is left.",
        )
        .param(series_list())
        .param(agg_func("func").required())
        .param(FunctionParam::new("positions", ParamType::Integer).multiple())]
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
        let func = consolidation_func(&call.string_arg(1)?)?;
        let positions = call.int_args_from(2)?;

        let groups = group_by(series, |s| {
            s.name
                .split('.')
                .enumerate()
                .filter(|(i, _)| !positions.contains(&(*i as i64)))
                .map(|(_, node)| node)
                .collect::<Vec<_>>()
                .join(".")
        });
        Ok(aggregate_groups(groups, func))
    }
}

struct GroupByNode;

#[async_trait]
impl Function for GroupByNode {
    fn descriptions(&self) -> Vec<FunctionDescription> {
        vec![FunctionDescription::new(
            "groupByNode",
            "Combine",
            "Group series by one name node or tag and aggregate each group.",
        )
        .param(series_list())
        .param(FunctionParam::new("nodeNum", ParamType::NodeOrTag).required())
        .param(agg_func("callback").default("average"))]
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
        let node = match call.named_or_pos("nodeNum", 1) {
            Some(Expr::String { value, .. }) => NodeOrTag::Tag(value.clone()),
            _ => NodeOrTag::Node(call.int_named_or_pos_default("nodeNum", 1, 0)?),
        };
        let func = consolidation_func(&call.string_named_or_pos_default("callback", 2, "average")?)?;
        let groups = group_by(series, |s| agg_key(s, std::slice::from_ref(&node)));
        Ok(aggregate_groups(groups, func))
    }
}

struct GroupByNodes;

#[async_trait]
impl Function for GroupByNodes {
    fn descriptions(&self) -> Vec<FunctionDescription> {
        vec![FunctionDescription::new(
            "groupByNodes",
            "Combine",
            "Group series by several name nodes or tags and aggregate each group.",
        )
        .param(series_list())
        .param(agg_func("callback").required())
        .param(FunctionParam::new("nodes", ParamType::NodeOrTag).multiple())]
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
        let func = consolidation_func(&call.string_arg(1)?)?;
        let nodes = call.nodes_or_tags_from(2)?;
        let groups = group_by(series, |s| agg_key(s, &nodes));
        Ok(aggregate_groups(groups, func))
    }
}

struct PercentileOfSeries;

#[async_trait]
impl Function for PercentileOfSeries {
    fn descriptions(&self) -> Vec<FunctionDescription> {
        vec![FunctionDescription::new(
            "percentileOfSeries",
            "Combine",
            "Point by point percentile across the series list.",
        )
        .param(series_list())
        .param(FunctionParam::new("n", ParamType::Float).required())
        .param(FunctionParam::new("interpolate", ParamType::Boolean).default(false))]
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
        let n = call.float_named_or_pos_default("n", 1, 0.0)?;
        if !(0.0..=100.0).contains(&n) {
            return Err(EvalError::invalid_argument(&call.name, format!("percentile {} out of range", n)));
        }
        let interpolate = call.bool_named_or_pos_default("interpolate", 2, false)?;
        let name = format!("percentileOfSeries({},{})", call.args[0], n);
        let xff = series.first().map(|s| s.x_files_factor).unwrap_or(0.0);
        Ok(aggregate_series(&name, &series, &|v| percentile(v, n, interpolate), xff))
    }
}

struct DivideSeries;

#[async_trait]
impl Function for DivideSeries {
    fn descriptions(&self) -> Vec<FunctionDescription> {
        vec![FunctionDescription::new(
            "divideSeries",
            "Combine",
            "Divide each dividend series by a single divisor series.",
        )
        .param(FunctionParam::new("dividendSeriesList", ParamType::SeriesList).required())
        .param(FunctionParam::new("divisorSeries", ParamType::SeriesList).required())]
    }

    async fn evaluate(
        &self,
        eval: &Evaluator,
        call: &Call,
        from: i64,
        until: i64,
        values: &mut MetricMap,
    ) -> EvalResult<Vec<Series>> {
        let dividends = series_arg(eval, call, 0, from, until, values).await?;
        let Some(divisor) = single_series_arg(eval, call, 1, from, until, values).await? else {
            return Ok(Vec::new());
        };

        Ok(dividends
            .iter()
            .map(|dividend| {
                let aligned = align_series(&[dividend.clone(), divisor.clone()]);
                let quotients = aligned[0]
                    .values
                    .iter()
                    .zip(&aligned[1].values)
                    .map(|(a, b)| if *b == 0.0 || b.is_nan() { f64::NAN } else { a / b })
                    .collect();
                let name = format!("divideSeries({},{})", dividend.name, divisor.name);
                aligned[0].clone_shell(name).with_values(quotients)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::expr::EvalError;
    use crate::series::Series;
    use crate::testing::{assert_values, eval_target};

    const NAN: f64 = f64::NAN;

    fn data() -> Vec<Series> {
        vec![
            Series::new("servers.web01.cpu", vec![1.0, NAN, 3.0, 4.0], 60, 0),
            Series::new("servers.web02.cpu", vec![2.0, NAN, NAN, 8.0], 60, 0),
            Series::new("servers.db01.cpu", vec![3.0, NAN, 3.0, 0.0], 60, 0),
        ]
    }

    #[tokio::test]
    async fn test_sum_series() {
        let out = eval_target("sumSeries(servers.web*.cpu)", 0, 240, data()).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "sumSeries(servers.web*.cpu)");
        assert_values(&out[0].values, &[3.0, NAN, 3.0, 12.0]);
        assert!(out[0].is_consistent());
    }

    #[tokio::test]
    async fn test_short_alias_and_missing_args_dropped_from_name() {
        let out = eval_target("sum(servers.web01.cpu, nothing.here)", 0, 240, data()).await.unwrap();
        assert_eq!(out[0].name, "sumSeries(servers.web01.cpu)");
        assert_values(&out[0].values, &[1.0, NAN, 3.0, 4.0]);
    }

    #[tokio::test]
    async fn test_summarizers() {
        let cases = [
            ("minSeries(servers.*.cpu)", vec![1.0, NAN, 3.0, 0.0]),
            ("maxSeries(servers.*.cpu)", vec![3.0, NAN, 3.0, 8.0]),
            ("averageSeries(servers.*.cpu)", vec![2.0, NAN, 3.0, 4.0]),
            ("countSeries(servers.*.cpu)", vec![3.0, NAN, 2.0, 3.0]),
            ("diffSeries(servers.*.cpu)", vec![-4.0, NAN, 0.0, -4.0]),
            ("multiplySeries(servers.web*.cpu)", vec![2.0, NAN, 3.0, 32.0]),
            ("rangeOfSeries(servers.*.cpu)", vec![2.0, NAN, 0.0, 8.0]),
        ];
        for (target, expected) in cases {
            let out = eval_target(target, 0, 240, data()).await.unwrap();
            assert_values(&out[0].values, &expected);
        }
    }

    #[tokio::test]
    async fn test_empty_aggregation() {
        let out = eval_target("sumSeries(nothing.*)", 0, 240, data()).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_aggregate() {
        let out = eval_target("aggregate(servers.*.cpu, 'max')", 0, 240, data()).await.unwrap();
        assert_eq!(out[0].name, "maxSeries(servers.*.cpu)");
        assert_values(&out[0].values, &[3.0, NAN, 3.0, 8.0]);

        let out = eval_target("aggregate(servers.*.cpu, 'sum', 0.5)", 0, 240, data()).await.unwrap();
        assert_values(&out[0].values, &[6.0, NAN, 6.0, 12.0]);

        let out = eval_target("aggregate(servers.*.cpu, 'sum', 0.7)", 0, 240, data()).await.unwrap();
        assert_values(&out[0].values, &[6.0, NAN, NAN, 12.0]);

        let err = eval_target("aggregate(servers.*.cpu, 'bogus')", 0, 240, data()).await.unwrap_err();
        assert!(matches!(err, EvalError::UnsupportedConsolidationFunction(_)));
    }

    #[tokio::test]
    async fn test_aggregate_with_wildcards() {
        let data = vec![
            Series::new("a.x.total", vec![1.0, 2.0], 60, 0),
            Series::new("a.y.total", vec![3.0, 4.0], 60, 0),
            Series::new("b.x.total", vec![5.0, 6.0], 60, 0),
        ];
        let out = eval_target("aggregateWithWildcards(*.*.total, 'sum', 1)", 0, 120, data).await.unwrap();
        let names: Vec<&str> = out.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["a.total", "b.total"]);
        assert_values(&out[0].values, &[4.0, 6.0]);
        assert_values(&out[1].values, &[5.0, 6.0]);
    }

    #[tokio::test]
    async fn test_group_by_node() {
        let out = eval_target("groupByNode(servers.*.cpu, 1, 'sum')", 0, 240, data()).await.unwrap();
        let names: Vec<&str> = out.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["web01", "web02", "db01"]);

        let data = vec![
            Series::new("dc1.web01.cpu", vec![1.0], 60, 0),
            Series::new("dc1.web02.cpu", vec![2.0], 60, 0),
            Series::new("dc2.web01.cpu", vec![4.0], 60, 0),
        ];
        let out = eval_target("groupByNode(*.*.cpu, 0)", 0, 60, data.clone()).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].name, "dc1");
        assert_values(&out[0].values, &[1.5]);

        let out = eval_target("groupByNodes(*.*.cpu, 'sum', 1, 2)", 0, 60, data).await.unwrap();
        let names: Vec<&str> = out.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["web01.cpu", "web02.cpu"]);
        assert_values(&out[0].values, &[5.0]);
    }

    #[tokio::test]
    async fn test_group_by_tag() {
        let data = vec![
            Series::new("cpu;dc=east", vec![1.0], 60, 0),
            Series::new("mem;dc=east", vec![2.0], 60, 0),
            Series::new("cpu;dc=west", vec![4.0], 60, 0),
        ];
        let out = eval_target("groupByNodes(*, 'sum', 'dc')", 0, 60, data).await.unwrap();
        let names: Vec<&str> = out.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["east", "west"]);
        assert_values(&out[0].values, &[3.0]);
    }

    #[tokio::test]
    async fn test_percentile_of_series() {
        let data = vec![
            Series::new("p.1", vec![1.0, 10.0], 60, 0),
            Series::new("p.2", vec![2.0, 20.0], 60, 0),
            Series::new("p.3", vec![3.0, 30.0], 60, 0),
            Series::new("p.4", vec![4.0, NAN], 60, 0),
        ];
        let out = eval_target("percentileOfSeries(p.*, 50)", 0, 120, data.clone()).await.unwrap();
        assert_eq!(out[0].name, "percentileOfSeries(p.*,50)");
        assert_values(&out[0].values, &[2.0, 20.0]);

        let out = eval_target("percentileOfSeries(p.*, 50, interpolate=true)", 0, 120, data).await.unwrap();
        assert_values(&out[0].values, &[2.5, 20.0]);
    }

    #[tokio::test]
    async fn test_percentile_of_series_x_files_factor() {
        let mut data = vec![
            Series::new("q.a", vec![1.0, 2.0], 60, 0),
            Series::new("q.b", vec![NAN, 4.0], 60, 0),
        ];
        let out = eval_target("percentileOfSeries(q.*, 50)", 0, 120, data.clone()).await.unwrap();
        assert_values(&out[0].values, &[1.0, 2.0]);

        for s in data.iter_mut() {
            s.x_files_factor = 0.6;
        }
        let out = eval_target("percentileOfSeries(q.*, 50)", 0, 120, data).await.unwrap();
        assert_values(&out[0].values, &[NAN, 2.0]);
    }

    #[tokio::test]
    async fn test_divide_series() {
        let data = vec![
            Series::new("a.1", vec![10.0, 20.0, 30.0], 60, 0),
            Series::new("a.2", vec![5.0, NAN, 6.0], 60, 0),
            Series::new("d", vec![2.0, 0.0, NAN], 60, 0),
        ];
        let out = eval_target("divideSeries(a.*, d)", 0, 180, data.clone()).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].name, "divideSeries(a.1,d)");
        assert_values(&out[0].values, &[5.0, NAN, NAN]);
        assert_values(&out[1].values, &[2.5, NAN, NAN]);

        let err = eval_target("divideSeries(d, a.*)", 0, 180, data.clone()).await.unwrap_err();
        assert!(matches!(err, EvalError::WildcardNotAllowed { count: 2, .. }));

        let out = eval_target("divideSeries(a.*, missing)", 0, 180, data).await.unwrap();
        assert!(out.is_empty());
    }
}
