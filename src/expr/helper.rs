//! Shared plumbing for function implementations

use super::args::NodeOrTag;
use super::error::{EvalError, EvalResult};
use super::evaluator::Evaluator;
use super::fetch::MetricMap;
use crate::parser::{is_name_char, Call, Expr};
use crate::series::Series;

/// Evaluate `expr`, rejecting literals
pub async fn series_expr(
    eval: &Evaluator,
    call: &Call,
    index: usize,
    expr: &Expr,
    from: i64,
    until: i64,
    values: &mut MetricMap,
) -> EvalResult<Vec<Series>> {
    if !expr.is_series() {
        return Err(EvalError::MissingTimeSeries {
            target: call.name.clone(),
            index,
        });
    }
    eval.eval(expr, from, until, values).await
}

/// Evaluate positional argument `index` as a series list
pub async fn series_arg(
    eval: &Evaluator,
    call: &Call,
    index: usize,
    from: i64,
    until: i64,
    values: &mut MetricMap,
) -> EvalResult<Vec<Series>> {
    let expr = call.arg(index).ok_or_else(|| EvalError::MissingArgument {
        target: call.name.clone(),
        param: format!("#{}", index + 1),
    })?;
    series_expr(eval, call, index, expr, from, until, values).await
}

/// Evaluate every positional argument from `start` on and concatenate
pub async fn series_args(
    eval: &Evaluator,
    call: &Call,
    start: usize,
    from: i64,
    until: i64,
    values: &mut MetricMap,
) -> EvalResult<Vec<Series>> {
    let mut out = Vec::new();
    for (index, expr) in call.args.iter().enumerate().skip(start) {
        out.extend(series_expr(eval, call, index, expr, from, until, values).await?);
    }
    Ok(out)
}

/// Like [`series_args`], also rendering the argument list without the
/// arguments that matched nothing
pub async fn series_args_remove_missing(
    eval: &Evaluator,
    call: &Call,
    from: i64,
    until: i64,
    values: &mut MetricMap,
) -> EvalResult<(Vec<Series>, String)> {
    let mut out = Vec::new();
    let mut kept = Vec::with_capacity(call.args.len());
    for (index, expr) in call.args.iter().enumerate() {
        let series = series_expr(eval, call, index, expr, from, until, values).await?;
        if !series.is_empty() {
            kept.push(expr.to_string());
            out.extend(series);
        }
    }
    let arg_string = if kept.len() == call.args.len() {
        call.arg_string.clone()
    } else {
        kept.join(",")
    };
    Ok((out, arg_string))
}

/// Evaluate an argument that must resolve to at most one series
pub async fn single_series_arg(
    eval: &Evaluator,
    call: &Call,
    index: usize,
    from: i64,
    until: i64,
    values: &mut MetricMap,
) -> EvalResult<Option<Series>> {
    let mut series = series_arg(eval, call, index, from, until, values).await?;
    match series.len() {
        0 | 1 => Ok(series.pop()),
        count => Err(EvalError::WildcardNotAllowed {
            target: call.name.clone(),
            count,
        }),
    }
}

/// Apply `f` to each series, producing one output per input
pub fn for_each_series<F>(series: Vec<Series>, f: F) -> Vec<Series>
where
    F: FnMut(&Series) -> Series,
{
    series.iter().map(f).collect()
}

/// Like [`for_each_series`] for transformations that can fail
pub fn try_for_each_series<F>(series: Vec<Series>, f: F) -> EvalResult<Vec<Series>>
where
    F: FnMut(&Series) -> EvalResult<Series>,
{
    series.iter().map(f).collect()
}

/// First metric path inside a possibly function-wrapped name
///
/// `alias(scale(a.b.c,2),'x')` yields `a.b.c`; tags after `;` are dropped.
pub fn extract_metric(name: &str) -> &str {
    let mut start = 0;
    let mut end = name.len();
    let mut braces = 0usize;
    for (i, c) in name.char_indices() {
        if is_name_char(c) {
            continue;
        }
        match c {
            '{' => braces += 1,
            '}' if braces > 0 => braces -= 1,
            ',' if braces > 0 => {}
            '(' => start = i + 1,
            _ => {
                end = i;
                break;
            }
        }
    }
    &name[start..end.max(start)]
}

/// Grouping key from selected name nodes and tags, joined by `.`
///
/// Negative node indexes count from the end; out of range nodes are
/// skipped and missing tags contribute an empty segment.
pub fn agg_key(series: &Series, selectors: &[NodeOrTag]) -> String {
    let nodes: Vec<&str> = extract_metric(&series.name).split('.').collect();
    let len = nodes.len() as i64;
    let parts: Vec<&str> = selectors
        .iter()
        .filter_map(|selector| match selector {
            NodeOrTag::Node(n) => {
                let index = if *n < 0 { n + len } else { *n };
                (0..len).contains(&index).then(|| nodes[index as usize])
            }
            NodeOrTag::Tag(tag) => Some(series.tags.get(tag).map(String::as_str).unwrap_or("")),
        })
        .collect();
    parts.join(".")
}

/// Round to `precision` decimal places, leaving NaN alone
pub fn round_to(value: f64, precision: i32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(precision);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_metric() {
        assert_eq!(extract_metric("a.b.c"), "a.b.c");
        assert_eq!(extract_metric("scale(a.b.c,2)"), "a.b.c");
        assert_eq!(extract_metric("alias(scale(a.b.c, 2),'x')"), "a.b.c");
        assert_eq!(extract_metric("sumSeries(a.{b,c}.d)"), "a.{b,c}.d");
        assert_eq!(extract_metric("a.b;dc=east"), "a.b");
        assert_eq!(extract_metric("foo()"), "");
    }

    #[test]
    fn test_agg_key() {
        let s = Series::new("servers.web01.cpu;dc=east", vec![], 60, 0);
        assert_eq!(agg_key(&s, &[NodeOrTag::Node(1)]), "web01");
        assert_eq!(agg_key(&s, &[NodeOrTag::Node(-1), NodeOrTag::Node(0)]), "cpu.servers");
        assert_eq!(agg_key(&s, &[NodeOrTag::Node(7)]), "");
        assert_eq!(agg_key(&s, &[NodeOrTag::Tag("dc".into()), NodeOrTag::Node(1)]), "east.web01");
        assert_eq!(agg_key(&s, &[NodeOrTag::Tag("missing".into())]), "");

        let wrapped = Series::new("scale(servers.web01.cpu,2)", vec![], 60, 0);
        assert_eq!(agg_key(&wrapped, &[NodeOrTag::Node(1)]), "web01");
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.234_567_89, 6), 1.234_568);
        assert!(round_to(f64::NAN, 6).is_nan());
    }
}
