//! Renaming functions

use super::series_list;
use crate::expr::description::{FunctionDescription, FunctionParam, ParamType};
use crate::expr::error::{EvalError, EvalResult};
use crate::expr::evaluator::Evaluator;
use crate::expr::fetch::MetricMap;
use crate::expr::helper::{agg_key, extract_metric, for_each_series, series_arg};
use crate::expr::registry::{Function, FunctionRegistry};
use crate::parser::Call;
use crate::series::Series;
use async_trait::async_trait;
use regex::{NoExpand, Regex};
use std::sync::Arc;

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.register(Arc::new(Alias));
    registry.register(Arc::new(AliasByMetric));
    registry.register(Arc::new(AliasByNode));
    registry.register(Arc::new(AliasQuery));
}

struct Alias;

#[async_trait]
impl Function for Alias {
    fn descriptions(&self) -> Vec<FunctionDescription> {
        vec![FunctionDescription::new("alias", "Alias", "Replace the name of every series.")
            .param(series_list())
            .param(FunctionParam::new("newName", ParamType::String).required())]
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
        let new_name = call.string_named_or_pos_default("newName", 1, "")?;
        Ok(for_each_series(series, |s| {
            let mut out = s.clone_shell(new_name.as_str()).with_values(s.values.clone());
            out.path_expression = new_name.clone();
            out
        }))
    }
}

struct AliasByMetric;

#[async_trait]
impl Function for AliasByMetric {
    fn descriptions(&self) -> Vec<FunctionDescription> {
        vec![FunctionDescription::new(
            "aliasByMetric",
            "Alias",
            "Name each series after the last node of its metric path.",
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
            let metric = match s.tags.get(crate::series::NAME_TAG) {
                Some(tag) => tag.as_str(),
                None => extract_metric(&s.name),
            };
            let name = metric.rsplit('.').next().unwrap_or(metric).to_string();
            let mut out = s.clone_shell(name.as_str()).with_values(s.values.clone());
            out.path_expression = name;
            out
        }))
    }
}

/// `aliasByNode` and `aliasByTags` share one implementation
struct AliasByNode;

#[async_trait]
impl Function for AliasByNode {
    fn descriptions(&self) -> Vec<FunctionDescription> {
        let desc = FunctionDescription::new(
            "aliasByNode",
            "Alias",
            "Name each series after selected name nodes or tag values, joined by '.'.",
        )
        .param(series_list())
        .param(FunctionParam::new("nodes", ParamType::NodeOrTag).multiple());
        let tags = desc.alias("aliasByTags");
        vec![desc, tags]
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
        let nodes = call.nodes_or_tags_from(1)?;
        Ok(for_each_series(series, |s| {
            let name = agg_key(s, &nodes);
            s.clone_shell(name).with_values(s.values.clone())
        }))
    }
}

struct AliasQuery;

#[async_trait]
impl Function for AliasQuery {
    fn descriptions(&self) -> Vec<FunctionDescription> {
        vec![FunctionDescription::new(
            "aliasQuery",
            "Alias",
            "Rename each series with a name built from its path, filled in with its last non-null value.",
        )
        .param(series_list())
        .param(FunctionParam::new("search", ParamType::String).required())
        .param(FunctionParam::new("replace", ParamType::String).required())
        .param(FunctionParam::new("newName", ParamType::String).required())]
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
        let search = call.string_named_or_pos_default("search", 1, "")?;
        let replace = backrefs_to_captures(&call.string_named_or_pos_default("replace", 2, "")?);
        let new_name = call.string_named_or_pos_default("newName", 3, "")?;
        let re = Regex::new(&search)
            .map_err(|e| EvalError::invalid_argument(&call.name, format!("bad search pattern: {}", e)))?;

        Ok(series
            .iter()
            .map(|s| {
                let rewritten = re.replace_all(extract_metric(&s.name), replace.as_str());
                let template = re.replace_all(&new_name, NoExpand(&rewritten));
                let name = format_value(&template, s.last_value().unwrap_or(f64::NAN));
                s.clone_shell(name).with_values(s.values.clone())
            })
            .collect())
    }
}

/// Rewrite `\1` style backreferences into `${1}` and escape literal `$`
fn backrefs_to_captures(replace: &str) -> String {
    let mut out = String::with_capacity(replace.len());
    let mut chars = replace.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek().is_some_and(char::is_ascii_digit) => {
                out.push_str("${");
                while let Some(d) = chars.next_if(char::is_ascii_digit) {
                    out.push(d);
                }
                out.push('}');
            }
            '$' => out.push_str("$$"),
            _ => out.push(c),
        }
    }
    out
}

/// printf-style substitution of one value
///
/// Supports `%d`, `%i`, `%f`, `%.Nf` (`%.f` is zero places), `%g`, `%s` and
/// `%%`; anything else is copied through.
fn format_value(template: &str, value: f64) -> String {
    let mut out = String::with_capacity(template.len() + 8);
    let mut rest = template;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let spec = &rest[pos + 1..];
        let (rendered, used) = if let Some(after) = spec.strip_prefix('.') {
            let digits = after.chars().take_while(char::is_ascii_digit).count();
            match (after[..digits].parse::<usize>().unwrap_or(0), after[digits..].starts_with('f')) {
                (precision, true) => (format!("{:.*}", precision, value), digits + 2),
                _ => ("%".to_string(), 0),
            }
        } else {
            match spec.chars().next() {
                Some('d') | Some('i') if !value.is_finite() => (format!("{}", value), 1),
                Some('d') | Some('i') => (format!("{}", value.trunc() as i64), 1),
                Some('f') => (format!("{:.6}", value), 1),
                Some('g') | Some('s') => (format!("{}", value), 1),
                Some('%') => ("%".to_string(), 1),
                _ => ("%".to_string(), 0),
            }
        };
        out.push_str(&rendered);
        rest = &spec[used..];
    }
    out.push_str(rest);
    out
}
