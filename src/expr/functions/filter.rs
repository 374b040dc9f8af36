//! Series list filters

use super::series_list;
use crate::expr::description::{FunctionDescription, FunctionParam, ParamType};
use crate::expr::error::{EvalError, EvalResult};
use crate::expr::evaluator::Evaluator;
use crate::expr::fetch::MetricMap;
use crate::expr::helper::series_arg;
use crate::expr::registry::{Function, FunctionRegistry};
use crate::parser::Call;
use crate::series::Series;
use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.register(Arc::new(Grep { keep: false }));
    registry.register(Arc::new(Grep { keep: true }));
    registry.register(Arc::new(Limit));
}

/// `grep` keeps matching names, `exclude` drops them
struct Grep {
    keep: bool,
}

#[async_trait]
impl Function for Grep {
    fn descriptions(&self) -> Vec<FunctionDescription> {
        let (name, description) = if self.keep {
            ("grep", "Keep only series whose name matches the regular expression.")
        } else {
            ("exclude", "Drop series whose name matches the regular expression.")
        };
        vec![FunctionDescription::new(name, "Filter Series", description)
            .param(series_list())
            .param(FunctionParam::new("pattern", ParamType::String).required())]
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
        let pattern = call.string_named_or_pos_default("pattern", 1, "")?;
        let re = Regex::new(&pattern)
            .map_err(|e| EvalError::invalid_argument(&call.name, format!("bad pattern '{}': {}", pattern, e)))?;
        Ok(series.into_iter().filter(|s| re.is_match(&s.name) == self.keep).collect())
    }
}

struct Limit;

#[async_trait]
impl Function for Limit {
    fn descriptions(&self) -> Vec<FunctionDescription> {
        vec![FunctionDescription::new("limit", "Filter Series", "Keep the first `n` series.")
            .param(series_list())
            .param(FunctionParam::new("n", ParamType::Integer).required())]
    }

    async fn evaluate(
        &self,
        eval: &Evaluator,
        call: &Call,
        from: i64,
        until: i64,
        values: &mut MetricMap,
    ) -> EvalResult<Vec<Series>> {
        let mut series = series_arg(eval, call, 0, from, until, values).await?;
        let n = call.int_named_or_pos_default("n", 1, 0)?;
        series.truncate(n.max(0) as usize);
        Ok(series)
    }
}
