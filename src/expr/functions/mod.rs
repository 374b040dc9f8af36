//! Builtin render functions, grouped the way Graphite groups them

mod aggregate;
mod alias;
mod filter;
mod holtwinters;
mod moving;
mod time;
mod transform;

use super::description::{FunctionParam, ParamType};
use super::error::{EvalError, EvalResult};
use super::registry::FunctionRegistry;
use crate::consolidations::ConsolidationFunc;

pub(crate) fn register_builtins(registry: &mut FunctionRegistry) {
    aggregate::register(registry);
    alias::register(registry);
    filter::register(registry);
    holtwinters::register(registry);
    moving::register(registry);
    time::register(registry);
    transform::register(registry);
}

/// Required `seriesList` first parameter
fn series_list() -> FunctionParam {
    FunctionParam::new("seriesList", ParamType::SeriesList).required()
}

/// Reducer parameter with the full option list
fn agg_func(name: &str) -> FunctionParam {
    FunctionParam::new(name, ParamType::AggFunc).options(crate::consolidations::SUMMARIZER_NAMES.iter().copied())
}

/// Parse a user supplied reducer name
fn consolidation_func(name: &str) -> EvalResult<ConsolidationFunc> {
    ConsolidationFunc::parse(name).ok_or_else(|| EvalError::UnsupportedConsolidationFunction(name.to_string()))
}

/// Interval argument that must be a positive span
fn positive_interval(target: &str, seconds: i64) -> EvalResult<i64> {
    if seconds <= 0 {
        return Err(EvalError::invalid_argument(target, format!("interval must be positive, got {}s", seconds)));
    }
    Ok(seconds)
}

/// `t` moved by `offset` seconds; a result outside the timestamp range is an invalid interval
fn offset_time(t: i64, offset: i64) -> EvalResult<i64> {
    t.checked_add(offset)
        .ok_or_else(|| EvalError::InvalidInterval(format!("{}s from {}", offset, t)))
}
