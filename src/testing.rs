//! Shared test fixtures

use crate::expr::{EvalResult, Evaluator, FunctionRegistry, StaticFetcher};
use crate::series::Series;
use std::sync::Arc;

/// Compare sample vectors, treating NaN as equal to NaN
pub(crate) fn assert_values(actual: &[f64], expected: &[f64]) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "length mismatch: got {:?}, want {:?}",
        actual,
        expected
    );
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        let same = (a.is_nan() && e.is_nan()) || (a - e).abs() <= 1e-9 * e.abs().max(1.0);
        assert!(same, "index {}: got {:?}, want {:?}", i, actual, expected);
    }
}

/// Evaluator over an in-memory fixture set with every builtin registered
pub(crate) fn evaluator(data: Vec<Series>) -> Evaluator {
    Evaluator::new(
        Arc::new(FunctionRegistry::with_builtins()),
        Arc::new(StaticFetcher::new(data)),
    )
}

/// Parse, fetch and evaluate one target against fixtures
pub(crate) async fn eval_target(target: &str, from: i64, until: i64, data: Vec<Series>) -> EvalResult<Vec<Series>> {
    evaluator(data).execute(target, from, until).await
}
