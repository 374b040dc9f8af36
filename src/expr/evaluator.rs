//! Expression evaluator
//!
//! Evaluation runs in two phases: every metric request the tree needs is
//! computed up front and fetched in one batch, then the tree is walked
//! against the fetched [`MetricMap`]. Functions that only learn their
//! window after evaluating an argument fetch again through
//! [`Evaluator::fetch`].

use super::error::{EvalError, EvalResult};
use super::fetch::{Fetcher, MetricMap};
use super::registry::FunctionRegistry;
use crate::parser::{parse, Call, Expr, MetricRequest};
use crate::series::Series;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// Boxed future returned by the recursive [`Evaluator::eval`]
pub type EvalFuture<'a> = Pin<Box<dyn Future<Output = EvalResult<Vec<Series>>> + Send + 'a>>;

/// Walks expressions against fetched data
#[derive(Clone)]
pub struct Evaluator {
    registry: Arc<FunctionRegistry>,
    fetcher: Arc<dyn Fetcher>,
    cancel: CancellationToken,
}

impl Evaluator {
    pub fn new(registry: Arc<FunctionRegistry>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            registry,
            fetcher,
            cancel: CancellationToken::new(),
        }
    }

    /// Builder method: stop evaluation when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Parse, fetch and evaluate one render target
    pub async fn execute(&self, target: &str, from: i64, until: i64) -> EvalResult<Vec<Series>> {
        let span = tracing::info_span!("query", query_id = %Uuid::new_v4(), expr = %target);
        async move {
            let expr = parse(target)?;
            self.execute_expr(&expr, from, until).await
        }
        .instrument(span)
        .await
    }

    /// Fetch and evaluate an already parsed expression
    pub async fn execute_expr(&self, expr: &Expr, from: i64, until: i64) -> EvalResult<Vec<Series>> {
        let mut values = MetricMap::new();
        self.fetch(std::slice::from_ref(expr), from, until, &mut values).await?;
        let out = self.eval(expr, from, until, &mut values).await?;
        tracing::debug!(series = out.len(), "evaluated");
        Ok(out)
    }

    // recursive, so the future is boxed to give it a known size
    pub fn eval<'a>(&'a self, expr: &'a Expr, from: i64, until: i64, values: &'a mut MetricMap) -> EvalFuture<'a> {
        Box::pin(async move {
            match expr {
                Expr::Name(name) => {
                    let key = MetricRequest::new(name.clone(), from, until);
                    match values.get(&key) {
                        Some(series) => Ok(series.clone()),
                        None => Err(EvalError::MissingData(key)),
                    }
                }
                Expr::Call(call) => self.eval_call(call, from, until, values).await,
                literal => Err(EvalError::BadType {
                    target: literal.to_string(),
                    param: "expression".to_string(),
                    expected: "seriesList".to_string(),
                    got: literal.kind().to_string(),
                }),
            }
        })
    }

    async fn eval_call(&self, call: &Call, from: i64, until: i64, values: &mut MetricMap) -> EvalResult<Vec<Series>> {
        if self.cancel.is_cancelled() {
            return Err(EvalError::Cancelled);
        }
        let function = self
            .registry
            .resolve(&call.name)
            .ok_or_else(|| EvalError::UnknownFunction(call.name.clone()))?;
        if let Some(description) = self.registry.description(&call.name) {
            description.validate(call)?;
        }

        tracing::debug!(function = %call.name, from, until, "dispatch");
        function.evaluate(self, call, from, until, values).await
    }

    /// Every fetch the expression needs, first-seen order, no duplicates
    pub fn metric_requests(&self, expr: &Expr, from: i64, until: i64) -> EvalResult<Vec<MetricRequest>> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        self.collect_requests(expr, from, until, &mut out, &mut seen)?;
        Ok(out)
    }

    fn collect_requests(
        &self,
        expr: &Expr,
        from: i64,
        until: i64,
        out: &mut Vec<MetricRequest>,
        seen: &mut HashSet<MetricRequest>,
    ) -> EvalResult<()> {
        match expr {
            Expr::Name(name) => {
                let request = MetricRequest::new(name.clone(), from, until);
                if seen.insert(request.clone()) {
                    out.push(request);
                }
            }
            Expr::Call(call) => {
                let function = self
                    .registry
                    .resolve(&call.name)
                    .ok_or_else(|| EvalError::UnknownFunction(call.name.clone()))?;
                let (from, until) = function.fetch_window(call, from, until)?;
                for arg in call.args.iter().chain(call.named_args.values()) {
                    self.collect_requests(arg, from, until, out, seen)?;
                }
            }
            Expr::Const { .. } | Expr::String { .. } | Expr::Bool(_) => {}
        }
        Ok(())
    }

    /// Fetch whatever `exprs` need over `[from, until)` that `values` lacks
    ///
    /// Safe to call from inside a function; this is how widened second
    /// fetches happen.
    pub async fn fetch(&self, exprs: &[Expr], from: i64, until: i64, values: &mut MetricMap) -> EvalResult<()> {
        let mut requests = Vec::new();
        for expr in exprs {
            for request in self.metric_requests(expr, from, until)? {
                if !values.contains_key(&request) && !requests.contains(&request) {
                    requests.push(request);
                }
            }
        }
        if requests.is_empty() {
            return Ok(());
        }

        tracing::debug!(requests = requests.len(), "fetching");
        let fetched = tokio::select! {
            _ = self.cancel.cancelled() => return Err(EvalError::Cancelled),
            result = self.fetcher.fetch(&requests) => result.map_err(EvalError::Fetch)?,
        };
        values.extend(fetched);
        Ok(())
    }
}
