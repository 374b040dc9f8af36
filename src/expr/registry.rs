//! Function trait and name registry

use super::description::FunctionDescription;
use super::error::EvalResult;
use super::evaluator::Evaluator;
use super::fetch::MetricMap;
use super::functions;
use crate::parser::Call;
use crate::series::Series;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// A render function
///
/// Implementations pull their series arguments through the evaluator (see
/// [`crate::expr::helper`]) and read literal arguments off the [`Call`].
#[async_trait]
pub trait Function: Send + Sync {
    /// One description per name the function answers to
    fn descriptions(&self) -> Vec<FunctionDescription>;

    /// Window the series arguments must be fetched over
    fn fetch_window(&self, _call: &Call, from: i64, until: i64) -> EvalResult<(i64, i64)> {
        Ok((from, until))
    }

    async fn evaluate(
        &self,
        eval: &Evaluator,
        call: &Call,
        from: i64,
        until: i64,
        values: &mut MetricMap,
    ) -> EvalResult<Vec<Series>>;
}

struct Entry {
    function: Arc<dyn Function>,
    description: FunctionDescription,
}

/// Name to implementation table, read-only once built
#[derive(Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Entry>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every builtin function
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        functions::register_builtins(&mut registry);
        registry
    }

    /// Register under every name the function describes
    ///
    /// A name that is already taken is replaced.
    pub fn register(&mut self, function: Arc<dyn Function>) {
        for description in function.descriptions() {
            let name = description.name.clone();
            let entry = Entry {
                function: Arc::clone(&function),
                description,
            };
            if self.functions.insert(name.clone(), entry).is_some() {
                tracing::warn!(function = %name, "replacing registered function");
            }
        }
    }

    pub fn resolve(&self, name: &str) -> Option<&Arc<dyn Function>> {
        self.functions.get(name).map(|e| &e.function)
    }

    pub fn description(&self, name: &str) -> Option<&FunctionDescription> {
        self.functions.get(name).map(|e| &e.description)
    }

    /// All descriptions ordered by name
    pub fn descriptions(&self) -> Vec<&FunctionDescription> {
        let mut out: Vec<&FunctionDescription> = self.functions.values().map(|e| &e.description).collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
