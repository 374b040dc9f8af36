//! Expression evaluation engine
//!
//! - **Evaluator**: two-phase fetch then walk, with re-entrant fetch and
//!   cancellation
//! - **Registry**: the [`Function`] trait and the name table
//! - **Fetch**: the [`Fetcher`] backend seam and an in-memory fetcher
//! - **Functions**: the builtin function library
//!
//! # Examples
//!
//! ```rust,no_run
//! use graphex::expr::{Evaluator, FunctionRegistry, StaticFetcher};
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let fetcher = StaticFetcher::from_path("fixtures.json")?;
//! let eval = Evaluator::new(Arc::new(FunctionRegistry::with_builtins()), Arc::new(fetcher));
//! let series = eval.execute("sumSeries(servers.*.load)", 0, 3600).await?;
//! # Ok(())
//! # }
//! ```

mod args;
mod description;
mod error;
mod evaluator;
mod fetch;
mod functions;
pub mod helper;
mod registry;

pub use args::NodeOrTag;
pub use description::{FunctionDescription, FunctionParam, ParamType, ParamValue};
pub use error::{ErrorClass, EvalError, EvalResult};
pub use evaluator::{EvalFuture, Evaluator};
pub use fetch::{glob_to_regex, Fetcher, MetricMap, StaticFetcher};
pub use registry::{Function, FunctionRegistry};
