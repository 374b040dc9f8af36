//! # Graphex
//!
//! A Graphite-compatible render expression engine: parse a target such as
//! `sumSeries(servers.*.cpu)`, fetch the series it names through a pluggable
//! backend, evaluate the function tree and consolidate the result for
//! display.
//!
//! ## Modules
//!
//! - [`parser`]: target language, intervals and calendar alignment
//! - [`series`]: the series type, alignment and consolidation
//! - [`consolidations`]: reducers shared by aggregation and downsampling
//! - [`expr`]: evaluator, function registry and the builtin functions
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use graphex::expr::{Evaluator, FunctionRegistry, StaticFetcher};
//! use graphex::series::consolidate_all;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let fetcher = StaticFetcher::from_path("fixtures.json")?;
//!     let eval = Evaluator::new(Arc::new(FunctionRegistry::with_builtins()), Arc::new(fetcher));
//!
//!     let series = eval
//!         .execute("aliasByNode(movingAverage(servers.*.load, '5min'), 1)", 0, 86_400)
//!         .await?;
//!     for s in consolidate_all(&series, 300, true) {
//!         println!("{} {:?}", s.name, s.values);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod consolidations;
pub mod expr;
pub mod parser;
pub mod series;

#[cfg(test)]
mod testing;

pub use config::{Config, ConfigError, EngineConfig, LoggingConfig};
pub use expr::{EvalError, EvalResult, Evaluator, Fetcher, FunctionRegistry, StaticFetcher};
pub use parser::{parse, Expr, MetricRequest, ParseError};
pub use series::Series;
