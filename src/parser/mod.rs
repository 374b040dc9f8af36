//! Render target language
//!
//! - **AST**: [`Expr`], [`Call`] and the [`MetricRequest`] fetch key
//! - **Parser**: nom-based parser producing the AST
//! - **Intervals**: `5min` style durations and calendar alignment
//!
//! # Language
//!
//! ```text
//! expr    := name | const | string | func(arglist) | expr '|' func(arglist)
//! arglist := (expr | key=expr) (',' (expr | key=expr))*
//! ```
//!
//! # Examples
//!
//! ```rust
//! use graphex::parser::{parse, Expr};
//!
//! let expr = parse("servers.*.load|scale(2)").unwrap();
//! let call = expr.as_call().unwrap();
//! assert_eq!(call.name, "scale");
//! assert_eq!(call.args[0], Expr::name("servers.*.load"));
//! assert_eq!(expr.to_string(), "scale(servers.*.load,2)");
//! ```

mod ast;
mod error;
mod interval;
#[allow(clippy::module_inception)]
mod parser;

pub use ast::{Call, Expr, MetricRequest};
pub use error::{ParseError, ParseResult};
pub use interval::{parse_interval, start_align_to, IntervalError, TimeUnit};
pub use parser::{is_name_char, parse, parse_expr};
