//! Render expression abstract syntax tree
//!
//! A render target is a tree of function calls over metric name patterns
//! and literal arguments.
//!
//! # Example Targets
//!
//! ```text
//! servers.*.cpu.load
//! sumSeries(servers.web*.requests)
//! movingAverage(servers.db1.latency, '5min')
//! servers.*.requests|aliasByNode(1)
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A parsed render expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Metric path or glob pattern
    Name(String),
    /// Function call
    Call(Call),
    /// Numeric literal
    Const {
        /// Parsed value
        value: f64,
        /// Source text, kept so output names show `2e-3` rather than `0.002`
        literal: String,
    },
    /// Quoted string literal
    String {
        /// Content with escaped quotes resolved
        value: String,
        /// Quote character used in the source
        quote: char,
    },
    /// Boolean literal (named argument values only)
    Bool(bool),
}

impl Expr {
    /// Create a name expression
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// Create a numeric constant, rendering the literal from the value
    pub fn constant(value: f64) -> Self {
        Self::Const {
            value,
            literal: value.to_string(),
        }
    }

    /// Create a single-quoted string literal
    pub fn string(value: impl Into<String>) -> Self {
        Self::String {
            value: value.into(),
            quote: '\'',
        }
    }

    /// Whether this node evaluates to a series list
    pub fn is_series(&self) -> bool {
        matches!(self, Self::Name(_) | Self::Call(_))
    }

    /// Borrow the call if this is a function node
    pub fn as_call(&self) -> Option<&Call> {
        match self {
            Self::Call(call) => Some(call),
            _ => None,
        }
    }

    /// Short type label used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Name(_) => "name",
            Self::Call(_) => "function",
            Self::Const { .. } => "constant",
            Self::String { .. } => "string",
            Self::Bool(_) => "boolean",
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "{}", name),
            Self::Call(call) => write!(f, "{}", call),
            Self::Const { literal, .. } => write!(f, "{}", literal),
            Self::String { value, quote } => {
                let escaped = value.replace(*quote, &format!("\\{}", quote));
                write!(f, "{}{}{}", quote, escaped, quote)
            }
            Self::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// A function call node
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    /// Function name as written
    pub name: String,
    /// Positional arguments in source order
    pub args: Vec<Expr>,
    /// Named arguments
    pub named_args: BTreeMap<String, Expr>,
    /// Argument list source text; nested calls appear in canonical form
    pub arg_string: String,
}

impl Call {
    /// Create a call with no arguments
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            named_args: BTreeMap::new(),
            arg_string: String::new(),
        }
    }

    /// Positional argument at `index`
    pub fn arg(&self, index: usize) -> Option<&Expr> {
        self.args.get(index)
    }

    /// Named argument by key
    pub fn named(&self, key: &str) -> Option<&Expr> {
        self.named_args.get(key)
    }

    /// Named argument if present, otherwise the positional one
    pub fn named_or_pos(&self, key: &str, index: usize) -> Option<&Expr> {
        self.named(key).or_else(|| self.arg(index))
    }

    /// Whether the argument was supplied either way
    pub fn has_arg(&self, key: &str, index: usize) -> bool {
        self.named_or_pos(key, index).is_some()
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.arg_string)
    }
}

/// A fetch key: pattern plus absolute window in epoch seconds
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MetricRequest {
    /// Metric path or glob pattern
    pub metric: String,
    /// Window start (inclusive)
    pub from: i64,
    /// Window end (exclusive)
    pub until: i64,
}

impl MetricRequest {
    /// Create a new request
    pub fn new(metric: impl Into<String>, from: i64, until: i64) -> Self {
        Self {
            metric: metric.into(),
            from,
            until,
        }
    }
}

impl fmt::Display for MetricRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}..{}]", self.metric, self.from, self.until)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_literals() {
        let c = Expr::Const {
            value: 0.002,
            literal: "2e-3".to_string(),
        };
        assert_eq!(c.to_string(), "2e-3");
        assert_eq!(Expr::string("it's").to_string(), r"'it\'s'");
        assert_eq!(
            Expr::String {
                value: "x".into(),
                quote: '"'
            }
            .to_string(),
            "\"x\""
        );
        assert_eq!(Expr::Bool(true).to_string(), "true");
    }

    #[test]
    fn test_render_call() {
        let mut call = Call::new("scale");
        call.args.push(Expr::name("a.b"));
        call.args.push(Expr::constant(2.0));
        call.arg_string = "a.b,2".to_string();
        assert_eq!(Expr::Call(call).to_string(), "scale(a.b,2)");
    }

    #[test]
    fn test_named_or_pos() {
        let mut call = Call::new("f");
        call.args.push(Expr::name("x"));
        call.named_args.insert("key".into(), Expr::constant(1.0));
        assert_eq!(call.named_or_pos("key", 5), Some(&Expr::constant(1.0)));
        assert_eq!(call.named_or_pos("other", 0), Some(&Expr::name("x")));
        assert!(!call.has_arg("other", 1));
    }

    #[test]
    fn test_metric_request_key() {
        let a = MetricRequest::new("foo", 1, 2);
        let b = MetricRequest::new("foo", 1, 2);
        assert_eq!(a, b);
        assert_ne!(a, MetricRequest::new("foo", 0, 2));
        assert_eq!(a.to_string(), "foo[1..2]");
    }
}
