//! Typed argument accessors
//!
//! Literal arguments are read straight off the [`Call`]; each accessor
//! converts the AST literal or reports a typed [`EvalError`] naming the
//! function and parameter.

use super::error::{EvalError, EvalResult};
use crate::parser::{parse_interval, Call, Expr};

/// Grouping key selector: a dot-separated node index or a tag name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOrTag {
    Node(i64),
    Tag(String),
}

/// `None` written bare stands for an omitted optional argument
fn is_none_literal(expr: &Expr) -> bool {
    matches!(expr, Expr::Name(name) if name == "None")
}

impl Call {
    fn bad_type(&self, param: &str, expected: &str, got: &Expr) -> EvalError {
        EvalError::BadType {
            target: self.name.clone(),
            param: param.to_string(),
            expected: expected.to_string(),
            got: got.kind().to_string(),
        }
    }

    fn missing(&self, param: &str) -> EvalError {
        EvalError::MissingArgument {
            target: self.name.clone(),
            param: param.to_string(),
        }
    }

    fn positional(&self, index: usize) -> EvalResult<(&Expr, String)> {
        let param = format!("#{}", index + 1);
        match self.arg(index) {
            Some(expr) => Ok((expr, param)),
            None => Err(self.missing(&param)),
        }
    }

    fn expr_as_string(&self, param: &str, expr: &Expr) -> EvalResult<String> {
        match expr {
            Expr::String { value, .. } => Ok(value.clone()),
            other => Err(self.bad_type(param, "string", other)),
        }
    }

    fn expr_as_float(&self, param: &str, expr: &Expr) -> EvalResult<f64> {
        match expr {
            Expr::Const { value, .. } => Ok(*value),
            Expr::String { value, .. } => value
                .trim()
                .parse()
                .map_err(|_| self.bad_type(param, "float", expr)),
            other => Err(self.bad_type(param, "float", other)),
        }
    }

    fn expr_as_int(&self, param: &str, expr: &Expr) -> EvalResult<i64> {
        let value = self.expr_as_float(param, expr)?;
        if !value.is_finite() {
            return Err(self.bad_type(param, "integer", expr));
        }
        Ok(value as i64)
    }

    fn expr_as_bool(&self, param: &str, expr: &Expr) -> EvalResult<bool> {
        match expr {
            Expr::Bool(b) => Ok(*b),
            Expr::String { value, .. } if value.eq_ignore_ascii_case("true") => Ok(true),
            Expr::String { value, .. } if value.eq_ignore_ascii_case("false") => Ok(false),
            Expr::Const { value, .. } => Ok(*value != 0.0),
            other => Err(self.bad_type(param, "boolean", other)),
        }
    }

    /// Strings go through the interval grammar; numbers are plain seconds
    fn expr_as_interval(&self, param: &str, expr: &Expr, default_sign: i64) -> EvalResult<i64> {
        match expr {
            Expr::String { value, .. } => Ok(parse_interval(value, default_sign)?),
            Expr::Const { value, literal } => {
                if value.is_finite() && value.abs() < i64::MAX as f64 {
                    Ok(*value as i64)
                } else {
                    Err(EvalError::InvalidInterval(literal.clone()))
                }
            }
            other => Err(self.bad_type(param, "interval", other)),
        }
    }

    pub fn string_arg(&self, index: usize) -> EvalResult<String> {
        let (expr, param) = self.positional(index)?;
        self.expr_as_string(&param, expr)
    }

    /// Number from a constant or a string holding one
    pub fn float_arg(&self, index: usize) -> EvalResult<f64> {
        let (expr, param) = self.positional(index)?;
        self.expr_as_float(&param, expr)
    }

    pub fn int_arg(&self, index: usize) -> EvalResult<i64> {
        let (expr, param) = self.positional(index)?;
        self.expr_as_int(&param, expr)
    }

    /// Boolean from `true`/`false` in any case, or a numeric 1/0
    pub fn bool_arg(&self, index: usize) -> EvalResult<bool> {
        let (expr, param) = self.positional(index)?;
        self.expr_as_bool(&param, expr)
    }

    /// Interval in seconds; unsigned strings take `default_sign`
    pub fn interval_arg(&self, index: usize, default_sign: i64) -> EvalResult<i64> {
        let (expr, param) = self.positional(index)?;
        self.expr_as_interval(&param, expr, default_sign)
    }

    fn optional(&self, key: &str, index: usize) -> Option<&Expr> {
        self.named_or_pos(key, index).filter(|e| !is_none_literal(e))
    }

    pub fn string_named_or_pos_default(&self, key: &str, index: usize, default: &str) -> EvalResult<String> {
        match self.optional(key, index) {
            Some(expr) => self.expr_as_string(key, expr),
            None => Ok(default.to_string()),
        }
    }

    pub fn float_named_or_pos_default(&self, key: &str, index: usize, default: f64) -> EvalResult<f64> {
        match self.optional(key, index) {
            Some(expr) => self.expr_as_float(key, expr),
            None => Ok(default),
        }
    }

    pub fn int_named_or_pos_default(&self, key: &str, index: usize, default: i64) -> EvalResult<i64> {
        match self.optional(key, index) {
            Some(expr) => self.expr_as_int(key, expr),
            None => Ok(default),
        }
    }

    pub fn bool_named_or_pos_default(&self, key: &str, index: usize, default: bool) -> EvalResult<bool> {
        match self.optional(key, index) {
            Some(expr) => self.expr_as_bool(key, expr),
            None => Ok(default),
        }
    }

    pub fn interval_named_or_pos_default(
        &self,
        key: &str,
        index: usize,
        default_sign: i64,
        default: i64,
    ) -> EvalResult<i64> {
        match self.optional(key, index) {
            Some(expr) => self.expr_as_interval(key, expr, default_sign),
            None => Ok(default),
        }
    }

    /// Optional float where `None` (omitted or written bare) means unset
    pub fn float_named_or_pos_opt(&self, key: &str, index: usize) -> EvalResult<Option<f64>> {
        self.optional(key, index)
            .map(|expr| self.expr_as_float(key, expr))
            .transpose()
    }

    /// Optional string where `None` means unset
    pub fn string_named_or_pos_opt(&self, key: &str, index: usize) -> EvalResult<Option<String>> {
        self.optional(key, index)
            .map(|expr| self.expr_as_string(key, expr))
            .transpose()
    }

    /// Every positional argument from `index` on, as integers
    pub fn int_args_from(&self, index: usize) -> EvalResult<Vec<i64>> {
        self.args
            .iter()
            .enumerate()
            .skip(index)
            .map(|(i, expr)| self.expr_as_int(&format!("#{}", i + 1), expr))
            .collect()
    }

    /// Every positional argument from `index` on, as node indexes or tag names
    pub fn nodes_or_tags_from(&self, index: usize) -> EvalResult<Vec<NodeOrTag>> {
        self.args
            .iter()
            .enumerate()
            .skip(index)
            .map(|(i, expr)| match expr {
                Expr::String { value, .. } => Ok(NodeOrTag::Tag(value.clone())),
                other => self
                    .expr_as_int(&format!("#{}", i + 1), other)
                    .map(NodeOrTag::Node),
            })
            .collect()
    }
}
