//! Evaluation error types

use crate::parser::{IntervalError, MetricRequest, ParseError};
use thiserror::Error;

/// Who is at fault for a failed evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The query is malformed or asks for something impossible
    BadRequest,
    /// The engine or its backend failed
    Internal,
}

/// Errors that can occur while evaluating a render target
#[derive(Error, Debug)]
pub enum EvalError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("{target}: missing argument '{param}'")]
    MissingArgument { target: String, param: String },

    #[error("{target}: bad type for '{param}': expected {expected}, got {got}")]
    BadType {
        target: String,
        param: String,
        expected: String,
        got: String,
    },

    #[error("{target}: argument {index} is not a series list")]
    MissingTimeSeries { target: String, index: usize },

    #[error("no data fetched for {0}")]
    MissingData(MetricRequest),

    #[error("{target}: expected a single series, got {count}")]
    WildcardNotAllowed { target: String, count: usize },

    #[error("{target}: too many arguments")]
    TooManyArguments { target: String },

    #[error("unsupported consolidation function '{0}'")]
    UnsupportedConsolidationFunction(String),

    #[error("unknown time units in '{0}'")]
    UnknownTimeUnits(String),

    #[error("invalid interval '{0}'")]
    InvalidInterval(String),

    #[error("{target}: invalid argument: {message}")]
    InvalidArgument { target: String, message: String },

    #[error("{target}: bad data: {message}")]
    BadData { target: String, message: String },

    #[error("fetch failed: {0}")]
    Fetch(#[source] anyhow::Error),

    #[error("evaluation cancelled")]
    Cancelled,
}

impl EvalError {
    pub fn invalid_argument(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Client fault or server fault
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Fetch(_) | Self::Cancelled => ErrorClass::Internal,
            _ => ErrorClass::BadRequest,
        }
    }

    /// HTTP status a front end should answer with
    pub fn http_status(&self) -> u16 {
        match self.class() {
            ErrorClass::BadRequest => 400,
            ErrorClass::Internal => 500,
        }
    }
}

impl From<IntervalError> for EvalError {
    fn from(err: IntervalError) -> Self {
        match err {
            IntervalError::UnknownTimeUnits(s) => Self::UnknownTimeUnits(s),
            IntervalError::InvalidInterval(s) => Self::InvalidInterval(s),
        }
    }
}

/// Result type for evaluation
pub type EvalResult<T> = Result<T, EvalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(EvalError::UnknownFunction("foo".into()).http_status(), 400);
        assert_eq!(
            EvalError::MissingData(MetricRequest::new("a", 0, 1)).class(),
            ErrorClass::BadRequest
        );
        assert_eq!(EvalError::Cancelled.http_status(), 500);
        assert_eq!(
            EvalError::Fetch(anyhow::anyhow!("backend down")).class(),
            ErrorClass::Internal
        );
    }

    #[test]
    fn test_display() {
        let err = EvalError::UnknownFunction("foo".into());
        assert_eq!(err.to_string(), "unknown function: foo");

        let err: EvalError = IntervalError::UnknownTimeUnits("1x".into()).into();
        assert_eq!(err.to_string(), "unknown time units in '1x'");

        let err = EvalError::Fetch(anyhow::anyhow!("backend down"));
        assert_eq!(err.to_string(), "fetch failed: backend down");
    }
}
