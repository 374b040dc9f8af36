//! Parse error types
//!
//! Every failure carries the 0-based byte offset into the original query
//! string, and the offending character where there is one.

use thiserror::Error;

/// Errors that can occur while parsing a render target
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Input (or an argument slot) is empty
    #[error("missing expression at position {position}")]
    MissingExpr { position: usize },

    /// A character that cannot start or continue any token
    #[error("unexpected character '{character}' at position {position}")]
    UnexpectedCharacter { position: usize, character: char },

    /// String literal without a closing quote
    #[error("missing closing quote for {quote} opened at position {position}")]
    MissingQuote { position: usize, quote: char },

    /// Argument list without a closing parenthesis
    #[error("missing closing parenthesis for '(' at position {position}")]
    MissingParen { position: usize },

    /// Brace group inside a metric name without a closing brace
    #[error("unmatched '{{' at position {position}")]
    UnmatchedBrace { position: usize },

    /// Two arguments not separated by a comma
    #[error("missing comma before '{character}' at position {position}")]
    MissingComma { position: usize, character: char },

    /// Named argument whose value is not a literal or a metric name
    #[error("named argument '{name}' at position {position} must be a literal")]
    BadNamedArgument { position: usize, name: String },

    /// Same key used twice in one argument list
    #[error("duplicate named argument '{name}' at position {position}")]
    DuplicateNamedArgument { position: usize, name: String },

    /// Pipe followed by something other than a function call
    #[error("'|' at position {position} must be followed by a function call")]
    PipeTarget { position: usize },
}

impl ParseError {
    /// Offset into the query string where the error was detected
    pub fn position(&self) -> usize {
        match self {
            Self::MissingExpr { position }
            | Self::UnexpectedCharacter { position, .. }
            | Self::MissingQuote { position, .. }
            | Self::MissingParen { position }
            | Self::UnmatchedBrace { position }
            | Self::MissingComma { position, .. }
            | Self::BadNamedArgument { position, .. }
            | Self::DuplicateNamedArgument { position, .. }
            | Self::PipeTarget { position } => *position,
        }
    }
}

/// Result type for parse operations
pub type ParseResult<T> = Result<T, ParseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ParseError::UnexpectedCharacter {
            position: 4,
            character: ';',
        };
        assert_eq!(err.to_string(), "unexpected character ';' at position 4");

        let err = ParseError::UnmatchedBrace { position: 2 };
        assert_eq!(err.to_string(), "unmatched '{' at position 2");
    }

    #[test]
    fn test_error_position() {
        let err = ParseError::MissingQuote {
            position: 7,
            quote: '\'',
        };
        assert_eq!(err.position(), 7);
    }
}
