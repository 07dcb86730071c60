//! Error taxonomy for query parsing, evaluation and ranking.

use std::fmt;

/// Errors reported while turning a query string into an operator tree.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// A double quote was opened at `position` and never closed.
    #[error("unmatched quote starting at position {position}")]
    UnmatchedQuote { position: usize },
    /// A token appeared where the grammar does not allow it.
    #[error("unexpected token `{token}` at position {position}")]
    UnexpectedToken { token: String, position: usize },
    /// `#` was applied to something other than a single literal term.
    #[error("regex tag `#` must precede a single term, found `{token}` at position {position}")]
    InvalidRegexTag { token: String, position: usize },
    /// The query ended while an operand was still expected.
    #[error("unexpected end of query")]
    UnexpectedEnd,
}

/// Crate-wide error type.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A blank term was handed to the term expander.
    #[error("cannot expand an empty term")]
    EmptyTerm,

    /// A source, prior or session was built without a required input.
    #[error("missing required argument: {0}")]
    MissingArgument(&'static str),

    /// A document source call errored or its subprocess exited abnormally.
    #[error("source `{source_name}` failed: {message}")]
    SourceFailure { source_name: String, message: String },

    #[error("invalid pattern `{pattern}`")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// The evaluation was superseded by a newer generation.
    #[error("query evaluation cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn source_failure(source_name: impl fmt::Display, message: impl fmt::Display) -> Self {
        Error::SourceFailure {
            source_name: source_name.to_string(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_converts() {
        let err: Error = ParseError::UnmatchedQuote { position: 4 }.into();
        assert!(matches!(err, Error::Parse(ParseError::UnmatchedQuote { position: 4 })));
        assert_eq!(err.to_string(), "unmatched quote starting at position 4");
    }

    #[test]
    fn test_source_failure_message() {
        let err = Error::source_failure("rg", "exit status 2");
        assert_eq!(err.to_string(), "source `rg` failed: exit status 2");
    }
}
