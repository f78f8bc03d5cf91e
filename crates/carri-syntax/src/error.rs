//! Syntax and reference errors raised while loading CARRI text.

use crate::token::Span;
use thiserror::Error;

/// Error raised while lexing or parsing a single line.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("unexpected token at {span}: expected {expected}, found {found}")]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },

    #[error("unrecognized character '{found}' at {span}")]
    InvalidCharacter { found: char, span: Span },

    #[error("invalid syntax at {span}: {message}")]
    InvalidSyntax { message: String, span: Span },

    #[error("unknown variable '{name}' at {span}")]
    UnknownVariable { name: String, span: Span },

    #[error("unknown entity '{name}' at {span}")]
    UnknownEntity { name: String, span: Span },

    #[error("unknown parameter '{name}' at {span}")]
    UnknownParameter { name: String, span: Span },
}

impl ParseError {
    /// Get the source span where this error occurred.
    pub fn span(&self) -> Span {
        match self {
            ParseError::UnexpectedToken { span, .. }
            | ParseError::InvalidCharacter { span, .. }
            | ParseError::InvalidSyntax { span, .. }
            | ParseError::UnknownVariable { span, .. }
            | ParseError::UnknownEntity { span, .. }
            | ParseError::UnknownParameter { span, .. } => *span,
        }
    }

    /// Shorthand for an [`ParseError::InvalidSyntax`] error.
    pub fn syntax(message: impl Into<String>, span: Span) -> Self {
        ParseError::InvalidSyntax {
            message: message.into(),
            span,
        }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Error raised while loading a domain or problem document.
///
/// Wraps a [`ParseError`] with the file and section it occurred in. Any
/// error aborts the load of the whole document; nothing is recovered.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{file}: {section}: line {line}: {source}")]
pub struct LoadError {
    /// File label (`domain`, `problem`, or a path given by the caller).
    pub file: String,
    /// Section name the error occurred in (e.g. `Actions`).
    pub section: String,
    /// Physical line number (1-indexed).
    pub line: u32,
    #[source]
    pub source: ParseError,
}

impl LoadError {
    pub fn new(file: &str, section: &str, source: ParseError) -> Self {
        Self {
            file: file.to_string(),
            section: section.to_string(),
            line: source.span().line,
            source,
        }
    }
}

pub type LoadResult<T> = Result<T, LoadError>;
