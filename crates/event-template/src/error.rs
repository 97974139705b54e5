//! Error types for template evaluation.
//!
//! This module provides [`TemplateError`], the error type returned by every
//! evaluation entry point. It separates the three ways a render can fail so
//! callers can log them differently, while all of them mean the same thing
//! to the caller: no text was produced.

use thiserror::Error;

/// Error type for template evaluation.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// The template source was empty. Nothing was compiled.
    #[error("template error: template {name:?} has an empty source")]
    EmptySource { name: String },

    /// The template source is not valid template syntax.
    #[error("parse error in template {name:?}: {source}")]
    Parse {
        name: String,
        #[source]
        source: ParseError,
    },

    /// Rendering failed: a missing field, no event data, or a helper that
    /// rejected its arguments.
    #[error("execution error in template {name:?}: {message}")]
    Execution { name: String, message: String },
}

impl TemplateError {
    /// Name of the template that failed.
    pub fn name(&self) -> &str {
        match self {
            TemplateError::EmptySource { name }
            | TemplateError::Parse { name, .. }
            | TemplateError::Execution { name, .. } => name,
        }
    }

    /// Short label for the failure kind, used in log events.
    pub fn kind(&self) -> &'static str {
        match self {
            TemplateError::EmptySource { .. } => "empty_source",
            TemplateError::Parse { .. } => "parse",
            TemplateError::Execution { .. } => "execution",
        }
    }
}

/// A syntax error and the source line it was found on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

impl ParseError {
    pub(crate) fn new(line: usize, message: impl Into<String>) -> Self {
        ParseError {
            line,
            message: message.into(),
        }
    }
}

/// A failure while executing a parsed template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub(crate) struct ExecError {
    pub line: usize,
    pub message: String,
}

/// Result type for evaluation.
pub type Result<T> = std::result::Result<T, TemplateError>;
