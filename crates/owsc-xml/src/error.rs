use thiserror::Error;

use crate::line_index::LineCol;

/// A malformed XML document.
///
/// `line` and `column` are 1-based and point at the byte where the parser gave
/// up, with columns counted in characters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} at line {line}, column {column}")]
pub struct ParseError {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

impl ParseError {
    #[must_use]
    pub fn new(message: impl Into<String>, location: LineCol) -> Self {
        Self {
            message: message.into(),
            line: location.line(),
            column: location.column(),
        }
    }
}
