//! Parse and invariant errors raised by diagram adapters.

use thiserror::Error;

/// Failure to turn diagram text into a node/edge model.
///
/// Text with no recognizable category keyword is *not* an error: adapters
/// return an empty graph for it. These variants cover malformed but
/// non-empty input, which callers use to trigger the repair loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("line {line}: relationship `{edge}` references undeclared element `{missing}`")]
    DanglingEdge {
        line: usize,
        edge: String,
        missing: String,
    },

    #[error("line {line}: element `{id}` is declared more than once")]
    DuplicateNode { line: usize, id: String },

    #[error("line {line}: block `{id}` is never closed")]
    UnclosedBlock { line: usize, id: String },

    #[error("line {line}: unexpected block close")]
    UnexpectedClose { line: usize },

    #[error("invalid diagram: {0}")]
    Invariant(String),
}

impl ParseError {
    pub(crate) fn syntax(line: usize, message: impl Into<String>) -> Self {
        ParseError::Syntax {
            line,
            message: message.into(),
        }
    }

    /// 1-based line in the cleaned text, when the error is tied to one.
    pub fn line(&self) -> Option<usize> {
        match self {
            ParseError::Syntax { line, .. }
            | ParseError::DanglingEdge { line, .. }
            | ParseError::DuplicateNode { line, .. }
            | ParseError::UnclosedBlock { line, .. }
            | ParseError::UnexpectedClose { line } => Some(*line),
            ParseError::Invariant(_) => None,
        }
    }
}
