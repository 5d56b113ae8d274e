//! Formula error types

use thiserror::Error;

/// Result type for formula operations
pub type FormulaResult<T> = std::result::Result<T, FormulaError>;

/// Errors that can occur during formula tokenizing, parsing or evaluation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    /// Lexical or grammatical error; `position` is a character offset into the source
    #[error("Syntax error at position {position}: {message}")]
    Syntax { message: String, position: usize },

    /// Call to a function that is not registered
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// Wrong number of arguments
    #[error("Wrong number of arguments for {function}: expected {expected}, got {actual}")]
    ArgumentCount {
        function: String,
        expected: String,
        actual: usize,
    },

    /// Runtime failure (division by zero, unparseable date, ...)
    #[error("Evaluation error: {0}")]
    Evaluation(String),
}

impl FormulaError {
    pub(crate) fn syntax(message: impl Into<String>, position: usize) -> Self {
        FormulaError::Syntax {
            message: message.into(),
            position,
        }
    }

    /// Source position for syntax errors
    pub fn position(&self) -> Option<usize> {
        match self {
            FormulaError::Syntax { position, .. } => Some(*position),
            _ => None,
        }
    }
}
