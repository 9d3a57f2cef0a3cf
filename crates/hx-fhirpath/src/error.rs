//! Error types for FHIRPath lexing, parsing and evaluation.

use hx_foundation::FoundationError;
use thiserror::Error;

/// Result type for FHIRPath operations
pub type FhirPathResult<T> = Result<T, FhirPathError>;

/// Errors that can occur during FHIRPath lexing, parsing and evaluation.
///
/// Lexer and parser errors carry the position of the offending input;
/// evaluation errors are raised from the offending expression node.
#[derive(Error, Debug)]
pub enum FhirPathError {
    /// Lexical error with location
    #[error("FHIRPath lexer error at {line}:{column}: {message}")]
    LexError {
        line: usize,
        column: usize,
        message: String,
    },

    /// Parse error at a specific token
    #[error("FHIRPath parser error at '{token}': {message}")]
    ParseError { token: String, message: String },

    /// Type error during evaluation (e.g., wrong type for operation)
    #[error("Type error: {message}")]
    TypeError { message: String },

    /// Function not found or invalid function call
    #[error("Function error: {message}")]
    FunctionError { message: String },

    /// Invalid operation on the given data types
    #[error("Invalid operation: {message}")]
    InvalidOperation { message: String },

    /// General evaluation error
    #[error("Evaluation error: {message}")]
    EvaluationError { message: String },

    /// Foundation error (covers IO, JSON, etc.)
    #[error(transparent)]
    Foundation(#[from] FoundationError),
}

impl FhirPathError {
    /// Create a lexical error at a specific location
    pub fn lex_error(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self::LexError {
            line,
            column,
            message: message.into(),
        }
    }

    /// Create a parse error at a specific token
    pub fn parse_error(token: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ParseError {
            token: token.into(),
            message: message.into(),
        }
    }

    /// Create a type error
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::TypeError {
            message: message.into(),
        }
    }

    /// Create a function error
    pub fn function_error(message: impl Into<String>) -> Self {
        Self::FunctionError {
            message: message.into(),
        }
    }

    /// Create an invalid operation error
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Create an evaluation error
    pub fn evaluation_error(message: impl Into<String>) -> Self {
        Self::EvaluationError {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for FhirPathError {
    fn from(err: serde_json::Error) -> Self {
        FhirPathError::Foundation(FoundationError::Serialization(err))
    }
}
