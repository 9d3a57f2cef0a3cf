//! Error types and utilities for the workspace.
//!
//! This module provides the foundation error type that can be extended
//! by domain-specific error types in other crates.

use std::fmt;
use thiserror::Error;

/// Foundation error type providing common error variants.
///
/// Domain crates (FHIRPath, profiles) wrap this in their own error
/// enums via `#[from]`, so I/O, serialization and HTTP failures flow
/// through one shape everywhere.
///
/// # Example
/// ```
/// use hx_foundation::ErrorContext;
///
/// fn load_definition(path: &str) -> hx_foundation::Result<String> {
///     std::fs::read_to_string(path)
///         .with_context(|| format!("Reading StructureDefinition from {path}"))
/// }
/// ```
#[derive(Error, Debug)]
pub enum FoundationError {
    /// Configuration error with a descriptive message
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(#[from] anyhow::Error),

    /// Invalid input with descriptive message
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(String),
}

/// Result type alias using FoundationError
pub type Result<T> = std::result::Result<T, FoundationError>;

/// Attach a human-readable description to a failing operation.
///
/// A bare transport or parse error ("connection refused", "expected
/// value at line 1") says nothing about *which* profile or definition
/// was being processed; the ingestor and resolver use this trait to
/// carry that information. The original error is preserved as the
/// source of a [`FoundationError::Other`].
pub trait ErrorContext<T, E> {
    /// Attach a fixed description.
    fn context(self, context: impl fmt::Display) -> Result<T>;

    /// Attach a lazily-built description, for messages that format
    /// URLs or paths.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T, E> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, context: impl fmt::Display) -> Result<T> {
        let description = context.to_string();
        self.with_context(|| description)
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| FoundationError::Other(anyhow::Error::new(e).context(f())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file not found",
        ));

        let with_context = result.context("Reading configuration");
        assert!(with_context.is_err());

        let err_msg = format!("{}", with_context.unwrap_err());
        assert!(err_msg.contains("Reading configuration"));
    }

    #[test]
    fn test_error_display() {
        let err = FoundationError::InvalidInput("bad value".to_string());
        assert_eq!(format!("{err}"), "Invalid input: bad value");
    }
}
