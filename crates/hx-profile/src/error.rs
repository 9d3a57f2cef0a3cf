//! Error types for profile compilation and validation.

use crate::validate::ValidationResult;
use hx_fhirpath::FhirPathError;
use hx_foundation::FoundationError;
use thiserror::Error;

/// Errors that can occur while ingesting, compiling or applying a
/// FHIR profile.
#[derive(Error, Debug)]
pub enum ProfileError {
    /// StructureDefinition retrieval failed
    #[error("Failed to retrieve StructureDefinition: {message}")]
    Ingestion { message: String },

    /// The StructureDefinition carries no usable snapshot
    #[error("Invalid StructureDefinition: Missing 'snapshot' or 'element' field")]
    MissingSnapshot,

    /// Model compilation failed
    #[error("Failed to compile profile model: {message}")]
    Compile { message: String },

    /// Aggregated validation failure for a single resource
    #[error("Resource validation failed: {0}")]
    Validation(ValidationResult),

    /// More than one variant of a type-choice element is populated
    #[error("Multiple variants of type-choice element '{base}' are set: {fields:?}")]
    AmbiguousTypeChoice { base: String, fields: Vec<String> },

    /// FHIRPath error from a constraint or discriminator expression
    #[error(transparent)]
    FhirPath(#[from] FhirPathError),

    /// Foundation error (covers IO, JSON, HTTP)
    #[error(transparent)]
    Foundation(#[from] FoundationError),
}

impl ProfileError {
    pub fn ingestion(message: impl Into<String>) -> Self {
        Self::Ingestion {
            message: message.into(),
        }
    }

    pub fn compile(message: impl Into<String>) -> Self {
        Self::Compile {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ProfileError {
    fn from(err: serde_json::Error) -> Self {
        ProfileError::Foundation(FoundationError::Serialization(err))
    }
}

/// Result type for profile operations
pub type Result<T> = std::result::Result<T, ProfileError>;
