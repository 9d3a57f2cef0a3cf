//! Process-wide FHIR release selection.
//!
//! A single knob selects which release's datatype tables are active.
//! It must be initialised explicitly before the first lookup (or the
//! default of R4B applies); switching releases mid-run is not supported.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// Supported FHIR releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FhirRelease {
    R4B,
    R5,
}

impl FhirRelease {
    /// Parse a release tag such as `"R4B"` or `"r5"`.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.to_ascii_uppercase().as_str() {
            "R4B" | "R4" => Some(FhirRelease::R4B),
            "R5" => Some(FhirRelease::R5),
            _ => None,
        }
    }
}

impl Default for FhirRelease {
    fn default() -> Self {
        FhirRelease::R4B
    }
}

impl fmt::Display for FhirRelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FhirRelease::R4B => write!(f, "R4B"),
            FhirRelease::R5 => write!(f, "R5"),
        }
    }
}

/// Error raised when the release selector is initialised twice with
/// conflicting values.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("FHIR release already initialised to {active}, cannot switch to {requested}")]
pub struct ReleaseInitError {
    pub active: FhirRelease,
    pub requested: FhirRelease,
}

static ACTIVE_RELEASE: OnceLock<FhirRelease> = OnceLock::new();

/// Initialise the process-wide release. Idempotent for the same value;
/// a second call with a different release is an error.
pub fn initialize_release(release: FhirRelease) -> Result<(), ReleaseInitError> {
    let active = *ACTIVE_RELEASE.get_or_init(|| release);
    if active == release {
        Ok(())
    } else {
        Err(ReleaseInitError {
            active,
            requested: release,
        })
    }
}

/// The active release; R4B unless explicitly initialised otherwise.
pub fn active_release() -> FhirRelease {
    ACTIVE_RELEASE.get().copied().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tags() {
        assert_eq!(FhirRelease::parse("r4b"), Some(FhirRelease::R4B));
        assert_eq!(FhirRelease::parse("R5"), Some(FhirRelease::R5));
        assert_eq!(FhirRelease::parse("DSTU2"), None);
    }

    #[test]
    fn test_initialise_is_idempotent() {
        initialize_release(FhirRelease::R4B).unwrap();
        initialize_release(FhirRelease::R4B).unwrap();
        assert_eq!(active_release(), FhirRelease::R4B);
        assert!(initialize_release(FhirRelease::R5).is_err());
    }
}
