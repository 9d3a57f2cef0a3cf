//! Constraints and invariants attached to profiled elements.

use crate::model::ProfileModel;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// A FHIRPath rule that must hold for an element to be valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Invariant {
    pub key: String,
    pub severity: String,
    pub human: String,
    pub expression: Option<String>,
}

/// Upper cardinality bound; `*` in the wire form is `Unbounded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CardinalityMax {
    Bounded(u32),
    Unbounded,
}

impl CardinalityMax {
    /// Parse the wire form: an integer or `*`.
    pub fn parse(text: &str) -> Option<Self> {
        if text == "*" {
            Some(CardinalityMax::Unbounded)
        } else {
            text.parse::<u32>().ok().map(CardinalityMax::Bounded)
        }
    }

    pub fn allows(&self, count: usize) -> bool {
        match self {
            CardinalityMax::Bounded(max) => count <= *max as usize,
            CardinalityMax::Unbounded => true,
        }
    }

    /// Numeric ceiling, saturating for the unbounded case.
    pub fn limit(&self) -> u32 {
        match self {
            CardinalityMax::Bounded(max) => *max,
            CardinalityMax::Unbounded => u32::MAX,
        }
    }
}

impl std::fmt::Display for CardinalityMax {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CardinalityMax::Bounded(max) => write!(f, "{max}"),
            CardinalityMax::Unbounded => write!(f, "*"),
        }
    }
}

/// A predicate attached to a path in the element tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Constraint {
    pub id: String,
    pub path: String,
    pub min: Option<u32>,
    pub max: Option<CardinalityMax>,
    /// Allowed FHIR type names for the constrained element.
    pub value_types: Vec<String>,
    pub fixed_value: Option<Value>,
    pub pattern_value: Option<Value>,
    /// Nested profile compiled from an Extension type reference.
    #[serde(skip)]
    pub profile: Option<Arc<ProfileModel>>,
    pub binding: Option<String>,
    pub invariants: Vec<Invariant>,
}

impl Constraint {
    /// True when the constraint's id references a slice (`:<name>`).
    pub fn is_slice_constraint(&self) -> bool {
        self.id.contains(':')
    }

    /// The slice name referenced by the constraint id.
    pub fn constrained_slice_name(&self) -> Option<&str> {
        self.id
            .split_once(':')
            .map(|(_, rest)| rest.split('.').next().unwrap_or(rest))
    }
}
