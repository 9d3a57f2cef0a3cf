//! # Profile-driven FHIR resource models
//!
//! This crate consumes FHIR `StructureDefinition` documents and
//! synthesises validating, constraint-aware, slice-aware data models at
//! runtime. A compiled [`ProfileModel`] is a data-driven validator: an
//! ordered field table plus invariants, slicing metadata and per-path
//! constraints, interpreted by a generic engine over
//! `serde_json::Value` resources.
//!
//! The [`ProfileRuntime`] drives the write-then-clean cycle used when
//! ingesting outside data into a profiled resource: construct a
//! skeleton with preset values and slice placeholders, track mutation,
//! then prune the placeholders that were never completed or touched.
//!
//! ## Example
//!
//! ```no_run
//! use hx_profile::{ProfileRegistry, ProfileRuntime};
//!
//! # fn main() -> hx_profile::Result<()> {
//! let registry = ProfileRegistry::new()?;
//! let model = registry.compile("https://example.org/StructureDefinition/bp-profile")?;
//!
//! let runtime = ProfileRuntime::new();
//! let mut resource = runtime.construct_with_profiled_elements(&model)?;
//! let journal = runtime.track_slice_changes(&resource, &model)?;
//! // ... fill the placeholders through FHIRPath writes ...
//! runtime.clean_elements_and_slices(&mut resource, &model, &journal)?;
//! let report = model.validate(&resource)?;
//! # Ok(())
//! # }
//! ```

pub mod constraint;
pub mod error;
pub mod model;
pub mod registry;
pub mod resolver;
pub mod runtime;
pub mod slicing;
pub mod structure;
pub mod validate;

pub use constraint::{CardinalityMax, Constraint, Invariant};
pub use error::{ProfileError, Result};
pub use model::{compile_model, CompiledRecord, FieldSpec, InvariantBinding, ProfileModel, ProfileResolver};
pub use registry::ProfileRegistry;
pub use resolver::ProfileAwareResolver;
pub use runtime::{ChangeJournal, ProfileRuntime, DEFAULT_SLICE_COPIES};
pub use slicing::{Discriminator, DiscriminatorKind, Slice, SlicingGroup, SlicingRules};
pub use structure::{
    build_element_tree, parse_structure_definition, ElementDefinition, ElementNode, Snapshot,
    StructureDefinition, StructureDefinitionIngestor,
};
pub use validate::{
    IssueCode, OperationOutcome, Severity, ValidationIssue, ValidationResult,
};
