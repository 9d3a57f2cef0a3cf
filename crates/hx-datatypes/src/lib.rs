//! # FHIR datatype catalogue
//!
//! Version-tagged catalogue of FHIR datatypes used by the FHIRPath engine
//! and the profile model factory:
//!
//! - primitive types with their specification regex patterns and coercions
//! - complex types as ordered field tables, including polymorphic
//!   type-choice fields and `_field` extension carriers
//! - the base-resource name table
//! - the process-wide FHIR release selector

pub mod complex;
pub mod primitives;
pub mod registry;
pub mod release;

pub use complex::{ComplexType, FieldDef, FieldKind};
pub use primitives::PrimitiveType;
pub use registry::{
    choice_variants_of, field_of, is_resource_name, lookup, resource_names, TypeDescriptor,
};
pub use release::{active_release, initialize_release, FhirRelease, ReleaseInitError};
