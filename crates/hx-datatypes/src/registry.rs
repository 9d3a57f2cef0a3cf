//! The version-tagged type registry.
//!
//! Lookup key is `(release, name)`; the result is either a primitive
//! descriptor or a complex field table. The R5 catalogue falls back to
//! the R4B table for the general-purpose datatypes, which are identical
//! at the granularity modelled here.

use crate::complex::{build_type_table, ComplexType, FieldDef};
use crate::primitives::PrimitiveType;
use crate::release::FhirRelease;
use once_cell::sync::Lazy;
use std::collections::HashMap;

static R4B_TYPES: Lazy<HashMap<String, ComplexType>> = Lazy::new(|| {
    build_type_table()
        .into_iter()
        .map(|t| (t.name.clone(), t))
        .collect()
});

fn table_for(release: FhirRelease) -> &'static HashMap<String, ComplexType> {
    match release {
        FhirRelease::R4B | FhirRelease::R5 => &R4B_TYPES,
    }
}

/// A registry lookup result: a primitive or a complex descriptor.
#[derive(Debug, Clone, Copy)]
pub enum TypeDescriptor {
    Primitive(PrimitiveType),
    Complex(&'static ComplexType),
}

/// Look up a datatype by `(release, name)`.
pub fn lookup(release: FhirRelease, name: &str) -> Option<TypeDescriptor> {
    if let Some(primitive) = PrimitiveType::from_name(name) {
        return Some(TypeDescriptor::Primitive(primitive));
    }
    table_for(release).get(name).map(TypeDescriptor::Complex)
}

/// Resolve a field of a complex type, walking the base-type chain.
pub fn field_of(release: FhirRelease, type_name: &str, field: &str) -> Option<&'static FieldDef> {
    let table = table_for(release);
    let mut current = table.get(type_name)?;
    loop {
        if let Some(def) = current.field(field) {
            return Some(def);
        }
        match current.base.as_deref().and_then(|base| table.get(base)) {
            Some(base_type) => current = base_type,
            None => return None,
        }
    }
}

/// All concrete variants of a type-choice element, base chain included.
pub fn choice_variants_of(
    release: FhirRelease,
    type_name: &str,
    base: &str,
) -> Vec<&'static FieldDef> {
    let table = table_for(release);
    let mut variants = Vec::new();
    let mut current = table.get(type_name);
    while let Some(t) = current {
        variants.extend(t.choice_variants(base));
        current = t.base.as_deref().and_then(|b| table.get(b));
    }
    variants
}

/// The FHIR R4B base resource names, used by the lexer's root-node table.
pub const RESOURCE_NAMES: &[&str] = &[
    "Account",
    "ActivityDefinition",
    "AdministrableProductDefinition",
    "AdverseEvent",
    "AllergyIntolerance",
    "Appointment",
    "AppointmentResponse",
    "AuditEvent",
    "Basic",
    "Binary",
    "BiologicallyDerivedProduct",
    "BodyStructure",
    "Bundle",
    "CapabilityStatement",
    "CarePlan",
    "CareTeam",
    "CatalogEntry",
    "ChargeItem",
    "ChargeItemDefinition",
    "Citation",
    "Claim",
    "ClaimResponse",
    "ClinicalImpression",
    "ClinicalUseDefinition",
    "CodeSystem",
    "Communication",
    "CommunicationRequest",
    "CompartmentDefinition",
    "Composition",
    "ConceptMap",
    "Condition",
    "Consent",
    "Contract",
    "Coverage",
    "CoverageEligibilityRequest",
    "CoverageEligibilityResponse",
    "DetectedIssue",
    "Device",
    "DeviceDefinition",
    "DeviceMetric",
    "DeviceRequest",
    "DeviceUseStatement",
    "DiagnosticReport",
    "DocumentManifest",
    "DocumentReference",
    "Encounter",
    "Endpoint",
    "EnrollmentRequest",
    "EnrollmentResponse",
    "EpisodeOfCare",
    "EventDefinition",
    "Evidence",
    "EvidenceReport",
    "EvidenceVariable",
    "ExampleScenario",
    "ExplanationOfBenefit",
    "FamilyMemberHistory",
    "Flag",
    "Goal",
    "GraphDefinition",
    "Group",
    "GuidanceResponse",
    "HealthcareService",
    "ImagingStudy",
    "Immunization",
    "ImmunizationEvaluation",
    "ImmunizationRecommendation",
    "ImplementationGuide",
    "Ingredient",
    "InsurancePlan",
    "Invoice",
    "Library",
    "Linkage",
    "List",
    "Location",
    "ManufacturedItemDefinition",
    "Measure",
    "MeasureReport",
    "Media",
    "Medication",
    "MedicationAdministration",
    "MedicationDispense",
    "MedicationKnowledge",
    "MedicationRequest",
    "MedicationStatement",
    "MedicinalProductDefinition",
    "MessageDefinition",
    "MessageHeader",
    "MolecularSequence",
    "NamingSystem",
    "NutritionOrder",
    "NutritionProduct",
    "Observation",
    "ObservationDefinition",
    "OperationDefinition",
    "OperationOutcome",
    "Organization",
    "OrganizationAffiliation",
    "PackagedProductDefinition",
    "Parameters",
    "Patient",
    "PaymentNotice",
    "PaymentReconciliation",
    "Person",
    "PlanDefinition",
    "Practitioner",
    "PractitionerRole",
    "Procedure",
    "Provenance",
    "Questionnaire",
    "QuestionnaireResponse",
    "RegulatedAuthorization",
    "RelatedPerson",
    "RequestGroup",
    "ResearchDefinition",
    "ResearchElementDefinition",
    "ResearchStudy",
    "ResearchSubject",
    "RiskAssessment",
    "Schedule",
    "SearchParameter",
    "ServiceRequest",
    "Slot",
    "Specimen",
    "SpecimenDefinition",
    "StructureDefinition",
    "StructureMap",
    "Subscription",
    "SubscriptionStatus",
    "SubscriptionTopic",
    "Substance",
    "SubstanceDefinition",
    "SupplyDelivery",
    "SupplyRequest",
    "Task",
    "TerminologyCapabilities",
    "TestReport",
    "TestScript",
    "ValueSet",
    "VerificationResult",
    "VisionPrescription",
];

/// The base resource names for the active catalogue.
pub fn resource_names() -> &'static [&'static str] {
    RESOURCE_NAMES
}

/// True when `name` may appear at the head of a FHIRPath (a base
/// resource or a known datatype).
pub fn is_resource_name(name: &str) -> bool {
    RESOURCE_NAMES.binary_search(&name).is_ok() || R4B_TYPES.contains_key(name)
}
