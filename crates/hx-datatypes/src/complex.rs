//! FHIR complex datatypes as ordered field tables.
//!
//! Complex types are records with named, optionally repeated, optionally
//! polymorphic fields, and may inherit from another complex type
//! (`BackboneElement` from `Element`, `DomainResource` from `Resource`).
//! Type-choice fields are stored pre-expanded: one entry per concrete
//! variant, each carrying the base name in `choice_of`.

use crate::primitives::PrimitiveType;
use serde::{Deserialize, Serialize};

/// The type of a single field: a primitive or a named complex type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    Primitive(PrimitiveType),
    Complex(String),
}

impl FieldKind {
    /// The referenced type name.
    pub fn type_name(&self) -> String {
        match self {
            FieldKind::Primitive(p) => p.name().to_string(),
            FieldKind::Complex(name) => name.clone(),
        }
    }
}

/// A single field of a complex type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    pub min: u32,
    /// Upper cardinality; `None` means unbounded (`*`).
    pub max: Option<u32>,
    /// Base name when this field is one variant of a type-choice element.
    pub choice_of: Option<String>,
}

impl FieldDef {
    pub fn is_list(&self) -> bool {
        self.max.map_or(true, |m| m > 1)
    }

    pub fn primitive(&self) -> Option<PrimitiveType> {
        match &self.kind {
            FieldKind::Primitive(p) => Some(*p),
            FieldKind::Complex(_) => None,
        }
    }

    /// Name of the sibling `_<field>` extension carrier, present for
    /// primitive-typed fields only.
    pub fn ext_carrier_name(&self) -> Option<String> {
        self.primitive().map(|_| format!("_{}", self.name))
    }
}

/// A complex FHIR type: an ordered field table plus a base-type link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplexType {
    pub name: String,
    pub base: Option<String>,
    pub fields: Vec<FieldDef>,
}

impl ComplexType {
    /// Look up a directly-declared field (inherited fields are resolved
    /// by the registry, which walks the base chain).
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// All concrete variants of the type-choice element with the given
    /// base name.
    pub fn choice_variants(&self, base: &str) -> Vec<&FieldDef> {
        self.fields
            .iter()
            .filter(|f| f.choice_of.as_deref() == Some(base))
            .collect()
    }
}

fn prim(name: &str, p: PrimitiveType, min: u32, max: Option<u32>) -> FieldDef {
    FieldDef {
        name: name.to_string(),
        kind: FieldKind::Primitive(p),
        min,
        max,
        choice_of: None,
    }
}

fn cplx(name: &str, ty: &str, min: u32, max: Option<u32>) -> FieldDef {
    FieldDef {
        name: name.to_string(),
        kind: FieldKind::Complex(ty.to_string()),
        min,
        max,
        choice_of: None,
    }
}

/// Expand a `<base>[x]` element into one field per allowed type, named
/// `<base><TypePascalCase>`.
fn choice(base: &str, kinds: &[FieldKind]) -> Vec<FieldDef> {
    kinds
        .iter()
        .map(|kind| FieldDef {
            name: format!("{base}{}", kind.type_name()),
            kind: kind.clone(),
            min: 0,
            max: Some(1),
            choice_of: Some(base.to_string()),
        })
        .collect()
}

fn open_value_choice(base: &str) -> Vec<FieldDef> {
    use FieldKind::{Complex, Primitive};
    use PrimitiveType as P;
    choice(
        base,
        &[
            Primitive(P::Boolean),
            Primitive(P::Code),
            Primitive(P::Date),
            Primitive(P::DateTime),
            Primitive(P::Decimal),
            Primitive(P::Integer),
            Primitive(P::String),
            Primitive(P::Time),
            Primitive(P::Uri),
            Complex("Quantity".to_string()),
            Complex("CodeableConcept".to_string()),
            Complex("Coding".to_string()),
            Complex("Range".to_string()),
            Complex("Ratio".to_string()),
            Complex("Period".to_string()),
            Complex("SampledData".to_string()),
            Complex("Reference".to_string()),
            Complex("Identifier".to_string()),
        ],
    )
}

fn observation_value_choice(base: &str) -> Vec<FieldDef> {
    use FieldKind::{Complex, Primitive};
    use PrimitiveType as P;
    choice(
        base,
        &[
            Complex("Quantity".to_string()),
            Complex("CodeableConcept".to_string()),
            Primitive(P::String),
            Primitive(P::Boolean),
            Primitive(P::Integer),
            Complex("Range".to_string()),
            Complex("Ratio".to_string()),
            Complex("SampledData".to_string()),
            Primitive(P::Time),
            Primitive(P::DateTime),
            Complex("Period".to_string()),
        ],
    )
}

fn ty(name: &str, base: Option<&str>, fields: Vec<Vec<FieldDef>>) -> ComplexType {
    ComplexType {
        name: name.to_string(),
        base: base.map(str::to_string),
        fields: fields.into_iter().flatten().collect(),
    }
}

/// Build the complete datatype table for one release.
///
/// The general-purpose datatypes did not change between R4B and R5 at
/// the granularity modelled here, so both releases share this table.
pub(crate) fn build_type_table() -> Vec<ComplexType> {
    use PrimitiveType as P;

    vec![
        ty(
            "Element",
            None,
            vec![vec![
                prim("id", P::String, 0, Some(1)),
                cplx("extension", "Extension", 0, None),
            ]],
        ),
        ty(
            "BackboneElement",
            Some("Element"),
            vec![vec![cplx("modifierExtension", "Extension", 0, None)]],
        ),
        ty(
            "Extension",
            Some("Element"),
            vec![
                vec![prim("url", P::Uri, 1, Some(1))],
                open_value_choice("value"),
            ],
        ),
        ty(
            "Coding",
            Some("Element"),
            vec![vec![
                prim("system", P::Uri, 0, Some(1)),
                prim("version", P::String, 0, Some(1)),
                prim("code", P::Code, 0, Some(1)),
                prim("display", P::String, 0, Some(1)),
                prim("userSelected", P::Boolean, 0, Some(1)),
            ]],
        ),
        ty(
            "CodeableConcept",
            Some("Element"),
            vec![vec![
                cplx("coding", "Coding", 0, None),
                prim("text", P::String, 0, Some(1)),
            ]],
        ),
        ty(
            "Quantity",
            Some("Element"),
            vec![vec![
                prim("value", P::Decimal, 0, Some(1)),
                prim("comparator", P::Code, 0, Some(1)),
                prim("unit", P::String, 0, Some(1)),
                prim("system", P::Uri, 0, Some(1)),
                prim("code", P::Code, 0, Some(1)),
            ]],
        ),
        ty(
            "Period",
            Some("Element"),
            vec![vec![
                prim("start", P::DateTime, 0, Some(1)),
                prim("end", P::DateTime, 0, Some(1)),
            ]],
        ),
        ty(
            "Range",
            Some("Element"),
            vec![vec![
                cplx("low", "Quantity", 0, Some(1)),
                cplx("high", "Quantity", 0, Some(1)),
            ]],
        ),
        ty(
            "Ratio",
            Some("Element"),
            vec![vec![
                cplx("numerator", "Quantity", 0, Some(1)),
                cplx("denominator", "Quantity", 0, Some(1)),
            ]],
        ),
        ty(
            "SampledData",
            Some("Element"),
            vec![vec![
                cplx("origin", "Quantity", 1, Some(1)),
                prim("period", P::Decimal, 1, Some(1)),
                prim("factor", P::Decimal, 0, Some(1)),
                prim("lowerLimit", P::Decimal, 0, Some(1)),
                prim("upperLimit", P::Decimal, 0, Some(1)),
                prim("dimensions", P::PositiveInt, 1, Some(1)),
                prim("data", P::String, 0, Some(1)),
            ]],
        ),
        ty(
            "Reference",
            Some("Element"),
            vec![vec![
                prim("reference", P::String, 0, Some(1)),
                prim("type", P::Uri, 0, Some(1)),
                cplx("identifier", "Identifier", 0, Some(1)),
                prim("display", P::String, 0, Some(1)),
            ]],
        ),
        ty(
            "Identifier",
            Some("Element"),
            vec![vec![
                prim("use", P::Code, 0, Some(1)),
                cplx("type", "CodeableConcept", 0, Some(1)),
                prim("system", P::Uri, 0, Some(1)),
                prim("value", P::String, 0, Some(1)),
                cplx("period", "Period", 0, Some(1)),
                cplx("assigner", "Reference", 0, Some(1)),
            ]],
        ),
        ty(
            "HumanName",
            Some("Element"),
            vec![vec![
                prim("use", P::Code, 0, Some(1)),
                prim("text", P::String, 0, Some(1)),
                prim("family", P::String, 0, Some(1)),
                prim("given", P::String, 0, None),
                prim("prefix", P::String, 0, None),
                prim("suffix", P::String, 0, None),
                cplx("period", "Period", 0, Some(1)),
            ]],
        ),
        ty(
            "ContactPoint",
            Some("Element"),
            vec![vec![
                prim("system", P::Code, 0, Some(1)),
                prim("value", P::String, 0, Some(1)),
                prim("use", P::Code, 0, Some(1)),
                prim("rank", P::PositiveInt, 0, Some(1)),
                cplx("period", "Period", 0, Some(1)),
            ]],
        ),
        ty(
            "Address",
            Some("Element"),
            vec![vec![
                prim("use", P::Code, 0, Some(1)),
                prim("type", P::Code, 0, Some(1)),
                prim("text", P::String, 0, Some(1)),
                prim("line", P::String, 0, None),
                prim("city", P::String, 0, Some(1)),
                prim("district", P::String, 0, Some(1)),
                prim("state", P::String, 0, Some(1)),
                prim("postalCode", P::String, 0, Some(1)),
                prim("country", P::String, 0, Some(1)),
                cplx("period", "Period", 0, Some(1)),
            ]],
        ),
        ty(
            "Attachment",
            Some("Element"),
            vec![vec![
                prim("contentType", P::Code, 0, Some(1)),
                prim("language", P::Code, 0, Some(1)),
                prim("data", P::Base64Binary, 0, Some(1)),
                prim("url", P::Url, 0, Some(1)),
                prim("size", P::UnsignedInt, 0, Some(1)),
                prim("hash", P::Base64Binary, 0, Some(1)),
                prim("title", P::String, 0, Some(1)),
                prim("creation", P::DateTime, 0, Some(1)),
            ]],
        ),
        ty(
            "Annotation",
            Some("Element"),
            vec![
                choice(
                    "author",
                    &[
                        FieldKind::Complex("Reference".to_string()),
                        FieldKind::Primitive(P::String),
                    ],
                ),
                vec![
                    prim("time", P::DateTime, 0, Some(1)),
                    prim("text", P::Markdown, 1, Some(1)),
                ],
            ],
        ),
        ty(
            "Meta",
            Some("Element"),
            vec![vec![
                prim("versionId", P::Id, 0, Some(1)),
                prim("lastUpdated", P::Instant, 0, Some(1)),
                prim("source", P::Uri, 0, Some(1)),
                prim("profile", P::Canonical, 0, None),
                cplx("security", "Coding", 0, None),
                cplx("tag", "Coding", 0, None),
            ]],
        ),
        ty(
            "Narrative",
            Some("Element"),
            vec![vec![
                prim("status", P::Code, 1, Some(1)),
                prim("div", P::String, 1, Some(1)),
            ]],
        ),
        ty(
            "Resource",
            None,
            vec![vec![
                prim("id", P::Id, 0, Some(1)),
                cplx("meta", "Meta", 0, Some(1)),
                prim("implicitRules", P::Uri, 0, Some(1)),
                prim("language", P::Code, 0, Some(1)),
            ]],
        ),
        ty(
            "DomainResource",
            Some("Resource"),
            vec![vec![
                cplx("text", "Narrative", 0, Some(1)),
                cplx("contained", "Resource", 0, None),
                cplx("extension", "Extension", 0, None),
                cplx("modifierExtension", "Extension", 0, None),
            ]],
        ),
        ty(
            "Patient",
            Some("DomainResource"),
            vec![
                vec![
                    cplx("identifier", "Identifier", 0, None),
                    prim("active", P::Boolean, 0, Some(1)),
                    cplx("name", "HumanName", 0, None),
                    cplx("telecom", "ContactPoint", 0, None),
                    prim("gender", P::Code, 0, Some(1)),
                    prim("birthDate", P::Date, 0, Some(1)),
                ],
                choice(
                    "deceased",
                    &[
                        FieldKind::Primitive(P::Boolean),
                        FieldKind::Primitive(P::DateTime),
                    ],
                ),
                vec![
                    cplx("address", "Address", 0, None),
                    cplx("maritalStatus", "CodeableConcept", 0, Some(1)),
                ],
                choice(
                    "multipleBirth",
                    &[
                        FieldKind::Primitive(P::Boolean),
                        FieldKind::Primitive(P::Integer),
                    ],
                ),
                vec![
                    cplx("photo", "Attachment", 0, None),
                    cplx("contact", "BackboneElement", 0, None),
                    cplx("communication", "BackboneElement", 0, None),
                    cplx("generalPractitioner", "Reference", 0, None),
                    cplx("managingOrganization", "Reference", 0, Some(1)),
                    cplx("link", "BackboneElement", 0, None),
                ],
            ],
        ),
        ty(
            "Observation",
            Some("DomainResource"),
            vec![
                vec![
                    cplx("identifier", "Identifier", 0, None),
                    cplx("basedOn", "Reference", 0, None),
                    cplx("partOf", "Reference", 0, None),
                    prim("status", P::Code, 1, Some(1)),
                    cplx("category", "CodeableConcept", 0, None),
                    cplx("code", "CodeableConcept", 1, Some(1)),
                    cplx("subject", "Reference", 0, Some(1)),
                    cplx("focus", "Reference", 0, None),
                    cplx("encounter", "Reference", 0, Some(1)),
                ],
                choice(
                    "effective",
                    &[
                        FieldKind::Primitive(P::DateTime),
                        FieldKind::Complex("Period".to_string()),
                        FieldKind::Primitive(P::Instant),
                    ],
                ),
                vec![
                    prim("issued", P::Instant, 0, Some(1)),
                    cplx("performer", "Reference", 0, None),
                ],
                observation_value_choice("value"),
                vec![
                    cplx("dataAbsentReason", "CodeableConcept", 0, Some(1)),
                    cplx("interpretation", "CodeableConcept", 0, None),
                    cplx("note", "Annotation", 0, None),
                    cplx("bodySite", "CodeableConcept", 0, Some(1)),
                    cplx("method", "CodeableConcept", 0, Some(1)),
                    cplx("specimen", "Reference", 0, Some(1)),
                    cplx("device", "Reference", 0, Some(1)),
                    cplx("referenceRange", "ObservationReferenceRange", 0, None),
                    cplx("hasMember", "Reference", 0, None),
                    cplx("derivedFrom", "Reference", 0, None),
                    cplx("component", "ObservationComponent", 0, None),
                ],
            ],
        ),
        ty(
            "ObservationComponent",
            Some("BackboneElement"),
            vec![
                vec![cplx("code", "CodeableConcept", 1, Some(1))],
                observation_value_choice("value"),
                vec![
                    cplx("dataAbsentReason", "CodeableConcept", 0, Some(1)),
                    cplx("interpretation", "CodeableConcept", 0, None),
                    cplx("referenceRange", "ObservationReferenceRange", 0, None),
                ],
            ],
        ),
        ty(
            "ObservationReferenceRange",
            Some("BackboneElement"),
            vec![vec![
                cplx("low", "Quantity", 0, Some(1)),
                cplx("high", "Quantity", 0, Some(1)),
                cplx("type", "CodeableConcept", 0, Some(1)),
                cplx("appliesTo", "CodeableConcept", 0, None),
                cplx("age", "Range", 0, Some(1)),
                prim("text", P::String, 0, Some(1)),
            ]],
        ),
    ]
}
