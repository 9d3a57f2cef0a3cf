//! The compiled, data-driven profile model.
//!
//! Instead of synthesising types at runtime, compilation produces a
//! [`ProfileModel`] value: an ordered table of field specifications plus
//! invariant bindings, slicing metadata and non-slice constraints. A
//! generic engine (validation, runtime) interprets the model against
//! `serde_json::Value` resources.

use crate::constraint::{CardinalityMax, Constraint, Invariant};
use crate::error::{ProfileError, Result};
use crate::slicing::{Discriminator, Slice, SlicingGroup, SlicingRules};
use crate::structure::{
    build_element_tree, ElementDefinition, ElementNode, StructureDefinition,
};
use convert_case::{Case, Casing};
use hx_datatypes::{active_release, lookup, FhirRelease, PrimitiveType, TypeDescriptor};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, trace};

/// Seam for resolving nested profile references during compilation;
/// implemented by the profile registry so recursive compiles share one
/// cache.
pub trait ProfileResolver {
    fn resolve_profile(&self, canonical_url: &str) -> Result<Arc<ProfileModel>>;
}

/// One FHIRPath invariant bound to a model or a set of fields.
///
/// The identifier is derived from the constraint key; bindings with the
/// same key accumulate all affected fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantBinding {
    pub identifier: String,
    pub key: String,
    pub severity: String,
    pub human: String,
    pub expression: Option<String>,
    pub fields: Vec<String>,
}

/// Specification of a single model field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    /// Allowed FHIR type names.
    pub types: Vec<String>,
    pub min: u32,
    /// Upper cardinality; `None` is unbounded.
    pub max: Option<u32>,
    pub short: Option<String>,
    /// Base name when this field is one variant of a type-choice element.
    pub choice_of: Option<String>,
    /// True for `_<field>` primitive extension carriers.
    pub is_ext_carrier: bool,
    /// Nested record for backbone elements.
    pub nested: Option<Box<CompiledRecord>>,
}

impl FieldSpec {
    pub fn is_list(&self) -> bool {
        self.max.map_or(true, |m| m > 1)
    }

    pub fn is_required(&self) -> bool {
        self.min > 0
    }

    /// The primitive type when the field has exactly one primitive type.
    pub fn primitive(&self) -> Option<PrimitiveType> {
        match self.types.as_slice() {
            [single] => PrimitiveType::from_name(single),
            _ => None,
        }
    }
}

/// An ordered field table with its invariant bindings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompiledRecord {
    pub name: String,
    pub fields: IndexMap<String, FieldSpec>,
    /// Type-choice base name to the concrete variant field names.
    pub choice_groups: IndexMap<String, Vec<String>>,
    pub field_invariants: Vec<InvariantBinding>,
    pub model_invariants: Vec<InvariantBinding>,
}

impl CompiledRecord {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    /// Field names that count towards FHIR-completeness: everything
    /// except extensions, ids, narrative and the `_field` carriers.
    /// Choice variants collapse into their base name.
    pub fn completeness_fields(&self) -> Vec<String> {
        const BASE_ELEMENTS: [&str; 5] = ["text", "extension", "modifierExtension", "id", "resourceType"];
        let mut names = Vec::new();
        for (name, spec) in &self.fields {
            if spec.is_ext_carrier || name.starts_with('_') {
                continue;
            }
            if BASE_ELEMENTS.contains(&name.as_str()) {
                continue;
            }
            match &spec.choice_of {
                Some(base) => {
                    if !names.contains(base) {
                        names.push(base.clone());
                    }
                }
                None => names.push(name.clone()),
            }
        }
        names
    }

    /// The field names populated in an instance, collapsed the same way
    /// as [`completeness_fields`](Self::completeness_fields).
    pub fn populated_fields(&self, instance: &Value) -> Vec<String> {
        let obj = match instance.as_object() {
            Some(obj) => obj,
            None => return Vec::new(),
        };
        let mut names = Vec::new();
        for (name, value) in obj {
            if hx_foundation::json::is_empty_value(value) {
                continue;
            }
            let logical = match self.fields.get(name).and_then(|f| f.choice_of.clone()) {
                Some(base) => base,
                None => name.clone(),
            };
            if !names.contains(&logical) {
                names.push(logical);
            }
        }
        names
    }
}

/// The runtime artifact of compiling a StructureDefinition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileModel {
    pub name: String,
    pub resource_type: String,
    pub canonical_url: Option<String>,
    pub version: Option<String>,
    pub kind: Option<String>,
    /// Last segment of `baseDefinition`.
    pub base: Option<String>,
    pub record: CompiledRecord,
    pub slicing: Vec<SlicingGroup>,
    pub constraints: Vec<Constraint>,
}

impl ProfileModel {
    /// True when the profiled type is a resource (rather than a
    /// datatype such as a profiled Extension).
    pub fn is_resource(&self) -> bool {
        match self.kind.as_deref() {
            Some(kind) => kind == "resource",
            None => hx_datatypes::resource_names()
                .binary_search(&self.resource_type.as_str())
                .is_ok(),
        }
    }

    /// The `meta` preset recording the profile's canonical URL and
    /// version.
    pub fn meta_preset(&self) -> Option<Value> {
        let url = self.canonical_url.as_ref()?;
        let mut meta = json!({ "profile": [url] });
        if let Some(version) = &self.version {
            meta["versionId"] = json!(version);
        }
        Some(meta)
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.record.field(name)
    }

    /// Class-level slicing metadata.
    pub fn profile_slicing(&self) -> &[SlicingGroup] {
        &self.slicing
    }

    /// Class-level non-slice constraints.
    pub fn profile_constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// The single set variant of a type-choice element, validating that
    /// at most one is populated.
    pub fn choice_value<'a>(
        &self,
        instance: &'a Value,
        base: &str,
    ) -> Result<Option<(String, &'a Value)>> {
        let variants = match self.record.choice_groups.get(base) {
            Some(variants) => variants,
            None => return Ok(None),
        };
        let mut found: Vec<(String, &'a Value)> = Vec::new();
        for variant in variants {
            if let Some(value) = instance.get(variant) {
                if !value.is_null() {
                    found.push((variant.clone(), value));
                }
            }
        }
        match found.len() {
            0 => Ok(None),
            1 => Ok(found.pop()),
            _ => Err(ProfileError::AmbiguousTypeChoice {
                base: base.to_string(),
                fields: found.into_iter().map(|(name, _)| name).collect(),
            }),
        }
    }
}

/// Compile a StructureDefinition into a [`ProfileModel`].
pub fn compile_model(
    definition: &StructureDefinition,
    resolver: &dyn ProfileResolver,
) -> Result<ProfileModel> {
    let snapshot = definition
        .snapshot
        .as_ref()
        .filter(|s| !s.element.is_empty())
        .ok_or(ProfileError::MissingSnapshot)?;

    let release = active_release();
    let tree = build_element_tree(&snapshot.element);
    let structure = tree
        .children
        .get(&definition.type_)
        .ok_or_else(|| {
            ProfileError::compile(format!(
                "Snapshot does not describe the declared type '{}'",
                definition.type_
            ))
        })?;

    let mut record = compile_record(structure, &definition.name, release)?;

    // Model-level constraints declared on the root element
    if let Some(root_def) = &structure.definition {
        for constraint in root_def.constraint.iter().flatten() {
            bind_invariant(
                &mut record.model_invariants,
                constraint,
                None,
                "_constraint_model_validator",
            );
        }
    }

    let (slicing, constraints) = compile_profile_constraints(&snapshot.element, resolver)?;

    debug!(
        profile = %definition.name,
        fields = record.fields.len(),
        slicing_groups = slicing.len(),
        constraints = constraints.len(),
        "compiled profile model"
    );

    Ok(ProfileModel {
        name: definition.name.clone(),
        resource_type: definition.type_.clone(),
        canonical_url: Some(definition.url.clone()),
        version: definition.version.clone(),
        kind: definition.kind.clone(),
        base: definition
            .base_definition
            .as_deref()
            .and_then(|b| b.rsplit('/').next())
            .map(str::to_string),
        record,
        slicing,
        constraints,
    })
}

/// Strip canonical/system prefixes from a type code and normalise the
/// leading character (`dateTime` and `DateTime` both name `DateTime`).
fn parse_type_name(code: &str) -> String {
    let stripped = code
        .trim_start_matches("http://hl7.org/fhir/StructureDefinition/")
        .trim_start_matches("http://hl7.org/fhirpath/System.");
    capitalize_first(stripped)
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

fn cardinality(definition: &ElementDefinition) -> (u32, Option<u32>) {
    let min = definition.min.unwrap_or(0);
    let max = match definition.max.as_deref() {
        Some("*") | None => None,
        Some(n) => n.parse::<u32>().ok(),
    };
    (min, max)
}

/// Compile one level of the element tree into a record.
fn compile_record(
    node: &ElementNode,
    record_name: &str,
    release: FhirRelease,
) -> Result<CompiledRecord> {
    let mut record = CompiledRecord {
        name: record_name.to_string(),
        ..Default::default()
    };

    for (child_name, child_node) in &node.children {
        let definition = match &child_node.definition {
            Some(definition) => definition,
            None => continue,
        };
        let (min, max) = cardinality(definition);
        let type_codes: Vec<String> = definition
            .type_
            .iter()
            .flatten()
            .map(|t| parse_type_name(&t.code))
            .collect();
        // Elements without a declared type (content references) are
        // not representable as fields
        if type_codes.is_empty() {
            trace!(element = %definition.path, "skipping untyped element");
            continue;
        }

        if let Some(base) = child_name.strip_suffix("[x]") {
            // One concrete field per allowed type, plus the group entry
            // that powers the at-most-one validator and the accessor
            let mut variant_names = Vec::new();
            for type_name in &type_codes {
                let variant = format!("{base}{type_name}");
                variant_names.push(variant.clone());
                record.fields.insert(
                    variant.clone(),
                    FieldSpec {
                        name: variant.clone(),
                        types: vec![type_name.clone()],
                        min: 0,
                        max: Some(1),
                        short: definition.short.clone(),
                        choice_of: Some(base.to_string()),
                        is_ext_carrier: false,
                        nested: None,
                    },
                );
                if PrimitiveType::from_name(type_name).is_some() {
                    insert_ext_carrier(&mut record, &variant);
                }
            }
            record
                .choice_groups
                .insert(base.to_string(), variant_names);
            for constraint in definition.constraint.iter().flatten() {
                bind_invariant(
                    &mut record.field_invariants,
                    constraint,
                    Some(base),
                    "_constraint_validator",
                );
            }
            continue;
        }

        let nested = if has_backbone_type(&type_codes) && !child_node.children.is_empty() {
            let nested_name = format!("{record_name}{}", child_name.to_case(Case::Pascal));
            Some(Box::new(compile_record(child_node, &nested_name, release)?))
        } else {
            None
        };

        for constraint in definition.constraint.iter().flatten() {
            bind_invariant(
                &mut record.field_invariants,
                constraint,
                Some(child_name.as_str()),
                "_constraint_validator",
            );
        }

        let is_primitive = type_codes.len() == 1
            && matches!(
                lookup(release, &type_codes[0]),
                Some(TypeDescriptor::Primitive(_))
            );

        record.fields.insert(
            child_name.clone(),
            FieldSpec {
                name: child_name.clone(),
                types: type_codes,
                min,
                max,
                short: definition.short.clone(),
                choice_of: None,
                is_ext_carrier: false,
                nested,
            },
        );

        if is_primitive {
            insert_ext_carrier(&mut record, child_name);
        }
    }

    Ok(record)
}

fn has_backbone_type(type_codes: &[String]) -> bool {
    type_codes
        .iter()
        .any(|t| t == "BackboneElement" || t == "Element")
}

/// The sibling `_<field>` carrier holding extensions on a primitive.
fn insert_ext_carrier(record: &mut CompiledRecord, field_name: &str) {
    let carrier_name = format!("_{field_name}");
    record.fields.insert(
        carrier_name.clone(),
        FieldSpec {
            name: carrier_name,
            types: vec!["Element".to_string()],
            min: 0,
            max: Some(1),
            short: Some(format!("Extension carrier for {field_name}")),
            choice_of: None,
            is_ext_carrier: true,
            nested: None,
        },
    );
}

/// Attach an element constraint as an invariant binding; duplicate keys
/// accumulate all affected fields.
fn bind_invariant(
    bindings: &mut Vec<InvariantBinding>,
    constraint: &crate::structure::ElementConstraint,
    field: Option<&str>,
    suffix: &str,
) {
    let identifier = format!("FHIR_{}{suffix}", constraint.key.replace('-', "_"));
    if let Some(existing) = bindings.iter_mut().find(|b| b.identifier == identifier) {
        if let Some(field) = field {
            if !existing.fields.iter().any(|f| f == field) {
                existing.fields.push(field.to_string());
            }
        }
        return;
    }
    bindings.push(InvariantBinding {
        identifier,
        key: constraint.key.clone(),
        severity: constraint.severity.clone(),
        human: constraint.human.clone(),
        expression: constraint.expression.clone(),
        fields: field.map(|f| vec![f.to_string()]).unwrap_or_default(),
    });
}

/// Parse a `pattern[X]` / `fixed[X]` value with the FHIR type named by
/// its suffix: primitive string forms are coerced to native scalars,
/// complex values are kept as documents.
fn parse_typed_value(type_suffix: &str, value: &Value) -> Value {
    if let Some(primitive) = PrimitiveType::from_name(type_suffix) {
        if let Value::String(text) = value {
            if let Some(coerced) = primitive.coerce(text) {
                return coerced;
            }
        }
    }
    value.clone()
}

/// Walk the element list and collect slicing groups, slices and
/// per-path constraints.
pub(crate) fn compile_profile_constraints(
    elements: &[ElementDefinition],
    resolver: &dyn ProfileResolver,
) -> Result<(Vec<SlicingGroup>, Vec<Constraint>)> {
    let mut slicing: Vec<SlicingGroup> = Vec::new();
    let mut constraints: Vec<Constraint> = Vec::new();

    for element in elements {
        let element_id = element
            .id
            .clone()
            .unwrap_or_else(|| element.path.clone());

        if let Some(slicing_def) = &element.slicing {
            let discriminators = slicing_def
                .discriminator
                .iter()
                .flatten()
                .map(|d| Discriminator::new(&d.type_, d.path.clone()))
                .collect::<Result<Vec<_>>>()?;
            let rules = slicing_def
                .rules
                .as_deref()
                .and_then(SlicingRules::parse)
                .unwrap_or(SlicingRules::Open);
            slicing.push(SlicingGroup::new(
                element_id.clone(),
                element.path.clone(),
                discriminators,
                rules,
                slicing_def.ordered.unwrap_or(false),
                slicing_def.description.clone(),
            )?);
        }

        if let Some(slice_name) = &element.slice_name {
            let slice = Slice {
                id: element_id.clone(),
                name: slice_name.clone(),
                declared_type: element
                    .type_
                    .iter()
                    .flatten()
                    .next()
                    .map(|t| parse_type_name(&t.code)),
                constraints: Vec::new(),
                group_path: String::new(),
            };
            match slicing.iter_mut().find(|g| g.path == element.path) {
                Some(group) => group.add_slice(slice),
                None => debug!(
                    slice = %slice_name,
                    path = %element.path,
                    "slice declared without a slicing group"
                ),
            }
        }

        let mut constraint = Constraint {
            id: element_id,
            path: element.path.clone(),
            min: element.min,
            max: element.max.as_deref().and_then(CardinalityMax::parse),
            value_types: element
                .type_
                .iter()
                .flatten()
                .map(|t| parse_type_name(&t.code))
                .collect(),
            binding: element.binding.as_ref().and_then(|b| b.value_set.clone()),
            invariants: element
                .constraint
                .iter()
                .flatten()
                .map(|c| Invariant {
                    key: c.key.clone(),
                    severity: c.severity.clone(),
                    human: c.human.clone(),
                    expression: c.expression.clone(),
                })
                .collect(),
            ..Default::default()
        };

        // Extension elements constrained to a profile compile that
        // profile recursively, cached by canonical URL
        if let Some(first_type) = element.type_.iter().flatten().next() {
            if first_type.code == "Extension" {
                if let Some(profile_url) = first_type.profile.iter().flatten().next() {
                    constraint.profile = Some(resolver.resolve_profile(profile_url)?);
                }
            }
        }

        if let Some((suffix, value)) = element.pattern() {
            constraint.pattern_value = Some(parse_typed_value(&suffix, value));
        }
        if let Some((suffix, value)) = element.fixed() {
            constraint.fixed_value = Some(parse_typed_value(&suffix, value));
        }

        if constraint.is_slice_constraint() {
            if let Some(slice_name) = constraint.constrained_slice_name().map(str::to_string) {
                for group in slicing.iter_mut() {
                    if !constraint.path.starts_with(group.path.as_str()) {
                        continue;
                    }
                    if let Some(slice) = group.slice_by_name_mut(&slice_name) {
                        slice.add_constraint(constraint.clone());
                        break;
                    }
                }
            }
        } else if !slicing.iter().any(|g| constraint.path.starts_with(&g.path)) {
            constraints.push(constraint);
        }
    }

    Ok((slicing, constraints))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_type_name() {
        assert_eq!(parse_type_name("string"), "String");
        assert_eq!(parse_type_name("Quantity"), "Quantity");
        assert_eq!(
            parse_type_name("http://hl7.org/fhirpath/System.String"),
            "String"
        );
        assert_eq!(
            parse_type_name("http://hl7.org/fhir/StructureDefinition/CodeableConcept"),
            "CodeableConcept"
        );
    }

    #[test]
    fn test_parse_typed_value_coerces_primitives() {
        assert_eq!(parse_typed_value("Boolean", &json!("true")), json!(true));
        assert_eq!(parse_typed_value("Integer", &json!("42")), json!(42));
        let complex = json!({"coding": [{"code": "sys"}]});
        assert_eq!(parse_typed_value("CodeableConcept", &complex), complex);
    }

    #[test]
    fn test_invariant_binding_accumulates_fields() {
        let constraint = crate::structure::ElementConstraint {
            key: "ele-1".to_string(),
            severity: "error".to_string(),
            human: "All FHIR elements must have a @value or children".to_string(),
            expression: Some("hasValue() or (children().count() > id.count())".to_string()),
        };
        let mut bindings = Vec::new();
        bind_invariant(&mut bindings, &constraint, Some("status"), "_constraint_validator");
        bind_invariant(&mut bindings, &constraint, Some("code"), "_constraint_validator");
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].identifier, "FHIR_ele_1_constraint_validator");
        assert_eq!(bindings[0].fields, vec!["status", "code"]);
    }
}
