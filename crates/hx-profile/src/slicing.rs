//! Slicing groups, discriminators and slices.
//!
//! Slicing partitions a repeated element into distinguishable
//! sub-groups. Each slice derives a *discriminating expression*: a
//! FHIRPath that, evaluated on the containing resource, selects exactly
//! the instances belonging to that slice.

use crate::constraint::{CardinalityMax, Constraint};
use crate::error::{ProfileError, Result};
use crate::model::ProfileModel;
use hx_fhirpath::{join_fhirpath, FhirPathParser};
use hx_foundation::json::leaf_paths;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// The processing types a discriminator can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiscriminatorKind {
    Value,
    Pattern,
    Exists,
    Type,
    Profile,
    Position,
}

impl DiscriminatorKind {
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "value" => Some(Self::Value),
            "pattern" => Some(Self::Pattern),
            "exists" => Some(Self::Exists),
            "type" => Some(Self::Type),
            "profile" => Some(Self::Profile),
            "position" => Some(Self::Position),
            _ => None,
        }
    }
}

/// A pair of processing type and the path of the discriminating element.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discriminator {
    pub kind: DiscriminatorKind,
    pub path: String,
}

const RESTRICTED_FHIRPATH_FUNCTIONS: [&str; 3] = ["extension", "resolve", "ofType"];

impl Discriminator {
    pub fn new(kind: &str, path: impl Into<String>) -> Result<Self> {
        let parsed_kind = DiscriminatorKind::parse(kind)
            .ok_or_else(|| ProfileError::compile(format!("Invalid discriminator type: '{kind}'")))?;
        let discriminator = Self {
            kind: parsed_kind,
            path: path.into(),
        };
        discriminator.validate_path()?;
        Ok(discriminator)
    }

    /// Discriminator paths must be valid FHIRPath restricted to the
    /// `extension` / `resolve` / `ofType` function subset.
    fn validate_path(&self) -> Result<()> {
        if self.path != "$this" && !FhirPathParser::new().is_valid(&self.path) {
            return Err(ProfileError::compile(format!(
                "Slice discriminator FHIRPath is not valid: {}",
                self.path
            )));
        }
        static FUNCTION_CALL: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"\.?([a-zA-Z]+)\(").expect("pattern compiles"));
        for capture in FUNCTION_CALL.captures_iter(&self.path) {
            let function = capture.get(1).map(|m| m.as_str()).unwrap_or_default();
            if !RESTRICTED_FHIRPATH_FUNCTIONS.contains(&function) {
                return Err(ProfileError::compile(format!(
                    "Slice discriminator FHIRPath is not valid: \
                     Invalid function \"{function}\" used in restricted discriminator FHIRPath"
                )));
            }
        }
        Ok(())
    }
}

/// How a slicing group treats content that matches no slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlicingRules {
    Open,
    Closed,
    OpenAtEnd,
}

impl SlicingRules {
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "open" => Some(Self::Open),
            "closed" => Some(Self::Closed),
            "openAtEnd" => Some(Self::OpenAtEnd),
            _ => None,
        }
    }
}

/// A sub-partition of a slicing group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slice {
    pub id: String,
    pub name: String,
    pub declared_type: Option<String>,
    pub constraints: Vec<Constraint>,
    /// Path of the owning group; the back-reference is a lookup key,
    /// not ownership.
    pub group_path: String,
}

impl Slice {
    /// The constraints that apply to the slice as an element (path
    /// equal to the group path).
    pub fn constraints_on_slice(&self) -> Vec<&Constraint> {
        self.constraints
            .iter()
            .filter(|c| c.path == self.group_path)
            .collect()
    }

    /// Minimum occurrences of this slice in the group.
    pub fn min_cardinality(&self) -> u32 {
        self.constraints_on_slice()
            .iter()
            .filter_map(|c| c.min)
            .min()
            .unwrap_or(0)
    }

    /// Maximum occurrences of this slice in the group.
    pub fn max_cardinality(&self) -> CardinalityMax {
        self.constraints_on_slice()
            .iter()
            .filter_map(|c| c.max)
            .max()
            .unwrap_or(CardinalityMax::Bounded(1))
    }

    /// The nested profile constraining this slice, when one is set.
    pub fn profile_constraint(&self) -> Option<Arc<ProfileModel>> {
        self.constraints
            .iter()
            .filter(|c| c.path == self.group_path)
            .find_map(|c| c.profile.clone())
    }

    pub fn add_constraint(&mut self, constraint: Constraint) {
        self.constraints.push(constraint);
    }
}

/// A repeated element partitioned into slices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlicingGroup {
    pub id: String,
    pub path: String,
    pub discriminators: Vec<Discriminator>,
    pub rules: SlicingRules,
    pub ordered: bool,
    pub description: Option<String>,
    pub slices: Vec<Slice>,
}

impl SlicingGroup {
    pub fn new(
        id: impl Into<String>,
        path: impl Into<String>,
        discriminators: Vec<Discriminator>,
        rules: SlicingRules,
        ordered: bool,
        description: Option<String>,
    ) -> Result<Self> {
        let path = path.into();
        if !FhirPathParser::new().is_valid(&path) {
            return Err(ProfileError::compile(format!(
                "Slicing FHIRPath is not valid: {path}"
            )));
        }
        Ok(Self {
            id: id.into(),
            path,
            discriminators,
            rules,
            ordered,
            description,
            slices: Vec::new(),
        })
    }

    pub fn slice_by_name(&self, name: &str) -> Option<&Slice> {
        self.slices.iter().find(|s| s.name == name)
    }

    pub fn slice_by_name_mut(&mut self, name: &str) -> Option<&mut Slice> {
        self.slices.iter_mut().find(|s| s.name == name)
    }

    pub fn add_slice(&mut self, mut slice: Slice) {
        slice.group_path = self.path.clone();
        self.slices.push(slice);
    }

    /// The FHIRPath fragment that selects the instances belonging to
    /// `slice`, synthesised from the discriminator list.
    pub fn discriminating_expression(&self, slice: &Slice) -> String {
        let mut expression = String::new();
        for discriminator in &self.discriminators {
            let discriminator_path = join_fhirpath([self.path.as_str(), discriminator.path.as_str()]);
            let discriminator_constraints: Vec<&Constraint> = slice
                .constraints
                .iter()
                .filter(|c| c.path == discriminator_path)
                .collect();

            match discriminator.kind {
                DiscriminatorKind::Value | DiscriminatorKind::Pattern => {
                    // Extension slices constrained to a profile are
                    // selected by the profile's canonical URL
                    if slice.declared_type.as_deref() == Some("Extension") {
                        if let Some(profile) = slice.profile_constraint() {
                            if let Some(url) = &profile.canonical_url {
                                expression = join_fhirpath([
                                    expression.as_str(),
                                    format!("extension('{url}')").as_str(),
                                ]);
                                continue;
                            }
                        }
                    }

                    let mut discriminating_values: Vec<(String, Value)> = Vec::new();
                    if let Some(pattern) = discriminator_constraints
                        .iter()
                        .find_map(|c| c.pattern_value.as_ref())
                    {
                        discriminating_values
                            .extend(leaf_paths(pattern, &discriminator.path));
                    }
                    for constraint in &discriminator_constraints {
                        if let Some(fixed) = &constraint.fixed_value {
                            match fixed {
                                Value::Object(_) | Value::Array(_) => discriminating_values
                                    .extend(leaf_paths(fixed, &discriminator.path)),
                                scalar => discriminating_values
                                    .push((discriminator.path.clone(), scalar.clone())),
                            }
                        }
                    }
                    for (path, value) in discriminating_values {
                        let literal = render_literal(&value);
                        expression = join_fhirpath([
                            expression.as_str(),
                            format!("where({path} = {literal})").as_str(),
                        ]);
                    }
                }
                DiscriminatorKind::Exists => {
                    expression = join_fhirpath([
                        expression.as_str(),
                        format!("where({}.exists())", discriminator.path).as_str(),
                    ]);
                }
                DiscriminatorKind::Type => {
                    if let Some(declared) = &slice.declared_type {
                        expression = join_fhirpath([
                            expression.as_str(),
                            format!("where({} is {declared})", discriminator.path).as_str(),
                        ]);
                    }
                }
                DiscriminatorKind::Profile => {
                    // Recognised but intentionally left as an open
                    // extension point
                    debug!(slice = %slice.name, "profile discriminator contributes no fragment");
                }
                DiscriminatorKind::Position => {
                    if let Some(index) = self.slices.iter().position(|s| s.name == slice.name) {
                        expression = join_fhirpath([
                            expression.as_str(),
                            format!("index({index})").as_str(),
                        ]);
                    }
                }
            }
        }
        expression
    }

    /// The full FHIRPath selecting this slice's instances on the
    /// containing resource.
    pub fn full_fhir_path(&self, slice: &Slice) -> String {
        let expression = self.discriminating_expression(slice);
        if self.path.ends_with("extension") && expression.starts_with("extension") {
            let trimmed = self.path.trim_end_matches("extension");
            join_fhirpath([trimmed, expression.as_str()])
        } else {
            join_fhirpath([self.path.as_str(), expression.as_str()])
        }
    }
}

/// Render a JSON scalar as a FHIRPath literal.
fn render_literal(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{s}'"),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn group_with_slice(
        kind: &str,
        discriminator_path: &str,
        slice_constraints: Vec<Constraint>,
    ) -> (SlicingGroup, Slice) {
        let mut group = SlicingGroup::new(
            "Observation.component",
            "Observation.component",
            vec![Discriminator::new(kind, discriminator_path).unwrap()],
            SlicingRules::Open,
            false,
            None,
        )
        .unwrap();
        let slice = Slice {
            id: "Observation.component:sysBP".to_string(),
            name: "sysBP".to_string(),
            declared_type: Some("BackboneElement".to_string()),
            constraints: slice_constraints,
            group_path: String::new(),
        };
        group.add_slice(slice);
        let slice = group.slices[0].clone();
        (group, slice)
    }

    #[test]
    fn test_invalid_discriminator_kind() {
        assert!(Discriminator::new("bogus", "code").is_err());
    }

    #[test]
    fn test_discriminator_restricted_functions() {
        assert!(Discriminator::new("value", "code.where(x = 1)").is_err());
        assert!(Discriminator::new("value", "extension('http://x').value").is_ok());
    }

    #[test]
    fn test_pattern_discriminating_expression() {
        let constraint = Constraint {
            id: "Observation.component:sysBP.code".to_string(),
            path: "Observation.component.code".to_string(),
            pattern_value: Some(json!({"coding": [{"code": "sys"}]})),
            ..Default::default()
        };
        let (group, slice) = group_with_slice("pattern", "code", vec![constraint]);
        assert_eq!(
            group.discriminating_expression(&slice),
            "where(code.coding.code = 'sys')"
        );
        assert_eq!(
            group.full_fhir_path(&slice),
            "Observation.component.where(code.coding.code = 'sys')"
        );
    }

    #[test]
    fn test_fixed_value_discriminating_expression() {
        let constraint = Constraint {
            id: "Observation.component:sysBP.code.coding.code".to_string(),
            path: "Observation.component.code.coding.code".to_string(),
            fixed_value: Some(json!("sys")),
            ..Default::default()
        };
        let (group, slice) = group_with_slice("value", "code.coding.code", vec![constraint]);
        assert_eq!(
            group.discriminating_expression(&slice),
            "where(code.coding.code = 'sys')"
        );
    }

    #[test]
    fn test_exists_discriminating_expression() {
        let (group, slice) = group_with_slice("exists", "valueQuantity", vec![]);
        assert_eq!(
            group.discriminating_expression(&slice),
            "where(valueQuantity.exists())"
        );
    }

    #[test]
    fn test_type_discriminating_expression() {
        let (group, slice) = group_with_slice("type", "value", vec![]);
        assert_eq!(
            group.discriminating_expression(&slice),
            "where(value is BackboneElement)"
        );
    }

    #[test]
    fn test_position_discriminating_expression() {
        let (group, slice) = group_with_slice("position", "$this", vec![]);
        assert_eq!(group.discriminating_expression(&slice), "index(0)");
    }

    #[test]
    fn test_slice_cardinalities() {
        let constraint = Constraint {
            id: "Observation.component:sysBP".to_string(),
            path: "Observation.component".to_string(),
            min: Some(1),
            max: Some(CardinalityMax::Bounded(2)),
            ..Default::default()
        };
        let (_, slice) = group_with_slice("pattern", "code", vec![constraint]);
        assert_eq!(slice.min_cardinality(), 1);
        assert_eq!(slice.max_cardinality(), CardinalityMax::Bounded(2));
    }

    #[test]
    fn test_default_cardinalities() {
        let (_, slice) = group_with_slice("pattern", "code", vec![]);
        assert_eq!(slice.min_cardinality(), 0);
        assert_eq!(slice.max_cardinality(), CardinalityMax::Bounded(1));
    }
}
