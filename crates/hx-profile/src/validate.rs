//! Profile validation.
//!
//! Validation collects every diagnostic for a resource and surfaces
//! them in a single aggregated [`ValidationResult`]; severity-`error`
//! issues make the resource invalid, warnings are reported alongside.

use crate::constraint::Constraint;
use crate::error::{ProfileError, Result};
use crate::model::{CompiledRecord, InvariantBinding, ProfileModel};
use hx_datatypes::{active_release, lookup, FhirRelease, TypeDescriptor};
use hx_fhirpath::{join_fhirpath, FhirPathEngine, FhirPathParser};
use hx_foundation::json::{coerce_list, is_empty_value, is_superset_of, remove_empty_values, values_equal_loose};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Severity level of a validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Information,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Information => write!(f, "information"),
        }
    }
}

/// FHIR IssueType code classification (subset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueCode {
    Structure,
    Required,
    Value,
    Invariant,
    Invalid,
    BusinessRule,
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueCode::Structure => write!(f, "structure"),
            IssueCode::Required => write!(f, "required"),
            IssueCode::Value => write!(f, "value"),
            IssueCode::Invariant => write!(f, "invariant"),
            IssueCode::Invalid => write!(f, "invalid"),
            IssueCode::BusinessRule => write!(f, "business-rule"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub code: IssueCode,
    pub message: String,
    pub path: Option<String>,
    /// Constraint key (`ele-1`, `ext-1`, ...) when the issue comes from
    /// an invariant.
    pub key: Option<String>,
}

impl ValidationIssue {
    pub fn new(severity: Severity, code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            path: None,
            key: None,
        }
    }

    pub fn error(code: IssueCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, code, message)
    }

    pub fn warning(code: IssueCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, code, message)
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            valid: true,
            issues: Vec::new(),
        }
    }

    pub fn push(&mut self, issue: ValidationIssue) {
        if issue.severity == Severity::Error {
            self.valid = false;
        }
        self.issues.push(issue);
    }

    pub fn merge(&mut self, other: ValidationResult) {
        if !other.valid {
            self.valid = false;
        }
        self.issues.extend(other.issues);
    }

    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count()
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::valid()
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} error(s), {} warning(s)",
            self.error_count(),
            self.warning_count()
        )?;
        for issue in &self.issues {
            write!(f, "; [{}] {}", issue.severity, issue.message)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationOutcome {
    pub resource_type: String,
    pub issue: Vec<OperationOutcomeIssue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationOutcomeIssue {
    pub severity: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<Vec<String>>,
}

impl ValidationResult {
    pub fn to_operation_outcome(&self) -> OperationOutcome {
        OperationOutcome {
            resource_type: "OperationOutcome".to_string(),
            issue: self
                .issues
                .iter()
                .map(|issue| OperationOutcomeIssue {
                    severity: issue.severity.to_string(),
                    code: issue.code.to_string(),
                    diagnostics: Some(issue.message.clone()),
                    expression: issue.path.as_ref().map(|p| vec![p.clone()]),
                })
                .collect(),
        }
    }
}

impl ProfileModel {
    /// Run every field and model validator, then check cardinality,
    /// fixed, pattern, value-type and invariant rules for the global
    /// and slice constraints. All diagnostics are collected into one
    /// aggregated result.
    pub fn validate(&self, resource: &Value) -> Result<ValidationResult> {
        let mut result = ValidationResult::valid();
        let release = active_release();
        let parser = FhirPathParser::new();
        let engine = FhirPathEngine::new();

        let obj = match resource.as_object() {
            Some(obj) => obj,
            None => {
                result.push(ValidationIssue::error(
                    IssueCode::Structure,
                    "Resource must be a JSON object",
                ));
                return Ok(result);
            }
        };

        if self.is_resource() {
            match obj.get("resourceType").and_then(|v| v.as_str()) {
                Some(actual) if actual == self.resource_type => {}
                Some(actual) => result.push(ValidationIssue::error(
                    IssueCode::Structure,
                    format!(
                        "Resource type '{actual}' does not match profiled type '{}'",
                        self.resource_type
                    ),
                )),
                None => result.push(ValidationIssue::error(
                    IssueCode::Required,
                    "Missing required field 'resourceType'",
                )),
            }
        }

        validate_record(
            &self.record,
            resource,
            &self.resource_type,
            release,
            &parser,
            &engine,
            &mut result,
        );

        for binding in &self.record.model_invariants {
            check_invariant(binding, resource, &self.resource_type, &parser, &engine, &mut result);
        }

        for constraint in &self.constraints {
            check_constraint(constraint, resource, release, &parser, &engine, &mut result);
        }

        for group in &self.slicing {
            for slice in &group.slices {
                let full_path = group.full_fhir_path(slice);
                let entries = match parser.parse(&full_path) {
                    Ok(expr) => engine
                        .find(&expr, resource)?
                        .into_iter()
                        .map(|i| i.value)
                        .filter(|v| !is_empty_value(v))
                        .collect::<Vec<_>>(),
                    Err(_) => Vec::new(),
                };

                let count = entries.len();
                let min = slice.min_cardinality();
                let max = slice.max_cardinality();
                if count < min as usize {
                    result.push(
                        ValidationIssue::error(
                            IssueCode::Required,
                            format!(
                                "Slice '{}' requires at least {min} occurrence(s), found {count}",
                                slice.name
                            ),
                        )
                        .with_path(full_path.clone()),
                    );
                }
                if !max.allows(count) {
                    result.push(
                        ValidationIssue::error(
                            IssueCode::Invalid,
                            format!(
                                "Slice '{}' allows at most {max} occurrence(s), found {count}",
                                slice.name
                            ),
                        )
                        .with_path(full_path.clone()),
                    );
                }

                for constraint in &slice.constraints {
                    if constraint.path == group.path {
                        continue;
                    }
                    let relative = constraint
                        .path
                        .strip_prefix(group.path.as_str())
                        .map(|p| p.trim_start_matches('.'))
                        .unwrap_or(constraint.path.as_str());
                    if relative.is_empty() || relative.contains("[x]") {
                        continue;
                    }
                    for entry in &entries {
                        check_relative_constraint(
                            constraint, relative, entry, release, &parser, &engine, &mut result,
                        );
                    }
                }
            }
        }

        Ok(result)
    }

    /// Parse-and-validate: returns the accepted instance or the
    /// aggregated validation failure.
    pub fn model_validate(&self, document: &Value) -> Result<Value> {
        let result = self.validate(document)?;
        if result.valid {
            Ok(document.clone())
        } else {
            Err(ProfileError::Validation(result))
        }
    }

    /// Serialise an instance; with `exclude_unset` the unmodified
    /// placeholders (nulls, empty objects and arrays) are pruned.
    pub fn model_dump(&self, instance: &Value, exclude_unset: bool) -> Value {
        if exclude_unset {
            remove_empty_values(instance)
        } else {
            instance.clone()
        }
    }
}

fn validate_record(
    record: &CompiledRecord,
    instance: &Value,
    path: &str,
    release: FhirRelease,
    parser: &FhirPathParser,
    engine: &FhirPathEngine,
    result: &mut ValidationResult,
) {
    let obj = match instance.as_object() {
        Some(obj) => obj,
        None => return,
    };

    for (name, spec) in &record.fields {
        let field_path = join_fhirpath([path, name.as_str()]);
        let value = obj.get(name);

        if spec.is_required() && value.map(is_empty_value).unwrap_or(true) {
            result.push(
                ValidationIssue::error(
                    IssueCode::Required,
                    format!("Missing required element '{field_path}'"),
                )
                .with_path(field_path.clone()),
            );
            continue;
        }

        let value = match value {
            Some(v) if !v.is_null() => v,
            _ => continue,
        };

        if spec.is_list() {
            match value.as_array() {
                Some(items) => {
                    if items.len() < spec.min as usize {
                        result.push(
                            ValidationIssue::error(
                                IssueCode::Invalid,
                                format!(
                                    "Element '{field_path}' requires at least {} item(s), found {}",
                                    spec.min,
                                    items.len()
                                ),
                            )
                            .with_path(field_path.clone()),
                        );
                    }
                    if let Some(max) = spec.max {
                        if items.len() > max as usize {
                            result.push(
                                ValidationIssue::error(
                                    IssueCode::Invalid,
                                    format!(
                                        "Element '{field_path}' allows at most {max} item(s), found {}",
                                        items.len()
                                    ),
                                )
                                .with_path(field_path.clone()),
                            );
                        }
                    }
                }
                None => {
                    result.push(
                        ValidationIssue::error(
                            IssueCode::Structure,
                            format!("Element '{field_path}' must be a list"),
                        )
                        .with_path(field_path.clone()),
                    );
                    continue;
                }
            }
        } else if value.is_array() {
            result.push(
                ValidationIssue::error(
                    IssueCode::Structure,
                    format!("Element '{field_path}' does not allow arrays"),
                )
                .with_path(field_path.clone()),
            );
            continue;
        }

        for item in coerce_list(value) {
            if is_empty_value(&item) {
                continue;
            }
            if !value_matches_any_type(&item, &spec.types, release) {
                result.push(
                    ValidationIssue::error(
                        IssueCode::Value,
                        format!(
                            "Element '{field_path}' is not a valid {}",
                            spec.types.join(" | ")
                        ),
                    )
                    .with_path(field_path.clone()),
                );
                continue;
            }
            if let Some(nested) = &spec.nested {
                validate_record(nested, &item, &field_path, release, parser, engine, result);
            }
        }

        let logical = spec.choice_of.as_deref().unwrap_or(name.as_str());
        for binding in &record.field_invariants {
            if !binding.fields.iter().any(|f| f == logical || f == name) {
                continue;
            }
            for item in coerce_list(value) {
                if is_empty_value(&item) {
                    continue;
                }
                check_invariant(binding, &item, &field_path, parser, engine, result);
            }
        }
    }

    // At most one variant of each type-choice element may be set
    for (base, variants) in &record.choice_groups {
        let set: Vec<&String> = variants
            .iter()
            .filter(|v| obj.get(*v).map(|x| !is_empty_value(x)).unwrap_or(false))
            .collect();
        if set.len() > 1 {
            result.push(
                ValidationIssue::error(
                    IssueCode::Structure,
                    format!(
                        "Multiple variants of type-choice element '{base}' are set: {set:?}"
                    ),
                )
                .with_path(join_fhirpath([path, base.as_str()])),
            );
        }
    }
}

fn value_matches_any_type(value: &Value, types: &[String], release: FhirRelease) -> bool {
    if types.is_empty() {
        return true;
    }
    types.iter().any(|t| match lookup(release, t) {
        Some(TypeDescriptor::Primitive(p)) => p.validate_value(value),
        Some(TypeDescriptor::Complex(_)) => value.is_object(),
        // Unknown types (Reference targets, logical models) pass
        None => true,
    })
}

/// Evaluate a stored invariant expression against a candidate value.
/// Severity `error` failures invalidate the resource; anything else is
/// reported as a warning.
fn check_invariant(
    binding: &InvariantBinding,
    candidate: &Value,
    path: &str,
    parser: &FhirPathParser,
    engine: &FhirPathEngine,
    result: &mut ValidationResult,
) {
    let expression = match &binding.expression {
        Some(expression) => expression,
        None => return,
    };
    let expr = match parser.parse(expression) {
        Ok(expr) => expr,
        Err(_) => {
            result.push(
                ValidationIssue::warning(
                    IssueCode::Invariant,
                    format!(
                        "Invariant {} could not be evaluated: {expression}",
                        binding.key
                    ),
                )
                .with_path(path.to_string())
                .with_key(binding.key.clone()),
            );
            return;
        }
    };
    let holds = match engine.get_value(&expr, candidate) {
        Ok(Some(Value::Bool(flag))) => flag,
        Ok(Some(_)) => true,
        Ok(None) => false,
        Err(_) => false,
    };
    if holds {
        return;
    }
    let issue = ValidationIssue::new(
        if binding.severity == "error" {
            Severity::Error
        } else {
            Severity::Warning
        },
        IssueCode::Invariant,
        format!("{} (invariant {})", binding.human, binding.key),
    )
    .with_path(path.to_string())
    .with_key(binding.key.clone());
    result.push(issue);
}

/// Check a global constraint against the resource.
fn check_constraint(
    constraint: &Constraint,
    resource: &Value,
    release: FhirRelease,
    parser: &FhirPathParser,
    engine: &FhirPathEngine,
    result: &mut ValidationResult,
) {
    let expr = match parser.parse(&constraint.path) {
        Ok(expr) => expr,
        Err(_) => return,
    };
    let values: Vec<Value> = match engine.find(&expr, resource) {
        Ok(items) => items
            .into_iter()
            .map(|i| i.value)
            .filter(|v| !is_empty_value(v))
            .collect(),
        Err(_) => return,
    };

    let count = values.len();
    if let Some(min) = constraint.min {
        if count < min as usize {
            result.push(
                ValidationIssue::error(
                    IssueCode::Required,
                    format!(
                        "Element '{}' requires at least {min} occurrence(s), found {count}",
                        constraint.path
                    ),
                )
                .with_path(constraint.path.clone())
                .with_key(constraint.id.clone()),
            );
        }
    }
    if let Some(max) = constraint.max {
        if count > 0 && !max.allows(count) {
            result.push(
                ValidationIssue::error(
                    IssueCode::Invalid,
                    format!(
                        "Element '{}' allows at most {max} occurrence(s), found {count}",
                        constraint.path
                    ),
                )
                .with_path(constraint.path.clone())
                .with_key(constraint.id.clone()),
            );
        }
    }

    for value in &values {
        check_value_rules(constraint, &constraint.path, value, release, result);
        for invariant in &constraint.invariants {
            let binding = InvariantBinding {
                identifier: String::new(),
                key: invariant.key.clone(),
                severity: invariant.severity.clone(),
                human: invariant.human.clone(),
                expression: invariant.expression.clone(),
                fields: Vec::new(),
            };
            check_invariant(&binding, value, &constraint.path, parser, engine, result);
        }
    }
}

/// Check a slice child constraint relative to one slice instance.
fn check_relative_constraint(
    constraint: &Constraint,
    relative_path: &str,
    entry: &Value,
    release: FhirRelease,
    parser: &FhirPathParser,
    engine: &FhirPathEngine,
    result: &mut ValidationResult,
) {
    let expr = match parser.parse(relative_path) {
        Ok(expr) => expr,
        Err(_) => return,
    };
    let values: Vec<Value> = match engine.find(&expr, entry) {
        Ok(items) => items
            .into_iter()
            .map(|i| i.value)
            .filter(|v| !is_empty_value(v))
            .collect(),
        Err(_) => return,
    };
    let count = values.len();
    if let Some(min) = constraint.min {
        if count < min as usize {
            result.push(
                ValidationIssue::error(
                    IssueCode::Required,
                    format!(
                        "Sliced element '{}' requires at least {min} occurrence(s), found {count}",
                        constraint.path
                    ),
                )
                .with_path(constraint.path.clone())
                .with_key(constraint.id.clone()),
            );
        }
    }
    for value in &values {
        check_value_rules(constraint, &constraint.path, value, release, result);
    }
}

/// Fixed, pattern and value-type rules for one candidate value.
fn check_value_rules(
    constraint: &Constraint,
    path: &str,
    value: &Value,
    release: FhirRelease,
    result: &mut ValidationResult,
) {
    if let Some(fixed) = &constraint.fixed_value {
        if !values_equal_loose(value, fixed) {
            result.push(
                ValidationIssue::error(
                    IssueCode::Value,
                    format!("Element '{path}' does not match its fixed value"),
                )
                .with_path(path.to_string())
                .with_key(constraint.id.clone()),
            );
        }
    }
    if let Some(pattern) = &constraint.pattern_value {
        if !is_superset_of(value, pattern) {
            result.push(
                ValidationIssue::error(
                    IssueCode::Value,
                    format!("Element '{path}' does not match its pattern"),
                )
                .with_path(path.to_string())
                .with_key(constraint.id.clone()),
            );
        }
    }
    if !constraint.value_types.is_empty()
        && !value_matches_any_type(value, &constraint.value_types, release)
    {
        result.push(
            ValidationIssue::error(
                IssueCode::Value,
                format!(
                    "Element '{path}' is not a valid {}",
                    constraint.value_types.join(" | ")
                ),
            )
            .with_path(path.to_string())
            .with_key(constraint.id.clone()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_severity_drives_validity() {
        let mut result = ValidationResult::valid();
        result.push(ValidationIssue::warning(IssueCode::Invariant, "soft"));
        assert!(result.valid);
        result.push(ValidationIssue::error(IssueCode::Required, "hard"));
        assert!(!result.valid);
        assert_eq!(result.error_count(), 1);
        assert_eq!(result.warning_count(), 1);
    }

    #[test]
    fn test_operation_outcome_conversion() {
        let mut result = ValidationResult::valid();
        result.push(
            ValidationIssue::error(IssueCode::Required, "Missing required element 'status'")
                .with_path("Observation.status"),
        );
        let outcome = result.to_operation_outcome();
        assert_eq!(outcome.resource_type, "OperationOutcome");
        assert_eq!(outcome.issue.len(), 1);
        assert_eq!(outcome.issue[0].severity, "error");
        assert_eq!(
            outcome.issue[0].expression,
            Some(vec!["Observation.status".to_string()])
        );
    }
}
