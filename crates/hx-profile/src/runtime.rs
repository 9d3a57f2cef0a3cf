//! The profile runtime: skeleton construction, mutation tracking and
//! slice cleanup.
//!
//! Three operations compose the write-then-clean cycle used when
//! ingesting outside data into a profiled resource:
//!
//! 1. [`ProfileRuntime::construct_with_profiled_elements`] builds a
//!    skeleton instance with preset values and slice placeholders.
//! 2. [`ProfileRuntime::track_slice_changes`] records a baseline
//!    journal of every slice instance.
//! 3. [`ProfileRuntime::clean_elements_and_slices`] prunes the
//!    placeholders that were neither completed nor modified.

use crate::error::Result;
use crate::model::ProfileModel;
use crate::slicing::{Slice, SlicingGroup};
use hx_datatypes::{active_release, field_of, lookup, TypeDescriptor};
use hx_fhirpath::{FhirPath, FhirPathEngine, FhirPathParser};
use hx_foundation::json::{coerce_list, is_empty_value, remove_empty_values};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Default number of placeholder copies created for a repeatable,
/// incomplete slice. Unused copies are removed by the cleanup pass.
pub const DEFAULT_SLICE_COPIES: u32 = 9;

/// Baseline snapshots of slice instances, recorded when mutation
/// tracking is switched on. An instance counts as modified when its
/// current serialised form differs from every recorded baseline.
#[derive(Debug, Clone, Default)]
pub struct ChangeJournal {
    baselines: HashMap<String, Vec<Value>>,
}

impl ChangeJournal {
    fn record(&mut self, key: String, instances: Vec<Value>) {
        self.baselines.entry(key).or_default().extend(instances);
    }

    /// True when `instance` differs from every baseline recorded under
    /// `key`. Instances never tracked count as unmodified.
    pub fn is_modified(&self, key: &str, instance: &Value) -> bool {
        match self.baselines.get(key) {
            Some(baselines) => !baselines.iter().any(|b| b == instance),
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.baselines.clear();
    }
}

/// The shape a slice instance is measured against when deciding
/// FHIR-completeness: its logical field names, with type-choice
/// variants collapsed into their base.
#[derive(Debug, Clone, Default)]
struct SliceShape {
    fields: Vec<String>,
    choice_bases: Vec<String>,
}

pub struct ProfileRuntime {
    parser: FhirPathParser,
    engine: FhirPathEngine,
    slice_copies: u32,
}

impl ProfileRuntime {
    pub fn new() -> Self {
        Self {
            parser: FhirPathParser::new(),
            engine: FhirPathEngine::new(),
            slice_copies: DEFAULT_SLICE_COPIES,
        }
    }

    /// Override the placeholder copy cap.
    pub fn with_slice_copies(mut self, slice_copies: u32) -> Self {
        self.slice_copies = slice_copies;
        self
    }

    /// Construct a minimally valid skeleton instance of a profile:
    /// required complex children instantiated empty, fixed and pattern
    /// presets applied, and every slice placed in its container with
    /// placeholder copies where the slice repeats.
    pub fn construct_with_profiled_elements(&self, model: &ProfileModel) -> Result<Value> {
        let mut resource = Value::Object(Map::new());
        if model.is_resource() {
            resource["resourceType"] = json!(model.resource_type);
            if let Some(meta) = model.meta_preset() {
                resource["meta"] = meta;
            }
        }

        self.instantiate_required_children(&mut resource, model);
        self.set_constraints(&mut resource, model)?;
        self.initialize_slices(&mut resource, model)?;
        Ok(resource)
    }

    /// Record the baseline journal for every slice instance in the
    /// resource, recursing into nested profiled slices.
    pub fn track_slice_changes(
        &self,
        resource: &Value,
        model: &ProfileModel,
    ) -> Result<ChangeJournal> {
        let mut journal = ChangeJournal::default();
        self.record_baselines(resource, model, &mut journal)?;
        Ok(journal)
    }

    /// Walk each slicing group and retain a slice instance iff it is
    /// FHIR-complete or was modified since the journal was recorded.
    /// Empty substructures are stripped afterwards so the result is
    /// minimally serialisable.
    pub fn clean_elements_and_slices(
        &self,
        resource: &mut Value,
        model: &ProfileModel,
        journal: &ChangeJournal,
    ) -> Result<()> {
        for group in &model.slicing {
            if group.path.contains("[x]") {
                continue;
            }
            let group_expr = self.parser.parse(&group.path)?;
            let mut valid: Vec<Value> = self
                .list_at(resource, &group_expr)?
                .into_iter()
                .filter(|v| !is_empty_value(v))
                .collect();
            if valid.is_empty() {
                continue;
            }
            debug!(path = %group.path, elements = valid.len(), "cleaning slicing group");

            for slice in &group.slices {
                let shape = self.slice_shape(model, group, slice);
                let key = journal_key(model, group, slice);
                let entries = self.slice_entries(resource, group, slice)?;
                trace!(slice = %slice.name, entries = entries.len(), "inspecting slice candidates");

                for entry in entries {
                    let complete = is_fhir_complete(&entry, &shape);
                    let modified = journal.is_modified(&key, &entry);
                    if !complete && !modified {
                        if let Some(position) = valid.iter().position(|v| v == &entry) {
                            trace!(slice = %slice.name, "removing unused slice placeholder");
                            valid.remove(position);
                        }
                    } else if let Some(profile) = slice.profile_constraint() {
                        if let Some(position) = valid.iter().position(|v| v == &entry) {
                            let mut nested = entry.clone();
                            self.clean_elements_and_slices(&mut nested, &profile, journal)?;
                            valid[position] = nested;
                        }
                    }
                }
            }

            self.engine
                .update_or_create(&group_expr, resource, Value::Array(valid))?;
        }

        *resource = remove_empty_values(resource);
        Ok(())
    }

    // ---- skeleton construction ------------------------------------------

    /// Instantiate required complex children empty, without validation.
    fn instantiate_required_children(&self, resource: &mut Value, model: &ProfileModel) {
        let release = active_release();
        for (name, spec) in &model.record.fields {
            if !spec.is_required() || spec.is_ext_carrier {
                continue;
            }
            let complex = spec
                .types
                .first()
                .map(|t| matches!(lookup(release, t), Some(TypeDescriptor::Complex(_))))
                .unwrap_or(false);
            if !complex {
                continue;
            }
            let default = if spec.is_list() {
                json!([{}])
            } else {
                json!({})
            };
            resource[name] = default;
        }
    }

    /// Apply every global fixed/pattern preset by locating-or-creating
    /// its path and writing the value.
    fn set_constraints(&self, resource: &mut Value, model: &ProfileModel) -> Result<()> {
        for constraint in &model.constraints {
            if constraint.pattern_value.is_none() && constraint.fixed_value.is_none() {
                continue;
            }
            let expr = match self.parser.parse(&constraint.path) {
                Ok(expr) => expr,
                Err(_) => continue,
            };
            if let Some(pattern) = &constraint.pattern_value {
                self.engine
                    .update_or_create(&expr, resource, pattern.clone())?;
            }
            if let Some(fixed) = &constraint.fixed_value {
                self.engine.update_or_create(&expr, resource, fixed.clone())?;
            }
        }
        Ok(())
    }

    fn initialize_slices(&self, resource: &mut Value, model: &ProfileModel) -> Result<()> {
        for group in &model.slicing {
            if group.path.contains("[x]") {
                continue;
            }
            let element_type = self.element_type_at(model, &group.path);
            let mut instances: Vec<Value> = Vec::new();

            for slice in &group.slices {
                let mut instance = Value::Object(Map::new());
                self.process_slice_constraints(&mut instance, group, slice, element_type.as_deref())?;

                let shape = self.slice_shape(model, group, slice);
                let complete = is_fhir_complete(&instance, &shape);
                let max = slice.max_cardinality().limit();
                if !complete && max > 1 {
                    // Repeatable incomplete slices get placeholder
                    // copies; the unused ones are pruned by cleanup
                    let copies = max.min(self.slice_copies) as usize;
                    debug!(slice = %slice.name, copies, "placing slice placeholder copies");
                    instances.extend(std::iter::repeat(instance).take(copies));
                } else {
                    instances.push(instance);
                }
            }

            let expr = self.parser.parse(&group.path)?;
            self.engine
                .update_or_create(&expr, resource, Value::Array(instances))?;
        }
        Ok(())
    }

    /// Apply the per-slice constraints (fixed/pattern presets and
    /// profile sub-expansion) to an empty slice instance.
    fn process_slice_constraints(
        &self,
        instance: &mut Value,
        group: &SlicingGroup,
        slice: &Slice,
        element_type: Option<&str>,
    ) -> Result<()> {
        for constraint in &slice.constraints {
            let slice_element = constraint
                .path
                .strip_prefix(group.path.as_str())
                .map(|p| p.trim_start_matches('.'))
                .unwrap_or("");
            if slice_element.contains("[x]") {
                continue;
            }

            if let Some(profile) = &constraint.profile {
                let expanded = self.construct_with_profiled_elements(profile)?;
                if let (Some(target), Some(source)) =
                    (instance.as_object_mut(), expanded.as_object())
                {
                    for (field, value) in source {
                        if field == "resourceType" || is_empty_value(value) {
                            continue;
                        }
                        target.insert(field.clone(), value.clone());
                    }
                }
                return Ok(());
            }

            if let Some(fixed) = &constraint.fixed_value {
                self.apply_slice_preset(instance, slice_element, fixed, element_type)?;
            }
            if let Some(pattern) = &constraint.pattern_value {
                self.apply_slice_preset(instance, slice_element, pattern, element_type)?;
            }
        }
        Ok(())
    }

    fn apply_slice_preset(
        &self,
        instance: &mut Value,
        slice_element: &str,
        preset: &Value,
        element_type: Option<&str>,
    ) -> Result<()> {
        if slice_element.is_empty() {
            // A preset on the slice element itself merges its members
            if let (Some(target), Some(source)) = (instance.as_object_mut(), preset.as_object()) {
                for (field, value) in source {
                    target.insert(field.clone(), value.clone());
                }
            }
            return Ok(());
        }
        let expr = match self.parser.parse(slice_element) {
            Ok(expr) => expr,
            Err(_) => return Ok(()),
        };
        self.engine
            .update_or_create_as(&expr, instance, preset.clone(), element_type)?;
        Ok(())
    }

    // ---- journal ---------------------------------------------------------

    fn record_baselines(
        &self,
        resource: &Value,
        model: &ProfileModel,
        journal: &mut ChangeJournal,
    ) -> Result<()> {
        for group in &model.slicing {
            if group.path.contains("[x]") {
                continue;
            }
            for slice in &group.slices {
                let entries = self.slice_entries(resource, group, slice)?;
                if let Some(profile) = slice.profile_constraint() {
                    for entry in &entries {
                        self.record_baselines(entry, &profile, journal)?;
                    }
                }
                journal.record(journal_key(model, group, slice), entries);
            }
        }
        Ok(())
    }

    // ---- helpers ---------------------------------------------------------

    /// The instances currently matched by a slice's discriminating
    /// expression.
    fn slice_entries(
        &self,
        resource: &Value,
        group: &SlicingGroup,
        slice: &Slice,
    ) -> Result<Vec<Value>> {
        let full_path = group.full_fhir_path(slice);
        let expr = match self.parser.parse(&full_path) {
            Ok(expr) => expr,
            Err(_) => return Ok(Vec::new()),
        };
        Ok(self
            .engine
            .find(&expr, resource)?
            .into_iter()
            .map(|item| item.value)
            .filter(|v| !is_empty_value(v))
            .collect())
    }

    /// The values of the list element at `expr` (empty when absent).
    fn list_at(&self, resource: &Value, expr: &FhirPath) -> Result<Vec<Value>> {
        let items = self.engine.find(expr, resource)?;
        Ok(items
            .first()
            .map(|item| coerce_list(&item.value))
            .unwrap_or_default())
    }

    /// Resolve the FHIR type of the element a dotted path addresses,
    /// walking the datatype registry from the profiled resource type.
    fn element_type_at(&self, model: &ProfileModel, path: &str) -> Option<String> {
        let release = active_release();
        let mut segments = path.split('.');
        let head = segments.next()?;
        let mut current = if head == model.resource_type {
            model.resource_type.clone()
        } else {
            return None;
        };
        for segment in segments {
            current = field_of(release, &current, segment)?.kind.type_name();
        }
        Some(current)
    }

    /// The completeness shape for a slice: from its nested profile when
    /// one is set, from the profiled backbone record when the factory
    /// compiled one, otherwise from the datatype registry.
    fn slice_shape(&self, model: &ProfileModel, group: &SlicingGroup, slice: &Slice) -> SliceShape {
        if let Some(profile) = slice.profile_constraint() {
            return SliceShape {
                fields: profile.record.completeness_fields(),
                choice_bases: profile.record.choice_groups.keys().cloned().collect(),
            };
        }

        // A backbone record compiled for the sliced element
        let tail = group.path.rsplit('.').next().unwrap_or(&group.path);
        if let Some(spec) = model.record.field(tail) {
            if let Some(nested) = &spec.nested {
                return SliceShape {
                    fields: nested.completeness_fields(),
                    choice_bases: nested.choice_groups.keys().cloned().collect(),
                };
            }
        }

        match self
            .element_type_at(model, &group.path)
            .or_else(|| slice.declared_type.clone())
        {
            Some(type_name) => shape_from_registry(&type_name),
            None => SliceShape::default(),
        }
    }
}

impl Default for ProfileRuntime {
    fn default() -> Self {
        Self::new()
    }
}

fn journal_key(model: &ProfileModel, group: &SlicingGroup, slice: &Slice) -> String {
    let scope = model.canonical_url.as_deref().unwrap_or(&model.name);
    format!("{scope}::{}:{}", group.path, slice.name)
}

const BASE_ELEMENTS: [&str; 5] = ["text", "extension", "modifierExtension", "id", "resourceType"];

/// Build a completeness shape from the datatype registry, walking the
/// base-type chain.
fn shape_from_registry(type_name: &str) -> SliceShape {
    let release = active_release();
    let mut shape = SliceShape::default();
    let mut current = match lookup(release, type_name) {
        Some(TypeDescriptor::Complex(t)) => Some(t),
        _ => None,
    };
    while let Some(t) = current {
        for field in &t.fields {
            if BASE_ELEMENTS.contains(&field.name.as_str()) || field.name.starts_with('_') {
                continue;
            }
            match &field.choice_of {
                Some(base) => {
                    if !shape.choice_bases.contains(base) {
                        shape.choice_bases.push(base.clone());
                        shape.fields.push(base.clone());
                    }
                }
                None => {
                    if !shape.fields.contains(&field.name) {
                        shape.fields.push(field.name.clone());
                    }
                }
            }
        }
        current = t
            .base
            .as_deref()
            .and_then(|b| match lookup(release, b) {
                Some(TypeDescriptor::Complex(base)) => Some(base),
                _ => None,
            });
    }
    shape
}

/// A slice instance is FHIR-complete when every non-extension, non-id,
/// non-narrative field of its shape is populated. Type-choice elements
/// count as populated when any variant is set.
fn is_fhir_complete(instance: &Value, shape: &SliceShape) -> bool {
    if shape.fields.is_empty() {
        return false;
    }
    let obj = match instance.as_object() {
        Some(obj) => obj,
        None => return false,
    };
    let mut populated: Vec<String> = Vec::new();
    for (name, value) in obj {
        if name.starts_with('_') || is_empty_value(value) {
            continue;
        }
        let logical = shape
            .choice_bases
            .iter()
            .find(|base| name.starts_with(base.as_str()) && name.len() > base.len())
            .cloned()
            .unwrap_or_else(|| name.clone());
        if !populated.contains(&logical) {
            populated.push(logical);
        }
    }
    shape.fields.iter().all(|field| populated.contains(field))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_from_registry_collapses_choices() {
        let shape = shape_from_registry("ObservationComponent");
        assert!(shape.fields.contains(&"code".to_string()));
        assert!(shape.fields.contains(&"value".to_string()));
        assert!(!shape.fields.iter().any(|f| f == "valueQuantity"));
        assert!(shape.choice_bases.contains(&"value".to_string()));
    }

    #[test]
    fn test_is_fhir_complete() {
        let shape = SliceShape {
            fields: vec!["code".to_string(), "value".to_string()],
            choice_bases: vec!["value".to_string()],
        };
        let incomplete = json!({"code": {"coding": [{"code": "sys"}]}});
        assert!(!is_fhir_complete(&incomplete, &shape));
        let complete = json!({
            "code": {"coding": [{"code": "sys"}]},
            "valueQuantity": {"value": 120}
        });
        assert!(is_fhir_complete(&complete, &shape));
    }

    #[test]
    fn test_unknown_shape_is_never_complete() {
        assert!(!is_fhir_complete(&json!({"a": 1}), &SliceShape::default()));
    }

    #[test]
    fn test_journal_modification_detection() {
        let mut journal = ChangeJournal::default();
        journal.record("k".to_string(), vec![json!({"code": "sys"})]);
        assert!(!journal.is_modified("k", &json!({"code": "sys"})));
        assert!(journal.is_modified("k", &json!({"code": "sys", "value": 1})));
        assert!(!journal.is_modified("other", &json!({"x": 1})));
    }
}
