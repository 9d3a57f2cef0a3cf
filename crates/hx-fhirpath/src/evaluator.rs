//! FHIRPath expression evaluator.
//!
//! Every expression node evaluates under a single contract:
//! `evaluate(collection, mode) -> Vec<PathItem>`, where the collection is
//! the current list of focus items and the mode is `Read` or `Create`.
//! In `Create` mode the evaluator materialises missing fields and list
//! slots in the root document, using the datatype registry to decide
//! between complex defaults, primitives and lists.

use crate::ast::{BinaryOperator, FhirPath};
use crate::collection::{resolve_path, write_value, PathItem};
use crate::error::{FhirPathError, FhirPathResult};
use crate::functions;
use hx_datatypes::{active_release, field_of, FhirRelease, FieldKind};
use serde_json::Value;
use std::collections::HashMap;
use std::rc::Rc;

/// Evaluation mode: plain reads, or create-the-path-as-you-go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    Read,
    Create,
}

/// Pluggable target for the `resolve()` function.
pub trait ReferenceResolver {
    /// Locate the resource a reference string points at.
    fn resolve_reference(&self, reference: &str) -> FhirPathResult<Value>;
}

/// Context for evaluating FHIRPath expressions.
pub struct EvaluationContext {
    pub release: FhirRelease,
    variables: HashMap<String, Value>,
    resolver: Option<Box<dyn ReferenceResolver>>,
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self {
            release: active_release(),
            variables: HashMap::new(),
            resolver: None,
        }
    }

    /// Bind an environmental variable (`%name`).
    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    /// Wire the resolver used by `resolve()`.
    pub fn with_resolver(mut self, resolver: Box<dyn ReferenceResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub(crate) fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub(crate) fn resolver(&self) -> Option<&dyn ReferenceResolver> {
        self.resolver.as_deref()
    }
}

impl Default for EvaluationContext {
    fn default() -> Self {
        Self::new()
    }
}

/// FHIRPath evaluation engine.
///
/// # Example
/// ```
/// use hx_fhirpath::{FhirPathEngine, FhirPathParser};
/// use serde_json::json;
///
/// let parser = FhirPathParser::new();
/// let engine = FhirPathEngine::new();
/// let expr = parser.parse("Patient.name.given").unwrap();
/// let patient = json!({"resourceType": "Patient", "name": [{"given": ["John"]}]});
/// let value = engine.get_value(&expr, &patient).unwrap();
/// assert_eq!(value, Some(json!(["John"])));
/// ```
pub struct FhirPathEngine {
    context: EvaluationContext,
}

pub(crate) type ItemList = Vec<Rc<PathItem>>;

impl FhirPathEngine {
    pub fn new() -> Self {
        Self {
            context: EvaluationContext::new(),
        }
    }

    pub fn with_context(context: EvaluationContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &EvaluationContext {
        &self.context
    }

    /// Locate every match of `expr` in `resource`.
    pub fn find(&self, expr: &FhirPath, resource: &Value) -> FhirPathResult<Vec<PathItem>> {
        self.find_as(expr, resource, None)
    }

    /// `find` with an explicit FHIR type for the root value, for
    /// documents that are not resources (datatype instances, slices).
    pub fn find_as(
        &self,
        expr: &FhirPath,
        resource: &Value,
        root_type: Option<&str>,
    ) -> FhirPathResult<Vec<PathItem>> {
        let mut scratch = resource.clone();
        let items = self.evaluate(expr, &mut scratch, EvalMode::Read, root_type)?;
        Ok(items.into_iter().map(|i| (*i).clone()).collect())
    }

    /// Locate every match of `expr`, creating the path where absent.
    pub fn find_or_create(
        &self,
        expr: &FhirPath,
        resource: &mut Value,
    ) -> FhirPathResult<Vec<PathItem>> {
        let items = self.evaluate(expr, resource, EvalMode::Create, None)?;
        Ok(items.into_iter().map(|i| (*i).clone()).collect())
    }

    /// Collapse the matches of `expr` to a single value: `None` when
    /// nothing matched, the value itself for a single match, a list
    /// otherwise.
    pub fn get_value(&self, expr: &FhirPath, resource: &Value) -> FhirPathResult<Option<Value>> {
        let items = self.find(expr, resource)?;
        Ok(collapse_values(items.iter().map(|i| i.value.clone())))
    }

    /// Write `value` through every existing match of `expr`.
    pub fn update(&self, expr: &FhirPath, resource: &mut Value, value: Value) -> FhirPathResult<()> {
        let items = self.evaluate(expr, resource, EvalMode::Read, None)?;
        for item in items {
            write_value(resource, &item, value.clone())?;
        }
        Ok(())
    }

    /// Write `value` through every match of `expr`, creating the path
    /// where absent.
    pub fn update_or_create(
        &self,
        expr: &FhirPath,
        resource: &mut Value,
        value: Value,
    ) -> FhirPathResult<()> {
        self.update_or_create_as(expr, resource, value, None)
    }

    /// `update_or_create` with an explicit FHIR type for the root
    /// value.
    pub fn update_or_create_as(
        &self,
        expr: &FhirPath,
        resource: &mut Value,
        value: Value,
        root_type: Option<&str>,
    ) -> FhirPathResult<()> {
        let items = self.evaluate(expr, resource, EvalMode::Create, root_type)?;
        for item in items {
            write_value(resource, &item, value.clone())?;
        }
        Ok(())
    }

    fn evaluate(
        &self,
        expr: &FhirPath,
        root: &mut Value,
        mode: EvalMode,
        root_type: Option<&str>,
    ) -> FhirPathResult<ItemList> {
        let mut root_item = self.root_item(root);
        if let Some(root_type) = root_type {
            root_item.fhir_type = Some(root_type.to_string());
        }
        self.eval_node(expr, vec![Rc::new(root_item)], root, mode)
    }

    pub(crate) fn root_item(&self, root: &Value) -> PathItem {
        let fhir_type = root
            .get("resourceType")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        PathItem::root(root.clone(), fhir_type)
    }

    /// The current value of an item, re-resolved against the root so
    /// that creations made earlier in the same evaluation are visible.
    pub(crate) fn current_value(&self, root: &Value, item: &PathItem) -> Value {
        if item.synthetic {
            return item.value.clone();
        }
        resolve_path(root, &item.full_path())
            .cloned()
            .unwrap_or_else(|| item.value.clone())
    }

    /// Flatten array-valued focus items into one item per element,
    /// preserving document order.
    pub(crate) fn elements(&self, items: &[Rc<PathItem>], root: &Value) -> ItemList {
        let mut out = Vec::new();
        for item in items {
            match self.current_value(root, item) {
                Value::Array(values) => {
                    for (i, value) in values.into_iter().enumerate() {
                        out.push(Rc::new(PathItem::index_child(Rc::clone(item), i, value)));
                    }
                }
                _ => out.push(Rc::clone(item)),
            }
        }
        out
    }

    pub(crate) fn eval_node(
        &self,
        expr: &FhirPath,
        items: ItemList,
        root: &mut Value,
        mode: EvalMode,
    ) -> FhirPathResult<ItemList> {
        match expr {
            FhirPath::Root => Ok(items.iter().map(|i| i.root_ancestor()).collect()),
            FhirPath::This => Ok(items),
            FhirPath::Element(name) => self.eval_element(name, items, root, mode),
            FhirPath::Index(i) => self.eval_index(*i, items, root, mode),
            FhirPath::Slice { start, end, step } => {
                self.eval_slice(*start, *end, *step, items, root)
            }
            FhirPath::Child(left, right) => {
                let scope = self.eval_node(left, items, root, mode)?;
                self.eval_node(right, scope, root, mode)
            }
            FhirPath::Where(predicate) => self.eval_where(predicate, items, root),
            FhirPath::Extension(url) => self.eval_extension(url, items, root),
            FhirPath::TypeChoice(base) => self.eval_type_choice(base, items, root),
            FhirPath::Union(left, right) => {
                let mut out = self.eval_node(left, items.clone(), root, mode)?;
                out.extend(self.eval_node(right, items, root, mode)?);
                Ok(out)
            }
            FhirPath::Descendants(left, right) => {
                let scope = self.eval_node(left, items, root, mode)?;
                self.eval_descendants(right, scope, root)
            }
            FhirPath::BinaryOp { op, left, right } => {
                let value = self.eval_binary_op(*op, left, right, &items, root)?;
                Ok(vec![Rc::new(PathItem::computed(value))])
            }
            FhirPath::Is { target, type_name } => {
                let focus = self.eval_node(target, items, root, EvalMode::Read)?;
                let elements = self.elements(&focus, root);
                let matched = elements.len() == 1 && self.type_matches(&elements[0], type_name);
                Ok(vec![Rc::new(PathItem::computed(Value::Bool(matched)))])
            }
            FhirPath::Invocation { target, function } => {
                let focus = self.eval_node(target, items, root, mode)?;
                self.eval_function(function, focus, root, mode)
            }
            FhirPath::Literal(lit) => Ok(vec![Rc::new(PathItem::computed(lit.to_value()))]),
            FhirPath::EnvVariable(name) => match self.context.variable(name) {
                Some(value) => Ok(vec![Rc::new(PathItem::computed(value.clone()))]),
                None => Err(FhirPathError::evaluation_error(format!(
                    "Environment variable %{name} is not set"
                ))),
            },
        }
    }

    fn field_meta(
        &self,
        parent: &PathItem,
        name: &str,
    ) -> Option<&'static hx_datatypes::FieldDef> {
        let parent_type = parent.fhir_type.as_deref()?;
        field_of(self.context.release, parent_type, name)
    }

    fn eval_element(
        &self,
        name: &str,
        items: ItemList,
        root: &mut Value,
        mode: EvalMode,
    ) -> FhirPathResult<ItemList> {
        let mut out = Vec::new();
        for parent in self.elements(&items, root) {
            let parent_value = self.current_value(root, &parent);
            let existing = parent_value.get(name).cloned();

            let meta = self.field_meta(&parent, name);
            let child_type = meta.map(|f| f.kind.type_name());
            let is_list = meta
                .map(|f| f.is_list())
                .unwrap_or_else(|| matches!(existing, Some(Value::Array(_))));

            match existing {
                Some(value) if !value.is_null() => {
                    out.push(Rc::new(PathItem::field_child(
                        parent, name, value, child_type, is_list,
                    )));
                }
                _ => {
                    if mode == EvalMode::Create && !parent.synthetic {
                        let default = self.default_instance(meta);
                        let default = if is_list {
                            Value::Array(vec![default])
                        } else {
                            default
                        };
                        let item = PathItem::field_child(
                            parent,
                            name,
                            default.clone(),
                            child_type,
                            is_list,
                        );
                        write_value(root, &item, default)?;
                        out.push(Rc::new(item));
                    }
                }
            }
        }
        Ok(out)
    }

    /// A default instance for a field: an empty record for complex
    /// types, `null` for primitives and unknown types.
    fn default_instance(&self, meta: Option<&hx_datatypes::FieldDef>) -> Value {
        match meta.map(|f| &f.kind) {
            Some(FieldKind::Complex(_)) => Value::Object(serde_json::Map::new()),
            _ => Value::Null,
        }
    }

    fn eval_index(
        &self,
        index: i64,
        items: ItemList,
        root: &mut Value,
        mode: EvalMode,
    ) -> FhirPathResult<ItemList> {
        let mut out = Vec::new();
        for item in items {
            let value = self.current_value(root, &item);
            let arr = match &value {
                Value::Array(values) => values.clone(),
                Value::Null => Vec::new(),
                // A scalar focus acts as a one-element list
                other => {
                    if index == 0 || index == -1 {
                        out.push(Rc::clone(&item));
                    } else if mode == EvalMode::Create {
                        return Err(FhirPathError::invalid_operation(format!(
                            "Cannot index scalar element <{}> with [{index}]",
                            item.path_display()
                        )));
                    }
                    let _ = other;
                    continue;
                }
            };

            let resolved = if index < 0 {
                let len = arr.len() as i64;
                len + index
            } else {
                index
            };

            if resolved < 0 {
                continue;
            }
            let resolved = resolved as usize;

            if resolved >= arr.len() {
                if mode == EvalMode::Create && index >= 0 && !item.synthetic {
                    let default = self.element_default(&item);
                    let mut padded = arr.clone();
                    while padded.len() <= resolved {
                        padded.push(default.clone());
                    }
                    write_value(root, &item, Value::Array(padded.clone()))?;
                    out.push(Rc::new(PathItem::index_child(
                        Rc::clone(&item),
                        resolved,
                        default,
                    )));
                }
                // Out-of-range reads produce an empty result, not an error
                continue;
            }

            out.push(Rc::new(PathItem::index_child(
                Rc::clone(&item),
                resolved,
                arr[resolved].clone(),
            )));
        }
        Ok(out)
    }

    /// The default instance for one element of a list item.
    fn element_default(&self, item: &PathItem) -> Value {
        let is_complex = item
            .fhir_type
            .as_deref()
            .map(|t| {
                matches!(
                    hx_datatypes::lookup(self.context.release, t),
                    Some(hx_datatypes::TypeDescriptor::Complex(_))
                )
            })
            .unwrap_or(false);
        if is_complex {
            Value::Object(serde_json::Map::new())
        } else {
            Value::Null
        }
    }

    fn eval_slice(
        &self,
        start: Option<i64>,
        end: Option<i64>,
        step: Option<i64>,
        items: ItemList,
        root: &mut Value,
    ) -> FhirPathResult<ItemList> {
        let mut out = Vec::new();
        for item in items {
            let value = self.current_value(root, &item);
            let arr = match value {
                Value::Array(values) => values,
                Value::Null => continue,
                other => vec![other],
            };
            for i in slice_indices(arr.len(), start, end, step) {
                out.push(Rc::new(PathItem::index_child(
                    Rc::clone(&item),
                    i,
                    arr[i].clone(),
                )));
            }
        }
        Ok(out)
    }

    fn eval_where(
        &self,
        predicate: &FhirPath,
        items: ItemList,
        root: &mut Value,
    ) -> FhirPathResult<ItemList> {
        let mut out = Vec::new();
        for candidate in self.elements(&items, root) {
            if self.predicate_truthy(predicate, &candidate, root)? {
                out.push(candidate);
            }
        }
        Ok(out)
    }

    /// Evaluate a predicate with the candidate item as sole focus.
    pub(crate) fn predicate_truthy(
        &self,
        predicate: &FhirPath,
        candidate: &Rc<PathItem>,
        root: &mut Value,
    ) -> FhirPathResult<bool> {
        let result = self.eval_node(predicate, vec![Rc::clone(candidate)], root, EvalMode::Read)?;
        Ok(self.items_truthy(&result, root))
    }

    /// Collection truthiness: empty is false, a single boolean is
    /// itself, any other non-empty collection is true.
    pub(crate) fn items_truthy(&self, items: &[Rc<PathItem>], root: &Value) -> bool {
        match items {
            [] => false,
            [single] => match self.current_value(root, single) {
                Value::Bool(b) => b,
                Value::Null => false,
                Value::Array(values) => !values.is_empty(),
                _ => true,
            },
            _ => true,
        }
    }

    fn eval_extension(
        &self,
        url: &str,
        items: ItemList,
        root: &mut Value,
    ) -> FhirPathResult<ItemList> {
        // extension(url) == extension.where(url = <url>)
        let holders = self.eval_element("extension", items, root, EvalMode::Read)?;
        let mut out = Vec::new();
        for extension in self.elements(&holders, root) {
            let value = self.current_value(root, &extension);
            if value.get("url").and_then(|u| u.as_str()) == Some(url) {
                out.push(extension);
            }
        }
        Ok(out)
    }

    fn eval_type_choice(
        &self,
        base: &str,
        items: ItemList,
        root: &mut Value,
    ) -> FhirPathResult<ItemList> {
        let mut out = Vec::new();
        for parent in self.elements(&items, root) {
            let value = self.current_value(root, &parent);
            let obj = match value.as_object() {
                Some(obj) => obj,
                None => continue,
            };
            for (field, field_value) in obj {
                if !field.starts_with(base) || field == base || field.starts_with('_') {
                    continue;
                }
                if field_value.is_null() {
                    continue;
                }
                let meta = self.field_meta(&parent, field);
                let child_type = meta.map(|f| f.kind.type_name());
                out.push(Rc::new(PathItem::field_child(
                    Rc::clone(&parent),
                    field.as_str(),
                    field_value.clone(),
                    child_type,
                    false,
                )));
            }
        }
        Ok(out)
    }

    fn eval_descendants(
        &self,
        right: &FhirPath,
        scope: ItemList,
        root: &mut Value,
    ) -> FhirPathResult<ItemList> {
        let mut out = Vec::new();
        for item in scope {
            let mut nodes = Vec::new();
            self.collect_tree(&item, root, true, &mut nodes);
            for node in nodes {
                out.extend(self.eval_node(right, vec![node], root, EvalMode::Read)?);
            }
        }
        Ok(out)
    }

    /// Collect a subtree in document order: JSON object entries and
    /// array elements, optionally including the node itself.
    pub(crate) fn collect_tree(
        &self,
        item: &Rc<PathItem>,
        root: &Value,
        include_self: bool,
        out: &mut Vec<Rc<PathItem>>,
    ) {
        if include_self {
            out.push(Rc::clone(item));
        }
        match self.current_value(root, item) {
            Value::Object(map) => {
                for (field, value) in map {
                    if value.is_null() {
                        continue;
                    }
                    let meta = self.field_meta(item, &field);
                    let child_type = meta.map(|f| f.kind.type_name());
                    let is_list = value.is_array();
                    let child = Rc::new(PathItem::field_child(
                        Rc::clone(item),
                        field,
                        value,
                        child_type,
                        is_list,
                    ));
                    self.collect_tree(&child, root, true, out);
                }
            }
            Value::Array(values) => {
                for (i, value) in values.into_iter().enumerate() {
                    let child = Rc::new(PathItem::index_child(Rc::clone(item), i, value));
                    self.collect_tree(&child, root, true, out);
                }
            }
            _ => {}
        }
    }

    fn eval_binary_op(
        &self,
        op: BinaryOperator,
        left: &FhirPath,
        right: &FhirPath,
        items: &ItemList,
        root: &mut Value,
    ) -> FhirPathResult<Value> {
        if op.is_logical() {
            let left_truthy = {
                let result = self.eval_node(left, items.clone(), root, EvalMode::Read)?;
                self.items_truthy(&result, root)
            };
            // Short-circuit where the left side decides the outcome
            match (op, left_truthy) {
                (BinaryOperator::And, false) => return Ok(Value::Bool(false)),
                (BinaryOperator::Or, true) => return Ok(Value::Bool(true)),
                (BinaryOperator::Implies, false) => return Ok(Value::Bool(true)),
                _ => {}
            }
            let right_truthy = {
                let result = self.eval_node(right, items.clone(), root, EvalMode::Read)?;
                self.items_truthy(&result, root)
            };
            return Ok(Value::Bool(match op {
                BinaryOperator::And => right_truthy,
                BinaryOperator::Or => right_truthy,
                BinaryOperator::Xor => left_truthy != right_truthy,
                BinaryOperator::Implies => right_truthy,
                _ => unreachable!("logical operator"),
            }));
        }

        let left_value = self.eval_operand(left, items, root)?;
        let right_value = self.eval_operand(right, items, root)?;
        functions::apply_binary_op(op, &left_value, &right_value)
    }

    /// Evaluate an operand and collapse it to a single comparison value.
    fn eval_operand(
        &self,
        expr: &FhirPath,
        items: &ItemList,
        root: &mut Value,
    ) -> FhirPathResult<Value> {
        let result = self.eval_node(expr, items.clone(), root, EvalMode::Read)?;
        let values: Vec<Value> = self
            .elements(&result, root)
            .iter()
            .map(|i| self.current_value(root, i))
            .collect();
        Ok(collapse_values(values.into_iter()).unwrap_or(Value::Null))
    }

    /// Type test used by `is` and `ofType`.
    pub(crate) fn type_matches(&self, item: &Rc<PathItem>, type_name: &str) -> bool {
        if item.fhir_type.as_deref() == Some(type_name) {
            return true;
        }
        match type_name {
            "String" | "string" => item.value.is_string(),
            "Boolean" | "boolean" => item.value.is_boolean(),
            "Integer" | "integer" => item.value.is_i64() || item.value.is_u64(),
            "Decimal" | "decimal" => item.value.is_number(),
            _ => false,
        }
    }
}

impl Default for FhirPathEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Collapse an iterator of values: `None` when empty (after dropping
/// nulls and empty containers), the single value, or the full list.
pub(crate) fn collapse_values(values: impl Iterator<Item = Value>) -> Option<Value> {
    let mut kept: Vec<Value> = values
        .filter(|v| !hx_foundation::json::is_empty_value(v))
        .collect();
    match kept.len() {
        0 => None,
        1 => Some(kept.remove(0)),
        _ => Some(Value::Array(kept)),
    }
}

/// Python-style slice index computation, `[*]` when all bounds unset.
fn slice_indices(
    len: usize,
    start: Option<i64>,
    end: Option<i64>,
    step: Option<i64>,
) -> Vec<usize> {
    let len_i = len as i64;
    let clamp = |bound: i64| -> i64 {
        let adjusted = if bound < 0 { len_i + bound } else { bound };
        adjusted.clamp(0, len_i)
    };
    let start = clamp(start.unwrap_or(0));
    let end = clamp(end.unwrap_or(len_i));
    let step = step.unwrap_or(1).max(1) as usize;
    (start..end)
        .step_by(step)
        .map(|i| i as usize)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_indices() {
        assert_eq!(slice_indices(4, None, None, None), vec![0, 1, 2, 3]);
        assert_eq!(slice_indices(4, Some(1), Some(3), None), vec![1, 2]);
        assert_eq!(slice_indices(4, None, Some(-1), None), vec![0, 1, 2]);
        assert_eq!(slice_indices(4, None, None, Some(2)), vec![0, 2]);
        assert!(slice_indices(0, None, None, None).is_empty());
    }

    #[test]
    fn test_collapse_values() {
        assert_eq!(collapse_values(Vec::new().into_iter()), None);
        assert_eq!(
            collapse_values(vec![Value::from(1)].into_iter()),
            Some(Value::from(1))
        );
        assert_eq!(
            collapse_values(vec![Value::from(1), Value::from(2)].into_iter()),
            Some(Value::Array(vec![Value::from(1), Value::from(2)]))
        );
        assert_eq!(collapse_values(vec![Value::Null].into_iter()), None);
    }
}
