//! Builtin FHIRPath functions and operator semantics.
//!
//! The collection functions operate on the flattened focus (one item per
//! element, document order preserved); scalar functions require a
//! singleton focus and raise a function error otherwise.

use crate::ast::{BinaryOperator, FhirPath, Function};
use crate::collection::PathItem;
use crate::error::{FhirPathError, FhirPathResult};
use crate::evaluator::{EvalMode, FhirPathEngine, ItemList};
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use std::rc::Rc;
use tracing::debug;

impl FhirPathEngine {
    pub(crate) fn eval_function(
        &self,
        function: &Function,
        focus: ItemList,
        root: &mut Value,
        _mode: EvalMode,
    ) -> FhirPathResult<ItemList> {
        let elements = self.elements(&focus, root);
        match function {
            Function::First => Ok(elements.into_iter().take(1).collect()),
            Function::Last => Ok(elements.into_iter().last().into_iter().collect()),
            Function::Tail => Ok(elements.into_iter().skip(1).collect()),
            Function::Single => {
                if elements.len() != 1 {
                    let path = focus
                        .first()
                        .map(|i| i.path_display())
                        .unwrap_or_else(|| "$".to_string());
                    return Err(FhirPathError::evaluation_error(format!(
                        "Expected single value for {path}.single(), instead got {} values",
                        elements.len()
                    )));
                }
                Ok(elements)
            }
            Function::Skip(count) => {
                let n = self.integer_argument(count, &focus, root, "skip")?;
                Ok(elements.into_iter().skip(n.max(0) as usize).collect())
            }
            Function::Take(count) => {
                let n = self.integer_argument(count, &focus, root, "take")?;
                Ok(elements.into_iter().take(n.max(0) as usize).collect())
            }
            Function::Count => Ok(computed(Value::from(elements.len()))),
            Function::Empty => Ok(computed(Value::Bool(elements.is_empty()))),
            Function::Exists(None) => Ok(computed(Value::Bool(!elements.is_empty()))),
            Function::Exists(Some(criteria)) => {
                for element in &elements {
                    if self.predicate_truthy(criteria, element, root)? {
                        return Ok(computed(Value::Bool(true)));
                    }
                }
                Ok(computed(Value::Bool(false)))
            }
            Function::All(criteria) => {
                for element in &elements {
                    if !self.predicate_truthy(criteria, element, root)? {
                        return Ok(computed(Value::Bool(false)));
                    }
                }
                Ok(computed(Value::Bool(true)))
            }
            Function::AllTrue => Ok(computed(Value::Bool(
                self.element_values(&elements, root)
                    .iter()
                    .all(|v| v == &Value::Bool(true)),
            ))),
            Function::AnyTrue => Ok(computed(Value::Bool(
                self.element_values(&elements, root)
                    .iter()
                    .any(|v| v == &Value::Bool(true)),
            ))),
            Function::AllFalse => Ok(computed(Value::Bool(
                self.element_values(&elements, root)
                    .iter()
                    .all(|v| v == &Value::Bool(false)),
            ))),
            Function::AnyFalse => Ok(computed(Value::Bool(
                self.element_values(&elements, root)
                    .iter()
                    .any(|v| v == &Value::Bool(false)),
            ))),
            Function::Distinct => {
                let mut seen: Vec<Value> = Vec::new();
                let mut out = Vec::new();
                for element in elements {
                    let value = self.current_value(root, &element);
                    if !seen.contains(&value) {
                        seen.push(value);
                        out.push(element);
                    }
                }
                Ok(out)
            }
            Function::IsDistinct => {
                let values = self.element_values(&elements, root);
                let mut seen: Vec<&Value> = Vec::new();
                let mut distinct = true;
                for value in &values {
                    if seen.contains(&value) {
                        distinct = false;
                        break;
                    }
                    seen.push(value);
                }
                Ok(computed(Value::Bool(distinct)))
            }
            Function::SubsetOf(other) => {
                let ours = self.element_values(&elements, root);
                let theirs = self.other_collection(other, root)?;
                Ok(computed(Value::Bool(ours.iter().all(|v| theirs.contains(v)))))
            }
            Function::SupersetOf(other) => {
                let ours = self.element_values(&elements, root);
                let theirs = self.other_collection(other, root)?;
                Ok(computed(Value::Bool(theirs.iter().all(|v| ours.contains(v)))))
            }
            Function::UnionWith(other) => {
                let mut out = elements;
                let mut seen: Vec<Value> = out
                    .iter()
                    .map(|i| self.current_value(root, i))
                    .collect();
                for value in self.other_collection(other, root)? {
                    if !seen.contains(&value) {
                        seen.push(value.clone());
                        out.push(Rc::new(PathItem::computed(value)));
                    }
                }
                // Drop duplicates contributed by the focus itself
                let mut deduped: Vec<Rc<PathItem>> = Vec::new();
                let mut kept: Vec<Value> = Vec::new();
                for item in out {
                    let value = self.current_value(root, &item);
                    if !kept.contains(&value) {
                        kept.push(value);
                        deduped.push(item);
                    }
                }
                Ok(deduped)
            }
            Function::Combine(other) => {
                let mut out = elements;
                for value in self.other_collection(other, root)? {
                    out.push(Rc::new(PathItem::computed(value)));
                }
                Ok(out)
            }
            Function::Intersect(other) => {
                let theirs = self.other_collection(other, root)?;
                let mut out = Vec::new();
                let mut kept: Vec<Value> = Vec::new();
                for element in elements {
                    let value = self.current_value(root, &element);
                    if theirs.contains(&value) && !kept.contains(&value) {
                        kept.push(value);
                        out.push(element);
                    }
                }
                Ok(out)
            }
            Function::Exclude(other) => {
                let theirs = self.other_collection(other, root)?;
                Ok(elements
                    .into_iter()
                    .filter(|e| !theirs.contains(&self.current_value(root, e)))
                    .collect())
            }
            Function::Select(projection) => {
                let mut out = Vec::new();
                for element in &elements {
                    out.extend(self.eval_node(
                        projection,
                        vec![Rc::clone(element)],
                        root,
                        EvalMode::Read,
                    )?);
                }
                Ok(out)
            }
            Function::OfType(type_name) => Ok(elements
                .into_iter()
                .filter(|e| self.type_matches(e, type_name))
                .collect()),
            Function::Iif {
                condition,
                then,
                otherwise,
            } => {
                let chosen = {
                    let result =
                        self.eval_node(condition, focus.clone(), root, EvalMode::Read)?;
                    self.items_truthy(&result, root)
                };
                if chosen {
                    self.eval_node(then, focus, root, EvalMode::Read)
                } else {
                    match otherwise {
                        Some(expr) => self.eval_node(expr, focus, root, EvalMode::Read),
                        None => Ok(Vec::new()),
                    }
                }
            }
            Function::ToString => self.convert_singleton(&elements, root, |v| match v {
                Value::String(s) => Some(Value::String(s)),
                Value::Bool(b) => Some(Value::String(b.to_string())),
                Value::Number(n) => Some(Value::String(n.to_string())),
                _ => None,
            }),
            Function::ToInteger => self.convert_singleton(&elements, root, |v| match v {
                Value::Number(n) => n.as_i64().map(Value::from),
                Value::String(s) => s.parse::<i64>().ok().map(Value::from),
                Value::Bool(b) => Some(Value::from(if b { 1 } else { 0 })),
                _ => None,
            }),
            Function::ToDecimal => self.convert_singleton(&elements, root, |v| match v {
                Value::Number(n) => n.as_f64().map(Value::from),
                Value::String(s) => s.parse::<f64>().ok().map(Value::from),
                Value::Bool(b) => Some(Value::from(if b { 1.0 } else { 0.0 })),
                _ => None,
            }),
            Function::ToBoolean => self.convert_singleton(&elements, root, |v| match v {
                Value::Bool(b) => Some(Value::Bool(b)),
                Value::String(s) => match s.to_lowercase().as_str() {
                    "true" | "t" | "yes" | "1" => Some(Value::Bool(true)),
                    "false" | "f" | "no" | "0" => Some(Value::Bool(false)),
                    _ => None,
                },
                Value::Number(n) => match n.as_f64() {
                    Some(x) if x == 1.0 => Some(Value::Bool(true)),
                    Some(x) if x == 0.0 => Some(Value::Bool(false)),
                    _ => None,
                },
                _ => None,
            }),
            Function::ToDate => self.convert_singleton(&elements, root, |v| match v {
                Value::String(s) => {
                    let date = s.split('T').next().unwrap_or_default().to_string();
                    hx_datatypes::PrimitiveType::Date
                        .matches(&date)
                        .then_some(Value::String(date))
                }
                _ => None,
            }),
            Function::ToDateTime => self.convert_singleton(&elements, root, |v| match v {
                Value::String(s) => hx_datatypes::PrimitiveType::DateTime
                    .matches(&s)
                    .then_some(Value::String(s)),
                _ => None,
            }),
            Function::ToTime => self.convert_singleton(&elements, root, |v| match v {
                Value::String(s) => hx_datatypes::PrimitiveType::Time
                    .matches(&s)
                    .then_some(Value::String(s)),
                _ => None,
            }),
            Function::IndexOf(substring) => {
                let text = self.singleton_string(&elements, root, "indexOf")?;
                let needle = self.string_argument(substring, &focus, root, "indexOf")?;
                let index = text
                    .find(&needle)
                    .map(|byte| text[..byte].chars().count() as i64)
                    .unwrap_or(-1);
                Ok(computed(Value::from(index)))
            }
            Function::Substring { start, length } => {
                let text = self.singleton_string(&elements, root, "substring")?;
                let start = self.integer_argument(start, &focus, root, "substring")?;
                let chars: Vec<char> = text.chars().collect();
                if start < 0 || start as usize >= chars.len() {
                    return Ok(Vec::new());
                }
                let start = start as usize;
                let end = match length {
                    Some(expr) => {
                        let len = self.integer_argument(expr, &focus, root, "substring")?;
                        if len <= 0 {
                            return Ok(Vec::new());
                        }
                        (start + len as usize).min(chars.len())
                    }
                    None => chars.len(),
                };
                let result: String = chars[start..end].iter().collect();
                Ok(computed(Value::String(result)))
            }
            Function::StartsWith(prefix) => {
                let text = self.singleton_string(&elements, root, "startsWith")?;
                let prefix = self.string_argument(prefix, &focus, root, "startsWith")?;
                Ok(computed(Value::Bool(text.starts_with(&prefix))))
            }
            Function::EndsWith(suffix) => {
                let text = self.singleton_string(&elements, root, "endsWith")?;
                let suffix = self.string_argument(suffix, &focus, root, "endsWith")?;
                Ok(computed(Value::Bool(text.ends_with(&suffix))))
            }
            Function::Contains(needle) => {
                let text = self.singleton_string(&elements, root, "contains")?;
                let needle = self.string_argument(needle, &focus, root, "contains")?;
                Ok(computed(Value::Bool(text.contains(&needle))))
            }
            Function::Upper => {
                let text = self.singleton_string(&elements, root, "upper")?;
                Ok(computed(Value::String(text.to_uppercase())))
            }
            Function::Lower => {
                let text = self.singleton_string(&elements, root, "lower")?;
                Ok(computed(Value::String(text.to_lowercase())))
            }
            Function::Replace {
                pattern,
                substitution,
            } => {
                let text = self.singleton_string(&elements, root, "replace")?;
                let pattern = self.string_argument(pattern, &focus, root, "replace")?;
                let substitution = self.string_argument(substitution, &focus, root, "replace")?;
                Ok(computed(Value::String(text.replace(&pattern, &substitution))))
            }
            Function::Matches(pattern) => {
                let text = self.singleton_string(&elements, root, "matches")?;
                let pattern = self.string_argument(pattern, &focus, root, "matches")?;
                let regex = regex::Regex::new(&pattern).map_err(|e| {
                    FhirPathError::function_error(format!("matches(): invalid regex: {e}"))
                })?;
                Ok(computed(Value::Bool(regex.is_match(&text))))
            }
            Function::ReplaceMatches {
                pattern,
                substitution,
            } => {
                let text = self.singleton_string(&elements, root, "replaceMatches")?;
                let pattern = self.string_argument(pattern, &focus, root, "replaceMatches")?;
                let substitution =
                    self.string_argument(substitution, &focus, root, "replaceMatches")?;
                let regex = regex::Regex::new(&pattern).map_err(|e| {
                    FhirPathError::function_error(format!("replaceMatches(): invalid regex: {e}"))
                })?;
                Ok(computed(Value::String(
                    regex.replace_all(&text, substitution.as_str()).into_owned(),
                )))
            }
            Function::Length => {
                let text = self.singleton_string(&elements, root, "length")?;
                Ok(computed(Value::from(text.chars().count())))
            }
            Function::ToChars => {
                let text = self.singleton_string(&elements, root, "toChars")?;
                Ok(text
                    .chars()
                    .map(|c| Rc::new(PathItem::computed(Value::String(c.to_string()))))
                    .collect())
            }
            Function::Abs => self.numeric_singleton(&elements, root, "abs", |n| Some(n.abs())),
            Function::Ceiling => {
                self.numeric_to_int(&elements, root, "ceiling", |n| n.ceil() as i64)
            }
            Function::Floor => self.numeric_to_int(&elements, root, "floor", |n| n.floor() as i64),
            Function::Round(precision) => {
                let digits = match precision {
                    Some(expr) => self.integer_argument(expr, &focus, root, "round")?,
                    None => 0,
                };
                self.numeric_singleton(&elements, root, "round", move |n| {
                    let factor = 10f64.powi(digits as i32);
                    Some((n * factor).round() / factor)
                })
            }
            Function::Sqrt => self.numeric_singleton(&elements, root, "sqrt", |n| {
                if n < 0.0 {
                    None
                } else {
                    Some(n.sqrt())
                }
            }),
            Function::Truncate => {
                self.numeric_to_int(&elements, root, "truncate", |n| n.trunc() as i64)
            }
            Function::Children => {
                let mut out = Vec::new();
                for element in &elements {
                    let mut subtree = Vec::new();
                    self.collect_children(element, root, &mut subtree);
                    out.extend(subtree);
                }
                Ok(out)
            }
            Function::DescendantsAll => {
                let mut out = Vec::new();
                for element in &elements {
                    self.collect_tree(element, root, false, &mut out);
                }
                Ok(out)
            }
            Function::Trace(label) => {
                let values = self.element_values(&elements, root);
                debug!(label = %label, ?values, "fhirpath trace");
                Ok(elements)
            }
            Function::Now => Ok(computed(Value::String(
                Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            ))),
            Function::Today => Ok(computed(Value::String(
                Utc::now().format("%Y-%m-%d").to_string(),
            ))),
            Function::TimeOfDay => Ok(computed(Value::String(
                Utc::now().format("%H:%M:%S%.3f").to_string(),
            ))),
            Function::HasValue => {
                let has = elements.len() == 1
                    && !matches!(
                        self.current_value(root, &elements[0]),
                        Value::Null | Value::Array(_) | Value::Object(_)
                    );
                Ok(computed(Value::Bool(has)))
            }
            Function::GetValue => {
                if elements.len() == 1 {
                    let value = self.current_value(root, &elements[0]);
                    if !matches!(value, Value::Null | Value::Array(_) | Value::Object(_)) {
                        return Ok(elements);
                    }
                }
                Ok(Vec::new())
            }
            Function::Resolve => self.eval_resolve(&elements, root),
            Function::Not => {
                if elements.is_empty() {
                    return Ok(Vec::new());
                }
                let truthy = self.items_truthy(&elements, root);
                Ok(computed(Value::Bool(!truthy)))
            }
        }
    }

    fn collect_children(&self, item: &Rc<PathItem>, root: &Value, out: &mut Vec<Rc<PathItem>>) {
        match self.current_value(root, item) {
            Value::Object(map) => {
                for (field, value) in map {
                    if value.is_null() {
                        continue;
                    }
                    let is_list = value.is_array();
                    let child = Rc::new(PathItem::field_child(
                        Rc::clone(item),
                        field,
                        value,
                        None,
                        is_list,
                    ));
                    if child.value.is_array() {
                        out.extend(self.elements(&[child], root));
                    } else {
                        out.push(child);
                    }
                }
            }
            Value::Array(values) => {
                for (i, value) in values.into_iter().enumerate() {
                    out.push(Rc::new(PathItem::index_child(Rc::clone(item), i, value)));
                }
            }
            _ => {}
        }
    }

    fn eval_resolve(&self, elements: &[Rc<PathItem>], root: &mut Value) -> FhirPathResult<ItemList> {
        let resolver = self.context().resolver().ok_or_else(|| {
            FhirPathError::evaluation_error("No reference resolver is configured for resolve()")
        })?;
        let mut out = Vec::new();
        for element in elements {
            let value = self.current_value(root, element);
            let reference = match &value {
                Value::String(s) => s.clone(),
                Value::Object(map) => match map.get("reference").and_then(|r| r.as_str()) {
                    Some(r) => r.to_string(),
                    None => {
                        return Err(FhirPathError::invalid_operation(
                            "The resolve() function requires a collection of URIs, canonicals, URLs or References",
                        ))
                    }
                },
                _ => {
                    return Err(FhirPathError::invalid_operation(
                        "The resolve() function requires a collection of URIs, canonicals, URLs or References",
                    ))
                }
            };
            let resource = resolver.resolve_reference(&reference)?;
            let fhir_type = resource
                .get("resourceType")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            let mut item = PathItem::computed(resource);
            item.fhir_type = fhir_type;
            out.push(Rc::new(item));
        }
        Ok(out)
    }

    fn element_values(&self, elements: &[Rc<PathItem>], root: &Value) -> Vec<Value> {
        elements
            .iter()
            .map(|e| self.current_value(root, e))
            .collect()
    }

    /// Evaluate the "other collection" argument of a set operation
    /// against the root context.
    fn other_collection(&self, expr: &FhirPath, root: &mut Value) -> FhirPathResult<Vec<Value>> {
        let root_item = Rc::new(self.root_item(root));
        let items = self.eval_node(expr, vec![root_item], root, EvalMode::Read)?;
        let elements = self.elements(&items, root);
        Ok(self.element_values(&elements, root))
    }

    fn convert_singleton(
        &self,
        elements: &[Rc<PathItem>],
        root: &Value,
        convert: impl FnOnce(Value) -> Option<Value>,
    ) -> FhirPathResult<ItemList> {
        match elements {
            [single] => Ok(convert(self.current_value(root, single))
                .map(|v| computed(v))
                .unwrap_or_default()),
            _ => Ok(Vec::new()),
        }
    }

    fn singleton_string(
        &self,
        elements: &[Rc<PathItem>],
        root: &Value,
        function: &str,
    ) -> FhirPathResult<String> {
        match elements {
            [single] => match self.current_value(root, single) {
                Value::String(s) => Ok(s),
                other => Err(FhirPathError::function_error(format!(
                    "{function}() requires a string input, got {other}"
                ))),
            },
            items => Err(FhirPathError::function_error(format!(
                "{function}() requires a singleton input, got {} items",
                items.len()
            ))),
        }
    }

    fn numeric_singleton(
        &self,
        elements: &[Rc<PathItem>],
        root: &Value,
        function: &str,
        apply: impl FnOnce(f64) -> Option<f64>,
    ) -> FhirPathResult<ItemList> {
        match elements {
            [single] => {
                let value = self.current_value(root, single);
                // Integers stay integral through integer-preserving maps
                if let Some(i) = value.as_i64() {
                    return Ok(match apply(i as f64) {
                        Some(result) if result.fract() == 0.0 => {
                            computed(Value::from(result as i64))
                        }
                        Some(result) => computed(Value::from(result)),
                        None => Vec::new(),
                    });
                }
                match value.as_f64() {
                    Some(n) => Ok(apply(n).map(|r| computed(Value::from(r))).unwrap_or_default()),
                    None => Err(FhirPathError::function_error(format!(
                        "{function}() requires a numeric input"
                    ))),
                }
            }
            items => Err(FhirPathError::function_error(format!(
                "{function}() requires a singleton input, got {} items",
                items.len()
            ))),
        }
    }

    fn numeric_to_int(
        &self,
        elements: &[Rc<PathItem>],
        root: &Value,
        function: &str,
        apply: impl FnOnce(f64) -> i64,
    ) -> FhirPathResult<ItemList> {
        match elements {
            [single] => match self.current_value(root, single).as_f64() {
                Some(n) => Ok(computed(Value::from(apply(n)))),
                None => Err(FhirPathError::function_error(format!(
                    "{function}() requires a numeric input"
                ))),
            },
            items => Err(FhirPathError::function_error(format!(
                "{function}() requires a singleton input, got {} items",
                items.len()
            ))),
        }
    }

    fn integer_argument(
        &self,
        expr: &FhirPath,
        focus: &ItemList,
        root: &mut Value,
        function: &str,
    ) -> FhirPathResult<i64> {
        let items = self.eval_node(expr, focus.clone(), root, EvalMode::Read)?;
        let values = self.element_values(&self.elements(&items, root), root);
        match values.as_slice() {
            [Value::Number(n)] if n.as_i64().is_some() => Ok(n.as_i64().unwrap()),
            _ => Err(FhirPathError::function_error(format!(
                "{function}() requires an integer argument"
            ))),
        }
    }

    fn string_argument(
        &self,
        expr: &FhirPath,
        focus: &ItemList,
        root: &mut Value,
        function: &str,
    ) -> FhirPathResult<String> {
        let items = self.eval_node(expr, focus.clone(), root, EvalMode::Read)?;
        let values = self.element_values(&self.elements(&items, root), root);
        match values.as_slice() {
            [Value::String(s)] => Ok(s.clone()),
            _ => Err(FhirPathError::function_error(format!(
                "{function}() requires a string argument"
            ))),
        }
    }
}

fn computed(value: Value) -> ItemList {
    vec![Rc::new(PathItem::computed(value))]
}

/// Apply a non-logical binary operator, following FHIR operand
/// polymorphism: numeric comparison across integers and decimals,
/// lexicographic comparison for strings, loose equality elsewhere.
pub(crate) fn apply_binary_op(
    op: BinaryOperator,
    left: &Value,
    right: &Value,
) -> FhirPathResult<Value> {
    match op {
        BinaryOperator::Eq => Ok(Value::Bool(values_equal(left, right))),
        BinaryOperator::Ne => Ok(Value::Bool(!values_equal(left, right))),
        BinaryOperator::Lt | BinaryOperator::Le | BinaryOperator::Gt | BinaryOperator::Ge => {
            let ordering = compare_values(left, right).ok_or_else(|| {
                FhirPathError::type_error(format!(
                    "Cannot compare {left} and {right} with '{}'",
                    op.symbol()
                ))
            })?;
            Ok(Value::Bool(match op {
                BinaryOperator::Lt => ordering == std::cmp::Ordering::Less,
                BinaryOperator::Le => ordering != std::cmp::Ordering::Greater,
                BinaryOperator::Gt => ordering == std::cmp::Ordering::Greater,
                BinaryOperator::Ge => ordering != std::cmp::Ordering::Less,
                _ => unreachable!("comparison operator"),
            }))
        }
        BinaryOperator::Add => match (left, right) {
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
            _ => numeric_op(left, right, op, |a, b| a + b),
        },
        BinaryOperator::Sub => numeric_op(left, right, op, |a, b| a - b),
        BinaryOperator::Mul => numeric_op(left, right, op, |a, b| a * b),
        BinaryOperator::Div => {
            let b = right.as_f64().unwrap_or(0.0);
            if b == 0.0 {
                return Ok(Value::Null);
            }
            let a = left
                .as_f64()
                .ok_or_else(|| FhirPathError::type_error("'/' requires numeric operands"))?;
            Ok(Value::from(a / b))
        }
        BinaryOperator::Concat => {
            let a = concat_operand(left);
            let b = concat_operand(right);
            Ok(Value::String(format!("{a}{b}")))
        }
        _ => Err(FhirPathError::invalid_operation(format!(
            "Operator '{}' cannot be applied to collapsed operands",
            op.symbol()
        ))),
    }
}

fn concat_operand(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn numeric_op(
    left: &Value,
    right: &Value,
    op: BinaryOperator,
    apply: impl FnOnce(f64, f64) -> f64,
) -> FhirPathResult<Value> {
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => {
            let result = apply(a, b);
            if left.is_i64() && right.is_i64() && result.fract() == 0.0 {
                Ok(Value::from(result as i64))
            } else {
                Ok(Value::from(result))
            }
        }
        _ => Err(FhirPathError::type_error(format!(
            "Operator '{}' requires numeric operands, got {left} and {right}",
            op.symbol()
        ))),
    }
}

/// Loose equality: numbers compare by value across integer and decimal
/// representations, lists compare element-wise, everything else is
/// strict JSON equality.
pub(crate) fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(_), Value::Number(_)) => {
            hx_foundation::json::values_equal_loose(left, right)
        }
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| values_equal(x, y))
        }
        // A singleton list equals its sole element
        (Value::Array(a), b) if a.len() == 1 => values_equal(&a[0], b),
        (a, Value::Array(b)) if b.len() == 1 => values_equal(a, &b[0]),
        _ => left == right,
    }
}

fn compare_values(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    match (left, right) {
        (Value::Number(_), Value::Number(_)) => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
