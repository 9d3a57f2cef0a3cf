//! Located values and write-back machinery.
//!
//! A [`PathItem`] wraps a value together with enough metadata to write
//! back to it: a selector (field name, list index or root) and a parent
//! link. The parent link is a lookup back-reference, never ownership —
//! writing resolves the derived selector chain against the mutable root
//! document.

use crate::error::{FhirPathError, FhirPathResult};
use serde_json::Value;
use std::fmt;
use std::rc::Rc;

/// How a located value hangs off its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Root,
    Field(String),
    Index(usize),
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Root => write!(f, "$"),
            Selector::Field(name) => write!(f, ".{name}"),
            Selector::Index(i) => write!(f, "[{i}]"),
        }
    }
}

/// A located value inside a resource.
///
/// The `value` is a snapshot taken at evaluation time; reads through the
/// engine re-resolve the selector chain so creations made later in the
/// same evaluation are visible.
#[derive(Debug, Clone)]
pub struct PathItem {
    pub value: Value,
    pub selector: Selector,
    pub parent: Option<Rc<PathItem>>,
    /// FHIR type of the value, when the registry knows it.
    pub fhir_type: Option<String>,
    /// True when the selector addresses a list-typed field.
    pub is_list_field: bool,
    /// Synthetic items carry computed values (counts, conversions) and
    /// cannot be written through.
    pub synthetic: bool,
}

impl PathItem {
    /// The root item wrapping a whole resource.
    pub fn root(value: Value, fhir_type: Option<String>) -> Self {
        Self {
            value,
            selector: Selector::Root,
            parent: None,
            fhir_type,
            is_list_field: false,
            synthetic: false,
        }
    }

    /// A field of a parent item.
    pub fn field_child(
        parent: Rc<PathItem>,
        name: impl Into<String>,
        value: Value,
        fhir_type: Option<String>,
        is_list_field: bool,
    ) -> Self {
        let synthetic = parent.synthetic;
        Self {
            value,
            selector: Selector::Field(name.into()),
            parent: Some(parent),
            fhir_type,
            is_list_field,
            synthetic,
        }
    }

    /// A list element of a parent item.
    pub fn index_child(parent: Rc<PathItem>, index: usize, value: Value) -> Self {
        let fhir_type = parent.fhir_type.clone();
        let synthetic = parent.synthetic;
        Self {
            value,
            selector: Selector::Index(index),
            parent: Some(parent),
            fhir_type,
            is_list_field: false,
            synthetic,
        }
    }

    /// A parentless item carrying a computed value.
    pub fn computed(value: Value) -> Self {
        Self {
            value,
            selector: Selector::Root,
            parent: None,
            fhir_type: None,
            is_list_field: false,
            synthetic: true,
        }
    }

    /// The selector chain from the root to this item.
    pub fn full_path(&self) -> Vec<Selector> {
        let mut path = vec![self.selector.clone()];
        let mut current = self.parent.clone();
        while let Some(item) = current {
            path.push(item.selector.clone());
            current = item.parent.clone();
        }
        path.reverse();
        path
    }

    /// The topmost ancestor of the parent chain, or `None` when this
    /// item is unparented.
    pub fn root_ancestor(self: &Rc<Self>) -> Rc<PathItem> {
        let mut current = Rc::clone(self);
        while let Some(parent) = current.parent.clone() {
            current = parent;
        }
        current
    }

    /// Human-readable location, for diagnostics only.
    pub fn path_display(&self) -> String {
        let rendered: String = self
            .full_path()
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join("");
        rendered
            .strip_prefix("$.")
            .map(str::to_string)
            .unwrap_or(rendered)
    }
}

/// Resolve a selector chain against a document, read-only.
pub fn resolve_path<'a>(root: &'a Value, path: &[Selector]) -> Option<&'a Value> {
    let mut current = root;
    for selector in path {
        match selector {
            Selector::Root => {}
            Selector::Field(name) => current = current.as_object()?.get(name)?,
            Selector::Index(i) => current = current.as_array()?.get(*i)?,
        }
    }
    Some(current)
}

/// Resolve a selector chain against a document for writing, creating
/// intermediate object members as needed.
fn resolve_slot<'a>(root: &'a mut Value, path: &[Selector]) -> FhirPathResult<&'a mut Value> {
    let mut current = root;
    for selector in path {
        match selector {
            Selector::Root => {}
            Selector::Field(name) => {
                if current.is_null() {
                    *current = Value::Object(serde_json::Map::new());
                }
                let obj = current.as_object_mut().ok_or_else(|| {
                    FhirPathError::type_error(format!(
                        "Cannot access field '{name}' of a non-object value"
                    ))
                })?;
                current = obj.entry(name.clone()).or_insert(Value::Null);
            }
            Selector::Index(i) => {
                let len = current.as_array().map(|a| a.len());
                let arr = current.as_array_mut().ok_or_else(|| {
                    FhirPathError::type_error(format!("Cannot index a non-list value with [{i}]"))
                })?;
                if *i >= len.unwrap_or(0) {
                    return Err(FhirPathError::evaluation_error(format!(
                        "Index [{i}] is out of bounds"
                    )));
                }
                current = &mut arr[*i];
            }
        }
    }
    Ok(current)
}

/// Write a value through a path item into the root document.
///
/// List-typed fields accept only lists (a scalar is wrapped); scalar
/// fields accept only singletons.
pub fn write_value(root: &mut Value, item: &PathItem, value: Value) -> FhirPathResult<()> {
    if item.synthetic {
        return Err(FhirPathError::invalid_operation(
            "Cannot write through a computed value",
        ));
    }

    let value = if item.is_list_field {
        match value {
            Value::Array(_) => value,
            other => Value::Array(vec![other]),
        }
    } else {
        match value {
            Value::Array(items) => {
                if items.len() > 1 {
                    return Err(FhirPathError::invalid_operation(format!(
                        "Value has {} items, but element <{}> does not allow arrays",
                        items.len(),
                        item.path_display()
                    )));
                }
                items.into_iter().next().unwrap_or(Value::Null)
            }
            other => other,
        }
    };

    let slot = resolve_slot(root, &item.full_path())?;
    *slot = value;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item_chain() -> (Value, PathItem) {
        let root = json!({"resourceType": "Patient", "name": [{"family": "Doe"}]});
        let root_item = Rc::new(PathItem::root(root.clone(), Some("Patient".to_string())));
        let name = Rc::new(PathItem::field_child(
            root_item,
            "name",
            json!([{"family": "Doe"}]),
            Some("HumanName".to_string()),
            true,
        ));
        let first = Rc::new(PathItem::index_child(name, 0, json!({"family": "Doe"})));
        let family = PathItem::field_child(
            first,
            "family",
            json!("Doe"),
            Some("String".to_string()),
            false,
        );
        (root, family)
    }

    #[test]
    fn test_full_path_and_display() {
        let (_, family) = item_chain();
        assert_eq!(
            family.full_path(),
            vec![
                Selector::Root,
                Selector::Field("name".to_string()),
                Selector::Index(0),
                Selector::Field("family".to_string()),
            ]
        );
        assert_eq!(family.path_display(), "name[0].family");
    }

    #[test]
    fn test_write_scalar() {
        let (mut root, family) = item_chain();
        write_value(&mut root, &family, json!("Smith")).unwrap();
        assert_eq!(root["name"][0]["family"], json!("Smith"));
    }

    #[test]
    fn test_scalar_field_rejects_multi_item_list() {
        let (mut root, family) = item_chain();
        let err = write_value(&mut root, &family, json!(["A", "B"])).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("does not allow arrays"), "{message}");
        assert!(message.contains("name[0].family"), "{message}");
    }

    #[test]
    fn test_singleton_list_unwraps_into_scalar_field() {
        let (mut root, family) = item_chain();
        write_value(&mut root, &family, json!(["Smith"])).unwrap();
        assert_eq!(root["name"][0]["family"], json!("Smith"));
    }

    #[test]
    fn test_list_field_wraps_scalar() {
        let root = json!({"resourceType": "Patient"});
        let mut doc = root.clone();
        let root_item = Rc::new(PathItem::root(root, Some("Patient".to_string())));
        let name = PathItem::field_child(
            root_item,
            "name",
            Value::Null,
            Some("HumanName".to_string()),
            true,
        );
        write_value(&mut doc, &name, json!({"family": "Doe"})).unwrap();
        assert_eq!(doc["name"], json!([{"family": "Doe"}]));
    }

    #[test]
    fn test_computed_values_are_not_writable() {
        let mut root = json!({});
        let item = PathItem::computed(json!(3));
        assert!(write_value(&mut root, &item, json!(4)).is_err());
    }
}
