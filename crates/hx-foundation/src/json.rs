//! JSON tree helpers shared by the FHIRPath engine and the profile runtime.

use serde_json::{Map, Value};

/// Wrap a value in a one-element vector unless it already is an array.
///
/// `Null` coerces to an empty vector.
pub fn coerce_list(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    }
}

/// True for the values that count as "unset" in a FHIR document:
/// `null`, empty objects, empty arrays and objects whose members are
/// themselves all empty.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.iter().all(is_empty_value),
        Value::Object(map) => map.values().all(is_empty_value),
        _ => false,
    }
}

/// Recursively strip `null` members, empty objects and empty arrays,
/// producing the minimally-serialisable form of a resource.
pub fn remove_empty_values(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let cleaned: Map<String, Value> = map
                .iter()
                .filter(|(_, v)| !is_empty_value(v))
                .map(|(k, v)| (k.clone(), remove_empty_values(v)))
                .collect();
            Value::Object(cleaned)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .filter(|v| !is_empty_value(v))
                .map(remove_empty_values)
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Enumerate the dotted paths of every scalar leaf in a JSON tree.
///
/// Array elements contribute their item paths without an index segment,
/// matching how FHIR pattern values address repeated elements.
pub fn leaf_paths(value: &Value, prefix: &str) -> Vec<(String, Value)> {
    let mut paths = Vec::new();
    collect_leaf_paths(value, prefix, &mut paths);
    paths
}

fn collect_leaf_paths(value: &Value, prefix: &str, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                collect_leaf_paths(child, &path, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_leaf_paths(item, prefix, out);
            }
        }
        Value::Null => {}
        leaf => out.push((prefix.to_string(), leaf.clone())),
    }
}

/// Loose equality across JSON scalar representations: integers compare
/// equal to the same decimal value, everything else is strict.
pub fn values_equal_loose(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
            _ => a == b,
        },
        _ => left == right,
    }
}

/// True when every leaf of `pattern` appears identically in `candidate`.
///
/// This is the FHIR "pattern" matching rule: the candidate may carry
/// additional content, but everything the pattern specifies must match.
/// Array patterns require each pattern item to be matched by at least one
/// candidate item.
pub fn is_superset_of(candidate: &Value, pattern: &Value) -> bool {
    match (candidate, pattern) {
        (Value::Object(cand), Value::Object(pat)) => pat.iter().all(|(key, expected)| {
            cand.get(key)
                .map(|actual| is_superset_of(actual, expected))
                .unwrap_or(false)
        }),
        (Value::Array(cand), Value::Array(pat)) => pat
            .iter()
            .all(|expected| cand.iter().any(|actual| is_superset_of(actual, expected))),
        (actual, expected) => values_equal_loose(actual, expected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coerce_list() {
        assert_eq!(coerce_list(&json!([1, 2])), vec![json!(1), json!(2)]);
        assert_eq!(coerce_list(&json!("a")), vec![json!("a")]);
        assert!(coerce_list(&Value::Null).is_empty());
    }

    #[test]
    fn test_remove_empty_values() {
        let input = json!({
            "a": null,
            "b": {"c": null},
            "d": [{}, {"e": 1}],
            "f": "kept"
        });
        let cleaned = remove_empty_values(&input);
        assert_eq!(cleaned, json!({"d": [{"e": 1}], "f": "kept"}));
    }

    #[test]
    fn test_leaf_paths() {
        let value = json!({"coding": [{"code": "sys", "system": "http://loinc.org"}]});
        let mut paths = leaf_paths(&value, "code");
        paths.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            paths,
            vec![
                ("code.coding.code".to_string(), json!("sys")),
                ("code.coding.system".to_string(), json!("http://loinc.org")),
            ]
        );
    }

    #[test]
    fn test_is_superset_of() {
        let candidate = json!({"coding": [{"code": "sys", "system": "s", "display": "Systolic"}]});
        let pattern = json!({"coding": [{"code": "sys"}]});
        assert!(is_superset_of(&candidate, &pattern));
        assert!(!is_superset_of(&pattern, &json!({"coding": [{"code": "dia"}]})));
    }

    #[test]
    fn test_numeric_equality_is_loose() {
        assert!(values_equal_loose(&json!(2), &json!(2.0)));
        assert!(!values_equal_loose(&json!(2), &json!(3)));
    }
}
