//! Read-mode navigation tests for the FHIRPath engine.

use hx_fhirpath::{FhirPathEngine, FhirPathParser};
use serde_json::{json, Value};

fn observation() -> Value {
    json!({
        "resourceType": "Observation",
        "status": "final",
        "code": {"coding": [{"code": "C1"}]},
        "identifier": [
            {"system": "id_system", "use": "official", "value": "123"},
            {"system": "id_system", "use": "official", "value": "456"},
            {"system": "id_system", "use": "official", "value": "789"}
        ],
        "valueInteger": 5,
        "extension": [
            {
                "url": "http://domain.org/extension-1",
                "valueString": "extension-value-1",
                "extension": [
                    {"url": "http://domain.org/extension-2", "valueString": "extension-value-2"}
                ]
            }
        ],
        "component": [
            {
                "code": {"coding": [{"code": "component-1", "system": "https://system.org"}]},
                "valueString": "component-1-value-1"
            },
            {
                "code": {"coding": [{"code": "component-1", "system": "https://system.org"}]},
                "valueString": "component-1-value-2"
            },
            {
                "code": {"coding": [{"code": "component-2", "system": "https://system.org"}]},
                "valueCodeableConcept": {"coding": [{"code": "component-2-code"}]}
            }
        ]
    })
}

fn get(resource: &Value, path: &str) -> Option<Value> {
    let expr = FhirPathParser::new().parse(path).unwrap();
    FhirPathEngine::new().get_value(&expr, resource).unwrap()
}

#[test]
fn test_simple_element_access() {
    let resource = observation();
    assert_eq!(get(&resource, "Observation.status"), Some(json!("final")));
}

#[test]
fn test_element_access_without_resource_head() {
    let resource = observation();
    assert_eq!(get(&resource, "status"), Some(json!("final")));
}

#[test]
fn test_list_element_returns_all_values() {
    let resource = observation();
    assert_eq!(
        get(&resource, "Observation.identifier.value"),
        Some(json!(["123", "456", "789"]))
    );
}

#[test]
fn test_element_over_components_maps_document_order() {
    let resource = observation();
    assert_eq!(
        get(&resource, "Observation.component.valueString"),
        Some(json!(["component-1-value-1", "component-1-value-2"]))
    );
}

#[test]
fn test_indexing() {
    let resource = observation();
    assert_eq!(
        get(&resource, "Observation.identifier[0].value"),
        Some(json!("123"))
    );
    assert_eq!(
        get(&resource, "Observation.identifier[-1].value"),
        Some(json!("789"))
    );
    // Out-of-range reads produce an empty result, not an error
    assert_eq!(get(&resource, "Observation.identifier[10].value"), None);
}

#[test]
fn test_wildcard_and_slices() {
    let resource = observation();
    assert_eq!(
        get(&resource, "identifier[*].value"),
        Some(json!(["123", "456", "789"]))
    );
    assert_eq!(
        get(&resource, "identifier[0:2].value"),
        Some(json!(["123", "456"]))
    );
}

#[test]
fn test_where_filter() {
    let resource = observation();
    assert_eq!(
        get(
            &resource,
            "Observation.component.where(valueString = 'component-1-value-2').valueString"
        ),
        Some(json!("component-1-value-2"))
    );
}

#[test]
fn test_where_on_nested_path() {
    let resource = json!({
        "resourceType": "Patient",
        "name": [
            {"family": "Doe", "given": ["John"]},
            {"family": "Smith", "given": ["Will"]}
        ]
    });
    assert_eq!(
        get(&resource, "Patient.name.where(family = 'Doe').given"),
        Some(json!(["John"]))
    );
    assert_eq!(
        get(&resource, "Patient.name.where(family = 'Smith').given"),
        Some(json!(["Will"]))
    );
}

#[test]
fn test_extension_traversal() {
    let resource = json!({
        "resourceType": "Patient",
        "extension": [
            {"url": "http://x/a", "valueString": "A"},
            {"url": "http://x/b", "valueString": "B"}
        ]
    });
    assert_eq!(
        get(&resource, "extension('http://x/b').valueString"),
        Some(json!("B"))
    );
}

#[test]
fn test_nested_extension_traversal() {
    let resource = observation();
    assert_eq!(
        get(
            &resource,
            "extension('http://domain.org/extension-1').extension('http://domain.org/extension-2').valueString"
        ),
        Some(json!("extension-value-2"))
    );
}

#[test]
fn test_type_choice_access() {
    let resource = observation();
    assert_eq!(get(&resource, "Observation.value[x]"), Some(json!(5)));

    let patient = json!({"resourceType": "Patient", "deceasedBoolean": true});
    assert_eq!(get(&patient, "Patient.deceased[x]"), Some(json!(true)));
}

#[test]
fn test_union_concatenates_left_then_right() {
    let resource = observation();
    assert_eq!(
        get(&resource, "identifier[0].value | identifier[1].value"),
        Some(json!(["123", "456"]))
    );
}

#[test]
fn test_collection_functions() {
    let resource = observation();
    assert_eq!(get(&resource, "identifier.count()"), Some(json!(3)));
    assert_eq!(get(&resource, "identifier.exists()"), Some(json!(true)));
    assert_eq!(get(&resource, "contact.exists()"), Some(json!(false)));
    assert_eq!(get(&resource, "identifier.first().value"), Some(json!("123")));
    assert_eq!(get(&resource, "identifier.last().value"), Some(json!("789")));
    assert_eq!(
        get(&resource, "identifier.tail().value"),
        Some(json!(["456", "789"]))
    );
    assert_eq!(get(&resource, "identifier.value.distinct().count()"), Some(json!(3)));
    assert_eq!(get(&resource, "identifier.system.isDistinct()"), Some(json!(false)));
}

#[test]
fn test_single_cardinality_error() {
    let resource = observation();
    let expr = FhirPathParser::new()
        .parse("Observation.identifier.single()")
        .unwrap();
    let err = FhirPathEngine::new().get_value(&expr, &resource).unwrap_err();
    assert!(err.to_string().contains("single()"), "{err}");
}

#[test]
fn test_boolean_operators() {
    let resource = observation();
    assert_eq!(
        get(&resource, "status = 'final' and identifier.exists()"),
        Some(json!(true))
    );
    assert_eq!(
        get(&resource, "status = 'other' or identifier.exists()"),
        Some(json!(true))
    );
    assert_eq!(
        get(&resource, "status = 'other' implies identifier.exists()"),
        Some(json!(true))
    );
}

#[test]
fn test_arithmetic_and_comparison() {
    let resource = observation();
    assert_eq!(get(&resource, "valueInteger + 3"), Some(json!(8)));
    assert_eq!(get(&resource, "valueInteger > 3"), Some(json!(true)));
    assert_eq!(get(&resource, "valueInteger * 2 = 10"), Some(json!(true)));
}

#[test]
fn test_string_functions() {
    let resource = observation();
    assert_eq!(get(&resource, "status.upper()"), Some(json!("FINAL")));
    assert_eq!(get(&resource, "status.length()"), Some(json!(5)));
    assert_eq!(get(&resource, "status.startsWith('fin')"), Some(json!(true)));
    assert_eq!(get(&resource, "status.substring(0, 3)"), Some(json!("fin")));
    assert_eq!(
        get(&resource, "status.matches('^f.*l$')"),
        Some(json!(true))
    );
    assert_eq!(
        get(&resource, "status.replace('final', 'amended')"),
        Some(json!("amended"))
    );
}

#[test]
fn test_math_functions() {
    let resource = json!({"resourceType": "Observation", "valueQuantity": {"value": 2.4}});
    assert_eq!(get(&resource, "valueQuantity.value.floor()"), Some(json!(2)));
    assert_eq!(get(&resource, "valueQuantity.value.ceiling()"), Some(json!(3)));
    assert_eq!(get(&resource, "valueQuantity.value.round()"), Some(json!(2.0)));
}

#[test]
fn test_conversions() {
    let resource = json!({"resourceType": "Observation", "valueString": "42"});
    assert_eq!(get(&resource, "valueString.toInteger()"), Some(json!(42)));
    let resource = json!({"resourceType": "Observation", "valueInteger": 42});
    assert_eq!(get(&resource, "valueInteger.toString()"), Some(json!("42")));
}

#[test]
fn test_of_type_and_is() {
    let resource = observation();
    assert_eq!(
        get(&resource, "value[x].ofType(Integer)"),
        Some(json!(5))
    );
    assert_eq!(get(&resource, "status is String"), Some(json!(true)));
}

#[test]
fn test_descendants_search() {
    let resource = observation();
    // Every `code` leaf anywhere under component
    let found = get(&resource, "Observation.component..code.coding.code").unwrap();
    let found = found.as_array().cloned().unwrap_or_else(|| vec![found]);
    assert!(found.contains(&json!("component-1")));
    assert!(found.contains(&json!("component-2")));
}

#[test]
fn test_has_value_and_get_value() {
    let resource = observation();
    assert_eq!(get(&resource, "status.hasValue()"), Some(json!(true)));
    assert_eq!(get(&resource, "status.getValue()"), Some(json!("final")));
    assert_eq!(get(&resource, "code.hasValue()"), Some(json!(false)));
}

#[test]
fn test_environment_variable() {
    use hx_fhirpath::EvaluationContext;
    let context = EvaluationContext::new().with_variable("threshold", json!(3));
    let engine = FhirPathEngine::with_context(context);
    let expr = FhirPathParser::new().parse("valueInteger > %threshold").unwrap();
    assert_eq!(
        engine.get_value(&expr, &observation()).unwrap(),
        Some(json!(true))
    );
}

#[test]
fn test_iif() {
    let resource = observation();
    assert_eq!(
        get(&resource, "iif(status = 'final', 'done', 'pending')"),
        Some(json!("done"))
    );
    assert_eq!(
        get(&resource, "iif(status = 'draft', 'done', 'pending')"),
        Some(json!("pending"))
    );
}
