//! Create-mode and write-back tests for the FHIRPath engine.

use hx_fhirpath::{FhirPathEngine, FhirPathParser};
use serde_json::{json, Value};

fn parse(path: &str) -> hx_fhirpath::FhirPath {
    FhirPathParser::new().parse(path).unwrap()
}

fn get(resource: &Value, path: &str) -> Option<Value> {
    FhirPathEngine::new()
        .get_value(&parse(path), resource)
        .unwrap()
}

#[test]
fn test_update_existing_scalar() {
    let engine = FhirPathEngine::new();
    let mut patient = json!({"resourceType": "Patient", "id": "1234"});
    engine
        .update(&parse("Patient.id"), &mut patient, json!("5678"))
        .unwrap();
    assert_eq!(patient["id"], json!("5678"));
}

#[test]
fn test_update_does_not_create_missing_paths() {
    let engine = FhirPathEngine::new();
    let mut patient = json!({"resourceType": "Patient"});
    engine
        .update(&parse("Patient.name.family"), &mut patient, json!("Doe"))
        .unwrap();
    assert_eq!(patient, json!({"resourceType": "Patient"}));
}

#[test]
fn test_update_broadcasts_over_lists() {
    let engine = FhirPathEngine::new();
    let mut observation = json!({
        "resourceType": "Observation",
        "identifier": [{"value": "A"}, {"value": "B"}]
    });
    engine
        .update(&parse("identifier.value"), &mut observation, json!("C"))
        .unwrap();
    assert_eq!(observation["identifier"][0]["value"], json!("C"));
    assert_eq!(observation["identifier"][1]["value"], json!("C"));
}

#[test]
fn test_update_broadcasts_over_unions() {
    let engine = FhirPathEngine::new();
    let mut patient = json!({
        "resourceType": "Patient",
        "name": [{"text": "John Doe"}, {"text": "Will Smith"}]
    });
    engine
        .update(
            &parse("Patient.name[0].text | Patient.name[1].text"),
            &mut patient,
            json!("Johnny Smith"),
        )
        .unwrap();
    assert_eq!(patient["name"][0]["text"], json!("Johnny Smith"));
    assert_eq!(patient["name"][1]["text"], json!("Johnny Smith"));
}

#[test]
fn test_update_through_where_filter() {
    let engine = FhirPathEngine::new();
    let mut patient = json!({
        "resourceType": "Patient",
        "name": [
            {"family": "Doe", "given": ["John"]},
            {"family": "Smith", "given": ["Will"]}
        ]
    });
    engine
        .update(
            &parse("Patient.name.where(family = 'Doe').given"),
            &mut patient,
            json!(["Johnny"]),
        )
        .unwrap();
    assert_eq!(patient["name"][0]["given"], json!(["Johnny"]));
    assert_eq!(patient["name"][1]["given"], json!(["Will"]));
}

#[test]
fn test_update_through_extension_filter() {
    let engine = FhirPathEngine::new();
    let mut patient = json!({
        "resourceType": "Patient",
        "extension": [{"url": "http://example.com/ext", "valueString": "old"}]
    });
    engine
        .update(
            &parse("Patient.extension('http://example.com/ext').valueString"),
            &mut patient,
            json!("new"),
        )
        .unwrap();
    assert_eq!(patient["extension"][0]["valueString"], json!("new"));
}

#[test]
fn test_create_missing_complex_element() {
    let engine = FhirPathEngine::new();
    let mut observation = json!({"resourceType": "Observation"});
    let items = engine
        .find_or_create(&parse("Observation.valueCodeableConcept"), &mut observation)
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(observation["valueCodeableConcept"], json!({}));
}

#[test]
fn test_create_missing_complex_list_element() {
    let engine = FhirPathEngine::new();
    let mut observation = json!({"resourceType": "Observation"});
    engine
        .find_or_create(&parse("Observation.component"), &mut observation)
        .unwrap();
    assert_eq!(observation["component"], json!([{}]));
}

#[test]
fn test_create_pads_list_to_index() {
    let engine = FhirPathEngine::new();
    let mut observation = json!({"resourceType": "Observation"});
    engine
        .update_or_create(
            &parse("Observation.component[2].valueString"),
            &mut observation,
            json!("c"),
        )
        .unwrap();

    let components = observation["component"].as_array().unwrap();
    assert_eq!(components.len(), 3);
    assert_eq!(components[0], json!({}));
    assert_eq!(components[1], json!({}));
    assert_eq!(components[2]["valueString"], json!("c"));
}

#[test]
fn test_create_is_idempotent() {
    let engine = FhirPathEngine::new();
    let expr = parse("Observation.component[2].valueString");

    let mut first = json!({"resourceType": "Observation"});
    engine.find_or_create(&expr, &mut first).unwrap();
    let mut second = first.clone();
    engine.find_or_create(&expr, &mut second).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_evaluate_update_duality() {
    let engine = FhirPathEngine::new();
    let expr = parse("Observation.component[2].valueString");
    let mut observation = json!({"resourceType": "Observation"});
    engine
        .update_or_create(&expr, &mut observation, json!("c"))
        .unwrap();
    assert_eq!(
        engine.get_value(&expr, &observation).unwrap(),
        Some(json!("c"))
    );
}

#[test]
fn test_out_of_range_read_does_not_modify() {
    let resource = json!({
        "resourceType": "Observation",
        "identifier": [{"value": "A"}]
    });
    assert_eq!(get(&resource, "identifier[5].value"), None);
    assert_eq!(resource["identifier"].as_array().unwrap().len(), 1);
}

#[test]
fn test_scalar_field_rejects_list_write() {
    let engine = FhirPathEngine::new();
    let mut patient = json!({"resourceType": "Patient", "id": "1"});
    let err = engine
        .update(&parse("Patient.id"), &mut patient, json!(["a", "b"]))
        .unwrap_err();
    assert!(err.to_string().contains("does not allow arrays"), "{err}");
}

#[test]
fn test_list_field_accepts_list_write() {
    let engine = FhirPathEngine::new();
    let mut patient = json!({"resourceType": "Patient"});
    engine
        .update_or_create(
            &parse("Patient.name"),
            &mut patient,
            json!([{"text": "John Doe"}, {"text": "Will Smith"}]),
        )
        .unwrap();
    assert_eq!(patient["name"].as_array().unwrap().len(), 2);
}

#[test]
fn test_create_primitive_element_defaults_to_null_slot() {
    let engine = FhirPathEngine::new();
    let mut observation = json!({"resourceType": "Observation"});
    let items = engine
        .find_or_create(&parse("Observation.valueString"), &mut observation)
        .unwrap();
    assert_eq!(items.len(), 1);
    assert!(observation.as_object().unwrap().contains_key("valueString"));
    assert_eq!(observation["valueString"], Value::Null);
}
