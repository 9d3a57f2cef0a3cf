//! End-to-end tests of the profiled-resource runtime: skeleton
//! construction, mutation tracking and slice cleanup.

use hx_fhirpath::{FhirPathEngine, FhirPathParser};
use hx_profile::{ProfileRegistry, ProfileRuntime, StructureDefinition};
use serde_json::{json, Value};
use std::sync::Arc;

fn definition(document: Value) -> StructureDefinition {
    serde_json::from_value(document).unwrap()
}

fn bp_profile() -> StructureDefinition {
    definition(json!({
        "url": "https://example.org/StructureDefinition/bp-profile",
        "name": "BloodPressureProfile",
        "type": "Observation",
        "kind": "resource",
        "version": "1.0.0",
        "baseDefinition": "http://hl7.org/fhir/StructureDefinition/Observation",
        "snapshot": {"element": [
            {"id": "Observation", "path": "Observation"},
            {"id": "Observation.status", "path": "Observation.status",
             "min": 1, "max": "1", "type": [{"code": "code"}]},
            {"id": "Observation.code", "path": "Observation.code",
             "min": 1, "max": "1", "type": [{"code": "CodeableConcept"}],
             "patternCodeableConcept": {"coding": [{"code": "85354-9", "system": "http://loinc.org"}]}},
            {"id": "Observation.component", "path": "Observation.component",
             "min": 0, "max": "*", "type": [{"code": "BackboneElement"}],
             "slicing": {"discriminator": [{"type": "pattern", "path": "code"}], "rules": "open"}},
            {"id": "Observation.component.code", "path": "Observation.component.code",
             "min": 1, "max": "1", "type": [{"code": "CodeableConcept"}]},
            {"id": "Observation.component.value[x]", "path": "Observation.component.value[x]",
             "min": 0, "max": "1", "type": [{"code": "Quantity"}]},
            {"id": "Observation.component:systolic", "path": "Observation.component",
             "sliceName": "systolic", "min": 1, "max": "1", "type": [{"code": "BackboneElement"}]},
            {"id": "Observation.component:systolic.code", "path": "Observation.component.code",
             "min": 1, "max": "1", "type": [{"code": "CodeableConcept"}],
             "patternCodeableConcept": {"coding": [{"code": "sys"}]}},
            {"id": "Observation.component:diastolic", "path": "Observation.component",
             "sliceName": "diastolic", "min": 1, "max": "1", "type": [{"code": "BackboneElement"}]},
            {"id": "Observation.component:diastolic.code", "path": "Observation.component.code",
             "min": 1, "max": "1", "type": [{"code": "CodeableConcept"}],
             "patternCodeableConcept": {"coding": [{"code": "dia"}]}}
        ]}
    }))
}

fn repeating_slice_profile() -> StructureDefinition {
    definition(json!({
        "url": "https://example.org/StructureDefinition/multi-component",
        "name": "MultiComponentProfile",
        "type": "Observation",
        "kind": "resource",
        "snapshot": {"element": [
            {"id": "Observation", "path": "Observation"},
            {"id": "Observation.component", "path": "Observation.component",
             "min": 0, "max": "*", "type": [{"code": "BackboneElement"}],
             "slicing": {"discriminator": [{"type": "pattern", "path": "code"}], "rules": "open"}},
            {"id": "Observation.component.code", "path": "Observation.component.code",
             "min": 1, "max": "1", "type": [{"code": "CodeableConcept"}]},
            {"id": "Observation.component.value[x]", "path": "Observation.component.value[x]",
             "min": 0, "max": "1", "type": [{"code": "Quantity"}, {"code": "string"}]},
            {"id": "Observation.component:reading", "path": "Observation.component",
             "sliceName": "reading", "min": 0, "max": "*", "type": [{"code": "BackboneElement"}]},
            {"id": "Observation.component:reading.code", "path": "Observation.component.code",
             "min": 1, "max": "1", "type": [{"code": "CodeableConcept"}],
             "patternCodeableConcept": {"coding": [{"code": "reading"}]}}
        ]}
    }))
}

#[test]
fn test_skeleton_presets_and_slice_placeholders() {
    let registry = ProfileRegistry::new().unwrap();
    let model = registry.compile_definition(&bp_profile()).unwrap();
    let runtime = ProfileRuntime::new();

    let resource = runtime.construct_with_profiled_elements(&model).unwrap();

    assert_eq!(resource["resourceType"], json!("Observation"));
    assert_eq!(
        resource["meta"]["profile"],
        json!(["https://example.org/StructureDefinition/bp-profile"])
    );
    // Global pattern preset applied
    assert_eq!(
        resource["code"],
        json!({"coding": [{"code": "85354-9", "system": "http://loinc.org"}]})
    );
    // One placeholder per slice, in declaration order
    let components = resource["component"].as_array().unwrap();
    assert_eq!(components.len(), 2);
    assert_eq!(components[0]["code"]["coding"][0]["code"], json!("sys"));
    assert_eq!(components[1]["code"]["coding"][0]["code"], json!("dia"));
}

#[test]
fn test_slicing_round_trip_removes_untouched_placeholder() {
    let registry = ProfileRegistry::new().unwrap();
    let model = registry.compile_definition(&bp_profile()).unwrap();
    let runtime = ProfileRuntime::new();
    let parser = FhirPathParser::new();
    let engine = FhirPathEngine::new();

    let mut resource = runtime.construct_with_profiled_elements(&model).unwrap();
    let journal = runtime.track_slice_changes(&resource, &model).unwrap();

    // Fill the systolic placeholder, leave diastolic untouched
    let write = parser
        .parse("Observation.component.where(code.coding.code = 'sys').valueQuantity.value")
        .unwrap();
    engine
        .update_or_create(&write, &mut resource, json!(120))
        .unwrap();

    runtime
        .clean_elements_and_slices(&mut resource, &model, &journal)
        .unwrap();

    let components = resource["component"].as_array().unwrap();
    assert_eq!(components.len(), 1, "diastolic placeholder must be pruned");
    assert_eq!(components[0]["code"]["coding"][0]["code"], json!("sys"));
    assert_eq!(components[0]["valueQuantity"]["value"], json!(120));
}

#[test]
fn test_retained_slices_match_their_discriminating_expression() {
    let registry = ProfileRegistry::new().unwrap();
    let model = registry.compile_definition(&bp_profile()).unwrap();
    let runtime = ProfileRuntime::new();
    let parser = FhirPathParser::new();
    let engine = FhirPathEngine::new();

    let mut resource = runtime.construct_with_profiled_elements(&model).unwrap();
    let journal = runtime.track_slice_changes(&resource, &model).unwrap();
    let write = parser
        .parse("Observation.component.where(code.coding.code = 'sys').valueQuantity.value")
        .unwrap();
    engine
        .update_or_create(&write, &mut resource, json!(120))
        .unwrap();
    runtime
        .clean_elements_and_slices(&mut resource, &model, &journal)
        .unwrap();

    let group = &model.slicing[0];
    let systolic = group.slice_by_name("systolic").unwrap();
    let expr = parser.parse(&group.full_fhir_path(systolic)).unwrap();
    let matched = engine.find(&expr, &resource).unwrap();
    assert_eq!(matched.len(), 1);
    assert_eq!(matched[0].value["valueQuantity"]["value"], json!(120));
}

#[test]
fn test_cleanup_is_a_fixpoint() {
    let registry = ProfileRegistry::new().unwrap();
    let model = registry.compile_definition(&bp_profile()).unwrap();
    let runtime = ProfileRuntime::new();
    let parser = FhirPathParser::new();
    let engine = FhirPathEngine::new();

    let mut resource = runtime.construct_with_profiled_elements(&model).unwrap();
    let journal = runtime.track_slice_changes(&resource, &model).unwrap();
    let write = parser
        .parse("Observation.component.where(code.coding.code = 'sys').valueQuantity.value")
        .unwrap();
    engine
        .update_or_create(&write, &mut resource, json!(120))
        .unwrap();

    runtime
        .clean_elements_and_slices(&mut resource, &model, &journal)
        .unwrap();
    let once = resource.clone();
    runtime
        .clean_elements_and_slices(&mut resource, &model, &journal)
        .unwrap();
    assert_eq!(resource, once, "cleanup must be a fixpoint after one application");
}

#[test]
fn test_cleanup_without_changes_drops_all_placeholders() {
    let registry = ProfileRegistry::new().unwrap();
    let model = registry.compile_definition(&bp_profile()).unwrap();
    let runtime = ProfileRuntime::new();

    let mut resource = runtime.construct_with_profiled_elements(&model).unwrap();
    let journal = runtime.track_slice_changes(&resource, &model).unwrap();
    let before = resource["component"].as_array().unwrap().len();
    runtime
        .clean_elements_and_slices(&mut resource, &model, &journal)
        .unwrap();

    let after = resource
        .get("component")
        .and_then(|c| c.as_array())
        .map(|c| c.len())
        .unwrap_or(0);
    assert!(after <= before, "cleanup is monotone non-increasing");
    assert_eq!(after, 0);
}

#[test]
fn test_repeating_slice_gets_placeholder_copies() {
    let registry = ProfileRegistry::new().unwrap();
    let model = registry
        .compile_definition(&repeating_slice_profile())
        .unwrap();

    let runtime = ProfileRuntime::new().with_slice_copies(4);
    let resource = runtime.construct_with_profiled_elements(&model).unwrap();
    // max is unbounded, so the tunable cap decides the copy count
    assert_eq!(resource["component"].as_array().unwrap().len(), 4);

    let runtime = ProfileRuntime::new();
    let resource = runtime.construct_with_profiled_elements(&model).unwrap();
    assert_eq!(resource["component"].as_array().unwrap().len(), 9);
}

#[test]
fn test_extension_slice_expands_nested_profile() {
    let registry = Arc::new(ProfileRegistry::new().unwrap());

    let importance = definition(json!({
        "url": "https://example.org/StructureDefinition/patient-importance",
        "name": "PatientImportance",
        "type": "Extension",
        "kind": "complex-type",
        "snapshot": {"element": [
            {"id": "Extension", "path": "Extension"},
            {"id": "Extension.url", "path": "Extension.url",
             "min": 1, "max": "1", "type": [{"code": "uri"}],
             "fixedUri": "https://example.org/StructureDefinition/patient-importance"},
            {"id": "Extension.value[x]", "path": "Extension.value[x]",
             "min": 0, "max": "1", "type": [{"code": "CodeableConcept"}]}
        ]}
    }));
    registry.compile_definition(&importance).unwrap();

    let patient_profile = definition(json!({
        "url": "https://example.org/StructureDefinition/vip-patient",
        "name": "VipPatient",
        "type": "Patient",
        "kind": "resource",
        "snapshot": {"element": [
            {"id": "Patient", "path": "Patient"},
            {"id": "Patient.extension", "path": "Patient.extension",
             "min": 0, "max": "*", "type": [{"code": "Extension"}],
             "slicing": {"discriminator": [{"type": "value", "path": "url"}], "rules": "open"}},
            {"id": "Patient.extension:importance", "path": "Patient.extension",
             "sliceName": "importance", "min": 0, "max": "1",
             "type": [{"code": "Extension",
                       "profile": ["https://example.org/StructureDefinition/patient-importance"]}]}
        ]}
    }));
    let model = registry.compile_definition(&patient_profile).unwrap();

    // The discriminating expression selects the extension by its
    // nested profile's canonical URL
    let group = &model.slicing[0];
    let slice = group.slice_by_name("importance").unwrap();
    assert_eq!(
        group.full_fhir_path(slice),
        "Patient.extension('https://example.org/StructureDefinition/patient-importance')"
    );

    let runtime = ProfileRuntime::new();
    let resource = runtime.construct_with_profiled_elements(&model).unwrap();
    let extensions = resource["extension"].as_array().unwrap();
    assert_eq!(extensions.len(), 1);
    assert_eq!(
        extensions[0]["url"],
        json!("https://example.org/StructureDefinition/patient-importance")
    );
}

#[test]
fn test_track_and_clean_retains_new_conforming_instances() {
    let registry = ProfileRegistry::new().unwrap();
    let model = registry
        .compile_definition(&repeating_slice_profile())
        .unwrap();
    let runtime = ProfileRuntime::new().with_slice_copies(2);
    let parser = FhirPathParser::new();
    let engine = FhirPathEngine::new();

    let mut resource = runtime.construct_with_profiled_elements(&model).unwrap();
    let journal = runtime.track_slice_changes(&resource, &model).unwrap();

    // Fill the first placeholder only
    let write = parser.parse("Observation.component[0].valueString").unwrap();
    engine
        .update_or_create(&write, &mut resource, json!("first reading"))
        .unwrap();

    runtime
        .clean_elements_and_slices(&mut resource, &model, &journal)
        .unwrap();
    let components = resource["component"].as_array().unwrap();
    assert_eq!(components.len(), 1);
    assert_eq!(components[0]["valueString"], json!("first reading"));
}
