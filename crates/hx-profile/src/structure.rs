//! StructureDefinition ingestion.
//!
//! Accepts either a pre-parsed StructureDefinition document or a URL.
//! The snapshot element list is normalised into a tree whose edges
//! follow dotted paths; slice definitions (elements whose `id` carries a
//! `:<sliceName>` marker) are attached under a `slices` map on their
//! parent node.

use crate::error::{ProfileError, Result};
use hx_foundation::{ErrorContext, HttpClient};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureDefinition {
    pub url: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(rename = "baseDefinition")]
    pub base_definition: Option<String>,
    pub version: Option<String>,
    pub snapshot: Option<Snapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub element: Vec<ElementDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementDefinition {
    pub path: String,
    pub id: Option<String>,
    pub min: Option<u32>,
    pub max: Option<String>,
    #[serde(rename = "type")]
    pub type_: Option<Vec<ElementType>>,
    pub short: Option<String>,
    #[serde(rename = "sliceName")]
    pub slice_name: Option<String>,
    pub slicing: Option<ElementSlicing>,
    pub constraint: Option<Vec<ElementConstraint>>,
    pub binding: Option<ElementBinding>,
    /// Remaining members, notably the `fixed[X]` / `pattern[X]` pairs
    /// whose member name carries the value's type.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ElementDefinition {
    /// The last segment of the dotted path.
    pub fn name(&self) -> &str {
        self.path.rsplit('.').next().unwrap_or(&self.path)
    }

    /// The `<suffix, value>` of the first member starting with `prefix`
    /// (`pattern` or `fixed`).
    fn typed_member(&self, prefix: &str) -> Option<(String, &Value)> {
        self.extra.iter().find_map(|(key, value)| {
            key.strip_prefix(prefix)
                .filter(|suffix| !suffix.is_empty())
                .map(|suffix| (suffix.to_string(), value))
        })
    }

    /// The `pattern[X]` member, as `(type-suffix, value)`.
    pub fn pattern(&self) -> Option<(String, &Value)> {
        self.typed_member("pattern")
    }

    /// The `fixed[X]` member, as `(type-suffix, value)`.
    pub fn fixed(&self) -> Option<(String, &Value)> {
        self.typed_member("fixed")
    }

    /// True when the element id references a slice (`:<name>`).
    pub fn is_slice_element(&self) -> bool {
        self.id.as_deref().map(|id| id.contains(':')).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementType {
    pub code: String,
    pub profile: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementSlicing {
    pub discriminator: Option<Vec<ElementDiscriminator>>,
    pub rules: Option<String>,
    pub ordered: Option<bool>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementDiscriminator {
    #[serde(rename = "type")]
    pub type_: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementConstraint {
    pub key: String,
    pub severity: String,
    pub human: String,
    pub expression: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementBinding {
    pub strength: String,
    #[serde(rename = "valueSet")]
    pub value_set: Option<String>,
}

/// One node of the normalised element tree.
#[derive(Debug, Clone, Default)]
pub struct ElementNode {
    pub definition: Option<ElementDefinition>,
    pub children: IndexMap<String, ElementNode>,
    /// Slice subtrees keyed by slice name, attached to the sliced node.
    pub slices: IndexMap<String, ElementNode>,
}

impl ElementNode {
    fn child_at_path(&mut self, segments: &[&str]) -> &mut ElementNode {
        let mut current = self;
        for segment in segments {
            current = current.children.entry(segment.to_string()).or_default();
        }
        current
    }
}

/// Build the element tree from a snapshot element list.
pub fn build_element_tree(elements: &[ElementDefinition]) -> ElementNode {
    let mut root = ElementNode::default();
    for element in elements {
        let segments: Vec<&str> = element.path.split('.').collect();
        match element.id.as_deref().and_then(|id| id.split_once(':')) {
            None => {
                let node = root.child_at_path(&segments);
                node.definition = Some(element.clone());
            }
            Some((prefix, rest)) => {
                // "Observation.component:sys.code" — attach under the
                // sliced node's slices map, then walk the remainder
                let parent_segments: Vec<&str> = prefix.split('.').collect();
                let parent = root.child_at_path(&parent_segments);
                let (slice_name, remainder) = match rest.split_once('.') {
                    Some((name, tail)) => (name, Some(tail)),
                    None => (rest, None),
                };
                let slice_root = parent.slices.entry(slice_name.to_string()).or_default();
                let node = match remainder {
                    Some(tail) => {
                        let tail_segments: Vec<&str> = tail.split('.').collect();
                        slice_root.child_at_path(&tail_segments)
                    }
                    None => slice_root,
                };
                node.definition = Some(element.clone());
            }
        }
    }
    debug!(
        elements = elements.len(),
        "built element tree from snapshot"
    );
    root
}

/// StructureDefinition retrieval with the HL7 publication URL mapping.
pub struct StructureDefinitionIngestor {
    client: HttpClient,
}

impl StructureDefinitionIngestor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: HttpClient::new()?,
        })
    }

    /// Map a canonical profile URL to the JSON document URL:
    /// - URLs ending in `.json` are fetched directly
    /// - `http://hl7.org/fhir/StructureDefinition/<name>` maps to the
    ///   HL7 publication JSON for the active release
    /// - anything else gets `-<lowercased-last-segment>.json` appended
    pub fn resolve_url(profile_url: &str) -> String {
        if profile_url.ends_with(".json") {
            return profile_url.to_string();
        }
        if let Some(name) = profile_url.strip_prefix("http://hl7.org/fhir/StructureDefinition/") {
            let release = hx_datatypes::active_release();
            return format!(
                "https://hl7.org/fhir/{release}/extension-{}.json",
                name.to_lowercase()
            );
        }
        match profile_url.rsplit_once('/') {
            Some((domain, resource)) => {
                format!("{domain}-{}.json", resource.to_lowercase())
            }
            None => format!("{profile_url}.json"),
        }
    }

    /// Fetch and parse the StructureDefinition behind a profile URL.
    pub fn fetch(&self, profile_url: &str) -> Result<StructureDefinition> {
        let json_url = Self::resolve_url(profile_url);
        debug!(%profile_url, %json_url, "fetching StructureDefinition");
        let definition: StructureDefinition = self
            .client
            .download_json(&json_url)
            .with_context(|| format!("Retrieving StructureDefinition {profile_url} from {json_url}"))
            .map_err(|e| ProfileError::ingestion(e.to_string()))?;
        Ok(definition)
    }
}

/// Parse a StructureDefinition from an already-loaded JSON document.
pub fn parse_structure_definition(document: &Value) -> Result<StructureDefinition> {
    Ok(serde_json::from_value(document.clone())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn element(id: &str, path: &str) -> ElementDefinition {
        serde_json::from_value(json!({"id": id, "path": path, "min": 0, "max": "1"})).unwrap()
    }

    #[test]
    fn test_url_resolution() {
        assert_eq!(
            StructureDefinitionIngestor::resolve_url("https://x.org/sd/profile.json"),
            "https://x.org/sd/profile.json"
        );
        assert_eq!(
            StructureDefinitionIngestor::resolve_url(
                "http://hl7.org/fhir/StructureDefinition/patient-birthPlace"
            ),
            "https://hl7.org/fhir/R4B/extension-patient-birthplace.json"
        );
        assert_eq!(
            StructureDefinitionIngestor::resolve_url("https://fhir.com/StructureDefinition/MyProfile"),
            "https://fhir.com/StructureDefinition-myprofile.json"
        );
    }

    #[test]
    fn test_pattern_and_fixed_capture() {
        let element: ElementDefinition = serde_json::from_value(json!({
            "id": "Observation.code",
            "path": "Observation.code",
            "patternCodeableConcept": {"coding": [{"code": "sys"}]}
        }))
        .unwrap();
        let (suffix, value) = element.pattern().unwrap();
        assert_eq!(suffix, "CodeableConcept");
        assert_eq!(value, &json!({"coding": [{"code": "sys"}]}));
        assert!(element.fixed().is_none());
    }

    #[test]
    fn test_tree_building_with_slices() {
        let elements = vec![
            element("Observation", "Observation"),
            element("Observation.component", "Observation.component"),
            element("Observation.component.code", "Observation.component.code"),
            element("Observation.component:sys", "Observation.component"),
            element("Observation.component:sys.code", "Observation.component.code"),
        ];
        let tree = build_element_tree(&elements);
        let observation = &tree.children["Observation"];
        let component = &observation.children["component"];
        assert!(component.definition.is_some());
        assert!(component.children.contains_key("code"));
        let slice = &component.slices["sys"];
        assert!(slice.definition.is_some());
        assert!(slice.children.contains_key("code"));
    }

    #[test]
    fn test_slice_detection() {
        assert!(element("Observation.component:sys", "Observation.component").is_slice_element());
        assert!(!element("Observation.component", "Observation.component").is_slice_element());
    }
}
