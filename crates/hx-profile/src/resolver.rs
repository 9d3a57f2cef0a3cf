//! Profile-aware target for the FHIRPath `resolve()` function.
//!
//! Resolved resources that declare a profile in `meta.profile` are
//! validated against the compiled profile before being returned.

use crate::registry::ProfileRegistry;
use hx_fhirpath::{FhirPathError, FhirPathResult, ReferenceResolver};
use hx_foundation::{ErrorContext, HttpClient};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

pub struct ProfileAwareResolver {
    registry: Arc<ProfileRegistry>,
    client: HttpClient,
}

impl ProfileAwareResolver {
    pub fn new(registry: Arc<ProfileRegistry>) -> FhirPathResult<Self> {
        let client = HttpClient::new()?;
        Ok(Self { registry, client })
    }
}

impl ReferenceResolver for ProfileAwareResolver {
    fn resolve_reference(&self, reference: &str) -> FhirPathResult<Value> {
        let resource: Value = self
            .client
            .download_json(reference)
            .with_context(|| format!("Resolving reference {reference}"))?;
        let profile_url = resource
            .get("meta")
            .and_then(|m| m.get("profile"))
            .and_then(|p| p.as_array())
            .and_then(|urls| urls.first())
            .and_then(|u| u.as_str());

        if let Some(profile_url) = profile_url {
            debug!(%reference, %profile_url, "validating resolved resource against its profile");
            let model = self.registry.compile(profile_url).map_err(|e| {
                FhirPathError::evaluation_error(format!(
                    "Failed to compile profile {profile_url}: {e}"
                ))
            })?;
            model.model_validate(&resource).map_err(|e| {
                FhirPathError::evaluation_error(format!(
                    "Resolved resource does not conform to {profile_url}: {e}"
                ))
            })?;
        }

        Ok(resource)
    }
}
