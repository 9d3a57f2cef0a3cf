//! The profile registry: compile cache with an explicit lifecycle.
//!
//! The registry is the only shared mutable state in the engine. The
//! cache is read-through: `compile(url)` returns a cached entry when
//! present, otherwise fetches, compiles and memoises. A single mutex
//! serialises writers; clones of the returned `Arc` are free.

use crate::error::{ProfileError, Result};
use crate::model::{compile_model, ProfileModel, ProfileResolver};
use crate::structure::{StructureDefinition, StructureDefinitionIngestor};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use tracing::debug;

const DEFAULT_CACHE_CAPACITY: usize = 100;

pub struct ProfileRegistry {
    ingestor: StructureDefinitionIngestor,
    cache: Mutex<LruCache<String, Arc<ProfileModel>>>,
    hits: Mutex<usize>,
    misses: Mutex<usize>,
}

impl ProfileRegistry {
    pub fn new() -> Result<Self> {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| ProfileError::compile("Cache capacity must be non-zero"))?;
        Ok(Self {
            ingestor: StructureDefinitionIngestor::new()?,
            cache: Mutex::new(LruCache::new(capacity)),
            hits: Mutex::new(0),
            misses: Mutex::new(0),
        })
    }

    /// Compile the profile behind a canonical URL, read-through cached.
    pub fn compile(&self, canonical_url: &str) -> Result<Arc<ProfileModel>> {
        if let Some(cached) = self.cache.lock().unwrap().get(canonical_url) {
            *self.hits.lock().unwrap() += 1;
            return Ok(Arc::clone(cached));
        }
        *self.misses.lock().unwrap() += 1;

        let definition = self.ingestor.fetch(canonical_url)?;
        self.compile_definition(&definition)
    }

    /// Compile a pre-parsed StructureDefinition and memoise it under
    /// its canonical URL.
    pub fn compile_definition(
        &self,
        definition: &StructureDefinition,
    ) -> Result<Arc<ProfileModel>> {
        if let Some(cached) = self.cache.lock().unwrap().get(&definition.url) {
            return Ok(Arc::clone(cached));
        }
        debug!(url = %definition.url, name = %definition.name, "compiling profile");
        let model = Arc::new(compile_model(definition, self)?);
        self.cache
            .lock()
            .unwrap()
            .put(definition.url.clone(), Arc::clone(&model));
        Ok(model)
    }

    /// Drop every cached model.
    pub fn clear(&self) {
        self.cache.lock().unwrap().clear();
    }

    /// `(hits, misses, hit_rate)` of the compile cache.
    pub fn cache_metrics(&self) -> (usize, usize, f64) {
        let hits = *self.hits.lock().unwrap();
        let misses = *self.misses.lock().unwrap();
        let total = hits + misses;
        let rate = if total > 0 {
            hits as f64 / total as f64
        } else {
            0.0
        };
        (hits, misses, rate)
    }
}

impl ProfileResolver for ProfileRegistry {
    fn resolve_profile(&self, canonical_url: &str) -> Result<Arc<ProfileModel>> {
        self.compile(canonical_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_definition(url: &str) -> StructureDefinition {
        serde_json::from_value(json!({
            "url": url,
            "name": "MinimalObservation",
            "type": "Observation",
            "kind": "resource",
            "snapshot": {"element": [
                {"id": "Observation", "path": "Observation"},
                {"id": "Observation.status", "path": "Observation.status",
                 "min": 1, "max": "1", "type": [{"code": "code"}]}
            ]}
        }))
        .unwrap()
    }

    #[test]
    fn test_compile_definition_is_memoised() {
        let registry = ProfileRegistry::new().unwrap();
        let definition = minimal_definition("https://example.org/StructureDefinition/minimal");
        let first = registry.compile_definition(&definition).unwrap();
        let second = registry.compile("https://example.org/StructureDefinition/minimal").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        let (hits, _, _) = registry.cache_metrics();
        assert!(hits >= 1);
    }

    #[test]
    fn test_clear_empties_the_cache() {
        let registry = ProfileRegistry::new().unwrap();
        let definition = minimal_definition("https://example.org/StructureDefinition/cleared");
        registry.compile_definition(&definition).unwrap();
        registry.clear();
        // A fresh compile of the same definition is required after clear
        let recompiled = registry.compile_definition(&definition).unwrap();
        assert_eq!(recompiled.name, "MinimalObservation");
    }
}
