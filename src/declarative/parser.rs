//! # Manifest Parser
//!
//! Reads rendered multi-document YAML into dynamic objects. Parsed results
//! are cached per path for a bounded time and can be evicted explicitly when
//! the engine suspects a stale entry.

use crate::declarative::errors::Error;
use crate::declarative::spec::Spec;
use async_trait::async_trait;
use kube::core::DynamicObject;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// Turns a [`Spec`] into resource documents
#[async_trait]
pub trait ManifestParser: Send + Sync {
    async fn parse(&self, spec: &Spec) -> Result<Vec<DynamicObject>, Error>;

    /// Forget any cached result for the spec's path
    fn evict_cache(&self, spec: &Spec);
}

struct CacheEntry {
    resources: Vec<DynamicObject>,
    parsed_at: Instant,
}

/// File-backed parser with a TTL cache keyed by path
pub struct CachedManifestParser {
    ttl: Duration,
    cache: Mutex<HashMap<PathBuf, CacheEntry>>,
}

impl std::fmt::Debug for CachedManifestParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedManifestParser")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl CachedManifestParser {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn cached(&self, path: &Path) -> Option<Vec<DynamicObject>> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        match cache.get(path) {
            Some(entry) if entry.parsed_at.elapsed() < self.ttl => Some(entry.resources.clone()),
            Some(_) => {
                cache.remove(path);
                None
            }
            None => None,
        }
    }

    /// Insert a fresh entry, dropping every expired one; paths of superseded
    /// content refs are never read again
    fn store(&self, path: PathBuf, resources: Vec<DynamicObject>) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.retain(|_, entry| entry.parsed_at.elapsed() < self.ttl);
        cache.insert(
            path,
            CacheEntry {
                resources,
                parsed_at: Instant::now(),
            },
        );
    }

    /// Number of cached manifests, expired ones included
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ManifestParser for CachedManifestParser {
    async fn parse(&self, spec: &Spec) -> Result<Vec<DynamicObject>, Error> {
        if let Some(resources) = self.cached(&spec.path) {
            debug!(path = %spec.path.display(), "manifest cache hit");
            return Ok(resources);
        }

        let content = tokio::fs::read_to_string(&spec.path)
            .await
            .map_err(|e| parse_error(&spec.path, e))?;
        let resources = parse_documents(&content).map_err(|e| parse_error(&spec.path, e))?;

        debug!(path = %spec.path.display(), count = resources.len(), "parsed manifest");
        self.store(spec.path.clone(), resources.clone());
        Ok(resources)
    }

    fn evict_cache(&self, spec: &Spec) {
        let removed = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&spec.path)
            .is_some();
        debug!(path = %spec.path.display(), removed, "evicted manifest cache entry");
    }
}

fn parse_error(path: &Path, err: impl std::fmt::Display) -> Error {
    Error::Parse {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

/// Parse multi-document YAML, skipping empty documents
pub fn parse_documents(content: &str) -> Result<Vec<DynamicObject>, String> {
    let mut resources = Vec::new();
    for document in serde_yaml::Deserializer::from_str(content) {
        let value = serde_yaml::Value::deserialize(document).map_err(|e| e.to_string())?;
        if value.is_null() {
            continue;
        }
        let object: DynamicObject = serde_yaml::from_value(value).map_err(|e| e.to_string())?;
        let Some(types) = &object.types else {
            return Err("document without apiVersion and kind".to_string());
        };
        if object.metadata.name.is_none() {
            return Err(format!("{} without metadata.name", types.kind));
        }
        resources.push(object);
    }
    Ok(resources)
}
