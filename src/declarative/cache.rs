//! # Client Cache
//!
//! Keeps one cluster client per target so reconciles do not reconnect.
//! Entries are dropped explicitly when a client hits auth or connectivity
//! failures.

use crate::constants::CLUSTER_NAME_LABEL;
use crate::declarative::client::ClusterClient;
use crate::declarative::object::Object;
use kube::ResourceExt;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Key of a cached client
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientCacheKey {
    pub target: String,
    pub namespace: String,
}

impl fmt::Display for ClientCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.target)
    }
}

/// Derives a cache key from an object; `None` disables caching for it
pub type CacheKeyFn<K> = Arc<dyn Fn(&K) -> Option<ClientCacheKey> + Send + Sync>;

/// Key on the cluster-name label, falling back to the object's own name
pub fn default_cache_key<K: Object>(obj: &K) -> Option<ClientCacheKey> {
    let target = obj
        .labels()
        .get(CLUSTER_NAME_LABEL)
        .cloned()
        .unwrap_or_else(|| obj.name_any());
    Some(ClientCacheKey {
        target,
        namespace: obj.namespace().unwrap_or_default(),
    })
}

/// Concurrent map of cluster clients
#[derive(Default)]
pub struct ClientCache {
    clients: RwLock<HashMap<ClientCacheKey, Arc<dyn ClusterClient>>>,
}

impl fmt::Debug for ClientCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCache")
            .field("entries", &self.len())
            .finish()
    }
}

impl ClientCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &ClientCacheKey) -> Option<Arc<dyn ClusterClient>> {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn add(&self, key: ClientCacheKey, client: Arc<dyn ClusterClient>) {
        self.clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, client);
    }

    /// Drop an entry; returns whether one existed
    pub fn delete(&self, key: &ClientCacheKey) -> bool {
        self.clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
