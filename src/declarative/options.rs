//! # Engine Options
//!
//! Collaborators and tunables of an [`Engine`](crate::declarative::reconciler::Engine).
//! Everything shared across reconciles (caches, clients) is injected here at
//! construction time.

use crate::constants::{
    DEFAULT_FIELD_OWNER, DEFAULT_FINALIZER, DEFAULT_INTENDED_REQUEUE_SECS,
    DEFAULT_SUCCESS_REQUEUE_SECS, DEFAULT_TARGET_NAMESPACE, SKIP_RECONCILIATION_LABEL,
};
use crate::declarative::cache::{default_cache_key, CacheKeyFn, ClientCache};
use crate::declarative::factory::{ClusterClientFactory, TargetClusterResolver};
use crate::declarative::hooks::{DeletionCheck, Hook};
use crate::declarative::object::{Object, ObjectStore};
use crate::declarative::parser::ManifestParser;
use crate::declarative::readiness::{ExistsReadyCheck, ReadyCheck};
use crate::declarative::spec::SpecResolver;
use crate::declarative::transform::ObjectTransform;
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Duration;

/// Predicate vetoing a reconciliation for this cycle
pub type SkipFn<K> = Arc<dyn Fn(&K) -> bool + Send + Sync>;

/// Skip objects labelled with the skip-reconciliation label set to `"true"`
pub fn skip_labelled<K: Object>(obj: &K) -> bool {
    obj.labels()
        .get(SKIP_RECONCILIATION_LABEL)
        .is_some_and(|v| v == "true")
}

pub struct Options<K: Object> {
    pub store: Arc<dyn ObjectStore<K>>,
    pub spec_resolver: Arc<dyn SpecResolver<K>>,
    pub parser: Arc<dyn ManifestParser>,
    pub target_cluster: Arc<dyn TargetClusterResolver<K>>,
    pub client_factory: Arc<dyn ClusterClientFactory>,
    pub client_cache: Arc<ClientCache>,
    pub cache_key: CacheKeyFn<K>,
    /// Applied in order to rendered documents
    pub transforms: Vec<Arc<dyn ObjectTransform<K>>>,
    pub ready_check: Arc<dyn ReadyCheck<K>>,
    /// Consulted while deleting; `None` means nothing guards deletion
    pub deletion_check: Option<Arc<dyn DeletionCheck<K>>>,
    pub post_run_hooks: Vec<Arc<dyn Hook<K>>>,
    pub pre_delete_hooks: Vec<Arc<dyn Hook<K>>>,
    pub skip: SkipFn<K>,
    pub finalizer: String,
    pub field_owner: String,
    /// Namespace for rendered resources that omit one
    pub target_namespace: String,
    pub success_interval: Duration,
    pub intended_interval: Duration,
}

impl<K: Object> std::fmt::Debug for Options<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("finalizer", &self.finalizer)
            .field("field_owner", &self.field_owner)
            .field("target_namespace", &self.target_namespace)
            .field(
                "transforms",
                &self.transforms.iter().map(|t| t.name().to_string()).collect::<Vec<_>>(),
            )
            .field("success_interval", &self.success_interval)
            .field("intended_interval", &self.intended_interval)
            .finish_non_exhaustive()
    }
}

impl<K: Object> Options<K> {
    /// Options with the mandatory collaborators and defaults for the rest
    pub fn new(
        store: Arc<dyn ObjectStore<K>>,
        spec_resolver: Arc<dyn SpecResolver<K>>,
        parser: Arc<dyn ManifestParser>,
        target_cluster: Arc<dyn TargetClusterResolver<K>>,
        client_factory: Arc<dyn ClusterClientFactory>,
    ) -> Self {
        Self {
            store,
            spec_resolver,
            parser,
            target_cluster,
            client_factory,
            client_cache: Arc::new(ClientCache::new()),
            cache_key: Arc::new(default_cache_key::<K>),
            transforms: Vec::new(),
            ready_check: Arc::new(ExistsReadyCheck),
            deletion_check: None,
            post_run_hooks: Vec::new(),
            pre_delete_hooks: Vec::new(),
            skip: Arc::new(skip_labelled::<K>),
            finalizer: DEFAULT_FINALIZER.to_string(),
            field_owner: DEFAULT_FIELD_OWNER.to_string(),
            target_namespace: DEFAULT_TARGET_NAMESPACE.to_string(),
            success_interval: Duration::from_secs(DEFAULT_SUCCESS_REQUEUE_SECS),
            intended_interval: Duration::from_secs(DEFAULT_INTENDED_REQUEUE_SECS),
        }
    }

    #[must_use]
    pub fn with_client_cache(mut self, cache: Arc<ClientCache>) -> Self {
        self.client_cache = cache;
        self
    }

    #[must_use]
    pub fn with_cache_key(mut self, cache_key: CacheKeyFn<K>) -> Self {
        self.cache_key = cache_key;
        self
    }

    #[must_use]
    pub fn with_transform(mut self, transform: Arc<dyn ObjectTransform<K>>) -> Self {
        self.transforms.push(transform);
        self
    }

    #[must_use]
    pub fn with_ready_check(mut self, check: Arc<dyn ReadyCheck<K>>) -> Self {
        self.ready_check = check;
        self
    }

    #[must_use]
    pub fn with_deletion_check(mut self, check: Arc<dyn DeletionCheck<K>>) -> Self {
        self.deletion_check = Some(check);
        self
    }

    #[must_use]
    pub fn with_post_run_hook(mut self, hook: Arc<dyn Hook<K>>) -> Self {
        self.post_run_hooks.push(hook);
        self
    }

    #[must_use]
    pub fn with_pre_delete_hook(mut self, hook: Arc<dyn Hook<K>>) -> Self {
        self.pre_delete_hooks.push(hook);
        self
    }

    #[must_use]
    pub fn with_skip(mut self, skip: SkipFn<K>) -> Self {
        self.skip = skip;
        self
    }

    #[must_use]
    pub fn with_finalizer(mut self, finalizer: &str) -> Self {
        self.finalizer = finalizer.to_string();
        self
    }

    #[must_use]
    pub fn with_field_owner(mut self, field_owner: &str) -> Self {
        self.field_owner = field_owner.to_string();
        self
    }

    #[must_use]
    pub fn with_target_namespace(mut self, namespace: &str) -> Self {
        self.target_namespace = namespace.to_string();
        self
    }

    #[must_use]
    pub fn with_intervals(mut self, success: Duration, intended: Duration) -> Self {
        self.success_interval = success;
        self.intended_interval = intended;
        self
    }
}
