//! # Cluster Client
//!
//! Dynamic client for a target cluster: REST mapping via discovery, forced
//! server-side apply, create, delete and get of arbitrary resources.

use crate::declarative::errors::ClientError;
use crate::declarative::resource::{Mapping, ResourceInfo};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::core::{DynamicObject, GroupVersionKind};
use kube::discovery::{Discovery, Scope};
use kube::{Client, ResourceExt};
use serde_json::json;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info};

/// Result of an accepted delete request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The object is gone
    Gone,
    /// The object still exists, typically held by its own finalizers
    Pending,
}

/// Operations the engine performs against a target cluster
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Resolve the REST mapping of a kind
    async fn mapping(&self, gvk: &GroupVersionKind) -> Result<Mapping, ClientError>;

    /// Forced server-side apply under `field_owner`
    async fn apply(&self, info: &ResourceInfo, field_owner: &str) -> Result<(), ClientError>;

    /// Create; fails with [`ClientError::AlreadyExists`] when present
    async fn create(&self, info: &ResourceInfo, field_owner: &str) -> Result<(), ClientError>;

    /// Delete with background propagation
    async fn delete(&self, info: &ResourceInfo) -> Result<DeleteOutcome, ClientError>;

    async fn get(&self, info: &ResourceInfo) -> Result<Option<DynamicObject>, ClientError>;
}

/// [`ClusterClient`] backed by a `kube::Client`
pub struct KubeClusterClient {
    client: Client,
    discovery: RwLock<Option<Discovery>>,
    namespace: Option<String>,
    namespace_ready: OnceCell<()>,
}

impl std::fmt::Debug for KubeClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterClient")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl KubeClusterClient {
    /// `ensure_namespace` names a namespace created by apply before the first
    /// resource is applied through this client.
    #[must_use]
    pub fn new(client: Client, ensure_namespace: Option<String>) -> Self {
        Self {
            client,
            discovery: RwLock::new(None),
            namespace: ensure_namespace,
            namespace_ready: OnceCell::new(),
        }
    }

    async fn cached_mapping(&self, gvk: &GroupVersionKind) -> Option<Mapping> {
        let discovery = self.discovery.read().await;
        discovery
            .as_ref()?
            .resolve_gvk(gvk)
            .map(|(resource, capabilities)| Mapping {
                resource,
                namespaced: matches!(capabilities.scope, Scope::Namespaced),
            })
    }

    async fn rediscover(&self) -> Result<(), ClientError> {
        let discovery = Discovery::new(self.client.clone()).run().await?;
        *self.discovery.write().await = Some(discovery);
        Ok(())
    }

    async fn mapping_for(&self, info: &ResourceInfo) -> Result<Mapping, ClientError> {
        match &info.mapping {
            Some(mapping) => Ok(mapping.clone()),
            None => self.mapping(&info.gvk()).await,
        }
    }

    async fn api_for(&self, info: &ResourceInfo) -> Result<Api<DynamicObject>, ClientError> {
        let mapping = self.mapping_for(info).await?;
        Ok(if mapping.namespaced {
            Api::namespaced_with(self.client.clone(), info.namespace(), &mapping.resource)
        } else {
            Api::all_with(self.client.clone(), &mapping.resource)
        })
    }

    async fn ensure_namespace(&self, field_owner: &str) -> Result<(), ClientError> {
        let Some(namespace) = &self.namespace else {
            return Ok(());
        };
        self.namespace_ready
            .get_or_try_init(|| async {
                let patch = json!({
                    "apiVersion": "v1",
                    "kind": "Namespace",
                    "metadata": { "name": namespace },
                });
                Api::<Namespace>::all(self.client.clone())
                    .patch(
                        namespace,
                        &PatchParams::apply(field_owner).force(),
                        &Patch::Apply(&patch),
                    )
                    .await?;
                info!(namespace = %namespace, "ensured target namespace");
                Ok::<(), ClientError>(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn mapping(&self, gvk: &GroupVersionKind) -> Result<Mapping, ClientError> {
        if let Some(mapping) = self.cached_mapping(gvk).await {
            return Ok(mapping);
        }
        // the kind may have been registered since the last discovery run
        debug!(kind = %gvk.kind, "mapping cache miss, rediscovering");
        self.rediscover().await?;
        self.cached_mapping(gvk)
            .await
            .ok_or_else(|| ClientError::NoMatch {
                api_version: gvk.api_version(),
                kind: gvk.kind.clone(),
            })
    }

    async fn apply(&self, info: &ResourceInfo, field_owner: &str) -> Result<(), ClientError> {
        self.ensure_namespace(field_owner).await?;
        let api = self.api_for(info).await?;
        let mut object = info.object.clone();
        object.metadata.managed_fields = None;
        object.metadata.resource_version = None;
        api.patch(
            &object.name_any(),
            &PatchParams::apply(field_owner).force(),
            &Patch::Apply(&object),
        )
        .await?;
        Ok(())
    }

    async fn create(&self, info: &ResourceInfo, field_owner: &str) -> Result<(), ClientError> {
        let api = self.api_for(info).await?;
        let params = PostParams {
            field_manager: Some(field_owner.to_string()),
            ..PostParams::default()
        };
        api.create(&params, &info.object).await?;
        Ok(())
    }

    async fn delete(&self, info: &ResourceInfo) -> Result<DeleteOutcome, ClientError> {
        let api = self.api_for(info).await?;
        let response = api.delete(info.name(), &DeleteParams::background()).await?;
        Ok(match response.left() {
            Some(remaining) if !remaining.finalizers().is_empty() => DeleteOutcome::Pending,
            _ => DeleteOutcome::Gone,
        })
    }

    async fn get(&self, info: &ResourceInfo) -> Result<Option<DynamicObject>, ClientError> {
        Ok(self.api_for(info).await?.get_opt(info.name()).await?)
    }
}
