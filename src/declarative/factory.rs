//! # Cluster Client Factory
//!
//! Resolves which cluster an object targets and builds clients for it.

use crate::declarative::client::{ClusterClient, KubeClusterClient};
use crate::declarative::errors::{ClientError, Error};
use crate::declarative::object::Object;
use async_trait::async_trait;
use kube::Client;
use std::sync::Arc;

/// Connection descriptor of a target cluster
#[derive(Clone, Default)]
pub struct ClusterInfo {
    pub config: Option<kube::Config>,
    pub client: Option<Client>,
}

impl std::fmt::Debug for ClusterInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterInfo")
            .field(
                "cluster_url",
                &self.config.as_ref().map(|c| c.cluster_url.to_string()),
            )
            .field("prebuilt_client", &self.client.is_some())
            .finish()
    }
}

impl ClusterInfo {
    #[must_use]
    pub fn from_client(client: Client) -> Self {
        Self {
            config: None,
            client: Some(client),
        }
    }

    #[must_use]
    pub fn from_config(config: kube::Config) -> Self {
        Self {
            config: Some(config),
            client: None,
        }
    }
}

/// Decides which cluster an object's resources are installed into
#[async_trait]
pub trait TargetClusterResolver<K: Object>: Send + Sync {
    async fn resolve(&self, obj: &K) -> Result<ClusterInfo, Error>;
}

/// Targets the cluster the controller itself runs against
#[derive(Clone)]
pub struct ControlPlaneResolver {
    client: Client,
}

impl std::fmt::Debug for ControlPlaneResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlPlaneResolver").finish_non_exhaustive()
    }
}

impl ControlPlaneResolver {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<K: Object> TargetClusterResolver<K> for ControlPlaneResolver {
    async fn resolve(&self, _obj: &K) -> Result<ClusterInfo, Error> {
        Ok(ClusterInfo::from_client(self.client.clone()))
    }
}

/// Builds clients from connection descriptors
#[async_trait]
pub trait ClusterClientFactory: Send + Sync {
    async fn build(
        &self,
        cluster: ClusterInfo,
        namespace: &str,
    ) -> Result<Arc<dyn ClusterClient>, Error>;
}

/// Factory producing [`KubeClusterClient`]s
#[derive(Debug, Clone, Default)]
pub struct KubeClientFactory {
    create_namespace: bool,
}

impl KubeClientFactory {
    /// With `create_namespace` every client applies its target namespace
    /// before the first resource.
    #[must_use]
    pub fn new(create_namespace: bool) -> Self {
        Self { create_namespace }
    }
}

#[async_trait]
impl ClusterClientFactory for KubeClientFactory {
    async fn build(
        &self,
        cluster: ClusterInfo,
        namespace: &str,
    ) -> Result<Arc<dyn ClusterClient>, Error> {
        let client = match (cluster.client, cluster.config) {
            (Some(client), _) => client,
            (None, Some(config)) => Client::try_from(config)
                .map_err(|e| Error::ClusterConfig(ClientError::from(e).to_string()))?,
            (None, None) => {
                return Err(Error::ClusterConfig(
                    "cluster info carries neither a client nor a config".to_string(),
                ))
            }
        };
        let ensure_namespace = self.create_namespace.then(|| namespace.to_string());
        Ok(Arc::new(KubeClusterClient::new(client, ensure_namespace)))
    }
}
