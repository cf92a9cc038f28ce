//! # Target Cluster Resolution
//!
//! Local Manifests install into the control plane itself. Remote Manifests
//! name their runtime cluster via the cluster-name label; the kubeconfig of
//! that cluster lives in a Secret of the same name next to the Manifest.

use crate::constants::{CLUSTER_NAME_LABEL, KUBECONFIG_SECRET_KEY};
use crate::crd::Manifest;
use crate::declarative::errors::{ClientError, Error};
use crate::declarative::factory::{ClusterInfo, ControlPlaneResolver, TargetClusterResolver};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config, ResourceExt};
use tracing::debug;

/// Picks the control plane or a remote runtime cluster per Manifest
#[derive(Clone)]
pub struct ManifestTargetResolver {
    client: Client,
    control_plane: ControlPlaneResolver,
}

impl std::fmt::Debug for ManifestTargetResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestTargetResolver").finish_non_exhaustive()
    }
}

impl ManifestTargetResolver {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            control_plane: ControlPlaneResolver::new(client.clone()),
            client,
        }
    }
}

#[async_trait]
impl TargetClusterResolver<Manifest> for ManifestTargetResolver {
    async fn resolve(&self, obj: &Manifest) -> Result<ClusterInfo, Error> {
        if !obj.spec.remote {
            return self.control_plane.resolve(obj).await;
        }

        let cluster = cluster_name(obj)?;
        let namespace = obj.namespace().unwrap_or_default();
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &namespace);
        let secret = secrets
            .get_opt(cluster)
            .await
            .map_err(|e| Error::Client(ClientError::from(e)))?
            .ok_or_else(|| Error::AccessSecretNotFound(format!("{namespace}/{cluster}")))?;

        let kubeconfig = kubeconfig_from_secret(&secret)?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| Error::ClusterConfig(format!("kubeconfig of {cluster}: {e}")))?;
        debug!(cluster, url = %config.cluster_url, "resolved remote cluster");
        Ok(ClusterInfo::from_config(config))
    }
}

/// Runtime cluster a remote Manifest targets
pub fn cluster_name(obj: &Manifest) -> Result<&str, Error> {
    obj.labels()
        .get(CLUSTER_NAME_LABEL)
        .map(String::as_str)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| {
            Error::ClusterConfig(format!(
                "remote manifest {} has no {CLUSTER_NAME_LABEL} label",
                obj.name_any()
            ))
        })
}

/// Kubeconfig stored under the `config` key of an access secret
pub fn kubeconfig_from_secret(secret: &Secret) -> Result<Kubeconfig, Error> {
    let name = secret.name_any();
    let raw = secret
        .data
        .as_ref()
        .and_then(|data| data.get(KUBECONFIG_SECRET_KEY))
        .ok_or_else(|| {
            Error::ClusterConfig(format!("secret {name} has no {KUBECONFIG_SECRET_KEY} key"))
        })?;
    let yaml = std::str::from_utf8(&raw.0)
        .map_err(|e| Error::ClusterConfig(format!("secret {name}: {e}")))?;
    Kubeconfig::from_yaml(yaml).map_err(|e| Error::ClusterConfig(format!("secret {name}: {e}")))
}
