//! # Resource Conversion
//!
//! Turns rendered documents and persisted identities into [`ResourceInfo`]s
//! resolved against a target cluster, and back.

use crate::declarative::client::ClusterClient;
use crate::declarative::errors::{ClientError, Error, Joined};
use crate::declarative::resource::{ResourceInfo, ResourceList};
use crate::declarative::status::Resource;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::{DynamicObject, TypeMeta};
use tracing::debug;

/// Converter bound to one cluster and default namespace
pub struct ResourceConverter<'a> {
    client: &'a dyn ClusterClient,
    default_namespace: &'a str,
}

impl std::fmt::Debug for ResourceConverter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceConverter")
            .field("default_namespace", &self.default_namespace)
            .finish_non_exhaustive()
    }
}

impl<'a> ResourceConverter<'a> {
    #[must_use]
    pub fn new(client: &'a dyn ClusterClient, default_namespace: &'a str) -> Self {
        Self {
            client,
            default_namespace,
        }
    }

    /// Resolve rendered documents.
    ///
    /// Kinds unknown to the cluster are kept without a mapping so that a
    /// custom resource can ship together with its definition; every other
    /// failure is collected and reported jointly.
    pub async fn unstructured_to_infos(
        &self,
        objects: Vec<DynamicObject>,
    ) -> Result<ResourceList, Error> {
        let mut infos = Vec::with_capacity(objects.len());
        let mut errors = Vec::new();

        for object in objects {
            let mut info = ResourceInfo::new(object, None);
            match self.client.mapping(&info.gvk()).await {
                Ok(mapping) => info.mapping = Some(mapping),
                Err(ClientError::NoMatch { api_version, kind }) => {
                    debug!(
                        %api_version,
                        %kind,
                        name = info.name(),
                        "kind not yet served, keeping without mapping"
                    );
                }
                Err(e) => {
                    errors.push(e.for_resource(&info.identity()));
                    continue;
                }
            }
            self.normalize_namespace(&mut info);
            infos.push(info);
        }

        if errors.is_empty() {
            Ok(ResourceList::new(infos))
        } else {
            Err(Error::Convert(Joined(errors)))
        }
    }

    /// Rebuild handles for previously synced identities
    pub async fn resources_to_infos(&self, resources: &[Resource]) -> Result<ResourceList, Error> {
        let objects = resources
            .iter()
            .map(|resource| DynamicObject {
                types: Some(TypeMeta {
                    api_version: resource.api_version(),
                    kind: resource.kind.clone(),
                }),
                metadata: ObjectMeta {
                    name: Some(resource.name.clone()),
                    namespace: (!resource.namespace.is_empty())
                        .then(|| resource.namespace.clone()),
                    ..ObjectMeta::default()
                },
                data: serde_json::Value::Object(serde_json::Map::new()),
            })
            .collect();
        self.unstructured_to_infos(objects).await
    }

    fn normalize_namespace(&self, info: &mut ResourceInfo) {
        let Some(mapping) = &info.mapping else {
            return;
        };
        if !mapping.namespaced {
            info.object.metadata.namespace = None;
        } else if info.namespace().is_empty() {
            info.object.metadata.namespace = Some(self.default_namespace.to_string());
        }
    }
}

/// Identities of applied handles, preserving order
#[must_use]
pub fn infos_to_resources(infos: &ResourceList) -> Vec<Resource> {
    infos.to_resources()
}
