//! # Object
//!
//! Capability contract of reconcilable objects and the store the engine uses
//! to read and persist them on the control plane.

use crate::declarative::errors::ClientError;
use crate::declarative::status::Status;
use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::fmt::Debug;
use tracing::{debug, warn};

/// An object the declarative engine can reconcile.
///
/// Identity, labels, annotations and finalizers come from
/// [`kube::ResourceExt`]; the engine only needs access to the status and,
/// optionally, to an embedded module custom resource.
pub trait Object:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Current status, defaulted when the object has none yet
    fn status(&self) -> Status;

    fn set_status(&mut self, status: Status);

    /// Custom resource the module operator is driven through, if any
    fn custom_resource(&self) -> Option<&serde_json::Value> {
        None
    }

    fn is_deleting(&self) -> bool {
        self.meta().deletion_timestamp.is_some()
    }
}

/// Best-effort event attached to an object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEvent {
    pub warning: bool,
    pub reason: String,
    pub message: String,
}

impl ObjectEvent {
    #[must_use]
    pub fn normal(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            warning: false,
            reason: reason.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn warning(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            warning: true,
            reason: reason.into(),
            message: message.into(),
        }
    }
}

/// Read and write paths to reconciled objects on the control plane
#[async_trait]
pub trait ObjectStore<K: Object>: Send + Sync {
    /// Fetch an object; `None` when it no longer exists
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, ClientError>;

    /// Full update of metadata and spec; status is ignored by the API server
    async fn update(&self, obj: &K) -> Result<K, ClientError>;

    /// Server-side apply of the status subresource
    async fn patch_status(&self, obj: &K) -> Result<(), ClientError>;

    /// Server-side apply of the finalizer list
    async fn patch_finalizers(&self, obj: &K, finalizers: &[String]) -> Result<(), ClientError>;

    /// Emit an event; failures are logged and swallowed
    async fn publish_event(&self, obj: &K, event: ObjectEvent);
}

/// [`ObjectStore`] backed by the Kubernetes API
pub struct KubeObjectStore {
    client: Client,
    recorder: Recorder,
    field_owner: String,
}

impl std::fmt::Debug for KubeObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeObjectStore")
            .field("field_owner", &self.field_owner)
            .finish_non_exhaustive()
    }
}

impl KubeObjectStore {
    #[must_use]
    pub fn new(client: Client, field_owner: &str) -> Self {
        let reporter = Reporter {
            controller: field_owner.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client.clone(), reporter),
            client,
            field_owner: field_owner.to_string(),
        }
    }

    fn api<K: Object>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn namespace_of<K: Object>(obj: &K) -> String {
        obj.namespace().unwrap_or_default()
    }
}

#[async_trait]
impl<K: Object> ObjectStore<K> for KubeObjectStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, ClientError> {
        Ok(self.api::<K>(namespace).get_opt(name).await?)
    }

    async fn update(&self, obj: &K) -> Result<K, ClientError> {
        let params = PostParams {
            field_manager: Some(self.field_owner.clone()),
            ..PostParams::default()
        };
        Ok(self
            .api::<K>(&Self::namespace_of(obj))
            .replace(&obj.name_any(), &params, obj)
            .await?)
    }

    async fn patch_status(&self, obj: &K) -> Result<(), ClientError> {
        let patch = json!({
            "apiVersion": K::api_version(&()),
            "kind": K::kind(&()),
            "status": obj.status(),
        });
        self.api::<K>(&Self::namespace_of(obj))
            .patch_status(
                &obj.name_any(),
                &PatchParams::apply(&self.field_owner).force(),
                &Patch::Apply(&patch),
            )
            .await?;
        Ok(())
    }

    async fn patch_finalizers(&self, obj: &K, finalizers: &[String]) -> Result<(), ClientError> {
        let patch = json!({
            "apiVersion": K::api_version(&()),
            "kind": K::kind(&()),
            "metadata": {
                "name": obj.name_any(),
                "namespace": Self::namespace_of(obj),
                "finalizers": finalizers,
            },
        });
        self.api::<K>(&Self::namespace_of(obj))
            .patch(
                &obj.name_any(),
                &PatchParams::apply(&self.field_owner).force(),
                &Patch::Apply(&patch),
            )
            .await?;
        Ok(())
    }

    async fn publish_event(&self, obj: &K, event: ObjectEvent) {
        let type_ = if event.warning {
            EventType::Warning
        } else {
            EventType::Normal
        };
        let result = self
            .recorder
            .publish(
                &Event {
                    type_,
                    reason: event.reason.clone(),
                    note: Some(event.message),
                    action: "Reconcile".to_string(),
                    secondary: None,
                },
                &obj.object_ref(&()),
            )
            .await;
        match result {
            Ok(()) => debug!(reason = %event.reason, "event published"),
            Err(e) => warn!(reason = %event.reason, "failed to publish event: {}", e),
        }
    }
}
