//! # Hooks
//!
//! Extension points run around apply and deletion, and the lifecycle of the
//! module custom resource built on top of them.
//!
//! The module custom resource is created once the installation is applied and
//! guarded by its own finalizer on the object. On deletion it is removed
//! before anything else so that the module operator can tear down what it
//! created while it still runs.

use crate::constants::{CUSTOM_RESOURCE_MANAGER_FINALIZER, DEFAULT_TARGET_NAMESPACE};
use crate::declarative::client::{ClusterClient, DeleteOutcome};
use crate::declarative::errors::{ClientError, Error};
use crate::declarative::object::{Object, ObjectStore};
use crate::declarative::resource::ResourceInfo;
use async_trait::async_trait;
use kube::core::DynamicObject;
use kube::ResourceExt;
use tracing::{debug, info};

/// A step run after apply (post-run) or before apply while deleting (pre-delete).
///
/// Returning [`Error::RequeueRequired`] asks for another pass without
/// treating it as a failure.
#[async_trait]
pub trait Hook<K: Object>: Send + Sync {
    fn name(&self) -> &str;

    async fn run(
        &self,
        target: &dyn ClusterClient,
        store: &dyn ObjectStore<K>,
        obj: &K,
    ) -> Result<(), Error>;
}

/// Tells whether everything guarding an object's deletion is gone
#[async_trait]
pub trait DeletionCheck<K: Object>: Send + Sync {
    async fn run(&self, target: &dyn ClusterClient, obj: &K) -> Result<bool, Error>;
}

/// Handle for the module custom resource embedded in an object
pub fn module_resource_info<K: Object>(obj: &K) -> Result<Option<ResourceInfo>, Error> {
    let Some(value) = obj.custom_resource() else {
        return Ok(None);
    };
    let mut object: DynamicObject = serde_json::from_value(value.clone())
        .map_err(|e| Error::Hook(format!("invalid module resource: {e}")))?;
    if object.types.is_none() || object.metadata.name.is_none() {
        return Err(Error::Hook(
            "module resource needs apiVersion, kind and metadata.name".to_string(),
        ));
    }
    if object.metadata.namespace.is_none() {
        object.metadata.namespace = Some(DEFAULT_TARGET_NAMESPACE.to_string());
    }
    Ok(Some(ResourceInfo::new(object, None)))
}

/// Creates the module custom resource and guards it with a finalizer
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateModuleResource;

#[async_trait]
impl<K: Object> Hook<K> for CreateModuleResource {
    fn name(&self) -> &str {
        "create-module-resource"
    }

    async fn run(
        &self,
        target: &dyn ClusterClient,
        store: &dyn ObjectStore<K>,
        obj: &K,
    ) -> Result<(), Error> {
        if obj.is_deleting() {
            return Ok(());
        }
        let Some(resource) = module_resource_info(obj)? else {
            return Ok(());
        };

        match target
            .create(&resource, CUSTOM_RESOURCE_MANAGER_FINALIZER)
            .await
        {
            Ok(()) => info!(resource = %resource.identity(), "created module resource"),
            Err(ClientError::AlreadyExists(_)) => {}
            Err(e) => return Err(Error::Client(e.for_resource(&resource.identity()))),
        }

        if obj
            .finalizers()
            .iter()
            .any(|f| f == CUSTOM_RESOURCE_MANAGER_FINALIZER)
        {
            return Ok(());
        }
        let mut finalizers = obj.finalizers().to_vec();
        finalizers.push(CUSTOM_RESOURCE_MANAGER_FINALIZER.to_string());
        store.patch_finalizers(obj, &finalizers).await?;
        debug!("added module resource finalizer");
        Err(Error::RequeueRequired)
    }
}

/// Deletes the module custom resource and releases its finalizer once gone
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteModuleResource;

#[async_trait]
impl<K: Object> Hook<K> for DeleteModuleResource {
    fn name(&self) -> &str {
        "delete-module-resource"
    }

    async fn run(
        &self,
        target: &dyn ClusterClient,
        store: &dyn ObjectStore<K>,
        obj: &K,
    ) -> Result<(), Error> {
        let resource = module_resource_info(obj)?;
        let outcome = match &resource {
            Some(resource) => match target.delete(resource).await {
                Ok(outcome) => outcome,
                Err(ClientError::NotFound(_) | ClientError::NoMatch { .. }) => DeleteOutcome::Gone,
                Err(e) => return Err(Error::Client(e.for_resource(&resource.identity()))),
            },
            None => DeleteOutcome::Gone,
        };

        if outcome == DeleteOutcome::Pending {
            debug!("module resource still terminating");
            return Err(Error::RequeueRequired);
        }
        if !obj
            .finalizers()
            .iter()
            .any(|f| f == CUSTOM_RESOURCE_MANAGER_FINALIZER)
        {
            return Ok(());
        }

        let mut updated = obj.clone();
        updated
            .finalizers_mut()
            .retain(|f| f != CUSTOM_RESOURCE_MANAGER_FINALIZER);
        store.update(&updated).await?;
        info!("module resource gone, released its finalizer");
        Err(Error::RequeueRequired)
    }
}

/// Fully deleted once the module custom resource no longer exists
#[derive(Debug, Clone, Copy, Default)]
pub struct ModuleResourceDeletionCheck;

#[async_trait]
impl<K: Object> DeletionCheck<K> for ModuleResourceDeletionCheck {
    async fn run(&self, target: &dyn ClusterClient, obj: &K) -> Result<bool, Error> {
        let Some(resource) = module_resource_info(obj)? else {
            return Ok(true);
        };
        match target.get(&resource).await {
            Ok(live) => Ok(live.is_none()),
            Err(ClientError::NotFound(_) | ClientError::NoMatch { .. }) => Ok(true),
            Err(e) => Err(Error::Client(e.for_resource(&resource.identity()))),
        }
    }
}
