//! # Concurrent Cleanup
//!
//! Deletes a resource set concurrently with background propagation and
//! tells apart "gone", "still terminating" and "failed".

use crate::declarative::client::{ClusterClient, DeleteOutcome};
use crate::declarative::errors::{ClientError, Error, Joined};
use crate::declarative::resource::{ResourceInfo, ResourceList};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Kinds that make up a module operator installation itself
const OPERATOR_RELATED_KINDS: &[&str] = &[
    "Namespace",
    "ServiceAccount",
    "Service",
    "Role",
    "ClusterRole",
    "RoleBinding",
    "ClusterRoleBinding",
    "Deployment",
    "StatefulSet",
    "CustomResourceDefinition",
];

#[must_use]
pub fn is_operator_related(kind: &str) -> bool {
    OPERATOR_RELATED_KINDS.contains(&kind)
}

/// Split into (operator related, operator managed) resources
#[must_use]
pub fn split_resources(resources: &ResourceList) -> (ResourceList, ResourceList) {
    (
        resources.filter(|info| is_operator_related(info.kind())),
        resources.filter(|info| !is_operator_related(info.kind())),
    )
}

/// Deleter for one batch of resources
pub struct ConcurrentCleanup {
    client: Arc<dyn ClusterClient>,
}

impl std::fmt::Debug for ConcurrentCleanup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrentCleanup").finish_non_exhaustive()
    }
}

impl ConcurrentCleanup {
    #[must_use]
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self { client }
    }

    /// Delete resources managed by the module operator first and the operator
    /// itself only once those are gone, so the operator can still process the
    /// finalizers of its own resources.
    pub async fn delete_diff_resources(
        &self,
        resources: &ResourceList,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let (operator_related, operator_managed) = split_resources(resources);
        if !operator_managed.is_empty() {
            self.run(&operator_managed, cancel).await?;
        }
        self.run(&operator_related, cancel).await
    }

    /// Delete every resource.
    ///
    /// Hard failures dominate; otherwise any resource still present yields
    /// [`Error::DeletionNotFinished`].
    pub async fn run(
        &self,
        resources: &ResourceList,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let mut tasks = JoinSet::new();
        for info in resources.iter().cloned() {
            let client = Arc::clone(&self.client);
            tasks.spawn(async move { delete_one(client.as_ref(), &info).await });
        }

        let mut present = 0_usize;
        let mut errors = Vec::new();
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tasks.abort_all();
                    return Err(Error::Cancelled);
                }
                next = tasks.join_next() => match next {
                    None => break,
                    Some(Ok(Ok(DeleteOutcome::Gone))) => {}
                    Some(Ok(Ok(DeleteOutcome::Pending))) => present += 1,
                    Some(Ok(Err(e))) => {
                        warn!("delete failed: {}", e);
                        errors.push(e);
                    }
                    Some(Err(e)) => errors.push(ClientError::Other(e.to_string())),
                },
            }
        }

        if !errors.is_empty() {
            return Err(Error::Cleanup(Joined(errors)));
        }
        if present > 0 {
            info!(remaining = present, "deletion accepted, waiting for resources to disappear");
            return Err(Error::DeletionNotFinished);
        }
        debug!(count = resources.len(), "deleted resources");
        Ok(())
    }
}

async fn delete_one(
    client: &dyn ClusterClient,
    info: &ResourceInfo,
) -> Result<DeleteOutcome, ClientError> {
    match client.delete(info).await {
        // a kind that is no longer served cannot have instances left
        Err(ClientError::NotFound(_) | ClientError::NoMatch { .. }) => Ok(DeleteOutcome::Gone),
        Err(e) => Err(e.for_resource(&info.identity())),
        ok => ok,
    }
}
