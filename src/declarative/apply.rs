//! # Concurrent Apply
//!
//! Applies a resource set with forced server-side apply, one task per
//! resource, joined at a single point.

use crate::declarative::client::ClusterClient;
use crate::declarative::errors::{ClientError, Error, Joined};
use crate::declarative::resource::ResourceList;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Server-side applier for one batch of resources
pub struct ConcurrentApplier {
    client: Arc<dyn ClusterClient>,
    field_owner: String,
}

impl std::fmt::Debug for ConcurrentApplier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrentApplier")
            .field("field_owner", &self.field_owner)
            .finish_non_exhaustive()
    }
}

impl ConcurrentApplier {
    #[must_use]
    pub fn new(client: Arc<dyn ClusterClient>, field_owner: &str) -> Self {
        Self {
            client,
            field_owner: field_owner.to_string(),
        }
    }

    /// Apply every resource. Successful applies are kept even when siblings
    /// fail; the next reconcile re-applies idempotently.
    pub async fn run(
        &self,
        resources: &ResourceList,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let mut tasks = JoinSet::new();
        for info in resources.iter().cloned() {
            let client = Arc::clone(&self.client);
            let owner = self.field_owner.clone();
            tasks.spawn(async move {
                let identity = info.identity();
                client
                    .apply(&info, &owner)
                    .await
                    .map_err(|e| e.for_resource(&identity))
            });
        }

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
                    Some(Ok(Ok(()))) => {}
                    Some(Ok(Err(e))) => {
                        warn!("apply failed: {}", e);
                        errors.push(e);
                    }
                    Some(Err(e)) => errors.push(ClientError::Other(e.to_string())),
                },
            }
        }

        if errors.is_empty() {
            debug!(count = resources.len(), "applied resources");
            return Ok(());
        }
        let joined = Joined(errors);
        if joined.all_unauthorized() {
            return Err(Error::Client(ClientError::Unauthorized(joined.to_string())));
        }
        Err(Error::Apply(joined))
    }
}
