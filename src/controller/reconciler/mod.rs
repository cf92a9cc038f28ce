//! # Reconciler
//!
//! Glue between the controller runtime and the declarative engine: one
//! deadline-bounded engine run per trigger, with the outcome mapped onto a
//! runtime [`Action`].

mod types;

pub use types::{BackoffState, Reconciler, ReconcilerError};

use crate::crd::Manifest;
use crate::declarative::Outcome;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Instrument};

/// Key of a Manifest in per-object bookkeeping
#[must_use]
pub fn object_key(obj: &Manifest) -> String {
    format!("{}/{}", obj.namespace().unwrap_or_default(), obj.name_any())
}

/// Reconcile one Manifest
pub async fn reconcile(
    obj: Arc<Manifest>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_default();
    let span = tracing::info_span!(
        "reconcile",
        resource.name = name.as_str(),
        resource.namespace = namespace.as_str(),
        resource.kind = "Manifest",
        resource.generation = obj.metadata.generation.unwrap_or(0),
    );

    async move {
        let key = object_key(&obj);
        let cancel = CancellationToken::new();
        let deadline = {
            let cancel = cancel.clone();
            let timeout = ctx.config.reconcile_timeout();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                cancel.cancel();
            })
        };

        let result = ctx.engine.reconcile(&namespace, &name, &cancel).await;
        deadline.abort();

        match result? {
            Outcome::Finished => {
                info!("manifest gone, forgetting state");
                ctx.forget(&key);
                Ok(Action::await_change())
            }
            Outcome::Requeue { after, reason } => {
                ctx.reset_backoff(&key);
                debug!(
                    reason = reason.as_str(),
                    after_secs = after.as_secs(),
                    "requeue"
                );
                Ok(Action::requeue(after))
            }
        }
    }
    .instrument(span)
    .await
}
