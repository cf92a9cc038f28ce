//! # Error Policy
//!
//! Backoff for failed reconciliations and classification of watch stream
//! errors.

use crate::controller::reconciler::{object_key, Reconciler, ReconcilerError};
use crate::crd::Manifest;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Requeue a failed Manifest with its own Fibonacci backoff
pub fn handle_reconciliation_error(
    obj: Arc<Manifest>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let key = object_key(&obj);
    let ReconcilerError::Engine(engine_error) = error;
    error!(
        resource = key.as_str(),
        reason = engine_error.reason(),
        "reconciliation failed: {}",
        error
    );

    let (backoff_secs, error_count) = ctx.next_backoff(&key);
    info!(
        resource = key.as_str(),
        error_count,
        "retrying in {}s",
        backoff_secs
    );
    Action::requeue(Duration::from_secs(backoff_secs))
}

/// How the watch loop should treat a stream error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorKind {
    /// RBAC revoked or token expired
    Unauthorized,
    /// Resource version too old, the watch restarts from a fresh list
    Expired,
    /// API server throttling or storage re-initialization
    Throttled,
    /// Manifest or its CRD vanished
    NotFound,
    Other,
}

impl WatchErrorKind {
    /// Classify by the rendered error; 404 is checked first as it may carry
    /// other markers in its chain.
    #[must_use]
    pub fn classify(error: &str) -> Self {
        let not_found = error.contains("ObjectNotFound")
            || error.contains("404")
            || error.contains("not found");
        if not_found {
            WatchErrorKind::NotFound
        } else if error.contains("401") || error.contains("403") || error.contains("Unauthorized") {
            WatchErrorKind::Unauthorized
        } else if error.contains("410")
            || error.contains("too old resource version")
            || error.contains("Expired")
        {
            WatchErrorKind::Expired
        } else if error.contains("429") || error.contains("TooManyRequests") {
            WatchErrorKind::Throttled
        } else {
            WatchErrorKind::Other
        }
    }
}

/// Log a watch stream error and pause where retrying right away is pointless
pub async fn handle_watch_stream_error(error: &str, restart_delay: Duration) {
    match WatchErrorKind::classify(error) {
        WatchErrorKind::Unauthorized => {
            error!("watch unauthorized, check the controller's RBAC: {}", error);
            tokio::time::sleep(restart_delay).await;
        }
        WatchErrorKind::Expired => {
            warn!("watch resource version expired, relisting");
        }
        WatchErrorKind::Throttled => {
            warn!("API server throttling watch, backing off {:?}", restart_delay);
            tokio::time::sleep(restart_delay).await;
        }
        WatchErrorKind::NotFound => {
            warn!("watched object not found, it may have been deleted: {}", error);
        }
        WatchErrorKind::Other => {
            error!("controller stream error: {}", error);
        }
    }
}
