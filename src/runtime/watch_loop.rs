//! # Watch Loop
//!
//! Runs the kube-runtime controller over Manifests until shutdown, restarting
//! the watch when its stream ends.

use crate::controller::reconciler::{reconcile, Reconciler};
use crate::controller::server::ServerState;
use crate::crd::Manifest;
use crate::runtime::error_policy::{handle_reconciliation_error, handle_watch_stream_error};
use futures::StreamExt;
use kube::api::Api;
use kube_runtime::controller::Config as RuntimeConfig;
use kube_runtime::{watcher, Controller};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub async fn run_watch_loop(
    manifests: Api<Manifest>,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
) -> Result<(), anyhow::Error> {
    let shutdown_state = Arc::clone(&server_state);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received shutdown signal, draining in-flight reconciliations");
            shutdown_state.set_ready(false);
        }
    });

    let restart_delay = reconciler.config.watch_restart_delay();
    let concurrency = reconciler.config.max_concurrent_reconciliations;

    loop {
        if !server_state.is_ready() {
            break;
        }

        info!(concurrency, "starting manifest watch");
        Controller::new(manifests.clone(), watcher::Config::default().any_semantic())
            .with_config(RuntimeConfig::default().concurrency(concurrency))
            .shutdown_on_signal()
            .run(reconcile, handle_reconciliation_error, Arc::clone(&reconciler))
            .for_each(|result| async move {
                match result {
                    Ok((object, action)) => {
                        debug!(resource = %object.name, ?action, "reconciled");
                    }
                    Err(e) => handle_watch_stream_error(&format!("{e:?}"), restart_delay).await,
                }
            })
            .await;

        if !server_state.is_ready() {
            break;
        }
        warn!("manifest watch ended, restarting in {:?}", restart_delay);
        tokio::time::sleep(restart_delay).await;
    }

    info!("controller stopped");
    Ok(())
}
