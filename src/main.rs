//! # Manifest Controller
//!
//! Watches `Manifest` resources and declaratively reconciles the rendered
//! content of each one onto its target cluster.

use anyhow::Result;
use manifest_controller::runtime::initialization::initialize;
use manifest_controller::runtime::watch_loop::run_watch_loop;

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;
    run_watch_loop(init.manifests, init.reconciler, init.server_state).await
}
