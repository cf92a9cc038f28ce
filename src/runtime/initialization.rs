//! # Initialization
//!
//! Controller start-up: rustls provider, tracing, configuration, the health
//! server and the Kubernetes client.

use crate::config::ControllerConfig;
use crate::controller::reconciler::Reconciler;
use crate::controller::server::{start_server, ServerState};
use crate::crd::Manifest;
use anyhow::{Context, Result};
use kube::api::{Api, ListParams};
use kube::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Everything the watch loop needs
pub struct InitializationResult {
    pub client: Client,
    pub manifests: Api<Manifest>,
    pub reconciler: Arc<Reconciler>,
    pub server_state: Arc<ServerState>,
    pub config: ControllerConfig,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.is_ready())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

pub async fn initialize() -> Result<InitializationResult> {
    // Must happen before any TLS connection is made
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("rustls crypto provider already installed");
    }

    let config = ControllerConfig::from_env();
    init_tracing(&config)?;

    info!("starting manifest controller");
    info!(
        "build info: datetime={}, git_hash={}",
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );
    debug!(?config, "loaded configuration");

    let server_state = Arc::new(ServerState::default());
    let server_handle = {
        let state = Arc::clone(&server_state);
        let port = config.health_port;
        tokio::spawn(async move {
            if let Err(e) = start_server(port, state).await {
                error!("health server error: {}", e);
            }
        })
    };
    wait_for_server_ready(&server_state, &server_handle, &config).await?;

    let client = Client::try_default()
        .await
        .context("failed to create Kubernetes client")?;
    let manifests: Api<Manifest> = Api::all(client.clone());
    check_crd_queryable(&manifests).await;

    let reconciler = Arc::new(Reconciler::new(client.clone(), config.clone()));
    info!("controller initialized, starting watch loop");

    Ok(InitializationResult {
        client,
        manifests,
        reconciler,
        server_state,
        config,
    })
}

/// Env filter from `RUST_LOG`, falling back to the configured level
fn init_tracing(config: &ControllerConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("manifest_controller={}", config.log_level.to_lowercase()))
    });
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if config.log_format.eq_ignore_ascii_case("json") {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}

async fn wait_for_server_ready(
    server_state: &ServerState,
    server_handle: &tokio::task::JoinHandle<()>,
    config: &ControllerConfig,
) -> Result<()> {
    let startup_timeout = Duration::from_secs(config.server_startup_timeout_secs);
    let poll_interval = Duration::from_millis(config.server_poll_interval_ms);
    let start = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("health server failed to start"));
        }
        if server_state.is_ready() {
            info!("health server is ready");
            return Ok(());
        }
        if start.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "health server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Log how many Manifests exist, or why they cannot be listed
async fn check_crd_queryable(manifests: &Api<Manifest>) {
    match manifests.list_metadata(&ListParams::default()).await {
        Ok(list) => info!(count = list.items.len(), "Manifest CRD is queryable"),
        Err(e) => {
            error!("Manifest CRD is not queryable, is it installed? {}", e);
            warn!("continuing, the watch will retry");
        }
    }
}
