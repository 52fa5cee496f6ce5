//! # Initialization
//!
//! Controller initialization logic including rustls setup, tracing, metrics,
//! Vault and Kubernetes clients, and server startup.

use crate::config::{load_config, ServerConfig};
use crate::controller::cluster::KubeCluster;
use crate::controller::engine::EngineContext;
use crate::controller::ConnectorSet;
use crate::observability;
use crate::runtime::server::{start_probe_server, start_webhook_server, ServerState};
use crate::vault::{SecretGateway, VaultBackend};
use crate::webhook::WebhookState;
use anyhow::{Context, Result};
use kube::Client;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Running controller: server tasks and their shared state
#[derive(Debug)]
pub struct InitializationResult {
    pub server_state: Arc<ServerState>,
    pub probe_server: JoinHandle<()>,
    pub webhook_server: JoinHandle<()>,
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - Vault login and Kubernetes client creation
/// - Probe and webhook server startup
///
/// # Errors
///
/// Fails if any dependency cannot be reached or a server does not become
/// ready in time.
pub async fn initialize() -> Result<InitializationResult> {
    // Must run before anything opens a TLS connection
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_existing| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    observability::init_tracing()?;
    info!(version = env!("CARGO_PKG_VERSION"), "Starting connector controller");

    observability::metrics::register_metrics()?;

    let (server_config, vault_config) = load_config();
    info!(?server_config, vault_url = %vault_config.url, "Loaded configuration");

    let backend = VaultBackend::connect(vault_config)
        .await
        .context("Failed to connect to Vault")?;
    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let ctx = EngineContext::new(
        Arc::new(KubeCluster::new(client)),
        SecretGateway::new(Arc::new(backend)),
    );
    let connectors = ConnectorSet::with_adapters(server_config.adapter_timeout())
        .context("Failed to build backing-service adapters")?;
    let webhook = Arc::new(WebhookState::new(connectors, ctx));

    let server_state = Arc::new(ServerState::default());

    let probe_state = Arc::clone(&server_state);
    let metrics_port = server_config.metrics_port;
    let probe_server = tokio::spawn(async move {
        if let Err(e) = start_probe_server(metrics_port, probe_state).await {
            error!("Probe server error: {e:#}");
        }
    });

    let webhook_state = Arc::clone(&server_state);
    let webhook_config = server_config.clone();
    let webhook_server = tokio::spawn(async move {
        if let Err(e) = start_webhook_server(&webhook_config, webhook, webhook_state).await {
            error!("Webhook server error: {e:#}");
        }
    });

    wait_for_server_ready(&server_config, &server_state, &[&probe_server, &webhook_server])
        .await?;
    observability::metrics::set_app_up(true);
    info!("Controller initialized, serving admission requests");

    Ok(InitializationResult {
        server_state,
        probe_server,
        webhook_server,
    })
}

/// Serve until a server task exits or the process receives Ctrl-C
///
/// # Errors
///
/// Fails if a server stops on its own.
pub async fn run_until_shutdown(init: InitializationResult) -> Result<()> {
    let InitializationResult {
        probe_server,
        webhook_server,
        ..
    } = init;

    let outcome = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            info!("Shutdown signal received");
            Ok(())
        }
        _ = probe_server => Err(anyhow::anyhow!("Probe server stopped")),
        _ = webhook_server => Err(anyhow::anyhow!("Webhook server stopped")),
    };
    observability::metrics::set_app_up(false);
    outcome
}

/// Wait for both HTTP servers to become ready
async fn wait_for_server_ready(
    config: &ServerConfig,
    server_state: &Arc<ServerState>,
    server_handles: &[&JoinHandle<()>],
) -> Result<()> {
    let startup_timeout = config.startup_timeout();
    let poll_interval = config.poll_interval();
    let start_time = std::time::Instant::now();

    loop {
        if server_handles.iter().any(|h| h.is_finished()) {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state.all_ready() {
            info!("HTTP servers are ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP servers failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }
}
