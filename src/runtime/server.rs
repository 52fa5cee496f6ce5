//! # HTTP Servers
//!
//! The probe server (`/healthz`, `/readyz`, `/metrics`) and the admission
//! webhook server. Each marks itself ready in [`ServerState`] once bound.

use crate::config::ServerConfig;
use crate::observability::metrics;
use crate::webhook::{webhook_router, WebhookState};
use anyhow::{Context, Result};
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Readiness of the HTTP servers
#[derive(Debug, Default)]
pub struct ServerState {
    /// Probe server bound
    pub is_ready: AtomicBool,
    /// Webhook server bound
    pub webhook_ready: AtomicBool,
}

impl ServerState {
    pub fn all_ready(&self) -> bool {
        self.is_ready.load(Ordering::Relaxed) && self.webhook_ready.load(Ordering::Relaxed)
    }
}

/// Router for health probes and metrics
pub fn probe_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    if state.all_ready() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    match metrics::encode_metrics() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Serve probes and metrics on `port` until the process exits
///
/// # Errors
///
/// Fails if the port cannot be bound or the server stops with an error.
pub async fn start_probe_server(port: u16, state: Arc<ServerState>) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind probe server to {addr}"))?;
    info!(%addr, "Probe server listening");
    state.is_ready.store(true, Ordering::Relaxed);

    axum::serve(listener, probe_router(state))
        .await
        .context("Probe server failed")
}

/// Serve the admission webhook, over TLS when certificate and key are set
///
/// # Errors
///
/// Fails if the TLS material cannot be loaded or the server stops with an
/// error.
pub async fn start_webhook_server(
    config: &ServerConfig,
    webhook: Arc<WebhookState>,
    state: Arc<ServerState>,
) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.webhook_port));
    let app = webhook_router(webhook).layer(TraceLayer::new_for_http());
    let handle = Handle::new();

    let listening = handle.clone();
    tokio::spawn(async move {
        if let Some(bound) = listening.listening().await {
            info!(addr = %bound, "Webhook server listening");
            state.webhook_ready.store(true, Ordering::Relaxed);
        }
    });

    match config.tls_files() {
        Some((cert, key)) => {
            let tls = RustlsConfig::from_pem_file(cert, key)
                .await
                .with_context(|| format!("Failed to load webhook TLS from {}", cert.display()))?;
            axum_server::bind_rustls(addr, tls)
                .handle(handle)
                .serve(app.into_make_service())
                .await
        }
        None => {
            info!("WEBHOOK_TLS_CERT/WEBHOOK_TLS_KEY not set, serving the webhook over plain HTTP");
            axum_server::bind(addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await
        }
    }
    .context("Webhook server failed")
}
