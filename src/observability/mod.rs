//! # Observability
//!
//! Structured logging setup and Prometheus metrics.

pub mod metrics;

use crate::constants::DEFAULT_LOG_FILTER;
use anyhow::Result;

/// Install the global `tracing` subscriber
///
/// `RUST_LOG` overrides the default filter.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {e}"))
}
