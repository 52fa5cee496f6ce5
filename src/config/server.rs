//! # Server Configuration
//!
//! Webhook and probe server settings.

use super::{env_var_opt, env_var_or_default};
use crate::constants::{
    DEFAULT_ADAPTER_TIMEOUT_SECS, DEFAULT_METRICS_PORT, DEFAULT_SERVER_POLL_INTERVAL_MS,
    DEFAULT_SERVER_STARTUP_TIMEOUT_SECS, DEFAULT_WEBHOOK_PORT,
};
use std::path::PathBuf;
use std::time::Duration;

/// HTTP server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Admission webhook port
    pub webhook_port: u16,
    /// Metrics and health probe port
    pub metrics_port: u16,
    /// PEM certificate chain for the webhook; plain HTTP without it
    pub tls_cert: Option<PathBuf>,
    /// PEM private key for the webhook
    pub tls_key: Option<PathBuf>,
    /// How long to wait for the servers to bind before giving up (seconds)
    pub startup_timeout_secs: u64,
    /// Readiness poll interval during startup (milliseconds)
    pub poll_interval_ms: u64,
    /// Timeout of each backing-service adapter call (seconds)
    pub adapter_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            webhook_port: DEFAULT_WEBHOOK_PORT,
            metrics_port: DEFAULT_METRICS_PORT,
            tls_cert: None,
            tls_key: None,
            startup_timeout_secs: DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_SERVER_POLL_INTERVAL_MS,
            adapter_timeout_secs: DEFAULT_ADAPTER_TIMEOUT_SECS,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            webhook_port: env_var_or_default("WEBHOOK_PORT", DEFAULT_WEBHOOK_PORT),
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            tls_cert: env_var_opt("WEBHOOK_TLS_CERT").map(PathBuf::from),
            tls_key: env_var_opt("WEBHOOK_TLS_KEY").map(PathBuf::from),
            startup_timeout_secs: env_var_or_default(
                "SERVER_STARTUP_TIMEOUT_SECS",
                DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            ),
            poll_interval_ms: env_var_or_default(
                "SERVER_POLL_INTERVAL_MS",
                DEFAULT_SERVER_POLL_INTERVAL_MS,
            ),
            adapter_timeout_secs: env_var_or_default(
                "ADAPTER_TIMEOUT_SECS",
                DEFAULT_ADAPTER_TIMEOUT_SECS,
            ),
        }
    }

    /// Certificate and key, when both are configured
    pub fn tls_files(&self) -> Option<(&PathBuf, &PathBuf)> {
        self.tls_cert.as_ref().zip(self.tls_key.as_ref())
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_secs(self.adapter_timeout_secs)
    }
}
