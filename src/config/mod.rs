//! # Controller Configuration
//!
//! Settings loaded from environment variables (populated from a ConfigMap
//! via `envFrom` in the deployment). Every setting has a default so the
//! controller starts with no configuration in local runs.

mod server;
mod vault;

pub use server::ServerConfig;
pub use vault::{VaultAuth, VaultConfig};

/// Load configuration from environment variables with defaults
pub fn load_config() -> (ServerConfig, VaultConfig) {
    (ServerConfig::from_env(), VaultConfig::from_env())
}

/// Read environment variable or return default value
pub(crate) fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Non-empty environment variable
pub(crate) fn env_var_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
