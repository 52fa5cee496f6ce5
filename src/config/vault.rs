//! # Vault Configuration

use super::{env_var_opt, env_var_or_default};
use crate::constants::{
    DEFAULT_VAULT_K8S_AUTH_METHOD, DEFAULT_VAULT_K8S_ROLE, DEFAULT_VAULT_URL,
    SERVICE_ACCOUNT_TOKEN_PATH,
};
use std::path::PathBuf;

/// How the controller authenticates to Vault
#[derive(Clone, PartialEq, Eq)]
pub enum VaultAuth {
    /// Static token (local runs)
    Token(String),
    /// Kubernetes auth method with the pod's service account token
    Kubernetes {
        mount: String,
        role: String,
        jwt_path: PathBuf,
    },
}

impl std::fmt::Debug for VaultAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VaultAuth::Token(_) => f.write_str("Token(******)"),
            VaultAuth::Kubernetes {
                mount,
                role,
                jwt_path,
            } => f
                .debug_struct("Kubernetes")
                .field("mount", mount)
                .field("role", role)
                .field("jwt_path", jwt_path)
                .finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultConfig {
    pub url: String,
    pub auth: VaultAuth,
}

impl VaultConfig {
    /// `VAULT_TOKEN`, when set, skips Kubernetes auth
    pub fn from_env() -> Self {
        let auth = match env_var_opt("VAULT_TOKEN") {
            Some(token) => VaultAuth::Token(token),
            None => VaultAuth::Kubernetes {
                mount: env_var_or_default(
                    "VAULT_K8S_AUTH_METHOD",
                    DEFAULT_VAULT_K8S_AUTH_METHOD.to_string(),
                ),
                role: env_var_or_default("VAULT_K8S_ROLE", DEFAULT_VAULT_K8S_ROLE.to_string()),
                jwt_path: PathBuf::from(SERVICE_ACCOUNT_TOKEN_PATH),
            },
        };
        Self {
            url: env_var_or_default("VAULT_URL", DEFAULT_VAULT_URL.to_string()),
            auth,
        }
    }
}
