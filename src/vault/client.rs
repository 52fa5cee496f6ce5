//! # Vault Backend
//!
//! [`SecretBackend`] over HashiCorp Vault KV v2 using `vaultrs`.
//!
//! Authentication is either a static token or Kubernetes service-account
//! login. With Kubernetes auth the token is renewed by logging in again when
//! Vault answers 403.

use super::{SecretBackend, SecretData, StoreError, WriteMode};
use crate::config::{VaultAuth, VaultConfig};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use vaultrs::api::kv2::requests::SetSecretRequestOptions;
use vaultrs::client::{Client, VaultClient, VaultClientSettingsBuilder};
use vaultrs::error::ClientError;

pub struct VaultBackend {
    config: VaultConfig,
    client: RwLock<Arc<VaultClient>>,
}

impl std::fmt::Debug for VaultBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultBackend")
            .field("url", &self.config.url)
            .finish_non_exhaustive()
    }
}

impl VaultBackend {
    /// Build a client and authenticate it
    ///
    /// # Errors
    ///
    /// Fails if the client settings are invalid or the initial login fails.
    pub async fn connect(config: VaultConfig) -> Result<Self, StoreError> {
        let client = Self::login(&config).await?;
        info!(url = %config.url, "Connected to Vault");
        Ok(Self {
            config,
            client: RwLock::new(Arc::new(client)),
        })
    }

    async fn login(config: &VaultConfig) -> Result<VaultClient, StoreError> {
        let mut settings = VaultClientSettingsBuilder::default();
        settings.address(&config.url);
        if let VaultAuth::Token(token) = &config.auth {
            settings.token(token);
        }
        let settings = settings
            .build()
            .map_err(|e| StoreError::Unavailable(format!("invalid Vault settings: {e}")))?;
        let mut client = VaultClient::new(settings).map_err(|e| unavailable(&e))?;

        if let VaultAuth::Kubernetes {
            mount,
            role,
            jwt_path,
        } = &config.auth
        {
            let jwt = tokio::fs::read_to_string(jwt_path).await.map_err(|e| {
                StoreError::Unavailable(format!(
                    "cannot read service account token {}: {e}",
                    jwt_path.display()
                ))
            })?;
            let auth = vaultrs::auth::kubernetes::login(&client, mount, role, jwt.trim())
                .await
                .map_err(|e| unavailable(&e))?;
            client.set_token(&auth.client_token);
            debug!(mount = %mount, role = %role, "Vault kubernetes login succeeded");
        }
        Ok(client)
    }

    /// Run `op`, logging in again and retrying once if the token was rejected
    async fn call<T, F, Fut>(&self, op: F) -> Result<T, ClientError>
    where
        F: Fn(Arc<VaultClient>) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let client = Arc::clone(&*self.client.read().await);
        match op(client).await {
            Err(ClientError::APIError { code: 403, .. })
                if matches!(self.config.auth, VaultAuth::Kubernetes { .. }) =>
            {
                warn!("Vault token rejected, logging in again");
                let fresh = match Self::login(&self.config).await {
                    Ok(c) => Arc::new(c),
                    Err(e) => {
                        return Err(ClientError::APIError {
                            code: 403,
                            errors: vec![e.to_string()],
                        })
                    }
                };
                *self.client.write().await = Arc::clone(&fresh);
                op(fresh).await
            }
            other => other,
        }
    }
}

fn unavailable(e: &ClientError) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

fn is_cas_conflict(code: u16, errors: &[String]) -> bool {
    code == 400 && errors.iter().any(|e| e.contains("check-and-set"))
}

fn classify(path: String, e: ClientError) -> StoreError {
    match e {
        ClientError::APIError { code, errors } if is_cas_conflict(code, &errors) => {
            StoreError::AlreadyExists(path)
        }
        ClientError::APIError { code, errors } if (400..500).contains(&code) => {
            StoreError::Rejected {
                path,
                message: format!("{code}: {}", errors.join("; ")),
            }
        }
        other => unavailable(&other),
    }
}

#[async_trait]
impl SecretBackend for VaultBackend {
    async fn read(&self, mount: &str, path: &str) -> Result<Option<SecretData>, StoreError> {
        let result = self
            .call(|client| async move {
                vaultrs::kv2::read::<SecretData>(client.as_ref(), mount, path).await
            })
            .await;
        match result {
            Ok(data) => Ok(Some(data)),
            Err(ClientError::APIError { code: 404, .. }) => Ok(None),
            Err(e) => Err(classify(format!("{mount}/{path}"), e)),
        }
    }

    async fn write(
        &self,
        mount: &str,
        path: &str,
        data: &SecretData,
        mode: WriteMode,
    ) -> Result<(), StoreError> {
        let result = self
            .call(|client| async move {
                match mode {
                    WriteMode::CreateOnly => {
                        vaultrs::kv2::set_with_options(
                            client.as_ref(),
                            mount,
                            path,
                            data,
                            SetSecretRequestOptions { cas: 0 },
                        )
                        .await
                    }
                    WriteMode::Upsert => {
                        vaultrs::kv2::set(client.as_ref(), mount, path, data).await
                    }
                }
            })
            .await;
        result
            .map(|_| ())
            .map_err(|e| classify(format!("{mount}/{path}"), e))
    }

    async fn delete(&self, mount: &str, path: &str) -> Result<(), StoreError> {
        let result = self
            .call(|client| async move {
                vaultrs::kv2::delete_metadata(client.as_ref(), mount, path).await
            })
            .await;
        match result {
            Ok(()) | Err(ClientError::APIError { code: 404, .. }) => Ok(()),
            Err(e) => Err(classify(format!("{mount}/{path}"), e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cas_conflict_is_already_exists() {
        let err = classify(
            "secret/app".into(),
            ClientError::APIError {
                code: 400,
                errors: vec![
                    "check-and-set parameter did not match the current version".into(),
                ],
            },
        );
        assert!(matches!(err, StoreError::AlreadyExists(p) if p == "secret/app"));
    }

    #[test]
    fn test_client_errors_are_rejections() {
        let err = classify(
            "secret/app".into(),
            ClientError::APIError {
                code: 403,
                errors: vec!["permission denied".into()],
            },
        );
        assert!(matches!(err, StoreError::Rejected { .. }));
    }

    #[test]
    fn test_server_errors_are_unavailable() {
        let err = classify(
            "secret/app".into(),
            ClientError::APIError {
                code: 503,
                errors: vec!["sealed".into()],
            },
        );
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
