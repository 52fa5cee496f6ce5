//! # Keycloak Connector
//!
//! One confidential OpenID Connect client per workload. The workload
//! credential holds the client id and its secret.

use super::{all_resolved, http, Binding, Connector, ConnectorKind, EnvTable};
use crate::controller::annotations::{AnnotationRule, ResolvedAnnotations};
use crate::controller::engine::{check_identity, EngineContext};
use crate::controller::error::ConnectorError;
use crate::crd::KeycloakConnectorSpec;
use crate::vault::{Masked, SecretData};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub const KEYCLOAK_CLIENT_ID: &str = "KEYCLOAK_CLIENT_ID";
pub const KEYCLOAK_SECRET: &str = "KEYCLOAK_SECRET";

pub const ENV_VARS: EnvTable = &[
    (KEYCLOAK_CLIENT_ID, KEYCLOAK_CLIENT_ID),
    (KEYCLOAK_SECRET, KEYCLOAK_SECRET),
];

const RULES: &[AnnotationRule] = &[
    AnnotationRule::required("instance-name"),
    AnnotationRule::required("vault-path"),
    AnnotationRule::required("client-id"),
];

const SERVICE: &str = "Keycloak";

/// Client used for the admin password grant
const ADMIN_CLIENT: &str = "admin-cli";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeycloakRequest {
    pub binding: Binding,
    pub client_id: String,
}

#[async_trait]
pub trait KeycloakAdmin: Send + Sync + std::fmt::Debug {
    async fn client_exists(
        &self,
        root: &KeycloakConnectorSpec,
        client_id: &str,
    ) -> Result<bool, ConnectorError>;

    /// Create the client if absent and issue a new secret for it
    async fn issue_secret(
        &self,
        root: &KeycloakConnectorSpec,
        client_id: &str,
    ) -> Result<String, ConnectorError>;
}

#[derive(Debug, Clone)]
pub struct Keycloak {
    admin: Arc<dyn KeycloakAdmin>,
}

impl Keycloak {
    pub fn new(admin: Arc<dyn KeycloakAdmin>) -> Self {
        Self { admin }
    }
}

#[async_trait]
impl Connector for Keycloak {
    type Instance = KeycloakConnectorSpec;
    type Request = KeycloakRequest;

    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Keycloak
    }

    fn annotation_rules(&self) -> &'static [AnnotationRule] {
        RULES
    }

    fn request(&self, resolved: &ResolvedAnnotations) -> Result<KeycloakRequest, ConnectorError> {
        Ok(KeycloakRequest {
            binding: Binding::from_annotations(resolved)?,
            client_id: resolved.value("client-id").to_string(),
        })
    }

    fn binding<'a>(&self, request: &'a KeycloakRequest) -> &'a Binding {
        &request.binding
    }

    fn root_complete(&self, instance: &KeycloakConnectorSpec) -> bool {
        all_resolved(&[
            &instance.url,
            &instance.realm,
            &instance.username,
            &instance.password,
        ])
    }

    fn source_identity(
        &self,
        instance: &KeycloakConnectorSpec,
        request: &KeycloakRequest,
    ) -> Vec<String> {
        vec![
            instance.url.clone(),
            instance.realm.clone(),
            request.client_id.clone(),
        ]
    }

    async fn provision(
        &self,
        ctx: &EngineContext,
        instance: &KeycloakConnectorSpec,
        request: &KeycloakRequest,
    ) -> Result<(), ConnectorError> {
        let path = &request.binding.vault_path;
        if let Some(existing) = ctx.secrets.read_at(path).await? {
            check_identity(path, &existing, &[(KEYCLOAK_CLIENT_ID, &request.client_id)])?;
            if self.admin.client_exists(instance, &request.client_id).await? {
                info!(client_id = %request.client_id, "Keycloak client already exists");
                return Ok(());
            }
        }

        let secret = self.admin.issue_secret(instance, &request.client_id).await?;
        let credential: SecretData = [
            (KEYCLOAK_CLIENT_ID.to_string(), json!(request.client_id)),
            (KEYCLOAK_SECRET.to_string(), json!(secret)),
        ]
        .into_iter()
        .collect();
        info!(path = %path, secret = %Masked(&credential), "Storing Keycloak credential");
        ctx.secrets.create_or_update(path, &credential, true).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct ClientRepresentation {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CredentialRepresentation {
    #[serde(alias = "secret")]
    value: String,
}

/// [`KeycloakAdmin`] over the Keycloak admin REST API
#[derive(Debug, Clone)]
pub struct HttpKeycloakAdmin {
    http: reqwest::Client,
}

impl HttpKeycloakAdmin {
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: http::client(timeout)?,
        })
    }

    async fn token(&self, root: &KeycloakConnectorSpec) -> Result<String, ConnectorError> {
        let url = http::endpoint(
            SERVICE,
            &root.url,
            &["realms", &root.realm, "protocol", "openid-connect", "token"],
        )?;
        let request = self.http.post(url).form(&[
            ("client_id", ADMIN_CLIENT),
            ("grant_type", "password"),
            ("username", root.username.as_str()),
            ("password", root.password.as_str()),
        ]);
        let token: TokenResponse = http::fetch(SERVICE, request).await?;
        Ok(token.access_token)
    }

    async fn find_client(
        &self,
        root: &KeycloakConnectorSpec,
        token: &str,
        client_id: &str,
    ) -> Result<Option<ClientRepresentation>, ConnectorError> {
        let mut url = clients_endpoint(root)?;
        url.query_pairs_mut().append_pair("clientId", client_id);
        let request = self.http.get(url).bearer_auth(token);
        let clients: Vec<ClientRepresentation> = http::fetch(SERVICE, request).await?;
        Ok(clients.into_iter().next())
    }
}

fn clients_endpoint(root: &KeycloakConnectorSpec) -> Result<reqwest::Url, ConnectorError> {
    http::endpoint(SERVICE, &root.url, &["admin", "realms", &root.realm, "clients"])
}

#[async_trait]
impl KeycloakAdmin for HttpKeycloakAdmin {
    async fn client_exists(
        &self,
        root: &KeycloakConnectorSpec,
        client_id: &str,
    ) -> Result<bool, ConnectorError> {
        let token = self.token(root).await?;
        Ok(self.find_client(root, &token, client_id).await?.is_some())
    }

    async fn issue_secret(
        &self,
        root: &KeycloakConnectorSpec,
        client_id: &str,
    ) -> Result<String, ConnectorError> {
        let token = self.token(root).await?;

        let client = match self.find_client(root, &token, client_id).await? {
            Some(client) => client,
            None => {
                let create = self
                    .http
                    .post(clients_endpoint(root)?)
                    .bearer_auth(&token)
                    .json(&json!({
                        "clientId": client_id,
                        "name": client_id,
                        "protocol": "openid-connect",
                        "clientAuthenticatorType": "client-secret",
                    }));
                http::execute(SERVICE, create).await?;
                info!(client_id, "Created Keycloak client");
                self.find_client(root, &token, client_id).await?.ok_or_else(|| {
                    ConnectorError::infrastructure(
                        SERVICE,
                        format!("client `{client_id}` missing right after creation"),
                    )
                })?
            }
        };

        let url = http::endpoint(
            SERVICE,
            &root.url,
            &["admin", "realms", &root.realm, "clients", &client.id, "client-secret"],
        )?;
        let credential: CredentialRepresentation =
            http::fetch(SERVICE, self.http.post(url).bearer_auth(&token)).await?;
        info!(client_id, "Issued Keycloak client secret");
        Ok(credential.value)
    }
}
