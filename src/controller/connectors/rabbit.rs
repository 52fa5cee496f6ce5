//! # Rabbit Connector
//!
//! One user and one vhost per workload on a shared RabbitMQ broker,
//! provisioned through the management API.

use super::{all_resolved, http, Binding, Connector, ConnectorKind, EnvTable};
use crate::constants::APP_NAME_LABEL;
use crate::controller::annotations::{AnnotationRule, ResolvedAnnotations};
use crate::controller::engine::{get_or_create_credential, secret_str, EngineContext};
use crate::controller::error::ConnectorError;
use crate::controller::passgen::generate_password;
use crate::crd::RabbitConnectorSpec;
use crate::vault::SecretData;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub const BROKER_HOST: &str = "BROKER_HOST";
pub const BROKER_PORT: &str = "BROKER_PORT";
pub const BROKER_USER: &str = "BROKER_USER";
pub const BROKER_PASSWORD: &str = "BROKER_PASSWORD";
pub const BROKER_VHOST: &str = "BROKER_VHOST";
pub const BROKER_URL: &str = "BROKER_URL";

pub const ENV_VARS: EnvTable = &[
    (BROKER_HOST, BROKER_HOST),
    (BROKER_PORT, BROKER_PORT),
    ("BROKER_LOGIN", BROKER_USER),
    (BROKER_PASSWORD, BROKER_PASSWORD),
    (BROKER_VHOST, BROKER_VHOST),
    (BROKER_URL, BROKER_URL),
];

const RULES: &[AnnotationRule] = &[
    AnnotationRule::required("instance-name"),
    AnnotationRule::required("vault-path"),
    AnnotationRule::label("username", APP_NAME_LABEL),
    AnnotationRule::label("vhost", APP_NAME_LABEL),
];

const SERVICE: &str = "Rabbit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RabbitRequest {
    pub binding: Binding,
    pub username: String,
    pub vhost: String,
}

#[derive(Clone, PartialEq, Eq)]
pub struct BrokerGrant {
    pub username: String,
    pub password: String,
    pub vhost: String,
}

impl std::fmt::Debug for BrokerGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerGrant")
            .field("username", &self.username)
            .field("vhost", &self.vhost)
            .finish_non_exhaustive()
    }
}

/// Idempotent user, vhost and permission provisioning
#[async_trait]
pub trait RabbitAdmin: Send + Sync + std::fmt::Debug {
    async fn provision(
        &self,
        root: &RabbitConnectorSpec,
        grant: &BrokerGrant,
    ) -> Result<(), ConnectorError>;
}

#[derive(Debug, Clone)]
pub struct Rabbit {
    admin: Arc<dyn RabbitAdmin>,
}

impl Rabbit {
    pub fn new(admin: Arc<dyn RabbitAdmin>) -> Self {
        Self { admin }
    }
}

#[async_trait]
impl Connector for Rabbit {
    type Instance = RabbitConnectorSpec;
    type Request = RabbitRequest;

    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Rabbit
    }

    fn annotation_rules(&self) -> &'static [AnnotationRule] {
        RULES
    }

    fn request(&self, resolved: &ResolvedAnnotations) -> Result<RabbitRequest, ConnectorError> {
        Ok(RabbitRequest {
            binding: Binding::from_annotations(resolved)?,
            username: resolved.value("username").to_string(),
            vhost: resolved.value("vhost").to_string(),
        })
    }

    fn binding<'a>(&self, request: &'a RabbitRequest) -> &'a Binding {
        &request.binding
    }

    fn root_complete(&self, instance: &RabbitConnectorSpec) -> bool {
        all_resolved(&[
            &instance.broker_host,
            &instance.url,
            &instance.username,
            &instance.password,
        ])
    }

    fn source_identity(
        &self,
        instance: &RabbitConnectorSpec,
        request: &RabbitRequest,
    ) -> Vec<String> {
        vec![
            instance.broker_host.clone(),
            instance.broker_port.to_string(),
            instance.url.clone(),
            request.username.clone(),
            request.vhost.clone(),
        ]
    }

    async fn provision(
        &self,
        ctx: &EngineContext,
        instance: &RabbitConnectorSpec,
        request: &RabbitRequest,
    ) -> Result<(), ConnectorError> {
        let path = &request.binding.vault_path;
        let credential = get_or_create_credential(
            ctx,
            path,
            &[
                (BROKER_USER, request.username.as_str()),
                (BROKER_VHOST, request.vhost.as_str()),
            ],
            || fresh_credential(instance, request),
        )
        .await?;

        let password = secret_str(&credential, BROKER_PASSWORD).ok_or_else(|| {
            ConnectorError::MissingSecretKeys {
                path: path.to_string(),
                keys: vec![BROKER_PASSWORD.to_string()],
            }
        })?;

        self.admin
            .provision(
                instance,
                &BrokerGrant {
                    username: request.username.clone(),
                    password: password.to_string(),
                    vhost: request.vhost.clone(),
                },
            )
            .await
    }
}

/// `amqp://{user}:{password}@{host}:{port}/{vhost}`
pub fn broker_url(host: &str, port: u16, user: &str, password: &str, vhost: &str) -> String {
    format!("amqp://{user}:{password}@{host}:{port}/{vhost}")
}

fn fresh_credential(instance: &RabbitConnectorSpec, request: &RabbitRequest) -> SecretData {
    let password = generate_password();
    let url = broker_url(
        &instance.broker_host,
        instance.broker_port,
        &request.username,
        &password,
        &request.vhost,
    );
    [
        (BROKER_HOST, json!(instance.broker_host)),
        (BROKER_PORT, json!(instance.broker_port.to_string())),
        (BROKER_USER, json!(request.username)),
        (BROKER_PASSWORD, json!(password)),
        (BROKER_VHOST, json!(request.vhost)),
        (BROKER_URL, json!(url)),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// [`RabbitAdmin`] over the RabbitMQ management HTTP API
#[derive(Debug, Clone)]
pub struct HttpRabbitAdmin {
    http: reqwest::Client,
}

impl HttpRabbitAdmin {
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: http::client(timeout)?,
        })
    }

    fn request(
        &self,
        root: &RabbitConnectorSpec,
        method: reqwest::Method,
        segments: &[&str],
    ) -> Result<reqwest::RequestBuilder, ConnectorError> {
        let mut path = vec!["api"];
        path.extend_from_slice(segments);
        let url = http::endpoint(SERVICE, &root.url, &path)?;
        Ok(self
            .http
            .request(method, url)
            .basic_auth(&root.username, Some(&root.password)))
    }

    async fn exists(
        &self,
        root: &RabbitConnectorSpec,
        segments: &[&str],
    ) -> Result<bool, ConnectorError> {
        let request = self.request(root, reqwest::Method::GET, segments)?;
        Ok(http::fetch_optional::<serde_json::Value>(SERVICE, request)
            .await?
            .is_some())
    }

    async fn put(
        &self,
        root: &RabbitConnectorSpec,
        segments: &[&str],
        body: serde_json::Value,
    ) -> Result<(), ConnectorError> {
        let request = self.request(root, reqwest::Method::PUT, segments)?.json(&body);
        http::execute(SERVICE, request).await
    }
}

#[async_trait]
impl RabbitAdmin for HttpRabbitAdmin {
    async fn provision(
        &self,
        root: &RabbitConnectorSpec,
        grant: &BrokerGrant,
    ) -> Result<(), ConnectorError> {
        let user = grant.username.as_str();
        let vhost = grant.vhost.as_str();

        if self.exists(root, &["users", user]).await? {
            info!(user, "Broker user already exists, keeping its password");
        } else {
            self.put(root, &["users", user], json!({"password": grant.password, "tags": ""}))
                .await?;
            info!(user, "Created broker user");
        }

        if !self.exists(root, &["vhosts", vhost]).await? {
            self.put(root, &["vhosts", vhost], json!({})).await?;
            info!(vhost, "Created vhost");
        }

        if !self.exists(root, &["permissions", vhost, user]).await? {
            self.put(
                root,
                &["permissions", vhost, user],
                json!({"configure": ".*", "write": ".*", "read": ".*"}),
            )
            .await?;
            info!(user, vhost, "Granted vhost permissions");
        }
        Ok(())
    }
}
