//! # Connectors
//!
//! One [`Connector`] implementation per backing service, selected through
//! [`ConnectorKind`]. Every connector runs the same reconciliation shape in
//! [`crate::controller::engine`]; what differs is declared here.
//!
//! ## Sub-modules
//!
//! - `postgres` - database + user per workload
//! - `rabbit` - user + vhost + permissions per workload
//! - `sentry` - team + project + DSN key per workload
//! - `keycloak` - OpenID client + secret per workload

mod http;
pub mod keycloak;
pub mod postgres;
pub mod rabbit;
pub mod sentry;

pub use keycloak::Keycloak;
pub use postgres::Postgres;
pub use rabbit::Rabbit;
pub use sentry::Sentry;

use crate::constants::ANNOTATION_GROUP_SUFFIX;
use crate::controller::annotations::{AnnotationRule, ResolvedAnnotations};
use crate::controller::engine::EngineContext;
use crate::controller::error::ConnectorError;
use crate::vault::{CandidateAddress, SecretAddress, Unvault};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::fmt;

/// Environment variable name and the secret key its reference points at
pub type EnvTable = &'static [(&'static str, &'static str)];

/// The backing-service connectors this controller knows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectorKind {
    Postgres,
    Rabbit,
    Sentry,
    Keycloak,
}

impl ConnectorKind {
    /// Fixed processing order for admission events
    pub const ALL: [ConnectorKind; 4] = [
        ConnectorKind::Postgres,
        ConnectorKind::Rabbit,
        ConnectorKind::Sentry,
        ConnectorKind::Keycloak,
    ];

    /// Short name used in annotation groups
    pub fn short_name(self) -> &'static str {
        match self {
            ConnectorKind::Postgres => "postgres",
            ConnectorKind::Rabbit => "rabbit",
            ConnectorKind::Sentry => "sentry",
            ConnectorKind::Keycloak => "keycloak",
        }
    }

    /// Human-readable service name used in messages
    pub fn service_name(self) -> &'static str {
        match self {
            ConnectorKind::Postgres => "Postgres",
            ConnectorKind::Rabbit => "Rabbit",
            ConnectorKind::Sentry => "Sentry",
            ConnectorKind::Keycloak => "Keycloak",
        }
    }

    /// Event reason code and instance CRD kind
    pub fn reason(self) -> &'static str {
        match self {
            ConnectorKind::Postgres => "PostgresConnector",
            ConnectorKind::Rabbit => "RabbitConnector",
            ConnectorKind::Sentry => "SentryConnector",
            ConnectorKind::Keycloak => "KeycloakConnector",
        }
    }

    /// `connector_type` metric label
    pub fn metric_label(self) -> &'static str {
        match self {
            ConnectorKind::Postgres => "postgres_connector",
            ConnectorKind::Rabbit => "rabbit_connector",
            ConnectorKind::Sentry => "sentry_connector",
            ConnectorKind::Keycloak => "keycloak_connector",
        }
    }

    /// Full annotation key, e.g. `postgres.connector.itlabs.io/vault-path`
    pub fn annotation(self, name: &str) -> String {
        format!("{}.{ANNOTATION_GROUP_SUFFIX}/{name}", self.short_name())
    }

    pub fn env_table(self) -> EnvTable {
        match self {
            ConnectorKind::Postgres => postgres::ENV_VARS,
            ConnectorKind::Rabbit => rabbit::ENV_VARS,
            ConnectorKind::Sentry => sentry::ENV_VARS,
            ConnectorKind::Keycloak => keycloak::ENV_VARS,
        }
    }

    /// Keys a workload secret must contain for every env reference to resolve
    pub fn required_secret_keys(self) -> Vec<&'static str> {
        let mut keys: Vec<&'static str> = self.env_table().iter().map(|(_, key)| *key).collect();
        keys.dedup();
        keys
    }
}

impl fmt::Display for ConnectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Instance name and secret location every workload request carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub instance_name: String,
    /// Where the workload credential lives (never carries a key)
    pub vault_path: SecretAddress,
}

impl Binding {
    /// Build from resolved `instance-name` and `vault-path` annotations
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::MalformedAddress`] when the vault path does
    /// not parse.
    pub fn from_annotations(resolved: &ResolvedAnnotations) -> Result<Self, ConnectorError> {
        let raw = resolved.value("vault-path");
        let vault_path = SecretAddress::parse(raw)
            .map_err(|e| ConnectorError::malformed(raw, e))?
            .without_key();
        Ok(Self {
            instance_name: resolved.value("instance-name").to_string(),
            vault_path,
        })
    }
}

/// Per-backing-service half of the reconciliation algorithm
#[async_trait]
pub trait Connector: Send + Sync + fmt::Debug {
    /// Instance resource spec (root connection data)
    type Instance: Unvault + DeserializeOwned + Clone + fmt::Debug + Send + Sync;
    /// Per-workload request derived from annotations and labels
    type Request: fmt::Debug + Send + Sync;

    fn kind(&self) -> ConnectorKind;

    /// Annotations this connector reads, with their defaults
    fn annotation_rules(&self) -> &'static [AnnotationRule];

    /// Labels that must exist for the connector to apply
    fn required_labels(&self) -> &'static [&'static str] {
        &[]
    }

    /// Build the workload request from resolved annotations
    ///
    /// # Errors
    ///
    /// Application errors for values that cannot be used.
    fn request(&self, resolved: &ResolvedAnnotations) -> Result<Self::Request, ConnectorError>;

    fn binding<'a>(&self, request: &'a Self::Request) -> &'a Binding;

    /// Whether the unvaulted instance has everything needed to connect
    fn root_complete(&self, instance: &Self::Instance) -> bool;

    /// Components identifying the external side effect (source hash input)
    fn source_identity(&self, instance: &Self::Instance, request: &Self::Request) -> Vec<String>;

    /// Get-or-create the workload credential and provision the backing
    /// service; runs while the source lock is held
    ///
    /// # Errors
    ///
    /// `ConflictingCredentialRequest` on identity mismatch, infrastructure
    /// errors from the secret store or the backing service.
    async fn provision(
        &self,
        ctx: &EngineContext,
        instance: &Self::Instance,
        request: &Self::Request,
    ) -> Result<(), ConnectorError>;
}

/// Whether every value is non-empty and no longer a secret reference
pub(crate) fn all_resolved(values: &[&str]) -> bool {
    values
        .iter()
        .all(|v| !v.trim().is_empty() && !CandidateAddress::try_parse(v).is_fully_qualified())
}

/// Whether a non-empty, case-insensitive "true"/"yes"/"1" annotation is set
pub(crate) fn is_truthy(value: Option<&str>) -> bool {
    value.is_some_and(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "yes" | "1"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annotation_keys() {
        assert_eq!(
            ConnectorKind::Postgres.annotation("vault-path"),
            "postgres.connector.itlabs.io/vault-path"
        );
        assert_eq!(
            ConnectorKind::Keycloak.annotation("client-id"),
            "keycloak.connector.itlabs.io/client-id"
        );
    }

    #[test]
    fn test_rabbit_login_maps_to_broker_user_key() {
        let table = ConnectorKind::Rabbit.env_table();
        assert!(table.contains(&("BROKER_LOGIN", "BROKER_USER")));
        assert!(ConnectorKind::Rabbit.required_secret_keys().contains(&"BROKER_USER"));
        assert!(!ConnectorKind::Rabbit.required_secret_keys().contains(&"BROKER_LOGIN"));
    }

    #[test]
    fn test_reason_codes() {
        let reasons: Vec<_> = ConnectorKind::ALL.iter().map(|k| k.reason()).collect();
        assert_eq!(
            reasons,
            vec!["PostgresConnector", "RabbitConnector", "SentryConnector", "KeycloakConnector"]
        );
    }

    #[test]
    fn test_all_resolved() {
        assert!(all_resolved(&["pg.svc", "postgres"]));
        assert!(!all_resolved(&["pg.svc", ""]));
        assert!(!all_resolved(&["vault:secret/data/pg#PASSWORD"]));
        assert!(all_resolved(&["vault:secret/data/pg"]));
    }

    #[test]
    fn test_is_truthy() {
        assert!(is_truthy(Some("true")));
        assert!(is_truthy(Some(" True ")));
        assert!(is_truthy(Some("1")));
        assert!(!is_truthy(Some("false")));
        assert!(!is_truthy(Some("")));
        assert!(!is_truthy(None));
    }
}
