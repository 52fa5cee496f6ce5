//! Shared fixtures: recording adapters and a wired-up harness.

use async_trait::async_trait;
use connector_controller::controller::annotations::WorkloadMeta;
use connector_controller::controller::cluster::InMemoryCluster;
use connector_controller::controller::connectors::keycloak::KeycloakAdmin;
use connector_controller::controller::connectors::postgres::{DatabaseGrant, PostgresAdmin};
use connector_controller::controller::connectors::rabbit::{BrokerGrant, RabbitAdmin};
use connector_controller::controller::connectors::sentry::{ProjectKey, SentryAdmin, SentryRequest};
use connector_controller::controller::connectors::{
    ConnectorKind, Keycloak, Postgres, Rabbit, Sentry,
};
use connector_controller::controller::engine::EngineContext;
use connector_controller::controller::error::ConnectorError;
use connector_controller::controller::ConnectorSet;
use connector_controller::crd::{
    KeycloakConnectorSpec, PostgresConnectorSpec, RabbitConnectorSpec, SentryConnectorSpec,
};
use connector_controller::vault::{InMemoryBackend, SecretGateway};
use k8s_openapi::api::core::v1::{Container, Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Postgres server model: remembers users and databases, counts creations
/// and the highest number of overlapping calls for one database
#[derive(Debug, Default)]
pub struct RecordingPostgresAdmin {
    pub calls: Mutex<Vec<DatabaseGrant>>,
    databases: Mutex<HashSet<String>>,
    pub databases_created: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub delay: Duration,
}

impl RecordingPostgresAdmin {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl PostgresAdmin for RecordingPostgresAdmin {
    async fn provision(
        &self,
        _root: &PostgresConnectorSpec,
        grant: &DatabaseGrant,
    ) -> Result<(), ConnectorError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.databases.lock().unwrap().insert(grant.database.clone()) {
            self.databases_created.fetch_add(1, Ordering::SeqCst);
        }
        self.calls.lock().unwrap().push(grant.clone());
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingRabbitAdmin {
    pub calls: Mutex<Vec<BrokerGrant>>,
}

#[async_trait]
impl RabbitAdmin for RecordingRabbitAdmin {
    async fn provision(
        &self,
        _root: &RabbitConnectorSpec,
        grant: &BrokerGrant,
    ) -> Result<(), ConnectorError> {
        self.calls.lock().unwrap().push(grant.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingSentryAdmin {
    pub configured: AtomicUsize,
}

#[async_trait]
impl SentryAdmin for RecordingSentryAdmin {
    async fn dsn_exists(
        &self,
        _root: &SentryConnectorSpec,
        _project_slug: &str,
        _dsn: &str,
    ) -> Result<bool, ConnectorError> {
        Ok(true)
    }

    async fn configure(
        &self,
        _root: &SentryConnectorSpec,
        request: &SentryRequest,
    ) -> Result<ProjectKey, ConnectorError> {
        self.configured.fetch_add(1, Ordering::SeqCst);
        Ok(ProjectKey {
            project_slug: request.project.clone(),
            dsn: format!("https://key@sentry.local/{}", request.project),
        })
    }
}

#[derive(Debug, Default)]
pub struct RecordingKeycloakAdmin {
    pub issued: AtomicUsize,
}

#[async_trait]
impl KeycloakAdmin for RecordingKeycloakAdmin {
    async fn client_exists(
        &self,
        _root: &KeycloakConnectorSpec,
        _client_id: &str,
    ) -> Result<bool, ConnectorError> {
        Ok(self.issued.load(Ordering::SeqCst) > 0)
    }

    async fn issue_secret(
        &self,
        _root: &KeycloakConnectorSpec,
        client_id: &str,
    ) -> Result<String, ConnectorError> {
        self.issued.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{client_id}-secret"))
    }
}

/// Everything a test needs, wired like the running controller
pub struct Harness {
    pub cluster: Arc<InMemoryCluster>,
    pub backend: Arc<InMemoryBackend>,
    pub ctx: EngineContext,
    pub connectors: ConnectorSet,
    pub postgres: Arc<RecordingPostgresAdmin>,
    pub rabbit: Arc<RecordingRabbitAdmin>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_postgres(RecordingPostgresAdmin::default())
    }

    pub fn with_postgres(postgres: RecordingPostgresAdmin) -> Self {
        let cluster = Arc::new(InMemoryCluster::new());
        let backend = Arc::new(InMemoryBackend::new());
        let postgres = Arc::new(postgres);
        let rabbit = Arc::new(RecordingRabbitAdmin::default());
        let ctx = EngineContext::new(
            Arc::clone(&cluster) as _,
            SecretGateway::new(Arc::clone(&backend) as _),
        );
        let connectors = ConnectorSet {
            postgres: Postgres::new(Arc::clone(&postgres) as _),
            rabbit: Rabbit::new(Arc::clone(&rabbit) as _),
            sentry: Sentry::new(Arc::new(RecordingSentryAdmin::default())),
            keycloak: Keycloak::new(Arc::new(RecordingKeycloakAdmin::default())),
        };
        Self {
            cluster,
            backend,
            ctx,
            connectors,
            postgres,
            rabbit,
        }
    }

    /// `pg` instance whose admin password lives in Vault
    pub fn with_postgres_instance(self) -> Self {
        self.backend.insert(
            "secret",
            "infra/pg",
            [("PASSWORD".to_string(), json!("root-pw"))].into_iter().collect(),
        );
        self.cluster
            .insert_instance(
                ConnectorKind::Postgres,
                "pg",
                &PostgresConnectorSpec {
                    host: "pg.svc".into(),
                    port: 5432,
                    database: "postgres".into(),
                    username: "postgres".into(),
                    password: "vault:secret/data/infra/pg#PASSWORD".into(),
                    readonly_username: None,
                },
            )
            .unwrap();
        self
    }
}

pub fn postgres_annotations(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(k, v)| (format!("postgres.connector.itlabs.io/{k}"), (*v).to_string()))
        .collect()
}

pub fn workload(annotations: BTreeMap<String, String>) -> WorkloadMeta {
    WorkloadMeta {
        annotations,
        labels: BTreeMap::from([("app".to_string(), "billing".to_string())]),
    }
}

/// Pod of a ReplicaSet with one container and the given annotations
pub fn pod(annotations: BTreeMap<String, String>) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some("billing-7d9f8-abcde".into()),
            namespace: Some("default".into()),
            labels: Some(BTreeMap::from([("app".to_string(), "billing".to_string())])),
            annotations: Some(annotations),
            owner_references: Some(vec![OwnerReference {
                api_version: "apps/v1".into(),
                kind: "ReplicaSet".into(),
                name: "billing-7d9f8".into(),
                uid: "rs-uid".into(),
                controller: Some(true),
                ..OwnerReference::default()
            }]),
            ..ObjectMeta::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: "app".into(),
                image: Some("billing:1.0".into()),
                ..Container::default()
            }],
            ..PodSpec::default()
        }),
        ..Pod::default()
    }
}
