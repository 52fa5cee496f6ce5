//! # Cluster Gateway
//!
//! Reads instance resources and pods, and publishes diagnostic events.
//! [`KubeCluster`] talks to the API server; [`InMemoryCluster`] backs tests
//! and local tooling.

use crate::constants::EVENT_REPORTING_COMPONENT;
use crate::controller::connectors::ConnectorKind;
use crate::controller::error::ConnectorError;
use crate::crd::{KeycloakConnector, PostgresConnector, RabbitConnector, SentryConnector};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Event, EventSource, ObjectReference, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{ApiResource, DynamicObject, ListParams, PostParams};
use kube::{Api, Client};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

const SERVICE: &str = "Kubernetes";

/// Event type of every diagnostic event
pub const EVENT_TYPE_ERROR: &str = "Error";

/// Diagnosis attached to a cluster object
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticEvent {
    pub target: ObjectReference,
    /// Connector reason code, e.g. `PostgresConnector`
    pub reason: String,
    pub message: String,
}

#[async_trait]
pub trait ClusterGateway: Send + Sync + std::fmt::Debug {
    /// Spec of the named instance resource, `None` if it does not exist
    async fn instance_spec(
        &self,
        kind: ConnectorKind,
        name: &str,
    ) -> Result<Option<serde_json::Value>, ConnectorError>;

    /// Whether at least one instance resource of `kind` exists
    async fn has_instances(&self, kind: ConnectorKind) -> Result<bool, ConnectorError>;

    async fn publish_event(&self, event: &DiagnosticEvent) -> Result<(), ConnectorError>;

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, ConnectorError>;
}

/// API resource of the instance custom resource for `kind`
pub fn instance_resource(kind: ConnectorKind) -> ApiResource {
    match kind {
        ConnectorKind::Postgres => ApiResource::erase::<PostgresConnector>(&()),
        ConnectorKind::Rabbit => ApiResource::erase::<RabbitConnector>(&()),
        ConnectorKind::Sentry => ApiResource::erase::<SentryConnector>(&()),
        ConnectorKind::Keycloak => ApiResource::erase::<KeycloakConnector>(&()),
    }
}

#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl std::fmt::Debug for KubeCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeCluster").finish_non_exhaustive()
    }
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn instances(&self, kind: ConnectorKind) -> Api<DynamicObject> {
        Api::all_with(self.client.clone(), &instance_resource(kind))
    }
}

#[async_trait]
impl ClusterGateway for KubeCluster {
    async fn instance_spec(
        &self,
        kind: ConnectorKind,
        name: &str,
    ) -> Result<Option<serde_json::Value>, ConnectorError> {
        let object = self
            .instances(kind)
            .get_opt(name)
            .await
            .map_err(|e| ConnectorError::infrastructure(SERVICE, e))?;
        Ok(object.map(|o| {
            o.data
                .get("spec")
                .cloned()
                .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new()))
        }))
    }

    async fn has_instances(&self, kind: ConnectorKind) -> Result<bool, ConnectorError> {
        let list = self
            .instances(kind)
            .list(&ListParams::default().limit(1))
            .await
            .map_err(|e| ConnectorError::infrastructure(SERVICE, e))?;
        Ok(!list.items.is_empty())
    }

    async fn publish_event(&self, event: &DiagnosticEvent) -> Result<(), ConnectorError> {
        let namespace = event
            .target
            .namespace
            .clone()
            .unwrap_or_else(|| "default".to_string());
        let name = event.target.name.clone().unwrap_or_default();
        let api: Api<Event> = Api::namespaced(self.client.clone(), &namespace);
        let body = Event {
            metadata: ObjectMeta {
                generate_name: Some(format!("{name}.")),
                namespace: Some(namespace.clone()),
                ..Default::default()
            },
            involved_object: event.target.clone(),
            type_: Some(EVENT_TYPE_ERROR.to_string()),
            reason: Some(event.reason.clone()),
            message: Some(event.message.clone()),
            count: Some(1),
            source: Some(EventSource {
                component: Some(EVENT_REPORTING_COMPONENT.to_string()),
                host: None,
            }),
            reporting_component: Some(EVENT_REPORTING_COMPONENT.to_string()),
            ..Default::default()
        };
        api.create(&PostParams::default(), &body)
            .await
            .map_err(|e| ConnectorError::infrastructure(SERVICE, e))?;
        info!(
            namespace = %namespace,
            object = %name,
            reason = %event.reason,
            "Published diagnostic event"
        );
        Ok(())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, ConnectorError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .map_err(|e| ConnectorError::infrastructure(SERVICE, e))
    }
}

/// In-process cluster with the same lookup semantics as [`KubeCluster`]
#[derive(Debug, Default)]
pub struct InMemoryCluster {
    instances: Mutex<HashMap<(ConnectorKind, String), serde_json::Value>>,
    pods: Mutex<HashMap<(String, String), Pod>>,
    events: Mutex<Vec<DiagnosticEvent>>,
    unavailable: AtomicBool,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an instance spec
    ///
    /// # Errors
    ///
    /// Fails if `spec` does not serialize to JSON.
    pub fn insert_instance<S: Serialize>(
        &self,
        kind: ConnectorKind,
        name: &str,
        spec: &S,
    ) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(spec)?;
        self.instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((kind, name.to_string()), value);
        Ok(())
    }

    pub fn insert_pod(&self, namespace: &str, pod: Pod) {
        let name = pod.metadata.name.clone().unwrap_or_default();
        self.pods
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((namespace.to_string(), name), pod);
    }

    /// Make every call fail as if the API server were unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Events published so far, oldest first
    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn check_available(&self) -> Result<(), ConnectorError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ConnectorError::infrastructure(SERVICE, "API server unreachable"));
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterGateway for InMemoryCluster {
    async fn instance_spec(
        &self,
        kind: ConnectorKind,
        name: &str,
    ) -> Result<Option<serde_json::Value>, ConnectorError> {
        self.check_available()?;
        Ok(self
            .instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(kind, name.to_string()))
            .cloned())
    }

    async fn has_instances(&self, kind: ConnectorKind) -> Result<bool, ConnectorError> {
        self.check_available()?;
        Ok(self
            .instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .any(|(k, _)| *k == kind))
    }

    async fn publish_event(&self, event: &DiagnosticEvent) -> Result<(), ConnectorError> {
        self.check_available()?;
        debug!(reason = %event.reason, "Recording diagnostic event");
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, ConnectorError> {
        self.check_available()?;
        Ok(self
            .pods
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }
}
