//! # Controller
//!
//! Connector reconciliation and validation for admitted workloads.
//!
//! ## Sub-modules
//!
//! - `annotations` - annotation rules and their resolution
//! - `cluster` - instance lookup, pods and diagnostic events
//! - `connectors` - per-backing-service connectors and adapters
//! - `engine` - the shared reconciliation algorithm
//! - `error` - connector error taxonomy
//! - `hashing` - source hash of an external side effect
//! - `lock` - in-process source lock
//! - `passgen` - generated credential passwords
//! - `pod` - env injection and admission patches
//! - `status` - connector status and metric labels
//! - `validation` - read-only diagnosis

pub mod annotations;
pub mod cluster;
pub mod connectors;
pub mod engine;
pub mod error;
pub mod hashing;
pub mod lock;
pub mod passgen;
pub mod pod;
pub mod status;
pub mod validation;

use crate::controller::annotations::WorkloadMeta;
use crate::controller::connectors::keycloak::HttpKeycloakAdmin;
use crate::controller::connectors::postgres::SqlxPostgresAdmin;
use crate::controller::connectors::rabbit::HttpRabbitAdmin;
use crate::controller::connectors::sentry::HttpSentryAdmin;
use crate::controller::connectors::{Connector, ConnectorKind, Keycloak, Postgres, Rabbit, Sentry};
use crate::controller::engine::{EngineContext, Reconciliation};
use crate::controller::error::ConnectorError;
use std::sync::Arc;
use std::time::Duration;

/// One connector of every kind, dispatched by [`ConnectorKind`]
#[derive(Debug, Clone)]
pub struct ConnectorSet {
    pub postgres: Postgres,
    pub rabbit: Rabbit,
    pub sentry: Sentry,
    pub keycloak: Keycloak,
}

impl ConnectorSet {
    /// Connectors backed by the real SQL and REST adapters
    ///
    /// # Errors
    ///
    /// Fails if an HTTP client cannot be built.
    pub fn with_adapters(timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            postgres: Postgres::new(Arc::new(SqlxPostgresAdmin::new(timeout))),
            rabbit: Rabbit::new(Arc::new(HttpRabbitAdmin::new(timeout)?)),
            sentry: Sentry::new(Arc::new(HttpSentryAdmin::new(timeout)?)),
            keycloak: Keycloak::new(Arc::new(HttpKeycloakAdmin::new(timeout)?)),
        })
    }

    /// Whether the workload requests the connector
    pub fn applies(&self, kind: ConnectorKind, meta: &WorkloadMeta) -> bool {
        fn check<C: Connector>(connector: &C, meta: &WorkloadMeta) -> bool {
            meta.applies_to(
                connector.kind(),
                connector.annotation_rules(),
                connector.required_labels(),
            )
        }
        match kind {
            ConnectorKind::Postgres => check(&self.postgres, meta),
            ConnectorKind::Rabbit => check(&self.rabbit, meta),
            ConnectorKind::Sentry => check(&self.sentry, meta),
            ConnectorKind::Keycloak => check(&self.keycloak, meta),
        }
    }

    /// See [`engine::reconcile`]
    ///
    /// # Errors
    ///
    /// As [`engine::reconcile`].
    pub async fn reconcile(
        &self,
        kind: ConnectorKind,
        ctx: &EngineContext,
        meta: &WorkloadMeta,
    ) -> Result<Reconciliation, ConnectorError> {
        match kind {
            ConnectorKind::Postgres => engine::reconcile(&self.postgres, ctx, meta).await,
            ConnectorKind::Rabbit => engine::reconcile(&self.rabbit, ctx, meta).await,
            ConnectorKind::Sentry => engine::reconcile(&self.sentry, ctx, meta).await,
            ConnectorKind::Keycloak => engine::reconcile(&self.keycloak, ctx, meta).await,
        }
    }

    /// See [`validation::validate`]
    ///
    /// # Errors
    ///
    /// The accumulated diagnosis.
    pub async fn validate(
        &self,
        kind: ConnectorKind,
        ctx: &EngineContext,
        meta: &WorkloadMeta,
    ) -> Result<(), Vec<ConnectorError>> {
        match kind {
            ConnectorKind::Postgres => validation::validate(&self.postgres, ctx, meta).await,
            ConnectorKind::Rabbit => validation::validate(&self.rabbit, ctx, meta).await,
            ConnectorKind::Sentry => validation::validate(&self.sentry, ctx, meta).await,
            ConnectorKind::Keycloak => validation::validate(&self.keycloak, ctx, meta).await,
        }
    }
}
