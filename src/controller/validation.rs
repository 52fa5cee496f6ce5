//! # Validation Service
//!
//! Read-only diagnosis of a workload's connector configuration. Unlike the
//! engine, every check runs and every problem is collected, so the operator
//! sees the whole picture in one event.

use crate::controller::annotations::WorkloadMeta;
use crate::controller::cluster::DiagnosticEvent;
use crate::controller::connectors::{Connector, ConnectorKind};
use crate::controller::engine::EngineContext;
use crate::controller::error::{render_diagnosis, ConnectorError};
use crate::controller::pod::{containers_have_envs, event_target};
use crate::controller::ConnectorSet;
use crate::vault::SecretAddress;
use k8s_openapi::api::core::v1::{ObjectReference, Pod};
use tracing::{debug, warn};

/// Collect every problem that keeps `connector` from serving the workload
///
/// # Errors
///
/// The accumulated diagnosis; `Ok` means nothing was found.
pub async fn validate<C: Connector + ?Sized>(
    connector: &C,
    ctx: &EngineContext,
    meta: &WorkloadMeta,
) -> Result<(), Vec<ConnectorError>> {
    let kind = connector.kind();
    let mut errors = match meta.resolve(kind, connector.annotation_rules()) {
        Ok(_) => Vec::new(),
        Err(errors) => errors,
    };

    if let Some(name) = non_empty(meta.annotation(&kind.annotation("instance-name"))) {
        match ctx.cluster.instance_spec(kind, name).await {
            Ok(Some(_)) => {}
            Ok(None) => errors.push(ConnectorError::InstanceNotFound {
                kind: kind.service_name(),
                name: name.to_string(),
            }),
            Err(e) => errors.push(e),
        }
    }

    if let Some(raw) = non_empty(meta.annotation(&kind.annotation("vault-path"))) {
        match SecretAddress::parse(raw) {
            Ok(address) => {
                if let Err(e) = check_secret_keys(kind, ctx, &address.without_key()).await {
                    errors.push(e);
                }
            }
            Err(reason) => errors.push(ConnectorError::malformed(raw, reason)),
        }
    }

    if errors.is_empty() {
        debug!(connector = %kind, "Validation found no problems");
        Ok(())
    } else {
        warn!(connector = %kind, problems = errors.len(), "Validation found problems");
        Err(errors)
    }
}

/// An existing workload secret must hold every key the env table references
async fn check_secret_keys(
    kind: ConnectorKind,
    ctx: &EngineContext,
    path: &SecretAddress,
) -> Result<(), ConnectorError> {
    let Some(secret) = ctx.secrets.read_at(path).await.map_err(|e| {
        ConnectorError::infrastructure("Vault", format!("couldn't read secret `{path}`: {e}"))
    })?
    else {
        return Ok(());
    };

    let missing: Vec<String> = kind
        .required_secret_keys()
        .into_iter()
        .filter(|key| !secret.contains_key(*key))
        .map(str::to_string)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ConnectorError::MissingSecretKeys {
            path: path.to_string(),
            keys: missing,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Error event carrying the rendered diagnosis
pub fn diagnostic_event(
    kind: ConnectorKind,
    target: ObjectReference,
    errors: &[ConnectorError],
) -> DiagnosticEvent {
    DiagnosticEvent {
        target,
        reason: kind.reason().to_string(),
        message: render_diagnosis(errors),
    }
}

/// Diagnose every connector the pod requests
///
/// With `skip_patched`, connectors whose variables are already present in
/// some container are trusted and not checked.
pub async fn diagnose_pod(
    connectors: &ConnectorSet,
    ctx: &EngineContext,
    pod: &Pod,
    namespace: &str,
    skip_patched: bool,
) -> Vec<(ConnectorKind, DiagnosticEvent)> {
    let meta = WorkloadMeta::from(&pod.metadata);
    let mut events = Vec::new();
    for kind in ConnectorKind::ALL {
        if !connectors.applies(kind, &meta) {
            continue;
        }
        let patched = pod
            .spec
            .as_ref()
            .is_some_and(|spec| containers_have_envs(spec, kind.env_table()));
        if skip_patched && patched {
            continue;
        }
        if let Err(errors) = connectors.validate(kind, ctx, &meta).await {
            events.push((kind, diagnostic_event(kind, event_target(pod, namespace), &errors)));
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::cluster::InMemoryCluster;
    use crate::controller::connectors::postgres::{DatabaseGrant, PostgresAdmin};
    use crate::controller::connectors::Postgres;
    use crate::crd::PostgresConnectorSpec;
    use crate::vault::{InMemoryBackend, SecretData, SecretGateway};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    #[derive(Debug)]
    struct UnusedAdmin;

    #[async_trait]
    impl PostgresAdmin for UnusedAdmin {
        async fn provision(
            &self,
            _root: &PostgresConnectorSpec,
            _grant: &DatabaseGrant,
        ) -> Result<(), ConnectorError> {
            panic!("validation must not provision")
        }
    }

    fn meta(annotations: &[(&str, &str)]) -> WorkloadMeta {
        WorkloadMeta {
            annotations: annotations
                .iter()
                .map(|(k, v)| (format!("postgres.connector.itlabs.io/{k}"), (*v).to_string()))
                .collect(),
            labels: BTreeMap::from([("app".to_string(), "app".to_string())]),
        }
    }

    fn instance() -> PostgresConnectorSpec {
        PostgresConnectorSpec {
            host: "pg.svc".into(),
            port: 5432,
            database: "postgres".into(),
            username: "postgres".into(),
            password: "root".into(),
            readonly_username: None,
        }
    }

    fn setup() -> (Arc<InMemoryCluster>, Arc<InMemoryBackend>, EngineContext) {
        let cluster = Arc::new(InMemoryCluster::new());
        let backend = Arc::new(InMemoryBackend::new());
        let ctx = EngineContext::new(
            Arc::clone(&cluster) as _,
            SecretGateway::new(Arc::clone(&backend) as _),
        );
        (cluster, backend, ctx)
    }

    #[tokio::test]
    async fn test_collects_every_problem() {
        let (_cluster, _backend, ctx) = setup();
        let connector = Postgres::new(Arc::new(UnusedAdmin));

        let errors = validate(
            &connector,
            &ctx,
            &meta(&[("instance-name", "pg"), ("vault-path", "secret/app/db")]),
        )
        .await
        .unwrap_err();

        let kinds: Vec<_> = errors.iter().map(ConnectorError::type_name).collect();
        assert_eq!(kinds, vec!["InstanceNotFound", "MalformedAddress"]);
    }

    #[tokio::test]
    async fn test_reports_exactly_the_missing_key() {
        let (cluster, backend, ctx) = setup();
        cluster
            .insert_instance(ConnectorKind::Postgres, "pg", &instance())
            .unwrap();
        let secret: SecretData = [
            "DATABASE_HOST",
            "DATABASE_PORT",
            "DATABASE_NAME",
            "DATABASE_USER",
        ]
        .into_iter()
        .map(|k| (k.to_string(), json!("x")))
        .collect();
        backend.insert("secret", "app/db", secret);
        let connector = Postgres::new(Arc::new(UnusedAdmin));

        let errors = validate(
            &connector,
            &ctx,
            &meta(&[("instance-name", "pg"), ("vault-path", "vault:secret/data/app/db")]),
        )
        .await
        .unwrap_err();

        assert_eq!(
            errors,
            vec![ConnectorError::MissingSecretKeys {
                path: "vault:secret/data/app/db".into(),
                keys: vec!["DATABASE_PASSWORD".into()],
            }]
        );
    }

    #[tokio::test]
    async fn test_absent_secret_is_fine() {
        let (cluster, _backend, ctx) = setup();
        cluster
            .insert_instance(ConnectorKind::Postgres, "pg", &instance())
            .unwrap();
        let connector = Postgres::new(Arc::new(UnusedAdmin));

        validate(
            &connector,
            &ctx,
            &meta(&[("instance-name", "pg"), ("vault-path", "vault:secret/data/app/db")]),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_empty_annotation_and_unreachable_store() {
        let (cluster, backend, ctx) = setup();
        cluster
            .insert_instance(ConnectorKind::Postgres, "pg", &instance())
            .unwrap();
        backend.set_unavailable(true);
        let connector = Postgres::new(Arc::new(UnusedAdmin));

        let errors = validate(
            &connector,
            &ctx,
            &meta(&[
                ("instance-name", "pg"),
                ("vault-path", "vault:secret/data/app/db"),
                ("db-name", " "),
            ]),
        )
        .await
        .unwrap_err();

        let kinds: Vec<_> = errors.iter().map(ConnectorError::type_name).collect();
        assert_eq!(kinds, vec!["EmptyAnnotation", "InfrastructureProblem"]);
        assert!(errors[1].to_string().contains("couldn't read secret `vault:secret/data/app/db`"));
    }

    #[test]
    fn test_diagnostic_event() {
        let event = diagnostic_event(
            ConnectorKind::Rabbit,
            ObjectReference::default(),
            &[ConnectorError::RootCredentialUnavailable { service: "Rabbit" }],
        );
        assert_eq!(event.reason, "RabbitConnector");
        assert_eq!(event.message, "Couldn't get root credentials for connecting to Rabbit");
    }
}
