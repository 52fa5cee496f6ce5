//! # Reconciliation Engine
//!
//! The algorithm every connector shares:
//!
//! 1. applicability from annotations (otherwise [`Reconciliation::Unused`])
//! 2. instance resource lookup
//! 3. unvaulting of the instance's root credentials
//! 4. source hash and source lock
//! 5. get-or-create of the workload credential
//! 6. idempotent provisioning of the backing service
//! 7. lock release
//! 8. environment injection ([`apply`])
//!
//! Steps 1-7 have side effects outside the pod and run in [`reconcile`].
//! Step 8 is pure and runs against the pod spec afterwards, so several
//! connectors can reconcile concurrently against one admission request.

use crate::controller::annotations::WorkloadMeta;
use crate::controller::cluster::ClusterGateway;
use crate::controller::connectors::{Connector, ConnectorKind};
use crate::controller::error::ConnectorError;
use crate::controller::hashing::source_hash;
use crate::controller::lock::SourceLock;
use crate::controller::pod::inject_env;
use crate::vault::{SecretAddress, SecretData, SecretGateway};
use k8s_openapi::api::core::v1::PodSpec;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};

/// Shared collaborators of every reconciliation
#[derive(Debug, Clone)]
pub struct EngineContext {
    pub cluster: Arc<dyn ClusterGateway>,
    pub secrets: SecretGateway,
    pub locks: Arc<SourceLock>,
}

impl EngineContext {
    pub fn new(cluster: Arc<dyn ClusterGateway>, secrets: SecretGateway) -> Self {
        Self {
            cluster,
            secrets,
            locks: Arc::new(SourceLock::new()),
        }
    }
}

/// Successful outcome of [`reconcile`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// The workload does not request this connector
    Unused,
    /// Credential and backing-service resources exist; inject references to
    /// `vault_path`
    Provisioned { vault_path: SecretAddress },
}

/// Run steps 1-7 for one connector
///
/// # Errors
///
/// The first application error of the request, or any failure while
/// resolving the instance, touching the secret store or provisioning.
pub async fn reconcile<C: Connector + ?Sized>(
    connector: &C,
    ctx: &EngineContext,
    meta: &WorkloadMeta,
) -> Result<Reconciliation, ConnectorError> {
    let kind = connector.kind();
    if !meta.applies_to(kind, connector.annotation_rules(), connector.required_labels()) {
        debug!(connector = %kind, "Connector not requested");
        return Ok(Reconciliation::Unused);
    }

    let resolved = meta
        .resolve(kind, connector.annotation_rules())
        .map_err(first_error)?;
    let request = connector.request(&resolved)?;
    let binding = connector.binding(&request);

    let span = info_span!(
        "connector.reconcile",
        connector = %kind,
        instance = %binding.instance_name,
        vault_path = %binding.vault_path
    );
    async {
        let instance = resolve_instance(connector, ctx, &binding.instance_name).await?;

        let identity = connector.source_identity(&instance, &request);
        let key = source_hash(&identity)
            .map_err(|e| ConnectorError::infrastructure(kind.service_name(), e))?;

        let guard = ctx.locks.acquire(key).await;
        let provisioned = connector.provision(ctx, &instance, &request).await;
        drop(guard);
        provisioned?;

        info!("Connector provisioned");
        Ok(Reconciliation::Provisioned {
            vault_path: binding.vault_path.clone(),
        })
    }
    .instrument(span)
    .await
}

/// Step 8: inject the connector's environment references into `spec`
///
/// Returns whether the pod spec changed.
pub fn apply(kind: ConnectorKind, reconciliation: &Reconciliation, spec: &mut PodSpec) -> bool {
    match reconciliation {
        Reconciliation::Unused => false,
        Reconciliation::Provisioned { vault_path } => {
            inject_env(spec, vault_path, kind.env_table())
        }
    }
}

/// Steps 2-3: fetch, parse and unvault the named instance
async fn resolve_instance<C: Connector + ?Sized>(
    connector: &C,
    ctx: &EngineContext,
    name: &str,
) -> Result<C::Instance, ConnectorError> {
    let kind = connector.kind();
    let spec = ctx
        .cluster
        .instance_spec(kind, name)
        .await?
        .ok_or_else(|| ConnectorError::InstanceNotFound {
            kind: kind.service_name(),
            name: name.to_string(),
        })?;

    let mut instance: C::Instance = serde_json::from_value(spec).map_err(|e| {
        ConnectorError::infrastructure(
            "Kubernetes",
            format!("invalid {} `{name}`: {e}", kind.reason()),
        )
    })?;
    ctx.secrets.unvault(&mut instance).await?;

    if !connector.root_complete(&instance) {
        warn!(instance = %name, "Instance root credentials did not resolve");
        return Err(ConnectorError::RootCredentialUnavailable {
            service: kind.service_name(),
        });
    }
    Ok(instance)
}

fn first_error(mut errors: Vec<ConnectorError>) -> ConnectorError {
    if errors.is_empty() {
        ConnectorError::infrastructure("Controller", "annotation resolution failed without a cause")
    } else {
        errors.swap_remove(0)
    }
}

/// Step 5: read the workload credential at `path`, creating it if absent
///
/// `identity` lists the `(key, expected value)` pairs an existing credential
/// must match. The created payload comes from `fresh` and is written
/// create-only; when another writer wins the race, the winner's payload is
/// checked and returned instead.
///
/// # Errors
///
/// `ConflictingCredentialRequest` when the stored identity differs, or an
/// infrastructure error from the secret store.
pub async fn get_or_create_credential(
    ctx: &EngineContext,
    path: &SecretAddress,
    identity: &[(&str, &str)],
    fresh: impl FnOnce() -> SecretData + Send,
) -> Result<SecretData, ConnectorError> {
    if let Some(existing) = ctx.secrets.read_at(path).await? {
        check_identity(path, &existing, identity)?;
        debug!(path = %path, "Reusing workload credential");
        return Ok(existing);
    }

    let stored = ctx.secrets.create_if_absent(path, fresh()).await?;
    check_identity(path, &stored, identity)?;
    Ok(stored)
}

/// Error unless every identity key of `stored` holds its expected value
///
/// # Errors
///
/// `ConflictingCredentialRequest` listing both identities.
pub fn check_identity(
    path: &SecretAddress,
    stored: &SecretData,
    identity: &[(&str, &str)],
) -> Result<(), ConnectorError> {
    let matches = identity
        .iter()
        .all(|(key, expected)| secret_str(stored, key) == Some(*expected));
    if matches {
        return Ok(());
    }
    let render = |values: Vec<String>| values.join(", ");
    Err(ConnectorError::ConflictingCredentialRequest {
        path: path.to_string(),
        existing: render(
            identity
                .iter()
                .map(|(key, _)| format!("{key}={}", secret_str(stored, key).unwrap_or("")))
                .collect(),
        ),
        requested: render(
            identity
                .iter()
                .map(|(key, expected)| format!("{key}={expected}"))
                .collect(),
        ),
    })
}

/// String value of `key` in `data`
pub fn secret_str<'a>(data: &'a SecretData, key: &str) -> Option<&'a str> {
    data.get(key).and_then(serde_json::Value::as_str)
}
