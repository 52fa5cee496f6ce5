//! Mutating hook: reconcile connectors and inject environment references.

use super::{WebhookError, WebhookState};
use crate::controller::annotations::WorkloadMeta;
use crate::controller::connectors::ConnectorKind;
use crate::controller::engine::{apply, Reconciliation};
use crate::controller::error::ConnectorError;
use crate::controller::pod::{env_patch, owner_label};
use crate::controller::status::{ConnectorStatus, MutationHookStatus};
use crate::observability::metrics;
use axum::{extract::State, Json};
use futures::future::join_all;
use json_patch::PatchOperation;
use k8s_openapi::api::core::v1::Pod;
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Handle a mutating admission review for a pod
///
/// # Errors
///
/// `InvalidReview` when the body carries no request, `Patch` when the patch
/// cannot be attached.
pub async fn mutate_handler(
    State(state): State<Arc<WebhookState>>,
    Json(body): Json<AdmissionReview<Pod>>,
) -> Result<Json<AdmissionReview<DynamicObject>>, WebhookError> {
    let request: AdmissionRequest<Pod> = body
        .try_into()
        .map_err(|e| WebhookError::InvalidReview(format!("{e}")))?;

    let response = AdmissionResponse::from(&request);
    let Some(pod) = &request.object else {
        debug!(uid = %request.uid, "No pod in request, allowing unchanged");
        return Ok(Json(response.into_review()));
    };

    let ops = match mutate_pod(&state, pod).await {
        Ok(ops) => ops,
        Err(e) => {
            error!(uid = %request.uid, error = %e, "Failed to build environment patch");
            Vec::new()
        }
    };
    if ops.is_empty() {
        return Ok(Json(response.into_review()));
    }

    info!(uid = %request.uid, patch_ops = ops.len(), "Patching pod environment");
    Ok(Json(response.with_patch(json_patch::Patch(ops))?.into_review()))
}

/// Reconcile every connector against `pod` and return the environment patch
///
/// Connectors reconcile concurrently and their environment changes are
/// applied in [`ConnectorKind::ALL`] order. A failing connector only loses
/// its own variables.
///
/// # Errors
///
/// Fails if a patched environment cannot be serialized.
pub async fn mutate_pod(
    state: &WebhookState,
    pod: &Pod,
) -> Result<Vec<PatchOperation>, WebhookError> {
    let Some(original) = pod.spec.as_ref() else {
        return Ok(Vec::new());
    };
    let meta = WorkloadMeta::from(&pod.metadata);
    let owner = owner_label(pod);

    let meta = &meta;
    let outcomes = join_all(ConnectorKind::ALL.into_iter().map(|kind| async move {
        let started = Instant::now();
        let result = state.connectors.reconcile(kind, &state.ctx, meta).await;
        (kind, result, started.elapsed().as_secs_f64())
    }))
    .await;

    let mut mutated = original.clone();
    for (kind, result, seconds) in outcomes {
        let status = connector_status(state, kind, &result).await;
        metrics::observe_connector(kind, &status, seconds);
        metrics::observe_mutation_hook(
            kind,
            &MutationHookStatus::new(&status, owner.as_str()),
            seconds,
        );

        match result {
            Ok(reconciliation) => {
                if apply(kind, &reconciliation, &mut mutated) {
                    info!(connector = %kind, owner = %owner, "Injected connector environment");
                }
            }
            Err(e) if e.is_application() => {
                warn!(connector = %kind, owner = %owner, error = %e, "Connector misconfigured");
            }
            Err(e) => {
                error!(
                    connector = %kind,
                    owner = %owner,
                    error = %e,
                    "Connector reconciliation failed"
                );
            }
        }
    }

    Ok(env_patch(original, &mutated)?)
}

/// Status of one connector, with `enabled` observed from the cluster when
/// the workload uses it
async fn connector_status(
    state: &WebhookState,
    kind: ConnectorKind,
    result: &Result<Reconciliation, ConnectorError>,
) -> ConnectorStatus {
    let status = ConnectorStatus::from_result(result);
    if status.is_used != Some(true) {
        return status;
    }
    match state.ctx.cluster.has_instances(kind).await {
        Ok(enabled) => status.with_enabled(Some(enabled)),
        Err(e) => {
            debug!(connector = %kind, error = %e, "Could not count instances");
            status.with_enabled(None)
        }
    }
}
