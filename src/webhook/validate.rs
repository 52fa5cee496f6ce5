//! Validating hook: diagnose connectors the mutating hook could not apply.

use super::{WebhookError, WebhookState};
use crate::controller::validation::diagnose_pod;
use crate::observability::metrics;
use axum::{extract::State, Json};
use k8s_openapi::api::core::v1::Pod;
use kube::api::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Handle a validating admission review for a pod; always allows
///
/// # Errors
///
/// `InvalidReview` when the body carries no request.
pub async fn validate_handler(
    State(state): State<Arc<WebhookState>>,
    Json(body): Json<AdmissionReview<Pod>>,
) -> Result<Json<AdmissionReview<DynamicObject>>, WebhookError> {
    let request: AdmissionRequest<Pod> = body
        .try_into()
        .map_err(|e| WebhookError::InvalidReview(format!("{e}")))?;

    if let Some(pod) = &request.object {
        let namespace = request
            .namespace
            .clone()
            .or_else(|| pod.metadata.namespace.clone())
            .unwrap_or_default();
        publish_diagnosis(&state, pod, &namespace).await;
    } else {
        debug!(uid = %request.uid, "No pod in request");
    }

    Ok(Json(AdmissionResponse::from(&request).into_review()))
}

/// Publish one event per connector whose diagnosis is non-empty
///
/// Returns how many events were published.
pub async fn publish_diagnosis(state: &WebhookState, pod: &Pod, namespace: &str) -> usize {
    let mut published = 0;
    for (kind, event) in diagnose_pod(&state.connectors, &state.ctx, pod, namespace, true).await {
        match state.ctx.cluster.publish_event(&event).await {
            Ok(()) => {
                metrics::increment_validation_events(kind);
                published += 1;
                info!(connector = %kind, reason = %event.reason, "Published diagnostic event");
            }
            Err(e) => {
                error!(connector = %kind, error = %e, "Failed to publish diagnostic event");
            }
        }
    }
    published
}
