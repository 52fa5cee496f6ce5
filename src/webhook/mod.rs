//! # Admission Webhook
//!
//! Mutating and validating admission hooks for pods.
//!
//! - `POST /mutate` reconciles every requested connector and patches the
//!   container environments with secret references
//! - `POST /validate` publishes a diagnostic event for every requested
//!   connector whose variables are still missing
//!
//! Both hooks always admit the pod. A workload that cannot be connected
//! still runs, without the variables, and the event explains why.

pub mod mutate;
pub mod validate;

use crate::controller::engine::EngineContext;
use crate::controller::ConnectorSet;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use std::sync::Arc;

/// Shared state for webhook handlers
#[derive(Debug, Clone)]
pub struct WebhookState {
    pub connectors: ConnectorSet,
    pub ctx: EngineContext,
}

impl WebhookState {
    pub fn new(connectors: ConnectorSet, ctx: EngineContext) -> Self {
        Self { connectors, ctx }
    }
}

/// Error type for webhook operations
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The admission review request was invalid or malformed
    #[error("invalid admission review: {0}")]
    InvalidReview(String),

    /// An environment list could not be serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The patch could not be attached to the admission response
    #[error("patch serialization error: {0}")]
    Patch(#[from] kube::core::admission::SerializePatchError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::InvalidReview(_) => StatusCode::BAD_REQUEST,
            WebhookError::Serialization(_) | WebhookError::Patch(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(serde_json::json!({"error": self.to_string()}))).into_response()
    }
}

/// Create the webhook router with both admission endpoints
pub fn webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/mutate", post(mutate::mutate_handler))
        .route("/validate", post(validate::validate_handler))
        .with_state(state)
}
