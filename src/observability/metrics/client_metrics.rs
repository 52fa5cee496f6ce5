//! # Client Metrics
//!
//! Latency of outbound calls from the provisioning adapters to backing
//! service APIs.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{HistogramOpts, HistogramVec};
use std::sync::LazyLock;

/// Label value for a status code or exception that does not apply
pub const UNKNOWN: &str = "unknown";

const CLIENT_LATENCY_BUCKETS: [f64; 14] = [
    0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0, 2.5, 5.0, 7.5, 10.0,
];

pub(crate) static CLIENT_LATENCY: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "app_http_request_operator_client_latency_seconds",
            "Duration of outbound requests to backing service APIs in seconds",
        )
        .buckets(CLIENT_LATENCY_BUCKETS.to_vec()),
        &["uri", "status_code", "method", "exception_name"],
    )
    .expect("Failed to create CLIENT_LATENCY metric - this should never happen")
});

/// Register client metrics with the registry
pub(crate) fn register_client_metrics() -> Result<()> {
    REGISTRY.register(Box::new(CLIENT_LATENCY.clone()))?;
    Ok(())
}

/// Record one outbound request
///
/// `uri` is the origin of the called API (`scheme://host:port/`). A request
/// that got an answer has a `status_code` and no exception; one that failed
/// in transport has an `exception_name` and no status.
pub fn observe_client_request(
    uri: &str,
    method: &str,
    status_code: Option<u16>,
    exception_name: Option<&str>,
    seconds: f64,
) {
    let status = status_code.map(|code| code.to_string());
    CLIENT_LATENCY
        .with_label_values(&[
            uri,
            status.as_deref().unwrap_or(UNKNOWN),
            method,
            exception_name.unwrap_or(UNKNOWN),
        ])
        .observe(seconds);
}
