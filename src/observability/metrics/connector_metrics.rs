//! # Connector Metrics
//!
//! Admission latencies per connector, labelled from the connector status
//! records, plus outcome and validation-event counters.

use crate::controller::connectors::ConnectorKind;
use crate::controller::status::{ConnectorStatus, MutationHookStatus};
use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts};
use std::sync::LazyLock;

const LATENCY_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

static APP_UP: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new("app_up", "Whether the controller is serving admission requests")
        .expect("Failed to create APP_UP metric - this should never happen")
});

static OPERATOR_LATENCY: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "app_http_request_operator_latency_seconds",
            "Duration of one connector reconciliation in seconds",
        )
        .buckets(LATENCY_BUCKETS.to_vec()),
        &["connector_type", "enabled", "used", "exception"],
    )
    .expect("Failed to create OPERATOR_LATENCY metric - this should never happen")
});

static MUTATION_HOOK_LATENCY: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "app_mutation_admission_hook_latency_seconds",
            "Duration of one connector within the mutating admission hook in seconds",
        )
        .buckets(LATENCY_BUCKETS.to_vec()),
        &["connector_type", "used", "success", "owner"],
    )
    .expect("Failed to create MUTATION_HOOK_LATENCY metric - this should never happen")
});

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "connector_reconciliations_total",
            "Total number of connector reconciliations by outcome",
        ),
        &["connector_type", "outcome"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static VALIDATION_EVENTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "connector_validation_events_total",
            "Total number of diagnostic events published by the validating hook",
        ),
        &["connector_type"],
    )
    .expect("Failed to create VALIDATION_EVENTS_TOTAL metric - this should never happen")
});

/// Register connector metrics with the registry
pub(crate) fn register_connector_metrics() -> Result<()> {
    REGISTRY.register(Box::new(APP_UP.clone()))?;
    REGISTRY.register(Box::new(OPERATOR_LATENCY.clone()))?;
    REGISTRY.register(Box::new(MUTATION_HOOK_LATENCY.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(VALIDATION_EVENTS_TOTAL.clone()))?;
    Ok(())
}

pub fn set_app_up(up: bool) {
    APP_UP.set(i64::from(up));
}

/// Record one reconciliation: latency by status labels and the outcome counter
pub fn observe_connector(kind: ConnectorKind, status: &ConnectorStatus, seconds: f64) {
    OPERATOR_LATENCY
        .with_label_values(&[
            kind.metric_label(),
            status.enabled_label(),
            status.used_label(),
            status.exception_label(),
        ])
        .observe(seconds);
    RECONCILIATIONS_TOTAL
        .with_label_values(&[kind.metric_label(), status.outcome_label()])
        .inc();
}

pub fn observe_mutation_hook(kind: ConnectorKind, status: &MutationHookStatus, seconds: f64) {
    MUTATION_HOOK_LATENCY
        .with_label_values(&[
            kind.metric_label(),
            status.used_label(),
            status.success_label(),
            status.owner.as_str(),
        ])
        .observe(seconds);
}

pub fn increment_validation_events(kind: ConnectorKind) {
    VALIDATION_EVENTS_TOTAL
        .with_label_values(&[kind.metric_label()])
        .inc();
}
