//! # Metrics Module
//!
//! Prometheus metrics for monitoring the controller, organized by responsibility.
//!
//! ## Sub-modules
//!
//! - `registry` - Metrics registry setup, registration and text exposition
//! - `connector_metrics` - Per-connector admission latencies and outcomes
//! - `client_metrics` - Outbound backing service API call latencies

pub mod client_metrics;
pub mod connector_metrics;
pub mod registry;

pub use client_metrics::*;
pub use connector_metrics::*;
pub use registry::*;
