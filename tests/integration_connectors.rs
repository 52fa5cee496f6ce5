//! Connector Integration Tests
//!
//! These tests drive the reconciliation engine, the validation service and
//! the admission hooks end to end against:
//! 1. An in-memory secret backend with real check-and-set semantics
//! 2. An in-memory cluster gateway
//! 3. Recording provisioning adapters that model server-side state
//!
//! Run with: `cargo test --test integration_connectors`

#[path = "integration/connectors/mod.rs"]
mod connectors;

pub use connectors::*;
