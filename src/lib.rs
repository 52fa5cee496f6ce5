//! # Connector Controller
//!
//! A Kubernetes admission controller that connects workloads to backing
//! services (PostgreSQL, RabbitMQ, Sentry, Keycloak) without hand-written
//! credentials.
//!
//! ## Overview
//!
//! On every pod admission the controller:
//!
//! 1. **Reads connector annotations** - `{connector}.connector.itlabs.io/*`
//! 2. **Resolves the instance** - a cluster-scoped custom resource with the
//!    backing service's root credentials, which may themselves live in Vault
//! 3. **Gets or creates the workload credential** in Vault, under a source lock
//! 4. **Provisions the backing service** idempotently (user, database, vhost,
//!    project, client)
//! 5. **Patches the pod** so containers receive `vault:...#KEY` references,
//!    never the secrets themselves
//!
//! A second, validating hook re-checks connectors whose variables are still
//! missing and publishes an `Error` event explaining why.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod runtime;
pub mod vault;
pub mod webhook;
