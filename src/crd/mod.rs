//! # Custom Resource Definitions
//!
//! Instance CRDs for the backing services the controller connects workloads to.
//!
//! Each resource is cluster-scoped and owned by infrastructure operators. It
//! describes one deployment of a backing service and how to reach its root
//! credentials. Any string field may be a fully qualified secret address
//! (`vault:{mount}/data/{path}#KEY`), which is resolved before use.
//!
//! # Example
//!
//! ```yaml
//! apiVersion: itlabs.io/v1
//! kind: PostgresConnector
//! metadata:
//!   name: pg
//! spec:
//!   host: postgres.db.svc
//!   port: 5432
//!   database: postgres
//!   username: vault:secret/data/infra/pg#USER
//!   password: vault:secret/data/infra/pg#PASSWORD
//! ```

mod keycloak;
mod postgres;
mod rabbit;
mod sentry;

pub use keycloak::{KeycloakConnector, KeycloakConnectorSpec};
pub use postgres::{PostgresConnector, PostgresConnectorSpec};
pub use rabbit::{RabbitConnector, RabbitConnectorSpec};
pub use sentry::{SentryConnector, SentryConnectorSpec};

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::core::CustomResourceExt;

/// All instance CRDs, in the order `crdgen` prints them
pub fn all_crds() -> Vec<CustomResourceDefinition> {
    vec![
        PostgresConnector::crd(),
        RabbitConnector::crd(),
        SentryConnector::crd(),
        KeycloakConnector::crd(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crds_are_cluster_scoped_in_itlabs_group() {
        for crd in all_crds() {
            assert_eq!(crd.spec.group, "itlabs.io");
            assert_eq!(crd.spec.scope, "Cluster");
            assert_eq!(crd.spec.versions[0].name, "v1");
        }
    }

    #[test]
    fn test_crd_plural_names() {
        let names: Vec<String> = all_crds()
            .into_iter()
            .map(|c| c.spec.names.plural)
            .collect();
        assert_eq!(
            names,
            vec![
                "postgresconnectors",
                "rabbitconnectors",
                "sentryconnectors",
                "keycloakconnectors"
            ]
        );
    }
}
