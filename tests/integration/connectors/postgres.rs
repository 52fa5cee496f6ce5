//! Get-or-create idempotence and conflict detection for the database
//! connector.

use super::common::{postgres_annotations, workload, Harness};
use connector_controller::controller::connectors::ConnectorKind;
use connector_controller::controller::engine::Reconciliation;
use connector_controller::controller::error::ConnectorError;
use connector_controller::vault::SecretAddress;
use serde_json::json;

#[tokio::test]
async fn test_reconcile_twice_provisions_once() {
    let harness = Harness::new().with_postgres_instance();
    let meta = workload(postgres_annotations(&[
        ("instance-name", "pg"),
        ("vault-path", "vault:secret/data/billing/db"),
    ]));
    let path = SecretAddress::parse("vault:secret/data/billing/db").unwrap();

    let first = harness
        .connectors
        .reconcile(ConnectorKind::Postgres, &harness.ctx, &meta)
        .await
        .unwrap();
    let credential = harness.ctx.secrets.read_at(&path).await.unwrap().unwrap();

    let second = harness
        .connectors
        .reconcile(ConnectorKind::Postgres, &harness.ctx, &meta)
        .await
        .unwrap();
    let again = harness.ctx.secrets.read_at(&path).await.unwrap().unwrap();

    assert_eq!(first, Reconciliation::Provisioned { vault_path: path.clone() });
    assert_eq!(first, second);
    assert_eq!(credential, again);
    assert_eq!(harness.backend.write_count(), 1);
    assert_eq!(
        harness
            .postgres
            .databases_created
            .load(std::sync::atomic::Ordering::SeqCst),
        1
    );

    assert_eq!(credential["DATABASE_USER"], json!("billing"));
    assert_eq!(credential["DATABASE_NAME"], json!("billing"));
    assert_eq!(credential["DATABASE_HOST"], json!("pg.svc"));
    assert_eq!(credential["DATABASE_PORT"], json!("5432"));
    let calls = harness.postgres.calls.lock().unwrap();
    assert_eq!(calls[0].password, credential["DATABASE_PASSWORD"].as_str().unwrap());
}

#[tokio::test]
async fn test_conflicting_request_performs_no_external_mutation() {
    let harness = Harness::new().with_postgres_instance();
    harness.backend.insert(
        "secret",
        "billing/db",
        [
            ("DATABASE_USER".to_string(), json!("u1")),
            ("DATABASE_NAME".to_string(), json!("billing")),
            ("DATABASE_PASSWORD".to_string(), json!("pw")),
        ]
        .into_iter()
        .collect(),
    );
    let meta = workload(postgres_annotations(&[
        ("instance-name", "pg"),
        ("vault-path", "vault:secret/data/billing/db"),
        ("db-username", "u2"),
    ]));

    let err = harness
        .connectors
        .reconcile(ConnectorKind::Postgres, &harness.ctx, &meta)
        .await
        .unwrap_err();

    assert!(matches!(err, ConnectorError::ConflictingCredentialRequest { .. }));
    assert!(err.is_application());
    assert_eq!(harness.postgres.call_count(), 0);
    assert_eq!(harness.backend.write_count(), 0);
}

#[tokio::test]
async fn test_unresolvable_root_password() {
    let harness = Harness::new().with_postgres_instance();
    harness.backend.insert("secret", "infra/pg", Default::default());
    let meta = workload(postgres_annotations(&[
        ("instance-name", "pg"),
        ("vault-path", "vault:secret/data/billing/db"),
    ]));

    let err = harness
        .connectors
        .reconcile(ConnectorKind::Postgres, &harness.ctx, &meta)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        ConnectorError::RootCredentialUnavailable { service: "Postgres" }
    );
    assert_eq!(harness.postgres.call_count(), 0);
}

#[tokio::test]
async fn test_workload_without_annotations_is_unused() {
    let harness = Harness::new().with_postgres_instance();
    let meta = workload(Default::default());

    for kind in ConnectorKind::ALL {
        let outcome = harness
            .connectors
            .reconcile(kind, &harness.ctx, &meta)
            .await
            .unwrap();
        assert_eq!(outcome, Reconciliation::Unused);
    }
    assert_eq!(harness.postgres.call_count(), 0);
}
