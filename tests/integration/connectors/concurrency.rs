//! Concurrent reconciliations of one external resource.

use super::common::{postgres_annotations, workload, Harness, RecordingPostgresAdmin};
use connector_controller::controller::connectors::ConnectorKind;
use connector_controller::vault::SecretAddress;
use futures::future::join_all;
use std::sync::atomic::Ordering;
use std::time::Duration;

#[tokio::test]
async fn test_concurrent_first_writers_share_one_credential() {
    let harness = Harness::with_postgres(RecordingPostgresAdmin::with_delay(
        Duration::from_millis(20),
    ))
    .with_postgres_instance();
    let meta = workload(postgres_annotations(&[
        ("instance-name", "pg"),
        ("vault-path", "vault:secret/data/billing/db"),
    ]));

    let results = join_all((0..4).map(|_| {
        harness
            .connectors
            .reconcile(ConnectorKind::Postgres, &harness.ctx, &meta)
    }))
    .await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(harness.backend.write_count(), 1);
    assert_eq!(harness.postgres.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(harness.postgres.databases_created.load(Ordering::SeqCst), 1);

    let path = SecretAddress::parse("vault:secret/data/billing/db").unwrap();
    let stored = harness.ctx.secrets.read_at(&path).await.unwrap().unwrap();
    let calls = harness.postgres.calls.lock().unwrap();
    assert!(calls
        .iter()
        .all(|grant| grant.password == stored["DATABASE_PASSWORD"].as_str().unwrap()));
}

#[tokio::test]
async fn test_unrelated_resources_run_concurrently() {
    let harness = Harness::with_postgres(RecordingPostgresAdmin::with_delay(
        Duration::from_millis(50),
    ))
    .with_postgres_instance();
    let first = workload(postgres_annotations(&[
        ("instance-name", "pg"),
        ("vault-path", "vault:secret/data/billing/db"),
    ]));
    let second = workload(postgres_annotations(&[
        ("instance-name", "pg"),
        ("vault-path", "vault:secret/data/orders/db"),
        ("db-name", "orders"),
        ("db-username", "orders"),
    ]));

    let (a, b) = tokio::join!(
        harness
            .connectors
            .reconcile(ConnectorKind::Postgres, &harness.ctx, &first),
        harness
            .connectors
            .reconcile(ConnectorKind::Postgres, &harness.ctx, &second),
    );

    assert!(a.is_ok() && b.is_ok());
    assert_eq!(harness.postgres.max_in_flight.load(Ordering::SeqCst), 2);
    assert_eq!(harness.postgres.databases_created.load(Ordering::SeqCst), 2);
}
