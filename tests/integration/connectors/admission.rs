//! Admission hooks end to end: patch contents, diagnostic events.

use super::common::{pod, postgres_annotations, Harness};
use connector_controller::webhook::mutate::mutate_pod;
use connector_controller::webhook::validate::publish_diagnosis;
use connector_controller::webhook::WebhookState;
use json_patch::PatchOperation;
use k8s_openapi::api::core::v1::Pod;
use std::collections::BTreeMap;

fn state(harness: &Harness) -> WebhookState {
    WebhookState::new(harness.connectors.clone(), harness.ctx.clone())
}

fn patched(pod: &Pod, ops: Vec<PatchOperation>) -> Pod {
    let mut value = serde_json::to_value(pod).unwrap();
    json_patch::patch(&mut value, &ops).unwrap();
    serde_json::from_value(value).unwrap()
}

fn env_of(pod: &Pod) -> BTreeMap<String, String> {
    pod.spec.as_ref().unwrap().containers[0]
        .env
        .iter()
        .flatten()
        .map(|e| (e.name.clone(), e.value.clone().unwrap_or_default()))
        .collect()
}

#[tokio::test]
async fn test_missing_instance_leaves_pod_unpatched_and_emits_event() {
    let harness = Harness::new();
    let state = state(&harness);
    let pod = pod(postgres_annotations(&[
        ("instance-name", "pg"),
        ("vault-path", "vault:secret/data/app/db"),
        ("db-name", "app"),
        ("db-username", "app"),
    ]));

    let ops = mutate_pod(&state, &pod).await.unwrap();
    assert!(ops.is_empty());

    let published = publish_diagnosis(&state, &pod, "default").await;
    assert_eq!(published, 1);

    let events = harness.cluster.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].reason, "PostgresConnector");
    assert_eq!(events[0].message, "Postgres Custom Resource `pg` does not exist");
    assert_eq!(events[0].target.kind.as_deref(), Some("ReplicaSet"));
    assert_eq!(events[0].target.name.as_deref(), Some("billing-7d9f8"));
}

#[tokio::test]
async fn test_provisioned_pod_gets_references_and_no_event() {
    let harness = Harness::new().with_postgres_instance();
    let state = state(&harness);
    let pod = pod(postgres_annotations(&[
        ("instance-name", "pg"),
        ("vault-path", "vault:secret/data/billing/db"),
    ]));

    let ops = mutate_pod(&state, &pod).await.unwrap();
    assert_eq!(ops.len(), 1);
    let patched = patched(&pod, ops);

    let env = env_of(&patched);
    assert_eq!(env.len(), 5);
    assert_eq!(
        env["DATABASE_PASSWORD"],
        "vault:secret/data/billing/db#DATABASE_PASSWORD"
    );
    assert_eq!(env["DATABASE_HOST"], "vault:secret/data/billing/db#DATABASE_HOST");

    assert_eq!(publish_diagnosis(&state, &patched, "default").await, 0);
    assert!(harness.cluster.events().is_empty());
}

#[tokio::test]
async fn test_existing_variables_are_not_overwritten() {
    let harness = Harness::new().with_postgres_instance();
    let state = state(&harness);
    let mut pod = pod(postgres_annotations(&[
        ("instance-name", "pg"),
        ("vault-path", "vault:secret/data/billing/db"),
    ]));
    pod.spec.as_mut().unwrap().containers[0].env = Some(vec![
        k8s_openapi::api::core::v1::EnvVar {
            name: "DATABASE_HOST".into(),
            value: Some("localhost".into()),
            value_from: None,
        },
    ]);

    let ops = mutate_pod(&state, &pod).await.unwrap();
    let env = env_of(&patched(&pod, ops));

    assert_eq!(env["DATABASE_HOST"], "localhost");
    assert_eq!(env.len(), 5);
}

#[tokio::test]
async fn test_connectors_are_independent() {
    let harness = Harness::new().with_postgres_instance();
    let state = state(&harness);
    let mut annotations = postgres_annotations(&[
        ("instance-name", "pg"),
        ("vault-path", "vault:secret/data/billing/db"),
    ]);
    annotations.insert(
        "rabbit.connector.itlabs.io/instance-name".into(),
        "broker".into(),
    );
    annotations.insert(
        "rabbit.connector.itlabs.io/vault-path".into(),
        "vault:secret/data/billing/rabbit".into(),
    );
    let pod = pod(annotations);

    let ops = mutate_pod(&state, &pod).await.unwrap();
    let patched = patched(&pod, ops);
    let env = env_of(&patched);
    assert!(env.contains_key("DATABASE_USER"));
    assert!(!env.contains_key("BROKER_LOGIN"));
    assert!(harness.rabbit.calls.lock().unwrap().is_empty());

    publish_diagnosis(&state, &patched, "default").await;
    let events = harness.cluster.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].reason, "RabbitConnector");
}
