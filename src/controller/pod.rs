//! # Pod Environment
//!
//! Injection of secret references into container environments and the JSON
//! patch that carries the change back to the API server.
//!
//! Injected values are references of the form `{vault_path}#{KEY}`, never
//! resolved secrets. A vault-env style injector in the pod resolves them at
//! container start.

use crate::controller::connectors::EnvTable;
use crate::vault::SecretAddress;
use json_patch::{AddOperation, PatchOperation};
use jsonptr::PointerBuf;
use k8s_openapi::api::core::v1::{Container, EnvVar, ObjectReference, Pod, PodSpec};

/// Reference string injected for one secret key
pub fn env_reference(vault_path: &SecretAddress, key: &str) -> String {
    format!("{}#{key}", vault_path.without_key())
}

fn all_containers_mut(spec: &mut PodSpec) -> impl Iterator<Item = &mut Container> {
    spec.containers
        .iter_mut()
        .chain(spec.init_containers.iter_mut().flatten())
}

/// Add every variable of `table` that a container or init container lacks
///
/// Existing variables are never overwritten. Returns whether anything was
/// added.
pub fn inject_env(spec: &mut PodSpec, vault_path: &SecretAddress, table: EnvTable) -> bool {
    let mut changed = false;
    for container in all_containers_mut(spec) {
        for (name, key) in table {
            let present = container
                .env
                .as_ref()
                .is_some_and(|env| env.iter().any(|e| e.name == *name));
            if present {
                continue;
            }
            container.env.get_or_insert_with(Vec::new).push(EnvVar {
                name: (*name).to_string(),
                value: Some(env_reference(vault_path, key)),
                value_from: None,
            });
            changed = true;
        }
    }
    changed
}

/// Whether some regular container already declares every variable of `table`
pub fn containers_have_envs(spec: &PodSpec, table: EnvTable) -> bool {
    spec.containers.iter().any(|container| {
        let env = container.env.as_deref().unwrap_or_default();
        table
            .iter()
            .all(|(name, _)| env.iter().any(|e| e.name == *name))
    })
}

/// Patch operations turning `original` container environments into `mutated` ones
///
/// Only `/spec/containers/{i}/env` and `/spec/initContainers/{i}/env` are
/// touched. `add` on an existing member replaces it, so one operation per
/// changed container covers both the "no env yet" and "env extended" cases.
///
/// # Errors
///
/// Fails if an environment list cannot be serialized.
pub fn env_patch(
    original: &PodSpec,
    mutated: &PodSpec,
) -> Result<Vec<PatchOperation>, serde_json::Error> {
    let empty = Vec::new();
    let sections = [
        ("containers", &original.containers, &mutated.containers),
        (
            "initContainers",
            original.init_containers.as_ref().unwrap_or(&empty),
            mutated.init_containers.as_ref().unwrap_or(&empty),
        ),
    ];

    let mut ops = Vec::new();
    for (section, before, after) in sections {
        for (index, (old, new)) in before.iter().zip(after.iter()).enumerate() {
            if old.env == new.env {
                continue;
            }
            let index = index.to_string();
            ops.push(PatchOperation::Add(AddOperation {
                path: PointerBuf::from_tokens(["spec", section, index.as_str(), "env"]),
                value: serde_json::to_value(new.env.as_deref().unwrap_or_default())?,
            }));
        }
    }
    Ok(ops)
}

/// Object a diagnostic event about `pod` is attached to
///
/// The controlling owner (e.g. the ReplicaSet) when there is one, otherwise
/// the pod itself.
pub fn event_target(pod: &Pod, namespace: &str) -> ObjectReference {
    let owner = pod
        .metadata
        .owner_references
        .iter()
        .flatten()
        .find(|o| o.controller == Some(true));
    match owner {
        Some(owner) => ObjectReference {
            api_version: Some(owner.api_version.clone()),
            kind: Some(owner.kind.clone()),
            name: Some(owner.name.clone()),
            namespace: Some(namespace.to_string()),
            uid: Some(owner.uid.clone()),
            ..Default::default()
        },
        None => ObjectReference {
            api_version: Some("v1".to_string()),
            kind: Some("Pod".to_string()),
            name: pod
                .metadata
                .name
                .clone()
                .or_else(|| pod.metadata.generate_name.clone()),
            namespace: Some(namespace.to_string()),
            uid: pod.metadata.uid.clone(),
            ..Default::default()
        },
    }
}

/// `{kind}/{name}` of the controlling owner, empty if there is none
pub fn owner_label(pod: &Pod) -> String {
    pod.metadata
        .owner_references
        .iter()
        .flatten()
        .find(|o| o.controller == Some(true))
        .map(|o| format!("{}/{}", o.kind, o.name))
        .unwrap_or_default()
}
