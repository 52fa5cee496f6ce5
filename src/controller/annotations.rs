//! # Workload Annotations
//!
//! Applicability and request values come from pod annotations in the
//! `{connector}.connector.itlabs.io` group, with label fallbacks for resource
//! names.

use crate::controller::connectors::ConnectorKind;
use crate::controller::error::ConnectorError;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

/// Where an annotation's value comes from when it is not set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// No fallback; the connector is unused without it
    Required,
    /// Value of the named pod label
    Label(&'static str),
    /// Fixed default value
    Value(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnotationRule {
    /// Name below the connector group, e.g. `vault-path`
    pub name: &'static str,
    pub fallback: Fallback,
}

impl AnnotationRule {
    pub const fn required(name: &'static str) -> Self {
        Self {
            name,
            fallback: Fallback::Required,
        }
    }

    pub const fn label(name: &'static str, label: &'static str) -> Self {
        Self {
            name,
            fallback: Fallback::Label(label),
        }
    }

    pub const fn value(name: &'static str, value: &'static str) -> Self {
        Self {
            name,
            fallback: Fallback::Value(value),
        }
    }
}

/// Annotations and labels of the workload under admission
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkloadMeta {
    pub annotations: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
}

impl WorkloadMeta {
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    /// Whether every required annotation and label is present (values may
    /// still be empty)
    pub fn applies_to(
        &self,
        kind: ConnectorKind,
        rules: &[AnnotationRule],
        required_labels: &[&str],
    ) -> bool {
        rules
            .iter()
            .filter(|rule| rule.fallback == Fallback::Required)
            .all(|rule| self.annotations.contains_key(&kind.annotation(rule.name)))
            && required_labels.iter().all(|l| self.labels.contains_key(*l))
    }

    /// Resolve every rule to a non-empty value
    ///
    /// # Errors
    ///
    /// Every missing or empty value, in rule order.
    pub fn resolve(
        &self,
        kind: ConnectorKind,
        rules: &[AnnotationRule],
    ) -> Result<ResolvedAnnotations, Vec<ConnectorError>> {
        let mut values = BTreeMap::new();
        let mut errors = Vec::new();
        for rule in rules {
            let key = kind.annotation(rule.name);
            let value = match (self.annotation(&key), rule.fallback) {
                (Some(v), _) => Some(v),
                (None, Fallback::Required) => None,
                (None, Fallback::Label(label)) => self.label(label),
                (None, Fallback::Value(v)) => Some(v),
            };
            match value {
                None => errors.push(ConnectorError::MissingAnnotation { annotation: key }),
                Some(v) if v.trim().is_empty() => {
                    errors.push(ConnectorError::EmptyAnnotation { annotation: key });
                }
                Some(v) => {
                    values.insert(rule.name, v.trim().to_string());
                }
            }
        }
        if errors.is_empty() {
            Ok(ResolvedAnnotations { values })
        } else {
            Err(errors)
        }
    }
}

impl From<&ObjectMeta> for WorkloadMeta {
    fn from(meta: &ObjectMeta) -> Self {
        Self {
            annotations: meta.annotations.clone().unwrap_or_default(),
            labels: meta.labels.clone().unwrap_or_default(),
        }
    }
}

/// Non-empty value for every rule of one connector
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedAnnotations {
    values: BTreeMap<&'static str, String>,
}

impl ResolvedAnnotations {
    /// Value of a rule; empty for names the connector does not declare
    pub fn value(&self, name: &str) -> &str {
        self.values.get(name).map_or("", String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULES: &[AnnotationRule] = &[
        AnnotationRule::required("instance-name"),
        AnnotationRule::required("vault-path"),
        AnnotationRule::label("db-name", "app"),
        AnnotationRule::value("grant-access-for-readonly-user", "false"),
    ];

    fn meta(annotations: &[(&str, &str)], labels: &[(&str, &str)]) -> WorkloadMeta {
        WorkloadMeta {
            annotations: annotations
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            labels: labels
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_applicability_needs_required_annotations() {
        let kind = ConnectorKind::Postgres;
        let partial = meta(&[("postgres.connector.itlabs.io/instance-name", "pg")], &[]);
        assert!(!partial.applies_to(kind, RULES, &[]));

        let full = meta(
            &[
                ("postgres.connector.itlabs.io/instance-name", "pg"),
                ("postgres.connector.itlabs.io/vault-path", ""),
            ],
            &[],
        );
        assert!(full.applies_to(kind, RULES, &[]));
        assert!(!full.applies_to(kind, RULES, &["app"]));
    }

    #[test]
    fn test_resolve_uses_label_and_value_fallbacks() {
        let resolved = meta(
            &[
                ("postgres.connector.itlabs.io/instance-name", "pg"),
                ("postgres.connector.itlabs.io/vault-path", "vault:secret/data/app"),
            ],
            &[("app", "billing")],
        )
        .resolve(ConnectorKind::Postgres, RULES)
        .unwrap();

        assert_eq!(resolved.value("db-name"), "billing");
        assert_eq!(resolved.value("grant-access-for-readonly-user"), "false");
        assert_eq!(resolved.value("unknown"), "");
    }

    #[test]
    fn test_resolve_accumulates_errors() {
        let errors = meta(&[("postgres.connector.itlabs.io/instance-name", " ")], &[])
            .resolve(ConnectorKind::Postgres, RULES)
            .unwrap_err();

        assert_eq!(
            errors,
            vec![
                ConnectorError::EmptyAnnotation {
                    annotation: "postgres.connector.itlabs.io/instance-name".into()
                },
                ConnectorError::MissingAnnotation {
                    annotation: "postgres.connector.itlabs.io/vault-path".into()
                },
                ConnectorError::MissingAnnotation {
                    annotation: "postgres.connector.itlabs.io/db-name".into()
                },
            ]
        );
    }
}
