//! # Connector Status
//!
//! Per-event observability records and their metric label values.

use crate::controller::engine::Reconciliation;
use crate::controller::error::ConnectorError;

/// Outcome of one connector on one admission event
///
/// `None` fields are unknown because the run stopped before deciding them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectorStatus {
    pub is_used: Option<bool>,
    pub is_enabled: Option<bool>,
    pub exception: Option<&'static str>,
}

impl ConnectorStatus {
    pub fn from_result(result: &Result<Reconciliation, ConnectorError>) -> Self {
        match result {
            Ok(Reconciliation::Unused) => Self {
                is_used: Some(false),
                is_enabled: None,
                exception: None,
            },
            Ok(Reconciliation::Provisioned { .. }) => Self {
                is_used: Some(true),
                is_enabled: Some(true),
                exception: None,
            },
            Err(e @ ConnectorError::InstanceNotFound { .. }) => Self {
                is_used: Some(true),
                is_enabled: Some(false),
                exception: Some(e.type_name()),
            },
            Err(
                e @ (ConnectorError::MissingAnnotation { .. }
                | ConnectorError::EmptyAnnotation { .. }
                | ConnectorError::MalformedAddress { .. }),
            ) => Self {
                is_used: Some(true),
                is_enabled: None,
                exception: Some(e.type_name()),
            },
            Err(e) => Self {
                is_used: Some(true),
                is_enabled: Some(true),
                exception: Some(e.type_name()),
            },
        }
    }

    /// Replace the inferred `is_enabled` with an observed instance count check
    #[must_use]
    pub fn with_enabled(self, is_enabled: Option<bool>) -> Self {
        Self { is_enabled, ..self }
    }

    pub fn enabled_label(&self) -> &'static str {
        tri_state(self.is_enabled, "enabled", "disabled")
    }

    pub fn used_label(&self) -> &'static str {
        tri_state(self.is_used, "used", "unused")
    }

    pub fn exception_label(&self) -> &'static str {
        self.exception.unwrap_or("")
    }

    /// Outcome label for the reconciliation counter
    pub fn outcome_label(&self) -> &'static str {
        match (self.is_used, self.exception) {
            (Some(false), _) => "unused",
            (_, Some(_)) => "error",
            _ => "provisioned",
        }
    }
}

/// Outcome of the mutating hook for one connector
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationHookStatus {
    pub is_used: Option<bool>,
    pub is_success: Option<bool>,
    /// `{kind}/{name}` of the workload's controlling owner, if any
    pub owner: String,
}

impl MutationHookStatus {
    pub fn new(status: &ConnectorStatus, owner: impl Into<String>) -> Self {
        Self {
            is_used: status.is_used,
            is_success: match status.is_used {
                Some(true) => Some(status.exception.is_none()),
                _ => None,
            },
            owner: owner.into(),
        }
    }

    pub fn used_label(&self) -> &'static str {
        tri_state(self.is_used, "used", "unused")
    }

    pub fn success_label(&self) -> &'static str {
        tri_state(self.is_success, "success", "failure")
    }
}

fn tri_state(value: Option<bool>, yes: &'static str, no: &'static str) -> &'static str {
    match value {
        Some(true) => yes,
        Some(false) => no,
        None => "undefined",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::SecretAddress;

    #[test]
    fn test_unused() {
        let status = ConnectorStatus::from_result(&Ok(Reconciliation::Unused));
        assert_eq!(status.used_label(), "unused");
        assert_eq!(status.enabled_label(), "undefined");
        assert_eq!(status.exception_label(), "");
        assert_eq!(status.outcome_label(), "unused");
    }

    #[test]
    fn test_provisioned() {
        let status = ConnectorStatus::from_result(&Ok(Reconciliation::Provisioned {
            vault_path: SecretAddress::parse("vault:secret/data/app").unwrap(),
        }));
        assert_eq!(status.used_label(), "used");
        assert_eq!(status.enabled_label(), "enabled");
        assert_eq!(status.outcome_label(), "provisioned");
    }

    #[test]
    fn test_instance_not_found_is_disabled() {
        let status = ConnectorStatus::from_result(&Err(ConnectorError::InstanceNotFound {
            kind: "Postgres",
            name: "pg".into(),
        }));
        assert_eq!(status.enabled_label(), "disabled");
        assert_eq!(status.exception_label(), "InstanceNotFound");
        assert_eq!(status.outcome_label(), "error");
    }

    #[test]
    fn test_infrastructure_problem_keeps_enabled() {
        let status = ConnectorStatus::from_result(&Err(ConnectorError::infrastructure(
            "Rabbit", "refused",
        )));
        assert_eq!(status.enabled_label(), "enabled");
        assert_eq!(status.exception_label(), "InfrastructureProblem");
    }

    #[test]
    fn test_mutation_hook_status() {
        let failed = ConnectorStatus {
            is_used: Some(true),
            is_enabled: Some(true),
            exception: Some("InfrastructureProblem"),
        };
        let hook = MutationHookStatus::new(&failed, "ReplicaSet/app-7d9");
        assert_eq!(hook.used_label(), "used");
        assert_eq!(hook.success_label(), "failure");
        assert_eq!(hook.owner, "ReplicaSet/app-7d9");

        let unused = MutationHookStatus::new(&ConnectorStatus::default(), "");
        assert_eq!(unused.success_label(), "undefined");
    }
}
