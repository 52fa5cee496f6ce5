//! # Connector Errors
//!
//! Failures of connector reconciliation and validation, classified as
//! application (configuration) or infrastructure problems.

use crate::vault::{AddressError, StoreError};
use thiserror::Error;

/// Who has to act on an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Workload or instance configuration is wrong; retrying will not help
    Application,
    /// A dependency failed; the hosting framework may retry
    Infrastructure,
}

/// Connector reconciliation and validation error
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConnectorError {
    #[error("{annotation} is not set in annotations")]
    MissingAnnotation { annotation: String },

    #[error("{annotation} is set in annotations but has an empty value")]
    EmptyAnnotation { annotation: String },

    #[error("Couldn't parse Vault secret path: {path} ({reason})")]
    MalformedAddress { path: String, reason: AddressError },

    #[error("{kind} Custom Resource `{name}` does not exist")]
    InstanceNotFound { kind: &'static str, name: String },

    #[error("Couldn't get root credentials for connecting to {service}")]
    RootCredentialUnavailable { service: &'static str },

    #[error("Vault path `{path}` already holds credentials for {existing}, but the workload requests {requested}")]
    ConflictingCredentialRequest {
        path: String,
        existing: String,
        requested: String,
    },

    #[error("Vault secret path `{path}` for application doesn't contain next keys: {}", .keys.join(", "))]
    MissingSecretKeys { path: String, keys: Vec<String> },

    #[error("Problems with {service}: {message}")]
    InfrastructureProblem {
        service: &'static str,
        message: String,
    },
}

impl ConnectorError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ConnectorError::MissingAnnotation { .. }
            | ConnectorError::EmptyAnnotation { .. }
            | ConnectorError::MalformedAddress { .. }
            | ConnectorError::ConflictingCredentialRequest { .. }
            | ConnectorError::MissingSecretKeys { .. } => ErrorClass::Application,
            ConnectorError::InstanceNotFound { .. }
            | ConnectorError::RootCredentialUnavailable { .. }
            | ConnectorError::InfrastructureProblem { .. } => ErrorClass::Infrastructure,
        }
    }

    pub fn is_application(&self) -> bool {
        self.class() == ErrorClass::Application
    }

    /// Stable name used as the `exception` metric label
    pub fn type_name(&self) -> &'static str {
        match self {
            ConnectorError::MissingAnnotation { .. } => "MissingAnnotation",
            ConnectorError::EmptyAnnotation { .. } => "EmptyAnnotation",
            ConnectorError::MalformedAddress { .. } => "MalformedAddress",
            ConnectorError::InstanceNotFound { .. } => "InstanceNotFound",
            ConnectorError::RootCredentialUnavailable { .. } => "RootCredentialUnavailable",
            ConnectorError::ConflictingCredentialRequest { .. } => "ConflictingCredentialRequest",
            ConnectorError::MissingSecretKeys { .. } => "MissingSecretKeys",
            ConnectorError::InfrastructureProblem { .. } => "InfrastructureProblem",
        }
    }

    pub fn infrastructure(service: &'static str, cause: impl std::fmt::Display) -> Self {
        ConnectorError::InfrastructureProblem {
            service,
            message: cause.to_string(),
        }
    }

    pub fn malformed(path: &str, reason: AddressError) -> Self {
        ConnectorError::MalformedAddress {
            path: path.to_string(),
            reason,
        }
    }
}

impl From<StoreError> for ConnectorError {
    fn from(e: StoreError) -> Self {
        ConnectorError::infrastructure("Vault", e)
    }
}

/// Render accumulated errors as one event message
pub fn render_diagnosis(errors: &[ConnectorError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
