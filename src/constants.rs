//! # Constants
//!
//! Default values and fixed identifiers used across the controller.

/// Default port for the admission webhook listener
pub const DEFAULT_WEBHOOK_PORT: u16 = 8443;

/// Default port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default server startup timeout in seconds
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default server readiness poll interval in milliseconds
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default timeout for backing-service adapter calls in seconds
pub const DEFAULT_ADAPTER_TIMEOUT_SECS: u64 = 5;

/// Default Vault address
pub const DEFAULT_VAULT_URL: &str = "http://localhost:8200";

/// Default Vault Kubernetes auth mount
pub const DEFAULT_VAULT_K8S_AUTH_METHOD: &str = "kube-dev";

/// Default Vault Kubernetes auth role
pub const DEFAULT_VAULT_K8S_ROLE: &str = "k8s-itlabs-operator";

/// Projected service account token used for Vault Kubernetes auth
pub const SERVICE_ACCOUNT_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// API group of the instance custom resources
pub const CRD_GROUP: &str = "itlabs.io";

/// Suffix shared by every connector annotation group
pub const ANNOTATION_GROUP_SUFFIX: &str = "connector.itlabs.io";

/// Label whose value names the application when resource-name annotations are omitted
pub const APP_NAME_LABEL: &str = "app";

/// Replacement for sensitive values in log output
pub const MASK: &str = "******";

/// Default tracing filter when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "connector_controller=info";

/// Component name written into emitted cluster events
pub const EVENT_REPORTING_COMPONENT: &str = "connector-controller";
