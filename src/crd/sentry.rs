use crate::vault::Unvault;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Sentry installation and the organization workloads are registered in
#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "SentryConnector",
    group = "itlabs.io",
    version = "v1",
    shortname = "sc",
    printcolumn = r#"{"name":"URL", "type":"string", "jsonPath":".spec.url"}, {"name":"Organization", "type":"string", "jsonPath":".spec.organization"}"#
)]
pub struct SentryConnectorSpec {
    /// Sentry base URL
    pub url: String,
    /// API token with team/project/key write scopes
    pub token: String,
    /// Organization slug
    #[serde(default = "default_organization")]
    pub organization: String,
}

fn default_organization() -> String {
    "sentry".to_string()
}

impl Unvault for SentryConnectorSpec {
    fn secret_fields(&mut self) -> Vec<(&'static str, &mut String)> {
        vec![
            ("url", &mut self.url),
            ("token", &mut self.token),
            ("organization", &mut self.organization),
        ]
    }
}
