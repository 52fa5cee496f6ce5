use crate::vault::Unvault;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Keycloak realm workloads get OpenID clients in
#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "KeycloakConnector",
    group = "itlabs.io",
    version = "v1",
    shortname = "kcc",
    printcolumn = r#"{"name":"URL", "type":"string", "jsonPath":".spec.url"}, {"name":"Realm", "type":"string", "jsonPath":".spec.realm"}"#
)]
pub struct KeycloakConnectorSpec {
    /// Keycloak base URL
    pub url: String,
    /// Realm clients are created in
    pub realm: String,
    /// Admin user in that realm
    pub username: String,
    /// Admin password
    pub password: String,
}

impl Unvault for KeycloakConnectorSpec {
    fn secret_fields(&mut self) -> Vec<(&'static str, &mut String)> {
        vec![
            ("url", &mut self.url),
            ("realm", &mut self.realm),
            ("username", &mut self.username),
            ("password", &mut self.password),
        ]
    }
}
