use crate::vault::Unvault;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// RabbitMQ cluster reachable through its management API
#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "RabbitConnector",
    group = "itlabs.io",
    version = "v1",
    shortname = "rbc",
    printcolumn = r#"{"name":"Broker", "type":"string", "jsonPath":".spec.brokerHost"}, {"name":"API", "type":"string", "jsonPath":".spec.url"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RabbitConnectorSpec {
    /// AMQP hostname handed to workloads
    pub broker_host: String,
    /// AMQP port handed to workloads
    #[serde(default = "default_broker_port")]
    pub broker_port: u16,
    /// Management API base URL
    pub url: String,
    /// Management API user
    pub username: String,
    /// Management API password
    pub password: String,
}

fn default_broker_port() -> u16 {
    5672
}

impl Unvault for RabbitConnectorSpec {
    fn secret_fields(&mut self) -> Vec<(&'static str, &mut String)> {
        vec![
            ("brokerHost", &mut self.broker_host),
            ("url", &mut self.url),
            ("username", &mut self.username),
            ("password", &mut self.password),
        ]
    }
}
