use crate::vault::Unvault;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// PostgreSQL server that workloads may request a database on
#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "PostgresConnector",
    group = "itlabs.io",
    version = "v1",
    shortname = "pgc",
    printcolumn = r#"{"name":"Host", "type":"string", "jsonPath":".spec.host"}, {"name":"Port", "type":"integer", "jsonPath":".spec.port"}"#
)]
pub struct PostgresConnectorSpec {
    /// Server hostname
    pub host: String,
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maintenance database the admin user connects to
    #[serde(default = "default_database")]
    pub database: String,
    /// Admin user name
    pub username: String,
    /// Admin password
    pub password: String,
    /// Existing role that receives read-only access to databases of workloads
    /// annotated with `grant-access-for-readonly-user`
    #[serde(default, rename = "readonly-username", skip_serializing_if = "Option::is_none")]
    pub readonly_username: Option<String>,
}

fn default_port() -> u16 {
    5432
}

fn default_database() -> String {
    "postgres".to_string()
}

impl Unvault for PostgresConnectorSpec {
    fn secret_fields(&mut self) -> Vec<(&'static str, &mut String)> {
        let mut fields = vec![
            ("host", &mut self.host),
            ("database", &mut self.database),
            ("username", &mut self.username),
            ("password", &mut self.password),
        ];
        if let Some(readonly) = self.readonly_username.as_mut() {
            fields.push(("readonly-username", readonly));
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let spec: PostgresConnectorSpec = serde_json::from_value(serde_json::json!({
            "host": "pg.svc",
            "username": "postgres",
            "password": "vault:secret/data/pg#PASSWORD"
        }))
        .unwrap();
        assert_eq!(spec.port, 5432);
        assert_eq!(spec.database, "postgres");
        assert_eq!(spec.readonly_username, None);
    }

    #[test]
    fn test_readonly_username_uses_kebab_case() {
        let spec: PostgresConnectorSpec = serde_json::from_value(serde_json::json!({
            "host": "pg.svc",
            "username": "postgres",
            "password": "x",
            "readonly-username": "reader"
        }))
        .unwrap();
        assert_eq!(spec.readonly_username.as_deref(), Some("reader"));
    }

    #[test]
    fn test_secret_fields_include_optional_readonly() {
        let mut spec = PostgresConnectorSpec {
            host: "h".into(),
            port: 5432,
            database: "postgres".into(),
            username: "u".into(),
            password: "p".into(),
            readonly_username: Some("r".into()),
        };
        let names: Vec<&str> = spec.secret_fields().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["host", "database", "username", "password", "readonly-username"]);
    }
}
