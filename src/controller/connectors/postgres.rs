//! # Postgres Connector
//!
//! One database and one login role per workload on a shared PostgreSQL
//! server. The workload credential holds host, port, database name, user and
//! a generated password.

use super::{all_resolved, is_truthy, Binding, Connector, ConnectorKind, EnvTable};
use crate::controller::annotations::{AnnotationRule, ResolvedAnnotations};
use crate::controller::engine::{get_or_create_credential, secret_str, EngineContext};
use crate::controller::error::ConnectorError;
use crate::controller::passgen::generate_password;
use crate::crd::PostgresConnectorSpec;
use crate::vault::SecretData;
use async_trait::async_trait;
use serde_json::json;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const DATABASE_HOST: &str = "DATABASE_HOST";
pub const DATABASE_PORT: &str = "DATABASE_PORT";
pub const DATABASE_NAME: &str = "DATABASE_NAME";
pub const DATABASE_USER: &str = "DATABASE_USER";
pub const DATABASE_PASSWORD: &str = "DATABASE_PASSWORD";

pub const ENV_VARS: EnvTable = &[
    (DATABASE_HOST, DATABASE_HOST),
    (DATABASE_PORT, DATABASE_PORT),
    (DATABASE_NAME, DATABASE_NAME),
    (DATABASE_USER, DATABASE_USER),
    (DATABASE_PASSWORD, DATABASE_PASSWORD),
];

const RULES: &[AnnotationRule] = &[
    AnnotationRule::required("instance-name"),
    AnnotationRule::required("vault-path"),
    AnnotationRule::label("db-name", crate::constants::APP_NAME_LABEL),
    AnnotationRule::label("db-username", crate::constants::APP_NAME_LABEL),
    AnnotationRule::value("grant-access-for-readonly-user", "false"),
];

const SERVICE: &str = "Postgres";

const USER_EXISTS: &str = "SELECT 1 FROM pg_catalog.pg_user WHERE usename = $1";
const DATABASE_EXISTS: &str = "SELECT 1 FROM pg_catalog.pg_database WHERE datname = $1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresRequest {
    pub binding: Binding,
    pub db_name: String,
    pub db_username: String,
    pub grant_readonly: bool,
}

/// What the admin adapter has to make true on the server
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseGrant {
    pub database: String,
    pub username: String,
    pub password: String,
    /// Existing role to receive read-only access to `database`
    pub readonly_username: Option<String>,
}

impl std::fmt::Debug for DatabaseGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseGrant")
            .field("database", &self.database)
            .field("username", &self.username)
            .field("readonly_username", &self.readonly_username)
            .finish_non_exhaustive()
    }
}

/// Idempotent database provisioning with the instance's admin credentials
#[async_trait]
pub trait PostgresAdmin: Send + Sync + std::fmt::Debug {
    async fn provision(
        &self,
        root: &PostgresConnectorSpec,
        grant: &DatabaseGrant,
    ) -> Result<(), ConnectorError>;
}

#[derive(Debug, Clone)]
pub struct Postgres {
    admin: Arc<dyn PostgresAdmin>,
}

impl Postgres {
    pub fn new(admin: Arc<dyn PostgresAdmin>) -> Self {
        Self { admin }
    }
}

#[async_trait]
impl Connector for Postgres {
    type Instance = PostgresConnectorSpec;
    type Request = PostgresRequest;

    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Postgres
    }

    fn annotation_rules(&self) -> &'static [AnnotationRule] {
        RULES
    }

    fn request(&self, resolved: &ResolvedAnnotations) -> Result<PostgresRequest, ConnectorError> {
        Ok(PostgresRequest {
            binding: Binding::from_annotations(resolved)?,
            db_name: resolved.value("db-name").to_string(),
            db_username: resolved.value("db-username").to_string(),
            grant_readonly: is_truthy(Some(resolved.value("grant-access-for-readonly-user"))),
        })
    }

    fn binding<'a>(&self, request: &'a PostgresRequest) -> &'a Binding {
        &request.binding
    }

    fn root_complete(&self, instance: &PostgresConnectorSpec) -> bool {
        all_resolved(&[
            &instance.host,
            &instance.database,
            &instance.username,
            &instance.password,
        ])
    }

    fn source_identity(
        &self,
        instance: &PostgresConnectorSpec,
        request: &PostgresRequest,
    ) -> Vec<String> {
        vec![
            instance.host.clone(),
            instance.port.to_string(),
            request.db_name.clone(),
            request.db_username.clone(),
        ]
    }

    async fn provision(
        &self,
        ctx: &EngineContext,
        instance: &PostgresConnectorSpec,
        request: &PostgresRequest,
    ) -> Result<(), ConnectorError> {
        let path = &request.binding.vault_path;
        let credential = get_or_create_credential(
            ctx,
            path,
            &[
                (DATABASE_USER, request.db_username.as_str()),
                (DATABASE_NAME, request.db_name.as_str()),
            ],
            || fresh_credential(instance, request),
        )
        .await?;

        let password = secret_str(&credential, DATABASE_PASSWORD).ok_or_else(|| {
            ConnectorError::MissingSecretKeys {
                path: path.to_string(),
                keys: vec![DATABASE_PASSWORD.to_string()],
            }
        })?;

        let readonly_username = if request.grant_readonly {
            if instance.readonly_username.is_none() {
                warn!(
                    instance = %request.binding.instance_name,
                    "Read-only access requested but the instance has no readonly-username"
                );
            }
            instance.readonly_username.clone()
        } else {
            None
        };

        self.admin
            .provision(
                instance,
                &DatabaseGrant {
                    database: request.db_name.clone(),
                    username: request.db_username.clone(),
                    password: password.to_string(),
                    readonly_username,
                },
            )
            .await
    }
}

fn fresh_credential(instance: &PostgresConnectorSpec, request: &PostgresRequest) -> SecretData {
    [
        (DATABASE_HOST, json!(instance.host)),
        (DATABASE_PORT, json!(instance.port.to_string())),
        (DATABASE_NAME, json!(request.db_name)),
        (DATABASE_USER, json!(request.db_username)),
        (DATABASE_PASSWORD, json!(generate_password())),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// [`PostgresAdmin`] over sqlx, connecting with the instance's admin user
#[derive(Debug, Clone)]
pub struct SqlxPostgresAdmin {
    timeout: Duration,
}

impl SqlxPostgresAdmin {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn connect(
        &self,
        root: &PostgresConnectorSpec,
        database: &str,
    ) -> Result<PgPool, ConnectorError> {
        let options = PgConnectOptions::new()
            .host(&root.host)
            .port(root.port)
            .username(&root.username)
            .password(&root.password)
            .database(database);
        PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(self.timeout)
            .connect_with(options)
            .await
            .map_err(pg_error)
    }

    async fn exists(pool: &PgPool, query: &str, name: &str) -> Result<bool, ConnectorError> {
        let row = sqlx::query(query)
            .bind(name)
            .fetch_optional(pool)
            .await
            .map_err(pg_error)?;
        Ok(row.is_some())
    }

    async fn execute(pool: &PgPool, statement: &str) -> Result<(), ConnectorError> {
        sqlx::raw_sql(statement)
            .execute(pool)
            .await
            .map_err(pg_error)?;
        Ok(())
    }

    async fn grant_readonly(
        &self,
        root: &PostgresConnectorSpec,
        grant: &DatabaseGrant,
        reader: &str,
    ) -> Result<(), ConnectorError> {
        let pool = self.connect(root, &grant.database).await?;
        let already = sqlx::query(
            "SELECT 1 FROM information_schema.table_privileges \
             WHERE grantee = $1 AND table_catalog = $2 AND privilege_type = 'SELECT' \
             UNION \
             SELECT 1 FROM pg_default_acl acl \
             JOIN pg_namespace ns ON ns.oid = acl.defaclnamespace \
             WHERE acl.defaclacl::text ILIKE $3",
        )
        .bind(reader)
        .bind(&grant.database)
        .bind(format!("%{reader}=r/{}%", grant.username))
        .fetch_optional(&pool)
        .await
        .map_err(pg_error)?
        .is_some();

        if already {
            info!(database = %grant.database, reader, "Read-only access already granted");
        } else {
            let sql = readonly_grant_sql(&root.username, &grant.username, reader);
            Self::execute(&pool, &sql).await?;
            info!(database = %grant.database, reader, "Granted read-only access");
        }
        pool.close().await;
        Ok(())
    }
}

#[async_trait]
impl PostgresAdmin for SqlxPostgresAdmin {
    async fn provision(
        &self,
        root: &PostgresConnectorSpec,
        grant: &DatabaseGrant,
    ) -> Result<(), ConnectorError> {
        let pool = self.connect(root, &root.database).await?;
        let user = quote_ident(&grant.username);
        let database = quote_ident(&grant.database);
        let password = quote_literal(&grant.password);

        if Self::exists(&pool, USER_EXISTS, &grant.username).await? {
            let sql = format!("ALTER USER {user} WITH ENCRYPTED PASSWORD {password}");
            Self::execute(&pool, &sql).await?;
            warn!(user = %grant.username, "User already exists, password set from credential");
        } else {
            let sql = format!("CREATE USER {user} WITH ENCRYPTED PASSWORD {password}");
            Self::execute(&pool, &sql).await?;
            info!(user = %grant.username, "Created user");
        }

        if Self::exists(&pool, DATABASE_EXISTS, &grant.database).await? {
            warn!(database = %grant.database, "Database already exists");
        } else {
            // The admin must be a member of the owner role to create a
            // database owned by it.
            let admin = quote_ident(&root.username);
            Self::execute(&pool, &format!("GRANT {user} TO {admin}")).await?;
            Self::execute(&pool, &format!("CREATE DATABASE {database} WITH OWNER = {user}")).await?;
            Self::execute(&pool, &format!("REVOKE {user} FROM {admin}")).await?;
            info!(database = %grant.database, "Created database");
        }
        let sql = format!("GRANT ALL PRIVILEGES ON DATABASE {database} TO {user}");
        Self::execute(&pool, &sql).await?;
        pool.close().await;

        if let Some(reader) = grant.readonly_username.as_deref() {
            self.grant_readonly(root, grant, reader).await?;
        }
        Ok(())
    }
}

/// Statements giving `reader` select access to everything `owner` creates
fn readonly_grant_sql(admin: &str, owner: &str, reader: &str) -> String {
    let admin = quote_ident(admin);
    let owner = quote_ident(owner);
    let reader = quote_ident(reader);
    format!(
        "GRANT {owner} TO {admin};\n\
         GRANT USAGE ON SCHEMA public TO {reader};\n\
         GRANT SELECT ON ALL TABLES IN SCHEMA public TO {reader};\n\
         GRANT SELECT ON ALL SEQUENCES IN SCHEMA public TO {reader};\n\
         ALTER DEFAULT PRIVILEGES IN SCHEMA public GRANT SELECT ON TABLES TO {reader};\n\
         ALTER DEFAULT PRIVILEGES IN SCHEMA public GRANT SELECT ON SEQUENCES TO {reader};\n\
         ALTER DEFAULT PRIVILEGES FOR USER {owner} IN SCHEMA public GRANT SELECT ON TABLES TO {reader};\n\
         ALTER DEFAULT PRIVILEGES FOR USER {owner} IN SCHEMA public GRANT SELECT ON SEQUENCES TO {reader};\n\
         REVOKE {owner} FROM {admin};"
    )
}

/// Double-quoted SQL identifier
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Single-quoted SQL string literal
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn pg_error(e: sqlx::Error) -> ConnectorError {
    ConnectorError::infrastructure(SERVICE, e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::annotations::WorkloadMeta;

    fn resolved(pairs: &[(&str, &str)], labels: &[(&str, &str)]) -> ResolvedAnnotations {
        let meta = WorkloadMeta {
            annotations: pairs
                .iter()
                .map(|(k, v)| (format!("postgres.connector.itlabs.io/{k}"), (*v).to_string()))
                .collect(),
            labels: labels
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        };
        meta.resolve(ConnectorKind::Postgres, RULES).unwrap()
    }

    #[derive(Debug)]
    struct NoopAdmin;

    #[async_trait]
    impl PostgresAdmin for NoopAdmin {
        async fn provision(
            &self,
            _: &PostgresConnectorSpec,
            _: &DatabaseGrant,
        ) -> Result<(), ConnectorError> {
            Ok(())
        }
    }

    #[test]
    fn test_request_defaults_to_app_label() {
        let connector = Postgres::new(Arc::new(NoopAdmin));
        let request = connector
            .request(&resolved(
                &[("instance-name", "pg"), ("vault-path", "vault:secret/data/app/db")],
                &[("app", "billing")],
            ))
            .unwrap();
        assert_eq!(request.db_name, "billing");
        assert_eq!(request.db_username, "billing");
        assert!(!request.grant_readonly);
        assert_eq!(request.binding.vault_path.to_string(), "vault:secret/data/app/db");
    }

    #[test]
    fn test_request_rejects_malformed_vault_path() {
        let connector = Postgres::new(Arc::new(NoopAdmin));
        let err = connector
            .request(&resolved(
                &[
                    ("instance-name", "pg"),
                    ("vault-path", "secret/app"),
                    ("db-name", "app"),
                    ("db-username", "app"),
                ],
                &[],
            ))
            .unwrap_err();
        assert_eq!(err.type_name(), "MalformedAddress");
        assert!(err.is_application());
    }

    #[test]
    fn test_fresh_credential_stores_port_as_string() {
        let instance = PostgresConnectorSpec {
            host: "pg.svc".into(),
            port: 5433,
            database: "postgres".into(),
            username: "postgres".into(),
            password: "root".into(),
            readonly_username: None,
        };
        let connector = Postgres::new(Arc::new(NoopAdmin));
        let request = connector
            .request(&resolved(
                &[
                    ("instance-name", "pg"),
                    ("vault-path", "vault:secret/data/app/db"),
                    ("db-name", "app"),
                    ("db-username", "app_user"),
                ],
                &[],
            ))
            .unwrap();
        let credential = fresh_credential(&instance, &request);
        assert_eq!(credential[DATABASE_PORT], json!("5433"));
        assert_eq!(credential[DATABASE_USER], json!("app_user"));
        assert_eq!(secret_str(&credential, DATABASE_PASSWORD).map(str::len), Some(15));
        assert_eq!(
            connector.source_identity(&instance, &request),
            vec!["pg.svc", "5433", "app", "app_user"]
        );
    }

    #[test]
    fn test_root_complete_requires_resolved_credentials() {
        let connector = Postgres::new(Arc::new(NoopAdmin));
        let mut instance = PostgresConnectorSpec {
            host: "pg.svc".into(),
            port: 5432,
            database: "postgres".into(),
            username: "postgres".into(),
            password: "vault:secret/data/pg#PASSWORD".into(),
            readonly_username: None,
        };
        assert!(!connector.root_complete(&instance));
        instance.password = "root".into();
        assert!(connector.root_complete(&instance));
    }

    #[test]
    fn test_quoting() {
        assert_eq!(quote_ident("app"), "\"app\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_literal("it's"), "'it''s'");
    }

    #[test]
    fn test_readonly_grant_sql_wraps_membership() {
        let sql = readonly_grant_sql("postgres", "app", "reader");
        assert!(sql.starts_with("GRANT \"app\" TO \"postgres\";"));
        assert!(sql.ends_with("REVOKE \"app\" FROM \"postgres\";"));
        assert!(sql.contains(
            "FOR USER \"app\" IN SCHEMA public GRANT SELECT ON TABLES TO \"reader\""
        ));
    }

    #[test]
    fn test_grant_debug_hides_password() {
        let grant = DatabaseGrant {
            database: "app".into(),
            username: "app".into(),
            password: "s3cret".into(),
            readonly_username: None,
        };
        assert!(!format!("{grant:?}").contains("s3cret"));
    }
}
