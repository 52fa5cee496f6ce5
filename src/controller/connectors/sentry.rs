//! # Sentry Connector
//!
//! A team, a project and an environment-named client key per workload. The
//! workload credential holds the key's DSN and the project slug.
//!
//! Unlike the database and broker connectors, an existing credential is not
//! an identity to defend: it is reused only while its DSN is still a key of
//! the project, and replaced otherwise.

use super::{all_resolved, http, Binding, Connector, ConnectorKind, EnvTable};
use crate::constants::APP_NAME_LABEL;
use crate::controller::annotations::{AnnotationRule, ResolvedAnnotations};
use crate::controller::engine::{secret_str, EngineContext};
use crate::controller::error::ConnectorError;
use crate::crd::SentryConnectorSpec;
use crate::vault::{Masked, SecretData};
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub const SENTRY_DSN: &str = "SENTRY_DSN";
pub const SENTRY_PROJECT_SLUG: &str = "SENTRY_PROJECT_SLUG";

pub const ENV_VARS: EnvTable = &[
    (SENTRY_DSN, SENTRY_DSN),
    (SENTRY_PROJECT_SLUG, SENTRY_PROJECT_SLUG),
];

const RULES: &[AnnotationRule] = &[
    AnnotationRule::required("instance-name"),
    AnnotationRule::required("vault-path"),
    AnnotationRule::label("project", APP_NAME_LABEL),
    AnnotationRule::label("team", APP_NAME_LABEL),
    AnnotationRule::value("environment", "default"),
];

const REQUIRED_LABELS: &[&str] = &[APP_NAME_LABEL];

const SERVICE: &str = "Sentry";

/// Canonical environment name for common short forms
pub fn canonical_environment(environment: &str) -> &str {
    match environment {
        "prod" => "production",
        "stage" => "staging",
        "dev" => "development",
        other => other,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentryRequest {
    pub binding: Binding,
    pub project: String,
    pub team: String,
    pub environment: String,
}

/// DSN key handed to the workload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectKey {
    pub project_slug: String,
    pub dsn: String,
}

impl ProjectKey {
    pub fn to_secret(&self) -> SecretData {
        [
            (SENTRY_DSN.to_string(), json!(self.dsn)),
            (SENTRY_PROJECT_SLUG.to_string(), json!(self.project_slug)),
        ]
        .into_iter()
        .collect()
    }

    pub fn from_secret(data: &SecretData) -> Option<Self> {
        Some(Self {
            project_slug: secret_str(data, SENTRY_PROJECT_SLUG)?.to_string(),
            dsn: secret_str(data, SENTRY_DSN)?.to_string(),
        })
    }
}

#[async_trait]
pub trait SentryAdmin: Send + Sync + std::fmt::Debug {
    /// Whether `dsn` is one of the project's client keys
    async fn dsn_exists(
        &self,
        root: &SentryConnectorSpec,
        project_slug: &str,
        dsn: &str,
    ) -> Result<bool, ConnectorError>;

    /// Ensure team and project exist and create a client key named after
    /// the environment
    async fn configure(
        &self,
        root: &SentryConnectorSpec,
        request: &SentryRequest,
    ) -> Result<ProjectKey, ConnectorError>;
}

#[derive(Debug, Clone)]
pub struct Sentry {
    admin: Arc<dyn SentryAdmin>,
}

impl Sentry {
    pub fn new(admin: Arc<dyn SentryAdmin>) -> Self {
        Self { admin }
    }
}

#[async_trait]
impl Connector for Sentry {
    type Instance = SentryConnectorSpec;
    type Request = SentryRequest;

    fn kind(&self) -> ConnectorKind {
        ConnectorKind::Sentry
    }

    fn annotation_rules(&self) -> &'static [AnnotationRule] {
        RULES
    }

    fn required_labels(&self) -> &'static [&'static str] {
        REQUIRED_LABELS
    }

    fn request(&self, resolved: &ResolvedAnnotations) -> Result<SentryRequest, ConnectorError> {
        Ok(SentryRequest {
            binding: Binding::from_annotations(resolved)?,
            project: resolved.value("project").to_string(),
            team: resolved.value("team").to_string(),
            environment: canonical_environment(resolved.value("environment")).to_string(),
        })
    }

    fn binding<'a>(&self, request: &'a SentryRequest) -> &'a Binding {
        &request.binding
    }

    fn root_complete(&self, instance: &SentryConnectorSpec) -> bool {
        all_resolved(&[&instance.url, &instance.token, &instance.organization])
    }

    fn source_identity(
        &self,
        instance: &SentryConnectorSpec,
        request: &SentryRequest,
    ) -> Vec<String> {
        vec![
            instance.url.clone(),
            instance.organization.clone(),
            request.team.clone(),
            request.project.clone(),
            request.environment.clone(),
        ]
    }

    async fn provision(
        &self,
        ctx: &EngineContext,
        instance: &SentryConnectorSpec,
        request: &SentryRequest,
    ) -> Result<(), ConnectorError> {
        let path = &request.binding.vault_path;
        let existing = ctx.secrets.read_at(path).await?;
        if let Some(key) = existing.as_ref().and_then(ProjectKey::from_secret) {
            if self
                .admin
                .dsn_exists(instance, &key.project_slug, &key.dsn)
                .await?
            {
                info!(project = %key.project_slug, "Sentry DSN key already exists");
                return Ok(());
            }
        }

        let key = self.admin.configure(instance, request).await?;
        let secret = key.to_secret();
        info!(path = %path, secret = %Masked(&secret), "Storing Sentry credential");
        ctx.secrets.create_or_update(path, &secret, true).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct Slugged {
    slug: String,
}

#[derive(Debug, Deserialize)]
struct KeyDsn {
    public: String,
}

#[derive(Debug, Deserialize)]
struct ClientKey {
    dsn: KeyDsn,
}

/// [`SentryAdmin`] over the Sentry web API (`/api/0`)
#[derive(Debug, Clone)]
pub struct HttpSentryAdmin {
    http: reqwest::Client,
}

impl HttpSentryAdmin {
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: http::client(timeout)?,
        })
    }

    fn request(
        &self,
        root: &SentryConnectorSpec,
        method: Method,
        segments: &[&str],
    ) -> Result<reqwest::RequestBuilder, ConnectorError> {
        let mut path = vec!["api", "0"];
        path.extend_from_slice(segments);
        // Sentry routes end with a slash
        path.push("");
        let url = http::endpoint(SERVICE, &root.url, &path)?;
        Ok(self.http.request(method, url).bearer_auth(&root.token))
    }

    async fn project_keys(
        &self,
        root: &SentryConnectorSpec,
        project_slug: &str,
    ) -> Result<Vec<ClientKey>, ConnectorError> {
        let org = root.organization.as_str();
        let request = self.request(root, Method::GET, &["projects", org, project_slug, "keys"])?;
        Ok(http::fetch_optional(SERVICE, request).await?.unwrap_or_default())
    }
}

#[async_trait]
impl SentryAdmin for HttpSentryAdmin {
    async fn dsn_exists(
        &self,
        root: &SentryConnectorSpec,
        project_slug: &str,
        dsn: &str,
    ) -> Result<bool, ConnectorError> {
        Ok(self
            .project_keys(root, project_slug)
            .await?
            .iter()
            .any(|k| k.dsn.public == dsn))
    }

    async fn configure(
        &self,
        root: &SentryConnectorSpec,
        request: &SentryRequest,
    ) -> Result<ProjectKey, ConnectorError> {
        let org = root.organization.as_str();

        let get_team = self.request(root, Method::GET, &["teams", org, request.team.as_str()])?;
        let team = match http::fetch_optional::<Slugged>(SERVICE, get_team).await? {
            Some(team) => team,
            None => {
                let create = self
                    .request(root, Method::POST, &["organizations", org, "teams"])?
                    .json(&json!({"name": request.team}));
                let team: Slugged = http::fetch(SERVICE, create).await?;
                info!(team = %team.slug, "Created Sentry team");
                team
            }
        };

        let get_project =
            self.request(root, Method::GET, &["projects", org, request.project.as_str()])?;
        let project = match http::fetch_optional::<Slugged>(SERVICE, get_project).await? {
            Some(project) => project,
            None => {
                let create = self
                    .request(
                        root,
                        Method::POST,
                        &["teams", org, team.slug.as_str(), "projects"],
                    )?
                    .json(&json!({"name": request.project}));
                let project: Slugged = http::fetch(SERVICE, create).await?;
                info!(project = %project.slug, "Created Sentry project");
                project
            }
        };

        let create_key = self
            .request(root, Method::POST, &["projects", org, project.slug.as_str(), "keys"])?
            .json(&json!({"name": request.environment}));
        let key: ClientKey = http::fetch(SERVICE, create_key).await?;
        info!(
            project = %project.slug,
            environment = %request.environment,
            "Created Sentry client key"
        );

        Ok(ProjectKey {
            project_slug: project.slug,
            dsn: key.dsn.public,
        })
    }
}
