//! Starts the external site build pipeline.
use crate::gcp::{AuthError, TokenSource};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const DEFAULT_ENDPOINT: &str = "https://cloudbuild.googleapis.com";

#[derive(thiserror::Error, Debug)]
pub enum BuildError {
    #[error("no build trigger configured")]
    NotConfigured,
    #[error("build request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("could not authorize build request: {0}")]
    Auth(#[from] AuthError),
    #[error("build trigger returned {status}: {message}")]
    Rejected {
        status: reqwest::StatusCode,
        message: String,
    },
}

#[async_trait]
pub trait BuildTrigger: Send + Sync {
    /// Returns an identifier for the started build.
    async fn build(&self) -> Result<String, BuildError>;
}

/// Used when no trigger is configured; every build attempt fails.
pub struct DisabledBuildTrigger;

#[async_trait]
impl BuildTrigger for DisabledBuildTrigger {
    async fn build(&self) -> Result<String, BuildError> {
        Err(BuildError::NotConfigured)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunTriggerRequest<'a> {
    branch_name: &'a str,
}

#[derive(Deserialize)]
struct Operation {
    name: String,
}

/// Runs a Cloud Build trigger via the REST API.
pub struct CloudBuildTrigger {
    client: reqwest::Client,
    endpoint: String,
    gcp_project: String,
    trigger_id: String,
    branch: String,
    tokens: TokenSource,
}

impl CloudBuildTrigger {
    pub fn new(
        endpoint: &str,
        gcp_project: String,
        trigger_id: String,
        branch: String,
        tokens: TokenSource,
    ) -> Self {
        CloudBuildTrigger {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            gcp_project,
            trigger_id,
            branch,
            tokens,
        }
    }
}

#[async_trait]
impl BuildTrigger for CloudBuildTrigger {
    async fn build(&self) -> Result<String, BuildError> {
        let url = format!(
            "{}/v1/projects/{}/triggers/{}:run",
            self.endpoint, self.gcp_project, self.trigger_id
        );
        let request = self.client.post(url).json(&RunTriggerRequest {
            branch_name: &self.branch,
        });
        let response = self.tokens.authorize(request).await?.send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BuildError::Rejected {
                status,
                message: message.trim().to_string(),
            });
        }

        let operation = response.json::<Operation>().await?;
        tracing::info!(operation = %operation.name, trigger = %self.trigger_id, "Build started");
        Ok(operation.name)
    }
}
