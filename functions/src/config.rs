use crate::pubsub::GET_PROJECT_TOPIC;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Empty topic name")]
    EmptyTopic,

    #[error("Invocation timeout cannot be 0")]
    InvalidTimeout,

    #[error("Empty build trigger id")]
    EmptyTriggerId,
}

/// Dispatch service configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for the trigger endpoints
    #[serde(default)]
    pub listener: Listener,
    /// Listener for health and readiness probes
    #[serde(default = "Listener::admin_default")]
    pub admin_listener: Listener,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// Public site the staged project URLs point at
    #[serde(default = "default_site_url")]
    pub site_url: String,
    pub project_service: ProjectServiceConfig,
    #[serde(default)]
    pub pubsub: PubSubConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    /// Build pipeline started by `cloudBuild`. Without it the endpoint
    /// always fails.
    pub cloud_build: Option<CloudBuildConfig>,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if self.runtime.timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }

        if self.pubsub.topic.is_empty() {
            return Err(ValidationError::EmptyTopic);
        }

        if let Some(cloud_build) = &self.cloud_build
            && cloud_build.trigger_id.is_empty()
        {
            return Err(ValidationError::EmptyTriggerId);
        }

        Ok(())
    }
}

fn default_site_url() -> String {
    "https://firebaseopensource.com".into()
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

impl Listener {
    fn admin_default() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 8081,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Per-invocation limits.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct RuntimeConfig {
    /// Invocations running longer than this are aborted.
    #[serde(default = "RuntimeConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl RuntimeConfig {
    fn default_timeout_secs() -> u64 {
        540
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            timeout_secs: Self::default_timeout_secs(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ProjectServiceConfig {
    pub url: Url,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct PubSubConfig {
    /// Falls back to the `GCLOUD_PROJECT` environment variable.
    pub gcp_project: Option<String>,
    #[serde(default = "PubSubConfig::default_topic")]
    pub topic: String,
    /// Point at an emulator for local runs.
    #[serde(default = "PubSubConfig::default_endpoint")]
    pub endpoint: String,
}

impl PubSubConfig {
    fn default_topic() -> String {
        GET_PROJECT_TOPIC.into()
    }

    fn default_endpoint() -> String {
        crate::pubsub::DEFAULT_ENDPOINT.into()
    }
}

impl Default for PubSubConfig {
    fn default() -> Self {
        PubSubConfig {
            gcp_project: None,
            topic: Self::default_topic(),
            endpoint: Self::default_endpoint(),
        }
    }
}

/// How Google API calls are authorized.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type")]
pub enum AuthConfig {
    /// Application default credentials.
    #[default]
    #[serde(alias = "metadata_server")]
    ApplicationDefault,
    Anonymous,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct CloudBuildConfig {
    pub trigger_id: String,
    #[serde(default = "CloudBuildConfig::default_branch")]
    pub branch: String,
    #[serde(default = "CloudBuildConfig::default_endpoint")]
    pub endpoint: String,
}

impl CloudBuildConfig {
    fn default_branch() -> String {
        project::types::DEFAULT_BRANCH.into()
    }

    fn default_endpoint() -> String {
        crate::build::DEFAULT_ENDPOINT.into()
    }
}
