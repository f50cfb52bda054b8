use crate::build::BuildError;
use crate::config::ValidationError;
use crate::gcp::AuthError;
use crate::pubsub::{PublishError, PushError};
use project::ProjectError;
use thiserror::Error;

/// Result type alias for dispatch operations
pub type Result<T, E = DispatchError> = std::result::Result<T, E>;

/// Failures of a single trigger invocation.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("{0}")]
    Project(#[from] ProjectError),

    #[error("{0}")]
    Publish(#[from] PublishError),

    #[error("{0}")]
    Build(#[from] BuildError),

    #[error("invalid push message: {0}")]
    InvalidMessage(#[from] PushError),

    #[error("could not encode job message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("publish task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

/// Errors of the HTTP service itself, outside any single invocation.
#[derive(Error, Debug)]
pub enum FunctionsError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("hyper error: {0}")]
    Hyper(#[from] hyper::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(#[from] ValidationError),

    #[error("{0}")]
    Auth(#[from] AuthError),

    #[error("no Google Cloud project configured; set pubsub.gcp_project or GCLOUD_PROJECT")]
    MissingGcpProject,
}
