use crate::types::{GetParams, ProjectId};
use async_trait::async_trait;
use http::StatusCode;
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum ProjectError {
    #[error("project service request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid project service URL: {0}")]
    InvalidUrl(String),
    #[error("project {0} not found")]
    NotFound(ProjectId),
    #[error("project service returned {status}: {message}")]
    Rejected { status: StatusCode, message: String },
}

/// Access to one project environment/branch on the content host.
///
/// Implementations must tolerate duplicate `recursive_store_project` calls
/// for the same id: fan-out does not deduplicate and the queue may redeliver.
#[async_trait]
pub trait ProjectAccessor: Send + Sync {
    fn params(&self) -> &GetParams;

    /// Fetches and persists the project and every nested sub-project.
    async fn recursive_store_project(&self, id: &ProjectId) -> Result<(), ProjectError>;

    /// Every project id known for this accessor's environment.
    async fn list_all_project_ids(&self) -> Result<Vec<ProjectId>, ProjectError>;
}

/// Builds accessors for explicitly chosen parameters.
pub trait ProjectFactory: Send + Sync {
    fn accessor(&self, params: GetParams) -> Arc<dyn ProjectAccessor>;
}

/// Finds the accessor an existing id belongs to. Which environment and
/// branch an id maps to is owned by the implementation.
#[async_trait]
pub trait ProjectResolver: Send + Sync {
    async fn for_id(&self, id: &ProjectId) -> Result<Arc<dyn ProjectAccessor>, ProjectError>;
}
