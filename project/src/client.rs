use crate::accessor::{ProjectAccessor, ProjectError, ProjectFactory, ProjectResolver};
use crate::types::{GetParams, ProjectId};
use async_trait::async_trait;
use http::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use url::Url;

#[derive(Deserialize)]
struct ProjectListResponse {
    ids: Vec<ProjectId>,
}

/// Client for the remote project service.
///
/// Routes, relative to the base URL:
/// - `POST projects/{id}/store?env=&branch=` stores a project tree
/// - `GET projects?env=&branch=` lists ids
/// - `GET projects/{id}/params` returns the env and branch an id belongs to
#[derive(Clone)]
pub struct HttpProjectService {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpProjectService {
    pub fn new(base_url: Url) -> Self {
        HttpProjectService {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ProjectError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ProjectError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn check(
        response: reqwest::Response,
        id: Option<&ProjectId>,
    ) -> Result<reqwest::Response, ProjectError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if let (StatusCode::NOT_FOUND, Some(id)) = (status, id) {
            return Err(ProjectError::NotFound(id.clone()));
        }

        let message = response.text().await.unwrap_or_default();
        Err(ProjectError::Rejected {
            status,
            message: message.trim().to_string(),
        })
    }

    async fn store(&self, params: &GetParams, id: &ProjectId) -> Result<(), ProjectError> {
        let url = self.url(&["projects", id.as_str(), "store"])?;
        let response = self
            .client
            .post(url)
            .query(&[("env", params.env.as_str()), ("branch", params.branch.as_str())])
            .send()
            .await?;
        Self::check(response, Some(id)).await?;

        tracing::debug!(id = %id, env = %params.env, branch = %params.branch, "Stored project");
        Ok(())
    }

    async fn list(&self, params: &GetParams) -> Result<Vec<ProjectId>, ProjectError> {
        let url = self.url(&["projects"])?;
        let response = self
            .client
            .get(url)
            .query(&[("env", params.env.as_str()), ("branch", params.branch.as_str())])
            .send()
            .await?;
        let ids = Self::check(response, None)
            .await?
            .json::<ProjectListResponse>()
            .await?
            .ids;

        tracing::debug!(count = ids.len(), env = %params.env, "Listed project ids");
        Ok(ids)
    }

    async fn params_for(&self, id: &ProjectId) -> Result<GetParams, ProjectError> {
        let url = self.url(&["projects", id.as_str(), "params"])?;
        let response = self.client.get(url).send().await?;
        Ok(Self::check(response, Some(id))
            .await?
            .json::<GetParams>()
            .await?)
    }
}

/// Accessor bound to one set of params, backed by the shared client.
struct HttpProject {
    service: HttpProjectService,
    params: GetParams,
}

#[async_trait]
impl ProjectAccessor for HttpProject {
    fn params(&self) -> &GetParams {
        &self.params
    }

    async fn recursive_store_project(&self, id: &ProjectId) -> Result<(), ProjectError> {
        self.service.store(&self.params, id).await
    }

    async fn list_all_project_ids(&self) -> Result<Vec<ProjectId>, ProjectError> {
        self.service.list(&self.params).await
    }
}

impl ProjectFactory for HttpProjectService {
    fn accessor(&self, params: GetParams) -> Arc<dyn ProjectAccessor> {
        Arc::new(HttpProject {
            service: self.clone(),
            params,
        })
    }
}

#[async_trait]
impl ProjectResolver for HttpProjectService {
    async fn for_id(&self, id: &ProjectId) -> Result<Arc<dyn ProjectAccessor>, ProjectError> {
        let params = self.params_for(id).await?;
        Ok(self.accessor(params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Env;
    use shared::testutils::MockServer;

    fn service(server: &MockServer) -> HttpProjectService {
        HttpProjectService::new(Url::parse(&format!("{}/api/", server.url)).unwrap())
    }

    #[tokio::test]
    async fn test_store_project() {
        let server = MockServer::spawn(|_| (StatusCode::OK, String::new())).await;
        let accessor = service(&server).accessor(GetParams::new(Env::Staging, Some("dev")));

        accessor
            .recursive_store_project(&ProjectId::new("acme::widgets"))
            .await
            .unwrap();

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, http::Method::POST);
        assert_eq!(requests[0].path, "/api/projects/acme::widgets/store");
        assert_eq!(requests[0].query.as_deref(), Some("env=staging&branch=dev"));
    }

    #[tokio::test]
    async fn test_id_is_sent_as_one_path_segment() {
        let server = MockServer::spawn(|_| (StatusCode::OK, String::new())).await;
        let accessor = service(&server).accessor(GetParams::default());

        accessor
            .recursive_store_project(&ProjectId::new("acme/widgets?x#y"))
            .await
            .unwrap();

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].path, "/api/projects/acme%2Fwidgets%3Fx%23y/store");
        assert_eq!(requests[0].query.as_deref(), Some("env=prod&branch=master"));
    }

    #[tokio::test]
    async fn test_store_project_failure() {
        let server =
            MockServer::spawn(|_| (StatusCode::BAD_GATEWAY, "content host down\n".into())).await;
        let accessor = service(&server).accessor(GetParams::default());

        let err = accessor
            .recursive_store_project(&ProjectId::new("acme::widgets"))
            .await
            .unwrap_err();

        match err {
            ProjectError::Rejected { status, message } => {
                assert_eq!(status, StatusCode::BAD_GATEWAY);
                assert_eq!(message, "content host down");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_list_all_project_ids() {
        let server = MockServer::spawn(|_| {
            (
                StatusCode::OK,
                r#"{"ids": ["acme::widgets", "acme::gadgets"]}"#.into(),
            )
        })
        .await;
        let accessor = service(&server).accessor(GetParams::default());

        let ids = accessor.list_all_project_ids().await.unwrap();

        assert_eq!(
            ids,
            vec![ProjectId::new("acme::widgets"), ProjectId::new("acme::gadgets")]
        );
        let requests = server.requests();
        assert_eq!(requests[0].path, "/api/projects");
        assert_eq!(requests[0].query.as_deref(), Some("env=prod&branch=master"));
    }

    #[tokio::test]
    async fn test_resolver_uses_remote_params() {
        let server = MockServer::spawn(|req| {
            if req.path.ends_with("/params") {
                (
                    StatusCode::OK,
                    r#"{"env": "staging", "branch": "next"}"#.into(),
                )
            } else {
                (StatusCode::OK, String::new())
            }
        })
        .await;
        let service = service(&server);
        let id = ProjectId::new("acme::widgets::docs");

        let accessor = service.for_id(&id).await.unwrap();
        assert_eq!(accessor.params(), &GetParams::new(Env::Staging, Some("next")));
        accessor.recursive_store_project(&id).await.unwrap();

        let requests = server.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].path, "/api/projects/acme::widgets::docs/params");
        assert_eq!(requests[1].query.as_deref(), Some("env=staging&branch=next"));
    }

    #[tokio::test]
    async fn test_resolver_unknown_id() {
        let server = MockServer::spawn(|_| (StatusCode::NOT_FOUND, String::new())).await;
        let id = ProjectId::new("nobody::nothing");

        let err = service(&server).for_id(&id).await.err().unwrap();

        assert!(matches!(err, ProjectError::NotFound(ref missing) if *missing == id));
    }
}
