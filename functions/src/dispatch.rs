use crate::build::BuildTrigger;
use crate::errors::{DispatchError, Result};
use crate::metrics_defs::{FANOUT_FAILED, FANOUT_PUBLISHED};
use crate::pubsub::{JobMessage, Publisher, PushEnvelope};
use crate::query::{ParamError, QueryParams};
use http::StatusCode;
use project::types::ID_SEPARATOR;
use project::{Env, GetParams, ProjectFactory, ProjectId, ProjectResolver};
use std::sync::Arc;
use tokio::task::JoinSet;

/// Status and single-line text body of a finished invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub status: StatusCode,
    pub body: String,
}

impl Reply {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Reply {
            status,
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(StatusCode::OK, body)
    }

    pub fn bad_request(body: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, body)
    }

    pub fn internal_error(body: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, body)
    }
}

/// External capabilities the dispatcher delegates to.
pub struct Collaborators {
    pub projects: Arc<dyn ProjectFactory>,
    pub resolver: Arc<dyn ProjectResolver>,
    pub publisher: Arc<dyn Publisher>,
    pub build: Arc<dyn BuildTrigger>,
}

/// Turns trigger inputs into collaborator calls and collaborator outcomes
/// into replies. Holds no per-invocation state, so one instance serves every
/// concurrent request.
pub struct Dispatcher {
    projects: Arc<dyn ProjectFactory>,
    resolver: Arc<dyn ProjectResolver>,
    publisher: Arc<dyn Publisher>,
    build: Arc<dyn BuildTrigger>,
    topic: String,
    site_url: String,
}

struct StageRequest<'a> {
    org: &'a str,
    repo: &'a str,
    branch: Option<&'a str>,
    path: Option<&'a str>,
}

impl<'a> StageRequest<'a> {
    fn from_query(query: &'a QueryParams) -> std::result::Result<Self, Reply> {
        Ok(StageRequest {
            org: required(query, "org")?,
            repo: required(query, "repo")?,
            branch: optional(query, "branch")?,
            path: optional(query, "path")?.filter(|p| !p.is_empty()),
        })
    }

    /// Location of the staged project below the site root.
    fn staged_path(&self) -> String {
        let mut staged = format!("{}/{}", self.org, self.repo);
        if let Some(path) = self.path {
            staged.push_str(ID_SEPARATOR);
            staged.push_str(&path.split('/').collect::<Vec<_>>().join(ID_SEPARATOR));
        }
        staged
    }
}

fn required<'a>(query: &'a QueryParams, name: &str) -> std::result::Result<&'a str, Reply> {
    query
        .required(name)
        .map_err(|_| Reply::bad_request(format!("{name} param required\n")))
}

fn optional<'a>(
    query: &'a QueryParams,
    name: &str,
) -> std::result::Result<Option<&'a str>, Reply> {
    query.optional(name).map_err(|e| match e {
        ParamError::Repeated => Reply::bad_request(format!("{name} param must be a single value\n")),
        ParamError::Missing => Reply::bad_request(format!("{name} param required\n")),
    })
}

impl Dispatcher {
    pub fn new(collaborators: Collaborators, topic: String, site_url: &str) -> Self {
        Dispatcher {
            projects: collaborators.projects,
            resolver: collaborators.resolver,
            publisher: collaborators.publisher,
            build: collaborators.build,
            topic,
            site_url: site_url.trim_end_matches('/').to_string(),
        }
    }

    /// Stages one project (org, repo, optional branch and path) into the
    /// staging environment and waits for it to finish.
    pub async fn stage_project(&self, query: &QueryParams) -> Reply {
        let request = match StageRequest::from_query(query) {
            Ok(request) => request,
            Err(reply) => return reply,
        };

        let params = GetParams::new(Env::Staging, request.branch);
        tracing::info!(
            "stageProject({}, {}, {}, {})",
            request.org,
            request.repo,
            params.branch,
            request.path.unwrap_or("/")
        );

        let project = self.projects.accessor(params);
        let id = ProjectId::from_parts(request.org, request.repo, request.path);

        match project.recursive_store_project(&id).await {
            Ok(()) => Reply::ok(format!(
                "Visit {}/projects-staging/{} to see the staged project.\n",
                self.site_url,
                request.staged_path()
            )),
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "Failed to stage project");
                Reply::internal_error(format!("Failed to stage project: {e}.\n"))
            }
        }
    }

    /// Stores the project named by a queued job. Errors are returned as-is:
    /// redelivery is left to the queue.
    pub async fn get_project(&self, job: &JobMessage) -> Result<()> {
        let project = self.resolver.for_id(&job.id).await?;
        project.recursive_store_project(&job.id).await?;
        tracing::info!(id = %job.id, "Stored project");
        Ok(())
    }

    /// Push delivery adapter for [`Dispatcher::get_project`]. Any non-2xx
    /// reply makes Pub/Sub redeliver the message.
    pub async fn get_project_push(&self, body: &[u8]) -> Reply {
        let job = match PushEnvelope::from_slice(body).and_then(|envelope| {
            tracing::debug!(message_id = envelope.message_id(), "Received push delivery");
            envelope.job()
        }) {
            Ok(job) => job,
            Err(e) => {
                let e = DispatchError::from(e);
                tracing::warn!(error = %e, "Rejected push delivery");
                return Reply::bad_request(format!("{e}\n"));
            }
        };

        match self.get_project(&job).await {
            Ok(()) => Reply::ok(format!("Stored project {}.\n", job.id)),
            Err(e) => {
                tracing::error!(id = %job.id, error = %e, "Failed to store project");
                Reply::internal_error(format!("Failed to store project {}: {e}.\n", job.id))
            }
        }
    }

    /// Same as the queued job, driven by an `id` query parameter. The id is
    /// used verbatim.
    pub async fn get_project_webhook(&self, query: &QueryParams) -> Reply {
        // Only absent or repeated ids are rejected; an empty value is still a
        // single string and goes to the resolver.
        let id = match query.optional("id") {
            Ok(Some(id)) => ProjectId::new(id),
            Ok(None) | Err(_) => return Reply::bad_request("id param required\n"),
        };

        match self.get_project(&JobMessage { id: id.clone() }).await {
            Ok(()) => Reply::ok(format!("Stored project {id}.\n")),
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "Failed to store project");
                Reply::internal_error(format!("Failed to store project {id}: {e}.\n"))
            }
        }
    }

    /// Publishes one job per known production project.
    pub async fn get_all_projects(&self) -> Reply {
        match self.fan_out().await {
            Ok(count) => {
                tracing::info!(count, topic = %self.topic, "Published all project jobs");
                Reply::ok("Stored all projects!\n")
            }
            Err(e) => {
                tracing::warn!(error = %e, "Error");
                Reply::internal_error("Failed to store all projects.\n")
            }
        }
    }

    /// Issues every publish before awaiting any, then waits for all of them.
    /// The first failure fails the whole run. Messages already published
    /// stay published, and publishes still in flight are detached and run to
    /// completion on their own.
    async fn fan_out(&self) -> Result<usize> {
        let project = self.projects.accessor(GetParams::default());
        let all_ids = project.list_all_project_ids().await?;

        let payloads = all_ids
            .into_iter()
            .map(|id| JobMessage { id }.to_bytes())
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut join_set = JoinSet::new();
        for payload in payloads {
            let publisher = self.publisher.clone();
            let topic = self.topic.clone();
            join_set.spawn(async move { publisher.publish(&topic, payload).await });
        }

        let total = join_set.len();
        while let Some(joined) = join_set.join_next().await {
            let outcome = joined
                .map_err(DispatchError::from)
                .and_then(|published| published.map_err(DispatchError::from));

            match outcome {
                Ok(message_id) => {
                    shared::counter!(FANOUT_PUBLISHED).increment(1);
                    tracing::debug!(message_id = %message_id, "Published job");
                }
                Err(e) => {
                    shared::counter!(FANOUT_FAILED).increment(1);
                    join_set.detach_all();
                    return Err(e);
                }
            }
        }

        Ok(total)
    }

    pub async fn cloud_build(&self) -> Reply {
        match self.build.build().await {
            Ok(_) => Reply::ok("Build started!"),
            Err(e) => {
                tracing::warn!(error = %e, "Error");
                Reply::internal_error("Failed to start build.")
            }
        }
    }
}
