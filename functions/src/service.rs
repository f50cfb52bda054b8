use crate::dispatch::{Dispatcher, Reply};
use crate::errors::FunctionsError;
use crate::metrics_defs::{INVOCATION_DURATION, INVOCATION_TIMEOUTS, INVOCATIONS};
use crate::query::QueryParams;
use http_body_util::BodyExt;
use http_body_util::combinators::BoxBody;
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use shared::http::{make_error_response, make_text_response};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Trigger endpoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    StageProject,
    GetProject,
    GetProjectWebhook,
    GetAllProjects,
    CloudBuild,
}

impl Route {
    pub fn from_path(path: &str) -> Option<Self> {
        match path.trim_end_matches('/') {
            "/stageProject" => Some(Route::StageProject),
            "/pubsub/get-project" => Some(Route::GetProject),
            "/getProjectWebhook" => Some(Route::GetProjectWebhook),
            "/getAllProjects" => Some(Route::GetAllProjects),
            "/cloudBuild" => Some(Route::CloudBuild),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Route::StageProject => "stageProject",
            Route::GetProject => "getProject",
            Route::GetProjectWebhook => "getProjectWebhook",
            Route::GetAllProjects => "getAllProjects",
            Route::CloudBuild => "cloudBuild",
        }
    }

    /// Push deliveries are always POSTed; the HTTP triggers accept any
    /// method.
    fn allows(&self, method: &Method) -> bool {
        match self {
            Route::GetProject => method == Method::POST,
            _ => true,
        }
    }
}

pub type ServiceBody = BoxBody<Bytes, FunctionsError>;

pub struct FunctionsService {
    dispatcher: Arc<Dispatcher>,
    timeout: Duration,
}

impl FunctionsService {
    pub fn new(dispatcher: Arc<Dispatcher>, timeout: Duration) -> Self {
        FunctionsService {
            dispatcher,
            timeout,
        }
    }
}

impl Service<Request<Incoming>> for FunctionsService {
    type Response = Response<ServiceBody>;
    type Error = FunctionsError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let dispatcher = self.dispatcher.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            let (parts, body) = req.into_parts();
            let body = body.collect().await?.to_bytes();
            Ok(handle(&dispatcher, Request::from_parts(parts, body), timeout).await)
        })
    }
}

/// Routes one buffered request and runs it under the invocation timeout.
/// An invocation that overruns is dropped mid-flight; nothing it did so far
/// is reported.
pub async fn handle(
    dispatcher: &Dispatcher,
    req: Request<Bytes>,
    timeout: Duration,
) -> Response<ServiceBody> {
    let Some(route) = Route::from_path(req.uri().path()) else {
        tracing::warn!(method = %req.method(), path = %req.uri().path(), "No route matched");
        return make_error_response(StatusCode::NOT_FOUND);
    };

    if !route.allows(req.method()) {
        return make_error_response(StatusCode::METHOD_NOT_ALLOWED);
    }

    let start = Instant::now();
    let reply = match tokio::time::timeout(timeout, dispatch(dispatcher, route, &req)).await {
        Ok(reply) => reply,
        Err(_) => {
            shared::counter!(INVOCATION_TIMEOUTS, "handler" => route.name()).increment(1);
            tracing::error!(
                handler = route.name(),
                timeout_secs = timeout.as_secs_f64(),
                "Invocation timed out"
            );
            Reply::internal_error("Function timed out.\n")
        }
    };

    shared::counter!(
        INVOCATIONS,
        "handler" => route.name(),
        "status" => reply.status.as_u16().to_string()
    )
    .increment(1);
    shared::histogram!(INVOCATION_DURATION, "handler" => route.name())
        .record(start.elapsed().as_secs_f64());

    make_text_response(reply.status, reply.body)
}

async fn dispatch(dispatcher: &Dispatcher, route: Route, req: &Request<Bytes>) -> Reply {
    let query = QueryParams::parse(req.uri().query());

    match route {
        Route::StageProject => dispatcher.stage_project(&query).await,
        Route::GetProject => dispatcher.get_project_push(req.body()).await,
        Route::GetProjectWebhook => dispatcher.get_project_webhook(&query).await,
        Route::GetAllProjects => dispatcher.get_all_projects().await,
        Route::CloudBuild => dispatcher.cloud_build().await,
    }
}
