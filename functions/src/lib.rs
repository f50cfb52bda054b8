//! Trigger handlers that stage and store projects and fan out store jobs
//! over Pub/Sub.

pub mod build;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod gcp;
pub mod metrics_defs;
pub mod pubsub;
pub mod query;
pub mod service;
#[cfg(test)]
mod testutils;

use build::{BuildTrigger, CloudBuildTrigger, DisabledBuildTrigger};
use config::{AuthConfig, Config};
use dispatch::{Collaborators, Dispatcher};
use errors::FunctionsError;
use gcp::TokenSource;
use project::HttpProjectService;
use pubsub::PubSubPublisher;
use service::FunctionsService;
use shared::admin_service::AdminService;
use shared::http::{run_http_service, serve};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;

/// Environment variables consulted, in order, when the config names no
/// Google Cloud project.
pub const GCP_PROJECT_ENV_VARS: &[&str] = &["GCLOUD_PROJECT", "GOOGLE_CLOUD_PROJECT"];

pub async fn run(config: Config) -> Result<(), FunctionsError> {
    config.validate()?;
    let dispatcher = Arc::new(build_dispatcher(&config)?);

    let ready = Arc::new(AtomicBool::new(false));
    let ready_clone = ready.clone();
    let admin_service = AdminService::<_, FunctionsError>::new(move || {
        ready_clone.load(Ordering::Relaxed)
    });

    let listener =
        TcpListener::bind(format!("{}:{}", config.listener.host, config.listener.port)).await?;
    tracing::info!(
        host = %config.listener.host,
        port = config.listener.port,
        timeout_secs = config.runtime.timeout_secs,
        "Listening for triggers"
    );

    let functions_service = FunctionsService::new(
        dispatcher,
        Duration::from_secs(config.runtime.timeout_secs),
    );
    ready.store(true, Ordering::Relaxed);

    let functions_task = serve(listener, functions_service);
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        admin_service,
    );

    tokio::try_join!(functions_task, admin_task)?;
    Ok(())
}

/// Wires the production collaborators. The Pub/Sub client is created once
/// here and shared by every invocation.
pub fn build_dispatcher(config: &Config) -> Result<Dispatcher, FunctionsError> {
    let tokens = match config.auth {
        AuthConfig::ApplicationDefault => TokenSource::application_default()?,
        AuthConfig::Anonymous => TokenSource::anonymous(),
    };

    let gcp_project = config
        .pubsub
        .gcp_project
        .clone()
        .or_else(gcp_project_from_env)
        .ok_or(FunctionsError::MissingGcpProject)?;

    let projects = Arc::new(HttpProjectService::new(config.project_service.url.clone()));
    let publisher = Arc::new(PubSubPublisher::new(
        &config.pubsub.endpoint,
        gcp_project.clone(),
        tokens.clone(),
    ));
    let build: Arc<dyn BuildTrigger> = match &config.cloud_build {
        Some(cloud_build) => Arc::new(CloudBuildTrigger::new(
            &cloud_build.endpoint,
            gcp_project,
            cloud_build.trigger_id.clone(),
            cloud_build.branch.clone(),
            tokens,
        )),
        None => {
            tracing::warn!("No cloud_build config, cloudBuild will always fail");
            Arc::new(DisabledBuildTrigger)
        }
    };

    Ok(Dispatcher::new(
        Collaborators {
            projects: projects.clone(),
            resolver: projects,
            publisher,
            build,
        },
        config.pubsub.topic.clone(),
        &config.site_url,
    ))
}

fn gcp_project_from_env() -> Option<String> {
    GCP_PROJECT_ENV_VARS
        .iter()
        .find_map(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
}
