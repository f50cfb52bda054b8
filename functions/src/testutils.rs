//! In-memory collaborators for dispatcher and service tests.
use crate::build::{BuildError, BuildTrigger};
use crate::dispatch::{Collaborators, Dispatcher};
use crate::pubsub::{GET_PROJECT_TOPIC, PublishError, Publisher};
use async_trait::async_trait;
use http::StatusCode;
use hyper::body::Bytes;
use metrics::{
    Counter, CounterFn, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit,
};
use project::{
    GetParams, ProjectAccessor, ProjectError, ProjectFactory, ProjectId, ProjectResolver,
};
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct ProjectsState {
    ids: Vec<ProjectId>,
    params_by_id: HashMap<ProjectId, GetParams>,
    store_error: Option<String>,
    list_error: Option<String>,
    store_delay: Option<Duration>,
    created: Vec<GetParams>,
    resolved: Vec<ProjectId>,
    stored: Vec<(GetParams, ProjectId)>,
}

fn rejected(message: &str) -> ProjectError {
    ProjectError::Rejected {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: message.to_string(),
    }
}

/// Project factory and resolver recording every call. Ids resolve to
/// `GetParams::default()` unless registered with `with_params`.
#[derive(Clone, Default)]
pub struct FakeProjects {
    state: Arc<Mutex<ProjectsState>>,
}

impl FakeProjects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ids(self, ids: &[&str]) -> Self {
        self.state.lock().unwrap().ids = ids.iter().map(|id| ProjectId::new(*id)).collect();
        self
    }

    pub fn with_params(self, id: &str, params: GetParams) -> Self {
        self.state
            .lock()
            .unwrap()
            .params_by_id
            .insert(ProjectId::new(id), params);
        self
    }

    pub fn failing_store(self, message: &str) -> Self {
        self.state.lock().unwrap().store_error = Some(message.to_string());
        self
    }

    pub fn failing_list(self, message: &str) -> Self {
        self.state.lock().unwrap().list_error = Some(message.to_string());
        self
    }

    pub fn slow_store(self, delay: Duration) -> Self {
        self.state.lock().unwrap().store_delay = Some(delay);
        self
    }

    /// Params of every accessor built through the factory.
    pub fn created(&self) -> Vec<GetParams> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn resolved(&self) -> Vec<ProjectId> {
        self.state.lock().unwrap().resolved.clone()
    }

    /// Every store attempt, failed ones included.
    pub fn stored(&self) -> Vec<(GetParams, ProjectId)> {
        self.state.lock().unwrap().stored.clone()
    }

    fn accessor_for(&self, params: GetParams) -> Arc<dyn ProjectAccessor> {
        Arc::new(FakeAccessor {
            state: self.state.clone(),
            params,
        })
    }
}

impl ProjectFactory for FakeProjects {
    fn accessor(&self, params: GetParams) -> Arc<dyn ProjectAccessor> {
        self.state.lock().unwrap().created.push(params.clone());
        self.accessor_for(params)
    }
}

#[async_trait]
impl ProjectResolver for FakeProjects {
    async fn for_id(&self, id: &ProjectId) -> Result<Arc<dyn ProjectAccessor>, ProjectError> {
        let params = {
            let mut state = self.state.lock().unwrap();
            state.resolved.push(id.clone());
            state.params_by_id.get(id).cloned().unwrap_or_default()
        };
        Ok(self.accessor_for(params))
    }
}

struct FakeAccessor {
    state: Arc<Mutex<ProjectsState>>,
    params: GetParams,
}

#[async_trait]
impl ProjectAccessor for FakeAccessor {
    fn params(&self) -> &GetParams {
        &self.params
    }

    async fn recursive_store_project(&self, id: &ProjectId) -> Result<(), ProjectError> {
        let (delay, error) = {
            let mut state = self.state.lock().unwrap();
            state.stored.push((self.params.clone(), id.clone()));
            (state.store_delay, state.store_error.clone())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match error {
            Some(message) => Err(rejected(&message)),
            None => Ok(()),
        }
    }

    async fn list_all_project_ids(&self) -> Result<Vec<ProjectId>, ProjectError> {
        let state = self.state.lock().unwrap();
        match &state.list_error {
            Some(message) => Err(rejected(message)),
            None => Ok(state.ids.clone()),
        }
    }
}

#[derive(Default)]
struct PublisherState {
    attempts: usize,
    fail_payloads: HashSet<String>,
    published: Vec<(String, String)>,
}

/// Publisher keeping `(topic, payload)` of each acknowledged message.
#[derive(Clone, Default)]
pub struct RecordingPublisher {
    state: Arc<Mutex<PublisherState>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(self, payload: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .fail_payloads
            .insert(payload.to_string());
        self
    }

    pub fn attempts(&self) -> usize {
        self.state.lock().unwrap().attempts
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().published.clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, topic: &str, data: Bytes) -> Result<String, PublishError> {
        let payload = String::from_utf8_lossy(&data).into_owned();
        let mut state = self.state.lock().unwrap();
        state.attempts += 1;

        if state.fail_payloads.contains(&payload) {
            return Err(PublishError::Rejected {
                topic: topic.to_string(),
                status: StatusCode::SERVICE_UNAVAILABLE,
                message: "unavailable".into(),
            });
        }

        state.published.push((topic.to_string(), payload));
        Ok(state.published.len().to_string())
    }
}

pub enum FakeBuild {
    Ok,
    Fail,
}

#[async_trait]
impl BuildTrigger for FakeBuild {
    async fn build(&self) -> Result<String, BuildError> {
        match self {
            FakeBuild::Ok => Ok("operations/build/test".into()),
            FakeBuild::Fail => Err(BuildError::NotConfigured),
        }
    }
}

pub fn dispatcher(
    projects: &FakeProjects,
    publisher: &RecordingPublisher,
    build: FakeBuild,
) -> Dispatcher {
    Dispatcher::new(
        Collaborators {
            projects: Arc::new(projects.clone()),
            resolver: Arc::new(projects.clone()),
            publisher: Arc::new(publisher.clone()),
            build: Arc::new(build),
        },
        GET_PROJECT_TOPIC.into(),
        "https://firebaseopensource.com/",
    )
}

/// Formatted log output captured by `capture_logs`.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Routes events on the current thread into a buffer until the guard drops.
/// Only usable from current-thread runtimes such as plain `#[tokio::test]`.
pub fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    (buffer, tracing::subscriber::set_default(subscriber))
}

/// Recorder keeping counter totals by metric name. Install it with
/// `metrics::set_default_local_recorder` for the current thread.
#[derive(Default)]
pub struct CountingRecorder {
    counters: Mutex<HashMap<String, Arc<AtomicU64>>>,
}

impl CountingRecorder {
    pub fn count(&self, name: &str) -> u64 {
        self.counters
            .lock()
            .unwrap()
            .get(name)
            .map_or(0, |value| value.load(Ordering::SeqCst))
    }
}

struct CountingCounter(Arc<AtomicU64>);

impl CounterFn for CountingCounter {
    fn increment(&self, value: u64) {
        self.0.fetch_add(value, Ordering::SeqCst);
    }

    fn absolute(&self, value: u64) {
        self.0.store(value, Ordering::SeqCst);
    }
}

impl Recorder for CountingRecorder {
    fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
    fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

    fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
        let value = self
            .counters
            .lock()
            .unwrap()
            .entry(key.name().to_string())
            .or_default()
            .clone();
        Counter::from_arc(Arc::new(CountingCounter(value)))
    }

    fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
        Gauge::noop()
    }

    fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
        Histogram::noop()
    }
}
