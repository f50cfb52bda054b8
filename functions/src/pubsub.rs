//! The `get-project` queue: job payloads, publishing, and decoding of push
//! deliveries.
use crate::gcp::{AuthError, TokenSource};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hyper::body::Bytes;
use project::ProjectId;
use serde::{Deserialize, Serialize};

pub const DEFAULT_ENDPOINT: &str = "https://pubsub.googleapis.com";
pub const GET_PROJECT_TOPIC: &str = "get-project";

/// Payload of one fan-out job.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct JobMessage {
    pub id: ProjectId,
}

impl JobMessage {
    pub fn to_bytes(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PublishError {
    #[error("publish request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("could not authorize publish: {0}")]
    Auth(#[from] AuthError),
    #[error("publish to {topic} rejected with {status}: {message}")]
    Rejected {
        topic: String,
        status: reqwest::StatusCode,
        message: String,
    },
    #[error("publish to {0} returned no message id")]
    MissingMessageId(String),
}

/// Publishes raw payloads to a topic. One client instance is shared by every
/// concurrent invocation; each call is independent.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Returns the server assigned message id.
    async fn publish(&self, topic: &str, data: Bytes) -> Result<String, PublishError>;
}

#[derive(Serialize)]
struct PublishRequest<'a> {
    messages: [OutgoingMessage<'a>; 1],
}

#[derive(Serialize)]
struct OutgoingMessage<'a> {
    data: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    #[serde(default)]
    message_ids: Vec<String>,
}

/// Google Cloud Pub/Sub REST publisher.
#[derive(Clone)]
pub struct PubSubPublisher {
    client: reqwest::Client,
    endpoint: String,
    gcp_project: String,
    tokens: TokenSource,
}

impl PubSubPublisher {
    pub fn new(endpoint: &str, gcp_project: String, tokens: TokenSource) -> Self {
        PubSubPublisher {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            gcp_project,
            tokens,
        }
    }

    fn topic_url(&self, topic: &str) -> String {
        format!(
            "{}/v1/projects/{}/topics/{}:publish",
            self.endpoint, self.gcp_project, topic
        )
    }
}

#[async_trait]
impl Publisher for PubSubPublisher {
    async fn publish(&self, topic: &str, data: Bytes) -> Result<String, PublishError> {
        let encoded = STANDARD.encode(&data);
        let body = PublishRequest {
            messages: [OutgoingMessage { data: &encoded }],
        };

        let request = self.client.post(self.topic_url(topic)).json(&body);
        let response = self.tokens.authorize(request).await?.send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PublishError::Rejected {
                topic: topic.to_string(),
                status,
                message: message.trim().to_string(),
            });
        }

        response
            .json::<PublishResponse>()
            .await?
            .message_ids
            .into_iter()
            .next()
            .ok_or_else(|| PublishError::MissingMessageId(topic.to_string()))
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PushError {
    #[error("malformed envelope: {0}")]
    Envelope(serde_json::Error),
    #[error("message {0} has no data")]
    NoData(String),
    #[error("message data is not base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("message payload is not a job: {0}")]
    Payload(serde_json::Error),
}

/// Body of a Pub/Sub push subscription delivery. Fields other than the
/// message data and id are ignored.
#[derive(Debug, Deserialize)]
pub struct PushEnvelope {
    pub message: PushMessage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
}

impl PushEnvelope {
    pub fn from_slice(body: &[u8]) -> Result<Self, PushError> {
        serde_json::from_slice(body).map_err(PushError::Envelope)
    }

    pub fn message_id(&self) -> &str {
        self.message.message_id.as_deref().unwrap_or("unknown")
    }

    pub fn job(&self) -> Result<JobMessage, PushError> {
        let data = self
            .message
            .data
            .as_deref()
            .ok_or_else(|| PushError::NoData(self.message_id().to_string()))?;
        let payload = STANDARD.decode(data)?;
        serde_json::from_slice(&payload).map_err(PushError::Payload)
    }
}
