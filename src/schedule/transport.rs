use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::RuntimeConfig;
use super::response::ResponseEnvelope;
use super::types::Task;

pub const SERVER_TOKEN_HEADER: &str = "x-server-token";

/// Body shape shared by every workflow API endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: Option<T>,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("server credential rejected (401)")]
    Unauthorized,

    #[error("endpoint not found (404)")]
    NotFound,

    #[error("server error: HTTP {0}")]
    Server(u16),

    #[error("unexpected HTTP status {0}")]
    UnexpectedStatus(u16),

    #[error("invalid response body: {0}")]
    InvalidBody(String),
}

impl TransportError {
    pub fn is_auth(&self) -> bool {
        matches!(self, TransportError::Unauthorized)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_decode() {
            TransportError::InvalidBody(e.to_string())
        } else {
            TransportError::Network(e.to_string())
        }
    }
}

/// The two network operations the worker loop depends on.
#[async_trait]
pub trait WorkflowTransport: Send + Sync {
    async fn fetch_next(&self) -> Result<ApiResponse<Task>, TransportError>;
    async fn submit(&self, envelope: &ResponseEnvelope) -> Result<ApiResponse<Value>, TransportError>;
}

/// reqwest-backed transport. No retries; the loop owns backoff.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    server_key: String,
    poll_url: String,
    submit_url: String,
    fetch_timeout: Duration,
    submit_timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &RuntimeConfig, server_key: impl Into<String>) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            server_key: server_key.into(),
            poll_url: config.poll_url(),
            submit_url: config.submit_url(),
            fetch_timeout: config.fetch_timeout(),
            submit_timeout: config.submit_timeout(),
        })
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<ApiResponse<T>, TransportError> {
        let response = request
            .header(SERVER_TOKEN_HEADER, &self.server_key)
            .send()
            .await?;

        let status = response.status();
        debug!(status = status.as_u16(), url = %response.url(), "Workflow API responded");

        classify_status(status)?;

        let body = response.bytes().await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(ApiResponse { success: true, message: None, data: None });
        }
        serde_json::from_slice(&body).map_err(|e| TransportError::InvalidBody(e.to_string()))
    }
}

/// Map a non-success status onto the error the loop branches on.
pub fn classify_status(status: StatusCode) -> Result<(), TransportError> {
    match status {
        s if s.is_success() => Ok(()),
        StatusCode::UNAUTHORIZED => Err(TransportError::Unauthorized),
        StatusCode::NOT_FOUND => Err(TransportError::NotFound),
        s if s.is_server_error() => Err(TransportError::Server(s.as_u16())),
        s => Err(TransportError::UnexpectedStatus(s.as_u16())),
    }
}

#[async_trait]
impl WorkflowTransport for HttpTransport {
    async fn fetch_next(&self) -> Result<ApiResponse<Task>, TransportError> {
        self.send(self.client.get(&self.poll_url).timeout(self.fetch_timeout))
            .await
    }

    async fn submit(&self, envelope: &ResponseEnvelope) -> Result<ApiResponse<Value>, TransportError> {
        self.send(
            self.client
                .post(&self.submit_url)
                .timeout(self.submit_timeout)
                .json(envelope),
        )
        .await
    }
}
