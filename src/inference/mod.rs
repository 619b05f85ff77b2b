//! Client for the local inference service (Ollama-compatible HTTP API).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

impl GenerateRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            stream: false,
            images: Vec::new(),
            options: None,
        }
    }

    pub fn with_image(mut self, base64_image: impl Into<String>) -> Self {
        self.images.push(base64_image.into());
        self
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.options = Some(options);
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub response: String,
}

#[derive(Debug, Clone, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    options: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsResponse {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub embedding: Vec<f32>,
}

#[derive(Clone)]
pub struct InferenceClient {
    client: reqwest::Client,
    base_url: String,
}

impl InferenceClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("failed to build inference http client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Non-streaming completion via `/api/generate`.
    pub async fn generate(&self, request: &GenerateRequest, timeout: Duration) -> Result<GenerateResponse> {
        let url = format!("{}/api/generate", self.base_url);
        debug!(model = %request.model, images = request.images.len(), "Sending generate request");

        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(request)
            .send()
            .await
            .with_context(|| format!("inference request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), %body, "Generate request rejected");
            anyhow::bail!("inference service returned HTTP {}: {}", status.as_u16(), body);
        }

        response
            .json::<GenerateResponse>()
            .await
            .context("invalid generate response body")
    }

    /// Embedding vector via `/api/embeddings`.
    pub async fn embeddings(
        &self,
        model: &str,
        prompt: &str,
        dimensions: usize,
        timeout: Duration,
    ) -> Result<EmbeddingsResponse> {
        let url = format!("{}/api/embeddings", self.base_url);
        let request = EmbeddingsRequest {
            model,
            prompt,
            options: serde_json::json!({ "dimensions": dimensions }),
        };

        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("inference request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), %body, "Embeddings request rejected");
            anyhow::bail!("inference service returned HTTP {}: {}", status.as_u16(), body);
        }

        response
            .json::<EmbeddingsResponse>()
            .await
            .context("invalid embeddings response body")
    }
}
