use async_trait::async_trait;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::RuntimeConfig;
use crate::inference::InferenceClient;
use crate::schedule::types::{estimate_tokens, EmbeddingResult, Task, TaskAction, TaskResult};
use super::{ensure_text_length, TaskProcessor};

const EMBEDDING_TIMEOUT: Duration = Duration::from_secs(60);
const KNOWLEDGE_DIMENSIONS: usize = 768;
const DEFAULT_DIMENSIONS: usize = 1536;

/// Embeds text for both the `embedding` and `knowledge` actions.
#[derive(Clone)]
pub struct EmbeddingProcessor {
    config: Arc<RuntimeConfig>,
    inference: InferenceClient,
}

impl EmbeddingProcessor {
    pub fn new(config: Arc<RuntimeConfig>, inference: InferenceClient) -> Self {
        Self { config, inference }
    }

    /// Requested vector size; knowledge-base entries use the smaller model output.
    pub fn requested_dimensions(task: &Task) -> usize {
        match task.parsed_action() {
            Some(TaskAction::Knowledge) => KNOWLEDGE_DIMENSIONS,
            _ => DEFAULT_DIMENSIONS,
        }
    }
}

#[async_trait]
impl TaskProcessor for EmbeddingProcessor {
    fn action(&self) -> TaskAction {
        TaskAction::Embedding
    }

    async fn process(&self, task: &Task) -> Result<TaskResult> {
        let text = task.content.as_str();
        if text.trim().is_empty() {
            anyhow::bail!("no text content to embed");
        }
        ensure_text_length(text, self.config.max_text_length, "text")?;

        let dimensions = Self::requested_dimensions(task);
        let response = self
            .inference
            .embeddings(&self.config.embedding_model, text, dimensions, EMBEDDING_TIMEOUT)
            .await?;

        if response.embedding.is_empty() {
            anyhow::bail!("model returned an empty embedding");
        }

        let actual = response.embedding.len();
        if actual != dimensions {
            warn!(task_id = %task.task_id, expected = dimensions, actual, "Embedding dimensions differ from request");
        }
        info!(task_id = %task.task_id, dimensions = actual, "Embedding generated");

        Ok(TaskResult::Embedding(EmbeddingResult {
            embedding: response.embedding,
            model: response
                .model
                .unwrap_or_else(|| self.config.embedding_model.clone()),
            dimensions: actual,
            tokens: estimate_tokens(text),
        }))
    }
}
