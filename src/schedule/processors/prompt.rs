use async_trait::async_trait;
use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::RuntimeConfig;
use crate::inference::{GenerateRequest, InferenceClient};
use crate::schedule::types::{estimate_tokens, PromptResult, Task, TaskAction, TaskResult};
use super::{ensure_text_length, TaskProcessor};

const GENERATE_TIMEOUT: Duration = Duration::from_secs(120);

/// Answers a free-form prompt with the conversation model.
#[derive(Clone)]
pub struct PromptProcessor {
    config: Arc<RuntimeConfig>,
    inference: InferenceClient,
}

impl PromptProcessor {
    pub fn new(config: Arc<RuntimeConfig>, inference: InferenceClient) -> Self {
        Self { config, inference }
    }
}

#[async_trait]
impl TaskProcessor for PromptProcessor {
    fn action(&self) -> TaskAction {
        TaskAction::Prompt
    }

    async fn process(&self, task: &Task) -> Result<TaskResult> {
        let prompt = task.content.as_str();
        if prompt.trim().is_empty() {
            anyhow::bail!("prompt content is empty");
        }
        ensure_text_length(prompt, self.config.max_text_length, "prompt")?;

        info!(task_id = %task.task_id, model = %self.config.conversation_model, "Generating prompt response");

        let request = GenerateRequest::new(&self.config.conversation_model, prompt).with_options(json!({
            "temperature": 0.7,
            "top_p": 0.9,
            "max_tokens": 1000
        }));
        let response = self.inference.generate(&request, GENERATE_TIMEOUT).await?;

        let text = response.response.trim().to_string();
        if text.is_empty() {
            anyhow::bail!("model returned an empty response");
        }

        info!(task_id = %task.task_id, chars = text.chars().count(), "Prompt response generated");

        Ok(TaskResult::Prompt(PromptResult {
            tokens: estimate_tokens(&text),
            model: response
                .model
                .unwrap_or_else(|| self.config.conversation_model.clone()),
            confidence: 0.8,
            response: text,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor(max_text_length: usize) -> PromptProcessor {
        let config = RuntimeConfig {
            max_text_length,
            // nothing listens here, validation must fail before any request
            ollama_base_url: "http://127.0.0.1:9".to_string(),
            ..RuntimeConfig::default()
        };
        let inference = InferenceClient::new(&config.ollama_base_url).unwrap();
        PromptProcessor::new(Arc::new(config), inference)
    }

    #[tokio::test]
    async fn test_rejects_prompt_over_limit() {
        let task = Task::new("t1", "prompt", "x".repeat(11));
        let err = processor(10).process(&task).await.unwrap_err();
        assert!(err.to_string().contains("too long"));
    }

    #[tokio::test]
    async fn test_rejects_empty_prompt() {
        let task = Task::new("t1", "prompt", "   ");
        assert!(processor(10).process(&task).await.is_err());
    }
}
