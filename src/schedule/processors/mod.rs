pub mod describe;
pub mod embed;
pub mod prompt;
pub mod summarize;
pub mod transcribe;

use async_trait::async_trait;
use anyhow::Result;
use crate::schedule::types::{Task, TaskAction, TaskResult};

pub use describe::DescribeProcessor;
pub use embed::EmbeddingProcessor;
pub use prompt::PromptProcessor;
pub use summarize::SummarizeProcessor;
pub use transcribe::TranscribeProcessor;

/// A capability: consume a task, produce a typed result or fail.
#[async_trait]
pub trait TaskProcessor: Send + Sync {
    fn action(&self) -> TaskAction;
    async fn process(&self, task: &Task) -> Result<TaskResult>;
}

/// Reject text longer than `max` characters.
pub(crate) fn ensure_text_length(text: &str, max: usize, what: &str) -> Result<()> {
    let length = text.chars().count();
    if length > max {
        anyhow::bail!("{} too long: {} characters (max {})", what, length, max);
    }
    Ok(())
}

/// Confidence heuristic shared by text-producing capabilities.
pub(crate) fn length_confidence(text: &str, divisor: f64) -> f64 {
    (text.chars().count() as f64 / divisor).clamp(0.7, 0.95)
}
