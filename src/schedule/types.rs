use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Display;
use std::str::FromStr;

/// Closed set of task kinds the workflow API can hand out.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum TaskAction {
    Transcribe,
    Describe,
    Summarize,
    Embedding,
    Knowledge,
    Prompt,
}

impl TaskAction {
    pub const ALL: [TaskAction; 6] = [
        TaskAction::Transcribe,
        TaskAction::Describe,
        TaskAction::Summarize,
        TaskAction::Embedding,
        TaskAction::Knowledge,
        TaskAction::Prompt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskAction::Transcribe => "transcribe",
            TaskAction::Describe => "describe",
            TaskAction::Summarize => "summarize",
            TaskAction::Embedding => "embedding",
            TaskAction::Knowledge => "knowledge",
            TaskAction::Prompt => "prompt",
        }
    }

    pub fn is_embedding_family(&self) -> bool {
        matches!(self, TaskAction::Embedding | TaskAction::Knowledge)
    }
}

impl Display for TaskAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskAction {
    type Err = String;

    fn from_str(action: &str) -> Result<Self, Self::Err> {
        match action.trim().to_ascii_lowercase().as_str() {
            "transcribe" => Ok(TaskAction::Transcribe),
            "describe" => Ok(TaskAction::Describe),
            "summarize" => Ok(TaskAction::Summarize),
            "embedding" | "embed" => Ok(TaskAction::Embedding),
            "knowledge" => Ok(TaskAction::Knowledge),
            "prompt" => Ok(TaskAction::Prompt),
            _ => Err(format!("unknown task action: {}", action)),
        }
    }
}

/// One unit of work received from the workflow API.
///
/// `action` stays a raw string: an unregistered action is reported back
/// verbatim rather than rejected while decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub action: String,
    #[serde(default, alias = "text")]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Task {
    pub fn new(task_id: impl Into<String>, action: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            action: action.into(),
            content: content.into(),
            conversation_id: None,
            channel_id: None,
            client_id: None,
            message_id: None,
            server_id: None,
            metadata: Map::new(),
        }
    }

    pub fn parsed_action(&self) -> Option<TaskAction> {
        self.action.parse().ok()
    }
}

/// Typed output of a capability, one variant per task kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "result", rename_all = "lowercase")]
pub enum TaskResult {
    Transcribe(TranscribeResult),
    Describe(DescribeResult),
    Summarize(SummarizeResult),
    Embedding(EmbeddingResult),
    Prompt(PromptResult),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscribeResult {
    pub transcription: String,
    pub confidence: f64,
    pub language: String,
    /// Seconds of decoded audio.
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescribeResult {
    pub description: String,
    pub confidence: f64,
    pub objects: Vec<String>,
    pub colors: Vec<String>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarizeResult {
    pub summary: String,
    pub key_points: Vec<String>,
    pub document_type: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingResult {
    pub embedding: Vec<f32>,
    pub model: String,
    pub dimensions: usize,
    pub tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptResult {
    pub response: String,
    pub confidence: f64,
    pub tokens: u64,
    pub model: String,
}

impl PromptResult {
    /// Result with only the response text set, as a stub capability would return.
    pub fn text(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            confidence: 0.0,
            tokens: 0,
            model: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FailureKind {
    UnknownAction,
    ProcessingError,
}

impl FailureKind {
    pub fn code(&self) -> &'static str {
        match self {
            FailureKind::UnknownAction => "UNKNOWN_ACTION",
            FailureKind::ProcessingError => "PROCESSING_ERROR",
        }
    }
}

/// Task-scoped failure produced at the dispatch boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskFailure {
    pub kind: FailureKind,
    pub action: String,
    pub message: String,
}

impl TaskFailure {
    pub fn unknown_action(action: &str) -> Self {
        Self {
            kind: FailureKind::UnknownAction,
            action: action.to_string(),
            message: format!("no processor registered for action: {}", action),
        }
    }

    pub fn processing(action: &str, message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::ProcessingError,
            action: action.to_string(),
            message: message.into(),
        }
    }
}

impl Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.code(), self.message)
    }
}

/// Rough token estimate used for inference-backed results.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.split_whitespace().count() as f64 * 1.3) as u64
}
