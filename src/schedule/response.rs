use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::types::{Task, TaskFailure, TaskResult};

const PREVIEW_MAX_CHARS: usize = 100;
const PREVIEW_MAX_ITEMS: usize = 10;

/// Outbound submission record for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub task_id: String,
    #[serde(rename = "type")]
    pub action: String,
    pub success: bool,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    pub details: Value,
}

impl From<&TaskFailure> for ErrorDetail {
    fn from(failure: &TaskFailure) -> Self {
        Self {
            code: failure.kind.code().to_string(),
            message: failure.message.clone(),
            details: json!({
                "action": failure.action,
                "error": failure.message,
            }),
        }
    }
}

/// Shape the envelope for `task` from the outcome of its capability.
pub fn build_envelope(task: &Task, outcome: &Result<TaskResult, TaskFailure>) -> ResponseEnvelope {
    let mut envelope = ResponseEnvelope {
        task_id: task.task_id.clone(),
        action: task.action.clone(),
        success: outcome.is_ok(),
        data: Value::Null,
        server_id: task.server_id.clone(),
        conversation_id: task.conversation_id.clone(),
        client_id: task.client_id.clone(),
        channel_id: task.channel_id.clone(),
        message_id: task.message_id.clone(),
        metadata: task.metadata.clone(),
        error: None,
    };

    match outcome {
        Ok(result) => {
            envelope.data = primary_value(result);
            envelope.metadata.extend(result_metadata(result));
        }
        Err(failure) => envelope.error = Some(ErrorDetail::from(failure)),
    }

    envelope
}

fn primary_value(result: &TaskResult) -> Value {
    match result {
        TaskResult::Transcribe(r) => Value::String(r.transcription.clone()),
        TaskResult::Describe(r) => Value::String(r.description.clone()),
        TaskResult::Summarize(r) => Value::String(r.summary.clone()),
        TaskResult::Embedding(r) => json!(r.embedding),
        TaskResult::Prompt(r) => Value::String(r.response.clone()),
    }
}

/// Per-variant extras merged into the echoed request metadata.
fn result_metadata(result: &TaskResult) -> Map<String, Value> {
    let mut extras = Map::new();
    if let TaskResult::Embedding(r) = result {
        extras.insert("dimensions".to_string(), json!(r.dimensions));
        extras.insert("model".to_string(), json!(r.model));
        extras.insert("tokens".to_string(), json!(r.tokens));
    }
    extras
}

/// Copy of the envelope safe to log: long strings and vectors are cut short.
pub fn preview(envelope: &ResponseEnvelope) -> Value {
    let mut value = match serde_json::to_value(envelope) {
        Ok(value) => value,
        Err(_) => return Value::Null,
    };

    if let Some(data) = value.get_mut("data") {
        truncate_value(data);
    }
    value
}

fn truncate_value(value: &mut Value) {
    match value {
        Value::String(s) if s.chars().count() > PREVIEW_MAX_CHARS => {
            let mut short: String = s.chars().take(PREVIEW_MAX_CHARS).collect();
            short.push_str("...");
            *s = short;
        }
        Value::Array(items) if items.len() > PREVIEW_MAX_ITEMS => {
            let total = items.len();
            items.truncate(PREVIEW_MAX_ITEMS);
            items.push(Value::String(format!("... ({} items)", total)));
        }
        _ => {}
    }
}
