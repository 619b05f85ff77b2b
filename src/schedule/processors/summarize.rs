use async_trait::async_trait;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::RuntimeConfig;
use crate::document;
use crate::inference::{GenerateRequest, InferenceClient};
use crate::schedule::types::{SummarizeResult, Task, TaskAction, TaskResult};
use crate::utils::blocking::run_blocking;
use crate::utils::data_uri;
use super::{length_confidence, TaskProcessor};

const SUMMARIZE_TIMEOUT: Duration = Duration::from_secs(180);
const FALLBACK_SUMMARY_CHARS: usize = 500;
const MAX_KEY_POINTS: usize = 8;

pub const ALLOWED_DOCUMENT_TYPES: [&str; 7] = [
    document::PDF,
    document::MSWORD,
    document::DOCX,
    document::XLS,
    document::XLSX,
    "text/plain",
    "text/csv",
];

/// Summarizes plain text or an uploaded PDF, Word, spreadsheet or text document.
#[derive(Clone)]
pub struct SummarizeProcessor {
    config: Arc<RuntimeConfig>,
    inference: InferenceClient,
}

impl SummarizeProcessor {
    pub fn new(config: Arc<RuntimeConfig>, inference: InferenceClient) -> Self {
        Self { config, inference }
    }

    /// Resolve task content into the document text to summarize.
    async fn document_text(&self, content: &str) -> Result<String> {
        if !data_uri::is_data_uri(content) {
            data_uri::ensure_size(content.len() as u64, self.config.max_document_size_bytes())?;
            return Ok(content.trim().to_string());
        }

        let upload = data_uri::decode(content, "text/plain")?;
        data_uri::ensure_size(upload.size(), self.config.max_document_size_bytes())?;
        data_uri::ensure_mime(&upload.mime_type, &ALLOWED_DOCUMENT_TYPES)?;

        let mime_type = upload.mime_type;
        let bytes = upload.bytes;
        run_blocking(move || document::extract_text(&mime_type, bytes)).await
    }
}

#[async_trait]
impl TaskProcessor for SummarizeProcessor {
    fn action(&self) -> TaskAction {
        TaskAction::Summarize
    }

    async fn process(&self, task: &Task) -> Result<TaskResult> {
        let text = self.document_text(&task.content).await?;
        if text.is_empty() {
            anyhow::bail!("document has no text to summarize");
        }

        let text = truncate(&text, self.config.max_text_length);
        info!(task_id = %task.task_id, chars = text.chars().count(), "Summarizing document");

        let request = GenerateRequest::new(&self.config.summary_model, summary_prompt(&text));
        let response = self.inference.generate(&request, SUMMARIZE_TIMEOUT).await?;

        let raw = response.response.trim();
        if raw.is_empty() {
            anyhow::bail!("model returned an empty summary");
        }

        Ok(TaskResult::Summarize(parse_summary(raw)))
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    warn!(max_chars, "Document truncated before summarizing");
    let mut truncated: String = text.chars().take(max_chars).collect();
    truncated.push_str("...");
    truncated
}

fn summary_prompt(document: &str) -> String {
    format!(
        "Analise o seguinte documento e crie um resumo estruturado em português brasileiro.

Documento:
{document}

Por favor, forneça:
1. Um resumo conciso do conteúdo principal
2. Os pontos-chave mais importantes (lista com até 8 itens)
3. O tipo de documento identificado

Formate a resposta como:
RESUMO: [resumo do conteúdo]
PONTOS-CHAVE:
- [ponto 1]
- [ponto 2]
- ...
TIPO: [tipo do documento]"
    )
}

#[derive(PartialEq)]
enum Section {
    Summary,
    KeyPoints,
    Other,
}

/// Parse the `RESUMO:` / `PONTOS-CHAVE:` / `TIPO:` layout the prompt asks for.
pub fn parse_summary(raw: &str) -> SummarizeResult {
    let mut summary = String::new();
    let mut key_points = Vec::new();
    let mut document_type = "documento".to_string();
    let mut section = Section::Other;

    for line in raw.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(rest) = line.strip_prefix("RESUMO:") {
            summary = rest.trim().to_string();
            section = Section::Summary;
        } else if line.starts_with("PONTOS-CHAVE:") {
            section = Section::KeyPoints;
        } else if let Some(rest) = line.strip_prefix("TIPO:") {
            document_type = rest.trim().to_string();
            section = Section::Other;
        } else if section == Section::KeyPoints && line.starts_with('-') {
            let point = line.trim_start_matches('-').trim();
            if !point.is_empty() {
                key_points.push(point.to_string());
            }
        } else if section == Section::Summary && summary.is_empty() {
            summary = line.to_string();
        }
    }

    if summary.is_empty() {
        summary = if raw.chars().count() > FALLBACK_SUMMARY_CHARS {
            let mut head: String = raw.chars().take(FALLBACK_SUMMARY_CHARS).collect();
            head.push_str("...");
            head
        } else {
            raw.to_string()
        };
    }

    if key_points.is_empty() {
        key_points = summary
            .split('.')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .take(5)
            .map(String::from)
            .collect();
    }
    key_points.truncate(MAX_KEY_POINTS);

    SummarizeResult {
        confidence: length_confidence(&summary, 200.0),
        summary,
        key_points,
        document_type,
    }
}
