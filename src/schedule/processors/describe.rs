use async_trait::async_trait;
use anyhow::Result;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::RuntimeConfig;
use crate::inference::{GenerateRequest, InferenceClient};
use crate::schedule::types::{DescribeResult, Task, TaskAction, TaskResult};
use crate::utils::data_uri;
use super::{length_confidence, TaskProcessor};

const DESCRIBE_TIMEOUT: Duration = Duration::from_secs(120);

pub const ALLOWED_IMAGE_TYPES: [&str; 7] = [
    "image/jpeg", "image/jpg", "image/png", "image/gif", "image/bmp", "image/webp", "image/tiff",
];

const DESCRIBE_PROMPT: &str = "Descreva esta imagem em português brasileiro. Inclua:
1. Uma descrição geral da imagem
2. Objetos principais visíveis
3. Cores predominantes
4. Qualquer texto visível na imagem

Seja detalhado mas conciso.";

const COLOR_WORDS: [&str; 14] = [
    "vermelho", "azul", "verde", "amarelo", "preto", "branco", "cinza",
    "rosa", "roxo", "laranja", "marrom", "bege", "dourado", "prateado",
];

const OBJECT_WORDS: [&str; 21] = [
    "pessoa", "carro", "casa", "árvore", "cachorro", "gato", "mesa", "cadeira",
    "computador", "telefone", "livro", "papel", "caneta", "logo", "texto",
    "imagem", "foto", "desenho", "gráfico", "botão", "ícone",
];

const TEXT_MARKERS: [&str; 4] = ["texto", "escrito", "palavra", "letra"];

/// Describes an image with the vision model.
#[derive(Clone)]
pub struct DescribeProcessor {
    config: Arc<RuntimeConfig>,
    inference: InferenceClient,
}

impl DescribeProcessor {
    pub fn new(config: Arc<RuntimeConfig>, inference: InferenceClient) -> Self {
        Self { config, inference }
    }
}

#[async_trait]
impl TaskProcessor for DescribeProcessor {
    fn action(&self) -> TaskAction {
        TaskAction::Describe
    }

    async fn process(&self, task: &Task) -> Result<TaskResult> {
        if task.content.trim().is_empty() {
            anyhow::bail!("no image content");
        }

        let image = data_uri::decode(&task.content, "image/jpeg")?;
        data_uri::ensure_size(image.size(), self.config.max_image_size_bytes())?;
        data_uri::ensure_mime(&image.mime_type, &ALLOWED_IMAGE_TYPES)?;

        info!(task_id = %task.task_id, mime = %image.mime_type, size = image.size(), "Describing image");

        let request = GenerateRequest::new(&self.config.vision_model, DESCRIBE_PROMPT)
            .with_image(image.encoded);
        let response = self.inference.generate(&request, DESCRIBE_TIMEOUT).await?;

        let text = response.response.trim();
        if text.is_empty() {
            anyhow::bail!("model returned an empty description");
        }

        Ok(TaskResult::Describe(parse_description(text)))
    }
}

/// Pull colours, objects and any quoted text out of a free-form description.
pub fn parse_description(raw: &str) -> DescribeResult {
    let mut description = String::new();
    let mut colors = BTreeSet::new();
    let mut objects = BTreeSet::new();
    let mut text = None;

    for line in raw.lines() {
        let line = line.trim().to_lowercase();
        if line.is_empty() {
            continue;
        }

        description.push_str(&line);
        description.push(' ');

        colors.extend(COLOR_WORDS.iter().filter(|c| line.contains(*c)).map(|c| c.to_string()));
        objects.extend(OBJECT_WORDS.iter().filter(|o| line.contains(*o)).map(|o| o.to_string()));

        if TEXT_MARKERS.iter().any(|m| line.contains(m)) {
            if let Some((_, quoted)) = line.rsplit_once(':') {
                let quoted = quoted.trim();
                if !quoted.is_empty() {
                    text = Some(quoted.to_string());
                }
            }
        }
    }

    let description = description.trim().to_string();

    DescribeResult {
        confidence: length_confidence(&description, 200.0),
        description,
        objects: objects.into_iter().take(10).collect(),
        colors: colors.into_iter().take(5).collect(),
        text,
    }
}
