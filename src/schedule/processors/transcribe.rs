use async_trait::async_trait;
use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use crate::asr::{AsrEngine, AsrParams};
use crate::audio::{self, TARGET_SAMPLE_RATE};
use crate::config::RuntimeConfig;
use crate::schedule::types::{Task, TaskAction, TaskResult, TranscribeResult};
use crate::utils::blocking::run_blocking;
use crate::utils::{data_uri, temp};
use super::{length_confidence, TaskProcessor};

pub const ALLOWED_AUDIO_TYPES: [&str; 7] = [
    "audio/mpeg", "audio/mp3", "audio/wav", "audio/ogg", "audio/aac", "audio/m4a", "audio/flac",
];

const RESULT_LANGUAGE: &str = "pt-BR";

fn extension_for(mime: &str) -> &'static str {
    match mime {
        "audio/wav" => "wav",
        "audio/ogg" => "ogg",
        "audio/aac" => "aac",
        "audio/m4a" => "m4a",
        "audio/flac" => "flac",
        _ => "mp3",
    }
}

#[derive(Clone)]
pub struct TranscribeProcessor {
    config: Arc<RuntimeConfig>,
    asr: Arc<dyn AsrEngine>,
}

impl TranscribeProcessor {
    pub fn new(config: Arc<RuntimeConfig>, asr: Arc<dyn AsrEngine>) -> Self {
        Self { config, asr }
    }
}

#[async_trait]
impl TaskProcessor for TranscribeProcessor {
    fn action(&self) -> TaskAction {
        TaskAction::Transcribe
    }

    async fn process(&self, task: &Task) -> Result<TaskResult> {
        if !data_uri::is_data_uri(&task.content) {
            anyhow::bail!("audio content must be a data URI");
        }

        let clip = data_uri::decode(&task.content, "audio/mpeg")?;
        data_uri::ensure_size(clip.size(), self.config.max_audio_size_bytes())?;
        data_uri::ensure_mime(&clip.mime_type, &ALLOWED_AUDIO_TYPES)?;

        info!(task_id = %task.task_id, mime = %clip.mime_type, size = clip.size(), "Processing audio clip");

        // kept alive until decoding finishes; dropped file is removed
        let staged = temp::stage_bytes(&clip.bytes, extension_for(&clip.mime_type))?;
        let path = staged.path().to_path_buf();
        let samples = run_blocking(move || audio::parse_audio_file(&path)).await?;
        drop(staged);

        let duration = samples.len() as f64 / TARGET_SAMPLE_RATE as f64;

        let mut params = AsrParams::new();
        params.set_language(Some(self.config.transcription_language.clone()));
        let transcript = self.asr.transcribe(samples, params).await?;

        let transcription = transcript.full_text.trim().to_string();
        if transcription.is_empty() {
            warn!(task_id = %task.task_id, "Engine produced no text");
            anyhow::bail!("transcription is empty");
        }

        Ok(TaskResult::Transcribe(TranscribeResult {
            confidence: length_confidence(&transcription, 100.0),
            transcription,
            language: RESULT_LANGUAGE.to_string(),
            duration,
        }))
    }
}
