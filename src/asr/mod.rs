use anyhow::Result;
use serde::{Serialize, Deserialize};
use async_trait::async_trait;

#[cfg(feature = "whisper")]
pub mod whisper;

#[derive(Debug, Clone, Default)]
pub struct AsrParams {
    pub language: Option<String>,
    pub single_segment: bool,
}

impl AsrParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_language(&mut self, language: Option<String>) -> &mut Self {
        self.language = language;
        self
    }

    pub fn set_single_segment(&mut self, single_segment: bool) -> &mut Self {
        self.single_segment = single_segment;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsrSegment {
    pub text: String,
    /// Centiseconds, as reported by the engine.
    pub start: i64,
    pub end: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AsrTranscript {
    pub segments: Vec<AsrSegment>,
    pub full_text: String,
}

/// Speech-to-text over 16 kHz mono samples.
#[async_trait]
pub trait AsrEngine: Send + Sync {
    async fn transcribe(&self, audio: Vec<f32>, params: AsrParams) -> Result<AsrTranscript>;
}

