//! Runtime configuration for the worker node.
//!
//! Values are read once at startup from the process environment (after `.env`
//! is loaded through `dotenv`) and never change afterwards. Every component
//! receives the same `Arc<RuntimeConfig>` as a read-only dependency.
//!
//! Parsing goes through [`RuntimeConfig::from_lookup`] so tests can feed a map
//! instead of mutating the environment.

use std::time::Duration;
use thiserror::Error;

const MB: u64 = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("SERVER_KEY is empty or not set, register this server first")]
    MissingServerKey,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub api_url: String,
    pub server_key: Option<String>,
    pub server_name: String,
    pub slug: String,
    pub poll_path: String,
    pub submit_path: String,

    pub polling_interval_seconds: u64,
    pub retry_delay_seconds: u64,
    pub fetch_timeout_seconds: u64,
    pub submit_timeout_seconds: u64,

    pub max_audio_size_mb: u64,
    pub max_image_size_mb: u64,
    pub max_document_size_mb: u64,
    pub max_text_length: usize,

    pub ollama_base_url: String,
    pub vision_model: String,
    pub conversation_model: String,
    pub embedding_model: String,
    pub summary_model: String,
    pub whisper_model_path: String,
    pub transcription_language: String,

    pub log_level: String,
    pub log_dir: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:3000".to_string(),
            server_key: None,
            server_name: "Servidor Local HubIA".to_string(),
            slug: "mvml".to_string(),
            poll_path: "/workflow/next".to_string(),
            submit_path: "/workflow/responses".to_string(),
            polling_interval_seconds: 5,
            retry_delay_seconds: 10,
            fetch_timeout_seconds: 30,
            submit_timeout_seconds: 60,
            max_audio_size_mb: 50,
            max_image_size_mb: 20,
            max_document_size_mb: 10,
            max_text_length: 10_000,
            ollama_base_url: "http://ollama:11434".to_string(),
            vision_model: "llava:7b".to_string(),
            conversation_model: "gemma2:9b".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            summary_model: "gemma2:9b".to_string(),
            whisper_model_path: "./models/ggml-base.bin".to_string(),
            transcription_language: "pt".to_string(),
            log_level: "info".to_string(),
            log_dir: "./logs".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Load `.env` (if present) and read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup, falling back to
    /// defaults for absent keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |key: &str, default: String| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(default)
        };

        let api_url = parse_url("API_URL", text("API_URL", defaults.api_url))?;
        let ollama_base_url =
            parse_url("OLLAMA_BASE_URL", text("OLLAMA_BASE_URL", defaults.ollama_base_url))?;

        let polling_interval_seconds = parse_number(
            &lookup,
            "POLLING_INTERVAL_SECONDS",
            defaults.polling_interval_seconds,
        )?;
        if polling_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                key: "POLLING_INTERVAL_SECONDS",
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            api_url,
            server_key: lookup("SERVER_KEY")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            server_name: text("SERVER_NAME", defaults.server_name),
            slug: text("SLUG", defaults.slug),
            poll_path: normalize_path(text("WORKFLOW_POLL_PATH", defaults.poll_path)),
            submit_path: normalize_path(text("WORKFLOW_SUBMIT_PATH", defaults.submit_path)),
            polling_interval_seconds,
            retry_delay_seconds: parse_number(
                &lookup,
                "RETRY_DELAY_SECONDS",
                defaults.retry_delay_seconds,
            )?,
            fetch_timeout_seconds: parse_number(
                &lookup,
                "FETCH_TIMEOUT_SECONDS",
                defaults.fetch_timeout_seconds,
            )?,
            submit_timeout_seconds: parse_number(
                &lookup,
                "SUBMIT_TIMEOUT_SECONDS",
                defaults.submit_timeout_seconds,
            )?,
            max_audio_size_mb: parse_megabytes(&lookup, "MAX_AUDIO_SIZE_MB", defaults.max_audio_size_mb)?,
            max_image_size_mb: parse_megabytes(&lookup, "MAX_IMAGE_SIZE_MB", defaults.max_image_size_mb)?,
            max_document_size_mb: parse_megabytes(
                &lookup,
                "MAX_DOCUMENT_SIZE_MB",
                defaults.max_document_size_mb,
            )?,
            max_text_length: parse_number(&lookup, "MAX_TEXT_LENGTH", defaults.max_text_length)?,
            ollama_base_url,
            vision_model: text("OLLAMA_MODEL_VISAO", defaults.vision_model),
            conversation_model: text("OLLAMA_MODEL_CONVERSACAO", defaults.conversation_model),
            embedding_model: text("OLLAMA_MODEL_EMBEDDINGS", defaults.embedding_model),
            summary_model: text("OLLAMA_MODEL_RESUMO", defaults.summary_model),
            whisper_model_path: text("WHISPER_MODEL_PATH", defaults.whisper_model_path),
            transcription_language: text("TRANSCRIPTION_LANGUAGE", defaults.transcription_language),
            log_level: text("LOG_LEVEL", defaults.log_level).to_lowercase(),
            log_dir: text("LOG_DIR", defaults.log_dir),
        })
    }

    /// The credential is a startup precondition: a missing key aborts startup.
    pub fn require_server_key(&self) -> Result<&str, ConfigError> {
        self.server_key.as_deref().ok_or(ConfigError::MissingServerKey)
    }

    pub fn poll_url(&self) -> String {
        format!("{}{}", self.api_url, self.poll_path)
    }

    pub fn submit_url(&self) -> String {
        format!("{}{}", self.api_url, self.submit_path)
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval_seconds)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_seconds)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit_timeout_seconds)
    }

    pub fn max_audio_size_bytes(&self) -> u64 {
        self.max_audio_size_mb.saturating_mul(MB)
    }

    pub fn max_image_size_bytes(&self) -> u64 {
        self.max_image_size_mb.saturating_mul(MB)
    }

    pub fn max_document_size_bytes(&self) -> u64 {
        self.max_document_size_mb.saturating_mul(MB)
    }
}

fn parse_number<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(value) => value.parse::<T>().map_err(|e| ConfigError::InvalidValue {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}

/// Size ceilings are stored in MB but enforced in bytes; reject values that overflow.
fn parse_megabytes<F>(lookup: &F, key: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let megabytes = parse_number(lookup, key, default)?;
    match megabytes.checked_mul(MB) {
        Some(_) => Ok(megabytes),
        None => Err(ConfigError::InvalidValue {
            key,
            value: megabytes.to_string(),
            reason: "size in bytes overflows u64".to_string(),
        }),
    }
}

fn parse_url(key: &'static str, value: String) -> Result<String, ConfigError> {
    if !(value.starts_with("http://") || value.starts_with("https://")) {
        return Err(ConfigError::InvalidValue {
            key,
            value,
            reason: "expected an http:// or https:// url".to_string(),
        });
    }
    Ok(value.trim_end_matches('/').to_string())
}

fn normalize_path(path: String) -> String {
    if path.starts_with('/') {
        path
    } else {
        format!("/{}", path)
    }
}
