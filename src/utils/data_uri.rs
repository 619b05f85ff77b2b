//! Data-URI / base64 payload decoding shared by the media capabilities.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataUriError {
    #[error("malformed data uri: {0}")]
    Malformed(String),

    #[error("invalid base64 payload: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("file too large: {size_mb:.2}MB (max {max_mb:.2}MB)")]
    TooLarge { size_mb: f64, max_mb: f64 },

    #[error("unsupported mime type: {mime} (allowed: {allowed})")]
    UnsupportedMime { mime: String, allowed: String },
}

/// Decoded binary payload together with its declared mime type.
#[derive(Debug, Clone)]
pub struct MediaPayload {
    pub mime_type: String,
    /// Base64 text as received, without the `data:` header.
    pub encoded: String,
    pub bytes: Vec<u8>,
}

impl MediaPayload {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

pub fn is_data_uri(content: &str) -> bool {
    content.starts_with("data:")
}

/// Split `data:<mime>;base64,<payload>` into its mime type and payload.
pub fn split(content: &str) -> Result<(&str, &str), DataUriError> {
    let rest = content
        .strip_prefix("data:")
        .ok_or_else(|| DataUriError::Malformed("missing data: prefix".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| DataUriError::Malformed("missing ',' separator".to_string()))?;
    let mime = header.split(';').next().unwrap_or_default().trim();
    Ok((mime, payload.trim()))
}

/// Decode a data URI, or raw base64 which is assumed to be `default_mime`.
pub fn decode(content: &str, default_mime: &str) -> Result<MediaPayload, DataUriError> {
    let (mime_type, encoded) = if is_data_uri(content) {
        let (mime, payload) = split(content)?;
        let mime = if mime.is_empty() { default_mime } else { mime };
        (mime.to_lowercase(), payload)
    } else {
        (default_mime.to_string(), content.trim())
    };

    let bytes = STANDARD.decode(encoded)?;

    Ok(MediaPayload {
        mime_type,
        encoded: encoded.to_string(),
        bytes,
    })
}

pub fn ensure_size(size: u64, max_bytes: u64) -> Result<(), DataUriError> {
    if size > max_bytes {
        return Err(DataUriError::TooLarge {
            size_mb: size as f64 / (1024.0 * 1024.0),
            max_mb: max_bytes as f64 / (1024.0 * 1024.0),
        });
    }
    Ok(())
}

pub fn ensure_mime(mime: &str, allowed: &[&str]) -> Result<(), DataUriError> {
    if !allowed.contains(&mime) {
        return Err(DataUriError::UnsupportedMime {
            mime: mime.to_string(),
            allowed: allowed.join(", "),
        });
    }
    Ok(())
}

pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}
