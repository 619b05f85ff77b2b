//! One-time registration of this worker with the workflow API.
//!
//! Registration hands back the server key the worker later presents on
//! every poll; it is written into the env file so `run` picks it up.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

const REGISTER_TIMEOUT: Duration = Duration::from_secs(30);
const SERVER_KEY_VAR: &str = "SERVER_KEY";

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("registration request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("registration rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("registration response did not contain a server key")]
    MissingServerKey,

    #[error("failed to update {path}: {source}")]
    EnvFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest<'a> {
    slug: &'a str,
    server_name: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct RegisterResponse {
    #[serde(default)]
    server: Option<ServerRecord>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerRecord {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    server_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredServer {
    pub id: Option<String>,
    pub server_key: String,
    pub message: Option<String>,
}

pub async fn register_server(
    api_url: &str,
    slug: &str,
    server_name: &str,
) -> Result<RegisteredServer, RegistrationError> {
    let url = format!("{}/workflow/register", api_url.trim_end_matches('/'));
    info!(%url, %slug, %server_name, "Registering server");

    let response = reqwest::Client::new()
        .post(&url)
        .timeout(REGISTER_TIMEOUT)
        .json(&RegisterRequest { slug, server_name })
        .send()
        .await?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        let body = response.text().await.unwrap_or_default();
        return Err(RegistrationError::Rejected { status: status.as_u16(), body });
    }

    let body: RegisterResponse = response.json().await?;
    let server = body.server.unwrap_or_default();
    let server_key = server
        .server_key
        .filter(|key| !key.trim().is_empty())
        .ok_or(RegistrationError::MissingServerKey)?;

    let id = server.id.map(|id| match id {
        Value::String(s) => s,
        other => other.to_string(),
    });

    info!(server_id = id.as_deref().unwrap_or("-"), "Server registered");

    Ok(RegisteredServer {
        id,
        server_key,
        message: body.message,
    })
}

/// Replace the `SERVER_KEY=` line in `env_file`, or append one. Creates the file if absent.
pub fn persist_server_key(env_file: &Path, server_key: &str) -> Result<(), RegistrationError> {
    let env_error = |source: io::Error| RegistrationError::EnvFile {
        path: env_file.to_path_buf(),
        source,
    };

    let existing = match fs::read_to_string(env_file) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(env_error(e)),
    };

    let entry = format!("{}={}", SERVER_KEY_VAR, server_key);
    let prefix = format!("{}=", SERVER_KEY_VAR);
    let mut replaced = false;
    let mut lines: Vec<String> = existing
        .lines()
        .map(|line| {
            if line.trim_start().starts_with(&prefix) {
                replaced = true;
                entry.clone()
            } else {
                line.to_string()
            }
        })
        .collect();

    if !replaced {
        lines.push(entry);
    }

    let mut contents = lines.join("\n");
    contents.push('\n');
    fs::write(env_file, contents).map_err(env_error)?;

    info!(path = %env_file.display(), "Server key saved");
    Ok(())
}
