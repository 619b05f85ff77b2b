use anyhow::Result;
use std::io::Write;
use tempfile::{Builder, NamedTempFile};
use tracing::debug;

/// Stage decoded bytes in a temp file with the given extension.
///
/// The file is removed when the returned handle is dropped.
pub fn stage_bytes(bytes: &[u8], extension: &str) -> Result<NamedTempFile> {
    let mut file = Builder::new()
        .prefix("workflow-")
        .suffix(&format!(".{}", extension))
        .tempfile()?;
    file.write_all(bytes)?;
    file.flush()?;
    debug!(path = %file.path().display(), size = bytes.len(), "Staged temp file");
    Ok(file)
}
