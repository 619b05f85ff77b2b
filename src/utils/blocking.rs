use anyhow::Result;

/// Run CPU-bound work (decoding, inference, extraction) off the async executor.
pub async fn run_blocking<T, F>(job: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job).await?
}
