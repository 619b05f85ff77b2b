#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use workflow_worker::audio;
use workflow_worker::cli::{Cli, Commands, RegisterArgs};
use workflow_worker::config::RuntimeConfig;
use workflow_worker::inference::InferenceClient;
use workflow_worker::registration;
use workflow_worker::schedule::processors::{
    DescribeProcessor, EmbeddingProcessor, PromptProcessor, SummarizeProcessor,
};
use workflow_worker::schedule::lifecycle::cancel_on_signal;
use workflow_worker::schedule::types::TaskAction;
use workflow_worker::schedule::{
    HttpTransport, ProcessorRegistry, TaskProcessor, WorkerLifecycle, WorkflowWorker,
};
use workflow_worker::utils::logger;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = RuntimeConfig::from_env().context("invalid configuration")?;
    let _guard = logger::init(config.log_dir.clone(), &config.log_level)?;

    info!(version = env!("CARGO_PKG_VERSION"), git = env!("GIT_HASH"), "workflow-worker");

    match cli.command() {
        Commands::Run => run(config).await,
        Commands::Register(args) => register(&config, args).await,
    }
}

async fn run(config: RuntimeConfig) -> Result<()> {
    let server_key = config.require_server_key()?.to_string();
    let config = Arc::new(config);

    if !audio::ffmpeg_available() {
        warn!("ffmpeg not found in PATH; only WAV audio can be transcribed");
    }

    let registry = build_registry(&config)?;
    let transport = Arc::new(HttpTransport::new(&config, server_key)?);

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(tokio::signal::ctrl_c(), shutdown.clone()));

    info!(
        api = %config.api_url,
        poll = %config.poll_url(),
        submit = %config.submit_url(),
        inference = %config.ollama_base_url,
        "Worker configured"
    );

    let worker = WorkflowWorker::new(
        transport,
        registry,
        WorkerLifecycle::child_of(&shutdown),
        &config,
    );
    let reason = worker.run().await;
    info!(?reason, "Exiting");
    Ok(())
}

fn build_registry(config: &Arc<RuntimeConfig>) -> Result<ProcessorRegistry> {
    let inference = InferenceClient::new(&config.ollama_base_url)?;
    let embedding: Arc<dyn TaskProcessor> =
        Arc::new(EmbeddingProcessor::new(config.clone(), inference.clone()));

    let mut registry = ProcessorRegistry::new()
        .with(TaskAction::Prompt, Arc::new(PromptProcessor::new(config.clone(), inference.clone())))
        .with(TaskAction::Describe, Arc::new(DescribeProcessor::new(config.clone(), inference.clone())))
        .with(TaskAction::Summarize, Arc::new(SummarizeProcessor::new(config.clone(), inference)))
        .with(TaskAction::Embedding, embedding.clone())
        .with(TaskAction::Knowledge, embedding);

    register_transcription(&mut registry, config);
    Ok(registry)
}

#[cfg(feature = "whisper")]
fn register_transcription(registry: &mut ProcessorRegistry, config: &Arc<RuntimeConfig>) {
    use workflow_worker::asr::whisper::WhisperAsr;
    use workflow_worker::schedule::processors::TranscribeProcessor;

    match WhisperAsr::new(&config.whisper_model_path) {
        Ok(engine) => registry.register(
            TaskAction::Transcribe,
            Arc::new(TranscribeProcessor::new(config.clone(), Arc::new(engine))),
        ),
        Err(e) => warn!("Transcription disabled: {:#}", e),
    }
}

#[cfg(not(feature = "whisper"))]
fn register_transcription(_registry: &mut ProcessorRegistry, _config: &Arc<RuntimeConfig>) {
    warn!("Transcription disabled: built without the `whisper` feature");
}

async fn register(config: &RuntimeConfig, args: RegisterArgs) -> Result<()> {
    let server = registration::register_server(&config.api_url, &config.slug, &config.server_name).await?;
    registration::persist_server_key(&args.env_file, &server.server_key)?;

    info!(
        server_id = server.id.as_deref().unwrap_or("-"),
        message = server.message.as_deref().unwrap_or(""),
        env_file = %args.env_file.display(),
        "Registration complete"
    );
    Ok(())
}
