use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use crate::asr::{AsrEngine, AsrParams, AsrSegment, AsrTranscript};
use crate::utils::blocking::run_blocking;

pub struct WhisperAsr {
    whisper_ctx: Arc<WhisperContext>,
}

impl WhisperAsr {
    pub fn new(model_path: &str) -> Result<Self> {
        if !Path::new(model_path).exists() {
            anyhow::bail!("whisper model not found: {}", model_path);
        }

        info!(model = %model_path, "Loading whisper model");
        match WhisperContext::new_with_params(model_path, WhisperContextParameters::default()) {
            Ok(whisper_ctx) => Ok(Self { whisper_ctx: Arc::new(whisper_ctx) }),
            Err(e) => Err(anyhow::anyhow!("failed to open whisper model: {}", e)),
        }
    }

    fn build_params<'a, 'b>(ap: &AsrParams) -> FullParams<'a, 'b> {
        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });

        params.set_single_segment(ap.single_segment);
        params.set_temperature(0.0);
        params.set_n_threads(num_threads());
        params.set_translate(false);
        params.set_no_context(false);
        params.set_suppress_blank(true);
        params.set_suppress_non_speech_tokens(true);
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_duration_ms(0);

        params
    }
}

fn num_threads() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get().min(8) as i32)
        .unwrap_or(4)
}

/// Runs one full decoding pass. CPU bound; call from a blocking thread.
fn run_inference(ctx: &WhisperContext, audio: &[f32], user_params: &AsrParams) -> Result<AsrTranscript> {
    let mut state = ctx.create_state()?;
    let language = user_params.language.clone().unwrap_or_else(|| "pt".to_string());
    let mut params = WhisperAsr::build_params(user_params);
    params.set_language(Some(language.as_str()));

    state.full(params, audio)?;
    let num_segments = state.full_n_segments()?;

    let mut transcript = AsrTranscript::default();
    for i in 0..num_segments {
        let text = state.full_get_segment_text(i)?;
        transcript.full_text.push_str(&text);
        transcript.segments.push(AsrSegment {
            text,
            start: state.full_get_segment_t0(i)?,
            end: state.full_get_segment_t1(i)?,
        });
    }

    Ok(transcript)
}

#[async_trait::async_trait]
impl AsrEngine for WhisperAsr {
    async fn transcribe(&self, audio: Vec<f32>, user_params: AsrParams) -> Result<AsrTranscript> {
        let ctx = self.whisper_ctx.clone();
        run_blocking(move || run_inference(&ctx, &audio, &user_params)).await
    }
}
