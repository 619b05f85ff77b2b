use rubato::{SincFixedIn, SincInterpolationParameters, WindowFunction, Resampler};
use hound::{SampleFormat, WavReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use rayon::prelude::*;
use std::fs;
use anyhow::{Context, Result};
use tracing::{debug, info, warn};

/// Sample rate the speech engine expects.
pub const TARGET_SAMPLE_RATE: u32 = 16000;

/// Decode an audio file into normalized 16 kHz mono samples.
///
/// Non-WAV input is converted with ffmpeg first; the intermediate file is
/// removed once read.
pub fn parse_audio_file(path: &Path) -> Result<Vec<f32>> {
    let wav_path = ensure_wav_format(path)?;
    let read = read_wav_file(&wav_path);

    if wav_path != path {
        if let Err(e) = fs::remove_file(&wav_path) {
            warn!("Failed to remove temporary WAV file: {}", e);
        } else {
            debug!("Removed temporary WAV file: {:?}", wav_path);
        }
    }

    let (samples, num_channels, sample_rate) = read?;
    if samples.is_empty() {
        anyhow::bail!("audio file contains no samples");
    }

    let mono_samples = convert_to_mono(&samples, num_channels);
    let normalized_samples = normalize_audio(&mono_samples);

    if sample_rate != TARGET_SAMPLE_RATE {
        resample_audio(&normalized_samples, sample_rate)
    } else {
        Ok(normalized_samples)
    }
}

/// Whether an `ffmpeg` binary can be executed.
pub fn ffmpeg_available() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

fn ensure_wav_format(path: &Path) -> Result<PathBuf> {
    let is_wav = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("wav"))
        .unwrap_or(false);
    if is_wav {
        return Ok(path.to_path_buf());
    }

    let output_path = path.with_extension("wav");
    info!("Converting {:?} to WAV", path);

    let output = Command::new("ffmpeg")
        .arg("-y")
        .arg("-i")
        .arg(path)
        .arg("-acodec")
        .arg("pcm_s16le")
        .arg("-ac")
        .arg("1")
        .arg("-ar")
        .arg(TARGET_SAMPLE_RATE.to_string())
        .arg(&output_path)
        .output()
        .context("failed to execute ffmpeg")?;

    if !output.status.success() {
        anyhow::bail!(
            "ffmpeg conversion failed with status {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(output_path)
}

fn read_wav_file(path: &Path) -> Result<(Vec<f32>, usize, u32)> {
    let mut reader = WavReader::open(path)
        .map_err(|e| anyhow::anyhow!("Failed to read WAV file: {}", e))?;

    let spec = reader.spec();
    let num_channels = spec.channels.max(1) as usize;
    debug!(sample_rate = spec.sample_rate, channels = num_channels, bits = spec.bits_per_sample, "WAV header");

    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|val| val as f32 / i16::MAX as f32))
            .collect::<std::result::Result<Vec<f32>, _>>()?,
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()?,
        (format, bits) => anyhow::bail!("Unsupported WAV encoding: {:?} {} bits", format, bits),
    };

    Ok((samples, num_channels, spec.sample_rate))
}

fn convert_to_mono(samples: &[f32], num_channels: usize) -> Vec<f32> {
    if num_channels == 1 {
        return samples.to_vec();
    }
    samples.par_chunks(num_channels)
        .map(|chunk| chunk.iter().sum::<f32>() / chunk.len() as f32)
        .collect()
}

/// Scale into [-1, 1]. Silence is left untouched.
fn normalize_audio(samples: &[f32]) -> Vec<f32> {
    let max_abs = samples.par_iter().map(|&s| s.abs()).reduce(|| 0.0, f32::max);
    if max_abs == 0.0 {
        return samples.to_vec();
    }
    samples.par_iter().map(|&s| s / max_abs).collect()
}

fn resample_audio(samples: &[f32], original_sample_rate: u32) -> Result<Vec<f32>> {
    debug!("Resampling from {} Hz to {} Hz", original_sample_rate, TARGET_SAMPLE_RATE);

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: rubato::SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(
        TARGET_SAMPLE_RATE as f64 / original_sample_rate as f64,
        2.0,
        params,
        samples.len(),
        1,
    )
    .context("failed to create resampler")?;

    let mut resampled = resampler
        .process(&[samples.to_vec()], None)
        .context("resampling failed")?;

    Ok(resampled.pop().unwrap_or_default())
}
