//! Microphone capture sessions.
//!
//! Recording blocks the calling thread for the full requested duration,
//! then persists the canonical waveform to a temporary WAV owned by the
//! returned artifact.

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::info;

use crate::audio::{AudioCapture, AudioError, TARGET_SAMPLE_RATE};
use crate::engine::{Engine, TranscribeOptions, TranscriptionError, TranscriptionResult};
use crate::media::{self, ArtifactOrigin, AudioArtifact};

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("invalid recording duration: {0}s")]
    InvalidDuration(f32),
    #[error(transparent)]
    Audio(#[from] AudioError),
}

/// Number of samples an exact-duration capture holds at a given rate.
pub fn target_sample_count(duration_seconds: f32, sample_rate: u32) -> usize {
    (f64::from(duration_seconds) * f64::from(sample_rate)).round() as usize
}

/// Pad with silence or trim so the buffer holds exactly `target` samples.
pub fn fit_length(mut samples: Vec<f32>, target: usize) -> Vec<f32> {
    samples.resize(target, 0.0);
    samples
}

/// Record from the default input device for exactly the requested duration.
///
/// Blocks until capture completes, downmixes to mono, resamples to 16 kHz
/// (sample count equals `duration * 16000` to within one sample), and
/// persists to a temporary WAV. The returned artifact owns the file.
pub fn record(duration_seconds: f32) -> Result<AudioArtifact, RecordError> {
    if !duration_seconds.is_finite() || duration_seconds <= 0.0 {
        return Err(RecordError::InvalidDuration(duration_seconds));
    }

    let capture = AudioCapture::start()?;
    let device_rate = capture.sample_rate();
    info!(duration_seconds, device_rate, "recording from microphone");

    let deadline = Instant::now() + Duration::from_secs_f32(duration_seconds);
    let mut samples: Vec<f32> = Vec::new();

    while Instant::now() < deadline {
        if let Some(chunk) = capture.try_recv() {
            samples.extend(chunk);
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    // Pick up anything still queued by the device callback
    if let Some(chunk) = capture.try_recv() {
        samples.extend(chunk);
    }
    capture.stop();

    let canonical = media::resample_linear(&samples, device_rate, TARGET_SAMPLE_RATE);
    let fitted = fit_length(
        canonical,
        target_sample_count(duration_seconds, TARGET_SAMPLE_RATE),
    );

    let artifact = media::persist_buffer(&fitted, ArtifactOrigin::RecordedMicrophone)?;
    info!(
        path = %artifact.path().display(),
        samples = fitted.len(),
        "recording captured"
    );
    Ok(artifact)
}

/// Record for the requested duration and transcribe the capture.
///
/// The recorded temporary is owned by this call and deleted regardless of
/// the transcription outcome.
pub fn record_and_transcribe(
    engine: &Engine,
    duration_seconds: f32,
    options: &TranscribeOptions,
) -> Result<TranscriptionResult, TranscriptionError> {
    let artifact = record(duration_seconds)?;
    engine.transcribe(artifact.path(), options)
    // recording temp reclaimed when `artifact` drops, success or not
}

#[cfg(test)]
#[path = "record_test.rs"]
mod tests;
