//! Media classification and normalization.
//!
//! Classifies inputs by extension, extracts audio tracks from video
//! containers through ffmpeg, and resamples raw waveforms into the canonical
//! mono 16 kHz form. Temporary files created here are owned by the returned
//! [`AudioArtifact`], which reclaims them on drop, on success and failure paths
//! alike.

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempPath;
use thiserror::Error;
use tracing::{debug, info};

use crate::audio::{self, AudioError, TARGET_SAMPLE_RATE};

/// Video containers ffmpeg demuxes for us.
pub const VIDEO_EXTENSIONS: [&str; 7] = ["mp4", "avi", "mov", "mkv", "flv", "wmv", "webm"];

/// Audio formats handed to the inference backend directly.
pub const AUDIO_EXTENSIONS: [&str; 5] = ["wav", "mp3", "flac", "ogg", "m4a"];

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("ffmpeg is not installed or not on PATH")]
    ConverterMissing,
    #[error("failed to run ffmpeg: {0}")]
    Spawn(std::io::Error),
    #[error("ffmpeg exited with {code}: {detail}")]
    Converter { code: i32, detail: String },
    #[error("extraction produced an empty output for {0}")]
    EmptyOutput(String),
    #[error("failed to create extraction output file: {0}")]
    TempFile(std::io::Error),
}

/// Classification of an input path by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
    Unsupported,
}

/// How an artifact came to exist, which also determines who deletes it.
///
/// `UserUpload` artifacts point at caller-owned files and are never deleted
/// here; every other origin marks a temporary created by this pipeline,
/// reclaimed exactly once when the artifact drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactOrigin {
    UserUpload,
    ExtractedFromVideo,
    RecordedMicrophone,
    NormalizedBuffer,
}

/// An audio input plus the ownership of its backing storage.
///
/// Artifacts produced by this pipeline (extraction, recording, buffer
/// persistence) are always canonical mono 16 kHz WAV files.
#[derive(Debug)]
pub struct AudioArtifact {
    path: PathBuf,
    origin: ArtifactOrigin,
    // Owning guard for created temporaries; dropping it deletes the file.
    temp: Option<TempPath>,
}

impl AudioArtifact {
    /// Wrap a caller-owned file. The artifact never deletes it.
    pub fn user_upload(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            origin: ArtifactOrigin::UserUpload,
            temp: None,
        }
    }

    fn owned_temp(temp: TempPath, origin: ArtifactOrigin) -> Self {
        Self {
            path: temp.to_path_buf(),
            origin,
            temp: Some(temp),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn origin(&self) -> ArtifactOrigin {
        self.origin
    }

    /// Whether this artifact owns (and will delete) its backing file.
    pub fn is_temporary(&self) -> bool {
        self.temp.is_some()
    }
}

/// Classify a path as audio, video, or unsupported by its extension.
///
/// Unknown extensions are not an error: the caller passes them through to
/// the inference backend, which is free to reject them.
pub fn classify(path: &Path) -> MediaKind {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return MediaKind::Unsupported;
    };
    let ext = ext.to_ascii_lowercase();

    if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        MediaKind::Video
    } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
        MediaKind::Audio
    } else {
        MediaKind::Unsupported
    }
}

/// Check whether the ffmpeg binary is callable.
pub fn ffmpeg_available() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Demux and resample with ffmpeg: any supported input to mono 16 kHz WAV.
pub(crate) fn ffmpeg_to_wav(input: &Path, output: &Path) -> Result<(), ExtractionError> {
    let result = Command::new("ffmpeg")
        .arg("-i")
        .arg(input)
        .args(["-vn", "-ar", "16000", "-ac", "1", "-y"])
        .arg(output)
        .output()
        .map_err(ExtractionError::Spawn)?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        // ffmpeg banners are long; the failure reason is in the last lines
        let detail = stderr
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("")
            .to_string();
        return Err(ExtractionError::Converter {
            code: result.status.code().unwrap_or(-1),
            detail,
        });
    }

    Ok(())
}

/// Extract the audio track of a video file into a temporary mono 16 kHz WAV.
///
/// The output path combines the source filename stem with a random suffix so
/// concurrent requests never collide, even on identically named inputs.
/// The returned artifact owns the temporary and deletes it on drop.
pub fn extract_audio(video_path: &Path) -> Result<AudioArtifact, ExtractionError> {
    if !ffmpeg_available() {
        return Err(ExtractionError::ConverterMissing);
    }

    let stem = video_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("video");

    let output = tempfile::Builder::new()
        .prefix(&format!("{stem}_audio."))
        .suffix(".wav")
        .tempfile()
        .map_err(ExtractionError::TempFile)?
        .into_temp_path();

    info!(
        video = %video_path.display(),
        audio = %output.display(),
        "extracting audio from video"
    );

    ffmpeg_to_wav(video_path, &output)?;

    let size = std::fs::metadata(&output).map(|m| m.len()).unwrap_or(0);
    if size == 0 {
        return Err(ExtractionError::EmptyOutput(
            video_path.display().to_string(),
        ));
    }

    debug!(bytes = size, "audio extraction complete");
    Ok(AudioArtifact::owned_temp(
        output,
        ArtifactOrigin::ExtractedFromVideo,
    ))
}

/// Resample by linear interpolation over the time axis.
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let step = f64::from(from_rate) / f64::from(to_rate);
    let out_len = (samples.len() as f64 / step).round() as usize;
    let last = samples.len() - 1;

    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let pos = i as f64 * step;
        let idx = (pos as usize).min(last);
        let frac = (pos - idx as f64) as f32;
        let a = samples[idx];
        let b = samples[(idx + 1).min(last)];
        out.push(a + (b - a) * frac);
    }
    out
}

/// Normalize a raw waveform into canonical form: downmix to mono, resample
/// to 16 kHz, peak-normalize amplitude to [-1, 1].
///
/// An all-zero buffer passes through unchanged, and a buffer that is already
/// canonical comes back equal to its input.
pub fn normalize(samples: &[f32], channels: u16, source_rate: u32) -> Vec<f32> {
    let mono = audio::to_mono(samples, channels);
    let mut out = if source_rate == TARGET_SAMPLE_RATE {
        mono
    } else {
        resample_linear(&mono, source_rate, TARGET_SAMPLE_RATE)
    };

    let peak = out.iter().fold(0.0f32, |max, s| max.max(s.abs()));
    if peak > 0.0 {
        for sample in &mut out {
            *sample /= peak;
        }
    }
    out
}

/// Persist a canonical (mono 16 kHz) buffer to a temporary WAV file owned by
/// the returned artifact.
pub fn persist_buffer(
    samples: &[f32],
    origin: ArtifactOrigin,
) -> Result<AudioArtifact, AudioError> {
    let prefix = match origin {
        ArtifactOrigin::RecordedMicrophone => "recording.",
        _ => "buffer.",
    };

    let temp = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(".wav")
        .tempfile()?
        .into_temp_path();

    audio::write_wav(&temp, samples)?;
    debug!(path = %temp.display(), samples = samples.len(), "buffer persisted");
    Ok(AudioArtifact::owned_temp(temp, origin))
}

#[cfg(test)]
#[path = "media_test.rs"]
mod tests;
