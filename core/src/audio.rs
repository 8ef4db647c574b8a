//! Audio buffers, WAV file I/O, and microphone capture.
//!
//! Everything downstream of the normalizer consumes canonical audio:
//! mono f32 samples at 16 kHz.

use std::path::Path;
use std::sync::mpsc;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use thiserror::Error;
use tracing::warn;

/// Canonical sample rate consumed by the inference backend.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("failed to read WAV file {path}: {source}")]
    Read { path: String, source: hound::Error },
    #[error("failed to write WAV file {path}: {source}")]
    Write { path: String, source: hound::Error },
    #[error("unsupported WAV encoding in {path}: {detail}")]
    UnsupportedEncoding { path: String, detail: String },
    #[error("failed to create temporary audio file: {0}")]
    TempFile(#[from] std::io::Error),
    #[error("no input device available")]
    NoInputDevice,
    #[error("audio capture failed: {0}")]
    Capture(String),
}

/// Audio buffer containing mono f32 samples at a known sample rate.
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Create a new audio buffer.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Duration of the buffer in seconds.
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Convert multi-channel interleaved samples to mono by averaging all channels.
pub fn to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    let channels = channels as usize;
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Read a WAV file into a mono buffer at its native sample rate.
///
/// Multi-channel files are downmixed; 16-bit PCM and 32-bit float encodings
/// are accepted.
pub fn read_wav(path: &Path) -> Result<AudioBuffer, AudioError> {
    let mut reader = WavReader::open(path).map_err(|source| AudioError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0))
            .collect::<Result<_, _>>()
            .map_err(|source| AudioError::Read {
                path: path.display().to_string(),
                source,
            })?,
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|source| AudioError::Read {
                path: path.display().to_string(),
                source,
            })?,
        (format, bits) => {
            return Err(AudioError::UnsupportedEncoding {
                path: path.display().to_string(),
                detail: format!("{:?} with {} bits per sample", format, bits),
            });
        }
    };

    Ok(AudioBuffer::new(
        to_mono(&interleaved, spec.channels),
        spec.sample_rate,
    ))
}

/// Write mono f32 samples to a 16 kHz 16-bit PCM WAV file.
pub fn write_wav(path: &Path, samples: &[f32]) -> Result<(), AudioError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: TARGET_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let write_err = |source| AudioError::Write {
        path: path.display().to_string(),
        source,
    };

    let mut writer = WavWriter::create(path, spec).map_err(write_err)?;
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(value).map_err(write_err)?;
    }
    writer.finalize().map_err(write_err)?;
    Ok(())
}

/// Audio capture from the default input device.
pub struct AudioCapture {
    stream: cpal::Stream,
    receiver: mpsc::Receiver<Vec<f32>>,
    sample_rate: u32,
    channels: u16,
}

impl AudioCapture {
    /// Start capturing audio from the default input device.
    pub fn start() -> Result<Self, AudioError> {
        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(AudioError::NoInputDevice)?;

        let config = device
            .default_input_config()
            .map_err(|e| AudioError::Capture(format!("no default input config: {e}")))?;

        let sample_rate = config.sample_rate();
        let channels = config.channels();

        let (sender, receiver) = mpsc::channel();

        let err_fn = |err| warn!(error = %err, "audio stream error");

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &config.into(),
                move |data: &[f32], _| {
                    let _ = sender.send(data.to_vec());
                },
                err_fn,
                None,
            ),
            cpal::SampleFormat::I16 => device.build_input_stream(
                &config.into(),
                move |data: &[i16], _| {
                    let samples: Vec<f32> = data.iter().map(|&s| s as f32 / 32768.0).collect();
                    let _ = sender.send(samples);
                },
                err_fn,
                None,
            ),
            cpal::SampleFormat::U16 => device.build_input_stream(
                &config.into(),
                move |data: &[u16], _| {
                    let samples: Vec<f32> = data
                        .iter()
                        .map(|&s| (s as f32 - 32768.0) / 32768.0)
                        .collect();
                    let _ = sender.send(samples);
                },
                err_fn,
                None,
            ),
            format => {
                return Err(AudioError::Capture(format!(
                    "unsupported sample format: {format:?}"
                )));
            }
        }
        .map_err(|e| AudioError::Capture(format!("failed to build input stream: {e}")))?;

        stream
            .play()
            .map_err(|e| AudioError::Capture(format!("failed to start stream: {e}")))?;

        Ok(Self {
            stream,
            receiver,
            sample_rate,
            channels,
        })
    }

    /// Get the native sample rate of the input device.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Get the number of channels.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Try to receive available audio samples (non-blocking).
    /// Returns mono samples at the device's native sample rate.
    pub fn try_recv(&self) -> Option<Vec<f32>> {
        let mut all_samples = Vec::new();

        // Drain all available samples
        while let Ok(samples) = self.receiver.try_recv() {
            all_samples.extend(samples);
        }

        if all_samples.is_empty() {
            return None;
        }

        Some(to_mono(&all_samples, self.channels))
    }

    /// Stop the audio stream.
    pub fn stop(self) {
        use cpal::traits::StreamTrait;
        let _ = self.stream.pause();
        drop(self);
    }
}

#[cfg(test)]
#[path = "audio_test.rs"]
mod tests;
