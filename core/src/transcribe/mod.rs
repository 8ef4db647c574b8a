//! Speech-to-text inference capability.
//!
//! This module provides the trait seam the orchestrator drives: backends
//! turn an audio file into a stream of timestamped segments plus aggregate
//! information about the recording. The whisper.cpp implementation lives in
//! [`whisper`]; tests substitute stubs.

use std::path::Path;

use thiserror::Error;

use crate::backend::BackendConfig;
use crate::models::ModelSize;

mod whisper;

pub use whisper::{WhisperBackend, WhisperFactory};

/// Beam width used unless a caller overrides it.
pub const DEFAULT_BEAM_SIZE: usize = 5;

/// Minimum silence gap treated as a segment boundary by VAD filtering.
pub const DEFAULT_MIN_SILENCE_MS: u32 = 500;

/// The inference parameter profile for one transcription call.
///
/// The defaults are fixed service policy: VAD filtering on with a 500 ms
/// minimum-silence threshold, and no conditioning on previously decoded
/// text - each segment stands alone, trading cross-segment coherence for
/// robustness against repetition loops. Backends map the VAD settings onto
/// whatever filtering their engine supports.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceParams {
    pub beam_size: usize,
    /// Language code to pin, or `None` for automatic detection.
    pub language: Option<String>,
    pub vad_filter: bool,
    pub min_silence_ms: u32,
    pub condition_on_previous_text: bool,
}

impl Default for InferenceParams {
    fn default() -> Self {
        Self {
            beam_size: DEFAULT_BEAM_SIZE,
            language: None,
            vad_filter: true,
            min_silence_ms: DEFAULT_MIN_SILENCE_MS,
            condition_on_previous_text: false,
        }
    }
}

/// A time-bounded span of transcribed text, in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub start: f32,
    pub end: f32,
    pub text: String,
}

/// Aggregate information about one transcription run.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionInfo {
    /// Detected (or pinned) language code.
    pub language: String,
    /// Confidence in the language/transcription, in [0, 1].
    pub language_probability: f32,
    /// Audio duration in seconds.
    pub duration: f32,
}

/// Single-pass stream of segments in chronological order.
///
/// The stream is consumable exactly once; callers that need both the joined
/// text and a count must materialize it into a `Vec` first rather than
/// iterating twice.
pub struct SegmentStream {
    inner: std::vec::IntoIter<Segment>,
}

impl SegmentStream {
    pub fn new(segments: Vec<Segment>) -> Self {
        Self {
            inner: segments.into_iter(),
        }
    }
}

impl Iterator for SegmentStream {
    type Item = Segment;

    fn next(&mut self) -> Option<Segment> {
        self.inner.next()
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to load model: {0}")]
    ModelLoad(String),
    #[error("unreadable audio input {path}: {detail}")]
    UnreadableInput { path: String, detail: String },
    #[error("inference failed: {0}")]
    Inference(String),
}

/// Speech-to-text backend.
///
/// Implementations take a path to an audio file and produce the segment
/// stream plus aggregate info. Invocation requires exclusive access; the
/// orchestrator serializes calls around the single loaded model.
pub trait SpeechBackend: Send {
    fn transcribe(
        &mut self,
        path: &Path,
        params: &InferenceParams,
    ) -> Result<(SegmentStream, TranscriptionInfo), BackendError>;
}

/// Instantiates a backend for one (size, config) candidate.
///
/// The load ladder drives this once per tier; scripted implementations let
/// tests exercise the ladder without touching real weights or hardware.
pub trait BackendFactory {
    fn instantiate(
        &self,
        size: ModelSize,
        config: &BackendConfig,
    ) -> Result<Box<dyn SpeechBackend>, BackendError>;
}
