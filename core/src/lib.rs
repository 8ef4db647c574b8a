//! Core transcription pipeline for voxtext.
//!
//! The pipeline turns heterogeneous media inputs (audio files, video files,
//! raw waveforms, microphone recordings) into canonical mono 16 kHz audio,
//! selects a working compute backend with graceful degradation, and
//! orchestrates the speech-to-text capability around it. The HTTP and
//! console surfaces live in sibling crates and call into [`engine::Engine`].

pub mod audio;
pub mod backend;
pub mod config;
pub mod dirs;
pub mod engine;
pub mod media;
pub mod models;
pub mod record;
pub mod transcribe;

/// Route whisper.cpp and GGML log output through `tracing`.
///
/// Call once at startup, before the first model load.
pub fn install_inference_logging() {
    whisper_rs::install_logging_hooks();
}
