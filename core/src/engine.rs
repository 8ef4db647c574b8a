//! Model loading ladder and transcription orchestration.
//!
//! The loader walks an ordered degradation ladder of backend configurations
//! until one instantiates, accumulating every failure along the way. The
//! resulting [`LoadedModel`] is fixed for the process lifetime and shared
//! behind [`Engine`], which serializes inference calls, normalizes inputs,
//! and guarantees cleanup of every temporary it creates.

use std::fmt;
use std::path::Path;
use std::sync::Mutex;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::backend::{
    self, AcceleratorProbe, BackendConfig, Device, GpuInfo, NvidiaSmiProbe, Precision,
};
use crate::config::Config;
use crate::media::{self, ArtifactOrigin, AudioArtifact, MediaKind};
use crate::models::{ModelManager, ModelSize};
use crate::record::RecordError;
use crate::transcribe::{
    BackendError, BackendFactory, InferenceParams, Segment, SpeechBackend, WhisperFactory,
};

/// One instantiated inference capability plus the configuration that
/// produced it. Fixed after a successful load; the configuration may differ
/// from what was requested, so callers read status instead of assuming.
pub struct LoadedModel {
    pub backend: Box<dyn SpeechBackend>,
    pub config: BackendConfig,
    pub size: ModelSize,
}

impl LoadedModel {
    pub fn new(backend: Box<dyn SpeechBackend>, config: BackendConfig, size: ModelSize) -> Self {
        Self {
            backend,
            config,
            size,
        }
    }
}

/// One failed rung of the load ladder.
#[derive(Debug)]
pub struct LoadFailure {
    pub config: BackendConfig,
    pub size: ModelSize,
    pub error: BackendError,
}

impl fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}: {}", self.size, self.config, self.error)
    }
}

/// No usable backend was found after exhausting every fallback tier.
/// Carries the full attempt history for diagnosis.
#[derive(Debug)]
pub struct ModelLoadError {
    pub requested: ModelSize,
    pub attempts: Vec<LoadFailure>,
}

impl fmt::Display for ModelLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no usable inference backend for model {} after {} attempts",
            self.requested,
            self.attempts.len()
        )?;
        for attempt in &self.attempts {
            write!(f, "\n  {attempt}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ModelLoadError {}

/// A successful load plus the failures that preceded it.
pub struct LoadReport {
    pub model: LoadedModel,
    pub failures: Vec<LoadFailure>,
}

impl fmt::Debug for LoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadReport")
            .field("config", &self.model.config)
            .field("size", &self.model.size)
            .field("failures", &self.failures)
            .finish()
    }
}

/// The full attempt ladder for a set of probe candidates: the preferred
/// candidate, the fixed secondary ladder for its device, then any remaining
/// candidates, deduplicated in order.
fn ladder(candidates: &[BackendConfig]) -> Vec<BackendConfig> {
    let mut tiers: Vec<BackendConfig> = Vec::new();
    let push = |tiers: &mut Vec<BackendConfig>, config: BackendConfig| {
        if !tiers
            .iter()
            .any(|t| t.device == config.device && t.precision == config.precision)
        {
            tiers.push(config);
        }
    };

    if let Some(first) = candidates.first() {
        push(&mut tiers, *first);
        for config in backend::fallback_ladder(first) {
            push(&mut tiers, config);
        }
    }
    for config in candidates.iter().skip(1) {
        push(&mut tiers, *config);
    }
    tiers
}

/// Walk the degradation ladder until a backend instantiates.
///
/// Every failed tier is accumulated, never discarded: a success reports the
/// failures that preceded it, and a total failure carries the complete
/// history. When every tier fails and the requested size is not the
/// smallest, the smallest model on (cpu, int8) is tried as a last resort.
pub fn load_model(
    requested: ModelSize,
    candidates: &[BackendConfig],
    threads: Option<usize>,
    factory: &dyn BackendFactory,
) -> Result<LoadReport, ModelLoadError> {
    let fill_threads = |mut config: BackendConfig| {
        if config.device == Device::Cpu && config.threads.is_none() {
            config.threads = Some(threads.unwrap_or_else(backend::default_thread_count));
        }
        config
    };

    let mut failures = Vec::new();

    for config in ladder(candidates).into_iter().map(fill_threads) {
        info!(model = %requested, config = %config, "attempting model load");
        match factory.instantiate(requested, &config) {
            Ok(backend) => {
                info!(model = %requested, config = %config, "model loaded");
                return Ok(LoadReport {
                    model: LoadedModel::new(backend, config, requested),
                    failures,
                });
            }
            Err(error) => {
                warn!(config = %config, error = %error, "load attempt failed");
                failures.push(LoadFailure {
                    config,
                    size: requested,
                    error,
                });
            }
        }
    }

    if requested != ModelSize::smallest() {
        let size = ModelSize::smallest();
        let config = fill_threads(BackendConfig::new(Device::Cpu, Precision::Int8));
        warn!(model = %size, "all tiers failed, falling back to the smallest model");
        match factory.instantiate(size, &config) {
            Ok(backend) => {
                info!(model = %size, config = %config, "model loaded");
                return Ok(LoadReport {
                    model: LoadedModel::new(backend, config, size),
                    failures,
                });
            }
            Err(error) => failures.push(LoadFailure {
                config,
                size,
                error,
            }),
        }
    }

    Err(ModelLoadError {
        requested,
        attempts: failures,
    })
}

#[derive(Debug, Error)]
pub enum EngineInitError {
    #[error(transparent)]
    Models(#[from] crate::models::ModelError),
    #[error(transparent)]
    Load(#[from] ModelLoadError),
}

#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("input file not found: {0}")]
    InputNotFound(String),
    #[error(transparent)]
    Extraction(#[from] media::ExtractionError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Audio(#[from] crate::audio::AudioError),
    #[error(transparent)]
    Record(#[from] RecordError),
}

/// Per-call parameter overrides, merged over the fixed default profile.
#[derive(Debug, Clone, Default)]
pub struct TranscribeOptions {
    pub language: Option<String>,
    pub beam_size: Option<usize>,
    pub vad_filter: Option<bool>,
    pub min_silence_ms: Option<u32>,
    pub condition_on_previous_text: Option<bool>,
}

impl TranscribeOptions {
    /// Overrides that only pin a language.
    pub fn language(code: impl Into<String>) -> Self {
        Self {
            language: Some(code.into()),
            ..Self::default()
        }
    }

    fn merge(&self, default_language: Option<&str>) -> InferenceParams {
        let defaults = InferenceParams::default();
        InferenceParams {
            beam_size: self.beam_size.unwrap_or(defaults.beam_size),
            language: self
                .language
                .clone()
                .or_else(|| default_language.map(str::to_string)),
            vad_filter: self.vad_filter.unwrap_or(defaults.vad_filter),
            min_silence_ms: self.min_silence_ms.unwrap_or(defaults.min_silence_ms),
            condition_on_previous_text: self
                .condition_on_previous_text
                .unwrap_or(defaults.condition_on_previous_text),
        }
    }
}

/// The aggregated result of one transcription call.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionResult {
    /// Segment texts joined by single spaces, in chronological order.
    /// Empty for silent audio, never absent.
    pub text: String,
    pub language_code: String,
    /// Always within [0, 1].
    pub language_confidence: f32,
    pub duration_seconds: f32,
    pub segment_count: usize,
}

/// Read-only snapshot of the loaded model, assembled on demand.
/// The GPU section is re-probed per call so memory counters are current.
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub model_size: ModelSize,
    pub device: Device,
    pub precision: Precision,
    pub threads: Option<usize>,
    pub language_default: Option<String>,
    pub gpu: Option<GpuInfo>,
}

/// Process-wide transcription engine.
///
/// Owns the single loaded model. The backend requires exclusive access per
/// invocation, so calls serialize on an internal gate; everything outside
/// the gate (configuration, size) is immutable after construction and safe
/// to read concurrently.
pub struct Engine {
    backend: Mutex<Box<dyn SpeechBackend>>,
    config: BackendConfig,
    size: ModelSize,
    probe: Box<dyn AcceleratorProbe>,
    default_language: Option<String>,
}

impl Engine {
    /// Select a backend, walk the load ladder, and wrap the result.
    pub fn new(config: &Config) -> Result<Self, EngineInitError> {
        let factory = WhisperFactory::new(ModelManager::new()?);
        Self::with_factory(config, Box::new(NvidiaSmiProbe), &factory)
    }

    /// Like [`Engine::new`] with an injected probe and factory.
    pub fn with_factory(
        config: &Config,
        probe: Box<dyn AcceleratorProbe>,
        factory: &dyn BackendFactory,
    ) -> Result<Self, EngineInitError> {
        let candidates = backend::candidates(
            config.model.size,
            config.model.prefer_gpu,
            probe.as_ref(),
        );
        let report = load_model(
            config.model.size,
            &candidates,
            config.model.threads,
            factory,
        )?;

        if report.model.size != config.model.size {
            warn!(
                requested = %config.model.size,
                loaded = %report.model.size,
                "loaded a smaller model than requested"
            );
        }

        Ok(Self::with_model(
            report.model,
            probe,
            config.model.language.clone(),
        ))
    }

    /// Wrap an already-loaded model. This is the seam tests use to inject
    /// stub backends without touching weights or hardware.
    pub fn with_model(
        model: LoadedModel,
        probe: Box<dyn AcceleratorProbe>,
        default_language: Option<String>,
    ) -> Self {
        let LoadedModel {
            backend,
            config,
            size,
        } = model;
        Self {
            backend: Mutex::new(backend),
            config,
            size,
            probe,
            default_language,
        }
    }

    /// The size actually loaded, which may differ from the request.
    pub fn model_size(&self) -> ModelSize {
        self.size
    }

    /// Transcribe an audio or video file.
    ///
    /// Video inputs go through audio extraction; the extracted temporary is
    /// owned by this call and reclaimed on every return path. Inputs with an
    /// unrecognized extension are handed to the backend unmodified, which is
    /// free to reject them.
    pub fn transcribe(
        &self,
        input: &Path,
        options: &TranscribeOptions,
    ) -> Result<TranscriptionResult, TranscriptionError> {
        if !input.exists() {
            return Err(TranscriptionError::InputNotFound(
                input.display().to_string(),
            ));
        }

        let artifact = match media::classify(input) {
            MediaKind::Video => media::extract_audio(input)?,
            MediaKind::Audio | MediaKind::Unsupported => AudioArtifact::user_upload(input),
        };

        self.run_inference(artifact.path(), options)
        // `artifact` drops here: extraction temporaries are reclaimed on
        // success and error alike, user files are left untouched
    }

    /// Transcribe a raw waveform: normalize to canonical form, persist to a
    /// temporary owned by this call, and run the same orchestration path.
    pub fn transcribe_buffer(
        &self,
        samples: &[f32],
        channels: u16,
        source_rate: u32,
        options: &TranscribeOptions,
    ) -> Result<TranscriptionResult, TranscriptionError> {
        let canonical = media::normalize(samples, channels, source_rate);
        let artifact = media::persist_buffer(&canonical, ArtifactOrigin::NormalizedBuffer)?;
        self.run_inference(artifact.path(), options)
    }

    fn run_inference(
        &self,
        path: &Path,
        options: &TranscribeOptions,
    ) -> Result<TranscriptionResult, TranscriptionError> {
        let params = options.merge(self.default_language.as_deref());
        info!(path = %path.display(), "starting transcription");

        let (stream, info) = {
            let mut backend = self
                .backend
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            backend.transcribe(path, &params)?
        };

        // The stream is single-pass: materialize once, then derive both the
        // joined text and the count from the same vector
        let segments: Vec<Segment> = stream.collect();
        let text = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        let result = TranscriptionResult {
            text,
            language_code: info.language,
            language_confidence: info.language_probability.clamp(0.0, 1.0),
            duration_seconds: info.duration,
            segment_count: segments.len(),
        };

        info!(
            language = %result.language_code,
            segments = result.segment_count,
            duration_seconds = result.duration_seconds,
            "transcription complete"
        );
        Ok(result)
    }

    /// Current model status. Recomputed per call, never cached.
    pub fn status(&self) -> ModelStatus {
        ModelStatus {
            model_size: self.size,
            device: self.config.device,
            precision: self.config.precision,
            threads: self.config.threads,
            language_default: self.default_language.clone(),
            gpu: self.probe.probe(),
        }
    }

    /// Names of all loadable model sizes.
    pub fn available_models(&self) -> Vec<&'static str> {
        ModelSize::ALL.iter().map(|s| s.as_str()).collect()
    }
}

#[cfg(test)]
#[path = "engine_test.rs"]
mod tests;
