//! Whisper transcription backend.
//!
//! Uses whisper.cpp via whisper-rs for speech-to-text.

use std::path::Path;

use tracing::{debug, info};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, WhisperState};

use super::{
    BackendError, BackendFactory, InferenceParams, Segment, SegmentStream, SpeechBackend,
    TranscriptionInfo,
};
use crate::audio::{self, TARGET_SAMPLE_RATE};
use crate::backend::{self, BackendConfig, Device};
use crate::media;
use crate::models::{ModelManager, ModelSize};

/// Probability a decoded window is non-speech before VAD filtering drops it.
const NO_SPEECH_THRESHOLD: f32 = 0.6;

/// Whisper speech-to-text backend.
///
/// The underlying WhisperContext is leaked intentionally - the model stays
/// loaded for the process lifetime. This avoids self-referential struct
/// patterns while allowing the state to be reused across transcriptions.
pub struct WhisperBackend {
    state: WhisperState,
    threads: i32,
}

impl WhisperBackend {
    /// Load a GGML weight file against a backend configuration.
    pub fn new(model_path: &Path, config: &BackendConfig) -> Result<Self, BackendError> {
        info!(
            path = %model_path.display(),
            config = %config,
            "loading whisper model"
        );

        let mut ctx_params = WhisperContextParameters::default();
        ctx_params.use_gpu(config.device == Device::Gpu);

        let path_str = model_path
            .to_str()
            .ok_or_else(|| BackendError::ModelLoad("invalid model path".to_string()))?;

        let ctx = WhisperContext::new_with_params(path_str, ctx_params)
            .map_err(|e| BackendError::ModelLoad(e.to_string()))?;

        // Box and leak the context to get a 'static reference.
        let ctx_ref: &'static WhisperContext = Box::leak(Box::new(ctx));

        let state = ctx_ref
            .create_state()
            .map_err(|e| BackendError::ModelLoad(format!("failed to create state: {e}")))?;

        let threads = config
            .threads
            .unwrap_or_else(backend::default_thread_count) as i32;

        info!("whisper model and state loaded");
        Ok(Self { state, threads })
    }

    /// Load an input file as canonical mono 16 kHz samples.
    ///
    /// WAV files are read directly; anything else goes through the media
    /// conversion tool and is rejected when that fails.
    fn load_samples(path: &Path) -> Result<Vec<f32>, BackendError> {
        let unreadable = |detail: String| BackendError::UnreadableInput {
            path: path.display().to_string(),
            detail,
        };

        let is_wav = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("wav"));

        if is_wav {
            let buffer = audio::read_wav(path).map_err(|e| unreadable(e.to_string()))?;
            return Ok(media::resample_linear(
                &buffer.samples,
                buffer.sample_rate,
                TARGET_SAMPLE_RATE,
            ));
        }

        // Decode through ffmpeg into a short-lived temp WAV
        let decoded = tempfile::Builder::new()
            .prefix("decode.")
            .suffix(".wav")
            .tempfile()
            .map_err(|e| unreadable(e.to_string()))?
            .into_temp_path();

        media::ffmpeg_to_wav(path, &decoded).map_err(|e| unreadable(e.to_string()))?;
        let buffer = audio::read_wav(&decoded).map_err(|e| unreadable(e.to_string()))?;
        Ok(buffer.samples)
    }
}

impl SpeechBackend for WhisperBackend {
    fn transcribe(
        &mut self,
        path: &Path,
        params: &InferenceParams,
    ) -> Result<(SegmentStream, TranscriptionInfo), BackendError> {
        let samples = Self::load_samples(path)?;
        let duration = samples.len() as f32 / TARGET_SAMPLE_RATE as f32;

        debug!(
            samples = samples.len(),
            duration_secs = duration,
            "transcribing audio with whisper"
        );

        let language = params.language.clone();
        let mut full = FullParams::new(SamplingStrategy::BeamSearch {
            beam_size: params.beam_size as i32,
            patience: -1.0,
        });

        if let Some(ref lang) = language {
            full.set_language(Some(lang));
        }
        full.set_n_threads(self.threads);
        full.set_translate(false);

        // Keep whisper.cpp off stdout
        full.set_print_special(false);
        full.set_print_progress(false);
        full.set_print_realtime(false);
        full.set_print_timestamps(false);

        // Each segment is decoded without the previous transcript as prompt
        full.set_no_context(!params.condition_on_previous_text);

        if params.vad_filter {
            full.set_no_speech_thold(NO_SPEECH_THRESHOLD);
        }

        self.state
            .full(full, &samples)
            .map_err(|e| BackendError::Inference(e.to_string()))?;

        let mut segments = Vec::new();
        let mut prob_sum = 0.0f32;
        let mut prob_count = 0usize;

        let num_segments = self.state.full_n_segments();
        for i in 0..num_segments {
            let Some(segment) = self.state.get_segment(i) else {
                continue;
            };
            let Ok(text) = segment.to_str_lossy() else {
                continue;
            };

            for t in 0..segment.n_tokens() {
                if let Some(token) = segment.get_token(t) {
                    prob_sum += token.token_probability();
                    prob_count += 1;
                }
            }

            // Timestamps are in centiseconds (10ms units)
            segments.push(Segment {
                start: segment.start_timestamp() as f32 / 100.0,
                end: segment.end_timestamp() as f32 / 100.0,
                text: text.trim().to_string(),
            });
        }

        let (language, language_probability) = match language {
            Some(lang) => (lang, 1.0),
            None => {
                let detected = whisper_rs::get_lang_str(self.state.full_lang_id_from_state())
                    .unwrap_or("und")
                    .to_string();
                let confidence = if prob_count > 0 {
                    (prob_sum / prob_count as f32).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                (detected, confidence)
            }
        };

        debug!(
            segments = segments.len(),
            language = %language,
            "whisper transcription complete"
        );

        Ok((
            SegmentStream::new(segments),
            TranscriptionInfo {
                language,
                language_probability,
                duration,
            },
        ))
    }
}

/// Backend factory for the load ladder: acquires the weight file for the
/// candidate's precision, then instantiates whisper against it.
pub struct WhisperFactory {
    manager: ModelManager,
}

impl WhisperFactory {
    pub fn new(manager: ModelManager) -> Self {
        Self { manager }
    }
}

impl BackendFactory for WhisperFactory {
    fn instantiate(
        &self,
        size: ModelSize,
        config: &BackendConfig,
    ) -> Result<Box<dyn SpeechBackend>, BackendError> {
        let path = self
            .manager
            .ensure(size, config.precision)
            .map_err(|e| BackendError::ModelLoad(e.to_string()))?;
        Ok(Box::new(WhisperBackend::new(&path, config)?))
    }
}
