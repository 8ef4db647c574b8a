use super::*;

use std::cell::RefCell;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};

use tempfile::TempDir;

use crate::transcribe::{SegmentStream, TranscriptionInfo};

struct NoGpu;

impl AcceleratorProbe for NoGpu {
    fn probe(&self) -> Option<GpuInfo> {
        None
    }
}

/// Backend stub that replays canned segments and records the paths it saw.
struct StubBackend {
    segments: Vec<Segment>,
    info: TranscriptionInfo,
    seen_paths: Arc<StdMutex<Vec<PathBuf>>>,
}

impl StubBackend {
    fn hello_world() -> Self {
        Self {
            segments: vec![
                Segment {
                    start: 0.0,
                    end: 1.0,
                    text: "Hello".to_string(),
                },
                Segment {
                    start: 1.0,
                    end: 2.0,
                    text: "world".to_string(),
                },
            ],
            info: TranscriptionInfo {
                language: "en".to_string(),
                language_probability: 0.95,
                duration: 2.0,
            },
            seen_paths: Arc::new(StdMutex::new(Vec::new())),
        }
    }

    fn silent() -> Self {
        Self {
            segments: Vec::new(),
            info: TranscriptionInfo {
                language: "en".to_string(),
                language_probability: 0.0,
                duration: 0.0,
            },
            seen_paths: Arc::new(StdMutex::new(Vec::new())),
        }
    }

    fn with_confidence(mut self, confidence: f32) -> Self {
        self.info.language_probability = confidence;
        self
    }
}

impl SpeechBackend for StubBackend {
    fn transcribe(
        &mut self,
        path: &Path,
        _params: &InferenceParams,
    ) -> Result<(SegmentStream, TranscriptionInfo), BackendError> {
        self.seen_paths.lock().unwrap().push(path.to_path_buf());
        Ok((
            SegmentStream::new(self.segments.clone()),
            self.info.clone(),
        ))
    }
}

/// Factory whose first `fail_first` instantiations fail.
struct ScriptedFactory {
    fail_first: usize,
    calls: RefCell<Vec<(ModelSize, BackendConfig)>>,
}

impl ScriptedFactory {
    fn new(fail_first: usize) -> Self {
        Self {
            fail_first,
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl BackendFactory for ScriptedFactory {
    fn instantiate(
        &self,
        size: ModelSize,
        config: &BackendConfig,
    ) -> Result<Box<dyn SpeechBackend>, BackendError> {
        let mut calls = self.calls.borrow_mut();
        calls.push((size, *config));
        if calls.len() <= self.fail_first {
            Err(BackendError::ModelLoad(format!(
                "tier {} unavailable",
                calls.len()
            )))
        } else {
            Ok(Box::new(StubBackend::silent()))
        }
    }
}

fn gpu_candidates(size: ModelSize) -> Vec<BackendConfig> {
    vec![
        BackendConfig::new(Device::Gpu, Precision::Fp16),
        BackendConfig::new(Device::Cpu, backend::cpu_precision(size)),
    ]
}

fn stub_engine(backend: StubBackend) -> (Engine, Arc<StdMutex<Vec<PathBuf>>>) {
    let seen = backend.seen_paths.clone();
    let model = LoadedModel::new(
        Box::new(backend),
        BackendConfig::new(Device::Cpu, Precision::Int8),
        ModelSize::Tiny,
    );
    (Engine::with_model(model, Box::new(NoGpu), None), seen)
}

fn write_fixture_wav(dir: &TempDir, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    crate::audio::write_wav(&path, &[0.0; 1600]).unwrap();
    path
}

#[test]
fn test_ladder_first_tier_success() {
    let factory = ScriptedFactory::new(0);
    let report = load_model(
        ModelSize::Medium,
        &gpu_candidates(ModelSize::Medium),
        None,
        &factory,
    )
    .unwrap();

    assert_eq!(report.model.config.device, Device::Gpu);
    assert_eq!(report.model.config.precision, Precision::Fp16);
    assert_eq!(report.model.size, ModelSize::Medium);
    assert!(report.failures.is_empty());
}

#[test]
fn test_ladder_two_failures_then_third_tier() {
    let factory = ScriptedFactory::new(2);
    let report = load_model(
        ModelSize::Medium,
        &gpu_candidates(ModelSize::Medium),
        None,
        &factory,
    )
    .unwrap();

    // Tier 3 of the GPU ladder is (gpu, int8)
    assert_eq!(report.model.config.device, Device::Gpu);
    assert_eq!(report.model.config.precision, Precision::Int8);

    // Exactly two failure records accumulated, in ladder order
    assert_eq!(report.failures.len(), 2);
    assert_eq!(report.failures[0].config.precision, Precision::Fp16);
    assert_eq!(report.failures[1].config.precision, Precision::Int8Fp16);
}

#[test]
fn test_ladder_order_for_gpu_preference() {
    let factory = ScriptedFactory::new(usize::MAX);
    let _ = load_model(
        ModelSize::Medium,
        &gpu_candidates(ModelSize::Medium),
        None,
        &factory,
    );

    let calls = factory.calls.borrow();
    let tiers: Vec<(Device, Precision)> = calls
        .iter()
        .map(|(_, c)| (c.device, c.precision))
        .collect();

    assert_eq!(
        tiers,
        vec![
            (Device::Gpu, Precision::Fp16),
            (Device::Gpu, Precision::Int8Fp16),
            (Device::Gpu, Precision::Int8),
            (Device::Cpu, Precision::Int8),
            // Last resort: smallest model on cpu/int8
            (Device::Cpu, Precision::Int8),
        ]
    );
    assert_eq!(calls[4].0, ModelSize::Tiny);
}

#[test]
fn test_ladder_order_for_cpu_preference() {
    let factory = ScriptedFactory::new(usize::MAX);
    let candidates = vec![BackendConfig::new(Device::Cpu, Precision::Int8Fp16)];
    let _ = load_model(ModelSize::Small, &candidates, None, &factory);

    let calls = factory.calls.borrow();
    let small_tiers: Vec<Precision> = calls
        .iter()
        .filter(|(size, _)| *size == ModelSize::Small)
        .map(|(_, c)| c.precision)
        .collect();

    assert_eq!(small_tiers, vec![Precision::Int8Fp16, Precision::Int8]);
}

#[test]
fn test_last_resort_loads_smallest_model() {
    let factory = ScriptedFactory::new(2);
    let candidates = vec![BackendConfig::new(Device::Cpu, Precision::Int8)];
    let report = load_model(ModelSize::Medium, &candidates, None, &factory).unwrap();

    assert_eq!(report.model.size, ModelSize::Tiny);
    assert_eq!(report.model.config.device, Device::Cpu);
    assert_eq!(report.model.config.precision, Precision::Int8);
    assert_eq!(report.failures.len(), 2);
}

#[test]
fn test_no_last_resort_for_smallest_request() {
    let factory = ScriptedFactory::new(usize::MAX);
    let candidates = vec![BackendConfig::new(
        Device::Cpu,
        backend::cpu_precision(ModelSize::Tiny),
    )];
    let error = load_model(ModelSize::Tiny, &candidates, None, &factory).unwrap_err();

    // Tiny ladder is (int8_fp16, int8); no extra tiny retry follows
    assert_eq!(error.attempts.len(), 2);
    assert!(error.attempts.iter().all(|a| a.size == ModelSize::Tiny));
}

#[test]
fn test_exhausted_ladder_reports_full_history() {
    let factory = ScriptedFactory::new(usize::MAX);
    let error = load_model(
        ModelSize::Medium,
        &gpu_candidates(ModelSize::Medium),
        None,
        &factory,
    )
    .unwrap_err();

    assert_eq!(error.requested, ModelSize::Medium);
    // 4 ladder tiers plus the tiny last resort
    assert_eq!(error.attempts.len(), 5);
    for (i, attempt) in error.attempts.iter().enumerate() {
        assert!(attempt.error.to_string().contains(&format!("tier {}", i + 1)));
    }

    // The rendered error carries the whole history
    let message = error.to_string();
    assert!(message.contains("tier 1"));
    assert!(message.contains("tier 5"));
    assert!(message.contains("gpu/fp16"));
}

#[test]
fn test_cpu_threads_filled_in() {
    let factory = ScriptedFactory::new(0);
    let candidates = vec![BackendConfig::new(Device::Cpu, Precision::Int8)];
    let report = load_model(ModelSize::Medium, &candidates, None, &factory).unwrap();

    assert!(report.model.config.threads.is_some_and(|t| t >= 1));
}

#[test]
fn test_requested_cpu_threads_respected() {
    let factory = ScriptedFactory::new(0);
    let candidates = vec![BackendConfig::new(Device::Cpu, Precision::Int8)];
    let report = load_model(ModelSize::Medium, &candidates, Some(3), &factory).unwrap();

    assert_eq!(report.model.config.threads, Some(3));
}

#[test]
fn test_transcribe_joins_segments_with_spaces() {
    let temp = TempDir::new().unwrap();
    let input = write_fixture_wav(&temp, "speech.wav");
    let (engine, _) = stub_engine(StubBackend::hello_world());

    let result = engine
        .transcribe(&input, &TranscribeOptions::default())
        .unwrap();

    assert_eq!(result.text, "Hello world");
    assert_eq!(result.language_code, "en");
    assert!((result.language_confidence - 0.95).abs() < f32::EPSILON);
    assert!((result.duration_seconds - 2.0).abs() < f32::EPSILON);
    assert_eq!(result.segment_count, 2);
}

#[test]
fn test_transcribe_silent_audio_yields_empty_text() {
    let temp = TempDir::new().unwrap();
    let input = write_fixture_wav(&temp, "silence.wav");
    let (engine, _) = stub_engine(StubBackend::silent());

    let result = engine
        .transcribe(&input, &TranscribeOptions::default())
        .unwrap();

    assert_eq!(result.text, "");
    assert_eq!(result.segment_count, 0);
}

#[test]
fn test_transcribe_missing_input() {
    let (engine, _) = stub_engine(StubBackend::hello_world());

    let result = engine.transcribe(
        Path::new("/nonexistent/input.wav"),
        &TranscribeOptions::default(),
    );

    assert!(matches!(result, Err(TranscriptionError::InputNotFound(_))));
}

#[test]
fn test_confidence_clamped_to_unit_interval() {
    let temp = TempDir::new().unwrap();
    let input = write_fixture_wav(&temp, "loud.wav");
    let (engine, _) = stub_engine(StubBackend::hello_world().with_confidence(1.5));

    let result = engine
        .transcribe(&input, &TranscribeOptions::default())
        .unwrap();

    assert!((result.language_confidence - 1.0).abs() < f32::EPSILON);
}

#[test]
fn test_transcribe_buffer_cleans_up_its_temporary() {
    let (engine, seen) = stub_engine(StubBackend::hello_world());

    let samples = vec![0.25f32; 32000];
    let result = engine
        .transcribe_buffer(&samples, 1, 16000, &TranscribeOptions::default())
        .unwrap();
    assert_eq!(result.segment_count, 2);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(
        !seen[0].exists(),
        "normalized-buffer temporary survived the call: {}",
        seen[0].display()
    );
}

#[test]
fn test_transcribe_passes_unknown_extensions_through() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("mystery.dat");
    std::fs::write(&input, b"opaque").unwrap();

    let (engine, seen) = stub_engine(StubBackend::hello_world());
    engine
        .transcribe(&input, &TranscribeOptions::default())
        .unwrap();

    // The backend received the original path, unmodified
    assert_eq!(seen.lock().unwrap()[0], input);
    assert!(input.exists());
}

#[test]
fn test_options_merge_over_default_profile() {
    let options = TranscribeOptions {
        beam_size: Some(3),
        vad_filter: Some(false),
        ..TranscribeOptions::default()
    };

    let params = options.merge(Some("zh"));

    assert_eq!(params.beam_size, 3);
    assert!(!params.vad_filter);
    assert_eq!(params.language.as_deref(), Some("zh"));
    assert_eq!(params.min_silence_ms, 500);
    assert!(!params.condition_on_previous_text);
}

#[test]
fn test_explicit_language_beats_default() {
    let options = TranscribeOptions::language("fr");
    let params = options.merge(Some("en"));

    assert_eq!(params.language.as_deref(), Some("fr"));
}

#[test]
fn test_status_reflects_loaded_configuration() {
    let model = LoadedModel::new(
        Box::new(StubBackend::silent()),
        BackendConfig {
            device: Device::Cpu,
            precision: Precision::Int8Fp16,
            threads: Some(4),
        },
        ModelSize::Small,
    );
    let engine = Engine::with_model(model, Box::new(NoGpu), Some("en".to_string()));

    let status = engine.status();

    assert_eq!(status.model_size, ModelSize::Small);
    assert_eq!(status.device, Device::Cpu);
    assert_eq!(status.precision, Precision::Int8Fp16);
    assert_eq!(status.threads, Some(4));
    assert_eq!(status.language_default.as_deref(), Some("en"));
    assert!(status.gpu.is_none());
}

#[test]
fn test_available_models_lists_all_sizes() {
    let (engine, _) = stub_engine(StubBackend::silent());
    let models = engine.available_models();

    assert_eq!(models.len(), ModelSize::ALL.len());
    assert!(models.contains(&"tiny"));
    assert!(models.contains(&"large-v3"));
}
