use super::*;
use tempfile::TempDir;

#[test]
fn test_audio_buffer_creation() {
    let samples = vec![0.1, 0.2, 0.3, 0.4];
    let buffer = AudioBuffer::new(samples.clone(), 16000);

    assert_eq!(buffer.samples, samples);
    assert_eq!(buffer.sample_rate, 16000);
}

#[test]
fn test_audio_buffer_duration() {
    // 16000 samples at 16kHz = 1 second
    let samples = vec![0.0; 16000];
    let buffer = AudioBuffer::new(samples, 16000);

    assert!((buffer.duration_secs() - 1.0).abs() < f32::EPSILON);
}

#[test]
fn test_audio_buffer_duration_zero_rate() {
    let buffer = AudioBuffer::new(vec![0.0; 100], 0);
    assert!((buffer.duration_secs() - 0.0).abs() < f32::EPSILON);
}

#[test]
fn test_to_mono_passthrough() {
    let samples = vec![0.1, 0.2, 0.3];
    let mono = to_mono(&samples, 1);

    assert_eq!(mono, samples);
}

#[test]
fn test_to_mono_stereo() {
    // Stereo: L=0.2, R=0.4 -> Mono: 0.3
    let stereo = vec![0.2, 0.4, 0.6, 0.8];
    let mono = to_mono(&stereo, 2);

    assert_eq!(mono.len(), 2);
    assert!((mono[0] - 0.3).abs() < f32::EPSILON);
    assert!((mono[1] - 0.7).abs() < f32::EPSILON);
}

#[test]
fn test_to_mono_quad() {
    // 4 channels: average of 0.1, 0.2, 0.3, 0.4 = 0.25
    let quad = vec![0.1, 0.2, 0.3, 0.4];
    let mono = to_mono(&quad, 4);

    assert_eq!(mono.len(), 1);
    assert!((mono[0] - 0.25).abs() < f32::EPSILON);
}

#[test]
fn test_to_mono_empty() {
    let mono = to_mono(&[], 2);
    assert!(mono.is_empty());
}

#[test]
fn test_wav_roundtrip_preserves_sample_count() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("roundtrip.wav");

    let samples: Vec<f32> = (0..16000)
        .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 16000.0).sin())
        .collect();

    write_wav(&path, &samples).unwrap();
    let buffer = read_wav(&path).unwrap();

    assert_eq!(buffer.samples.len(), samples.len());
    assert_eq!(buffer.sample_rate, TARGET_SAMPLE_RATE);
}

#[test]
fn test_wav_roundtrip_approximates_values() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("values.wav");

    let samples = vec![0.0, 0.5, -0.5, 0.25];
    write_wav(&path, &samples).unwrap();
    let buffer = read_wav(&path).unwrap();

    for (written, read) in samples.iter().zip(&buffer.samples) {
        // 16-bit quantization error stays below 1/32767
        assert!((written - read).abs() < 1.0e-4);
    }
}

#[test]
fn test_write_wav_clamps_out_of_range() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("clamped.wav");

    write_wav(&path, &[2.0, -2.0]).unwrap();
    let buffer = read_wav(&path).unwrap();

    assert!(buffer.samples[0] <= 1.0);
    assert!(buffer.samples[1] >= -1.0);
}

#[test]
fn test_read_wav_missing_file() {
    let result = read_wav(std::path::Path::new("/nonexistent/missing.wav"));
    assert!(matches!(result, Err(AudioError::Read { .. })));
}

// Hardware tests - require an actual microphone
#[test]
#[ignore]
fn test_audio_capture_start_stop() {
    let capture = AudioCapture::start();
    assert!(
        capture.is_ok(),
        "Failed to start capture: {:?}",
        capture.err()
    );

    let capture = capture.unwrap();
    assert!(capture.sample_rate() > 0);
    assert!(capture.channels() > 0);

    capture.stop();
}

#[test]
#[ignore]
fn test_audio_capture_receives_samples() {
    let capture = AudioCapture::start().expect("Failed to start capture");

    // Wait a bit for samples to accumulate
    std::thread::sleep(std::time::Duration::from_millis(100));

    let samples = capture.try_recv();
    assert!(samples.is_some(), "No samples received");
    assert!(!samples.unwrap().is_empty(), "Received empty samples");

    capture.stop();
}
