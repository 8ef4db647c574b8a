use super::*;
use tempfile::TempDir;

#[test]
fn test_default_config_values() {
    let config = Config::default();

    // Model defaults
    assert_eq!(config.model.size, ModelSize::Medium);
    assert!(config.model.prefer_gpu);
    assert_eq!(config.model.language, None);
    assert_eq!(config.model.threads, None);

    // Server defaults
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 5005);

    // Logging defaults
    assert_eq!(config.logging.level, LogLevel::Info);
}

#[test]
fn test_load_valid_config_from_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    let toml_content = r#"
[model]
size = "large-v3"
prefer_gpu = false
language = "en"
threads = 8

[server]
host = "127.0.0.1"
port = 8080

[logging]
level = "debug"
"#;

    std::fs::write(&config_path, toml_content).unwrap();

    let config = Config::load_from(&config_path).unwrap();

    assert_eq!(config.model.size, ModelSize::LargeV3);
    assert!(!config.model.prefer_gpu);
    assert_eq!(config.model.language.as_deref(), Some("en"));
    assert_eq!(config.model.threads, Some(8));
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.logging.level, LogLevel::Debug);
}

#[test]
fn test_missing_config_file_returns_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("nonexistent.toml");

    let config = Config::load_from(&config_path).unwrap();

    assert_eq!(config, Config::default());
}

#[test]
fn test_partial_config_fills_defaults() {
    let config = Config::parse(
        r#"
[model]
size = "small"
"#,
    )
    .unwrap();

    assert_eq!(config.model.size, ModelSize::Small);
    assert!(config.model.prefer_gpu);
    assert_eq!(config.server.port, 5005);
}

#[test]
fn test_invalid_toml_is_an_error() {
    let result = Config::parse("model = [not toml");
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

#[test]
fn test_save_and_reload_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("nested").join("config.toml");

    let mut config = Config::default();
    config.model.size = ModelSize::Tiny;
    config.model.language = Some("de".to_string());
    config.server.port = 9000;

    config.save_to(&config_path).unwrap();
    let reloaded = Config::load_from(&config_path).unwrap();

    assert_eq!(reloaded, config);
}

#[test]
fn test_log_level_directives() {
    assert_eq!(LogLevel::Info.as_directive(), "voxtext_core=info");
    assert_eq!(LogLevel::Trace.as_directive(), "voxtext_core=trace");
}
