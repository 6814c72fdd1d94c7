use std::time::Duration;

use genstream::config::{ClientConfig, StreamConfig};
use genstream::AppError;

const SAMPLE_TOML: &str = r#"
base_url = "https://posts.example.com/"
session_header = "X-Session"

[endpoints]
generate_path = "/v2/generate"
answers_path = "/v2/sessions/{session_id}/answers"

[stream]
idle_timeout_seconds = 45
connect_timeout_seconds = 5
max_frame_bytes = 4096
"#;

#[test]
fn parses_valid_config() {
    let config = ClientConfig::from_toml_str(SAMPLE_TOML).expect("config parses");

    assert_eq!(config.base_url, "https://posts.example.com");
    assert_eq!(config.session_header, "X-Session");
    assert_eq!(config.stream.idle_timeout(), Some(Duration::from_secs(45)));
    assert_eq!(config.stream.connect_timeout(), Duration::from_secs(5));
    assert_eq!(config.stream.max_frame_bytes, 4096);
    assert!(config.api_token.is_none(), "token is never read from the file");
}

#[test]
fn minimal_config_uses_defaults() {
    let config = ClientConfig::from_toml_str(r#"base_url = "http://localhost:8000""#)
        .expect("config parses");

    assert_eq!(config.session_header, "X-Post-ID");
    assert_eq!(config.stream, StreamConfig::default());
    assert_eq!(config.stream.idle_timeout(), Some(Duration::from_secs(180)));
    assert_eq!(
        config.generate_url(),
        "http://localhost:8000/api/v1/posts/generate/stream"
    );
    assert_eq!(
        config.answers_url("abc"),
        "http://localhost:8000/api/v1/posts/abc/answers/stream"
    );
}

#[test]
fn builds_endpoint_urls() {
    let config = ClientConfig::from_toml_str(SAMPLE_TOML).expect("config parses");
    assert_eq!(config.generate_url(), "https://posts.example.com/v2/generate");
    assert_eq!(
        config.answers_url("s-42"),
        "https://posts.example.com/v2/sessions/s-42/answers"
    );
}

#[test]
fn zero_idle_timeout_disables_it() {
    let config = ClientConfig::from_toml_str(
        r#"
base_url = "http://localhost"
[stream]
idle_timeout_seconds = 0
"#,
    )
    .expect("config parses");
    assert!(config.stream.idle_timeout().is_none());
}

#[test]
fn rejects_non_http_base_url() {
    let err = ClientConfig::from_toml_str(r#"base_url = "ftp://example.com""#)
        .expect_err("must reject");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("base_url")));
}

#[test]
fn rejects_answers_path_without_placeholder() {
    let err = ClientConfig::from_toml_str(
        r#"
base_url = "http://localhost"
[endpoints]
answers_path = "/answers"
"#,
    )
    .expect_err("must reject");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("{session_id}")));
}

#[test]
fn rejects_zero_frame_limit() {
    let err = ClientConfig::from_toml_str(
        r#"
base_url = "http://localhost"
[stream]
max_frame_bytes = 0
"#,
    )
    .expect_err("must reject");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn rejects_invalid_toml() {
    let err = ClientConfig::from_toml_str("base_url = ").expect_err("must reject");
    assert!(err.to_string().starts_with("config: invalid config"));
}

#[test]
fn loads_from_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("config.toml");
    std::fs::write(&path, SAMPLE_TOML).expect("write config");

    let config = ClientConfig::load_from_path(&path).expect("config loads");
    assert_eq!(config.session_header, "X-Session");
}

#[test]
fn missing_file_is_config_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let err = ClientConfig::load_from_path(temp.path().join("absent.toml"))
        .expect_err("must fail");
    assert!(matches!(err, AppError::Config(ref msg) if msg.starts_with("failed to read config")));
}

#[test]
fn new_validates_url() {
    assert!(ClientConfig::new("http://127.0.0.1:9").is_ok());
    assert!(ClientConfig::new("127.0.0.1:9").is_err());
}
