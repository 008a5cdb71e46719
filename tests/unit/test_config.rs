//! Config file loading and validation.

use std::io::Write;

use quizforge::api::RetryPolicy;
use quizforge::config::Config;
use quizforge::errors::{get_exit_code, EXIT_CONFIG_ERROR};
use std::time::Duration;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_partial_file_keeps_defaults() {
    let file = write_config("model = \"local-model\"\n");
    let config = Config::load(file.path().to_str()).unwrap();
    assert_eq!(config.model, "local-model");
    assert_eq!(config.endpoint, Config::default().endpoint);
    assert_eq!(config.retry, Config::default().retry);
}

#[test]
fn test_retry_section_drives_policy() {
    let file = write_config(
        r#"
        [retry]
        max_retries = 4
        backoff_factor = 3.0
        min_delay_ms = 100
        max_delay_ms = 500
        "#,
    );
    let config = Config::load(file.path().to_str()).unwrap();
    let policy = RetryPolicy::from_settings(&config.retry);
    assert_eq!(policy.max_retries, 4);
    assert_eq!(policy.delay_for(1), Duration::from_millis(100));
    assert_eq!(policy.delay_for(2), Duration::from_millis(300));
    assert_eq!(policy.delay_for(3), Duration::from_millis(500));
}

#[test]
fn test_invalid_values_map_to_config_exit_code() {
    let file = write_config("temperature = 7.5\n");
    let err = Config::load(file.path().to_str()).unwrap_err();
    assert_eq!(get_exit_code(&err), EXIT_CONFIG_ERROR);
}

#[test]
fn test_malformed_file_maps_to_config_exit_code() {
    let file = write_config("[retry\nmax_retries = 2\n");
    let err = Config::load(file.path().to_str()).unwrap_err();
    assert_eq!(get_exit_code(&err), EXIT_CONFIG_ERROR);
    assert!(err.to_string().contains("Failed to parse config"));
}

#[test]
fn test_missing_file_maps_to_config_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    let err = Config::load(path.to_str()).unwrap_err();
    assert_eq!(get_exit_code(&err), EXIT_CONFIG_ERROR);
}
