//! Integration tests for the bootstrap TOML configuration

use cfsync::{Error, ReadyState, TomlConfig};
use serial_test::serial;
use std::io::Write;
use std::time::Duration;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_load_overrides_from_file() {
    let file = write_config(
        r#"
[sync]
active_interval_ms = 50
drift_threshold = 0.05
ready_state_threshold = "have_enough_data"

[logging]
level = "info"
"#,
    );

    let config = TomlConfig::load(Some(file.path())).unwrap();

    assert_eq!(config.sync.active_interval(), Duration::from_millis(50));
    assert_eq!(config.sync.drift_threshold, 0.05);
    assert_eq!(config.sync.ready_state_threshold, ReadyState::HaveEnoughData);
    // Untouched fields keep their defaults
    assert_eq!(config.sync.idle_interval(), Duration::from_secs(1));
    assert_eq!(config.logging.level, "info");
}

#[test]
#[serial]
fn test_missing_file_gives_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = TomlConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();

    assert_eq!(config.sync, cfsync::SyncConfig::default());
    assert_eq!(config.logging.level, "debug");
}

#[test]
#[serial]
fn test_invalid_values_rejected() {
    let file = write_config(
        r#"
[sync]
active_interval_ms = 2000
idle_interval_ms = 1000
"#,
    );

    assert!(matches!(TomlConfig::load(Some(file.path())), Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_malformed_file_is_an_error() {
    let file = write_config("[sync\nactive_interval_ms = ");

    assert!(matches!(
        TomlConfig::load(Some(file.path())),
        Err(Error::Common(cfsync_common::Error::Config(_)))
    ));
}
