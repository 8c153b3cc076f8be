//! Integration tests for configuration file resolution and loading
//!
//! Uses serial_test for tests that manipulate CFSYNC_CONFIG, so they run
//! sequentially rather than racing on the process environment.

use cfsync_common::config::{
    load_toml_or_default, resolve_config_path, LoggingConfig, CONFIG_ENV_VAR,
};
use cfsync_common::Error;
use serde::Deserialize;
use serial_test::serial;
use std::env;
use std::io::Write;

#[derive(Debug, Default, Deserialize)]
struct Bootstrap {
    #[serde(default)]
    logging: LoggingConfig,
}

#[test]
#[serial]
fn test_env_var_used_when_no_cli_arg() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("from_env.toml");
    env::set_var(CONFIG_ENV_VAR, &path);

    let resolved = resolve_config_path(None, CONFIG_ENV_VAR);
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(resolved, Some(path));
}

#[test]
#[serial]
fn test_cli_arg_beats_env_var() {
    let dir = tempfile::tempdir().unwrap();
    let env_path = dir.path().join("env.toml");
    let cli_path = dir.path().join("cli.toml");
    env::set_var(CONFIG_ENV_VAR, &env_path);

    let resolved = resolve_config_path(Some(&cli_path), CONFIG_ENV_VAR);
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(resolved, Some(cli_path));
}

#[test]
fn test_load_valid_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[logging]\nlevel = \"warn\"").unwrap();

    let loaded: Bootstrap = load_toml_or_default(Some(file.path())).unwrap();
    assert_eq!(loaded.logging.level, "warn");
}

#[test]
fn test_empty_file_uses_field_defaults() {
    let file = tempfile::NamedTempFile::new().unwrap();

    let loaded: Bootstrap = load_toml_or_default(Some(file.path())).unwrap();
    assert_eq!(loaded.logging, LoggingConfig::default());
}

#[test]
fn test_malformed_file_is_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[logging\nlevel = ").unwrap();

    let result: Result<Bootstrap, Error> = load_toml_or_default(Some(file.path()));
    match result {
        Err(Error::Config(msg)) => assert!(msg.contains("Failed to parse")),
        other => panic!("Expected Config error, got {:?}", other),
    }
}
