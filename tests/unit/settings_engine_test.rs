//! Integration-level unit tests for the SettingsEngine public API.
//!
//! These tests drive the engine through its trait interface with an injected
//! environment, so no process-wide variables are touched.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use smartmark::services::settings_engine::{
    SettingsEngine, SettingsEngineTrait, ENV_ANON_KEY, ENV_BACKEND_URL, ENV_CONFIG, ENV_DATA_DIR,
};
use smartmark::types::errors::ConfigError;
use smartmark::types::settings::{AppSettings, BackendSettings};
use tempfile::TempDir;

fn config_path(dir: &TempDir) -> String {
    dir.path().join("smartmark.json").to_string_lossy().to_string()
}

/// Helper: an engine reading `vars` instead of the process environment.
fn engine_with(path: Option<String>, vars: &[(&str, &str)]) -> SettingsEngine {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    SettingsEngine::with_env(path, move |key| vars.get(key).cloned())
}

/// Without a config file the built-in defaults apply: local backend, Google sign-in.
#[test]
fn test_load_defaults_when_no_config_file_exists() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_with(Some(config_path(&dir)), &[]);

    let settings = engine.load().unwrap();

    assert_eq!(settings, AppSettings::default());
    assert_eq!(settings.auth.provider, "google");
    assert!(matches!(settings.backend, BackendSettings::Local { database_path: None }));
}

/// A partial file fills in the missing sections with defaults.
#[test]
fn test_partial_file_uses_defaults_for_missing_fields() {
    let dir = TempDir::new().unwrap();
    fs::write(config_path(&dir), r#"{"auth": {"redirect_to": "http://localhost:8080"}}"#).unwrap();
    let mut engine = engine_with(Some(config_path(&dir)), &[]);

    let settings = engine.load().unwrap();

    assert_eq!(settings.auth.redirect_to, "http://localhost:8080");
    assert_eq!(settings.auth.provider, "google");
    assert_eq!(settings.realtime.poll_interval_ms, 2000);
}

#[test]
fn test_remote_backend_from_file() {
    let dir = TempDir::new().unwrap();
    fs::write(
        config_path(&dir),
        r#"{"backend": {"kind": "remote", "url": "https://proj.example.co", "anon_key": "anon"}}"#,
    )
    .unwrap();
    let mut engine = engine_with(Some(config_path(&dir)), &[]);

    let settings = engine.load().unwrap();

    assert_eq!(
        settings.backend,
        BackendSettings::Remote {
            url: "https://proj.example.co".to_string(),
            anon_key: "anon".to_string(),
        }
    );
}

#[test]
fn test_malformed_file_is_a_parse_error() {
    let dir = TempDir::new().unwrap();
    fs::write(config_path(&dir), "{not json").unwrap();
    let mut engine = engine_with(Some(config_path(&dir)), &[]);

    assert!(matches!(engine.load(), Err(ConfigError::Parse(_))));
}

/// Setting the backend URL switches a local configuration to the hosted backend.
#[test]
fn test_env_url_switches_to_remote() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_with(
        Some(config_path(&dir)),
        &[(ENV_BACKEND_URL, "https://env.example.co"), (ENV_ANON_KEY, "env-key")],
    );

    let settings = engine.load().unwrap();

    assert_eq!(
        settings.backend,
        BackendSettings::Remote {
            url: "https://env.example.co".to_string(),
            anon_key: "env-key".to_string(),
        }
    );
}

#[test]
fn test_env_overrides_remote_file_values() {
    let dir = TempDir::new().unwrap();
    fs::write(
        config_path(&dir),
        r#"{"backend": {"kind": "remote", "url": "https://file.example.co", "anon_key": "file-key"}}"#,
    )
    .unwrap();
    let mut engine = engine_with(Some(config_path(&dir)), &[(ENV_ANON_KEY, "env-key")]);

    let settings = engine.load().unwrap();

    assert_eq!(
        settings.backend,
        BackendSettings::Remote {
            url: "https://file.example.co".to_string(),
            anon_key: "env-key".to_string(),
        }
    );
}

/// A backend URL without an anon key cannot work and is refused at load time.
#[test]
fn test_env_url_without_key_is_invalid() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_with(Some(config_path(&dir)), &[(ENV_BACKEND_URL, "https://env.example.co")]);

    assert!(matches!(engine.load(), Err(ConfigError::Invalid(_))));
}

#[test]
fn test_non_http_url_is_invalid() {
    let dir = TempDir::new().unwrap();
    let mut engine = engine_with(
        Some(config_path(&dir)),
        &[(ENV_BACKEND_URL, "ftp://env.example.co"), (ENV_ANON_KEY, "k")],
    );

    assert!(matches!(engine.load(), Err(ConfigError::Invalid(_))));
}

#[test]
fn test_config_path_from_env() {
    let dir = TempDir::new().unwrap();
    let path = config_path(&dir);
    let engine = engine_with(None, &[(ENV_CONFIG, path.as_str())]);
    assert_eq!(engine.get_config_path(), path);
}

#[test]
fn test_explicit_path_wins_over_env() {
    let dir = TempDir::new().unwrap();
    let path = config_path(&dir);
    let engine = engine_with(Some(path.clone()), &[(ENV_CONFIG, "/elsewhere/smartmark.json")]);
    assert_eq!(engine.get_config_path(), path);
}

#[test]
fn test_database_path_under_data_dir() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data");
    let data_str = data.to_string_lossy().to_string();
    let mut engine = engine_with(Some(config_path(&dir)), &[(ENV_DATA_DIR, data_str.as_str())]);
    engine.load().unwrap();

    assert_eq!(engine.data_dir(), data);
    assert_eq!(engine.database_path(), data.join("smartmark.db"));
}

#[test]
fn test_database_path_from_local_settings() {
    let dir = TempDir::new().unwrap();
    fs::write(
        config_path(&dir),
        r#"{"backend": {"kind": "local", "database_path": "/srv/marks.db"}}"#,
    )
    .unwrap();
    let mut engine = engine_with(Some(config_path(&dir)), &[]);
    engine.load().unwrap();

    assert_eq!(engine.database_path(), PathBuf::from("/srv/marks.db"));
}

/// `save` writes the loaded settings so a fresh engine reads the same values.
#[test]
fn test_save_then_load_round_trips() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("smartmark.json");
    let path = path.to_string_lossy().to_string();
    {
        let mut engine = engine_with(
            Some(path.clone()),
            &[(ENV_BACKEND_URL, "https://env.example.co"), (ENV_ANON_KEY, "k")],
        );
        engine.load().unwrap();
        engine.save().unwrap();
    }

    let mut engine = engine_with(Some(path), &[]);
    let settings = engine.load().unwrap();
    assert!(matches!(settings.backend, BackendSettings::Remote { .. }));
}
