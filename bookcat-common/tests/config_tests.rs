//! Tests for configuration resolution
//!
//! Priority order: CLI > environment > TOML > OS default.
//!
//! Note: Uses serial_test to prevent ENV variable race conditions.

use bookcat_common::config::{
    resolve_root_folder, resolve_session_idle_minutes, resolve_setting, BackupDirStatus, FileConfig,
    BACKUP_DIR_ENV_VAR, CONFIG_ENV_VAR, DEFAULT_SESSION_IDLE_MINUTES, ROOT_ENV_VAR,
    SESSION_IDLE_ENV_VAR,
};
use serial_test::serial;
use std::env;
use std::path::PathBuf;

#[test]
#[serial]
fn test_cli_argument_wins() {
    env::set_var(ROOT_ENV_VAR, "/from/env");
    let file = FileConfig {
        root_folder: Some("/from/toml".to_string()),
        ..Default::default()
    };

    assert_eq!(resolve_root_folder(Some("/from/cli"), &file), PathBuf::from("/from/cli"));

    env::remove_var(ROOT_ENV_VAR);
}

#[test]
#[serial]
fn test_env_beats_toml() {
    env::set_var(ROOT_ENV_VAR, "/from/env");
    let file = FileConfig {
        root_folder: Some("/from/toml".to_string()),
        ..Default::default()
    };

    assert_eq!(resolve_root_folder(None, &file), PathBuf::from("/from/env"));

    env::remove_var(ROOT_ENV_VAR);
}

#[test]
#[serial]
fn test_toml_used_without_env() {
    env::remove_var(ROOT_ENV_VAR);
    let file = FileConfig {
        root_folder: Some("/from/toml".to_string()),
        ..Default::default()
    };

    assert_eq!(resolve_root_folder(None, &file), PathBuf::from("/from/toml"));
}

#[test]
#[serial]
fn test_default_root_is_not_empty() {
    env::remove_var(ROOT_ENV_VAR);
    let root = resolve_root_folder(None, &FileConfig::default());
    assert!(!root.as_os_str().is_empty());
    assert!(root.to_string_lossy().contains("bookcat"));
}

#[test]
#[serial]
fn test_resolve_setting_order() {
    env::remove_var("BOOKCAT_TEST_BIND");
    assert_eq!(resolve_setting(None, "BOOKCAT_TEST_BIND", None, "127.0.0.1:5780"), "127.0.0.1:5780");
    assert_eq!(resolve_setting(None, "BOOKCAT_TEST_BIND", Some("0.0.0.0:80"), "x"), "0.0.0.0:80");

    env::set_var("BOOKCAT_TEST_BIND", "10.0.0.1:8080");
    assert_eq!(resolve_setting(None, "BOOKCAT_TEST_BIND", Some("0.0.0.0:80"), "x"), "10.0.0.1:8080");
    assert_eq!(resolve_setting(Some("[::1]:9"), "BOOKCAT_TEST_BIND", None, "x"), "[::1]:9");
    env::remove_var("BOOKCAT_TEST_BIND");
}

#[test]
#[serial]
fn test_explicit_config_file_loaded() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("config.toml");
    std::fs::write(&path, "root_folder = \"/srv/books\"\nbind = \"0.0.0.0:5780\"\n").unwrap();

    env::set_var(CONFIG_ENV_VAR, &path);
    let config = FileConfig::load(None).unwrap();
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(config.root_folder.as_deref(), Some("/srv/books"));
    assert_eq!(config.bind.as_deref(), Some("0.0.0.0:5780"));
    assert!(config.dist_dir.is_none());
}

#[test]
#[serial]
fn test_missing_explicit_config_is_error() {
    env::remove_var(CONFIG_ENV_VAR);
    let result = FileConfig::load(Some(std::path::Path::new("/definitely/not/here.toml")));
    assert!(result.is_err());
}

#[test]
#[serial]
fn test_invalid_toml_is_error() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("config.toml");
    std::fs::write(&path, "root_folder = [unterminated").unwrap();
    assert!(FileConfig::load(Some(&path)).is_err());
}

#[test]
#[serial]
fn test_backup_dir_env_overrides_file() {
    let tmp = tempfile::tempdir().unwrap();
    let file = FileConfig {
        backup_dir: Some("/does/not/exist".to_string()),
        ..Default::default()
    };

    env::remove_var(BACKUP_DIR_ENV_VAR);
    assert_eq!(BackupDirStatus::resolve(&file).as_str(), "missing");

    env::set_var(BACKUP_DIR_ENV_VAR, tmp.path());
    assert_eq!(BackupDirStatus::resolve(&file).as_str(), "ready");
    env::remove_var(BACKUP_DIR_ENV_VAR);
}

#[test]
#[serial]
fn test_session_idle_minutes_priority() {
    let file = FileConfig {
        session_idle_minutes: Some(90),
        ..Default::default()
    };

    env::remove_var(SESSION_IDLE_ENV_VAR);
    assert_eq!(resolve_session_idle_minutes(None, &FileConfig::default()), DEFAULT_SESSION_IDLE_MINUTES);
    assert_eq!(resolve_session_idle_minutes(None, &file), 90);

    env::set_var(SESSION_IDLE_ENV_VAR, "45");
    assert_eq!(resolve_session_idle_minutes(None, &file), 45);
    assert_eq!(resolve_session_idle_minutes(Some(10), &file), 10);

    // Zero and junk are skipped
    env::set_var(SESSION_IDLE_ENV_VAR, "soon");
    assert_eq!(resolve_session_idle_minutes(Some(0), &file), 90);

    env::remove_var(SESSION_IDLE_ENV_VAR);
}
