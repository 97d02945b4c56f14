//! Bootstrap configuration file tests
//!
//! Tests that touch FSGEN_CONFIG are marked #[serial] so they do not race.

use fsgen_common::config::{
    load_or_default, load_toml_config, resolve_config_path, TomlConfig, CONFIG_ENV_VAR,
};
use serial_test::serial;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_full_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("fsgen.toml");
    std::fs::write(
        &path,
        r#"
[logging]
level = "warn"
file = "/var/log/fsgen.log"

[batch]
replace_outdated = false
replace_up_to_date = true
worker_concurrency = 4
stagger_ms = 250
backup_existing = true
recursive = true
output_dir = "/srv/scripts"

[invocation]
program = "/opt/fsgen/bin/fsgen-single"
args = ["--input", "{input}", "--quiet"]

[artifact]
extension = "funscript"
"#,
    )
    .unwrap();

    let config = load_toml_config(&path).unwrap();
    assert_eq!(config.logging.level, "warn");
    assert_eq!(config.logging.file, Some(PathBuf::from("/var/log/fsgen.log")));
    assert!(!config.batch.replace_outdated);
    assert!(config.batch.replace_up_to_date);
    assert_eq!(config.batch.worker_concurrency, 4);
    assert_eq!(config.batch.stagger_ms, 250);
    assert!(config.batch.backup_existing);
    assert!(config.batch.recursive);
    assert_eq!(config.invocation.program, "/opt/fsgen/bin/fsgen-single");
    assert_eq!(config.invocation.args.len(), 3);
}

#[test]
fn test_empty_file_is_all_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.toml");
    std::fs::write(&path, "").unwrap();
    assert_eq!(load_toml_config(&path).unwrap(), TomlConfig::default());
}

#[test]
fn test_serialized_defaults_load_back() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("defaults.toml");
    std::fs::write(&path, toml::to_string(&TomlConfig::default()).unwrap()).unwrap();
    assert_eq!(load_toml_config(&path).unwrap(), TomlConfig::default());
}

#[test]
#[serial]
fn test_blank_env_var_ignored() {
    std::env::set_var(CONFIG_ENV_VAR, "   ");
    let resolved = resolve_config_path(None);
    std::env::remove_var(CONFIG_ENV_VAR);

    // Falls through to the platform config dir, which only counts if present
    if let Some(path) = resolved {
        assert!(path.exists());
    }
}

#[test]
#[serial]
fn test_env_var_pointing_at_missing_file_is_error() {
    let dir = TempDir::new().unwrap();
    std::env::set_var(CONFIG_ENV_VAR, dir.path().join("missing.toml"));
    let result = load_or_default(None);
    std::env::remove_var(CONFIG_ENV_VAR);
    assert!(result.is_err());
}
