//! Bootstrap configuration loading
//!
//! The TOML file is optional. Every field has a built-in default, and the
//! binaries let command-line flags and environment variables override what
//! the file says.
//!
//! # Config File Location
//!
//! 1. Explicit path (`--config`)
//! 2. `FSGEN_CONFIG` environment variable
//! 3. `<platform config dir>/fsgen/fsgen.toml` if it exists
//! 4. None (built-in defaults)

use crate::{Error, Result, ARTIFACT_EXTENSION};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "FSGEN_CONFIG";

/// Placeholder in invocation arguments replaced by the input file path
pub const INPUT_PLACEHOLDER: &str = "{input}";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub logging: LoggingConfig,
    pub batch: BatchSection,
    pub invocation: InvocationSection,
    pub artifact: ArtifactSection,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log file path (logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// `[batch]` section: policy defaults for folder runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSection {
    /// Re-process files whose artifact is ours but outdated
    pub replace_outdated: bool,
    /// Re-process files whose artifact is ours and current
    pub replace_up_to_date: bool,
    /// Maximum simultaneous invocations
    pub worker_concurrency: usize,
    /// Minimum delay between two invocation starts (milliseconds)
    pub stagger_ms: u64,
    /// Copy our existing artifacts to timestamped backups before re-processing
    pub backup_existing: bool,
    /// Descend into subfolders of the input folder
    pub recursive: bool,
    /// Secondary artifact directory checked alongside the video's own folder
    pub output_dir: Option<PathBuf>,
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            replace_outdated: true,
            replace_up_to_date: false,
            worker_concurrency: 2,
            stagger_ms: 100,
            backup_existing: false,
            recursive: false,
            output_dir: None,
        }
    }
}

/// `[invocation]` section: the per-file pipeline executable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvocationSection {
    /// Program name (looked up on PATH) or path
    pub program: String,
    /// Arguments; `{input}` is replaced by the video path
    pub args: Vec<String>,
}

impl Default for InvocationSection {
    fn default() -> Self {
        Self {
            program: "fsgen-single".to_string(),
            args: vec![INPUT_PLACEHOLDER.to_string()],
        }
    }
}

/// `[artifact]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactSection {
    /// Artifact file extension without the dot
    pub extension: String,
}

impl Default for ArtifactSection {
    fn default() -> Self {
        Self {
            extension: ARTIFACT_EXTENSION.to_string(),
        }
    }
}

/// Locate the config file, if any.
///
/// An explicit path is returned even when it does not exist, so that
/// [`load_toml_config`] can report it. The platform default is only
/// returned when present.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    dirs::config_dir()
        .map(|d| d.join("fsgen").join("fsgen.toml"))
        .filter(|p| p.exists())
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
    debug!(path = %path.display(), "Loaded TOML config");
    Ok(config)
}

/// Resolve and load the config, falling back to defaults when no file exists
pub fn load_or_default(explicit: Option<&Path>) -> Result<TomlConfig> {
    match resolve_config_path(explicit) {
        Some(path) => load_toml_config(&path),
        None => Ok(TomlConfig::default()),
    }
}
