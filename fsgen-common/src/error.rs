//! Common error types for fsgen

use std::path::PathBuf;
use thiserror::Error;

/// Common result type for fsgen operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across fsgen crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A version string has a non-numeric component
    #[error("Malformed version '{version}': component '{component}' is not a non-negative integer")]
    MalformedVersion { version: String, component: String },

    /// An existing artifact could not be read as artifact metadata
    #[error("Could not parse artifact {path}: {reason}")]
    ArtifactParse { path: PathBuf, reason: String },

    /// Invalid user input or parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
