//! Error types for fsgen-batch

use crate::scanner::ScanError;
use serde::Serialize;
use thiserror::Error;

/// Run-level errors. Any of these aborts the whole run before (or instead
/// of) launching invocations.
#[derive(Debug, Error)]
pub enum BatchError {
    /// Input folder could not be scanned
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// The per-file pipeline executable cannot be found
    #[error("Invocation program '{program}' not found: {reason}")]
    ExecutableNotFound { program: String, reason: String },

    /// Invalid policy or invocation settings
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Shared library error (config file, artifact inspection)
    #[error(transparent)]
    Common(#[from] fsgen_common::Error),
}

/// Why one invocation did not succeed. Recorded per file, never fatal to
/// the run.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum InvocationFailure {
    /// Process exited with a non-zero code
    #[error("exit code {0}")]
    ExitCode(i32),

    /// Process was killed by a signal
    #[error("terminated by signal")]
    Terminated,

    /// Process could not be started
    #[error("launch failed: {0}")]
    Launch(String),

    /// Backing up the existing artifact failed, so the file was not re-processed
    #[error("backup failed: {0}")]
    Backup(String),

    /// The invoker panicked
    #[error("invocation panicked")]
    Panicked,
}
