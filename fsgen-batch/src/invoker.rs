//! Per-file invocation boundary
//!
//! Each selected video is handed to one independent run of the per-file
//! pipeline. The default [`ProcessInvoker`] starts an external process and
//! maps its exit status to success or an [`InvocationFailure`].

use crate::error::{BatchError, InvocationFailure};
use async_trait::async_trait;
use fsgen_common::config::{InvocationSection, INPUT_PLACEHOLDER};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Runs the per-file pipeline for one input
#[async_trait]
pub trait Invoker: Send + Sync {
    /// Process `input` to completion
    async fn invoke(&self, input: &Path) -> Result<(), InvocationFailure>;
}

/// Program and argument template for the per-file pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationSpec {
    program: String,
    args: Vec<String>,
}

impl InvocationSpec {
    /// Arguments may contain `{input}`, replaced by the video path. Without
    /// any placeholder the path is appended as the last argument.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Result<Self, BatchError> {
        let program = program.into();
        if program.trim().is_empty() {
            return Err(BatchError::InvalidConfig(
                "invocation program must not be empty".to_string(),
            ));
        }
        Ok(Self { program, args })
    }

    pub fn from_section(section: &InvocationSection) -> Result<Self, BatchError> {
        Self::new(section.program.clone(), section.args.clone())
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments for one input
    pub fn render_args(&self, input: &Path) -> Vec<String> {
        let input = input.to_string_lossy();
        let mut substituted = false;
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                if arg.contains(INPUT_PLACEHOLDER) {
                    substituted = true;
                    arg.replace(INPUT_PLACEHOLDER, &input)
                } else {
                    arg.clone()
                }
            })
            .collect();
        if !substituted {
            args.push(input.into_owned());
        }
        args
    }
}

/// Launches the pipeline as a child process, one per input
#[derive(Debug, Clone)]
pub struct ProcessInvoker {
    spec: InvocationSpec,
    executable: PathBuf,
}

impl ProcessInvoker {
    /// Resolve the program on PATH (or as a path) before anything is launched.
    ///
    /// # Errors
    ///
    /// [`BatchError::ExecutableNotFound`] if the program cannot be found
    pub fn resolve(spec: InvocationSpec) -> Result<Self, BatchError> {
        let executable =
            which::which(spec.program()).map_err(|e| BatchError::ExecutableNotFound {
                program: spec.program().to_string(),
                reason: e.to_string(),
            })?;
        debug!(program = %spec.program(), executable = %executable.display(), "Resolved invocation program");
        Ok(Self { spec, executable })
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }
}

#[async_trait]
impl Invoker for ProcessInvoker {
    async fn invoke(&self, input: &Path) -> Result<(), InvocationFailure> {
        let args = self.spec.render_args(input);
        debug!(executable = %self.executable.display(), ?args, "Launching invocation");

        let status = Command::new(&self.executable)
            .args(&args)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|e| InvocationFailure::Launch(e.to_string()))?;

        if status.success() {
            Ok(())
        } else {
            match status.code() {
                Some(code) => Err(InvocationFailure::ExitCode(code)),
                None => Err(InvocationFailure::Terminated),
            }
        }
    }
}
