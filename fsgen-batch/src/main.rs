//! fsgen-batch - Main entry point
//!
//! Generates artifacts for every video in a folder that needs one, running
//! a bounded number of per-file pipeline invocations in parallel.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use fsgen_batch::config::{Args, Settings};
use fsgen_batch::{BatchOrchestrator, ProcessInvoker};
use fsgen_common::config::load_or_default;
use fsgen_common::logging::init_tracing;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let toml_config =
        load_or_default(args.config.as_deref()).context("Failed to load configuration")?;
    let settings = Settings::resolve(&args, &toml_config).context("Invalid configuration")?;

    init_tracing(&settings.logging, settings.verbose).context("Failed to initialize logging")?;

    info!(
        "Starting fsgen-batch v{} on {}",
        env!("CARGO_PKG_VERSION"),
        settings.folder.display()
    );

    // Fail before touching any file if the pipeline program is missing
    let invoker = ProcessInvoker::resolve(settings.invocation.clone())
        .context("Invocation preflight failed")?;
    info!(executable = %invoker.executable().display(), "Using invocation program");

    let orchestrator = BatchOrchestrator::from_settings(&settings, Arc::new(invoker));
    let report = orchestrator
        .run_folder(&settings.folder)
        .await
        .with_context(|| format!("Batch run over {} failed", settings.folder.display()))?;

    if report.is_failure() {
        error!(
            attempted = report.attempted(),
            "Every attempted file failed"
        );
        return Ok(ExitCode::FAILURE);
    }

    Ok(ExitCode::SUCCESS)
}
