//! Command-line arguments and settings resolution
//!
//! Priority: CLI flag > environment variable > TOML file > built-in default.

use crate::error::BatchError;
use crate::invoker::InvocationSpec;
use crate::worklist::BatchPolicy;
use clap::Parser;
use fsgen_common::config::{LoggingConfig, TomlConfig};
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments for fsgen-batch
#[derive(Parser, Debug, Clone)]
#[command(name = "fsgen-batch")]
#[command(about = "Generate artifacts in parallel for all videos in a folder")]
#[command(version)]
pub struct Args {
    /// Folder containing video files
    pub folder: PathBuf,

    /// Config file (defaults to $FSGEN_CONFIG, then the platform config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Regenerate our artifacts that are outdated
    #[arg(long, overrides_with = "no_replace_outdated")]
    pub replace_outdated: bool,

    /// Keep our outdated artifacts
    #[arg(long)]
    pub no_replace_outdated: bool,

    /// Regenerate our artifacts even when they are up to date
    #[arg(long, overrides_with = "no_replace_up_to_date")]
    pub replace_up_to_date: bool,

    /// Keep our up-to-date artifacts
    #[arg(long)]
    pub no_replace_up_to_date: bool,

    /// Number of invocations to run in parallel
    #[arg(short = 'n', long, env = "FSGEN_NUM_WORKERS")]
    pub num_workers: Option<usize>,

    /// Separate artifact directory checked alongside each video's folder
    #[arg(short, long, env = "FSGEN_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Minimum delay between invocation starts (milliseconds)
    #[arg(long, env = "FSGEN_STAGGER_MS")]
    pub stagger_ms: Option<u64>,

    /// Back up our existing artifacts before regenerating them
    #[arg(long, overrides_with = "no_backup")]
    pub backup: bool,

    /// Regenerate without backing up
    #[arg(long)]
    pub no_backup: bool,

    /// Descend into subfolders
    #[arg(short, long, overrides_with = "no_recursive")]
    pub recursive: bool,

    /// Only look at the folder itself
    #[arg(long)]
    pub no_recursive: bool,

    /// Per-file pipeline program
    #[arg(long, env = "FSGEN_PROGRAM")]
    pub program: Option<String>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    pub verbose: bool,
}

/// Fully resolved settings for one run
#[derive(Debug, Clone)]
pub struct Settings {
    pub folder: PathBuf,
    pub policy: BatchPolicy,
    pub invocation: InvocationSpec,
    pub recursive: bool,
    pub output_dir: Option<PathBuf>,
    pub extension: String,
    pub logging: LoggingConfig,
    pub verbose: bool,
}

fn flag_pair(yes: bool, no: bool) -> Option<bool> {
    match (yes, no) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

impl Settings {
    pub fn resolve(args: &Args, toml: &TomlConfig) -> Result<Self, BatchError> {
        let batch = &toml.batch;

        let policy = BatchPolicy::new(
            flag_pair(args.replace_outdated, args.no_replace_outdated)
                .unwrap_or(batch.replace_outdated),
            flag_pair(args.replace_up_to_date, args.no_replace_up_to_date)
                .unwrap_or(batch.replace_up_to_date),
            args.num_workers.unwrap_or(batch.worker_concurrency),
            Duration::from_millis(args.stagger_ms.unwrap_or(batch.stagger_ms)),
            flag_pair(args.backup, args.no_backup).unwrap_or(batch.backup_existing),
        )?;

        let mut invocation_section = toml.invocation.clone();
        if let Some(program) = &args.program {
            invocation_section.program = program.clone();
        }
        let invocation = InvocationSpec::from_section(&invocation_section)?;

        let extension = toml.artifact.extension.trim_start_matches('.').to_string();
        if extension.is_empty() {
            return Err(BatchError::InvalidConfig(
                "artifact extension must not be empty".to_string(),
            ));
        }

        Ok(Self {
            folder: args.folder.clone(),
            policy,
            invocation,
            recursive: flag_pair(args.recursive, args.no_recursive).unwrap_or(batch.recursive),
            output_dir: args.output_dir.clone().or_else(|| batch.output_dir.clone()),
            extension,
            logging: toml.logging.clone(),
            verbose: args.verbose,
        })
    }
}
