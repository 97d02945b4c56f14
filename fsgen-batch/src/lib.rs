//! fsgen-batch - folder-level artifact generation
//!
//! Decides which videos in a folder need a (new) artifact and runs one
//! independent pipeline invocation per selected video, a bounded number at
//! a time.
//!
//! Flow of one run:
//!
//! 1. [`scanner::VideoScanner`] lists the folder's videos
//! 2. [`classify::Classifier`] buckets each video by its existing artifact
//! 3. [`worklist::build_worklist`] applies the replacement policy
//! 4. [`runner::BatchRunner`] runs the invocations and tracks progress
//! 5. [`report::BatchReport`] enumerates every file's outcome

pub mod classify;
pub mod config;
pub mod error;
pub mod invoker;
pub mod limiter;
pub mod orchestrator;
pub mod report;
pub mod runner;
pub mod scanner;
pub mod worklist;

pub use classify::{Bucket, Buckets, Classified, Classifier, DirectoryOutput, OutputResolver, SiblingOutput};
pub use error::{BatchError, InvocationFailure};
pub use invoker::{InvocationSpec, Invoker, ProcessInvoker};
pub use orchestrator::BatchOrchestrator;
pub use report::{BatchReport, Disposition, FileOutcome};
pub use runner::{BatchRunner, JobResult, JobStatus, RunOutcome};
pub use scanner::VideoScanner;
pub use worklist::{build_worklist, BatchPolicy, WorkItem};
