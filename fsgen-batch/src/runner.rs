//! Bounded-concurrency batch runner
//!
//! ```text
//!              job queue (bounded)            completion channel
//! [Feeder] ----------------------> [Worker 1..N] -----------------> [Aggregator]
//!                                        |
//!                                  LaunchLimiter (stagger)
//! ```
//!
//! - A fixed set of `worker_concurrency` workers pulls from one shared job
//!   queue, so no more than N invocations ever run at once.
//! - Every worker acquires a [`LaunchLimiter`] permit before each
//!   invocation, which spaces invocation starts by the stagger interval.
//! - Workers report start and completion on one fan-in channel. Only the
//!   aggregator touches progress state (in-flight list, counters), so it is
//!   always consistent.
//! - A failed invocation is one [`JobResult`]; the run always continues
//!   until every submitted job has finished.

use crate::classify::Bucket;
use crate::error::InvocationFailure;
use crate::invoker::Invoker;
use crate::limiter::LaunchLimiter;
use crate::worklist::{BatchPolicy, WorkItem};
use chrono::{Local, Utc};
use fsgen_common::artifact::create_backup;
use fsgen_common::events::{BatchEvent, EventBus, ProgressSnapshot};
use fsgen_common::time::format_hms;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Outcome of one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Succeeded,
    Failed(InvocationFailure),
}

/// One finished job, success or failure
#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    pub input: PathBuf,
    pub bucket: Bucket,
    pub status: JobStatus,
    /// Wall time of the invocation
    pub elapsed: Duration,
}

impl JobResult {
    pub fn succeeded(&self) -> bool {
        self.status == JobStatus::Succeeded
    }
}

/// Worker -> aggregator messages
enum WorkerMessage {
    Started { input: PathBuf },
    Finished(JobResult),
}

/// Everything a run produced
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Results in completion order
    pub results: Vec<JobResult>,
    pub total_elapsed: Duration,
    /// Highest number of simultaneous invocations observed
    pub peak_in_flight: usize,
}

/// Runs a worklist with bounded concurrency
pub struct BatchRunner {
    invoker: Arc<dyn Invoker>,
    policy: BatchPolicy,
    events: EventBus,
}

impl BatchRunner {
    pub fn new(invoker: Arc<dyn Invoker>, policy: BatchPolicy) -> Self {
        Self {
            invoker,
            policy,
            events: EventBus::default(),
        }
    }

    /// Publish run progress on `events`
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn policy(&self) -> &BatchPolicy {
        &self.policy
    }

    /// Run every item of `worklist`. Returns once all of them finished.
    pub async fn run(&self, run_id: Uuid, worklist: Vec<WorkItem>) -> RunOutcome {
        let run_start = Instant::now();
        let total = worklist.len();
        let concurrency = self.policy.worker_concurrency();

        self.events.emit_lossy(BatchEvent::RunStarted {
            run_id,
            total,
            concurrency,
            timestamp: Utc::now(),
        });

        if total == 0 {
            info!(run_id = %run_id, "No files need new artifact generation.");
            self.emit_run_completed(run_id, 0, 0, run_start);
            return RunOutcome {
                results: Vec::new(),
                total_elapsed: run_start.elapsed(),
                peak_in_flight: 0,
            };
        }

        info!(
            run_id = %run_id,
            total,
            concurrency,
            stagger_ms = self.policy.stagger().as_millis() as u64,
            "Starting batch generation"
        );

        let (job_tx, job_rx) = mpsc::channel::<WorkItem>(concurrency);
        let queue = Arc::new(Mutex::new(job_rx));
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<WorkerMessage>();
        let limiter = Arc::new(LaunchLimiter::new(self.policy.stagger()));

        let feeder = tokio::spawn(async move {
            for item in worklist {
                debug!(file = %item.input.display(), "[Submit]");
                if job_tx.send(item).await.is_err() {
                    break;
                }
            }
        });

        let mut workers = FuturesUnordered::new();
        for worker_id in 0..concurrency.min(total) {
            workers.push(tokio::spawn(worker_loop(
                worker_id,
                queue.clone(),
                self.invoker.clone(),
                limiter.clone(),
                done_tx.clone(),
                self.policy.backup_existing(),
            )));
        }
        drop(done_tx);

        let mut in_flight: Vec<PathBuf> = Vec::new();
        let mut results: Vec<JobResult> = Vec::with_capacity(total);
        let mut elapsed_sum = Duration::ZERO;

        while let Some(message) = done_rx.recv().await {
            match message {
                WorkerMessage::Started { input } => {
                    debug!(run_id = %run_id, file = %input.display(), "[Start]");
                    self.events.emit_lossy(BatchEvent::FileStarted {
                        run_id,
                        file: input.clone(),
                        timestamp: Utc::now(),
                    });
                    in_flight.push(input);
                }
                WorkerMessage::Finished(result) => {
                    if let Some(pos) = in_flight.iter().position(|p| *p == result.input) {
                        in_flight.remove(pos);
                    }
                    elapsed_sum += result.elapsed;

                    let completed = results.len() + 1;
                    let average = elapsed_sum.as_secs_f64() / completed as f64;
                    let progress = ProgressSnapshot {
                        completed,
                        total,
                        total_elapsed_secs: run_start.elapsed().as_secs_f64(),
                        average_secs: average,
                        average_parallel_secs: average / concurrency as f64,
                        in_flight: in_flight.clone(),
                    };
                    log_progress(&progress);

                    let failure = match &result.status {
                        JobStatus::Succeeded => {
                            info!(run_id = %run_id, file = %result.input.display(), "[Done]");
                            None
                        }
                        JobStatus::Failed(failure) => {
                            warn!(run_id = %run_id, file = %result.input.display(), error = %failure, "[Failed]");
                            Some(failure.to_string())
                        }
                    };

                    self.events.emit_lossy(BatchEvent::FileCompleted {
                        run_id,
                        file: result.input.clone(),
                        succeeded: failure.is_none(),
                        failure,
                        elapsed_secs: result.elapsed.as_secs_f64(),
                        progress,
                        timestamp: Utc::now(),
                    });
                    results.push(result);
                }
            }
        }

        // Channel closed: every worker has exited
        while let Some(joined) = workers.next().await {
            if let Err(e) = joined {
                error!(run_id = %run_id, error = %e, "Batch worker task failed");
            }
        }
        if let Err(e) = feeder.await {
            error!(run_id = %run_id, error = %e, "Job feeder task failed");
        }

        let succeeded = results.iter().filter(|r| r.succeeded()).count();
        self.emit_run_completed(run_id, results.len(), succeeded, run_start);
        info!(
            run_id = %run_id,
            attempted = results.len(),
            succeeded,
            failed = results.len() - succeeded,
            total_time = %format_hms(run_start.elapsed()),
            "All artifact generation tasks completed"
        );

        RunOutcome {
            results,
            total_elapsed: run_start.elapsed(),
            peak_in_flight: limiter.peak_in_flight(),
        }
    }

    fn emit_run_completed(&self, run_id: Uuid, attempted: usize, succeeded: usize, start: Instant) {
        self.events.emit_lossy(BatchEvent::RunCompleted {
            run_id,
            attempted,
            succeeded,
            failed: attempted - succeeded,
            total_elapsed_secs: start.elapsed().as_secs_f64(),
            timestamp: Utc::now(),
        });
    }
}

fn log_progress(progress: &ProgressSnapshot) {
    let in_flight = if progress.in_flight.is_empty() {
        "None".to_string()
    } else {
        progress
            .in_flight
            .iter()
            .map(|p| format!(" - {}", p.display()))
            .collect::<Vec<_>>()
            .join("\n")
    };
    info!(
        "Progress: {}/{} completed | Total run time: {} | Average parallel time: {} | Average completion time: {}\nIn progress:\n{}",
        progress.completed,
        progress.total,
        format_hms(Duration::from_secs_f64(progress.total_elapsed_secs)),
        format_hms(Duration::from_secs_f64(progress.average_parallel_secs)),
        format_hms(Duration::from_secs_f64(progress.average_secs)),
        in_flight
    );
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<Mutex<mpsc::Receiver<WorkItem>>>,
    invoker: Arc<dyn Invoker>,
    limiter: Arc<LaunchLimiter>,
    done_tx: mpsc::UnboundedSender<WorkerMessage>,
    backup_existing: bool,
) {
    loop {
        let next = {
            let mut rx = queue.lock().await;
            rx.recv().await
        };
        let Some(item) = next else {
            debug!(worker_id, "Job queue drained, worker exiting");
            break;
        };

        let permit = limiter.acquire().await;
        let _ = done_tx.send(WorkerMessage::Started {
            input: item.input.clone(),
        });

        let start = Instant::now();
        let status = match backup_before_reprocess(&item, backup_existing).await {
            Err(failure) => JobStatus::Failed(failure),
            Ok(()) => {
                match AssertUnwindSafe(invoker.invoke(&item.input))
                    .catch_unwind()
                    .await
                {
                    Ok(Ok(())) => JobStatus::Succeeded,
                    Ok(Err(failure)) => JobStatus::Failed(failure),
                    Err(_) => {
                        error!(worker_id, file = %item.input.display(), "Invoker panicked");
                        JobStatus::Failed(InvocationFailure::Panicked)
                    }
                }
            }
        };
        let elapsed = start.elapsed();
        drop(permit);

        let _ = done_tx.send(WorkerMessage::Finished(JobResult {
            input: item.input,
            bucket: item.bucket,
            status,
            elapsed,
        }));
    }
}

/// Copy our existing artifacts to timestamped backups before they get
/// overwritten
async fn backup_before_reprocess(item: &WorkItem, enabled: bool) -> Result<(), InvocationFailure> {
    if !enabled || !matches!(item.bucket, Bucket::Current | Bucket::Stale) {
        return Ok(());
    }

    let timestamp = Local::now().naive_local();
    for artifact in &item.our_artifacts {
        let source = artifact.clone();
        let copied = tokio::task::spawn_blocking(move || create_backup(&source, timestamp))
            .await
            .map_err(|e| e.to_string())
            .and_then(|result| result.map_err(|e| e.to_string()));
        match copied {
            Ok(backup) => {
                info!(artifact = %artifact.display(), backup = %backup.display(), "Backed up existing artifact");
            }
            Err(e) => {
                error!(artifact = %artifact.display(), error = %e, "Artifact backup failed, skipping file");
                return Err(InvocationFailure::Backup(e));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;

    struct AlwaysOk;

    #[async_trait]
    impl Invoker for AlwaysOk {
        async fn invoke(&self, _input: &Path) -> Result<(), InvocationFailure> {
            Ok(())
        }
    }

    struct Panics;

    #[async_trait]
    impl Invoker for Panics {
        async fn invoke(&self, input: &Path) -> Result<(), InvocationFailure> {
            if input.ends_with("boom.mp4") {
                panic!("invoker bug");
            }
            Ok(())
        }
    }

    fn item(name: &str) -> WorkItem {
        WorkItem {
            input: PathBuf::from(name),
            bucket: Bucket::None,
            our_artifacts: Vec::new(),
        }
    }

    fn policy(concurrency: usize) -> BatchPolicy {
        BatchPolicy::new(true, false, concurrency, Duration::ZERO, false).unwrap()
    }

    #[tokio::test]
    async fn test_empty_worklist_completes() {
        let runner = BatchRunner::new(Arc::new(AlwaysOk), policy(2));
        let mut events = runner.events().subscribe();
        let outcome = runner.run(Uuid::new_v4(), Vec::new()).await;

        assert!(outcome.results.is_empty());
        assert!(matches!(events.recv().await.unwrap(), BatchEvent::RunStarted { total: 0, .. }));
        assert!(matches!(
            events.recv().await.unwrap(),
            BatchEvent::RunCompleted { attempted: 0, .. }
        ));
    }

    #[tokio::test]
    async fn test_panicking_invoker_is_one_failure() {
        let runner = BatchRunner::new(Arc::new(Panics), policy(2));
        let outcome = runner
            .run(Uuid::new_v4(), vec![item("a.mp4"), item("boom.mp4"), item("c.mp4")])
            .await;

        assert_eq!(outcome.results.len(), 3);
        let boom = outcome
            .results
            .iter()
            .find(|r| r.input.ends_with("boom.mp4"))
            .unwrap();
        assert_eq!(boom.status, JobStatus::Failed(InvocationFailure::Panicked));
        assert_eq!(outcome.results.iter().filter(|r| r.succeeded()).count(), 2);
    }

    #[tokio::test]
    async fn test_backup_only_for_our_artifacts_when_enabled() {
        let dir = tempfile::TempDir::new().unwrap();
        let artifact = dir.path().join("a.funscript");
        std::fs::write(&artifact, r#"{"author": "fsgen"}"#).unwrap();

        let mut stale = item("a.mp4");
        stale.bucket = Bucket::Stale;
        stale.our_artifacts = vec![artifact.clone()];

        backup_before_reprocess(&stale, false).await.unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        backup_before_reprocess(&stale, true).await.unwrap();
        let backups: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".funscript.bak"))
            .collect();
        assert_eq!(backups.len(), 1);
    }

    #[tokio::test]
    async fn test_backup_failure_skips_file() {
        let mut current = item("gone.mp4");
        current.bucket = Bucket::Current;
        current.our_artifacts = vec![PathBuf::from("/nonexistent/dir/gone.funscript")];
        assert!(matches!(
            backup_before_reprocess(&current, true).await,
            Err(InvocationFailure::Backup(_))
        ));
    }
}
