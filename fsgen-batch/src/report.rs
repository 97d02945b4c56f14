//! Per-file outcomes of a batch run

use crate::classify::{Bucket, Buckets};
use crate::runner::{JobStatus, RunOutcome};
use fsgen_common::time::format_hms;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// What happened to one scanned video
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Disposition {
    /// Invocation succeeded
    Processed,
    /// Invocation attempted and failed
    Failed(String),
    /// Our current artifact kept
    SkippedCurrent,
    /// Our outdated artifact kept (outdated replacement disabled)
    SkippedStale,
    /// Someone else's artifact, never touched
    SkippedForeign,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileOutcome {
    pub input: PathBuf,
    pub bucket: Bucket,
    pub disposition: Disposition,
    /// Invocation wall time, for attempted files
    pub elapsed_secs: Option<f64>,
}

/// Outcome of every scanned video in one run
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    /// Scan order within bucket order (none, current, stale, foreign)
    pub files: Vec<FileOutcome>,
    pub total_elapsed_secs: f64,
    pub peak_in_flight: usize,
}

impl BatchReport {
    /// Combine classification and job results into one outcome per video
    pub fn assemble(run_id: Uuid, buckets: &Buckets, outcome: &RunOutcome) -> Self {
        let results: HashMap<&PathBuf, _> =
            outcome.results.iter().map(|r| (&r.input, r)).collect();

        let mut files = Vec::with_capacity(buckets.len());
        for bucket in [Bucket::None, Bucket::Current, Bucket::Stale, Bucket::Foreign] {
            for classified in buckets.get(bucket) {
                let outcome = match results.get(&classified.video) {
                    Some(result) => FileOutcome {
                        input: classified.video.clone(),
                        bucket,
                        disposition: match &result.status {
                            JobStatus::Succeeded => Disposition::Processed,
                            JobStatus::Failed(failure) => Disposition::Failed(failure.to_string()),
                        },
                        elapsed_secs: Some(result.elapsed.as_secs_f64()),
                    },
                    None => FileOutcome {
                        input: classified.video.clone(),
                        bucket,
                        disposition: match bucket {
                            Bucket::Current => Disposition::SkippedCurrent,
                            Bucket::Stale => Disposition::SkippedStale,
                            Bucket::Foreign => Disposition::SkippedForeign,
                            Bucket::None => Disposition::Failed("not attempted".to_string()),
                        },
                        elapsed_secs: None,
                    },
                };
                files.push(outcome);
            }
        }

        Self {
            run_id,
            files,
            total_elapsed_secs: outcome.total_elapsed.as_secs_f64(),
            peak_in_flight: outcome.peak_in_flight,
        }
    }

    pub fn attempted(&self) -> usize {
        self.files.iter().filter(|f| f.elapsed_secs.is_some()).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(|d| *d == Disposition::Processed)
    }

    pub fn failed(&self) -> usize {
        self.count(|d| matches!(d, Disposition::Failed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|d| {
            matches!(
                d,
                Disposition::SkippedCurrent | Disposition::SkippedStale | Disposition::SkippedForeign
            )
        })
    }

    fn count(&self, pred: impl Fn(&Disposition) -> bool) -> usize {
        self.files.iter().filter(|f| pred(&f.disposition)).count()
    }

    /// A run fails only when files were attempted and none succeeded
    pub fn is_failure(&self) -> bool {
        self.attempted() > 0 && self.succeeded() == 0
    }

    pub fn outcome_of(&self, input: &std::path::Path) -> Option<&Disposition> {
        self.files
            .iter()
            .find(|f| f.input == input)
            .map(|f| &f.disposition)
    }

    /// Log the final tally and every failed file
    pub fn log_summary(&self) {
        for file in &self.files {
            if let Disposition::Failed(reason) = &file.disposition {
                warn!(run_id = %self.run_id, file = %file.input.display(), %reason, "File failed");
            }
        }
        info!(
            run_id = %self.run_id,
            scanned = self.files.len(),
            attempted = self.attempted(),
            succeeded = self.succeeded(),
            failed = self.failed(),
            skipped = self.skipped(),
            total_time = %format_hms(Duration::from_secs_f64(self.total_elapsed_secs)),
            "Batch summary"
        );
    }
}
