//! Replacement policy and worklist construction

use crate::classify::{Bucket, Buckets};
use crate::error::BatchError;
use std::path::PathBuf;
use std::time::Duration;

/// Validated policy for one batch run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPolicy {
    replace_outdated: bool,
    replace_up_to_date: bool,
    worker_concurrency: usize,
    stagger: Duration,
    backup_existing: bool,
}

impl BatchPolicy {
    /// # Errors
    ///
    /// [`BatchError::InvalidConfig`] when `worker_concurrency` is zero
    pub fn new(
        replace_outdated: bool,
        replace_up_to_date: bool,
        worker_concurrency: usize,
        stagger: Duration,
        backup_existing: bool,
    ) -> Result<Self, BatchError> {
        if worker_concurrency == 0 {
            return Err(BatchError::InvalidConfig(
                "worker_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            replace_outdated,
            replace_up_to_date,
            worker_concurrency,
            stagger,
            backup_existing,
        })
    }

    pub fn replace_outdated(&self) -> bool {
        self.replace_outdated
    }

    pub fn replace_up_to_date(&self) -> bool {
        self.replace_up_to_date
    }

    pub fn worker_concurrency(&self) -> usize {
        self.worker_concurrency
    }

    /// Minimum delay between two invocation starts
    pub fn stagger(&self) -> Duration {
        self.stagger
    }

    pub fn backup_existing(&self) -> bool {
        self.backup_existing
    }

    /// Whether videos in `bucket` get (re)processed under this policy
    pub fn selects(&self, bucket: Bucket) -> bool {
        match bucket {
            Bucket::None => true,
            Bucket::Stale => self.replace_outdated,
            Bucket::Current => self.replace_up_to_date,
            Bucket::Foreign => false,
        }
    }
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            replace_outdated: true,
            replace_up_to_date: false,
            worker_concurrency: 2,
            stagger: Duration::from_millis(100),
            backup_existing: false,
        }
    }
}

/// One video selected for processing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub input: PathBuf,
    pub bucket: Bucket,
    /// Our existing artifacts, backed up first when the policy asks for it
    pub our_artifacts: Vec<PathBuf>,
}

/// Videos to process: `none`, then `stale` if replacing outdated artifacts,
/// then `current` if replacing up-to-date ones. Foreign artifacts are never
/// replaced. Order within each bucket is kept.
pub fn build_worklist(buckets: &Buckets, policy: &BatchPolicy) -> Vec<WorkItem> {
    [Bucket::None, Bucket::Stale, Bucket::Current]
        .into_iter()
        .filter(|bucket| policy.selects(*bucket))
        .flat_map(|bucket| buckets.get(bucket).iter())
        .map(|classified| WorkItem {
            input: classified.video.clone(),
            bucket: classified.bucket,
            our_artifacts: classified.our_artifacts.clone(),
        })
        .collect()
}
