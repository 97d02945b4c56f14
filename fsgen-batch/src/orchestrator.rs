//! Folder-level orchestration: scan, classify, select, run, report

use crate::classify::{Buckets, Classifier, DirectoryOutput, SiblingOutput};
use crate::config::Settings;
use crate::error::BatchError;
use crate::invoker::Invoker;
use crate::report::BatchReport;
use crate::runner::BatchRunner;
use crate::scanner::VideoScanner;
use crate::worklist::build_worklist;
use fsgen_common::events::EventBus;
use fsgen_common::ArtifactInspector;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub struct BatchOrchestrator {
    scanner: VideoScanner,
    classifier: Classifier,
    runner: BatchRunner,
}

impl BatchOrchestrator {
    pub fn new(scanner: VideoScanner, classifier: Classifier, runner: BatchRunner) -> Self {
        Self {
            scanner,
            classifier,
            runner,
        }
    }

    /// Wire up an orchestrator from resolved settings
    pub fn from_settings(settings: &Settings, invoker: Arc<dyn Invoker>) -> Self {
        let scanner = VideoScanner::new().recursive(settings.recursive);

        let mut classifier = Classifier::new(
            ArtifactInspector::for_current_build(),
            Box::new(SiblingOutput::new(settings.extension.clone())),
        );
        if let Some(dir) = &settings.output_dir {
            classifier = classifier.with_secondary(Box::new(DirectoryOutput::new(
                dir.clone(),
                settings.extension.clone(),
            )));
        }

        let runner = BatchRunner::new(invoker, settings.policy.clone());
        Self::new(scanner, classifier, runner)
    }

    /// Publish run progress on `events`
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.runner = self.runner.with_events(events);
        self
    }

    pub fn events(&self) -> &EventBus {
        self.runner.events()
    }

    /// Scan and classify without running anything
    pub fn classify_folder(&self, folder: &Path) -> Result<Buckets, BatchError> {
        let videos = self.scanner.scan(folder)?;
        info!("Found {} file(s) in folder", videos.len());
        Ok(self.classifier.classify(&videos))
    }

    /// Process every video in `folder` that the policy selects
    pub async fn run_folder(&self, folder: &Path) -> Result<BatchReport, BatchError> {
        let run_id = Uuid::new_v4();
        let policy = self.runner.policy();
        info!(
            run_id = %run_id,
            folder = %folder.display(),
            replace_outdated = policy.replace_outdated(),
            replace_up_to_date = policy.replace_up_to_date(),
            worker_concurrency = policy.worker_concurrency(),
            "Processing folder"
        );

        let buckets = self.classify_folder(folder)?;
        buckets.log_summary(policy);

        let worklist = build_worklist(&buckets, policy);
        let outcome = self.runner.run(run_id, worklist).await;

        let report = BatchReport::assemble(run_id, &buckets, &outcome);
        report.log_summary();
        Ok(report)
    }
}
