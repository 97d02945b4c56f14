//! Linear stage chain for one invocation
//!
//! Every stage runs on its own blocking thread. Stages are joined by
//! bounded channels, so a full channel blocks the stage feeding it and the
//! producer can never run more than a few batches ahead of the slowest
//! stage. The sink runs on the calling task and sees tasks in the order
//! the producer emitted them.

use crate::error::PipelineError;
use crate::stage::{StageReport, StageRunner, StageWorker};
use crate::task::PipelineTask;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Default capacity of each inter-stage channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 32;

/// Type-erased stage so heterogeneous workers can share one chain
trait ChainStage: Send {
    fn stage_name(&self) -> String;
    fn batch_size(&self) -> usize;
    fn run_boxed(
        self: Box<Self>,
        upstream: mpsc::Receiver<PipelineTask>,
        downstream: mpsc::Sender<PipelineTask>,
        terminal: bool,
        abort_on_batch_failure: bool,
    ) -> Result<StageReport, PipelineError>;
}

impl<W: StageWorker> ChainStage for W {
    fn stage_name(&self) -> String {
        self.name().to_string()
    }

    fn batch_size(&self) -> usize {
        self.max_batch_size()
    }

    fn run_boxed(
        self: Box<Self>,
        upstream: mpsc::Receiver<PipelineTask>,
        downstream: mpsc::Sender<PipelineTask>,
        terminal: bool,
        abort_on_batch_failure: bool,
    ) -> Result<StageReport, PipelineError> {
        StageRunner::new(*self)?
            .terminal(terminal)
            .abort_on_batch_failure(abort_on_batch_failure)
            .run(upstream, downstream)
    }
}

/// Summary of one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineSummary {
    /// Tasks emitted by the source
    pub produced: usize,
    /// Tasks that reached the sink
    pub delivered: usize,
    pub finished: usize,
    pub failed: usize,
    /// Per-stage counters, in chain order
    pub stages: Vec<StageReport>,
}

/// Builder for [`Pipeline`]
pub struct PipelineBuilder {
    stages: Vec<Box<dyn ChainStage>>,
    channel_capacity: usize,
    abort_on_batch_failure: bool,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            abort_on_batch_failure: false,
        }
    }

    /// Append a stage to the end of the chain
    pub fn stage<W: StageWorker>(mut self, worker: W) -> Self {
        self.stages.push(Box::new(worker));
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Abort the whole invocation on the first failed batch instead of
    /// marking that batch's tasks failed and carrying on
    pub fn abort_on_batch_failure(mut self, abort: bool) -> Self {
        self.abort_on_batch_failure = abort;
        self
    }

    pub fn build(self) -> Result<Pipeline, PipelineError> {
        if self.stages.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "pipeline needs at least one stage".to_string(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(PipelineError::InvalidConfig(
                "channel capacity must be at least 1".to_string(),
            ));
        }
        if let Some(stage) = self.stages.iter().find(|s| s.batch_size() == 0) {
            return Err(PipelineError::InvalidConfig(format!(
                "stage '{}' has max_batch_size 0",
                stage.stage_name()
            )));
        }

        Ok(Pipeline {
            stages: self.stages,
            channel_capacity: self.channel_capacity,
            abort_on_batch_failure: self.abort_on_batch_failure,
        })
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Ready-to-run stage chain
pub struct Pipeline {
    stages: Vec<Box<dyn ChainStage>>,
    channel_capacity: usize,
    abort_on_batch_failure: bool,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Stage names in chain order
    pub fn stage_names(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.stage_name()).collect()
    }

    /// Push every task from `source` through the chain, handing each task
    /// to `sink` as it leaves the terminal stage.
    ///
    /// Returns once every stage has drained and exited. A stage error or
    /// panic is reported after the remaining stages have shut down.
    pub async fn run<S, F>(self, source: S, mut sink: F) -> Result<PipelineSummary, PipelineError>
    where
        S: IntoIterator<Item = PipelineTask>,
        S::IntoIter: Send + 'static,
        F: FnMut(PipelineTask),
    {
        let capacity = self.channel_capacity;
        let abort = self.abort_on_batch_failure;
        let last = self.stages.len() - 1;
        info!(
            stages = ?self.stage_names(),
            channel_capacity = capacity,
            "Pipeline starting"
        );

        let (source_tx, source_rx) = mpsc::channel(capacity);
        let source = source.into_iter();
        let producer = tokio::task::spawn_blocking(move || {
            let mut produced = 0usize;
            for task in source {
                if source_tx.blocking_send(task).is_err() {
                    warn!(produced, "First stage closed, stopping task production");
                    break;
                }
                produced += 1;
            }
            produced
        });

        let mut upstream = source_rx;
        let mut handles = Vec::with_capacity(self.stages.len());
        for (position, stage) in self.stages.into_iter().enumerate() {
            let (tx, next_rx) = mpsc::channel(capacity);
            let rx = std::mem::replace(&mut upstream, next_rx);
            let name = stage.stage_name();
            let terminal = position == last;
            let handle = tokio::task::spawn_blocking(move || {
                stage.run_boxed(rx, tx, terminal, abort)
            });
            handles.push((name, handle));
        }

        let mut summary = PipelineSummary::default();
        let mut last_index: Option<u64> = None;
        while let Some(task) = upstream.recv().await {
            if last_index.is_some_and(|prev| task.index() <= prev) {
                warn!(index = task.index(), previous = ?last_index, "Task reached sink out of order");
            }
            last_index = Some(task.index());

            summary.delivered += 1;
            if task.is_finished() {
                summary.finished += 1;
            } else if task.is_failed() {
                summary.failed += 1;
            }
            sink(task);
        }

        let mut first_error = None;
        match producer.await {
            Ok(produced) => summary.produced = produced,
            Err(_) => {
                first_error.get_or_insert(PipelineError::ProducerPanicked);
            }
        }

        for (name, handle) in handles {
            match handle.await {
                Ok(Ok(report)) => summary.stages.push(report),
                Ok(Err(err)) => {
                    warn!(stage = %name, error = %err, "Stage exited with error");
                    first_error.get_or_insert(err);
                }
                Err(_) => {
                    warn!(stage = %name, "Stage panicked");
                    first_error.get_or_insert(PipelineError::StagePanicked(name));
                }
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }

        debug!(
            produced = summary.produced,
            delivered = summary.delivered,
            failed = summary.failed,
            "Pipeline complete"
        );
        Ok(summary)
    }

    /// Run the chain and collect every delivered task
    pub async fn collect<S>(
        self,
        source: S,
    ) -> Result<(Vec<PipelineTask>, PipelineSummary), PipelineError>
    where
        S: IntoIterator<Item = PipelineTask>,
        S::IntoIter: Send + 'static,
    {
        let mut tasks = Vec::new();
        let summary = self.run(source, |task| tasks.push(task)).await?;
        Ok((tasks, summary))
    }
}
