//! Generic batching stage worker
//!
//! A stage consumes tasks from its upstream channel, groups their inputs
//! into batches of at most [`StageWorker::max_batch_size`], calls
//! [`StageWorker::transform`] once per batch, attaches each output to the
//! task it came from and forwards the tasks downstream in arrival order.
//!
//! # State machine
//!
//! ```text
//! Idle -> Accumulating -> Transforming -> Dispatching -> Accumulating ...
//!                 \                                         |
//!                  `--------- upstream closed -------------> Drained
//! ```
//!
//! - A batch is sealed when it holds `max_batch_size` tasks, or when the
//!   upstream closes with a partial batch pending.
//! - A batch sealed with fewer real inputs than `max_batch_size` is padded
//!   (if the worker asks for it). Padding outputs are discarded.
//! - A task without an input, or one that already failed upstream, is
//!   forwarded without being given to the transform. While a batch is
//!   pending it waits inside the batch so downstream order is preserved,
//!   and it counts toward the batch size so a stage never holds more than
//!   `max_batch_size` tasks.

use crate::error::{PipelineError, StageError};
use crate::task::PipelineTask;
use serde::Serialize;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

/// How a partial batch is brought up to full size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Padding {
    /// Transform the partial batch as-is
    None,
    /// Repeat the last real input until the batch is full
    RepeatLast,
}

/// Stage lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StageState {
    Idle,
    Accumulating,
    Transforming,
    Dispatching,
    Drained,
}

/// One stage of the per-invocation pipeline
pub trait StageWorker: Send + 'static {
    type Input: Clone + Send;
    type Output: Send;

    /// Stage name, used as the duration key and in logs
    fn name(&self) -> &str;

    /// Maximum number of real inputs per transform call (at least 1)
    fn max_batch_size(&self) -> usize;

    fn padding(&self) -> Padding {
        Padding::None
    }

    /// Take this stage's input out of the task. `None` means the task has
    /// nothing for this stage and is passed through.
    fn take_input(&mut self, task: &mut PipelineTask) -> Option<Self::Input>;

    /// Transform one batch. Must return exactly one output per input,
    /// padding included.
    fn transform(&mut self, inputs: &[Self::Input]) -> Result<Vec<Self::Output>, StageError>;

    /// Attach an output to the task its input came from
    fn attach(&mut self, task: &mut PipelineTask, output: Self::Output);

    /// Hand a consumed input back to its task after the batch completed
    /// (successfully or not). Dropped by default.
    fn release(&mut self, _task: &mut PipelineTask, _input: Self::Input) {}
}

// ============================================================================
// Batch accumulation
// ============================================================================

/// Tasks accumulated for one transform call
pub struct Batch<I> {
    entries: Vec<(PipelineTask, Option<I>)>,
    real: usize,
    capacity: usize,
}

impl<I: Clone> Batch<I> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            real: 0,
            capacity,
        }
    }

    /// Append a task. Tasks without input ride along in order.
    pub fn push(&mut self, task: PipelineTask, input: Option<I>) {
        if input.is_some() {
            self.real += 1;
        }
        self.entries.push((task, input));
    }

    /// Tasks held, including pass-through tasks
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tasks that contributed an input
    pub fn real_len(&self) -> usize {
        self.real
    }

    /// Full once it holds `capacity` tasks, pass-through tasks included
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Split into tasks and transform inputs, padding a partial batch
    pub fn seal(self, padding: Padding) -> SealedBatch<I> {
        let mut tasks = Vec::with_capacity(self.entries.len());
        let mut inputs = Vec::with_capacity(self.capacity);

        for (task, input) in self.entries {
            match input {
                Some(input) => {
                    inputs.push(input);
                    tasks.push((task, true));
                }
                None => tasks.push((task, false)),
            }
        }

        let real = inputs.len();
        if padding == Padding::RepeatLast && real > 0 && real < self.capacity {
            if let Some(last) = inputs.last().cloned() {
                inputs.resize(self.capacity, last);
            }
        }

        SealedBatch {
            tasks,
            inputs,
            real,
        }
    }
}

/// Batch ready for its transform call
pub struct SealedBatch<I> {
    tasks: Vec<(PipelineTask, bool)>,
    inputs: Vec<I>,
    real: usize,
}

impl<I> SealedBatch<I> {
    /// Transform inputs, padding included
    pub fn inputs(&self) -> &[I] {
        &self.inputs
    }

    pub fn real_len(&self) -> usize {
        self.real
    }

    pub fn padded_len(&self) -> usize {
        self.inputs.len() - self.real
    }

    /// Check a transform result against this batch and drop padding outputs
    pub fn accept_outputs<O>(&self, mut outputs: Vec<O>) -> Result<Vec<O>, StageError> {
        if outputs.len() != self.inputs.len() {
            return Err(StageError::OutputCount {
                expected: self.inputs.len(),
                actual: outputs.len(),
            });
        }
        outputs.truncate(self.real);
        Ok(outputs)
    }

    /// Tasks in arrival order (flagged if they contributed an input) and
    /// the real inputs, padding dropped
    pub fn into_parts(mut self) -> (Vec<(PipelineTask, bool)>, Vec<I>) {
        self.inputs.truncate(self.real);
        (self.tasks, self.inputs)
    }
}

// ============================================================================
// Runner
// ============================================================================

/// Counters for one stage run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageReport {
    pub stage: String,
    /// Tasks received from upstream
    pub received: usize,
    /// Transform calls made
    pub batches: usize,
    /// Padding inputs added to partial batches
    pub padded_inputs: usize,
    /// Tasks that got an output attached
    pub processed: usize,
    /// Tasks lacking this stage's input
    pub skipped: usize,
    /// Tasks that arrived already failed
    pub passed_through: usize,
    /// Tasks failed by this stage's transform
    pub failed: usize,
    /// Tasks lost because the downstream channel was closed
    pub forward_failures: usize,
    pub final_state: StageState,
}

impl StageReport {
    fn new(stage: &str) -> Self {
        Self {
            stage: stage.to_string(),
            received: 0,
            batches: 0,
            padded_inputs: 0,
            processed: 0,
            skipped: 0,
            passed_through: 0,
            failed: 0,
            forward_failures: 0,
            final_state: StageState::Idle,
        }
    }
}

/// Drives one [`StageWorker`] between two channels.
///
/// [`StageRunner::run`] blocks; call it from a dedicated thread
/// (`spawn_blocking` or `std::thread`).
pub struct StageRunner<W: StageWorker> {
    worker: W,
    name: String,
    batch_size: usize,
    terminal: bool,
    abort_on_batch_failure: bool,
    report: StageReport,
}

impl<W: StageWorker> StageRunner<W> {
    pub fn new(worker: W) -> Result<Self, PipelineError> {
        let name = worker.name().to_string();
        let batch_size = worker.max_batch_size();
        if batch_size == 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "stage '{}' has max_batch_size 0",
                name
            )));
        }
        Ok(Self {
            worker,
            report: StageReport::new(&name),
            name,
            batch_size,
            terminal: false,
            abort_on_batch_failure: false,
        })
    }

    /// Terminal stages mark successful tasks as finished before forwarding
    pub fn terminal(mut self, terminal: bool) -> Self {
        self.terminal = terminal;
        self
    }

    /// Stop the stage (and so the pipeline) on the first failed batch
    pub fn abort_on_batch_failure(mut self, abort: bool) -> Self {
        self.abort_on_batch_failure = abort;
        self
    }

    pub fn state(&self) -> StageState {
        self.report.final_state
    }

    fn transition(&mut self, next: StageState) {
        trace!(stage = %self.name, from = ?self.report.final_state, to = ?next, "Stage state");
        self.report.final_state = next;
    }

    /// Run until the upstream closes, then drain the pending batch
    pub fn run(
        mut self,
        mut upstream: mpsc::Receiver<PipelineTask>,
        downstream: mpsc::Sender<PipelineTask>,
    ) -> Result<StageReport, PipelineError> {
        debug!(stage = %self.name, batch_size = self.batch_size, "Stage started");
        let mut batch: Batch<W::Input> = Batch::new(self.batch_size);

        while let Some(mut task) = upstream.blocking_recv() {
            if self.report.final_state == StageState::Idle {
                self.transition(StageState::Accumulating);
            }
            self.report.received += 1;

            let input = if task.is_failed() {
                self.report.passed_through += 1;
                None
            } else {
                let input = self.worker.take_input(&mut task);
                if input.is_none() {
                    warn!(stage = %self.name, index = task.index(), "Task has no input for stage, passing through");
                    self.report.skipped += 1;
                }
                input
            };

            if input.is_none() && batch.real_len() == 0 {
                // Nothing pending ahead of it
                self.forward(task, &downstream);
                continue;
            }

            batch.push(task, input);
            if batch.is_full() {
                let full = std::mem::replace(&mut batch, Batch::new(self.batch_size));
                self.process(full, &downstream)?;
            }
        }

        if !batch.is_empty() {
            self.process(batch, &downstream)?;
        }

        self.transition(StageState::Drained);
        debug!(
            stage = %self.name,
            received = self.report.received,
            batches = self.report.batches,
            failed = self.report.failed,
            "Stage drained"
        );
        Ok(self.report)
    }

    fn process(
        &mut self,
        batch: Batch<W::Input>,
        downstream: &mpsc::Sender<PipelineTask>,
    ) -> Result<(), PipelineError> {
        self.transition(StageState::Transforming);
        let sealed = batch.seal(self.worker.padding());
        let real = sealed.real_len();

        let outcome = if real == 0 {
            None
        } else {
            self.report.batches += 1;
            self.report.padded_inputs += sealed.padded_len();
            let start = Instant::now();
            let result = self
                .worker
                .transform(sealed.inputs())
                .and_then(|outputs| sealed.accept_outputs(outputs));
            let per_task = start.elapsed().as_secs_f64() / real as f64;
            Some(result.map(|outputs| (outputs, per_task)))
        };

        self.transition(StageState::Dispatching);
        let (tasks, inputs) = sealed.into_parts();
        let mut inputs = inputs.into_iter();

        let result = match outcome {
            None => {
                for (task, _) in tasks {
                    self.forward(task, downstream);
                }
                Ok(())
            }
            Some(Ok((outputs, per_task))) => {
                let mut outputs = outputs.into_iter();
                for (mut task, has_input) in tasks {
                    if has_input {
                        if let (Some(input), Some(output)) = (inputs.next(), outputs.next()) {
                            self.worker.attach(&mut task, output);
                            self.worker.release(&mut task, input);
                            task.record_duration(&self.name, per_task);
                            self.report.processed += 1;
                        }
                    }
                    self.forward(task, downstream);
                }
                Ok(())
            }
            Some(Err(err)) => {
                error!(stage = %self.name, batch_tasks = real, error = %err, "Batch transform failed");
                let message = err.to_string();
                for (mut task, has_input) in tasks {
                    if has_input {
                        if let Some(input) = inputs.next() {
                            self.worker.release(&mut task, input);
                        }
                        task.fail(&self.name, message.clone());
                        self.report.failed += 1;
                    }
                    self.forward(task, downstream);
                }
                if self.abort_on_batch_failure {
                    Err(PipelineError::BatchFailed {
                        stage: self.name.clone(),
                        source: err,
                    })
                } else {
                    Ok(())
                }
            }
        };

        self.transition(StageState::Accumulating);
        result
    }

    fn forward(&mut self, mut task: PipelineTask, downstream: &mpsc::Sender<PipelineTask>) {
        if self.terminal {
            task.finish();
        }
        let index = task.index();
        if downstream.blocking_send(task).is_err() {
            error!(stage = %self.name, index, "Downstream closed, task dropped");
            self.report.forward_failures += 1;
        }
    }
}
