//! Per-frame unit of work
//!
//! A [`PipelineTask`] is created by the decoder, moved by value from stage
//! to stage, and consumed by the sink. Only the stage currently holding a
//! task can touch it; ownership moves with the channel send.

use crate::detection::FrameDetections;
use serde::{Deserialize, Serialize};

/// Decoded video frame (packed RGB, row-major)
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self { width, height, data }
    }
}

/// Lifecycle of a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Still moving through the chain
    InFlight,
    /// Passed through the terminal stage without failure
    Finished,
    /// A stage transform failed for the batch this task was part of
    Failed { stage: String, error: String },
}

/// One frame's worth of work
#[derive(Debug, Clone)]
pub struct PipelineTask {
    index: u64,
    /// Frame produced by the decoder, consumed by frame-based stages
    pub rendered_frame: Option<Frame>,
    /// Detection/tracking result attached by the detection stage
    pub detection: Option<FrameDetections>,
    durations: Vec<(String, f64)>,
    status: TaskStatus,
}

impl PipelineTask {
    /// New task carrying a decoded frame
    pub fn new(index: u64, frame: Frame) -> Self {
        Self {
            index,
            rendered_frame: Some(frame),
            detection: None,
            durations: Vec::new(),
            status: TaskStatus::InFlight,
        }
    }

    /// New task without a frame (decode failure for this index)
    pub fn without_frame(index: u64) -> Self {
        Self {
            index,
            rendered_frame: None,
            detection: None,
            durations: Vec::new(),
            status: TaskStatus::InFlight,
        }
    }

    /// Frame sequence number assigned by the decoder
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn status(&self) -> &TaskStatus {
        &self.status
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, TaskStatus::Failed { .. })
    }

    pub fn is_finished(&self) -> bool {
        self.status == TaskStatus::Finished
    }

    /// Mark the task failed at `stage`. The first failure wins.
    pub fn fail(&mut self, stage: &str, error: impl Into<String>) {
        if !self.is_failed() {
            self.status = TaskStatus::Failed {
                stage: stage.to_string(),
                error: error.into(),
            };
        }
    }

    /// Mark the task finished unless it already failed
    pub fn finish(&mut self) {
        if self.status == TaskStatus::InFlight {
            self.status = TaskStatus::Finished;
        }
    }

    /// Record time spent in `stage` (seconds).
    ///
    /// Entries are only ever appended, one per stage visit.
    pub fn record_duration(&mut self, stage: &str, secs: f64) {
        self.durations.push((stage.to_string(), secs));
    }

    /// Time recorded for `stage`, summed over visits
    pub fn duration(&self, stage: &str) -> Option<f64> {
        let mut total = None;
        for (name, secs) in &self.durations {
            if name == stage {
                *total.get_or_insert(0.0) += secs;
            }
        }
        total
    }

    /// All recorded (stage, seconds) entries in recording order
    pub fn durations(&self) -> &[(String, f64)] {
        &self.durations
    }
}
