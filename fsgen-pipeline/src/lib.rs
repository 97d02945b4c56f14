//! fsgen-pipeline - per-invocation staged worker pipeline
//!
//! One invocation turns one video into per-frame [`PipelineTask`]s and moves
//! them through a strict linear chain of stages:
//!
//! ```text
//! [Decoder] --task--> [Stage 1] --task--> ... --task--> [Stage N] --task--> [Sink]
//! ```
//!
//! - Each arrow is a bounded channel, so a slow stage applies backpressure
//!   to everything upstream of it.
//! - Each stage is a [`StageWorker`] driven by the generic [`StageRunner`],
//!   which batches inputs, calls the stage transform once per batch, and
//!   hands results back to the originating tasks in arrival order.
//! - [`DetectionStage`] is the throughput-oriented stage: fixed-size frame
//!   batches, padded at end of stream, fed to an injected [`Detector`].
//!
//! The decoder, the detection model and artifact synthesis live outside this
//! crate; they plug in as the task source, a [`DetectorFactory`] and the sink.

pub mod chain;
pub mod detection;
pub mod error;
pub mod stage;
pub mod task;

pub use chain::{Pipeline, PipelineBuilder, PipelineSummary};
pub use detection::{
    BoundingBox, DetectionConfig, DetectionStage, Detector, DetectorFactory, FrameDetections,
    TrackParams, TrackedBox, DETECTION_STAGE,
};
pub use error::{DetectorError, PipelineError, StageError};
pub use stage::{Batch, Padding, SealedBatch, StageReport, StageRunner, StageState, StageWorker};
pub use task::{Frame, PipelineTask, TaskStatus};
