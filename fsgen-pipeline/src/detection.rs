//! Batched object detection/tracking stage
//!
//! Frames are gathered into fixed-size batches and handed to a
//! tracking-capable [`Detector`]. The final partial batch is padded by
//! repeating its last frame, since detectors run fastest at a constant
//! batch shape; results for padding frames are discarded.
//!
//! The detector handle is acquired from a [`DetectorFactory`] when the
//! stage is built and released when the stage is dropped, on every exit
//! path of the invocation.

use crate::error::{DetectorError, StageError};
use crate::stage::{Padding, StageWorker};
use crate::task::{Frame, PipelineTask};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Stage name and duration key
pub const DETECTION_STAGE: &str = "detection";

/// Axis-aligned box in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

/// One detected object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedBox {
    /// Tracker identity, stable across frames while the track persists
    pub track_id: Option<u64>,
    pub class_id: u32,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Detection/tracking result for one frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameDetections {
    pub boxes: Vec<TrackedBox>,
}

/// Per-call tracking parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackParams {
    /// Minimum confidence for a detection to be reported
    pub confidence: f32,
    /// Keep tracker state across calls
    pub persist: bool,
}

/// Detection/tracking model handle
pub trait Detector: Send {
    /// Run detection with tracking over `frames`, one result per frame
    fn track(
        &mut self,
        frames: &[Frame],
        params: &TrackParams,
    ) -> Result<Vec<FrameDetections>, DetectorError>;

    /// Free model/device resources
    fn release(&mut self) {}
}

/// Builds a detector for one invocation
pub trait DetectorFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn Detector>, DetectorError>;
}

impl<F> DetectorFactory for F
where
    F: Fn() -> Result<Box<dyn Detector>, DetectorError> + Send + Sync,
{
    fn create(&self) -> Result<Box<dyn Detector>, DetectorError> {
        self()
    }
}

/// Fixed detection stage configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionConfig {
    batch_size: usize,
    confidence_threshold: f32,
    persist_tracks: bool,
}

impl DetectionConfig {
    pub fn new(
        batch_size: usize,
        confidence_threshold: f32,
        persist_tracks: bool,
    ) -> Result<Self, DetectorError> {
        if batch_size == 0 {
            return Err(DetectorError::Init(
                "detection batch size must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&confidence_threshold) {
            return Err(DetectorError::Init(format!(
                "confidence threshold {} outside [0, 1]",
                confidence_threshold
            )));
        }
        Ok(Self {
            batch_size,
            confidence_threshold,
            persist_tracks,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    pub fn persist_tracks(&self) -> bool {
        self.persist_tracks
    }

    fn params(&self) -> TrackParams {
        TrackParams {
            confidence: self.confidence_threshold,
            persist: self.persist_tracks,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            batch_size: 8,
            confidence_threshold: 0.3,
            persist_tracks: true,
        }
    }
}

/// Stage running a [`Detector`] over rendered frames
pub struct DetectionStage {
    detector: Box<dyn Detector>,
    config: DetectionConfig,
}

impl DetectionStage {
    /// Acquire a detector from `factory` for this invocation
    pub fn acquire(
        factory: &dyn DetectorFactory,
        config: DetectionConfig,
    ) -> Result<Self, DetectorError> {
        let detector = factory.create()?;
        info!(
            batch_size = config.batch_size,
            confidence = config.confidence_threshold,
            persist = config.persist_tracks,
            "Detector acquired"
        );
        Ok(Self { detector, config })
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }
}

impl Drop for DetectionStage {
    fn drop(&mut self) {
        self.detector.release();
        debug!("Detector released");
    }
}

impl StageWorker for DetectionStage {
    type Input = Frame;
    type Output = FrameDetections;

    fn name(&self) -> &str {
        DETECTION_STAGE
    }

    fn max_batch_size(&self) -> usize {
        self.config.batch_size
    }

    fn padding(&self) -> Padding {
        Padding::RepeatLast
    }

    fn take_input(&mut self, task: &mut PipelineTask) -> Option<Frame> {
        task.rendered_frame.take()
    }

    fn transform(&mut self, frames: &[Frame]) -> Result<Vec<FrameDetections>, StageError> {
        let params = self.config.params();
        Ok(self.detector.track(frames, &params)?)
    }

    fn attach(&mut self, task: &mut PipelineTask, output: FrameDetections) {
        task.detection = Some(output);
    }

    fn release(&mut self, task: &mut PipelineTask, frame: Frame) {
        // Later stages still render from the frame
        task.rendered_frame = Some(frame);
    }
}
