//! Error types for fsgen-pipeline

use thiserror::Error;

/// Failure of one stage transform call.
///
/// Applies to every task of the batch the call was made for.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StageError {
    /// The transform itself failed
    #[error("transform failed: {0}")]
    Transform(String),

    /// The transform returned a different number of outputs than inputs
    #[error("transform returned {actual} outputs for {expected} inputs")]
    OutputCount { expected: usize, actual: usize },
}

/// Detection model errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DetectorError {
    /// Model or device could not be initialized
    #[error("detector initialization failed: {0}")]
    Init(String),

    /// Inference call failed
    #[error("inference failed: {0}")]
    Inference(String),
}

impl From<DetectorError> for StageError {
    fn from(err: DetectorError) -> Self {
        StageError::Transform(err.to_string())
    }
}

/// Pipeline-level errors
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid pipeline or stage configuration
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// A batch failed and the pipeline is configured to abort on batch failure
    #[error("stage '{stage}' aborted after batch failure: {source}")]
    BatchFailed {
        stage: String,
        #[source]
        source: StageError,
    },

    /// A stage worker thread panicked
    #[error("stage '{0}' panicked")]
    StagePanicked(String),

    /// The task producer panicked
    #[error("task producer panicked")]
    ProducerPanicked,

    /// Detector could not be acquired for the invocation
    #[error(transparent)]
    Detector(#[from] DetectorError),
}
