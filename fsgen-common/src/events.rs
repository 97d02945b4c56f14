//! Batch run events and the broadcast EventBus
//!
//! The orchestrator emits one event per lifecycle step of a run. Callers
//! subscribe to render progress however they like (log lines, a terminal
//! dashboard, a GUI) without the orchestrator knowing about any of them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Progress state at a completion event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Invocations finished (success or failure)
    pub completed: usize,
    /// Invocations in the worklist
    pub total: usize,
    /// Wall-clock time since the run started (seconds)
    pub total_elapsed_secs: f64,
    /// Mean wall time of completed invocations (seconds)
    pub average_secs: f64,
    /// Mean wall time divided by the concurrency level (seconds)
    pub average_parallel_secs: f64,
    /// Inputs still running, in start order
    pub in_flight: Vec<PathBuf>,
}

/// fsgen batch events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BatchEvent {
    /// Worklist built, pool about to start
    RunStarted {
        run_id: Uuid,
        total: usize,
        concurrency: usize,
        timestamp: DateTime<Utc>,
    },

    /// An invocation was launched
    FileStarted {
        run_id: Uuid,
        file: PathBuf,
        timestamp: DateTime<Utc>,
    },

    /// An invocation finished
    FileCompleted {
        run_id: Uuid,
        file: PathBuf,
        succeeded: bool,
        /// Failure description, if any
        failure: Option<String>,
        elapsed_secs: f64,
        progress: ProgressSnapshot,
        timestamp: DateTime<Utc>,
    },

    /// Every submitted invocation has finished
    RunCompleted {
        run_id: Uuid,
        attempted: usize,
        succeeded: usize,
        failed: usize,
        total_elapsed_secs: f64,
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast channel for [`BatchEvent`]s
///
/// Cloning is cheap; all clones share one channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BatchEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring the case where nobody is listening
    pub fn emit_lossy(&self, event: BatchEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
