//! Lifecycle events published while a pipeline runs.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::audit::{AuditResult, ErrorInfo};
use crate::config::MAX_EVENT_BUFFER;
use crate::synthesis::Synthesis;

/// Events emitted during pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// The graph was built and phase 0 is about to start.
    PipelineStarted {
        run_id: String,
        phase_count: usize,
        audit_count: usize,
    },
    /// A phase is about to launch its tasks.
    PhaseStarted {
        phase: usize,
        task_ids: Vec<String>,
    },
    /// A task acquired a slot and is launching.
    TaskStarted {
        id: String,
    },
    /// A task returned output.
    TaskCompleted {
        id: String,
        result: Box<AuditResult>,
    },
    /// A task returned an error or panicked.
    TaskFailed {
        id: String,
        error: ErrorInfo,
    },
    /// Every launched task of a phase resolved and was merged.
    PhaseCompleted {
        phase: usize,
        results: Vec<AuditResult>,
    },
    /// The wall-clock budget ran out.
    PipelineTruncated {
        completed: Vec<String>,
        skipped: Vec<String>,
        abandoned: Vec<String>,
    },
    /// Synthesis finished.
    PipelineCompleted {
        synthesis: Box<Synthesis>,
    },
}

impl PipelineEvent {
    /// Event name in `scope:action` form, for log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PipelineStarted { .. } => "pipeline:started",
            Self::PhaseStarted { .. } => "phase:started",
            Self::TaskStarted { .. } => "task:started",
            Self::TaskCompleted { .. } => "task:completed",
            Self::TaskFailed { .. } => "task:failed",
            Self::PhaseCompleted { .. } => "phase:completed",
            Self::PipelineTruncated { .. } => "pipeline:truncated",
            Self::PipelineCompleted { .. } => "pipeline:completed",
        }
    }
}

/// Fan-out of [`PipelineEvent`]s to any number of subscribers.
///
/// Publishing never blocks and never fails; with no subscribers events are
/// dropped. Slow subscribers observe `RecvError::Lagged`.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.clamp(1, MAX_EVENT_BUFFER));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: PipelineEvent) {
        tracing::trace!(event = event.name(), "pipeline event");
        // Err only means nobody is listening.
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
