//! Pipeline lifecycle state and timing helpers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::watch;

use crate::errors::EngineError;

/// Lifecycle of one pipeline run.
///
/// `Idle → GraphBuilt → Running(0) → … → Running(n) → Synthesizing → Done`.
/// Only a graph construction error moves a run to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineState {
    #[default]
    Idle,
    GraphBuilt,
    Running {
        phase: usize,
    },
    Synthesizing,
    Done,
    Failed,
}

impl PipelineState {
    /// Check if the run reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: &PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (Idle, GraphBuilt | Failed) => true,
            (GraphBuilt, Running { phase: 0 } | Synthesizing) => true,
            (Running { phase: a }, Running { phase: b }) => b > a,
            (Running { .. }, Synthesizing) => true,
            (Synthesizing, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::GraphBuilt => write!(f, "graph_built"),
            Self::Running { phase } => write!(f, "running({})", phase),
            Self::Synthesizing => write!(f, "synthesizing"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Publishes validated state transitions on a watch channel.
#[derive(Debug)]
pub struct StateTracker {
    tx: watch::Sender<PipelineState>,
}

impl StateTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(PipelineState::Idle);
        Self { tx }
    }

    pub fn current(&self) -> PipelineState {
        *self.tx.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<PipelineState> {
        self.tx.subscribe()
    }

    /// Return to `Idle` ahead of a new run.
    pub fn reset(&self) {
        self.tx.send_replace(PipelineState::Idle);
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow.
    pub fn transition(&self, next: PipelineState) -> Result<(), EngineError> {
        let current = self.current();
        if !current.can_transition_to(&next) {
            return Err(EngineError::InvalidTransition {
                from: current.to_string(),
                to: next.to_string(),
            });
        }
        tracing::debug!(from = %current, to = %next, "pipeline state");
        self.tx.send_replace(next);
        Ok(())
    }
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks execution timing.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionTimer {
    start: Instant,
}

impl ExecutionTimer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn started_at(&self) -> Instant {
        self.start
    }
}

/// Per-phase execution record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSummary {
    pub phase: usize,
    pub audit_ids: Vec<String>,
    pub succeeded: usize,
    pub failed: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub abandoned: Vec<String>,
    /// Wall-clock time from launch to the last resolution
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

impl PhaseSummary {
    /// Check if every audit in the phase ran and succeeded.
    pub fn all_success(&self) -> bool {
        self.failed == 0 && self.skipped.is_empty() && self.abandoned.is_empty()
    }
}

/// Serde helpers for Duration serialization as milliseconds.
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
