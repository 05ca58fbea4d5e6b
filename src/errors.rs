//! Typed error hierarchy for the audit engine.
//!
//! Three enums cover the failure surfaces that reach a caller:
//! - `GraphError`: registry validation and phase planning failures (fatal)
//! - `ConfigError`: out-of-range engine configuration
//! - `EngineError`: everything `AuditEngine::run` can return
//!
//! Task execution failures are not errors here; they are recorded as
//! [`ErrorInfo`](crate::audit::ErrorInfo) on the failed audit's result.

use thiserror::Error;

/// Errors raised while building the audit dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("Duplicate audit id: {id}")]
    DuplicateAudit { id: String },

    #[error("Unknown dependency '{dependency}' in audit '{audit}': no such audit is registered")]
    UnknownDependency { audit: String, dependency: String },

    #[error("Cycle detected in audit dependencies: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("Excluded audit '{id}' is not registered")]
    UnknownExclusion { id: String },
}

impl GraphError {
    /// Ids named by this error, in the order they appear in the message.
    pub fn audit_ids(&self) -> Vec<&str> {
        match self {
            Self::DuplicateAudit { id } | Self::UnknownExclusion { id } => vec![id.as_str()],
            Self::UnknownDependency { audit, dependency } => {
                vec![audit.as_str(), dependency.as_str()]
            }
            Self::CyclicDependency { cycle } => cycle.iter().map(String::as_str).collect(),
        }
    }
}

/// Invalid engine configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("concurrency_cap must be greater than zero")]
    ZeroConcurrency,

    #[error("concurrency_cap {cap} exceeds the maximum of {max}")]
    ConcurrencyTooLarge { cap: usize, max: usize },

    #[error("phase_effort_budget_hours must be a positive number, got {0}")]
    InvalidEffortBudget(f64),

    #[error("wall_clock_budget_ms must be greater than zero")]
    ZeroWallClockBudget,

    #[error("correlation_threshold must be within 0..=1, got {0}")]
    InvalidCorrelationThreshold(f64),

    #[error("team_hours_per_week must be a positive number, got {0}")]
    InvalidTeamCapacity(f64),

    #[error("event_buffer must be greater than zero")]
    ZeroEventBuffer,

    #[error("event_buffer {size} exceeds the maximum of {max}")]
    EventBufferTooLarge { size: usize, max: usize },

    #[error("Invalid value '{value}' for {key}")]
    InvalidEnvOverride { key: String, value: String },
}

/// Errors returned by a pipeline run.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid pipeline state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    /// Whether the run failed because the registry itself is malformed.
    pub fn is_graph_error(&self) -> bool {
        matches!(self, Self::Graph(_))
    }
}
