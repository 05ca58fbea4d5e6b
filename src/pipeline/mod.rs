//! Phase-by-phase execution of an audit registry.
//!
//! ## Architecture
//!
//! ```text
//! AuditEngine::run
//!   ├── TaskRegistry::graph  -> PhasePlan
//!   ├── for each phase
//!   │     ├── PhaseExecutor::execute   (bounded, failure isolating)
//!   │     └── PipelineContext::merge   (after every task resolved)
//!   └── Synthesizer::synthesize        -> PipelineReport
//! ```
//!
//! Observers can follow a run through [`AuditEngine::subscribe`] (lifecycle
//! events) and [`AuditEngine::watch_state`] (state machine).

mod context;
mod coordinator;
mod events;
mod executor;
mod state;

pub use context::{ContextSnapshot, PipelineContext};
pub use coordinator::{AuditEngine, EngineCapabilities};
pub use events::{EventBus, PipelineEvent};
pub use executor::{PhaseDeadline, PhaseExecutor, PhaseOutcome};
pub use state::{ExecutionTimer, PhaseSummary, PipelineState, StateTracker};
