//! The pipeline coordinator.
//!
//! Drives one run end to end: build the graph, execute phases strictly in
//! order, merge each phase's results into the context, enforce the wall-clock
//! budget, then synthesize.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use super::context::PipelineContext;
use super::events::{EventBus, PipelineEvent};
use super::executor::{PhaseDeadline, PhaseExecutor};
use super::state::{ExecutionTimer, PhaseSummary, PipelineState, StateTracker};
use crate::audit::{AuditDefinition, AuditDescriptor, Category};
use crate::config::{EngineConfig, PhaseFailurePolicy};
use crate::dag::{AuditGraph, PhasePlan};
use crate::errors::EngineError;
use crate::profile::{BusinessContext, CodebaseContext};
use crate::registry::TaskRegistry;
use crate::report::{PipelineReport, RunStatus};
use crate::synthesis::{Correlator, Synthesizer};

/// What an engine would run, without running anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineCapabilities {
    pub audits: Vec<AuditDescriptor>,
    pub categories: Vec<Category>,
    /// Phase plan, when the registry forms a valid graph.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<PhasePlan>,
    /// Why the registry cannot run, otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_error: Option<String>,
    pub config: EngineConfig,
}

impl EngineCapabilities {
    /// Ready to run: the graph builds.
    pub fn is_healthy(&self) -> bool {
        self.graph_error.is_none()
    }
}

/// Runs a registry of audits and produces a [`PipelineReport`].
pub struct AuditEngine {
    registry: Arc<TaskRegistry>,
    config: EngineConfig,
    codebase: Arc<CodebaseContext>,
    business: Arc<BusinessContext>,
    correlator: Option<Arc<dyn Correlator>>,
    events: EventBus,
    state: StateTracker,
}

impl AuditEngine {
    /// Create an engine; rejects an invalid configuration.
    pub fn new(registry: TaskRegistry, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let events = EventBus::new(config.event_buffer);
        Ok(Self {
            registry: Arc::new(registry),
            config,
            codebase: Arc::new(CodebaseContext::default()),
            business: Arc::new(BusinessContext::default()),
            correlator: None,
            events,
            state: StateTracker::new(),
        })
    }

    pub fn with_codebase(mut self, codebase: CodebaseContext) -> Self {
        self.codebase = Arc::new(codebase);
        self
    }

    pub fn with_business(mut self, business: BusinessContext) -> Self {
        self.business = Arc::new(business);
        self
    }

    /// Replace the default finding correlator.
    pub fn with_correlator(mut self, correlator: Arc<dyn Correlator>) -> Self {
        self.correlator = Some(correlator);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Subscribe to lifecycle events. Subscribe before calling [`run`](Self::run).
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// Watch lifecycle state transitions.
    pub fn watch_state(&self) -> watch::Receiver<PipelineState> {
        self.state.watch()
    }

    pub fn state(&self) -> PipelineState {
        self.state.current()
    }

    /// Describe the registered audits and the plan they would run in.
    pub fn capabilities(&self) -> EngineCapabilities {
        let (plan, graph_error) = match self.registry.graph(&self.config.exclude) {
            Ok(graph) => (Some(graph.phases()), None),
            Err(e) => (None, Some(e.to_string())),
        };
        EngineCapabilities {
            audits: self.registry.descriptors(),
            categories: self.registry.categories().into_iter().collect(),
            plan,
            graph_error,
            config: self.config.clone(),
        }
    }

    /// Run every audit and synthesize the results.
    ///
    /// Only a malformed registry returns `Err`; audit failures and deadline
    /// truncation are reported inside the returned report.
    pub async fn run(&self) -> Result<PipelineReport, EngineError> {
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!("pipeline", run_id = %run_id);
        self.run_inner(run_id).instrument(span).await
    }

    async fn run_inner(&self, run_id: String) -> Result<PipelineReport, EngineError> {
        let started_at = Utc::now();
        let timer = ExecutionTimer::start();
        let deadline_at = Instant::now() + self.config.wall_clock_budget();

        self.state.reset();
        let graph = match self.registry.graph(&self.config.exclude) {
            Ok(graph) => graph,
            Err(e) => {
                warn!(error = %e, "audit graph is invalid");
                self.state.transition(PipelineState::Failed)?;
                return Err(e.into());
            }
        };
        self.state.transition(PipelineState::GraphBuilt)?;

        let plan = graph.phases();
        info!(
            phases = plan.len(),
            audits = plan.total_audits(),
            "starting audit pipeline"
        );
        self.events.emit(PipelineEvent::PipelineStarted {
            run_id: run_id.clone(),
            phase_count: plan.len(),
            audit_count: plan.total_audits(),
        });

        let executor = PhaseExecutor::new(
            self.config.concurrency_cap,
            self.events.clone(),
            Arc::clone(&self.codebase),
            Arc::clone(&self.business),
        );
        let mut context = PipelineContext::new();
        let mut phases: Vec<PhaseSummary> = Vec::with_capacity(plan.len());
        let mut skipped: Vec<String> = Vec::new();
        let mut abandoned: Vec<String> = Vec::new();
        let mut truncated = false;
        let mut halted = false;

        for (index, ids) in plan.iter().enumerate() {
            if Instant::now() >= deadline_at {
                warn!(phase = index, "wall-clock budget exhausted before phase");
                truncated = true;
                skipped.extend(plan.ids_from(index));
                break;
            }

            self.state.transition(PipelineState::Running { phase: index })?;
            self.events.emit(PipelineEvent::PhaseStarted {
                phase: index,
                task_ids: ids.to_vec(),
            });

            let audits: Vec<AuditDefinition> = ids
                .iter()
                .filter_map(|id| self.registry.get(id).cloned())
                .collect();
            let phase_timer = ExecutionTimer::start();
            let outcome = executor
                .execute(
                    index,
                    &audits,
                    context.snapshot(),
                    Some(PhaseDeadline::new(deadline_at, self.config.grace_period())),
                )
                .await;

            let rejected = context.merge(outcome.results.iter().cloned());
            if !rejected.is_empty() {
                warn!(phase = index, ?rejected, "duplicate results ignored");
            }

            let failed = outcome.failed_ids();
            info!(
                phase = index,
                succeeded = outcome.results.len() - failed.len(),
                failed = failed.len(),
                "phase complete"
            );
            phases.push(PhaseSummary {
                phase: index,
                audit_ids: ids.to_vec(),
                succeeded: outcome.results.len() - failed.len(),
                failed: failed.len(),
                skipped: outcome.skipped.clone(),
                abandoned: outcome.abandoned.clone(),
                duration: phase_timer.elapsed(),
            });
            self.events.emit(PipelineEvent::PhaseCompleted {
                phase: index,
                results: outcome.results.clone(),
            });

            if outcome.interrupted() {
                truncated = true;
                skipped.extend(outcome.skipped);
                abandoned.extend(outcome.abandoned);
                skipped.extend(plan.ids_from(index + 1));
                break;
            }

            if outcome.all_failed() && self.config.on_phase_failure == PhaseFailurePolicy::Halt {
                warn!(phase = index, ?failed, "every audit in phase failed, halting");
                halted = true;
                skipped.extend(plan.ids_from(index + 1));
                break;
            }
        }

        if truncated {
            warn!(
                completed = context.len(),
                skipped = skipped.len(),
                abandoned = abandoned.len(),
                "pipeline truncated"
            );
            self.events.emit(PipelineEvent::PipelineTruncated {
                completed: context.results().map(|r| r.audit_id.clone()).collect(),
                skipped: skipped.clone(),
                abandoned: abandoned.clone(),
            });
        }

        self.state.transition(PipelineState::Synthesizing)?;
        let results: Vec<_> = context.results().cloned().collect();
        let synthesis = self
            .synthesizer()
            .synthesize(&results, &category_weights(&graph), truncated);
        self.events.emit(PipelineEvent::PipelineCompleted {
            synthesis: Box::new(synthesis.clone()),
        });
        self.state.transition(PipelineState::Done)?;

        let any_failed = results.iter().any(|r| !r.is_success());
        let report = PipelineReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            duration_ms: timer.elapsed().as_millis() as u64,
            status: RunStatus::from_run(truncated, halted, any_failed),
            plan,
            phases,
            results,
            skipped,
            abandoned,
            synthesis,
        };
        info!(summary = %report.summary(), "audit pipeline finished");
        Ok(report)
    }

    fn synthesizer(&self) -> Synthesizer {
        let synthesizer = Synthesizer::new(&self.config, Arc::clone(&self.business));
        match &self.correlator {
            Some(correlator) => synthesizer.with_correlator(Arc::clone(correlator)),
            None => synthesizer,
        }
    }
}

/// Weight of each category: the highest priority weight among its audits.
fn category_weights(graph: &AuditGraph) -> BTreeMap<Category, f64> {
    let mut weights: BTreeMap<Category, f64> = BTreeMap::new();
    for audit in graph.audits() {
        weights
            .entry(audit.category.clone())
            .and_modify(|w| *w = w.max(audit.priority_weight))
            .or_insert(audit.priority_weight);
    }
    weights
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditOutput, Finding, Severity, audit_fn};
    use crate::errors::GraphError;

    fn noop(id: &str, category: Category) -> (AuditDescriptor, Arc<dyn crate::audit::AuditTask>) {
        (
            AuditDescriptor::new(id, category),
            audit_fn(|_| async { Ok(AuditOutput::new()) }),
        )
    }

    #[tokio::test]
    async fn empty_registry_completes_clean() {
        let engine = AuditEngine::new(TaskRegistry::default(), EngineConfig::default()).unwrap();
        let report = engine.run().await.unwrap();

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.synthesis.overall_risk_score, 100.0);
        assert!(report.plan.is_empty());
        assert_eq!(engine.state(), PipelineState::Done);
    }

    #[tokio::test]
    async fn invalid_graph_fails_before_running() {
        let (a, task_a) = noop("a", Category::Security);
        let (b, task_b) = noop("b", Category::Security);
        let registry = TaskRegistry::builder()
            .audit(a.depends_on("b"), task_a)
            .unwrap()
            .audit(b.depends_on("a"), task_b)
            .unwrap()
            .build();
        let engine = AuditEngine::new(registry, EngineConfig::default()).unwrap();
        let mut events = engine.subscribe();

        let err = engine.run().await.unwrap_err();
        assert!(err.is_graph_error());
        assert!(matches!(
            err,
            EngineError::Graph(GraphError::CyclicDependency { .. })
        ));
        assert_eq!(engine.state(), PipelineState::Failed);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn later_phase_sees_earlier_results() {
        let registry = TaskRegistry::builder()
            .audit(
                AuditDescriptor::new("auth", Category::Authentication),
                audit_fn(|_| async {
                    Ok(AuditOutput::new().with_finding(Finding::new(Severity::High, "weak hash")))
                }),
            )
            .unwrap()
            .audit(
                AuditDescriptor::new("compliance", Category::Compliance).depends_on("auth"),
                audit_fn(|ctx| async move {
                    let seen = ctx
                        .prior()
                        .get("auth")
                        .map(|r| r.findings.len())
                        .unwrap_or_default();
                    Ok(AuditOutput::new().with_finding(Finding::new(
                        Severity::Low,
                        format!("inherited {} auth finding(s)", seen),
                    )))
                }),
            )
            .unwrap()
            .build();

        let engine = AuditEngine::new(registry, EngineConfig::default()).unwrap();
        let report = engine.run().await.unwrap();

        let compliance = report.result("compliance").unwrap();
        assert_eq!(compliance.findings[0].text, "inherited 1 auth finding(s)");
        assert_eq!(report.phases.len(), 2);
    }

    #[tokio::test]
    async fn halt_policy_stops_after_failed_phase() {
        let registry = TaskRegistry::builder()
            .audit(
                AuditDescriptor::new("first", Category::Security),
                audit_fn(|_| async { Err::<AuditOutput, _>(anyhow::anyhow!("scanner offline")) }),
            )
            .unwrap()
            .audit(
                AuditDescriptor::new("second", Category::Compliance).depends_on("first"),
                audit_fn(|_| async { Ok(AuditOutput::new()) }),
            )
            .unwrap()
            .build();
        let config =
            EngineConfig::default().with_phase_failure_policy(PhaseFailurePolicy::Halt);

        let report = AuditEngine::new(registry, config)
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Halted);
        assert_eq!(report.skipped, vec!["second"]);
        assert_eq!(report.synthesis.failed_audits.len(), 1);
        assert!(!report.is_truncated());
    }

    #[tokio::test]
    async fn continue_policy_runs_dependents_of_failures() {
        let registry = TaskRegistry::builder()
            .audit(
                AuditDescriptor::new("first", Category::Security),
                audit_fn(|_| async { Err::<AuditOutput, _>(anyhow::anyhow!("scanner offline")) }),
            )
            .unwrap()
            .audit(
                AuditDescriptor::new("second", Category::Compliance).depends_on("first"),
                audit_fn(|ctx| async move {
                    assert!(!ctx.prior().get("first").unwrap().is_success());
                    Ok(AuditOutput::new())
                }),
            )
            .unwrap()
            .build();

        let report = AuditEngine::new(registry, EngineConfig::default())
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::CompletedWithFailures);
        assert!(report.result("second").unwrap().is_success());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = AuditEngine::new(
            TaskRegistry::default(),
            EngineConfig::default().with_concurrency_cap(0),
        )
        .err()
        .unwrap();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn capabilities_report_plan_and_errors() {
        let (a, task_a) = noop("a", Category::Security);
        let (b, task_b) = noop("b", Category::Performance);
        let registry = TaskRegistry::builder()
            .audit(a, task_a)
            .unwrap()
            .audit(b.depends_on("a"), task_b)
            .unwrap()
            .build();
        let caps = AuditEngine::new(registry, EngineConfig::default())
            .unwrap()
            .capabilities();

        assert!(caps.is_healthy());
        assert_eq!(caps.plan.unwrap().len(), 2);
        assert_eq!(caps.categories.len(), 2);

        let (c, task_c) = noop("c", Category::Security);
        let broken = TaskRegistry::builder()
            .audit(c.depends_on("ghost"), task_c)
            .unwrap()
            .build();
        let caps = AuditEngine::new(broken, EngineConfig::default())
            .unwrap()
            .capabilities();
        assert!(!caps.is_healthy());
        assert!(caps.graph_error.unwrap().contains("ghost"));
    }

    #[test]
    fn category_weight_is_max_of_audits() {
        let graph = crate::dag::DagBuilder::new(vec![
            AuditDescriptor::new("a", Category::Security).with_priority_weight(2.0),
            AuditDescriptor::new("b", Category::Security).with_priority_weight(5.0),
            AuditDescriptor::new("c", Category::Performance),
        ])
        .build()
        .unwrap();
        let weights = category_weights(&graph);
        assert_eq!(weights[&Category::Security], 5.0);
        assert_eq!(weights[&Category::Performance], 1.0);
    }
}
