//! Bounded, failure-isolating execution of one phase.
//!
//! Every audit in a phase is launched in declaration order as soon as a
//! concurrency slot frees up. The semaphore is fair, so slots are handed out
//! first-declared-first-scheduled. An audit that returns an error or panics is
//! recorded as a synthetic critical [`AuditResult`]; its siblings keep running.

use futures::FutureExt;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

use super::context::ContextSnapshot;
use super::events::{EventBus, PipelineEvent};
use crate::audit::{AuditDefinition, AuditResult, ErrorInfo, TaskContext};
use crate::config::MAX_CONCURRENCY_CAP;
use crate::profile::{BusinessContext, CodebaseContext};

/// Wall-clock limits applied to one phase.
#[derive(Debug, Clone, Copy)]
pub struct PhaseDeadline {
    /// No task launches after this instant.
    pub at: Instant,
    /// In-flight tasks are abandoned at `at + grace`.
    pub grace: Duration,
}

impl PhaseDeadline {
    pub fn new(at: Instant, grace: Duration) -> Self {
        Self { at, grace }
    }

    pub fn hard_stop(&self) -> Instant {
        self.at + self.grace
    }

    pub fn has_passed(&self) -> bool {
        Instant::now() >= self.at
    }
}

/// What happened to every audit of one phase.
#[derive(Debug, Clone, Default)]
pub struct PhaseOutcome {
    pub phase: usize,
    /// Resolved results, in declaration order.
    pub results: Vec<AuditResult>,
    /// Audits never launched because the deadline passed first.
    pub skipped: Vec<String>,
    /// Audits launched but still running at the hard stop.
    pub abandoned: Vec<String>,
}

impl PhaseOutcome {
    /// Whether the deadline cut this phase short.
    pub fn interrupted(&self) -> bool {
        !self.skipped.is_empty() || !self.abandoned.is_empty()
    }

    /// True when at least one audit resolved and none succeeded.
    pub fn all_failed(&self) -> bool {
        !self.results.is_empty() && self.results.iter().all(|r| !r.is_success())
    }

    pub fn failed_ids(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| r.audit_id.clone())
            .collect()
    }
}

/// Runs the audits of a single phase concurrently.
pub struct PhaseExecutor {
    concurrency_cap: usize,
    events: EventBus,
    codebase: Arc<CodebaseContext>,
    business: Arc<BusinessContext>,
}

impl PhaseExecutor {
    pub fn new(
        concurrency_cap: usize,
        events: EventBus,
        codebase: Arc<CodebaseContext>,
        business: Arc<BusinessContext>,
    ) -> Self {
        Self {
            concurrency_cap: concurrency_cap.clamp(1, MAX_CONCURRENCY_CAP),
            events,
            codebase,
            business,
        }
    }

    /// Execute `audits` against `snapshot`.
    ///
    /// Returns once every launched audit has resolved, or at the deadline's
    /// hard stop, whichever comes first.
    pub async fn execute(
        &self,
        phase: usize,
        audits: &[AuditDefinition],
        snapshot: ContextSnapshot,
        deadline: Option<PhaseDeadline>,
    ) -> PhaseOutcome {
        let semaphore = Arc::new(Semaphore::new(self.concurrency_cap));
        let mut join_set: JoinSet<(usize, AuditResult)> = JoinSet::new();
        let mut launched: Vec<usize> = Vec::with_capacity(audits.len());
        let mut skipped = Vec::new();

        for (index, audit) in audits.iter().enumerate() {
            if deadline.is_some_and(|d| d.has_passed()) {
                skipped.extend(audits[index..].iter().map(|a| a.id().to_string()));
                break;
            }

            let acquire = Arc::clone(&semaphore).acquire_owned();
            let permit = match deadline {
                Some(d) => match timeout_at(d.at, acquire).await {
                    Ok(permit) => permit,
                    Err(_) => {
                        skipped.extend(audits[index..].iter().map(|a| a.id().to_string()));
                        break;
                    }
                },
                None => acquire.await,
            };
            let permit = match permit {
                Ok(permit) => permit,
                Err(e) => {
                    warn!(error = %e, "concurrency semaphore closed");
                    skipped.extend(audits[index..].iter().map(|a| a.id().to_string()));
                    break;
                }
            };

            self.events.emit(PipelineEvent::TaskStarted {
                id: audit.id().to_string(),
            });
            debug!(phase, audit = audit.id(), "launching audit");

            let ctx = TaskContext::new(
                audit.id(),
                snapshot.clone(),
                Arc::clone(&self.codebase),
                Arc::clone(&self.business),
            );
            let audit = audit.clone();
            let events = self.events.clone();
            join_set.spawn(async move {
                let result = run_isolated(&audit, ctx).await;
                emit_resolution(&events, &result);
                drop(permit);
                (index, result)
            });
            launched.push(index);
        }

        let mut resolved: BTreeMap<usize, AuditResult> = BTreeMap::new();
        let mut join_failures: Vec<String> = Vec::new();

        loop {
            let next = match deadline {
                Some(d) => match timeout_at(d.hard_stop(), join_set.join_next()).await {
                    Ok(next) => next,
                    Err(_) => break,
                },
                None => join_set.join_next().await,
            };
            match next {
                Some(Ok((index, result))) => {
                    resolved.insert(index, result);
                }
                Some(Err(e)) => {
                    warn!(phase, error = %e, "audit task could not be joined");
                    join_failures.push(e.to_string());
                }
                None => break,
            }
        }

        let mut abandoned = Vec::new();
        let hard_stopped = !join_set.is_empty();
        if hard_stopped {
            join_set.abort_all();
        }

        for index in launched {
            if resolved.contains_key(&index) {
                continue;
            }
            let audit = &audits[index];
            if hard_stopped {
                warn!(phase, audit = audit.id(), "abandoning audit at deadline");
                abandoned.push(audit.id().to_string());
            } else {
                // The task died outside its own panic guard.
                let message = join_failures
                    .pop()
                    .unwrap_or_else(|| "task terminated unexpectedly".to_string());
                let result = AuditResult::failure(
                    audit.descriptor(),
                    ErrorInfo::panicked(message),
                    Duration::ZERO,
                );
                emit_resolution(&self.events, &result);
                resolved.insert(index, result);
            }
        }

        PhaseOutcome {
            phase,
            results: resolved.into_values().collect(),
            skipped,
            abandoned,
        }
    }
}

/// Run one audit, turning errors and panics into a failure result.
async fn run_isolated(audit: &AuditDefinition, ctx: TaskContext) -> AuditResult {
    let started = Instant::now();
    let outcome = AssertUnwindSafe(audit.task().run(ctx)).catch_unwind().await;
    let elapsed = started.elapsed();

    match outcome {
        Ok(Ok(output)) => AuditResult::from_output(audit.descriptor(), output, elapsed),
        Ok(Err(e)) => {
            warn!(audit = audit.id(), error = %format!("{:#}", e), "audit failed");
            AuditResult::failure(
                audit.descriptor(),
                ErrorInfo::failed(format!("{:#}", e)),
                elapsed,
            )
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(audit = audit.id(), panic = %message, "audit panicked");
            AuditResult::failure(audit.descriptor(), ErrorInfo::panicked(message), elapsed)
        }
    }
}

fn emit_resolution(events: &EventBus, result: &AuditResult) {
    let event = match &result.error {
        Some(error) => PipelineEvent::TaskFailed {
            id: result.audit_id.clone(),
            error: error.clone(),
        },
        None => PipelineEvent::TaskCompleted {
            id: result.audit_id.clone(),
            result: Box::new(result.clone()),
        },
    };
    events.emit(event);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
