//! End-to-end tests for the audit engine.
//!
//! These drive the public API only: register audits, run the engine and
//! inspect the report, events and lifecycle state.

use auditor::audit::{
    AuditDescriptor, AuditOutput, AuditTask, Category, Finding, Severity, TaskContext, audit_fn,
};
use auditor::config::{EngineConfig, PhaseFailurePolicy};
use auditor::errors::{ConfigError, EngineError, GraphError};
use auditor::pipeline::{AuditEngine, PipelineEvent, PipelineState};
use auditor::registry::TaskRegistry;
use auditor::report::RunStatus;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Task that sleeps, then reports one finding of the given severity.
fn reporting(severity: Severity, text: &'static str, delay_ms: u64) -> Arc<dyn AuditTask> {
    audit_fn(move |_ctx| async move {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        Ok(AuditOutput::new().with_finding(Finding::new(severity, text)))
    })
}

fn clean() -> Arc<dyn AuditTask> {
    audit_fn(|_| async { Ok(AuditOutput::new()) })
}

fn failing() -> Arc<dyn AuditTask> {
    audit_fn(|_| async { Err::<AuditOutput, _>(anyhow::anyhow!("scanner crashed")) })
}

/// A six-audit registry with a diamond and an independent chain.
fn layered_registry() -> TaskRegistry {
    TaskRegistry::builder()
        .audit(
            AuditDescriptor::new("secrets", Category::Security),
            reporting(Severity::High, "hardcoded api token", 30),
        )
        .unwrap()
        .audit(
            AuditDescriptor::new("deps", Category::Dependencies),
            reporting(Severity::Medium, "outdated tls library", 5),
        )
        .unwrap()
        .audit(
            AuditDescriptor::new("auth", Category::Authentication).depends_on("secrets"),
            reporting(Severity::Critical, "weak session secret", 20),
        )
        .unwrap()
        .audit(
            AuditDescriptor::new("perf", Category::Performance).depends_on("deps"),
            reporting(Severity::Low, "unbounded cache", 1),
        )
        .unwrap()
        .audit(
            AuditDescriptor::new("privacy", Category::DataPrivacy)
                .depends_on("auth")
                .depends_on("deps"),
            reporting(Severity::High, "pii written to logs", 10),
        )
        .unwrap()
        .audit(
            AuditDescriptor::new("compliance", Category::Compliance)
                .depends_on("privacy")
                .depends_on("auth"),
            clean(),
        )
        .unwrap()
        .build()
}

fn engine(registry: TaskRegistry, config: EngineConfig) -> AuditEngine {
    AuditEngine::new(registry, config).unwrap()
}

mod planning {
    use super::*;

    #[test]
    fn test_phases_cover_every_audit_once_and_respect_dependencies() {
        let registry = layered_registry();
        let graph = registry.graph(&[]).unwrap();
        let plan = graph.phases();

        let all = plan.all_ids();
        let unique: BTreeSet<_> = all.iter().cloned().collect();
        assert_eq!(all.len(), registry.len());
        assert_eq!(unique.len(), registry.len());

        for audit in registry.descriptors() {
            let phase = plan.phase_of(&audit.id).unwrap();
            for dep in &audit.depends_on {
                assert!(
                    plan.phase_of(dep).unwrap() < phase,
                    "{} must run after {}",
                    audit.id,
                    dep
                );
            }
        }

        assert_eq!(
            plan.as_vecs(),
            &[
                vec!["secrets".to_string(), "deps".to_string()],
                vec!["auth".to_string(), "perf".to_string()],
                vec!["privacy".to_string()],
                vec!["compliance".to_string()],
            ]
        );
    }

    #[test]
    fn test_planning_is_deterministic() {
        let first = layered_registry().graph(&[]).unwrap().phases();
        for _ in 0..10 {
            assert_eq!(layered_registry().graph(&[]).unwrap().phases(), first);
        }
    }

    #[test]
    fn test_cycle_names_both_audits() {
        let registry = TaskRegistry::builder()
            .audit(AuditDescriptor::new("a", Category::Security).depends_on("b"), clean())
            .unwrap()
            .audit(AuditDescriptor::new("b", Category::Security).depends_on("a"), clean())
            .unwrap()
            .build();

        let err = registry.graph(&[]).unwrap_err();
        let ids = err.audit_ids();
        assert!(ids.contains(&"a"));
        assert!(ids.contains(&"b"));
        let message = err.to_string();
        assert!(message.contains('a') && message.contains('b'));
    }

    #[test]
    fn test_unknown_dependency_is_rejected() {
        let registry = TaskRegistry::builder()
            .audit(
                AuditDescriptor::new("auth", Category::Authentication).depends_on("ghost"),
                clean(),
            )
            .unwrap()
            .build();

        assert_eq!(
            registry.graph(&[]).unwrap_err(),
            GraphError::UnknownDependency {
                audit: "auth".to_string(),
                dependency: "ghost".to_string(),
            }
        );
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let result = TaskRegistry::builder()
            .audit(AuditDescriptor::new("auth", Category::Authentication), clean())
            .unwrap()
            .audit(AuditDescriptor::new("auth", Category::Security), clean());

        assert!(matches!(
            result,
            Err(GraphError::DuplicateAudit { ref id }) if id == "auth"
        ));
    }
}

mod execution {
    use super::*;

    #[tokio::test]
    async fn test_concurrency_cap_does_not_change_results() {
        let wide = engine(layered_registry(), EngineConfig::default().with_concurrency_cap(6))
            .run()
            .await
            .unwrap();
        let serial = engine(layered_registry(), EngineConfig::default().with_concurrency_cap(1))
            .run()
            .await
            .unwrap();

        let shape = |report: &auditor::PipelineReport| {
            report
                .results
                .iter()
                .map(|r| (r.audit_id.clone(), r.severity, r.findings.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(shape(&wide), shape(&serial));
        assert_eq!(
            wide.synthesis.overall_risk_score,
            serial.synthesis.overall_risk_score
        );
        assert_eq!(
            wide.synthesis.cross_domain_issues,
            serial.synthesis.cross_domain_issues
        );
    }

    #[tokio::test]
    async fn test_cap_equal_to_task_count_runs_all_concurrently() {
        const WIDTH: usize = 5;
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut builder = TaskRegistry::builder();
        for i in 0..WIDTH {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            builder = builder
                .audit(
                    AuditDescriptor::new(format!("scan{}", i), Category::Security),
                    audit_fn(move |_| {
                        let running = Arc::clone(&running);
                        let peak = Arc::clone(&peak);
                        async move {
                            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            running.fetch_sub(1, Ordering::SeqCst);
                            Ok(AuditOutput::new())
                        }
                    }),
                )
                .unwrap();
        }
        let config = EngineConfig::default().with_concurrency_cap(WIDTH);

        let report = engine(builder.build(), config).run().await.unwrap();

        assert_eq!(report.results.len(), WIDTH);
        assert_eq!(peak.load(Ordering::SeqCst), WIDTH);
    }

    #[test]
    fn test_oversized_concurrency_cap_is_rejected() {
        let config = EngineConfig::default().with_concurrency_cap(usize::MAX);

        let err = AuditEngine::new(layered_registry(), config).err().unwrap();
        assert!(matches!(
            err,
            EngineError::Config(ConfigError::ConcurrencyTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_failing_audit_yields_critical_result_and_run_continues() {
        let registry = TaskRegistry::builder()
            .audit(AuditDescriptor::new("broken", Category::Reliability), failing())
            .unwrap()
            .audit(
                AuditDescriptor::new("perf", Category::Performance),
                reporting(Severity::Low, "slow endpoint", 1),
            )
            .unwrap()
            .audit(
                AuditDescriptor::new("later", Category::Architecture).depends_on("broken"),
                clean(),
            )
            .unwrap()
            .build();

        let report = engine(registry, EngineConfig::default()).run().await.unwrap();

        let broken = report.result("broken").unwrap();
        assert_eq!(broken.severity, Severity::Critical);
        assert!(broken.findings.is_empty());
        assert!(broken.error.as_ref().unwrap().message.contains("scanner crashed"));

        assert!(report.result("perf").unwrap().is_success());
        assert!(report.result("later").unwrap().is_success());
        assert_eq!(report.status, RunStatus::CompletedWithFailures);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.synthesis.failed_audits[0].audit_id, "broken");
    }

    #[tokio::test]
    async fn test_halt_policy_skips_remaining_phases() {
        let registry = TaskRegistry::builder()
            .audit(AuditDescriptor::new("broken", Category::Reliability), failing())
            .unwrap()
            .audit(
                AuditDescriptor::new("later", Category::Architecture).depends_on("broken"),
                clean(),
            )
            .unwrap()
            .build();
        let config = EngineConfig::default().with_phase_failure_policy(PhaseFailurePolicy::Halt);

        let report = engine(registry, config).run().await.unwrap();

        assert_eq!(report.status, RunStatus::Halted);
        assert_eq!(report.skipped, vec!["later".to_string()]);
        assert!(report.result("later").is_none());
    }

    #[tokio::test]
    async fn test_later_phase_reads_earlier_results() {
        let registry = TaskRegistry::builder()
            .audit(
                AuditDescriptor::new("auth", Category::Authentication),
                reporting(Severity::High, "password reuse allowed", 1),
            )
            .unwrap()
            .audit(
                AuditDescriptor::new("compliance", Category::Compliance).depends_on("auth"),
                audit_fn(|ctx: TaskContext| async move {
                    let seen = ctx.prior().findings().count();
                    Ok(AuditOutput::new().with_finding(Finding::new(
                        Severity::Low,
                        format!("reviewed {} prior finding(s)", seen),
                    )))
                }),
            )
            .unwrap()
            .build();

        let report = engine(registry, EngineConfig::default()).run().await.unwrap();

        let compliance = report.result("compliance").unwrap();
        assert_eq!(compliance.findings[0].text, "reviewed 1 prior finding(s)");
    }

    #[tokio::test]
    async fn test_excluded_audit_is_not_run() {
        let config = EngineConfig::default().with_exclusions(["perf"]);
        let report = engine(layered_registry(), config).run().await.unwrap();

        assert!(report.result("perf").is_none());
        assert_eq!(report.results.len(), 5);
        assert!(report.plan.phase_of("perf").is_none());
    }

    #[tokio::test]
    async fn test_cycle_fails_the_run() {
        let registry = TaskRegistry::builder()
            .audit(AuditDescriptor::new("a", Category::Security).depends_on("b"), clean())
            .unwrap()
            .audit(AuditDescriptor::new("b", Category::Security).depends_on("a"), clean())
            .unwrap()
            .build();
        let engine = engine(registry, EngineConfig::default());

        let err = engine.run().await.unwrap_err();
        assert!(matches!(err, EngineError::Graph(GraphError::CyclicDependency { .. })));
        assert_eq!(engine.state(), PipelineState::Failed);
    }
}

mod synthesis {
    use super::*;

    #[tokio::test]
    async fn test_clean_run_scores_one_hundred() {
        let registry = TaskRegistry::builder()
            .audit(AuditDescriptor::new("a", Category::Security), clean())
            .unwrap()
            .audit(AuditDescriptor::new("b", Category::Performance), clean())
            .unwrap()
            .build();

        let report = engine(registry, EngineConfig::default()).run().await.unwrap();

        assert_eq!(report.synthesis.overall_risk_score, 100.0);
        assert!(report.synthesis.cross_domain_issues.is_empty());
        assert!(report.synthesis.prioritized_recommendations.is_empty());
    }

    #[tokio::test]
    async fn test_score_stays_in_range() {
        let report = engine(layered_registry(), EngineConfig::default())
            .run()
            .await
            .unwrap();

        let score = report.synthesis.overall_risk_score;
        assert!((0.0..=100.0).contains(&score));
        for category in &report.synthesis.category_scores {
            assert!((0.0..=100.0).contains(&category.score));
        }
    }

    #[tokio::test]
    async fn test_synthesis_is_idempotent_across_runs() {
        let first = engine(layered_registry(), EngineConfig::default())
            .run()
            .await
            .unwrap();
        let second = engine(layered_registry(), EngineConfig::default())
            .run()
            .await
            .unwrap();

        assert_eq!(
            first.synthesis.overall_risk_score,
            second.synthesis.overall_risk_score
        );
        assert_eq!(
            first.synthesis.cross_domain_issues,
            second.synthesis.cross_domain_issues
        );
        let titles = |r: &auditor::PipelineReport| {
            r.synthesis
                .prioritized_recommendations
                .iter()
                .map(|rec| rec.title.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(titles(&first), titles(&second));
    }

    #[tokio::test]
    async fn test_session_weakness_correlates_across_domains() {
        let registry = TaskRegistry::builder()
            .audit(
                AuditDescriptor::new("authCheck", Category::Authentication),
                audit_fn(|_| async {
                    Ok(AuditOutput::new().with_finding(
                        Finding::new(Severity::Critical, "weak session secret")
                            .with_evidence("config/session.rs"),
                    ))
                }),
            )
            .unwrap()
            .audit(
                AuditDescriptor::new("complianceCheck", Category::Compliance)
                    .depends_on("authCheck"),
                audit_fn(|ctx: TaskContext| async move {
                    let mut output = AuditOutput::new();
                    let weak_session = ctx
                        .prior()
                        .get("authCheck")
                        .map(|r| r.findings.iter().any(|f| f.text.contains("session")))
                        .unwrap_or(false);
                    if weak_session {
                        output = output.with_finding(
                            Finding::new(Severity::High, "session policy violates standard X")
                                .with_evidence("config/session.rs"),
                        );
                    }
                    Ok(output)
                }),
            )
            .unwrap()
            .build();

        let report = engine(registry, EngineConfig::default()).run().await.unwrap();

        assert_eq!(
            report.plan.as_vecs(),
            &[
                vec!["authCheck".to_string()],
                vec!["complianceCheck".to_string()],
            ]
        );

        let issues = &report.synthesis.cross_domain_issues;
        assert_eq!(issues.len(), 1);
        let domains: Vec<_> = issues[0].affected_domains.iter().cloned().collect();
        assert_eq!(domains, vec![Category::Authentication, Category::Compliance]);
        assert!(issues[0].shared_evidence.contains("config/session.rs"));

        assert!(report.synthesis.overall_risk_score < 50.0);
    }
}

mod budget {
    use super::*;

    #[tokio::test]
    async fn test_tiny_budget_truncates_without_error() {
        let registry = TaskRegistry::builder()
            .audit(
                AuditDescriptor::new("slow1", Category::Performance),
                reporting(Severity::Low, "slow", 100),
            )
            .unwrap()
            .audit(
                AuditDescriptor::new("slow2", Category::Reliability),
                reporting(Severity::Low, "slower", 100),
            )
            .unwrap()
            .build();
        let config = EngineConfig::default().with_wall_clock_budget(Duration::from_millis(1));

        let report = engine(registry, config).run().await.unwrap();

        assert!(report.synthesis.truncated);
        assert!(report.is_truncated());
        assert_eq!(report.status, RunStatus::Truncated);
        let unfinished = report.skipped.len() + report.abandoned.len();
        assert_eq!(report.results.len() + unfinished, 2);
        assert!((0.0..=100.0).contains(&report.synthesis.overall_risk_score));
    }
}

mod observability {
    use super::*;

    #[tokio::test]
    async fn test_events_follow_lifecycle_order() {
        let engine = engine(layered_registry(), EngineConfig::default());
        let mut rx = engine.subscribe();

        engine.run().await.unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }

        assert!(matches!(
            events.first(),
            Some(PipelineEvent::PipelineStarted { phase_count: 4, audit_count: 6, .. })
        ));
        assert!(matches!(
            events.last(),
            Some(PipelineEvent::PipelineCompleted { .. })
        ));

        for id in ["secrets", "deps", "auth", "perf", "privacy", "compliance"] {
            let started = events
                .iter()
                .position(|e| matches!(e, PipelineEvent::TaskStarted { id: i } if i == id))
                .unwrap();
            let completed = events
                .iter()
                .position(|e| matches!(e, PipelineEvent::TaskCompleted { id: i, .. } if i == id))
                .unwrap();
            assert!(started < completed, "{} completed before it started", id);
        }

        let phase_starts: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::PhaseStarted { phase, .. } => Some(*phase),
                _ => None,
            })
            .collect();
        assert_eq!(phase_starts, vec![0, 1, 2, 3]);
        assert!(!events
            .iter()
            .any(|e| matches!(e, PipelineEvent::PipelineTruncated { .. })));
    }

    #[tokio::test]
    async fn test_state_watch_ends_done() {
        let engine = engine(layered_registry(), EngineConfig::default());
        let state = engine.watch_state();
        assert_eq!(*state.borrow(), PipelineState::Idle);

        let report = engine.run().await.unwrap();

        assert_eq!(*state.borrow(), PipelineState::Done);
        assert_eq!(report.phases.len(), 4);
        assert!(report.phases.iter().all(|p| p.all_success()));
    }

    #[tokio::test]
    async fn test_report_serializes_to_json_and_yaml() {
        let report = engine(layered_registry(), EngineConfig::default())
            .run()
            .await
            .unwrap();

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["status"], "completed");
        assert!(json["synthesis"]["overall_risk_score"].is_number());

        let yaml = report.to_yaml().unwrap();
        assert!(yaml.contains("run_id"));
    }
}
