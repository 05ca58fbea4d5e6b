//! Cross-domain synthesis of audit results.
//!
//! ## Submodules
//!
//! - `correlate`: pairwise finding correlation and union-find clustering
//! - `risk`: category and overall risk scores
//! - `prioritize`: business-weighted recommendations
//! - `roadmap`: phased implementation plan and critical path
//! - `analysis`: business impact and compliance gaps
//!
//! Synthesis is a pure function of its inputs: the same results, weights and
//! business context always yield an identical [`Synthesis`], order included.

mod analysis;
mod correlate;
mod prioritize;
mod risk;
mod roadmap;

pub use analysis::{BusinessImpact, ComplianceGap, PriorityMatrix, compliance_gaps};
pub use correlate::{
    Correlation, Correlator, CrossDomainIssue, EvidenceTopicCorrelator, FindingRef,
    LocatedFinding, UnionFind, correlate, topic_tokens,
};
pub use prioritize::{Recommendation, RecommendationSource, prioritize, timeline};
pub use risk::{CRITICAL_CATEGORY_CAP, CategoryScore, overall_risk_score, score_categories};
pub use roadmap::{CriticalStep, RoadmapPhase, RoadmapSettings, build_roadmap, critical_path};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::audit::{AuditResult, Category, ErrorInfo};
use crate::config::EngineConfig;
use crate::profile::BusinessContext;

/// An audit that produced no usable result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedAudit {
    pub audit_id: String,
    pub category: Category,
    pub error: ErrorInfo,
}

/// The unified assessment of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synthesis {
    /// 0 (worst) to 100 (no findings).
    pub overall_risk_score: f64,
    pub category_scores: Vec<CategoryScore>,
    pub cross_domain_issues: Vec<CrossDomainIssue>,
    pub prioritized_recommendations: Vec<Recommendation>,
    pub critical_path: Vec<CriticalStep>,
    pub implementation_roadmap: Vec<RoadmapPhase>,
    pub business_impact_analysis: BusinessImpact,
    pub compliance_gap_analysis: Vec<ComplianceGap>,
    pub failed_audits: Vec<FailedAudit>,
    pub truncated: bool,
}

impl Synthesis {
    pub fn category_score(&self, category: &Category) -> Option<f64> {
        self.category_scores
            .iter()
            .find(|s| &s.category == category)
            .map(|s| s.score)
    }

    pub fn finding_count(&self) -> usize {
        self.category_scores.iter().map(|s| s.finding_count).sum()
    }
}

/// Turns a run's results into a [`Synthesis`].
#[derive(Clone)]
pub struct Synthesizer {
    correlator: Arc<dyn Correlator>,
    correlation_threshold: f64,
    roadmap: RoadmapSettings,
    business: Arc<BusinessContext>,
}

impl std::fmt::Debug for Synthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synthesizer")
            .field("correlation_threshold", &self.correlation_threshold)
            .field("roadmap", &self.roadmap)
            .finish_non_exhaustive()
    }
}

impl Synthesizer {
    pub fn new(config: &EngineConfig, business: Arc<BusinessContext>) -> Self {
        Self {
            correlator: Arc::new(EvidenceTopicCorrelator),
            correlation_threshold: config.correlation_threshold,
            roadmap: RoadmapSettings {
                phase_effort_budget_hours: config.phase_effort_budget_hours,
                max_items: config.max_roadmap_items,
                team_hours_per_week: config.team_hours_per_week,
                hourly_rate: business.hourly_rate,
            },
            business,
        }
    }

    /// Replace the default evidence/topic correlator.
    pub fn with_correlator(mut self, correlator: Arc<dyn Correlator>) -> Self {
        self.correlator = correlator;
        self
    }

    /// Synthesize `results`.
    ///
    /// `category_weights` feed the overall score. Input order does not matter.
    pub fn synthesize(
        &self,
        results: &[AuditResult],
        category_weights: &BTreeMap<Category, f64>,
        truncated: bool,
    ) -> Synthesis {
        let mut ordered: Vec<&AuditResult> = results.iter().collect();
        ordered.sort_by(|a, b| a.audit_id.cmp(&b.audit_id));

        let category_scores = score_categories(&ordered, category_weights);
        let overall_risk_score = overall_risk_score(&category_scores);

        let findings = LocatedFinding::collect(&ordered);
        let correlation = correlate(
            &findings,
            self.correlator.as_ref(),
            self.correlation_threshold,
        );
        let recommendations = prioritize(&findings, &correlation, &self.business);
        let roadmap = build_roadmap(&recommendations, &self.roadmap);
        let critical_path = critical_path(&recommendations, &roadmap, &self.roadmap);

        let failed_audits = ordered
            .iter()
            .filter_map(|r| {
                r.error.as_ref().map(|error| FailedAudit {
                    audit_id: r.audit_id.clone(),
                    category: r.category.clone(),
                    error: error.clone(),
                })
            })
            .collect();

        tracing::debug!(
            findings = findings.len(),
            issues = correlation.issues.len(),
            recommendations = recommendations.len(),
            "synthesis complete"
        );

        Synthesis {
            overall_risk_score,
            category_scores,
            business_impact_analysis: BusinessImpact::analyze(&recommendations),
            compliance_gap_analysis: compliance_gaps(&findings, &self.business),
            cross_domain_issues: correlation.issues,
            prioritized_recommendations: recommendations,
            critical_path,
            implementation_roadmap: roadmap,
            failed_audits,
            truncated,
        }
    }
}
