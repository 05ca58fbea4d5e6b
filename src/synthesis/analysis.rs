//! Business impact and compliance gap analysis.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::correlate::{FindingRef, LocatedFinding};
use super::prioritize::Recommendation;
use crate::audit::Severity;
use crate::profile::BusinessContext;

/// Items at or below this effort count as low effort in the priority matrix.
pub const LOW_EFFORT_HOURS: f64 = 16.0;
/// Items at or above this risk reduction count as high impact.
pub const HIGH_IMPACT_REDUCTION_PCT: f64 = 25.0;

/// Impact versus effort quadrants, by recommendation title.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriorityMatrix {
    pub quick_wins: Vec<String>,
    pub major_projects: Vec<String>,
    pub fill_ins: Vec<String>,
    pub thankless_tasks: Vec<String>,
}

impl PriorityMatrix {
    pub fn classify(recommendations: &[Recommendation]) -> Self {
        let mut matrix = Self::default();
        for rec in recommendations {
            let high_impact = rec.severity >= Severity::High
                || rec.risk_reduction_pct >= HIGH_IMPACT_REDUCTION_PCT;
            let low_effort = rec.implementation_effort_hours <= LOW_EFFORT_HOURS;
            let bucket = match (high_impact, low_effort) {
                (true, true) => &mut matrix.quick_wins,
                (true, false) => &mut matrix.major_projects,
                (false, true) => &mut matrix.fill_ins,
                (false, false) => &mut matrix.thankless_tasks,
            };
            bucket.push(rec.title.clone());
        }
        matrix
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusinessImpact {
    /// Revenue modeled as exposed by every open item.
    pub total_modeled_exposure: f64,
    pub total_risk_avoided: f64,
    pub total_remediation_cost: f64,
    pub net_benefit: f64,
    /// Risk avoided per unit of remediation cost.
    pub benefit_cost_ratio: f64,
    /// Months of avoided losses needed to pay back the remediation cost.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payback_months: Option<f64>,
    pub affected_critical_processes: Vec<String>,
    pub priority_matrix: PriorityMatrix,
}

impl BusinessImpact {
    pub fn analyze(recommendations: &[Recommendation]) -> Self {
        let total_modeled_exposure: f64 = recommendations.iter().map(|r| r.modeled_exposure).sum();
        let total_risk_avoided: f64 = recommendations.iter().map(|r| r.risk_avoided).sum();
        let total_remediation_cost: f64 =
            recommendations.iter().map(|r| r.remediation_cost).sum();

        let benefit_cost_ratio = if total_remediation_cost > 0.0 {
            total_risk_avoided / total_remediation_cost
        } else {
            0.0
        };
        let payback_months = (total_risk_avoided > 0.0)
            .then(|| total_remediation_cost / (total_risk_avoided / 12.0));

        let affected_critical_processes: BTreeSet<String> = recommendations
            .iter()
            .flat_map(|r| r.critical_processes.iter().cloned())
            .collect();

        Self {
            total_modeled_exposure,
            total_risk_avoided,
            total_remediation_cost,
            net_benefit: total_risk_avoided - total_remediation_cost,
            benefit_cost_ratio,
            payback_months,
            affected_critical_processes: affected_critical_processes.into_iter().collect(),
            priority_matrix: PriorityMatrix::classify(recommendations),
        }
    }
}

/// Readiness against one declared compliance framework.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceGap {
    pub framework: String,
    pub findings: Vec<FindingRef>,
    pub gap_count: usize,
    pub critical_gaps: usize,
    /// 100 when no relevant findings remain open.
    pub readiness_pct: f64,
}

/// One entry per framework declared in the business context.
///
/// A finding is relevant when its category is compliance relevant or its
/// text names the framework.
pub fn compliance_gaps(
    findings: &[LocatedFinding],
    business: &BusinessContext,
) -> Vec<ComplianceGap> {
    business
        .compliance_frameworks
        .iter()
        .map(|framework| {
            let needle = framework.to_lowercase();
            let relevant: Vec<FindingRef> = findings
                .iter()
                .filter(|f| {
                    f.category.is_compliance_relevant()
                        || (!needle.is_empty() && f.finding.text.to_lowercase().contains(&needle))
                })
                .map(LocatedFinding::to_ref)
                .collect();

            let penalty: f64 = relevant.iter().map(|f| f.severity.score_penalty()).sum();
            ComplianceGap {
                framework: framework.clone(),
                gap_count: relevant.len(),
                critical_gaps: relevant
                    .iter()
                    .filter(|f| f.severity == Severity::Critical)
                    .count(),
                readiness_pct: (100.0 - penalty).clamp(0.0, 100.0),
                findings: relevant,
            }
        })
        .collect()
}
