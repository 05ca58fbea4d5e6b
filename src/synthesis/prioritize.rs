//! Business-weighted ranking of remediation work.
//!
//! Every singleton finding and every cross-domain issue yields one
//! [`Recommendation`] with
//! `priority = severity_weight × domain_spread × business_impact_factor`.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

use super::correlate::{Correlation, CrossDomainIssue, LocatedFinding};
use crate::audit::{Category, Severity};
use crate::profile::BusinessContext;

/// Upper bound for the modeled risk reduction of a single item.
pub const MAX_RISK_REDUCTION_PCT: f64 = 95.0;

/// What a recommendation was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecommendationSource {
    Finding { audit_id: String, finding_index: usize },
    CrossDomain { issue_index: usize, key: String },
}

impl RecommendationSource {
    /// Stable key used as the last ordering tie-breaker.
    pub fn key(&self) -> String {
        match self {
            Self::Finding {
                audit_id,
                finding_index,
            } => format!("finding:{}#{}", audit_id, finding_index),
            Self::CrossDomain { key, .. } => key.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub title: String,
    pub category: Category,
    pub priority: f64,
    pub business_justification: String,
    /// Return on remediation cost: `(risk_avoided - cost) / cost × 100`.
    ///
    /// Unbounded; negative for a fix that costs more than it avoids, and 0
    /// when the fix has no modeled cost.
    pub expected_roi_pct: f64,
    pub risk_reduction_pct: f64,
    pub timeline: String,
    pub implementation_effort_hours: f64,
    pub severity: Severity,
    pub affected_domains: BTreeSet<Category>,
    pub source: RecommendationSource,
    /// Revenue modeled as exposed while the item stays open.
    pub modeled_exposure: f64,
    /// Share of the exposure removed by doing the work.
    pub risk_avoided: f64,
    /// Effort priced at the business hourly rate.
    pub remediation_cost: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub critical_processes: Vec<String>,
}

impl Recommendation {
    pub fn net_benefit(&self) -> f64 {
        self.risk_avoided - self.remediation_cost
    }

    pub fn is_cross_domain(&self) -> bool {
        matches!(self.source, RecommendationSource::CrossDomain { .. })
    }
}

/// Ordering: priority descending, then severity descending, then title, then
/// source key.
pub fn compare(a: &Recommendation, b: &Recommendation) -> Ordering {
    b.priority
        .total_cmp(&a.priority)
        .then_with(|| b.severity.cmp(&a.severity))
        .then_with(|| a.title.cmp(&b.title))
        .then_with(|| a.source.key().cmp(&b.source.key()))
}

/// Delivery window for an item of this effort and severity.
pub fn timeline(effort_hours: f64, severity: Severity) -> String {
    let window = if effort_hours <= 16.0 {
        "1-2 weeks"
    } else if effort_hours <= 80.0 {
        "2-4 weeks"
    } else if effort_hours <= 240.0 {
        "1-3 months"
    } else {
        "3-6 months"
    };
    if severity.is_critical() {
        format!("immediate, {}", window)
    } else {
        window.to_string()
    }
}

/// Inputs shared by the singleton and cross-domain paths.
struct Sizing<'a> {
    severity: Severity,
    categories: Vec<&'a Category>,
    texts: Vec<&'a str>,
    effort_hours: f64,
}

struct Modeled {
    priority: f64,
    exposure: f64,
    risk_reduction_pct: f64,
    risk_avoided: f64,
    cost: f64,
    roi_pct: f64,
    processes: Vec<String>,
    spread: usize,
}

fn model(sizing: &Sizing<'_>, business: &BusinessContext) -> Modeled {
    let spread = sizing
        .categories
        .iter()
        .collect::<BTreeSet<_>>()
        .len()
        .max(1);
    let factor = business.impact_factor(&sizing.categories, &sizing.texts);
    let priority = sizing.severity.weight() * spread as f64 * factor;

    let exposure = business.annual_revenue.max(0.0)
        * sizing.severity.revenue_exposure()
        * factor
        * spread as f64;
    let risk_reduction_pct = (sizing.severity.base_risk_reduction()
        * (1.0 + 0.5 * (spread as f64 - 1.0)))
        .min(MAX_RISK_REDUCTION_PCT);
    let risk_avoided = exposure * risk_reduction_pct / 100.0;
    let cost = sizing.effort_hours * business.hourly_rate.max(0.0);
    let roi_pct = if cost > 0.0 {
        (risk_avoided - cost) / cost * 100.0
    } else {
        0.0
    };

    Modeled {
        priority,
        exposure,
        risk_reduction_pct,
        risk_avoided,
        cost,
        roi_pct,
        processes: business
            .mentioned_processes(&sizing.texts)
            .into_iter()
            .map(String::from)
            .collect(),
        spread,
    }
}

fn justification(
    severity: Severity,
    domains: &BTreeSet<Category>,
    sizing: &Sizing<'_>,
    m: &Modeled,
) -> String {
    let scope = if m.spread > 1 {
        format!(
            "{} risk spanning {}",
            severity,
            domains
                .iter()
                .map(Category::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        )
    } else {
        let category = domains.iter().next().map(Category::as_str).unwrap_or("general");
        format!("{} {} risk", severity, category)
    };
    let mut text = format!(
        "{}; modeled exposure {:.0}, fixing avoids {:.0} for {:.0} ({:.0}h of effort)",
        scope, m.exposure, m.risk_avoided, m.cost, sizing.effort_hours
    );
    if !m.processes.is_empty() {
        text.push_str(&format!("; touches critical process: {}", m.processes.join(", ")));
    }
    text
}

fn effort_of(finding: &LocatedFinding) -> f64 {
    let declared: f64 = finding
        .remediations
        .iter()
        .map(|r| r.effort_hours.max(0.0))
        .sum();
    if declared > 0.0 {
        declared
    } else {
        finding.finding.severity.default_effort_hours()
    }
}

fn singleton(finding: &LocatedFinding, business: &BusinessContext) -> Recommendation {
    let sizing = Sizing {
        severity: finding.finding.severity,
        categories: vec![&finding.category],
        texts: vec![finding.finding.text.as_str()],
        effort_hours: effort_of(finding),
    };
    let modeled = model(&sizing, business);
    let domains = BTreeSet::from([finding.category.clone()]);

    let title = finding
        .remediations
        .first()
        .map(|r| r.title.clone())
        .unwrap_or_else(|| {
            format!(
                "Resolve {} finding: {}",
                finding.category, finding.finding.text
            )
        });

    Recommendation {
        business_justification: justification(sizing.severity, &domains, &sizing, &modeled),
        timeline: timeline(sizing.effort_hours, sizing.severity),
        title,
        category: finding.category.clone(),
        priority: modeled.priority,
        expected_roi_pct: modeled.roi_pct,
        risk_reduction_pct: modeled.risk_reduction_pct,
        implementation_effort_hours: sizing.effort_hours,
        severity: sizing.severity,
        affected_domains: domains,
        source: RecommendationSource::Finding {
            audit_id: finding.audit_id.clone(),
            finding_index: finding.index,
        },
        modeled_exposure: modeled.exposure,
        risk_avoided: modeled.risk_avoided,
        remediation_cost: modeled.cost,
        critical_processes: modeled.processes,
    }
}

fn cross_domain(
    issue_index: usize,
    issue: &CrossDomainIssue,
    members: &[&LocatedFinding],
    business: &BusinessContext,
) -> Recommendation {
    let sizing = Sizing {
        severity: issue.severity,
        categories: members.iter().map(|m| &m.category).collect(),
        texts: members.iter().map(|m| m.finding.text.as_str()).collect(),
        effort_hours: members.iter().map(|m| effort_of(m)).sum(),
    };
    let modeled = model(&sizing, business);

    // Lead category: the worst member's, first by position on ties.
    let category = members
        .iter()
        .fold(None::<&LocatedFinding>, |best, m| match best {
            Some(b) if b.finding.severity >= m.finding.severity => Some(b),
            _ => Some(*m),
        })
        .map(|m| m.category.clone())
        .unwrap_or_else(|| Category::Custom("CROSS_DOMAIN".to_string()));

    Recommendation {
        business_justification: justification(
            sizing.severity,
            &issue.affected_domains,
            &sizing,
            &modeled,
        ),
        timeline: timeline(sizing.effort_hours, sizing.severity),
        title: issue.title.clone(),
        category,
        priority: modeled.priority,
        expected_roi_pct: modeled.roi_pct,
        risk_reduction_pct: modeled.risk_reduction_pct,
        implementation_effort_hours: sizing.effort_hours,
        severity: sizing.severity,
        affected_domains: issue.affected_domains.clone(),
        source: RecommendationSource::CrossDomain {
            issue_index,
            key: issue.key(),
        },
        modeled_exposure: modeled.exposure,
        risk_avoided: modeled.risk_avoided,
        remediation_cost: modeled.cost,
        critical_processes: modeled.processes,
    }
}

/// Build and rank recommendations for a correlated set of findings.
pub fn prioritize(
    findings: &[LocatedFinding],
    correlation: &Correlation,
    business: &BusinessContext,
) -> Vec<Recommendation> {
    let mut recommendations: Vec<Recommendation> = correlation
        .singletons
        .iter()
        .map(|&i| singleton(&findings[i], business))
        .collect();

    for (issue_index, (issue, members)) in correlation
        .issues
        .iter()
        .zip(&correlation.issue_members)
        .enumerate()
    {
        let members: Vec<&LocatedFinding> = members.iter().map(|&i| &findings[i]).collect();
        recommendations.push(cross_domain(issue_index, issue, &members, business));
    }

    recommendations.sort_by(compare);
    recommendations
}
