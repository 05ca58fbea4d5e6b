//! Implementation roadmap and critical path.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::prioritize::Recommendation;
use crate::audit::{Category, Severity};

/// Roadmap packing parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoadmapSettings {
    /// Effort budget for one roadmap phase, in hours.
    pub phase_effort_budget_hours: f64,
    /// How many of the top recommendations are scheduled.
    pub max_items: usize,
    /// Team capacity used to turn effort into calendar weeks.
    pub team_hours_per_week: f64,
    pub hourly_rate: f64,
}

impl Default for RoadmapSettings {
    fn default() -> Self {
        Self {
            phase_effort_budget_hours: 80.0,
            max_items: 25,
            team_hours_per_week: 40.0,
            hourly_rate: 150.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadmapPhase {
    /// 1-based position in the roadmap.
    pub phase: usize,
    pub name: String,
    pub objectives: Vec<String>,
    pub deliverables: Vec<String>,
    pub effort_hours: f64,
    pub cost: f64,
    pub duration_weeks: f64,
    /// Combined risk reduction of the phase's items.
    pub risk_reduction_pct: f64,
}

/// One step of the critical path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalStep {
    pub step: usize,
    pub title: String,
    pub category: Category,
    pub effort_hours: f64,
    pub cumulative_effort_hours: f64,
    /// Roadmap phase the step landed in, if it was scheduled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roadmap_phase: Option<usize>,
}

/// Pack the top recommendations into sequential phases.
///
/// Items keep their priority order. A phase closes when the next item would
/// exceed the budget; an item larger than the budget gets a phase of its own.
pub fn build_roadmap(
    recommendations: &[Recommendation],
    settings: &RoadmapSettings,
) -> Vec<RoadmapPhase> {
    let budget = settings.phase_effort_budget_hours;
    let mut groups: Vec<Vec<&Recommendation>> = Vec::new();
    let mut current: Vec<&Recommendation> = Vec::new();
    let mut current_effort = 0.0;

    for rec in recommendations.iter().take(settings.max_items) {
        let effort = rec.implementation_effort_hours;
        if !current.is_empty() && current_effort + effort > budget {
            groups.push(std::mem::take(&mut current));
            current_effort = 0.0;
        }
        current.push(rec);
        current_effort += effort;
    }
    if !current.is_empty() {
        groups.push(current);
    }

    groups
        .into_iter()
        .enumerate()
        .map(|(i, items)| phase_from(i + 1, &items, settings))
        .collect()
}

fn phase_from(
    phase: usize,
    items: &[&Recommendation],
    settings: &RoadmapSettings,
) -> RoadmapPhase {
    let effort_hours: f64 = items.iter().map(|r| r.implementation_effort_hours).sum();

    let mut per_category: BTreeMap<&Category, usize> = BTreeMap::new();
    for item in items {
        *per_category.entry(&item.category).or_default() += 1;
    }
    let focus = per_category
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(c, _)| c.as_str())
        .unwrap_or("general");

    let critical = items
        .iter()
        .filter(|r| r.severity == Severity::Critical)
        .count();
    let name = if critical > 0 {
        format!("Phase {}: critical {} remediation", phase, focus.to_lowercase())
    } else {
        format!("Phase {}: {} hardening", phase, focus.to_lowercase())
    };

    let mut objectives = Vec::new();
    if critical > 0 {
        objectives.push(format!("Close {} critical exposure(s)", critical));
    }
    for (category, count) in &per_category {
        objectives.push(format!("Reduce {} risk ({} item(s))", category, count));
    }

    let remaining: f64 = items
        .iter()
        .map(|r| 1.0 - r.risk_reduction_pct.clamp(0.0, 100.0) / 100.0)
        .product();

    RoadmapPhase {
        phase,
        name,
        objectives,
        deliverables: items
            .iter()
            .map(|r| format!("{} ({})", r.title, r.timeline))
            .collect(),
        effort_hours,
        cost: effort_hours * settings.hourly_rate.max(0.0),
        duration_weeks: if settings.team_hours_per_week > 0.0 {
            effort_hours / settings.team_hours_per_week
        } else {
            0.0
        },
        risk_reduction_pct: ((1.0 - remaining) * 100.0).clamp(0.0, 100.0),
    }
}

/// Ordered steps for every critical recommendation.
pub fn critical_path(
    recommendations: &[Recommendation],
    roadmap: &[RoadmapPhase],
    settings: &RoadmapSettings,
) -> Vec<CriticalStep> {
    // Phase membership mirrors build_roadmap: position i of the top list.
    let mut phase_of_position: Vec<usize> = Vec::new();
    for phase in roadmap {
        phase_of_position.extend(std::iter::repeat_n(phase.phase, phase.deliverables.len()));
    }

    let mut cumulative = 0.0;
    recommendations
        .iter()
        .enumerate()
        .filter(|(_, r)| r.severity == Severity::Critical)
        .enumerate()
        .map(|(step, (position, rec))| {
            cumulative += rec.implementation_effort_hours;
            CriticalStep {
                step: step + 1,
                title: rec.title.clone(),
                category: rec.category.clone(),
                effort_hours: rec.implementation_effort_hours,
                cumulative_effort_hours: cumulative,
                roadmap_phase: (position < settings.max_items)
                    .then(|| phase_of_position.get(position).copied())
                    .flatten(),
            }
        })
        .collect()
}
