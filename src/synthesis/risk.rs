//! Category and overall risk scores.
//!
//! A category starts at 100 and loses [`Severity::score_penalty`] points per
//! finding. A category with any critical finding is capped at
//! [`CRITICAL_CATEGORY_CAP`]. The overall score is
//! `100 − weighted_avg(100 − category_score)`, and never exceeds the score of a
//! critical-capped category.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::audit::{AuditResult, Category, Severity};

/// Highest score a category with a critical finding can reach.
pub const CRITICAL_CATEGORY_CAP: f64 = 49.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub category: Category,
    /// 0 (worst) to 100 (no findings).
    pub score: f64,
    pub finding_count: usize,
    pub critical_count: usize,
    /// Weight in the overall score.
    pub weight: f64,
}

/// Score every category that has at least one successful audit.
///
/// `weights` maps a category to its weight; missing categories weigh 1.0.
/// Results are ordered by category.
pub fn score_categories(
    results: &[&AuditResult],
    weights: &BTreeMap<Category, f64>,
) -> Vec<CategoryScore> {
    let mut by_category: BTreeMap<&Category, (usize, usize, f64)> = BTreeMap::new();
    for result in results.iter().filter(|r| r.is_success()) {
        let entry = by_category.entry(&result.category).or_default();
        for finding in &result.findings {
            entry.0 += 1;
            if finding.severity == Severity::Critical {
                entry.1 += 1;
            }
            entry.2 += finding.severity.score_penalty();
        }
    }

    by_category
        .into_iter()
        .map(|(category, (finding_count, critical_count, penalty))| {
            let mut score = (100.0 - penalty).clamp(0.0, 100.0);
            if critical_count > 0 {
                score = score.min(CRITICAL_CATEGORY_CAP);
            }
            CategoryScore {
                category: category.clone(),
                score,
                finding_count,
                critical_count,
                weight: weights.get(category).copied().unwrap_or(1.0).max(0.0),
            }
        })
        .collect()
}

/// Overall score in `[0, 100]`; 100 when there are no scored categories.
pub fn overall_risk_score(scores: &[CategoryScore]) -> f64 {
    if scores.is_empty() {
        return 100.0;
    }

    let total_weight: f64 = scores.iter().map(|s| s.weight).sum();
    let deficit = if total_weight > 0.0 {
        scores
            .iter()
            .map(|s| s.weight * (100.0 - s.score))
            .sum::<f64>()
            / total_weight
    } else {
        scores.iter().map(|s| 100.0 - s.score).sum::<f64>() / scores.len() as f64
    };

    let capped = scores
        .iter()
        .filter(|s| s.critical_count > 0)
        .map(|s| s.score)
        .fold(100.0_f64, f64::min);

    (100.0 - deficit).min(capped).clamp(0.0, 100.0)
}
