//! The report handed back for every completed run.
//!
//! A [`PipelineReport`] is always well formed: failed audits, skipped phases
//! and deadline truncation are recorded as data, never as errors.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::audit::AuditResult;
use crate::dag::PhasePlan;
use crate::pipeline::PhaseSummary;
use crate::synthesis::Synthesis;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every audit ran and succeeded
    Completed,
    /// Every audit ran; some failed
    CompletedWithFailures,
    /// A phase failed entirely and the halt policy stopped the run
    Halted,
    /// The wall-clock budget ran out
    Truncated,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::CompletedWithFailures => write!(f, "completed with failures"),
            Self::Halted => write!(f, "halted"),
            Self::Truncated => write!(f, "truncated"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub status: RunStatus,
    pub plan: PhasePlan,
    pub phases: Vec<PhaseSummary>,
    /// Every resolved result, ordered by audit id.
    pub results: Vec<AuditResult>,
    /// Audits that never launched.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<String>,
    /// Audits still running when the grace period ended.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub abandoned: Vec<String>,
    pub synthesis: Synthesis,
}

impl PipelineReport {
    pub fn result(&self, audit_id: &str) -> Option<&AuditResult> {
        self.results.iter().find(|r| r.audit_id == audit_id)
    }

    pub fn is_truncated(&self) -> bool {
        self.synthesis.truncated
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.is_success()).count()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize report as JSON")
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize report as YAML")
    }

    /// One line suitable for logs and terminals.
    pub fn summary(&self) -> String {
        let short_id: String = self.run_id.chars().take(8).collect();
        let synthesis = &self.synthesis;
        format!(
            "run {}: {}, {} of {} audits in {} phase(s), {} failed, \
             risk score {:.0}/100, {} cross-domain issue(s), {} recommendation(s)",
            short_id,
            self.status,
            self.results.len(),
            self.plan.total_audits(),
            self.plan.len(),
            self.failed_count(),
            synthesis.overall_risk_score,
            synthesis.cross_domain_issues.len(),
            synthesis.prioritized_recommendations.len(),
        )
    }
}

impl RunStatus {
    /// Status from the run's flags. Truncation wins over halting.
    pub fn from_run(truncated: bool, halted: bool, any_failed: bool) -> Self {
        if truncated {
            Self::Truncated
        } else if halted {
            Self::Halted
        } else if any_failed {
            Self::CompletedWithFailures
        } else {
            Self::Completed
        }
    }
}
