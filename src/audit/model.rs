//! Result types produced by audits.
//!
//! ## Types
//!
//! - [`Severity`]: four-level severity shared by findings and results
//! - [`Category`]: the domain an audit reports on
//! - [`Finding`]: one reported issue with its evidence references
//! - [`Remediation`]: an audit-declared fix with an effort estimate
//! - [`AuditOutput`]: what an audit task returns
//! - [`AuditResult`]: the engine-stamped record of one audit execution
//!
//! ## Example
//!
//! ```
//! use auditor::audit::{AuditOutput, Finding, Remediation, Severity};
//!
//! let output = AuditOutput::new()
//!     .with_finding(
//!         Finding::new(Severity::Critical, "weak session secret")
//!             .with_evidence("src/session.rs"),
//!     )
//!     .with_remediation(Remediation::new("Rotate session secret", 6.0).for_finding(0));
//!
//! assert_eq!(output.findings.len(), 1);
//! assert_eq!(output.max_severity(), Some(Severity::Critical));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::task::AuditDescriptor;

/// Tag carried by every synthetic result produced for a failed audit.
pub const EXECUTION_FAILED: &str = "audit execution failed";

/// Severity level for findings and audit results.
///
/// Ordered from least to most severe so that `max()` picks the worst.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Multiplier used by prioritization.
    pub fn weight(&self) -> f64 {
        match self {
            Self::Low => 1.0,
            Self::Medium => 4.0,
            Self::High => 7.0,
            Self::Critical => 10.0,
        }
    }

    /// Points deducted from a category score per finding of this severity.
    pub fn score_penalty(&self) -> f64 {
        match self {
            Self::Low => 2.0,
            Self::Medium => 7.0,
            Self::High => 15.0,
            Self::Critical => 25.0,
        }
    }

    /// Share of annual revenue modeled as exposed by one unaddressed finding.
    pub fn revenue_exposure(&self) -> f64 {
        match self {
            Self::Low => 0.001,
            Self::Medium => 0.005,
            Self::High => 0.02,
            Self::Critical => 0.05,
        }
    }

    /// Baseline risk reduction (percent) from fixing one finding.
    pub fn base_risk_reduction(&self) -> f64 {
        match self {
            Self::Low => 5.0,
            Self::Medium => 12.0,
            Self::High => 25.0,
            Self::Critical => 40.0,
        }
    }

    /// Effort assumed for a finding that no remediation estimates.
    pub fn default_effort_hours(&self) -> f64 {
        match self {
            Self::Low => 4.0,
            Self::Medium => 12.0,
            Self::High => 24.0,
            Self::Critical => 40.0,
        }
    }

    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Critical)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Severity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => anyhow::bail!(
                "Invalid severity '{}'. Valid values: critical, high, medium, low",
                s
            ),
        }
    }
}

/// The domain an audit reports on.
///
/// Well-known domains are unit variants; anything else round-trips through
/// `Custom` as an upper-case string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Security,
    Authentication,
    Authorization,
    Compliance,
    DataPrivacy,
    Performance,
    Reliability,
    Architecture,
    CodeQuality,
    Dependencies,
    Infrastructure,
    Accessibility,
    #[serde(untagged)]
    Custom(String),
}

impl Category {
    /// Domains whose findings count toward compliance readiness.
    pub fn is_compliance_relevant(&self) -> bool {
        matches!(
            self,
            Self::Security
                | Self::Authentication
                | Self::Authorization
                | Self::Compliance
                | Self::DataPrivacy
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Security => "SECURITY",
            Self::Authentication => "AUTHENTICATION",
            Self::Authorization => "AUTHORIZATION",
            Self::Compliance => "COMPLIANCE",
            Self::DataPrivacy => "DATA_PRIVACY",
            Self::Performance => "PERFORMANCE",
            Self::Reliability => "RELIABILITY",
            Self::Architecture => "ARCHITECTURE",
            Self::CodeQuality => "CODE_QUALITY",
            Self::Dependencies => "DEPENDENCIES",
            Self::Infrastructure => "INFRASTRUCTURE",
            Self::Accessibility => "ACCESSIBILITY",
            Self::Custom(name) => name.as_str(),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Category {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace(['-', ' '], "_");
        Ok(match normalized.as_str() {
            "SECURITY" => Self::Security,
            "AUTHENTICATION" | "AUTH" => Self::Authentication,
            "AUTHORIZATION" => Self::Authorization,
            "COMPLIANCE" => Self::Compliance,
            "DATA_PRIVACY" | "PRIVACY" => Self::DataPrivacy,
            "PERFORMANCE" => Self::Performance,
            "RELIABILITY" => Self::Reliability,
            "ARCHITECTURE" => Self::Architecture,
            "CODE_QUALITY" => Self::CodeQuality,
            "DEPENDENCIES" => Self::Dependencies,
            "INFRASTRUCTURE" => Self::Infrastructure,
            "ACCESSIBILITY" => Self::Accessibility,
            _ => Self::Custom(normalized),
        })
    }
}

/// A single reported issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Description of the issue.
    pub text: String,
    pub severity: Severity,
    /// References to the evidence backing this finding (paths, rule ids, urls).
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub evidence_refs: BTreeSet<String>,
}

impl Finding {
    pub fn new(severity: Severity, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            severity,
            evidence_refs: BTreeSet::new(),
        }
    }

    /// Attach an evidence reference.
    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence_refs.insert(evidence.into());
        self
    }
}

/// A fix declared by an audit, with its effort estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Remediation {
    pub title: String,
    /// Estimated implementation effort in hours.
    pub effort_hours: f64,
    /// Index of the finding this remediation addresses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finding_index: Option<usize>,
}

impl Remediation {
    pub fn new(title: impl Into<String>, effort_hours: f64) -> Self {
        Self {
            title: title.into(),
            effort_hours,
            finding_index: None,
        }
    }

    pub fn for_finding(mut self, index: usize) -> Self {
        self.finding_index = Some(index);
        self
    }
}

/// What an audit task hands back to the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditOutput {
    /// Explicit result severity; derived from the findings when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub findings: Vec<Finding>,
    #[serde(default)]
    pub recommendations: Vec<Remediation>,
}

impl AuditOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_finding(mut self, finding: Finding) -> Self {
        self.findings.push(finding);
        self
    }

    pub fn with_remediation(mut self, remediation: Remediation) -> Self {
        self.recommendations.push(remediation);
        self
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.findings.iter().map(|f| f.severity).max()
    }
}

/// How an audit execution failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskErrorKind {
    /// `run` returned an error.
    Failed,
    /// `run` panicked.
    Panicked,
}

/// Error details recorded on a failed audit's result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: TaskErrorKind,
    pub message: String,
}

impl ErrorInfo {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            kind: TaskErrorKind::Failed,
            message: message.into(),
        }
    }

    pub fn panicked(message: impl Into<String>) -> Self {
        Self {
            kind: TaskErrorKind::Panicked,
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TaskErrorKind::Failed => write!(f, "{}: {}", EXECUTION_FAILED, self.message),
            TaskErrorKind::Panicked => {
                write!(f, "{} (panic): {}", EXECUTION_FAILED, self.message)
            }
        }
    }
}

/// The record of one audit execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditResult {
    pub audit_id: String,
    pub category: Category,
    pub severity: Severity,
    pub findings: Vec<Finding>,
    pub recommendations: Vec<Remediation>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl AuditResult {
    /// Stamp a task's output with the audit's identity and timing.
    pub fn from_output(
        descriptor: &AuditDescriptor,
        output: AuditOutput,
        duration: Duration,
    ) -> Self {
        let severity = output
            .severity
            .or_else(|| output.max_severity())
            .unwrap_or_default();

        Self {
            audit_id: descriptor.id.clone(),
            category: descriptor.category.clone(),
            severity,
            findings: output.findings,
            recommendations: output.recommendations,
            duration_ms: duration.as_millis() as u64,
            error: None,
        }
    }

    /// Synthetic critical result for an audit whose execution failed.
    pub fn failure(descriptor: &AuditDescriptor, error: ErrorInfo, duration: Duration) -> Self {
        Self {
            audit_id: descriptor.id.clone(),
            category: descriptor.category.clone(),
            severity: Severity::Critical,
            findings: Vec::new(),
            recommendations: Vec::new(),
            duration_ms: duration.as_millis() as u64,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn has_critical_finding(&self) -> bool {
        self.findings.iter().any(|f| f.severity.is_critical())
    }

    /// Remediations declared for the finding at `index`.
    pub fn remediations_for(&self, index: usize) -> impl Iterator<Item = &Remediation> {
        self.recommendations
            .iter()
            .filter(move |r| r.finding_index == Some(index))
    }
}
