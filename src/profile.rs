//! Business and codebase descriptors handed to audits and to prioritization.
//!
//! Both are flat data records. The engine never interprets
//! [`CodebaseContext`]; [`BusinessContext`] feeds the business impact factor,
//! ROI modeling and compliance gap analysis.
//!
//! ```toml
//! [business]
//! industry = "finance"
//! scale = "enterprise"
//! annual_revenue = 25000000.0
//! hourly_rate = 180.0
//! critical_processes = ["payments", "login"]
//! compliance_frameworks = ["PCI-DSS", "SOC2"]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::audit::Category;

/// Industry the audited system serves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Industry {
    Finance,
    Healthcare,
    Ecommerce,
    Saas,
    Manufacturing,
    Government,
    Education,
    #[default]
    General,
}

impl Industry {
    /// Baseline impact multiplier for the industry.
    pub fn impact_multiplier(&self) -> f64 {
        match self {
            Self::Finance | Self::Healthcare => 1.3,
            Self::Government => 1.2,
            Self::Ecommerce | Self::Saas => 1.1,
            Self::Manufacturing | Self::General => 1.0,
            Self::Education => 0.9,
        }
    }

    /// How strongly the industry weighs findings of a category.
    pub fn emphasis(&self, category: &Category) -> f64 {
        use Category::*;
        match (self, category) {
            (Self::Finance, Compliance) => 1.5,
            (Self::Finance, Security) => 1.4,
            (Self::Finance, Authentication | DataPrivacy) => 1.3,
            (Self::Healthcare, DataPrivacy) => 1.6,
            (Self::Healthcare, Compliance) => 1.5,
            (Self::Healthcare, Security) => 1.3,
            (Self::Healthcare, Authentication) => 1.2,
            (Self::Ecommerce, Performance) => 1.4,
            (Self::Ecommerce, Reliability) => 1.3,
            (Self::Ecommerce, Security) => 1.2,
            (Self::Saas, Reliability) => 1.4,
            (Self::Saas, Security) => 1.3,
            (Self::Saas, Performance) => 1.2,
            (Self::Manufacturing, Reliability) => 1.4,
            (Self::Manufacturing, Infrastructure) => 1.3,
            (Self::Government, Compliance) => 1.6,
            (Self::Government, Security) => 1.5,
            (Self::Government, Accessibility) => 1.4,
            (Self::Education, Accessibility | DataPrivacy) => 1.3,
            _ => 1.0,
        }
    }
}

/// Organization size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrgScale {
    Startup,
    #[default]
    SmallBusiness,
    MidMarket,
    Enterprise,
}

impl OrgScale {
    pub fn multiplier(&self) -> f64 {
        match self {
            Self::Startup => 0.8,
            Self::SmallBusiness => 1.0,
            Self::MidMarket => 1.2,
            Self::Enterprise => 1.5,
        }
    }
}

/// Boost applied when a finding touches a declared critical process.
pub const CRITICAL_PROCESS_BOOST: f64 = 1.25;

const MIN_IMPACT_FACTOR: f64 = 0.1;
const MAX_IMPACT_FACTOR: f64 = 5.0;

fn default_annual_revenue() -> f64 {
    1_000_000.0
}

fn default_hourly_rate() -> f64 {
    150.0
}

/// Business profile of the audited organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessContext {
    #[serde(default)]
    pub industry: Industry,
    #[serde(default)]
    pub scale: OrgScale,
    /// Business processes whose disruption is most costly (e.g., "checkout")
    #[serde(default)]
    pub critical_processes: Vec<String>,
    /// Annual revenue used to model exposure
    #[serde(default = "default_annual_revenue")]
    pub annual_revenue: f64,
    /// Blended engineering cost per hour
    #[serde(default = "default_hourly_rate")]
    pub hourly_rate: f64,
    /// Frameworks the organization must comply with (e.g., "SOC2")
    #[serde(default)]
    pub compliance_frameworks: Vec<String>,
    /// Per-category emphasis overriding the industry table
    #[serde(default)]
    pub category_weights: BTreeMap<Category, f64>,
}

impl Default for BusinessContext {
    fn default() -> Self {
        Self {
            industry: Industry::default(),
            scale: OrgScale::default(),
            critical_processes: Vec::new(),
            annual_revenue: default_annual_revenue(),
            hourly_rate: default_hourly_rate(),
            compliance_frameworks: Vec::new(),
            category_weights: BTreeMap::new(),
        }
    }
}

impl BusinessContext {
    pub fn new(industry: Industry, scale: OrgScale) -> Self {
        Self {
            industry,
            scale,
            ..Default::default()
        }
    }

    pub fn with_critical_process(mut self, process: impl Into<String>) -> Self {
        self.critical_processes.push(process.into());
        self
    }

    pub fn with_framework(mut self, framework: impl Into<String>) -> Self {
        self.compliance_frameworks.push(framework.into());
        self
    }

    pub fn with_annual_revenue(mut self, revenue: f64) -> Self {
        self.annual_revenue = revenue;
        self
    }

    pub fn with_hourly_rate(mut self, rate: f64) -> Self {
        self.hourly_rate = rate;
        self
    }

    /// Emphasis for a category: explicit weight if configured, else the industry table.
    pub fn category_emphasis(&self, category: &Category) -> f64 {
        self.category_weights
            .get(category)
            .copied()
            .unwrap_or_else(|| self.industry.emphasis(category))
    }

    /// Critical processes mentioned (case-insensitively) in any of `texts`.
    pub fn mentioned_processes<'a>(&'a self, texts: &[&str]) -> Vec<&'a str> {
        let lowered: Vec<String> = texts.iter().map(|t| t.to_lowercase()).collect();
        self.critical_processes
            .iter()
            .filter(|p| {
                let needle = p.to_lowercase();
                !needle.is_empty() && lowered.iter().any(|t| t.contains(&needle))
            })
            .map(String::as_str)
            .collect()
    }

    /// Business impact factor for findings of `categories` described by `texts`.
    ///
    /// Uses the strongest emphasis among the categories. Clamped to 0.1..=5.0.
    pub fn impact_factor(&self, categories: &[&Category], texts: &[&str]) -> f64 {
        let emphasis = categories
            .iter()
            .map(|c| self.category_emphasis(c))
            .fold(1.0_f64, f64::max);
        let boost = if self.mentioned_processes(texts).is_empty() {
            1.0
        } else {
            CRITICAL_PROCESS_BOOST
        };

        let factor = self.industry.impact_multiplier() * self.scale.multiplier() * emphasis * boost;
        factor.clamp(MIN_IMPACT_FACTOR, MAX_IMPACT_FACTOR)
    }
}

/// Opaque description of the codebase under audit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodebaseContext {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub root: PathBuf,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl CodebaseContext {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            ..Default::default()
        }
    }
}
