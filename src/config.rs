//! Engine configuration.
//!
//! Settings are read from `auditor.toml` and can be overridden by the
//! environment. Layering is file → environment → explicit builder calls.
//!
//! # Configuration File Format
//!
//! ```toml
//! [engine]
//! concurrency_cap = 4
//! phase_effort_budget_hours = 80.0
//! wall_clock_budget_ms = 300000
//! correlation_threshold = 0.5
//! grace_period_ms = 0
//! on_phase_failure = "continue"
//! exclude = ["slow-fuzz"]
//!
//! [business]
//! industry = "finance"
//! scale = "enterprise"
//! compliance_frameworks = ["SOC2"]
//! ```
//!
//! Environment overrides: `AUDITOR_CONCURRENCY_CAP`,
//! `AUDITOR_WALL_CLOCK_BUDGET_MS`, `AUDITOR_CORRELATION_THRESHOLD`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::errors::ConfigError;
use crate::profile::BusinessContext;

/// Largest accepted `concurrency_cap`: the most permits a tokio semaphore holds.
pub const MAX_CONCURRENCY_CAP: usize = tokio::sync::Semaphore::MAX_PERMITS;

/// Largest accepted `event_buffer`. The broadcast ring is allocated up front.
pub const MAX_EVENT_BUFFER: usize = 1 << 16;

/// Default file name looked up by [`AuditorToml::load_or_default`].
pub const CONFIG_FILE: &str = "auditor.toml";

pub const ENV_CONCURRENCY_CAP: &str = "AUDITOR_CONCURRENCY_CAP";
pub const ENV_WALL_CLOCK_BUDGET_MS: &str = "AUDITOR_WALL_CLOCK_BUDGET_MS";
pub const ENV_CORRELATION_THRESHOLD: &str = "AUDITOR_CORRELATION_THRESHOLD";

/// What the coordinator does when every audit in a phase fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseFailurePolicy {
    /// Keep going; later audits see no results for the failed ones
    #[default]
    Continue,
    /// Stop scheduling further phases and synthesize what completed
    Halt,
}

impl std::fmt::Display for PhaseFailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhaseFailurePolicy::Continue => write!(f, "continue"),
            PhaseFailurePolicy::Halt => write!(f, "halt"),
        }
    }
}

impl std::str::FromStr for PhaseFailurePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "continue" => Ok(PhaseFailurePolicy::Continue),
            "halt" => Ok(PhaseFailurePolicy::Halt),
            _ => anyhow::bail!(
                "Invalid phase failure policy '{}'. Valid values: continue, halt",
                s
            ),
        }
    }
}

fn default_concurrency_cap() -> usize {
    4
}

fn default_phase_effort_budget_hours() -> f64 {
    80.0
}

fn default_wall_clock_budget_ms() -> u64 {
    300_000
}

fn default_correlation_threshold() -> f64 {
    0.5
}

fn default_event_buffer() -> usize {
    256
}

fn default_max_roadmap_items() -> usize {
    25
}

fn default_team_hours_per_week() -> f64 {
    40.0
}

/// Settings for one engine run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum audits running at once within a phase
    #[serde(default = "default_concurrency_cap")]
    pub concurrency_cap: usize,
    /// Effort budget per roadmap phase, in hours
    #[serde(default = "default_phase_effort_budget_hours")]
    pub phase_effort_budget_hours: f64,
    /// Wall-clock budget for the whole run
    #[serde(default = "default_wall_clock_budget_ms")]
    pub wall_clock_budget_ms: u64,
    /// Minimum correlation (exclusive) for two findings to be linked
    #[serde(default = "default_correlation_threshold")]
    pub correlation_threshold: f64,
    /// How long in-flight audits may keep running past the deadline
    #[serde(default)]
    pub grace_period_ms: u64,
    /// Behavior when every audit in a phase fails
    #[serde(default)]
    pub on_phase_failure: PhaseFailurePolicy,
    /// Audit ids to leave out of the run
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Capacity of the lifecycle event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// Number of top recommendations placed on the roadmap
    #[serde(default = "default_max_roadmap_items")]
    pub max_roadmap_items: usize,
    /// Engineering hours available per week, for roadmap durations
    #[serde(default = "default_team_hours_per_week")]
    pub team_hours_per_week: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency_cap: default_concurrency_cap(),
            phase_effort_budget_hours: default_phase_effort_budget_hours(),
            wall_clock_budget_ms: default_wall_clock_budget_ms(),
            correlation_threshold: default_correlation_threshold(),
            grace_period_ms: 0,
            on_phase_failure: PhaseFailurePolicy::default(),
            exclude: Vec::new(),
            event_buffer: default_event_buffer(),
            max_roadmap_items: default_max_roadmap_items(),
            team_hours_per_week: default_team_hours_per_week(),
        }
    }
}

impl EngineConfig {
    pub fn with_concurrency_cap(mut self, cap: usize) -> Self {
        self.concurrency_cap = cap;
        self
    }

    pub fn with_wall_clock_budget(mut self, budget: Duration) -> Self {
        self.wall_clock_budget_ms = budget.as_millis() as u64;
        self
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period_ms = grace.as_millis() as u64;
        self
    }

    pub fn with_correlation_threshold(mut self, threshold: f64) -> Self {
        self.correlation_threshold = threshold;
        self
    }

    pub fn with_phase_effort_budget(mut self, hours: f64) -> Self {
        self.phase_effort_budget_hours = hours;
        self
    }

    pub fn with_phase_failure_policy(mut self, policy: PhaseFailurePolicy) -> Self {
        self.on_phase_failure = policy;
        self
    }

    pub fn with_exclusions<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn wall_clock_budget(&self) -> Duration {
        Duration::from_millis(self.wall_clock_budget_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    /// Reject out-of-range settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency_cap == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.concurrency_cap > MAX_CONCURRENCY_CAP {
            return Err(ConfigError::ConcurrencyTooLarge {
                cap: self.concurrency_cap,
                max: MAX_CONCURRENCY_CAP,
            });
        }
        if !(self.phase_effort_budget_hours > 0.0 && self.phase_effort_budget_hours.is_finite()) {
            return Err(ConfigError::InvalidEffortBudget(self.phase_effort_budget_hours));
        }
        if self.wall_clock_budget_ms == 0 {
            return Err(ConfigError::ZeroWallClockBudget);
        }
        if !(0.0..=1.0).contains(&self.correlation_threshold) {
            return Err(ConfigError::InvalidCorrelationThreshold(
                self.correlation_threshold,
            ));
        }
        if !(self.team_hours_per_week > 0.0 && self.team_hours_per_week.is_finite()) {
            return Err(ConfigError::InvalidTeamCapacity(self.team_hours_per_week));
        }
        if self.event_buffer == 0 {
            return Err(ConfigError::ZeroEventBuffer);
        }
        if self.event_buffer > MAX_EVENT_BUFFER {
            return Err(ConfigError::EventBufferTooLarge {
                size: self.event_buffer,
                max: MAX_EVENT_BUFFER,
            });
        }
        Ok(())
    }

    /// Apply `AUDITOR_*` environment overrides.
    pub fn apply_env_overrides(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (the environment in production).
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
            value.trim().parse().map_err(|_| ConfigError::InvalidEnvOverride {
                key: key.to_string(),
                value,
            })
        }

        if let Some(value) = lookup(ENV_CONCURRENCY_CAP) {
            self.concurrency_cap = parse(ENV_CONCURRENCY_CAP, value)?;
        }
        if let Some(value) = lookup(ENV_WALL_CLOCK_BUDGET_MS) {
            self.wall_clock_budget_ms = parse(ENV_WALL_CLOCK_BUDGET_MS, value)?;
        }
        if let Some(value) = lookup(ENV_CORRELATION_THRESHOLD) {
            self.correlation_threshold = parse(ENV_CORRELATION_THRESHOLD, value)?;
        }
        Ok(self)
    }
}

/// The complete auditor.toml structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditorToml {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub business: BusinessContext,
}

impl AuditorToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse auditor.toml")
    }

    /// Load `auditor.toml` from `dir`, or defaults if it does not exist.
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize auditor.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Engine settings with environment overrides applied and validated.
    pub fn effective_engine(&self) -> Result<EngineConfig, ConfigError> {
        let engine = self.engine.clone().apply_env_overrides()?;
        engine.validate()?;
        Ok(engine)
    }

    /// Validate the configuration and return any warnings.
    ///
    /// Hard errors come back as `Err`; questionable but usable values as warnings.
    pub fn validate(&self) -> Result<Vec<String>, ConfigError> {
        self.engine.validate()?;

        let mut warnings = Vec::new();
        if self.engine.correlation_threshold == 0.0 {
            warnings.push(
                "correlation_threshold = 0 links every pair with a non-zero score".to_string(),
            );
        }
        if self.business.annual_revenue <= 0.0 {
            warnings.push(format!(
                "business.annual_revenue is {}; ROI figures will be zero or negative",
                self.business.annual_revenue
            ));
        }
        if self.business.hourly_rate <= 0.0 {
            warnings.push(format!(
                "business.hourly_rate is {}; remediation cost cannot be modeled",
                self.business.hourly_rate
            ));
        }
        Ok(warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Industry;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert_eq!(config.concurrency_cap, 4);
        assert_eq!(config.correlation_threshold, 0.5);
        assert_eq!(config.on_phase_failure, PhaseFailurePolicy::Continue);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        assert_eq!(
            EngineConfig::default().with_concurrency_cap(0).validate(),
            Err(ConfigError::ZeroConcurrency)
        );
        assert!(matches!(
            EngineConfig::default()
                .with_correlation_threshold(1.5)
                .validate(),
            Err(ConfigError::InvalidCorrelationThreshold(_))
        ));
        assert!(matches!(
            EngineConfig::default().with_phase_effort_budget(0.0).validate(),
            Err(ConfigError::InvalidEffortBudget(_))
        ));
        assert_eq!(
            EngineConfig::default()
                .with_wall_clock_budget(Duration::ZERO)
                .validate(),
            Err(ConfigError::ZeroWallClockBudget)
        );
    }

    #[test]
    fn test_validate_rejects_oversized_limits() {
        assert_eq!(
            EngineConfig::default()
                .with_concurrency_cap(usize::MAX)
                .validate(),
            Err(ConfigError::ConcurrencyTooLarge {
                cap: usize::MAX,
                max: MAX_CONCURRENCY_CAP,
            })
        );
        assert!(
            EngineConfig::default()
                .with_concurrency_cap(MAX_CONCURRENCY_CAP)
                .validate()
                .is_ok()
        );

        let config = EngineConfig {
            event_buffer: MAX_EVENT_BUFFER + 1,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EventBufferTooLarge { .. })
        ));
    }

    #[test]
    fn test_oversized_env_cap_fails_validation() {
        let huge = usize::MAX.to_string();
        let config = EngineConfig::default()
            .apply_overrides(|key| (key == ENV_CONCURRENCY_CAP).then(|| huge.clone()))
            .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ConcurrencyTooLarge { .. })
        ));
    }

    #[test]
    fn test_parse_partial_file_fills_defaults() {
        let toml = AuditorToml::parse(
            r#"
            [engine]
            concurrency_cap = 8
            on_phase_failure = "halt"

            [business]
            industry = "finance"
            "#,
        )
        .unwrap();

        assert_eq!(toml.engine.concurrency_cap, 8);
        assert_eq!(toml.engine.on_phase_failure, PhaseFailurePolicy::Halt);
        assert_eq!(toml.engine.wall_clock_budget_ms, 300_000);
        assert_eq!(toml.business.industry, Industry::Finance);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(AuditorToml::parse("[engine\nconcurrency_cap = ").is_err());
    }

    #[test]
    fn test_overrides_apply_and_validate() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_CONCURRENCY_CAP, "2"),
            (ENV_CORRELATION_THRESHOLD, "0.8"),
        ]);
        let config = EngineConfig::default()
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.concurrency_cap, 2);
        assert_eq!(config.correlation_threshold, 0.8);
        assert_eq!(config.wall_clock_budget_ms, 300_000);
    }

    #[test]
    fn test_bad_override_is_reported() {
        let err = EngineConfig::default()
            .apply_overrides(|k| (k == ENV_CONCURRENCY_CAP).then(|| "many".to_string()))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidEnvOverride {
                key: ENV_CONCURRENCY_CAP.to_string(),
                value: "many".to_string()
            }
        );
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut toml = AuditorToml::default();
        toml.engine.concurrency_cap = 3;
        toml.engine.exclude = vec!["fuzz".to_string()];
        toml.save(&dir.path().join(CONFIG_FILE)).unwrap();

        let loaded = AuditorToml::load_or_default(dir.path()).unwrap();
        assert_eq!(loaded, toml);
    }

    #[test]
    fn test_load_or_default_without_file() {
        let dir = TempDir::new().unwrap();
        let loaded = AuditorToml::load_or_default(dir.path()).unwrap();
        assert_eq!(loaded, AuditorToml::default());
    }

    #[test]
    fn test_validate_warnings() {
        let mut toml = AuditorToml::default();
        toml.business.annual_revenue = 0.0;
        let warnings = toml.validate().unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("annual_revenue"));
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!(
            "HALT".parse::<PhaseFailurePolicy>().unwrap(),
            PhaseFailurePolicy::Halt
        );
        assert!("stop".parse::<PhaseFailurePolicy>().is_err());
    }
}
