//! Append-only result store shared across phases.
//!
//! The coordinator owns the only [`PipelineContext`] and merges a phase's
//! results after every task in it has resolved. Tasks only ever see a
//! [`ContextSnapshot`] taken before their phase started.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::audit::{AuditResult, Category, Finding};

/// Read-only view of the results merged so far.
///
/// Clones share the underlying map.
#[derive(Debug, Clone, Default)]
pub struct ContextSnapshot {
    results: Arc<BTreeMap<String, AuditResult>>,
}

impl ContextSnapshot {
    pub fn get(&self, audit_id: &str) -> Option<&AuditResult> {
        self.results.get(audit_id)
    }

    pub fn contains(&self, audit_id: &str) -> bool {
        self.results.contains_key(audit_id)
    }

    /// Results whose audit reports on `category`.
    pub fn by_category<'a>(
        &'a self,
        category: &'a Category,
    ) -> impl Iterator<Item = &'a AuditResult> + 'a {
        self.results.values().filter(move |r| &r.category == category)
    }

    /// Every finding visible in the snapshot, with the audit that produced it.
    pub fn findings(&self) -> impl Iterator<Item = (&str, &Finding)> {
        self.results
            .values()
            .flat_map(|r| r.findings.iter().map(move |f| (r.audit_id.as_str(), f)))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.results.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// The coordinator's context. Results are never replaced or removed.
#[derive(Debug, Default)]
pub struct PipelineContext {
    results: Arc<BTreeMap<String, AuditResult>>,
}

impl PipelineContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current view for tasks about to launch.
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            results: Arc::clone(&self.results),
        }
    }

    /// Merge a resolved phase's results in one step.
    ///
    /// Snapshots taken earlier keep seeing the old map. Ids already present
    /// keep their first result; the rejected ids are returned.
    pub fn merge(&mut self, results: impl IntoIterator<Item = AuditResult>) -> Vec<String> {
        let mut next = (*self.results).clone();
        let mut rejected = Vec::new();
        for result in results {
            if next.contains_key(&result.audit_id) {
                rejected.push(result.audit_id);
            } else {
                next.insert(result.audit_id.clone(), result);
            }
        }
        self.results = Arc::new(next);
        rejected
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// All merged results, ordered by audit id.
    pub fn results(&self) -> impl Iterator<Item = &AuditResult> {
        self.results.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditDescriptor, AuditOutput, Severity};
    use std::time::Duration;

    fn result(id: &str, category: Category, finding: &str) -> AuditResult {
        AuditResult::from_output(
            &AuditDescriptor::new(id, category),
            AuditOutput::new().with_finding(Finding::new(Severity::Medium, finding)),
            Duration::ZERO,
        )
    }

    #[test]
    fn snapshot_is_isolated_from_later_merges() {
        let mut ctx = PipelineContext::new();
        ctx.merge([result("auth", Category::Authentication, "weak hash")]);
        let before = ctx.snapshot();

        ctx.merge([result("perf", Category::Performance, "slow query")]);

        assert_eq!(before.len(), 1);
        assert!(!before.contains("perf"));
        assert_eq!(ctx.snapshot().len(), 2);
    }

    #[test]
    fn merge_keeps_first_result_per_id() {
        let mut ctx = PipelineContext::new();
        ctx.merge([result("auth", Category::Authentication, "first")]);
        let rejected = ctx.merge([result("auth", Category::Authentication, "second")]);

        assert_eq!(rejected, vec!["auth"]);
        assert_eq!(ctx.snapshot().get("auth").unwrap().findings[0].text, "first");
    }

    #[test]
    fn lookups_by_category_and_findings() {
        let mut ctx = PipelineContext::new();
        ctx.merge([
            result("auth", Category::Authentication, "weak hash"),
            result("sessions", Category::Authentication, "long ttl"),
            result("perf", Category::Performance, "slow query"),
        ]);
        let snap = ctx.snapshot();

        assert_eq!(snap.by_category(&Category::Authentication).count(), 2);
        assert_eq!(snap.findings().count(), 3);
        assert_eq!(snap.ids().collect::<Vec<_>>(), vec!["auth", "perf", "sessions"]);
    }
}
