//! Phase plan: the ordered grouping of audits into execution phases.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Ordered phases, each a list of audit ids that may run concurrently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhasePlan {
    phases: Vec<Vec<String>>,
}

impl PhasePlan {
    pub fn new(phases: Vec<Vec<String>>) -> Self {
        Self { phases }
    }

    /// Number of phases.
    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn phase(&self, index: usize) -> Option<&[String]> {
        self.phases.get(index).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = &[String]> {
        self.phases.iter().map(Vec::as_slice)
    }

    /// Total number of scheduled audits.
    pub fn total_audits(&self) -> usize {
        self.phases.iter().map(Vec::len).sum()
    }

    /// Index of the phase containing `id`.
    pub fn phase_of(&self, id: &str) -> Option<usize> {
        self.phases
            .iter()
            .position(|phase| phase.iter().any(|a| a == id))
    }

    /// Ids scheduled in phases at or after `index`.
    pub fn ids_from(&self, index: usize) -> Vec<String> {
        self.phases.iter().skip(index).flatten().cloned().collect()
    }

    /// Widest phase; the most audits that can ever run at once.
    pub fn max_width(&self) -> usize {
        self.phases.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Every scheduled id exactly once, in phase order.
    pub fn all_ids(&self) -> Vec<String> {
        self.ids_from(0)
    }

    pub fn as_vecs(&self) -> &[Vec<String>] {
        &self.phases
    }

    /// True if no id appears twice.
    pub fn is_disjoint(&self) -> bool {
        let mut seen = HashSet::new();
        self.phases.iter().flatten().all(|id| seen.insert(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> PhasePlan {
        PhasePlan::new(vec![
            vec!["a".into(), "b".into()],
            vec!["c".into()],
            vec!["d".into(), "e".into(), "f".into()],
        ])
    }

    #[test]
    fn test_counts() {
        let plan = plan();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.total_audits(), 6);
        assert_eq!(plan.max_width(), 3);
        assert!(plan.is_disjoint());
    }

    #[test]
    fn test_phase_lookup() {
        let plan = plan();
        assert_eq!(plan.phase_of("c"), Some(1));
        assert_eq!(plan.phase_of("zz"), None);
        assert_eq!(plan.ids_from(1), vec!["c", "d", "e", "f"]);
    }

    #[test]
    fn test_serializes_as_nested_arrays() {
        let json = serde_json::to_string(&plan()).unwrap();
        assert_eq!(json, r#"[["a","b"],["c"],["d","e","f"]]"#);
    }
}
