//! DAG builder for constructing audit dependency graphs.
//!
//! The builder takes audit descriptors with their dependencies, validates the
//! graph and groups it into execution phases with Kahn's algorithm.

use crate::audit::AuditDescriptor;
use crate::errors::GraphError;
use std::collections::{HashMap, HashSet};

use super::plan::PhasePlan;

/// Index into the audit list.
pub type AuditIndex = usize;

/// A validated, acyclic graph of audits.
#[derive(Debug, Clone)]
pub struct AuditGraph {
    /// Audits indexed by registration position (exclusions removed)
    audits: Vec<AuditDescriptor>,
    /// Map from audit id to index
    index_map: HashMap<String, AuditIndex>,
    /// Forward edges: index -> audits that depend on it
    forward_edges: Vec<Vec<AuditIndex>>,
    /// Reverse edges: index -> audits it depends on
    reverse_edges: Vec<Vec<AuditIndex>>,
    /// Phase index of every audit
    levels: Vec<usize>,
}

impl AuditGraph {
    pub fn len(&self) -> usize {
        self.audits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.audits.is_empty()
    }

    pub fn get(&self, index: AuditIndex) -> Option<&AuditDescriptor> {
        self.audits.get(index)
    }

    pub fn get_by_id(&self, id: &str) -> Option<&AuditDescriptor> {
        self.index_map.get(id).and_then(|&i| self.audits.get(i))
    }

    pub fn get_index(&self, id: &str) -> Option<AuditIndex> {
        self.index_map.get(id).copied()
    }

    pub fn audits(&self) -> &[AuditDescriptor] {
        &self.audits
    }

    /// Audits that depend on the given audit.
    pub fn dependents(&self, index: AuditIndex) -> &[AuditIndex] {
        self.forward_edges.get(index).map_or(&[], |v| v.as_slice())
    }

    /// Audits the given audit depends on.
    pub fn dependencies(&self, index: AuditIndex) -> &[AuditIndex] {
        self.reverse_edges.get(index).map_or(&[], |v| v.as_slice())
    }

    /// Audits with no dependencies.
    pub fn roots(&self) -> Vec<AuditIndex> {
        self.reverse_edges
            .iter()
            .enumerate()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(i, _)| i)
            .collect()
    }

    /// Audits nothing depends on.
    pub fn leaves(&self) -> Vec<AuditIndex> {
        self.forward_edges
            .iter()
            .enumerate()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn dependencies_satisfied(
        &self,
        index: AuditIndex,
        completed: &HashSet<AuditIndex>,
    ) -> bool {
        self.dependencies(index)
            .iter()
            .all(|dep| completed.contains(dep))
    }

    /// Phase index the audit is scheduled in.
    pub fn phase_of(&self, id: &str) -> Option<usize> {
        self.get_index(id).map(|i| self.levels[i])
    }

    /// Group the audits into execution phases.
    ///
    /// Each audit lands in the earliest phase after all of its dependencies;
    /// within a phase, audits keep registration order.
    pub fn phases(&self) -> PhasePlan {
        let phase_count = self.levels.iter().max().map_or(0, |m| m + 1);
        let mut phases: Vec<Vec<String>> = vec![Vec::new(); phase_count];
        for (i, audit) in self.audits.iter().enumerate() {
            phases[self.levels[i]].push(audit.id.clone());
        }
        PhasePlan::new(phases)
    }
}

/// Builder for constructing audit graphs.
pub struct DagBuilder {
    audits: Vec<AuditDescriptor>,
    excluded: Vec<String>,
}

impl DagBuilder {
    pub fn new(audits: Vec<AuditDescriptor>) -> Self {
        Self {
            audits,
            excluded: Vec::new(),
        }
    }

    /// Drop these audits from scheduling.
    ///
    /// Dependents of an excluded audit still run; the excluded dependency is
    /// simply absent from their context.
    pub fn exclude<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Build the audit graph.
    ///
    /// This validates the graph structure:
    /// - Audit ids must be unique
    /// - All dependencies must reference registered audits
    /// - Excluded ids must reference registered audits
    /// - No cycles are allowed
    pub fn build(self) -> Result<AuditGraph, GraphError> {
        let mut seen = HashSet::new();
        for audit in &self.audits {
            if !seen.insert(audit.id.as_str()) {
                return Err(GraphError::DuplicateAudit {
                    id: audit.id.clone(),
                });
            }
        }

        // Dependencies are validated against the full registry, before exclusions
        for audit in &self.audits {
            for dep in &audit.depends_on {
                if !seen.contains(dep.as_str()) {
                    return Err(GraphError::UnknownDependency {
                        audit: audit.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        let excluded: HashSet<&str> = self.excluded.iter().map(String::as_str).collect();
        if let Some(unknown) = self.excluded.iter().find(|id| !seen.contains(id.as_str())) {
            return Err(GraphError::UnknownExclusion { id: unknown.clone() });
        }

        let audits: Vec<AuditDescriptor> = self
            .audits
            .iter()
            .filter(|a| !excluded.contains(a.id.as_str()))
            .cloned()
            .collect();

        let index_map: HashMap<String, AuditIndex> = audits
            .iter()
            .enumerate()
            .map(|(i, a)| (a.id.clone(), i))
            .collect();

        let mut forward_edges: Vec<Vec<AuditIndex>> = vec![Vec::new(); audits.len()];
        let mut reverse_edges: Vec<Vec<AuditIndex>> = vec![Vec::new(); audits.len()];

        for (to_idx, audit) in audits.iter().enumerate() {
            for dep in &audit.depends_on {
                // Edges into excluded audits are dropped
                let Some(&from_idx) = index_map.get(dep) else {
                    continue;
                };
                if reverse_edges[to_idx].contains(&from_idx) {
                    continue;
                }
                forward_edges[from_idx].push(to_idx);
                reverse_edges[to_idx].push(from_idx);
            }
        }

        let levels = Self::assign_levels(&audits, &forward_edges, &reverse_edges)?;

        Ok(AuditGraph {
            audits,
            index_map,
            forward_edges,
            reverse_edges,
            levels,
        })
    }

    /// Kahn's algorithm, one level at a time.
    ///
    /// Each round takes every audit whose in-degree dropped to zero in the
    /// previous round, which places it at its longest distance from a root.
    fn assign_levels(
        audits: &[AuditDescriptor],
        forward_edges: &[Vec<AuditIndex>],
        reverse_edges: &[Vec<AuditIndex>],
    ) -> Result<Vec<usize>, GraphError> {
        let mut in_degree: Vec<usize> = reverse_edges.iter().map(Vec::len).collect();
        let mut levels = vec![usize::MAX; audits.len()];

        let mut frontier: Vec<AuditIndex> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, deg)| *deg == 0)
            .map(|(i, _)| i)
            .collect();

        let mut level = 0;
        let mut processed = 0;

        while !frontier.is_empty() {
            let mut next = Vec::new();
            for &node in &frontier {
                levels[node] = level;
                processed += 1;
                for &dependent in &forward_edges[node] {
                    in_degree[dependent] -= 1;
                    if in_degree[dependent] == 0 {
                        next.push(dependent);
                    }
                }
            }
            next.sort_unstable();
            frontier = next;
            level += 1;
        }

        if processed != audits.len() {
            let cycle = Self::find_cycle(audits, reverse_edges, &in_degree);
            return Err(GraphError::CyclicDependency { cycle });
        }

        Ok(levels)
    }

    /// Walk unresolved dependency edges until a node repeats.
    ///
    /// Every audit left with a positive in-degree has at least one unresolved
    /// dependency, so the walk always closes a loop.
    fn find_cycle(
        audits: &[AuditDescriptor],
        reverse_edges: &[Vec<AuditIndex>],
        in_degree: &[usize],
    ) -> Vec<String> {
        let Some(start) = in_degree.iter().position(|&deg| deg > 0) else {
            return Vec::new();
        };

        let mut path: Vec<AuditIndex> = Vec::new();
        let mut position: HashMap<AuditIndex, usize> = HashMap::new();
        let mut current = start;

        loop {
            if let Some(&at) = position.get(&current) {
                // Reads as "a depends on b depends on ... a"
                let mut cycle: Vec<String> =
                    path[at..].iter().map(|&i| audits[i].id.clone()).collect();
                cycle.push(audits[current].id.clone());
                return cycle;
            }
            position.insert(current, path.len());
            path.push(current);

            match reverse_edges[current]
                .iter()
                .find(|&&dep| in_degree[dep] > 0)
            {
                Some(&dep) => current = dep,
                None => {
                    return path.iter().map(|&i| audits[i].id.clone()).collect();
                }
            }
        }
    }
}
