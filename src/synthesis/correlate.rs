//! Cross-domain correlation of findings.
//!
//! Findings from different categories are scored pairwise by a
//! [`Correlator`]. Pairs scoring strictly above the threshold are linked and
//! linked findings are grouped with union-find. Every group that spans two or
//! more categories becomes a [`CrossDomainIssue`]; everything else passes
//! through as a singleton.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::audit::{AuditResult, Category, Finding, Remediation, Severity};

/// Location of a finding within the run's results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingRef {
    pub audit_id: String,
    pub category: Category,
    pub finding_index: usize,
    pub severity: Severity,
    pub text: String,
}

impl FindingRef {
    /// Stable key, `audit_id#index`.
    pub fn key(&self) -> String {
        format!("{}#{}", self.audit_id, self.finding_index)
    }
}

/// A finding together with where it came from and the fixes declared for it.
#[derive(Debug, Clone)]
pub struct LocatedFinding {
    pub audit_id: String,
    pub category: Category,
    pub index: usize,
    pub finding: Finding,
    pub remediations: Vec<Remediation>,
}

impl LocatedFinding {
    pub fn to_ref(&self) -> FindingRef {
        FindingRef {
            audit_id: self.audit_id.clone(),
            category: self.category.clone(),
            finding_index: self.index,
            severity: self.finding.severity,
            text: self.finding.text.clone(),
        }
    }

    /// Collect every finding of the successful results, ordered by audit id
    /// and then by position.
    ///
    /// Findings without a remediation of their own pick up the first
    /// audit-level remediation (one with no `finding_index`), if any.
    pub fn collect(results: &[&AuditResult]) -> Vec<LocatedFinding> {
        let mut sorted: Vec<&AuditResult> = results
            .iter()
            .copied()
            .filter(|r| r.is_success())
            .collect();
        sorted.sort_by(|a, b| a.audit_id.cmp(&b.audit_id));

        let mut out = Vec::new();
        for result in sorted {
            let general = result
                .recommendations
                .iter()
                .find(|r| r.finding_index.is_none());
            for (index, finding) in result.findings.iter().enumerate() {
                let mut remediations: Vec<Remediation> =
                    result.remediations_for(index).cloned().collect();
                if remediations.is_empty() {
                    remediations.extend(general.cloned());
                }
                out.push(LocatedFinding {
                    audit_id: result.audit_id.clone(),
                    category: result.category.clone(),
                    index,
                    finding: finding.clone(),
                    remediations,
                });
            }
        }
        out
    }
}

/// Scores how likely two findings describe the same underlying problem.
///
/// Scores are in `[0, 1]`. Only called for findings of different categories.
pub trait Correlator: Send + Sync {
    fn score(&self, a: &Finding, b: &Finding) -> f64;
}

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "with", "without", "this", "that", "from", "into",
    "has", "have", "was", "were", "been", "being", "its", "via", "per", "all", "any", "can",
    "may", "might", "should", "must", "use", "used", "uses", "using", "found", "detected",
    "missing", "issue", "problem",
];

/// Shared evidence, or else overlapping vocabulary.
///
/// Evidence overlap scores `0.5 + 0.5 × jaccard(evidence_refs)` whenever at
/// least one reference is shared. Topic overlap is the Jaccard similarity of
/// normalized words. The higher of the two wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvidenceTopicCorrelator;

impl EvidenceTopicCorrelator {
    pub fn evidence_score(a: &Finding, b: &Finding) -> f64 {
        let shared = a.evidence_refs.intersection(&b.evidence_refs).count();
        if shared == 0 {
            return 0.0;
        }
        let union = a.evidence_refs.union(&b.evidence_refs).count();
        0.5 + 0.5 * (shared as f64 / union as f64)
    }

    pub fn topic_score(a: &Finding, b: &Finding) -> f64 {
        jaccard(&topic_tokens(&a.text), &topic_tokens(&b.text))
    }
}

impl Correlator for EvidenceTopicCorrelator {
    fn score(&self, a: &Finding, b: &Finding) -> f64 {
        Self::evidence_score(a, b).max(Self::topic_score(a, b))
    }
}

/// Lowercased alphanumeric words of three or more letters, stopwords removed,
/// with a trailing plural `s` stripped.
pub fn topic_tokens(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() >= 3 && !STOPWORDS.contains(&w.as_str()))
        .map(|w| {
            if w.len() > 3 && w.ends_with('s') && !w.ends_with("ss") {
                w[..w.len() - 1].to_string()
            } else {
                w
            }
        })
        .collect()
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Disjoint-set forest with path halving and union by size.
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl UnionFind {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            size: vec![1; n],
        }
    }

    pub fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let (mut ra, mut rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        if self.size[ra] < self.size[rb] {
            std::mem::swap(&mut ra, &mut rb);
        }
        self.parent[rb] = ra;
        self.size[ra] += self.size[rb];
        true
    }

    /// Groups of element indices, each sorted, ordered by smallest member.
    pub fn groups(&mut self) -> Vec<Vec<usize>> {
        let mut by_root: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for x in 0..self.parent.len() {
            let root = self.find(x);
            by_root.entry(root).or_default().push(x);
        }
        let mut groups: Vec<Vec<usize>> = by_root.into_values().collect();
        groups.sort_by_key(|g| g[0]);
        groups
    }
}

/// One problem reported independently by audits of different domains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossDomainIssue {
    pub title: String,
    pub affected_domains: BTreeSet<Category>,
    pub root_cause: String,
    pub holistic_solution: String,
    /// Highest member severity weight times the number of domains.
    pub priority: f64,
    pub severity: Severity,
    pub findings: Vec<FindingRef>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub shared_evidence: BTreeSet<String>,
}

impl CrossDomainIssue {
    /// Stable key derived from the first member finding.
    pub fn key(&self) -> String {
        self.findings
            .first()
            .map(|f| format!("issue:{}", f.key()))
            .unwrap_or_else(|| format!("issue:{}", self.title))
    }
}

/// Outcome of correlating a run's findings.
#[derive(Debug, Clone, Default)]
pub struct Correlation {
    pub issues: Vec<CrossDomainIssue>,
    /// Member indices (into the input slice) of each issue, parallel to `issues`.
    pub issue_members: Vec<Vec<usize>>,
    /// Indices of findings not absorbed into any issue.
    pub singletons: Vec<usize>,
}

/// Correlate `findings` and cluster the linked ones.
pub fn correlate(
    findings: &[LocatedFinding],
    correlator: &dyn Correlator,
    threshold: f64,
) -> Correlation {
    let mut uf = UnionFind::new(findings.len());
    for i in 0..findings.len() {
        for j in (i + 1)..findings.len() {
            if findings[i].category == findings[j].category {
                continue;
            }
            let score = correlator.score(&findings[i].finding, &findings[j].finding);
            if score > threshold {
                uf.union(i, j);
            }
        }
    }

    let mut clustered: Vec<(CrossDomainIssue, Vec<usize>)> = Vec::new();
    let mut singletons = Vec::new();
    for group in uf.groups() {
        let domains: BTreeSet<&Category> = group.iter().map(|&i| &findings[i].category).collect();
        if group.len() >= 2 && domains.len() >= 2 {
            clustered.push((build_issue(findings, &group), group));
        } else {
            singletons.extend(group);
        }
    }

    clustered.sort_by(|(a, _), (b, _)| {
        b.priority
            .total_cmp(&a.priority)
            .then_with(|| b.severity.cmp(&a.severity))
            .then_with(|| a.title.cmp(&b.title))
            .then_with(|| a.key().cmp(&b.key()))
    });
    singletons.sort_unstable();

    let (issues, issue_members): (Vec<_>, Vec<_>) = clustered.into_iter().unzip();
    Correlation {
        issues,
        issue_members,
        singletons,
    }
}

fn build_issue(findings: &[LocatedFinding], group: &[usize]) -> CrossDomainIssue {
    let members: Vec<&LocatedFinding> = group.iter().map(|&i| &findings[i]).collect();
    let affected_domains: BTreeSet<Category> = members.iter().map(|m| m.category.clone()).collect();
    let severity = members
        .iter()
        .map(|m| m.finding.severity)
        .max()
        .unwrap_or_default();
    let priority = severity.weight() * affected_domains.len() as f64;

    let shared_evidence = shared_among_several(members.iter().map(|m| &m.finding.evidence_refs));
    let shared_topics = shared_among_several(members.iter().map(|m| topic_tokens(&m.finding.text)));
    let domain_names: Vec<&str> = affected_domains.iter().map(Category::as_str).collect();
    let domains = domain_names.join(" / ");

    let title = if let Some(evidence) = shared_evidence.iter().next() {
        format!("{} weakness in {}", domains, evidence)
    } else if !shared_topics.is_empty() {
        let topics: Vec<&str> = shared_topics.iter().take(3).map(String::as_str).collect();
        format!("{} weakness: {}", domains, topics.join(", "))
    } else {
        let worst = members
            .iter()
            .max_by_key(|m| m.finding.severity)
            .map(|m| m.finding.text.as_str())
            .unwrap_or_default();
        format!("{} weakness: {}", domains, worst)
    };

    let basis = if shared_evidence.is_empty() {
        "overlapping subject matter".to_string()
    } else {
        format!(
            "shared evidence ({})",
            shared_evidence.iter().cloned().collect::<Vec<_>>().join(", ")
        )
    };
    let root_cause = format!(
        "{} findings from {} domains point to one underlying cause via {}: {}",
        members.len(),
        affected_domains.len(),
        basis,
        members
            .iter()
            .map(|m| format!("[{}] {}", m.category, m.finding.text))
            .collect::<Vec<_>>()
            .join("; ")
    );

    let mut fixes: Vec<&str> = Vec::new();
    for m in &members {
        for r in &m.remediations {
            if !fixes.contains(&r.title.as_str()) {
                fixes.push(&r.title);
            }
        }
    }
    let holistic_solution = if fixes.is_empty() {
        format!(
            "Fix the shared cause once, with owners from {} reviewing the change together",
            domains
        )
    } else {
        format!(
            "Deliver as one coordinated change across {}: {}",
            domains,
            fixes.join("; ")
        )
    };

    CrossDomainIssue {
        title,
        affected_domains,
        root_cause,
        holistic_solution,
        priority,
        severity,
        findings: members.iter().map(|m| m.to_ref()).collect(),
        shared_evidence,
    }
}

/// Items appearing in at least two of the given sets.
fn shared_among_several<I, S>(sets: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: std::borrow::Borrow<BTreeSet<String>>,
{
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for set in sets {
        for item in set.borrow() {
            *counts.entry(item.clone()).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .filter(|(_, n)| *n >= 2)
        .map(|(item, _)| item)
        .collect()
}
