//! Audit dependency graph and phase planning.
//!
//! The builder validates a set of audit descriptors (unique ids, known
//! dependencies, no cycles) and groups them into phases: every audit is placed
//! in the earliest phase after all of its dependencies, so the phases are
//! maximally parallel.
//!
//! ## Example
//!
//! ```
//! use auditor::audit::{AuditDescriptor, Category};
//! use auditor::dag::DagBuilder;
//!
//! let audits = vec![
//!     AuditDescriptor::new("secrets", Category::Security),
//!     AuditDescriptor::new("auth", Category::Authentication).depends_on("secrets"),
//!     AuditDescriptor::new("perf", Category::Performance),
//!     AuditDescriptor::new("compliance", Category::Compliance).depends_on("auth"),
//! ];
//!
//! let plan = DagBuilder::new(audits).build()?.phases();
//! // Phase 0: [secrets, perf] - no dependencies
//! // Phase 1: [auth]
//! // Phase 2: [compliance]
//! assert_eq!(plan.len(), 3);
//! # Ok::<(), auditor::errors::GraphError>(())
//! ```

mod builder;
mod plan;

pub use builder::{AuditGraph, AuditIndex, DagBuilder};
pub use plan::PhasePlan;
