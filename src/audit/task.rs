//! The task contract the engine consumes.
//!
//! An audit is registered as an [`AuditDefinition`]: a serializable
//! [`AuditDescriptor`] (identity, category, dependencies, weight) paired with
//! an [`AuditTask`] that does the actual analysis.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use super::model::{AuditOutput, Category};
use crate::pipeline::ContextSnapshot;
use crate::profile::{BusinessContext, CodebaseContext};

fn default_priority_weight() -> f64 {
    1.0
}

/// Identity and scheduling metadata of an audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditDescriptor {
    /// Unique audit id (e.g., "authCheck")
    pub id: String,
    /// Domain the audit reports on
    pub category: Category,
    /// Ids of audits whose results this audit consumes
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Weight of this audit's category in the overall risk score
    #[serde(default = "default_priority_weight")]
    pub priority_weight: f64,
}

impl AuditDescriptor {
    pub fn new(id: impl Into<String>, category: Category) -> Self {
        Self {
            id: id.into(),
            category,
            depends_on: Vec::new(),
            priority_weight: default_priority_weight(),
        }
    }

    /// Add a dependency; duplicates are ignored.
    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        if !self.depends_on.contains(&id) {
            self.depends_on.push(id);
        }
        self
    }

    pub fn with_priority_weight(mut self, weight: f64) -> Self {
        self.priority_weight = weight;
        self
    }
}

/// Everything a running audit may read.
///
/// Cloning is cheap: every field is reference counted.
#[derive(Debug, Clone)]
pub struct TaskContext {
    audit_id: String,
    prior: ContextSnapshot,
    codebase: Arc<CodebaseContext>,
    business: Arc<BusinessContext>,
}

impl TaskContext {
    pub fn new(
        audit_id: impl Into<String>,
        prior: ContextSnapshot,
        codebase: Arc<CodebaseContext>,
        business: Arc<BusinessContext>,
    ) -> Self {
        Self {
            audit_id: audit_id.into(),
            prior,
            codebase,
            business,
        }
    }

    /// Id of the audit this context was built for.
    pub fn audit_id(&self) -> &str {
        &self.audit_id
    }

    /// Results of audits from strictly earlier phases.
    pub fn prior(&self) -> &ContextSnapshot {
        &self.prior
    }

    pub fn codebase(&self) -> &CodebaseContext {
        &self.codebase
    }

    pub fn business(&self) -> &BusinessContext {
        &self.business
    }
}

/// A pluggable analysis unit.
///
/// `run` is called at most once per pipeline execution. Returning an error
/// (or panicking) does not abort the pipeline: the engine records a critical
/// result carrying the error instead.
#[async_trait]
pub trait AuditTask: Send + Sync {
    async fn run(&self, ctx: TaskContext) -> Result<AuditOutput>;
}

/// Adapter that lets a closure act as an [`AuditTask`].
pub struct FnTask<F>(F);

#[async_trait]
impl<F, Fut> AuditTask for FnTask<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<AuditOutput>> + Send + 'static,
{
    async fn run(&self, ctx: TaskContext) -> Result<AuditOutput> {
        (self.0)(ctx).await
    }
}

/// Wrap an async closure as a shareable audit task.
///
/// ```
/// use auditor::audit::{audit_fn, AuditOutput};
///
/// let task = audit_fn(|_ctx| async { Ok(AuditOutput::new()) });
/// # let _ = task;
/// ```
pub fn audit_fn<F, Fut>(f: F) -> Arc<dyn AuditTask>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<AuditOutput>> + Send + 'static,
{
    Arc::new(FnTask(f))
}

/// A registered audit: descriptor plus executable unit.
#[derive(Clone)]
pub struct AuditDefinition {
    descriptor: AuditDescriptor,
    task: Arc<dyn AuditTask>,
}

impl AuditDefinition {
    pub fn new(descriptor: AuditDescriptor, task: Arc<dyn AuditTask>) -> Self {
        Self { descriptor, task }
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn category(&self) -> &Category {
        &self.descriptor.category
    }

    pub fn descriptor(&self) -> &AuditDescriptor {
        &self.descriptor
    }

    pub fn task(&self) -> Arc<dyn AuditTask> {
        Arc::clone(&self.task)
    }
}

impl fmt::Debug for AuditDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditDefinition")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}
