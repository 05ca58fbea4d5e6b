//! Audit task contract and result model.

mod model;
mod task;

pub use model::{
    AuditOutput, AuditResult, Category, EXECUTION_FAILED, ErrorInfo, Finding, Remediation,
    Severity, TaskErrorKind,
};
pub use task::{AuditDefinition, AuditDescriptor, AuditTask, FnTask, TaskContext, audit_fn};
