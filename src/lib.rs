pub mod audit;
pub mod config;
pub mod dag;
pub mod errors;
pub mod logging;
pub mod pipeline;
pub mod profile;
pub mod registry;
pub mod report;
pub mod synthesis;

// Entry points most callers need
pub use audit::{AuditDescriptor, AuditOutput, AuditTask, Category, Finding, Severity, audit_fn};
pub use config::EngineConfig;
pub use errors::{EngineError, GraphError};
pub use pipeline::AuditEngine;
pub use registry::TaskRegistry;
pub use report::PipelineReport;
