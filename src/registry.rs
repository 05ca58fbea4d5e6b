//! Immutable registry of audit definitions.
//!
//! Discovery happens before the engine runs: callers collect their audits,
//! register them once, and hand the frozen registry to the engine.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use crate::audit::{AuditDefinition, AuditDescriptor, AuditTask, Category};
use crate::dag::{AuditGraph, DagBuilder};
use crate::errors::GraphError;

/// Frozen set of audits, looked up by id.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    audits: Vec<AuditDefinition>,
    index: HashMap<String, usize>,
}

impl TaskRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.audits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.audits.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&AuditDefinition> {
        self.index.get(id).map(|&i| &self.audits[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Audits in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &AuditDefinition> {
        self.audits.iter()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.audits.iter().map(AuditDefinition::id).collect()
    }

    pub fn descriptors(&self) -> Vec<AuditDescriptor> {
        self.audits.iter().map(|a| a.descriptor().clone()).collect()
    }

    /// Distinct categories covered by the registry.
    pub fn categories(&self) -> BTreeSet<Category> {
        self.audits.iter().map(|a| a.category().clone()).collect()
    }

    /// Validate the registry and build its dependency graph.
    pub fn graph(&self, exclude: &[String]) -> Result<AuditGraph, GraphError> {
        DagBuilder::new(self.descriptors())
            .exclude(exclude.iter().cloned())
            .build()
    }
}

/// Collects audit definitions; rejects duplicate ids at registration time.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    audits: Vec<AuditDefinition>,
    index: HashMap<String, usize>,
}

impl RegistryBuilder {
    pub fn register(mut self, definition: AuditDefinition) -> Result<Self, GraphError> {
        if self.index.contains_key(definition.id()) {
            return Err(GraphError::DuplicateAudit {
                id: definition.id().to_string(),
            });
        }
        self.index
            .insert(definition.id().to_string(), self.audits.len());
        self.audits.push(definition);
        Ok(self)
    }

    /// Register a descriptor with its task.
    pub fn audit(
        self,
        descriptor: AuditDescriptor,
        task: Arc<dyn AuditTask>,
    ) -> Result<Self, GraphError> {
        self.register(AuditDefinition::new(descriptor, task))
    }

    pub fn build(self) -> TaskRegistry {
        TaskRegistry {
            audits: self.audits,
            index: self.index,
        }
    }
}

/// Descriptor-only listing of audits, as read from a manifest file.
///
/// ```toml
/// [[audit]]
/// id = "authCheck"
/// category = "AUTHENTICATION"
///
/// [[audit]]
/// id = "complianceCheck"
/// category = "COMPLIANCE"
/// depends_on = ["authCheck"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditManifest {
    #[serde(rename = "audit", default)]
    pub audits: Vec<AuditDescriptor>,
}

impl AuditManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid manifest: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse audit manifest")
    }

    /// Validate the manifest and build its graph.
    pub fn graph(&self, exclude: &[String]) -> Result<AuditGraph, GraphError> {
        DagBuilder::new(self.audits.clone())
            .exclude(exclude.iter().cloned())
            .build()
    }
}
