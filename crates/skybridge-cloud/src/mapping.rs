//! Local ↔ remote resource correlation records
//!
//! The store is owned by the orchestrator's storage layer; the bridge only
//! sees it through [`MappingStore`]. It has no compare-and-swap: two callers
//! can both miss and both `put`.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Resource classes tracked by the mapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Image,
    Flavor,
    Instance,
    Volume,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Image => write!(f, "image"),
            ResourceKind::Flavor => write!(f, "flavor"),
            ResourceKind::Instance => write!(f, "instance"),
            ResourceKind::Volume => write!(f, "volume"),
        }
    }
}

/// Lookup key of a mapping
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MappingKey {
    pub local_id: String,
    pub project_id: String,
    pub kind: ResourceKind,
}

impl MappingKey {
    pub fn new(local_id: impl Into<String>, project_id: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            local_id: local_id.into(),
            project_id: project_id.into(),
            kind,
        }
    }

    /// Flat `project:kind:local_id` form used by the file store
    pub fn encode(&self) -> String {
        format!("{}:{}:{}", self.project_id, self.kind, self.local_id)
    }
}

impl std::fmt::Display for MappingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.encode())
    }
}

/// Correlation of one local resource with its remote counterpart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceMapping {
    pub key: MappingKey,
    pub remote_id: String,
    pub created_at: DateTime<Utc>,
}

impl ResourceMapping {
    pub fn new(key: MappingKey, remote_id: impl Into<String>) -> Self {
        Self {
            key,
            remote_id: remote_id.into(),
            created_at: Utc::now(),
        }
    }
}

/// Persistence interface for mappings
#[async_trait]
pub trait MappingStore: Send + Sync {
    async fn get(&self, key: &MappingKey) -> Result<Option<ResourceMapping>>;

    /// Insert a mapping, superseding any previous one for the key
    async fn put(&self, mapping: ResourceMapping) -> Result<()>;
}

/// Process-local store for tests and single-node deployments
#[derive(Debug, Default)]
pub struct MemoryMappingStore {
    mappings: RwLock<HashMap<MappingKey, ResourceMapping>>,
}

impl MemoryMappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.mappings.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.mappings.read().await.is_empty()
    }
}

#[async_trait]
impl MappingStore for MemoryMappingStore {
    async fn get(&self, key: &MappingKey) -> Result<Option<ResourceMapping>> {
        Ok(self.mappings.read().await.get(key).cloned())
    }

    async fn put(&self, mapping: ResourceMapping) -> Result<()> {
        self.mappings
            .write()
            .await
            .insert(mapping.key.clone(), mapping);
        Ok(())
    }
}
