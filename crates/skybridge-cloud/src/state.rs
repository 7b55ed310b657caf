//! File-backed mapping store
//!
//! Keeps mappings in `<root>/.skybridge/mappings.json` for deployments that
//! run without the orchestrator's database.

use crate::error::{CloudError, Result};
use crate::mapping::{MappingKey, MappingStore, ResourceMapping};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".skybridge";
const STATE_FILE: &str = "mappings.json";
const STATE_BACKUP: &str = "mappings.json.backup";
const STATE_TEMP: &str = "mappings.json.tmp";

/// On-disk mapping table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingTable {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Mappings indexed by `project:kind:local_id`
    pub mappings: HashMap<String, ResourceMapping>,
}

impl Default for MappingTable {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            mappings: HashMap::new(),
        }
    }
}

impl MappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &MappingKey) -> Option<&ResourceMapping> {
        self.mappings.get(&key.encode())
    }

    pub fn insert(&mut self, mapping: ResourceMapping) -> Option<ResourceMapping> {
        self.updated_at = Utc::now();
        self.mappings.insert(mapping.key.encode(), mapping)
    }

    /// Mappings of one project
    pub fn project_mappings(&self, project_id: &str) -> Vec<&ResourceMapping> {
        self.mappings
            .values()
            .filter(|m| m.key.project_id == project_id)
            .collect()
    }
}

/// JSON file mapping store
///
/// The live file is only ever replaced by rename, so readers see either the
/// old table or the new one.
pub struct FileMappingStore {
    root: PathBuf,
    // serializes readers against read-modify-write within this process
    lock: Mutex<()>,
}

impl FileMappingStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    fn state_path(&self) -> PathBuf {
        self.state_dir().join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir().join(STATE_BACKUP)
    }

    fn temp_path(&self) -> PathBuf {
        self.state_dir().join(STATE_TEMP)
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!("Created state directory: {}", dir.display());
        }
        Ok(())
    }

    /// Load the mapping table, falling back to the backup when the live file is gone
    pub async fn load(&self) -> Result<MappingTable> {
        let mut path = self.state_path();
        if !path.exists() {
            let backup = self.backup_path();
            if !backup.exists() {
                tracing::debug!("Mapping file not found, returning empty table");
                return Ok(MappingTable::new());
            }
            tracing::warn!("Mapping file missing, reading backup {}", backup.display());
            path = backup;
        }

        let content = fs::read_to_string(&path).await?;
        let table: MappingTable = serde_json::from_str(&content)?;

        if table.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "Mapping file version {} is newer than supported version {}",
                table.version, STATE_VERSION
            )));
        }

        tracing::debug!("Loaded {} mappings", table.mappings.len());
        Ok(table)
    }

    /// Save the mapping table, keeping the previous file as backup
    ///
    /// The new table is written next to the live file and renamed over it.
    pub async fn save(&self, table: &MappingTable) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        let temp = self.temp_path();

        let content = serde_json::to_string_pretty(table)?;
        fs::write(&temp, content).await?;

        if path.exists() {
            fs::copy(&path, self.backup_path()).await?;
        }
        fs::rename(&temp, &path).await?;

        tracing::debug!("Saved {} mappings", table.mappings.len());
        Ok(())
    }
}

#[async_trait]
impl MappingStore for FileMappingStore {
    async fn get(&self, key: &MappingKey) -> Result<Option<ResourceMapping>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.get(key).cloned())
    }

    async fn put(&self, mapping: ResourceMapping) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut table = self.load().await?;
        if let Some(previous) = table.insert(mapping) {
            tracing::debug!(
                "Superseded mapping {} (was {})",
                previous.key,
                previous.remote_id
            );
        }
        self.save(&table).await
    }
}
