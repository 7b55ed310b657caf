//! Local resource descriptors handed over by the orchestrator
//!
//! The bridge only reads these; it never owns the orchestrator's records.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Separator between local display name and local UUID in remote names
pub const NAMING_SEPARATOR: char = '@';

/// Metadata key carrying the local UUID on every remote instance we create
pub const LOCAL_UUID_METADATA_KEY: &str = "skybridge:local_uuid";

/// Remote display name derived from the local resource
///
/// `display_name@uuid` keeps names unique across tenants in the provider
/// cloud and doubles as the fallback lookup key when a mapping is missing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamingKey {
    display_name: String,
    local_uuid: String,
}

impl NamingKey {
    pub fn new(display_name: impl Into<String>, local_uuid: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            local_uuid: local_uuid.into(),
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn local_uuid(&self) -> &str {
        &self.local_uuid
    }

    /// Full remote name (`display_name@uuid`)
    pub fn remote_name(&self) -> String {
        format!("{}{}{}", self.display_name, NAMING_SEPARATOR, self.local_uuid)
    }
}

impl std::fmt::Display for NamingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.remote_name())
    }
}

/// Local instance record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceDescriptor {
    /// Local instance UUID
    pub uuid: String,

    /// User-facing display name
    pub display_name: String,

    /// Owning project (tenant)
    pub project_id: String,

    /// Owning user
    #[serde(default)]
    pub user_id: Option<String>,

    /// Local compute host the instance is scheduled on
    #[serde(default)]
    pub host: Option<String>,

    /// Local flavor id
    pub flavor_id: String,

    /// Local flavor name, used to locate the remote flavor
    #[serde(default)]
    pub flavor_name: Option<String>,

    /// User metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Local network ports to bind once the instance exists
    #[serde(default)]
    pub network_ports: Vec<String>,

    /// Cloud-init user data (already base64 encoded by the orchestrator)
    #[serde(default)]
    pub user_data: Option<String>,

    /// SSH key pair name to pass through
    #[serde(default)]
    pub key_name: Option<String>,
}

impl InstanceDescriptor {
    pub fn naming_key(&self) -> NamingKey {
        NamingKey::new(&self.display_name, &self.uuid)
    }
}

/// Local image record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageDescriptor {
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,
}

/// File injected into the remote instance at boot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectedFile {
    pub path: String,
    pub contents: Vec<u8>,
}

/// Local block-device entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockDeviceDescriptor {
    /// Guest device name (e.g. `/dev/vdb`)
    #[serde(default)]
    pub device_name: Option<String>,

    /// Local volume id, when the entry is backed by a volume
    #[serde(default)]
    pub volume_id: Option<String>,

    /// Local volume display name (for name fallback)
    #[serde(default)]
    pub volume_name: Option<String>,

    /// Blank volume size in GB, when no volume is referenced
    #[serde(default)]
    pub volume_size: Option<u32>,

    #[serde(default)]
    pub boot_index: Option<i32>,

    #[serde(default)]
    pub delete_on_termination: bool,
}

/// Connection info for volume attach/detach
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VolumeConnectionInfo {
    /// Local volume id
    pub volume_id: String,

    /// Local volume display name
    #[serde(default)]
    pub display_name: Option<String>,
}

impl VolumeConnectionInfo {
    pub fn naming_key(&self) -> NamingKey {
        NamingKey::new(
            self.display_name.clone().unwrap_or_default(),
            &self.volume_id,
        )
    }
}

/// Local power-state enumeration reported back to the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    NoState,
    Running,
    Paused,
    Shutdown,
    Crashed,
    Suspended,
}

impl PowerState {
    /// Map the remote compute power-state code onto the local enumeration
    pub fn from_remote(code: Option<i64>) -> Self {
        match code {
            Some(1) => PowerState::Running,
            Some(3) => PowerState::Paused,
            Some(4) => PowerState::Shutdown,
            Some(6) => PowerState::Crashed,
            Some(7) => PowerState::Suspended,
            _ => PowerState::NoState,
        }
    }
}

impl std::fmt::Display for PowerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerState::NoState => write!(f, "no-state"),
            PowerState::Running => write!(f, "running"),
            PowerState::Paused => write!(f, "paused"),
            PowerState::Shutdown => write!(f, "shutdown"),
            PowerState::Crashed => write!(f, "crashed"),
            PowerState::Suspended => write!(f, "suspended"),
        }
    }
}

/// Static inventory reported for a compute node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacitySnapshot {
    pub hypervisor_hostname: String,
    pub hypervisor_type: String,
    pub vcpus: u32,
    pub memory_mb: u64,
    pub local_gb: u64,
    pub vcpus_used: u32,
    pub memory_mb_used: u64,
    pub local_gb_used: u64,
}
