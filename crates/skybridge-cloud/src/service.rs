//! Remote control-plane service traits
//!
//! Four narrow adapters (identity, compute, volume, image). Every call takes
//! the tenant [`Session`] it runs under, so one adapter instance serves all
//! tenants. Implementations translate their transport failures into
//! [`CloudError`](crate::CloudError) before returning.

use crate::error::{CloudError, Result};
use crate::model::InjectedFile;
use crate::poll::{Observation, PendingOperation};
use crate::session::{IdentitySession, Session};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Remote compute instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteServer {
    pub id: String,
    pub name: String,
    pub status: String,

    /// Remote power-state code
    pub power_state: Option<i64>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Remote block-storage volume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteVolume {
    pub id: String,
    pub name: Option<String>,
    pub status: String,
    pub size: Option<u32>,

    #[serde(default)]
    pub attachments: Vec<VolumeAttachment>,
}

/// One entry of a volume's attachment list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeAttachment {
    pub attachment_id: Option<String>,
    pub volume_id: String,
    pub server_id: String,
    pub device: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteImage {
    pub id: String,
    pub name: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteFlavor {
    pub id: String,
    pub name: String,
    pub vcpus: Option<u32>,
    pub ram: Option<u64>,
    pub disk: Option<u64>,
}

/// Remote block-device-mapping entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockDeviceMapping {
    pub boot_index: Option<i32>,
    pub uuid: Option<String>,
    pub source_type: String,
    pub destination_type: String,
    pub volume_size: Option<u32>,
    pub device_name: Option<String>,
    pub delete_on_termination: bool,
}

/// Remote instance creation request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateServerRequest {
    pub name: String,
    pub image_ref: Option<String>,
    pub flavor_ref: String,
    pub metadata: HashMap<String, String>,
    pub personality: Vec<InjectedFile>,
    pub block_device_mapping: Vec<BlockDeviceMapping>,
    pub security_groups: Vec<String>,
    pub networks: Vec<String>,
    pub availability_zone: Option<String>,
    pub user_data: Option<String>,
    pub key_name: Option<String>,
}

/// Power actions on a remote instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerAction {
    Start,
    Stop,
    Reboot,
}

impl std::fmt::Display for ServerAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerAction::Start => write!(f, "start"),
            ServerAction::Stop => write!(f, "stop"),
            ServerAction::Reboot => write!(f, "reboot"),
        }
    }
}

/// Impersonating delegation trust to create
#[derive(Debug, Clone, PartialEq)]
pub struct TrustRequest {
    pub trustor_user_id: String,
    pub trustee_user_id: String,
    pub project_id: String,
    pub roles: Vec<String>,
    pub impersonation: bool,
}

/// Least-privilege remote user to create
#[derive(Clone, PartialEq)]
pub struct ServiceUserRequest {
    pub name: String,
    pub password: String,
    pub project_id: String,
    pub email: Option<String>,
}

impl std::fmt::Debug for ServiceUserRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceUserRequest")
            .field("name", &self.name)
            .field("project_id", &self.project_id)
            .finish()
    }
}

/// Turn a status lookup into a poll observation (NotFound = absent)
pub fn observe(status: Result<String>) -> Result<Observation> {
    match status {
        Ok(status) => Ok(Observation::Status(status)),
        Err(e) if e.is_not_found() => Ok(Observation::Absent),
        Err(e) => Err(e),
    }
}

#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Negotiate a session over the protocol the request selects
    async fn authenticate(&self, request: &IdentitySession) -> Result<Session>;

    /// Create a trust; needs a v3 session of the trustor
    async fn create_trust(&self, session: &Session, trust: &TrustRequest) -> Result<String>;

    async fn delete_trust(&self, session: &Session, trust_id: &str) -> Result<()>;

    /// Create a user; needs a v2 admin session
    async fn create_user(&self, session: &Session, user: &ServiceUserRequest) -> Result<String>;

    async fn delete_user(&self, session: &Session, user_id: &str) -> Result<()>;
}

#[async_trait]
pub trait ComputeService: Send + Sync {
    async fn create_server(
        &self,
        session: &Session,
        request: &CreateServerRequest,
    ) -> Result<RemoteServer>;

    async fn get_server(&self, session: &Session, server_id: &str) -> Result<RemoteServer>;

    async fn find_servers_by_name(&self, session: &Session, name: &str)
    -> Result<Vec<RemoteServer>>;

    async fn list_servers(&self, session: &Session) -> Result<Vec<RemoteServer>>;

    async fn delete_server(&self, session: &Session, server_id: &str) -> Result<()>;

    async fn server_action(
        &self,
        session: &Session,
        server_id: &str,
        action: ServerAction,
    ) -> Result<()>;

    async fn attach_volume(
        &self,
        session: &Session,
        server_id: &str,
        volume_id: &str,
        device: Option<&str>,
    ) -> Result<()>;

    async fn detach_volume(
        &self,
        session: &Session,
        server_id: &str,
        attachment_id: &str,
    ) -> Result<()>;

    async fn get_flavor(&self, session: &Session, flavor_id: &str) -> Result<RemoteFlavor>;

    async fn find_flavor_by_name(
        &self,
        session: &Session,
        name: &str,
    ) -> Result<Option<RemoteFlavor>>;

    /// Poll a server until `pending` is satisfied
    async fn wait_for_server(
        &self,
        session: &Session,
        server_id: &str,
        pending: &PendingOperation,
    ) -> Result<Observation> {
        pending
            .wait(move || async move {
                observe(self.get_server(session, server_id).await.map(|s| s.status))
            })
            .await
    }
}

#[async_trait]
pub trait VolumeService: Send + Sync {
    async fn create_volume(&self, session: &Session, name: &str, size_gb: u32)
    -> Result<RemoteVolume>;

    async fn get_volume(&self, session: &Session, volume_id: &str) -> Result<RemoteVolume>;

    async fn find_volumes_by_name(&self, session: &Session, name: &str)
    -> Result<Vec<RemoteVolume>>;

    async fn list_volumes(&self, session: &Session) -> Result<Vec<RemoteVolume>>;

    async fn delete_volume(&self, session: &Session, volume_id: &str) -> Result<()>;

    /// Poll a volume until `pending` is satisfied
    async fn wait_for_volume(
        &self,
        session: &Session,
        volume_id: &str,
        pending: &PendingOperation,
    ) -> Result<Observation> {
        pending
            .wait(move || async move {
                observe(self.get_volume(session, volume_id).await.map(|v| v.status))
            })
            .await
    }
}

#[async_trait]
pub trait ImageService: Send + Sync {
    async fn get_image(&self, session: &Session, image_id: &str) -> Result<RemoteImage>;

    async fn find_images_by_name(&self, session: &Session, name: &str)
    -> Result<Vec<RemoteImage>>;

    async fn list_images(&self, session: &Session) -> Result<Vec<RemoteImage>>;

    async fn delete_image(&self, session: &Session, image_id: &str) -> Result<()>;
}

/// The four adapters the driver talks through
#[derive(Clone)]
pub struct RemoteCloud {
    pub identity: Arc<dyn IdentityService>,
    pub compute: Arc<dyn ComputeService>,
    pub volume: Arc<dyn VolumeService>,
    pub image: Arc<dyn ImageService>,
}

/// Ok(None) for NotFound, pass every other error through
pub fn optional<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(CloudError::NotFound { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}
