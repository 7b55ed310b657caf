//! Block-storage adapter

use crate::http::{ApiClient, Subject};
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use skybridge_cloud::{
    RemoteVolume, Result, ServiceType, Session, VolumeAttachment, VolumeService,
};

/// Block-storage service client
pub struct VolumeClient {
    api: ApiClient,
}

impl VolumeClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    fn url(session: &Session, path: &str) -> Result<String> {
        Ok(format!("{}{}", session.endpoint(ServiceType::Volume)?, path))
    }

    async fn list_detail(&self, session: &Session, name: Option<&str>) -> Result<Vec<RemoteVolume>> {
        let url = Self::url(session, "/volumes/detail")?;
        let mut builder = self.api.request(Method::GET, &url);
        if let Some(name) = name {
            builder = builder.query(&[("name", name)]);
        }

        let reply = self
            .api
            .execute(builder, Some(&session.token), Subject::new("volume", name.unwrap_or("*")))
            .await?;
        let response: VolumesEnvelope = reply.json()?;

        Ok(response.volumes.into_iter().map(RemoteVolume::from).collect())
    }
}

#[async_trait]
impl VolumeService for VolumeClient {
    async fn create_volume(
        &self,
        session: &Session,
        name: &str,
        size_gb: u32,
    ) -> Result<RemoteVolume> {
        let url = Self::url(session, "/volumes")?;
        let reply = self
            .api
            .execute(
                self.api
                    .request(Method::POST, &url)
                    .json(&json!({ "volume": { "name": name, "size": size_gb } })),
                Some(&session.token),
                Subject::new("volume", name),
            )
            .await?;

        let response: VolumeEnvelope = reply.json()?;
        Ok(response.volume.into())
    }

    async fn get_volume(&self, session: &Session, volume_id: &str) -> Result<RemoteVolume> {
        let url = Self::url(session, &format!("/volumes/{}", volume_id))?;
        let reply = self
            .api
            .execute(
                self.api.request(Method::GET, &url),
                Some(&session.token),
                Subject::new("volume", volume_id),
            )
            .await?;

        let response: VolumeEnvelope = reply.json()?;
        Ok(response.volume.into())
    }

    async fn find_volumes_by_name(
        &self,
        session: &Session,
        name: &str,
    ) -> Result<Vec<RemoteVolume>> {
        let volumes = self.list_detail(session, Some(name)).await?;
        Ok(volumes
            .into_iter()
            .filter(|v| v.name.as_deref() == Some(name))
            .collect())
    }

    async fn list_volumes(&self, session: &Session) -> Result<Vec<RemoteVolume>> {
        self.list_detail(session, None).await
    }

    async fn delete_volume(&self, session: &Session, volume_id: &str) -> Result<()> {
        let url = Self::url(session, &format!("/volumes/{}", volume_id))?;
        self.api
            .execute(
                self.api.request(Method::DELETE, &url),
                Some(&session.token),
                Subject::new("volume", volume_id),
            )
            .await?;
        Ok(())
    }
}

// ============ API Types ============

#[derive(Debug, Deserialize)]
struct VolumeEnvelope {
    volume: ApiVolume,
}

#[derive(Debug, Deserialize)]
struct VolumesEnvelope {
    #[serde(default)]
    volumes: Vec<ApiVolume>,
}

#[derive(Debug, Deserialize)]
struct ApiVolume {
    id: String,
    name: Option<String>,
    status: String,
    size: Option<u32>,
    #[serde(default)]
    attachments: Vec<ApiAttachment>,
}

#[derive(Debug, Deserialize)]
struct ApiAttachment {
    attachment_id: Option<String>,
    volume_id: String,
    server_id: String,
    device: Option<String>,
}

impl From<ApiVolume> for RemoteVolume {
    fn from(volume: ApiVolume) -> Self {
        Self {
            id: volume.id,
            name: volume.name,
            status: volume.status,
            size: volume.size,
            attachments: volume
                .attachments
                .into_iter()
                .map(|a| VolumeAttachment {
                    attachment_id: a.attachment_id,
                    volume_id: a.volume_id,
                    server_id: a.server_id,
                    device: a.device,
                })
                .collect(),
        }
    }
}
