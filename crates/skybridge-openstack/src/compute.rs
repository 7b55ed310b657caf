//! Compute adapter (servers, power actions, volume attachments, flavors)

use crate::http::{ApiClient, Subject, exact_name_filter};
use async_trait::async_trait;
use base64::Engine;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use skybridge_cloud::{
    BlockDeviceMapping, ComputeService, CreateServerRequest, RemoteFlavor, RemoteServer, Result,
    ServerAction, ServiceType, Session,
};
use std::collections::HashMap;

/// Compute service client
pub struct ComputeClient {
    api: ApiClient,
}

impl ComputeClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    fn url(session: &Session, path: &str) -> Result<String> {
        Ok(format!("{}{}", session.endpoint(ServiceType::Compute)?, path))
    }

    /// Request body for server creation
    fn create_body(request: &CreateServerRequest) -> Value {
        let personality: Vec<Value> = request
            .personality
            .iter()
            .map(|file| {
                json!({
                    "path": file.path,
                    "contents": base64::engine::general_purpose::STANDARD.encode(&file.contents),
                })
            })
            .collect();
        let security_groups: Vec<Value> = request
            .security_groups
            .iter()
            .map(|name| json!({ "name": name }))
            .collect();
        let networks: Vec<Value> = request
            .networks
            .iter()
            .map(|id| json!({ "uuid": id }))
            .collect();
        let block_devices: Vec<ApiBlockDevice<'_>> = request
            .block_device_mapping
            .iter()
            .map(ApiBlockDevice::from)
            .collect();

        let mut server = json!({
            "name": request.name,
            "flavorRef": request.flavor_ref,
            "metadata": request.metadata,
            "security_groups": security_groups,
            "networks": networks,
        });

        // Absent keys, not nulls: the API rejects `"imageRef": null`
        if let Some(object) = server.as_object_mut() {
            if let Some(image_ref) = &request.image_ref {
                object.insert("imageRef".into(), json!(image_ref));
            }
            if !personality.is_empty() {
                object.insert("personality".into(), json!(personality));
            }
            if !block_devices.is_empty() {
                object.insert("block_device_mapping_v2".into(), json!(block_devices));
            }
            if let Some(zone) = &request.availability_zone {
                object.insert("availability_zone".into(), json!(zone));
            }
            if let Some(user_data) = &request.user_data {
                object.insert("user_data".into(), json!(user_data));
            }
            if let Some(key_name) = &request.key_name {
                object.insert("key_name".into(), json!(key_name));
            }
        }

        json!({ "server": server })
    }

    async fn list_detail(&self, session: &Session, name: Option<&str>) -> Result<Vec<RemoteServer>> {
        let url = Self::url(session, "/servers/detail")?;
        let mut builder = self.api.request(Method::GET, &url);
        if let Some(name) = name {
            builder = builder.query(&[("name", exact_name_filter(name))]);
        }

        let reply = self
            .api
            .execute(builder, Some(&session.token), Subject::new("server", name.unwrap_or("*")))
            .await?;
        let response: ServersEnvelope = reply.json()?;

        Ok(response.servers.into_iter().map(RemoteServer::from).collect())
    }
}

#[async_trait]
impl ComputeService for ComputeClient {
    async fn create_server(
        &self,
        session: &Session,
        request: &CreateServerRequest,
    ) -> Result<RemoteServer> {
        let url = Self::url(session, "/servers")?;
        let reply = self
            .api
            .execute(
                self.api
                    .request(Method::POST, &url)
                    .json(&Self::create_body(request)),
                Some(&session.token),
                Subject::new("server", &request.name),
            )
            .await?;

        // creation returns only the id; the rest comes from the request
        let response: CreatedEnvelope = reply.json()?;
        Ok(RemoteServer {
            id: response.server.id,
            name: request.name.clone(),
            status: "BUILD".to_string(),
            power_state: None,
            metadata: request.metadata.clone(),
        })
    }

    async fn get_server(&self, session: &Session, server_id: &str) -> Result<RemoteServer> {
        let url = Self::url(session, &format!("/servers/{}", server_id))?;
        let reply = self
            .api
            .execute(
                self.api.request(Method::GET, &url),
                Some(&session.token),
                Subject::new("server", server_id),
            )
            .await?;

        let response: ServerEnvelope = reply.json()?;
        Ok(response.server.into())
    }

    async fn find_servers_by_name(
        &self,
        session: &Session,
        name: &str,
    ) -> Result<Vec<RemoteServer>> {
        let servers = self.list_detail(session, Some(name)).await?;
        Ok(servers.into_iter().filter(|s| s.name == name).collect())
    }

    async fn list_servers(&self, session: &Session) -> Result<Vec<RemoteServer>> {
        self.list_detail(session, None).await
    }

    async fn delete_server(&self, session: &Session, server_id: &str) -> Result<()> {
        let url = Self::url(session, &format!("/servers/{}", server_id))?;
        self.api
            .execute(
                self.api.request(Method::DELETE, &url),
                Some(&session.token),
                Subject::new("server", server_id),
            )
            .await?;
        Ok(())
    }

    async fn server_action(
        &self,
        session: &Session,
        server_id: &str,
        action: ServerAction,
    ) -> Result<()> {
        let url = Self::url(session, &format!("/servers/{}/action", server_id))?;
        let body = match action {
            ServerAction::Start => json!({ "os-start": null }),
            ServerAction::Stop => json!({ "os-stop": null }),
            ServerAction::Reboot => json!({ "reboot": { "type": "SOFT" } }),
        };

        tracing::debug!("Issuing {} on server {}", action, server_id);
        self.api
            .execute(
                self.api.request(Method::POST, &url).json(&body),
                Some(&session.token),
                Subject::new("server", server_id),
            )
            .await?;
        Ok(())
    }

    async fn attach_volume(
        &self,
        session: &Session,
        server_id: &str,
        volume_id: &str,
        device: Option<&str>,
    ) -> Result<()> {
        let url = Self::url(session, &format!("/servers/{}/os-volume_attachments", server_id))?;
        let mut attachment = json!({ "volumeId": volume_id });
        if let (Some(device), Some(object)) = (device, attachment.as_object_mut()) {
            object.insert("device".into(), json!(device));
        }

        self.api
            .execute(
                self.api
                    .request(Method::POST, &url)
                    .json(&json!({ "volumeAttachment": attachment })),
                Some(&session.token),
                Subject::new("server", server_id),
            )
            .await?;
        Ok(())
    }

    async fn detach_volume(
        &self,
        session: &Session,
        server_id: &str,
        attachment_id: &str,
    ) -> Result<()> {
        let url = Self::url(
            session,
            &format!("/servers/{}/os-volume_attachments/{}", server_id, attachment_id),
        )?;
        self.api
            .execute(
                self.api.request(Method::DELETE, &url),
                Some(&session.token),
                Subject::new("volume attachment", attachment_id),
            )
            .await?;
        Ok(())
    }

    async fn get_flavor(&self, session: &Session, flavor_id: &str) -> Result<RemoteFlavor> {
        let url = Self::url(session, &format!("/flavors/{}", flavor_id))?;
        let reply = self
            .api
            .execute(
                self.api.request(Method::GET, &url),
                Some(&session.token),
                Subject::new("flavor", flavor_id),
            )
            .await?;

        let response: FlavorEnvelope = reply.json()?;
        Ok(response.flavor.into())
    }

    async fn find_flavor_by_name(
        &self,
        session: &Session,
        name: &str,
    ) -> Result<Option<RemoteFlavor>> {
        let url = Self::url(session, "/flavors/detail")?;
        let reply = self
            .api
            .execute(
                self.api.request(Method::GET, &url),
                Some(&session.token),
                Subject::new("flavor", name),
            )
            .await?;

        let response: FlavorsEnvelope = reply.json()?;
        Ok(response
            .flavors
            .into_iter()
            .find(|f| f.name == name)
            .map(RemoteFlavor::from))
    }
}

// ============ API Types ============

#[derive(Debug, Serialize)]
struct ApiBlockDevice<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    boot_index: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    uuid: Option<&'a str>,
    source_type: &'a str,
    destination_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    volume_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_name: Option<&'a str>,
    delete_on_termination: bool,
}

impl<'a> From<&'a BlockDeviceMapping> for ApiBlockDevice<'a> {
    fn from(bdm: &'a BlockDeviceMapping) -> Self {
        Self {
            boot_index: bdm.boot_index,
            uuid: bdm.uuid.as_deref(),
            source_type: &bdm.source_type,
            destination_type: &bdm.destination_type,
            volume_size: bdm.volume_size,
            device_name: bdm.device_name.as_deref(),
            delete_on_termination: bdm.delete_on_termination,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreatedEnvelope {
    server: CreatedServer,
}

#[derive(Debug, Deserialize)]
struct CreatedServer {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ServerEnvelope {
    server: ApiServer,
}

#[derive(Debug, Deserialize)]
struct ServersEnvelope {
    #[serde(default)]
    servers: Vec<ApiServer>,
}

#[derive(Debug, Deserialize)]
struct ApiServer {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    status: String,
    #[serde(rename = "OS-EXT-STS:power_state")]
    power_state: Option<i64>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

impl From<ApiServer> for RemoteServer {
    fn from(server: ApiServer) -> Self {
        Self {
            id: server.id,
            name: server.name,
            status: server.status,
            power_state: server.power_state,
            metadata: server.metadata,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FlavorEnvelope {
    flavor: ApiFlavor,
}

#[derive(Debug, Deserialize)]
struct FlavorsEnvelope {
    #[serde(default)]
    flavors: Vec<ApiFlavor>,
}

#[derive(Debug, Deserialize)]
struct ApiFlavor {
    id: String,
    name: String,
    vcpus: Option<u32>,
    ram: Option<u64>,
    disk: Option<u64>,
}

impl From<ApiFlavor> for RemoteFlavor {
    fn from(flavor: ApiFlavor) -> Self {
        Self {
            id: flavor.id,
            name: flavor.name,
            vcpus: flavor.vcpus,
            ram: flavor.ram,
            disk: flavor.disk,
        }
    }
}
