//! Lifecycle driver
//!
//! Every operation is a short `translate → invoke → poll → finalize` run
//! against the remote cloud, executed under the tenant's own session.
//!
//! | observed remote state        | behaviour                            |
//! |------------------------------|--------------------------------------|
//! | target already reached       | succeed without a remote call        |
//! | valid source for the action  | issue the action, poll to the target |
//! | anything else                | `InvalidState`, nothing issued       |
//!
//! Timeouts surface as `CloudError::Timeout` and leave the remote resource
//! as it is. Nothing here retries a lifecycle call.

use crate::broker::CredentialBroker;
use crate::mapper::ResourceMapper;
use crate::network::{LoggingPortBinder, PortBinder};
use crate::settings::DriverSettings;
use skybridge_cloud::service::optional;
use skybridge_cloud::{
    BlockDeviceDescriptor, BlockDeviceMapping, CapacitySnapshot, CloudError, ComputeService,
    CreateServerRequest, ImageDescriptor, ImageService, InjectedFile, InstanceDescriptor,
    LOCAL_UUID_METADATA_KEY, MappingStore, NamingKey, PendingOperation, PowerState, RemoteCloud,
    RemoteFlavor, RemoteImage, RemoteServer, RemoteVolume, ResourceKind, Result, ServerAction,
    Session, TenantContext, VolumeConnectionInfo, VolumeService,
};
use skybridge_config::BridgeConfig;
use std::sync::Arc;

/// Server statuses that end any wait with a hard failure
const SERVER_FAILURE_STATES: &[&str] = &["ERROR", "DELETED", "SOFT_DELETED"];

const VOLUME_FAILURE_STATES: &[&str] = &["error"];

/// Statuses of a server that has picked up a reboot request
const REBOOT_STATES: &[&str] = &["REBOOT", "HARD_REBOOT"];

pub struct ProxyDriver {
    broker: Arc<CredentialBroker>,
    mapper: ResourceMapper,
    cloud: RemoteCloud,
    ports: Arc<dyn PortBinder>,
    settings: DriverSettings,
}

impl ProxyDriver {
    pub fn new(
        broker: Arc<CredentialBroker>,
        mapper: ResourceMapper,
        cloud: RemoteCloud,
        settings: DriverSettings,
    ) -> Self {
        Self {
            broker,
            mapper,
            cloud,
            ports: Arc::new(LoggingPortBinder),
            settings,
        }
    }

    /// Driver wired from a loaded configuration
    pub fn from_config(
        config: &BridgeConfig,
        cloud: RemoteCloud,
        store: Arc<dyn MappingStore>,
    ) -> Self {
        let broker = CredentialBroker::from_config(
            cloud.identity.clone(),
            &config.identity,
            config.service_user_delete.retry_config(),
        );
        Self::new(
            Arc::new(broker),
            ResourceMapper::new(store),
            cloud,
            DriverSettings::from_config(config),
        )
    }

    pub fn with_port_binder(mut self, ports: Arc<dyn PortBinder>) -> Self {
        self.ports = ports;
        self
    }

    pub fn broker(&self) -> &CredentialBroker {
        &self.broker
    }

    pub fn mapper(&self) -> &ResourceMapper {
        &self.mapper
    }

    pub fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    /// Session for `ctx`, refusing instances owned by another project
    async fn session_for(
        &self,
        ctx: &mut TenantContext,
        instance: &InstanceDescriptor,
    ) -> Result<Session> {
        if !instance.project_id.is_empty() && instance.project_id != ctx.project_id {
            return Err(CloudError::Authorization(format!(
                "instance {} belongs to project {}, not {}",
                instance.uuid, instance.project_id, ctx.project_id
            )));
        }
        self.broker.get_session(ctx).await
    }

    // ============ Resolution ============

    async fn find_server(
        &self,
        session: &Session,
        project_id: &str,
        instance: &InstanceDescriptor,
    ) -> Result<Option<RemoteServer>> {
        let compute = self.cloud.compute.as_ref();
        let key = instance.naming_key();
        self.mapper
            .resolve(
                &instance.uuid,
                project_id,
                ResourceKind::Instance,
                |remote_id| fetch_server(compute, session, remote_id),
                || search_server(compute, session, &key),
            )
            .await
    }

    async fn require_server(
        &self,
        session: &Session,
        project_id: &str,
        instance: &InstanceDescriptor,
    ) -> Result<RemoteServer> {
        self.find_server(session, project_id, instance)
            .await?
            .ok_or_else(|| CloudError::not_found("instance", &instance.uuid))
    }

    async fn find_volume(
        &self,
        session: &Session,
        project_id: &str,
        key: &NamingKey,
    ) -> Result<Option<RemoteVolume>> {
        let volumes = self.cloud.volume.as_ref();
        self.mapper
            .resolve(
                key.local_uuid(),
                project_id,
                ResourceKind::Volume,
                |remote_id| fetch_volume(volumes, session, remote_id),
                || search_volume(volumes, session, key),
            )
            .await
    }

    async fn require_volume(
        &self,
        session: &Session,
        project_id: &str,
        info: &VolumeConnectionInfo,
    ) -> Result<RemoteVolume> {
        self.find_volume(session, project_id, &info.naming_key())
            .await?
            .ok_or_else(|| CloudError::not_found("volume", &info.volume_id))
    }

    /// Remote image id: mapping, then name, then the default base image
    async fn resolve_image(
        &self,
        session: &Session,
        project_id: &str,
        image: &ImageDescriptor,
    ) -> Result<String> {
        let images = self.cloud.image.as_ref();
        let found = self
            .mapper
            .resolve(
                &image.id,
                project_id,
                ResourceKind::Image,
                |remote_id| fetch_image(images, session, remote_id),
                || search_image(images, session, image.name.as_deref()),
            )
            .await?;

        match (found, &self.settings.default_base_image) {
            (Some(remote), _) => Ok(remote.id),
            (None, Some(base)) => {
                tracing::info!(
                    image = %image.id,
                    base = %base,
                    "No remote image for local image, using default base image"
                );
                Ok(base.clone())
            }
            (None, None) => Err(CloudError::not_found("image", &image.id)),
        }
    }

    async fn resolve_flavor(
        &self,
        session: &Session,
        project_id: &str,
        instance: &InstanceDescriptor,
    ) -> Result<String> {
        let compute = self.cloud.compute.as_ref();
        self.mapper
            .resolve(
                &instance.flavor_id,
                project_id,
                ResourceKind::Flavor,
                |remote_id| fetch_flavor(compute, session, remote_id),
                || search_flavor(compute, session, instance.flavor_name.as_deref()),
            )
            .await?
            .map(|flavor| flavor.id)
            .ok_or_else(|| CloudError::not_found("flavor", &instance.flavor_id))
    }

    /// Translate local block devices 1:1, skipping unresolvable volumes
    async fn block_device_mapping(
        &self,
        session: &Session,
        project_id: &str,
        instance: &InstanceDescriptor,
        block_devices: &[BlockDeviceDescriptor],
    ) -> Result<Vec<BlockDeviceMapping>> {
        let mut mapping = Vec::with_capacity(block_devices.len());

        for device in block_devices {
            let entry = match (&device.volume_id, device.volume_size) {
                (Some(local_volume_id), _) => {
                    let key = NamingKey::new(
                        device.volume_name.clone().unwrap_or_default(),
                        local_volume_id,
                    );
                    match self.find_volume(session, project_id, &key).await? {
                        Some(volume) => BlockDeviceMapping {
                            boot_index: device.boot_index,
                            uuid: Some(volume.id),
                            source_type: "volume".to_string(),
                            destination_type: "volume".to_string(),
                            volume_size: device.volume_size,
                            device_name: device.device_name.clone(),
                            delete_on_termination: device.delete_on_termination,
                        },
                        None => {
                            tracing::warn!(
                                local_volume_id = %local_volume_id,
                                instance = %instance.uuid,
                                "Skipping block device: volume has no remote counterpart"
                            );
                            continue;
                        }
                    }
                }
                (None, Some(size)) => BlockDeviceMapping {
                    boot_index: device.boot_index,
                    uuid: None,
                    source_type: "blank".to_string(),
                    destination_type: "volume".to_string(),
                    volume_size: Some(size),
                    device_name: device.device_name.clone(),
                    delete_on_termination: device.delete_on_termination,
                },
                (None, None) => {
                    tracing::debug!(
                        instance = %instance.uuid,
                        device = ?device.device_name,
                        "Ignoring block device with neither volume nor size"
                    );
                    continue;
                }
            };
            mapping.push(entry);
        }

        Ok(mapping)
    }

    async fn bind_ports(&self, instance: &InstanceDescriptor, host_id: &str) -> Result<()> {
        for port in &instance.network_ports {
            self.ports.bind_port(port, host_id).await?;
        }
        Ok(())
    }

    // ============ Lifecycle ============

    /// Create the remote counterpart of a local instance and wait for ACTIVE
    ///
    /// An instance left behind by an earlier, interrupted spawn is adopted
    /// instead of created twice. Returns the remote instance id.
    pub async fn spawn(
        &self,
        ctx: &mut TenantContext,
        instance: &InstanceDescriptor,
        image: &ImageDescriptor,
        injected_files: &[InjectedFile],
        block_devices: &[BlockDeviceDescriptor],
    ) -> Result<String> {
        let session = self.session_for(ctx, instance).await?;
        let project_id = ctx.project_id.as_str();
        let key = instance.naming_key();
        tracing::info!(instance = %instance.uuid, name = %key, "Spawning instance");

        let image_ref = self.resolve_image(&session, project_id, image).await?;
        let flavor_ref = self.resolve_flavor(&session, project_id, instance).await?;
        let block_device_mapping = self
            .block_device_mapping(&session, project_id, instance, block_devices)
            .await?;

        if let Some(host) = &instance.host {
            self.bind_ports(instance, host).await?;
        }

        let remote_id = match self.find_server(&session, project_id, instance).await? {
            Some(existing) => {
                tracing::warn!(
                    instance = %instance.uuid,
                    remote_id = %existing.id,
                    "Remote instance already exists, adopting it"
                );
                existing.id
            }
            None => {
                let mut metadata = instance.metadata.clone();
                metadata.extend(self.settings.bootstrap_metadata.clone());
                metadata.insert(LOCAL_UUID_METADATA_KEY.to_string(), instance.uuid.clone());

                let request = CreateServerRequest {
                    name: key.remote_name(),
                    image_ref: Some(image_ref),
                    flavor_ref,
                    metadata,
                    personality: injected_files.to_vec(),
                    block_device_mapping,
                    security_groups: self.settings.security_groups.clone(),
                    networks: self.settings.network_ids.clone(),
                    availability_zone: self.settings.availability_zone.clone(),
                    user_data: instance.user_data.clone(),
                    key_name: instance.key_name.clone(),
                };

                let created = self.cloud.compute.create_server(&session, &request).await?;
                self.mapper
                    .record(&instance.uuid, project_id, ResourceKind::Instance, &created.id)
                    .await?;
                created.id
            }
        };

        let pending = PendingOperation::until_status(
            format!("instance {}", remote_id),
            &["ACTIVE"],
            self.settings.spawn_policy.clone(),
        )
        .failing_on(SERVER_FAILURE_STATES);
        self.cloud
            .compute
            .wait_for_server(&session, &remote_id, &pending)
            .await?;

        self.bind_ports(instance, &remote_id).await?;

        tracing::info!(instance = %instance.uuid, remote_id = %remote_id, "Instance active");
        Ok(remote_id)
    }

    /// Delete the remote counterpart and wait for it to disappear
    ///
    /// An instance that is already gone counts as destroyed.
    pub async fn destroy(&self, ctx: &mut TenantContext, instance: &InstanceDescriptor) -> Result<()> {
        let session = self.session_for(ctx, instance).await?;
        let Some(server) = self
            .find_server(&session, &ctx.project_id, instance)
            .await?
        else {
            tracing::info!(instance = %instance.uuid, "Remote instance already absent");
            return Ok(());
        };

        tracing::info!(instance = %instance.uuid, remote_id = %server.id, "Destroying instance");
        if optional(self.cloud.compute.delete_server(&session, &server.id).await)?.is_none() {
            return Ok(());
        }

        let pending = PendingOperation::until_absent(
            format!("instance {}", server.id),
            self.settings.destroy_policy.clone(),
        );
        self.cloud
            .compute
            .wait_for_server(&session, &server.id, &pending)
            .await?;

        tracing::info!(instance = %instance.uuid, "Instance destroyed");
        Ok(())
    }

    /// Attach a volume and wait for `in-use`
    pub async fn attach_volume(
        &self,
        ctx: &mut TenantContext,
        instance: &InstanceDescriptor,
        connection_info: &VolumeConnectionInfo,
        mountpoint: &str,
    ) -> Result<()> {
        let session = self.session_for(ctx, instance).await?;
        let project_id = ctx.project_id.as_str();
        let server = self.require_server(&session, project_id, instance).await?;
        let volume = self
            .require_volume(&session, project_id, connection_info)
            .await?;

        if volume.attachments.iter().any(|a| a.server_id == server.id) {
            tracing::info!(volume = %volume.id, server = %server.id, "Volume already attached");
            return Ok(());
        }
        if !volume.status.eq_ignore_ascii_case("available") {
            return Err(CloudError::invalid_state(
                format!("volume {}", volume.id),
                volume.status,
                "available",
            ));
        }

        let device = (!mountpoint.is_empty()).then_some(mountpoint);
        tracing::info!(volume = %volume.id, server = %server.id, device = ?device, "Attaching volume");
        self.cloud
            .compute
            .attach_volume(&session, &server.id, &volume.id, device)
            .await?;

        let pending = PendingOperation::until_status(
            format!("volume {}", volume.id),
            &["in-use"],
            self.settings.volume_policy.clone(),
        )
        .failing_on(VOLUME_FAILURE_STATES);
        self.cloud
            .volume
            .wait_for_volume(&session, &volume.id, &pending)
            .await?;
        Ok(())
    }

    /// Detach a volume and wait for `available`
    pub async fn detach_volume(
        &self,
        ctx: &mut TenantContext,
        instance: &InstanceDescriptor,
        connection_info: &VolumeConnectionInfo,
        mountpoint: &str,
    ) -> Result<()> {
        let session = self.session_for(ctx, instance).await?;
        let project_id = ctx.project_id.as_str();
        let server = self.require_server(&session, project_id, instance).await?;
        let volume = self
            .require_volume(&session, project_id, connection_info)
            .await?;

        let Some(attachment) = volume
            .attachments
            .iter()
            .find(|a| a.server_id == server.id && a.volume_id == volume.id)
        else {
            if volume.status.eq_ignore_ascii_case("available") {
                tracing::info!(volume = %volume.id, "Volume already detached");
                return Ok(());
            }
            return Err(CloudError::invalid_state(
                format!("volume {} on instance {}", volume.id, server.id),
                volume.status,
                "available",
            ));
        };

        tracing::info!(
            volume = %volume.id,
            server = %attachment.server_id,
            device = mountpoint,
            "Detaching volume"
        );
        // compute addresses attachments by volume id
        self.cloud
            .compute
            .detach_volume(&session, &attachment.server_id, &attachment.volume_id)
            .await?;

        let pending = PendingOperation::until_status(
            format!("volume {}", volume.id),
            &["available"],
            self.settings.volume_policy.clone(),
        )
        .failing_on(VOLUME_FAILURE_STATES);
        self.cloud
            .volume
            .wait_for_volume(&session, &volume.id, &pending)
            .await?;
        Ok(())
    }

    /// Guarded power transition from `source` to `target`
    async fn transition(
        &self,
        ctx: &mut TenantContext,
        instance: &InstanceDescriptor,
        action: ServerAction,
        source: &str,
        target: &str,
    ) -> Result<()> {
        let session = self.session_for(ctx, instance).await?;
        let server = self
            .require_server(&session, &ctx.project_id, instance)
            .await?;

        if action != ServerAction::Reboot && server.status.eq_ignore_ascii_case(target) {
            tracing::debug!(remote_id = %server.id, "Instance already {}", target);
            return Ok(());
        }
        if !server.status.eq_ignore_ascii_case(source) {
            return Err(CloudError::invalid_state(
                format!("instance {}", server.id),
                server.status,
                source,
            ));
        }

        tracing::info!(instance = %instance.uuid, remote_id = %server.id, "Issuing {}", action);
        self.cloud
            .compute
            .server_action(&session, &server.id, action)
            .await?;

        let resource = format!("instance {}", server.id);
        let policy = self.settings.power_policy.clone();
        let pending = if action == ServerAction::Reboot {
            // ACTIVE right after the request may predate the reboot
            let leaving = PendingOperation::until_status(resource, REBOOT_STATES, policy)
                .failing_on(SERVER_FAILURE_STATES);
            self.cloud
                .compute
                .wait_for_server(&session, &server.id, &leaving)
                .await?;
            leaving.then_status(&[target])
        } else {
            PendingOperation::until_status(resource, &[target], policy)
                .failing_on(SERVER_FAILURE_STATES)
        };
        self.cloud
            .compute
            .wait_for_server(&session, &server.id, &pending)
            .await?;
        Ok(())
    }

    pub async fn power_on(&self, ctx: &mut TenantContext, instance: &InstanceDescriptor) -> Result<()> {
        self.transition(ctx, instance, ServerAction::Start, "SHUTOFF", "ACTIVE")
            .await
    }

    pub async fn power_off(&self, ctx: &mut TenantContext, instance: &InstanceDescriptor) -> Result<()> {
        self.transition(ctx, instance, ServerAction::Stop, "ACTIVE", "SHUTOFF")
            .await
    }

    /// Soft reboot from ACTIVE, waiting to see the reboot and then ACTIVE again
    pub async fn reboot(&self, ctx: &mut TenantContext, instance: &InstanceDescriptor) -> Result<()> {
        self.transition(ctx, instance, ServerAction::Reboot, "ACTIVE", "ACTIVE")
            .await
    }

    /// Local power state of the remote counterpart; absence is `NoState`
    pub async fn inspect(
        &self,
        ctx: &mut TenantContext,
        instance: &InstanceDescriptor,
    ) -> Result<PowerState> {
        let session = self.session_for(ctx, instance).await?;
        Ok(self
            .find_server(&session, &ctx.project_id, instance)
            .await?
            .map(|server| PowerState::from_remote(server.power_state))
            .unwrap_or(PowerState::NoState))
    }

    /// Remote ids of every instance visible to the tenant
    pub async fn list_instances(&self, ctx: &mut TenantContext) -> Result<Vec<String>> {
        let session = self.broker.get_session(ctx).await?;
        let servers = self.cloud.compute.list_servers(&session).await?;
        Ok(servers.into_iter().map(|s| s.id).collect())
    }

    /// Static inventory for `node`
    pub fn get_available_resource(&self, node: &str) -> CapacitySnapshot {
        CapacitySnapshot {
            hypervisor_hostname: node.to_string(),
            hypervisor_type: self.settings.hypervisor_type.clone(),
            vcpus: self.settings.vcpus,
            memory_mb: self.settings.memory_mb,
            local_gb: self.settings.local_gb,
            vcpus_used: 0,
            memory_mb_used: 0,
            local_gb_used: 0,
        }
    }
}

// ============ Remote lookups ============

async fn fetch_server(
    compute: &dyn ComputeService,
    session: &Session,
    remote_id: String,
) -> Result<Option<RemoteServer>> {
    optional(compute.get_server(session, &remote_id).await)
}

/// Display name tagged with the local UUID first, then the full remote name
async fn search_server(
    compute: &dyn ComputeService,
    session: &Session,
    key: &NamingKey,
) -> Result<Option<RemoteServer>> {
    if !key.display_name().is_empty() {
        let tagged = compute
            .find_servers_by_name(session, key.display_name())
            .await?
            .into_iter()
            .find(|s| {
                s.metadata.get(LOCAL_UUID_METADATA_KEY).map(String::as_str)
                    == Some(key.local_uuid())
            });
        if tagged.is_some() {
            return Ok(tagged);
        }
    }

    Ok(compute
        .find_servers_by_name(session, &key.remote_name())
        .await?
        .into_iter()
        .next())
}

async fn fetch_volume(
    volumes: &dyn VolumeService,
    session: &Session,
    remote_id: String,
) -> Result<Option<RemoteVolume>> {
    optional(volumes.get_volume(session, &remote_id).await)
}

/// A unique display-name match first, then the full remote name
async fn search_volume(
    volumes: &dyn VolumeService,
    session: &Session,
    key: &NamingKey,
) -> Result<Option<RemoteVolume>> {
    if !key.display_name().is_empty() {
        let mut matches = volumes
            .find_volumes_by_name(session, key.display_name())
            .await?;
        if matches.len() == 1 {
            return Ok(matches.pop());
        }
    }

    Ok(volumes
        .find_volumes_by_name(session, &key.remote_name())
        .await?
        .into_iter()
        .next())
}

async fn fetch_image(
    images: &dyn ImageService,
    session: &Session,
    remote_id: String,
) -> Result<Option<RemoteImage>> {
    optional(images.get_image(session, &remote_id).await)
}

async fn search_image(
    images: &dyn ImageService,
    session: &Session,
    name: Option<&str>,
) -> Result<Option<RemoteImage>> {
    let Some(name) = name else {
        return Ok(None);
    };
    Ok(images.find_images_by_name(session, name).await?.into_iter().next())
}

async fn fetch_flavor(
    compute: &dyn ComputeService,
    session: &Session,
    remote_id: String,
) -> Result<Option<RemoteFlavor>> {
    optional(compute.get_flavor(session, &remote_id).await)
}

async fn search_flavor(
    compute: &dyn ComputeService,
    session: &Session,
    name: Option<&str>,
) -> Result<Option<RemoteFlavor>> {
    match name {
        Some(name) => compute.find_flavor_by_name(session, name).await,
        None => Ok(None),
    }
}
