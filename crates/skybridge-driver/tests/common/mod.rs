//! In-memory remote cloud for driver tests
//!
//! Every trait call is counted, so tests can assert that a guard refused a
//! transition without touching the remote side. Resources advance through
//! scripted statuses, one step per status read.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use skybridge_cloud::{
    CloudError, ComputeService, CreateServerRequest, DelegatedScope, IdentityService,
    IdentitySession, ImageService, InstanceDescriptor, LOCAL_UUID_METADATA_KEY,
    MemoryMappingStore, PollPolicy, RemoteCloud, RemoteFlavor, RemoteImage, RemoteServer,
    RemoteVolume, Result, RetryConfig, ServerAction, ServiceUserRequest, Session, TenantContext,
    TrustRequest, VolumeAttachment, VolumeService,
};
use skybridge_driver::{
    CredentialBroker, DriverSettings, PortBinder, ProxyDriver, ResourceMapper, ServiceIdentity,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted status read
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Status(&'static str),
    Gone,
}

/// Scripted outcome of a `delete_user` call
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeleteOutcome {
    Transient,
    Missing,
    Denied,
}

struct FakeServer {
    server: RemoteServer,
    script: VecDeque<Step>,
}

struct FakeVolume {
    volume: RemoteVolume,
    script: VecDeque<Step>,
}

struct State {
    servers: HashMap<String, FakeServer>,
    volumes: HashMap<String, FakeVolume>,
    images: Vec<RemoteImage>,
    flavors: Vec<RemoteFlavor>,
    calls: HashMap<&'static str, usize>,
    created: Vec<CreateServerRequest>,
    actions: Vec<(String, ServerAction)>,
    auth_requests: Vec<IdentitySession>,
    trusts: Vec<TrustRequest>,
    delete_outcomes: VecDeque<DeleteOutcome>,
    next_id: u32,
    next_token: u32,
    create_script: Vec<Step>,
    attach_script: Vec<Step>,
    frozen: bool,
    trust_scoping: bool,
    token_ttl: ChronoDuration,
}

pub struct FakeCloud {
    state: Mutex<State>,
}

fn power_code(status: &str) -> Option<i64> {
    match status {
        "ACTIVE" => Some(1),
        "PAUSED" => Some(3),
        "SHUTOFF" => Some(4),
        "SUSPENDED" => Some(7),
        _ => None,
    }
}

impl FakeCloud {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                servers: HashMap::new(),
                volumes: HashMap::new(),
                images: Vec::new(),
                flavors: Vec::new(),
                calls: HashMap::new(),
                created: Vec::new(),
                actions: Vec::new(),
                auth_requests: Vec::new(),
                trusts: Vec::new(),
                delete_outcomes: VecDeque::new(),
                next_id: 1,
                next_token: 1,
                create_script: vec![Step::Status("ACTIVE")],
                attach_script: vec![Step::Status("attaching"), Step::Status("in-use")],
                frozen: false,
                trust_scoping: true,
                token_ttl: ChronoDuration::hours(1),
            }),
        })
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn count(&self, call: &'static str) {
        *self.state().calls.entry(call).or_insert(0) += 1;
    }

    // ============ Setup ============

    pub fn add_server(&self, id: &str, name: &str, status: &'static str, local_uuid: Option<&str>) {
        let mut metadata = HashMap::new();
        if let Some(uuid) = local_uuid {
            metadata.insert(LOCAL_UUID_METADATA_KEY.to_string(), uuid.to_string());
        }
        self.state().servers.insert(
            id.to_string(),
            FakeServer {
                server: RemoteServer {
                    id: id.to_string(),
                    name: name.to_string(),
                    status: status.to_string(),
                    power_state: power_code(status),
                    metadata,
                },
                script: VecDeque::new(),
            },
        );
    }

    pub fn add_volume(&self, id: &str, name: &str, status: &str) {
        self.state().volumes.insert(
            id.to_string(),
            FakeVolume {
                volume: RemoteVolume {
                    id: id.to_string(),
                    name: Some(name.to_string()),
                    status: status.to_string(),
                    size: Some(10),
                    attachments: Vec::new(),
                },
                script: VecDeque::new(),
            },
        );
    }

    pub fn attach_existing(&self, volume_id: &str, server_id: &str) {
        if let Some(volume) = self.state().volumes.get_mut(volume_id) {
            volume.volume.status = "in-use".to_string();
            volume.volume.attachments.push(VolumeAttachment {
                attachment_id: Some(format!("att-{}", volume_id)),
                volume_id: volume_id.to_string(),
                server_id: server_id.to_string(),
                device: Some("/dev/vdb".to_string()),
            });
        }
    }

    pub fn add_image(&self, id: &str, name: &str) {
        self.state().images.push(RemoteImage {
            id: id.to_string(),
            name: Some(name.to_string()),
            status: "active".to_string(),
        });
    }

    pub fn add_flavor(&self, id: &str, name: &str) {
        self.state().flavors.push(RemoteFlavor {
            id: id.to_string(),
            name: name.to_string(),
            vcpus: Some(2),
            ram: Some(4096),
            disk: Some(40),
        });
    }

    /// Statuses a freshly created server walks through
    pub fn set_create_script(&self, script: Vec<Step>) {
        self.state().create_script = script;
    }

    /// Statuses a volume walks through after an attach request
    pub fn set_attach_script(&self, script: Vec<Step>) {
        self.state().attach_script = script;
    }

    /// Actions, deletes and attachments no longer make progress
    pub fn freeze(&self) {
        self.state().frozen = true;
    }

    pub fn set_trust_scoping(&self, enabled: bool) {
        self.state().trust_scoping = enabled;
    }

    pub fn set_token_ttl(&self, ttl: ChronoDuration) {
        self.state().token_ttl = ttl;
    }

    pub fn script_delete_user(&self, outcomes: &[DeleteOutcome]) {
        self.state().delete_outcomes = outcomes.iter().copied().collect();
    }

    // ============ Inspection ============

    pub fn calls(&self, call: &str) -> usize {
        self.state().calls.get(call).copied().unwrap_or(0)
    }

    /// Calls that change remote state
    pub fn mutations(&self) -> usize {
        [
            "create_server",
            "delete_server",
            "server_action",
            "attach_volume",
            "detach_volume",
        ]
        .iter()
        .map(|c| self.calls(c))
        .sum()
    }

    pub fn created(&self) -> Vec<CreateServerRequest> {
        self.state().created.clone()
    }

    pub fn actions(&self) -> Vec<(String, ServerAction)> {
        self.state().actions.clone()
    }

    pub fn auth_requests(&self) -> Vec<IdentitySession> {
        self.state().auth_requests.clone()
    }

    pub fn trusts(&self) -> Vec<TrustRequest> {
        self.state().trusts.clone()
    }

    pub fn server_status(&self, id: &str) -> Option<String> {
        self.state().servers.get(id).map(|s| s.server.status.clone())
    }

    pub fn volume_status(&self, id: &str) -> Option<String> {
        self.state().volumes.get(id).map(|v| v.volume.status.clone())
    }

    pub fn has_server(&self, id: &str) -> bool {
        self.state().servers.contains_key(id)
    }
}

impl State {
    fn advance_server(&mut self, id: &str) -> Result<RemoteServer> {
        let Some(entry) = self.servers.get_mut(id) else {
            return Err(CloudError::not_found("server", id));
        };
        match entry.script.pop_front() {
            Some(Step::Gone) => {
                self.servers.remove(id);
                return Err(CloudError::not_found("server", id));
            }
            Some(Step::Status(status)) => {
                entry.server.status = status.to_string();
                entry.server.power_state = power_code(status);
            }
            None => {}
        }
        Ok(entry.server.clone())
    }

    fn advance_volume(&mut self, id: &str) -> Result<RemoteVolume> {
        let Some(entry) = self.volumes.get_mut(id) else {
            return Err(CloudError::not_found("volume", id));
        };
        match entry.script.pop_front() {
            Some(Step::Gone) => {
                self.volumes.remove(id);
                return Err(CloudError::not_found("volume", id));
            }
            Some(Step::Status(status)) => entry.volume.status = status.to_string(),
            None => {}
        }
        Ok(entry.volume.clone())
    }

    fn script(&self, steps: &[Step]) -> VecDeque<Step> {
        if self.frozen {
            VecDeque::new()
        } else {
            steps.iter().cloned().collect()
        }
    }
}

#[async_trait]
impl IdentityService for FakeCloud {
    async fn authenticate(&self, request: &IdentitySession) -> Result<Session> {
        self.count("authenticate");
        let mut state = self.state();
        state.auth_requests.push(request.clone());

        let token = format!("tok-{}", state.next_token);
        state.next_token += 1;

        let (project_id, trust_id) = match request {
            IdentitySession::BasicAuth { project_id, .. } => (project_id.clone(), None),
            IdentitySession::DelegatedAuth {
                scope: DelegatedScope::Project(project_id),
                ..
            } => (project_id.clone(), None),
            IdentitySession::DelegatedAuth {
                scope: DelegatedScope::Trust(trust_id),
                ..
            } => (
                "p1".to_string(),
                state.trust_scoping.then(|| trust_id.clone()),
            ),
        };

        Ok(Session {
            token,
            expires_at: Utc::now() + state.token_ttl,
            project_id,
            user_id: Some("user-1".to_string()),
            endpoints: HashMap::new(),
            impersonated_user_id: trust_id.as_ref().map(|_| "user-1".to_string()),
            trust_id,
        })
    }

    async fn create_trust(&self, _session: &Session, trust: &TrustRequest) -> Result<String> {
        self.count("create_trust");
        let mut state = self.state();
        state.trusts.push(trust.clone());
        Ok(format!("trust-{}", state.trusts.len()))
    }

    async fn delete_trust(&self, _session: &Session, trust_id: &str) -> Result<()> {
        self.count("delete_trust");
        let state = self.state();
        let known = (1..=state.trusts.len()).any(|n| format!("trust-{}", n) == trust_id);
        if known {
            Ok(())
        } else {
            Err(CloudError::not_found("trust", trust_id))
        }
    }

    async fn create_user(&self, _session: &Session, user: &ServiceUserRequest) -> Result<String> {
        self.count("create_user");
        Ok(format!("user-{}", user.name))
    }

    async fn delete_user(&self, _session: &Session, user_id: &str) -> Result<()> {
        self.count("delete_user");
        match self.state().delete_outcomes.pop_front() {
            None => Ok(()),
            Some(DeleteOutcome::Transient) => Err(CloudError::TransientRemoteFailure(
                "identity service unavailable".into(),
            )),
            Some(DeleteOutcome::Missing) => Err(CloudError::not_found("user", user_id)),
            Some(DeleteOutcome::Denied) => Err(CloudError::Authorization("forbidden".into())),
        }
    }
}

#[async_trait]
impl ComputeService for FakeCloud {
    async fn create_server(
        &self,
        _session: &Session,
        request: &CreateServerRequest,
    ) -> Result<RemoteServer> {
        self.count("create_server");
        let mut state = self.state();
        let id = format!("r{}", state.next_id);
        state.next_id += 1;

        let server = RemoteServer {
            id: id.clone(),
            name: request.name.clone(),
            status: "BUILD".to_string(),
            power_state: None,
            metadata: request.metadata.clone(),
        };
        let script = state.create_script.iter().cloned().collect();
        state.servers.insert(
            id,
            FakeServer {
                server: server.clone(),
                script,
            },
        );
        state.created.push(request.clone());
        Ok(server)
    }

    async fn get_server(&self, _session: &Session, server_id: &str) -> Result<RemoteServer> {
        self.count("get_server");
        self.state().advance_server(server_id)
    }

    async fn find_servers_by_name(
        &self,
        _session: &Session,
        name: &str,
    ) -> Result<Vec<RemoteServer>> {
        self.count("find_servers_by_name");
        Ok(self
            .state()
            .servers
            .values()
            .filter(|s| s.server.name == name)
            .map(|s| s.server.clone())
            .collect())
    }

    async fn list_servers(&self, _session: &Session) -> Result<Vec<RemoteServer>> {
        self.count("list_servers");
        let mut servers: Vec<RemoteServer> = self
            .state()
            .servers
            .values()
            .map(|s| s.server.clone())
            .collect();
        servers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(servers)
    }

    async fn delete_server(&self, _session: &Session, server_id: &str) -> Result<()> {
        self.count("delete_server");
        let mut state = self.state();
        let script = state.script(&[Step::Status("DELETING"), Step::Gone]);
        match state.servers.get_mut(server_id) {
            Some(entry) => {
                entry.script = script;
                Ok(())
            }
            None => Err(CloudError::not_found("server", server_id)),
        }
    }

    async fn server_action(
        &self,
        _session: &Session,
        server_id: &str,
        action: ServerAction,
    ) -> Result<()> {
        self.count("server_action");
        let mut state = self.state();
        state.actions.push((server_id.to_string(), action));
        let steps = match action {
            ServerAction::Start => vec![Step::Status("ACTIVE")],
            ServerAction::Stop => vec![Step::Status("SHUTOFF")],
            ServerAction::Reboot => vec![Step::Status("REBOOT"), Step::Status("ACTIVE")],
        };
        let script = state.script(&steps);
        match state.servers.get_mut(server_id) {
            Some(entry) => {
                entry.script = script;
                Ok(())
            }
            None => Err(CloudError::not_found("server", server_id)),
        }
    }

    async fn attach_volume(
        &self,
        _session: &Session,
        server_id: &str,
        volume_id: &str,
        device: Option<&str>,
    ) -> Result<()> {
        self.count("attach_volume");
        let mut state = self.state();
        let steps = state.attach_script.clone();
        let script = state.script(&steps);
        let frozen = state.frozen;
        let Some(entry) = state.volumes.get_mut(volume_id) else {
            return Err(CloudError::not_found("volume", volume_id));
        };
        if !frozen {
            entry.volume.attachments.push(VolumeAttachment {
                attachment_id: Some(format!("att-{}", volume_id)),
                volume_id: volume_id.to_string(),
                server_id: server_id.to_string(),
                device: device.map(str::to_string),
            });
        }
        entry.script = script;
        Ok(())
    }

    async fn detach_volume(
        &self,
        _session: &Session,
        _server_id: &str,
        attachment_id: &str,
    ) -> Result<()> {
        self.count("detach_volume");
        let mut state = self.state();
        let script = state.script(&[Step::Status("detaching"), Step::Status("available")]);
        let Some(entry) = state.volumes.get_mut(attachment_id) else {
            return Err(CloudError::not_found("volume attachment", attachment_id));
        };
        entry.volume.attachments.retain(|a| a.volume_id != attachment_id);
        entry.script = script;
        Ok(())
    }

    async fn get_flavor(&self, _session: &Session, flavor_id: &str) -> Result<RemoteFlavor> {
        self.count("get_flavor");
        self.state()
            .flavors
            .iter()
            .find(|f| f.id == flavor_id)
            .cloned()
            .ok_or_else(|| CloudError::not_found("flavor", flavor_id))
    }

    async fn find_flavor_by_name(
        &self,
        _session: &Session,
        name: &str,
    ) -> Result<Option<RemoteFlavor>> {
        self.count("find_flavor_by_name");
        Ok(self.state().flavors.iter().find(|f| f.name == name).cloned())
    }
}

#[async_trait]
impl VolumeService for FakeCloud {
    async fn create_volume(
        &self,
        _session: &Session,
        name: &str,
        size_gb: u32,
    ) -> Result<RemoteVolume> {
        self.count("create_volume");
        let mut state = self.state();
        let id = format!("rv{}", state.next_id);
        state.next_id += 1;

        let volume = RemoteVolume {
            id: id.clone(),
            name: Some(name.to_string()),
            status: "creating".to_string(),
            size: Some(size_gb),
            attachments: Vec::new(),
        };
        state.volumes.insert(
            id,
            FakeVolume {
                volume: volume.clone(),
                script: [Step::Status("available")].into_iter().collect(),
            },
        );
        Ok(volume)
    }

    async fn get_volume(&self, _session: &Session, volume_id: &str) -> Result<RemoteVolume> {
        self.count("get_volume");
        self.state().advance_volume(volume_id)
    }

    async fn find_volumes_by_name(
        &self,
        _session: &Session,
        name: &str,
    ) -> Result<Vec<RemoteVolume>> {
        self.count("find_volumes_by_name");
        Ok(self
            .state()
            .volumes
            .values()
            .filter(|v| v.volume.name.as_deref() == Some(name))
            .map(|v| v.volume.clone())
            .collect())
    }

    async fn list_volumes(&self, _session: &Session) -> Result<Vec<RemoteVolume>> {
        self.count("list_volumes");
        Ok(self
            .state()
            .volumes
            .values()
            .map(|v| v.volume.clone())
            .collect())
    }

    async fn delete_volume(&self, _session: &Session, volume_id: &str) -> Result<()> {
        self.count("delete_volume");
        self.state()
            .volumes
            .remove(volume_id)
            .map(|_| ())
            .ok_or_else(|| CloudError::not_found("volume", volume_id))
    }
}

#[async_trait]
impl ImageService for FakeCloud {
    async fn get_image(&self, _session: &Session, image_id: &str) -> Result<RemoteImage> {
        self.count("get_image");
        self.state()
            .images
            .iter()
            .find(|i| i.id == image_id)
            .cloned()
            .ok_or_else(|| CloudError::not_found("image", image_id))
    }

    async fn find_images_by_name(&self, _session: &Session, name: &str) -> Result<Vec<RemoteImage>> {
        self.count("find_images_by_name");
        Ok(self
            .state()
            .images
            .iter()
            .filter(|i| i.name.as_deref() == Some(name))
            .cloned()
            .collect())
    }

    async fn list_images(&self, _session: &Session) -> Result<Vec<RemoteImage>> {
        self.count("list_images");
        Ok(self.state().images.clone())
    }

    async fn delete_image(&self, _session: &Session, image_id: &str) -> Result<()> {
        self.count("delete_image");
        let mut state = self.state();
        let before = state.images.len();
        state.images.retain(|i| i.id != image_id);
        if state.images.len() == before {
            Err(CloudError::not_found("image", image_id))
        } else {
            Ok(())
        }
    }
}

/// Records every port binding
#[derive(Default)]
pub struct RecordingPortBinder {
    bindings: Mutex<Vec<(String, String)>>,
}

impl RecordingPortBinder {
    pub fn bindings(&self) -> Vec<(String, String)> {
        self.bindings.lock().unwrap().clone()
    }
}

#[async_trait]
impl PortBinder for RecordingPortBinder {
    async fn bind_port(&self, port_id: &str, host_id: &str) -> Result<()> {
        self.bindings
            .lock()
            .unwrap()
            .push((port_id.to_string(), host_id.to_string()));
        Ok(())
    }
}

// ============ Harness ============

/// The four adapters, all backed by one fake
pub fn remote(cloud: &Arc<FakeCloud>) -> RemoteCloud {
    RemoteCloud {
        identity: cloud.clone(),
        compute: cloud.clone(),
        volume: cloud.clone(),
        image: cloud.clone(),
    }
}

pub fn test_settings() -> DriverSettings {
    DriverSettings {
        network_ids: vec!["net-provider".to_string()],
        availability_zone: Some("az-1".to_string()),
        ..DriverSettings::default()
    }
    .with_poll_policy(PollPolicy::fixed(
        Duration::from_secs(1),
        Duration::from_secs(30),
    ))
}

pub fn test_broker(cloud: &Arc<FakeCloud>) -> CredentialBroker {
    CredentialBroker::new(cloud.clone())
        .with_service_identity(ServiceIdentity {
            username: "skybridge".to_string(),
            password: "service-secret".to_string(),
            project_id: "service".to_string(),
        })
        .with_delete_retry(RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            deadline: Duration::from_secs(60),
        })
}

pub struct Harness {
    pub cloud: Arc<FakeCloud>,
    pub store: Arc<MemoryMappingStore>,
    pub driver: ProxyDriver,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(test_settings())
    }

    pub fn with_settings(settings: DriverSettings) -> Self {
        let cloud = FakeCloud::new();
        let store = Arc::new(MemoryMappingStore::new());
        let driver = ProxyDriver::new(
            Arc::new(test_broker(&cloud)),
            ResourceMapper::new(store.clone()),
            remote(&cloud),
            settings,
        );
        Self {
            cloud,
            store,
            driver,
        }
    }

    pub fn with_port_binder(mut self, binder: Arc<RecordingPortBinder>) -> Self {
        self.driver = self.driver.with_port_binder(binder);
        self
    }

    pub async fn map(&self, local_id: &str, kind: skybridge_cloud::ResourceKind, remote_id: &str) {
        self.driver
            .mapper()
            .record(local_id, "p1", kind, remote_id)
            .await
            .unwrap();
    }
}

pub fn tenant() -> TenantContext {
    TenantContext::new("p1").with_token("user-token")
}

/// Local instance `web1` with UUID `u1` in project `p1`
pub fn web1() -> InstanceDescriptor {
    InstanceDescriptor {
        uuid: "u1".to_string(),
        display_name: "web1".to_string(),
        project_id: "p1".to_string(),
        flavor_id: "f1".to_string(),
        flavor_name: Some("m1.small".to_string()),
        ..Default::default()
    }
}
