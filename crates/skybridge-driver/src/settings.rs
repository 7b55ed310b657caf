//! Static driver settings

use skybridge_cloud::PollPolicy;
use skybridge_config::BridgeConfig;
use std::collections::HashMap;

/// Provider-side values and poll policies the driver applies to every call
#[derive(Debug, Clone)]
pub struct DriverSettings {
    pub security_groups: Vec<String>,
    pub network_ids: Vec<String>,
    pub availability_zone: Option<String>,

    /// Remote image id used when the local image cannot be resolved
    pub default_base_image: Option<String>,
    pub bootstrap_metadata: HashMap<String, String>,

    pub spawn_policy: PollPolicy,
    pub destroy_policy: PollPolicy,
    pub volume_policy: PollPolicy,
    pub power_policy: PollPolicy,

    pub vcpus: u32,
    pub memory_mb: u64,
    pub local_gb: u64,
    pub hypervisor_type: String,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            security_groups: vec!["default".to_string()],
            network_ids: Vec::new(),
            availability_zone: None,
            default_base_image: None,
            bootstrap_metadata: HashMap::new(),
            spawn_policy: PollPolicy::default(),
            destroy_policy: PollPolicy::default().with_timeout(std::time::Duration::from_secs(600)),
            volume_policy: PollPolicy::default(),
            power_policy: PollPolicy::default(),
            vcpus: 0,
            memory_mb: 0,
            local_gb: 0,
            hypervisor_type: "hybrid".to_string(),
        }
    }
}

impl DriverSettings {
    pub fn from_config(config: &BridgeConfig) -> Self {
        let zone = config.placement.availability_zone.trim();
        Self {
            security_groups: config.placement.security_groups.clone(),
            network_ids: config.placement.network_ids.clone(),
            availability_zone: (!zone.is_empty()).then(|| zone.to_string()),
            default_base_image: config.spawn.default_base_image.clone(),
            bootstrap_metadata: config.spawn.bootstrap_metadata.clone(),
            spawn_policy: config.timeouts.spawn_policy(),
            destroy_policy: config.timeouts.destroy_policy(),
            volume_policy: config.timeouts.volume_policy(),
            power_policy: config.timeouts.power_policy(),
            vcpus: config.capacity.vcpus,
            memory_mb: config.capacity.memory_mb,
            local_gb: config.capacity.local_gb,
            hypervisor_type: config.capacity.hypervisor_type.clone(),
        }
    }

    /// Same poll policy for every operation
    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.spawn_policy = policy.clone();
        self.destroy_policy = policy.clone();
        self.volume_policy = policy.clone();
        self.power_policy = policy;
        self
    }
}
