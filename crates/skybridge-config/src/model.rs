//! Typed configuration sections
//!
//! Every optional field carries its default here, so a minimal file only
//! needs the two identity URLs.

use serde::{Deserialize, Serialize};
use skybridge_cloud::{PollPolicy, RetryConfig};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ConfigError, Result};

/// Root of `skybridge.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub identity: IdentityConfig,

    #[serde(default)]
    pub placement: PlacementConfig,

    #[serde(default)]
    pub spawn: SpawnConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    #[serde(default)]
    pub service_user_delete: ServiceUserDeleteConfig,

    #[serde(default)]
    pub capacity: CapacityConfig,

    /// Root of the JSON mapping state (`<root>/.skybridge/mappings.json`);
    /// mappings stay in memory when unset
    #[serde(default)]
    pub mapping_store: Option<PathBuf>,
}

/// Identity endpoints and the fixed service identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub v2_url: String,
    pub v3_url: String,

    #[serde(default)]
    pub service_user: Option<String>,

    #[serde(default)]
    pub service_password: Option<String>,

    #[serde(default)]
    pub service_project: Option<String>,

    #[serde(default = "default_user_domain")]
    pub user_domain: String,

    /// Sessions expiring within this margin are renegotiated
    #[serde(default = "default_expiry_margin")]
    pub token_expiry_margin_secs: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Provider-side placement applied to every spawned instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementConfig {
    #[serde(default = "default_security_groups")]
    pub security_groups: Vec<String>,

    #[serde(default)]
    pub network_ids: Vec<String>,

    #[serde(default = "default_availability_zone")]
    pub availability_zone: String,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            security_groups: default_security_groups(),
            network_ids: Vec::new(),
            availability_zone: default_availability_zone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpawnConfig {
    /// Remote image id used when the local image has no remote counterpart
    #[serde(default)]
    pub default_base_image: Option<String>,

    /// Merged into every instance's metadata (network agent bootstrap)
    #[serde(default)]
    pub bootstrap_metadata: HashMap<String, String>,
}

/// Poll deadlines and cadence, in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_spawn_timeout")]
    pub spawn: u64,

    #[serde(default = "default_destroy_timeout")]
    pub destroy: u64,

    #[serde(default = "default_volume_timeout")]
    pub volume: u64,

    #[serde(default = "default_power_timeout")]
    pub power: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    #[serde(default = "default_poll_max_interval")]
    pub poll_max_interval: u64,

    #[serde(default = "default_poll_backoff")]
    pub poll_backoff: f64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            spawn: default_spawn_timeout(),
            destroy: default_destroy_timeout(),
            volume: default_volume_timeout(),
            power: default_power_timeout(),
            poll_interval: default_poll_interval(),
            poll_max_interval: default_poll_max_interval(),
            poll_backoff: default_poll_backoff(),
        }
    }
}

impl TimeoutConfig {
    fn policy(&self, timeout_secs: u64) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(self.poll_interval),
            max_interval: Duration::from_secs(self.poll_max_interval),
            backoff: self.poll_backoff,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn spawn_policy(&self) -> PollPolicy {
        self.policy(self.spawn)
    }

    pub fn destroy_policy(&self) -> PollPolicy {
        self.policy(self.destroy)
    }

    pub fn volume_policy(&self) -> PollPolicy {
        self.policy(self.volume)
    }

    pub fn power_policy(&self) -> PollPolicy {
        self.policy(self.power)
    }
}

/// Bounded retry for deleting a service user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceUserDeleteConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
}

impl Default for ServiceUserDeleteConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            deadline_secs: default_deadline_secs(),
        }
    }
}

impl ServiceUserDeleteConfig {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
            deadline: Duration::from_secs(self.deadline_secs),
        }
    }
}

/// Static inventory reported for the proxied node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityConfig {
    #[serde(default)]
    pub vcpus: u32,

    #[serde(default)]
    pub memory_mb: u64,

    #[serde(default)]
    pub local_gb: u64,

    #[serde(default = "default_hypervisor_type")]
    pub hypervisor_type: String,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            vcpus: 0,
            memory_mb: 0,
            local_gb: 0,
            hypervisor_type: default_hypervisor_type(),
        }
    }
}

impl BridgeConfig {
    /// Minimal configuration for the given identity endpoints
    pub fn new(v2_url: impl Into<String>, v3_url: impl Into<String>) -> Self {
        Self {
            identity: IdentityConfig {
                v2_url: v2_url.into(),
                v3_url: v3_url.into(),
                service_user: None,
                service_password: None,
                service_project: None,
                user_domain: default_user_domain(),
                token_expiry_margin_secs: default_expiry_margin(),
                request_timeout_secs: default_request_timeout(),
            },
            placement: PlacementConfig::default(),
            spawn: SpawnConfig::default(),
            timeouts: TimeoutConfig::default(),
            service_user_delete: ServiceUserDeleteConfig::default(),
            capacity: CapacityConfig::default(),
            mapping_store: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.identity.v2_url.trim().is_empty() {
            return Err(ConfigError::Invalid("identity.v2_url is empty".into()));
        }
        if self.identity.v3_url.trim().is_empty() {
            return Err(ConfigError::Invalid("identity.v3_url is empty".into()));
        }

        let service_fields = [
            self.identity.service_user.is_some(),
            self.identity.service_password.is_some(),
            self.identity.service_project.is_some(),
        ];
        if service_fields.iter().any(|f| *f) && !service_fields.iter().all(|f| *f) {
            return Err(ConfigError::Invalid(
                "identity.service_user, service_password and service_project must be set together"
                    .into(),
            ));
        }

        let t = &self.timeouts;
        if t.poll_interval == 0 || t.poll_max_interval == 0 {
            return Err(ConfigError::Invalid("poll intervals must be non-zero".into()));
        }
        if t.poll_max_interval < t.poll_interval {
            return Err(ConfigError::Invalid(
                "timeouts.poll_max_interval is below poll_interval".into(),
            ));
        }
        if !t.poll_backoff.is_finite() || t.poll_backoff < 1.0 {
            return Err(ConfigError::Invalid("timeouts.poll_backoff must be >= 1.0".into()));
        }
        let waits = [t.spawn, t.destroy, t.volume, t.power];
        if waits.contains(&0) {
            return Err(ConfigError::Invalid("operation timeouts must be non-zero".into()));
        }
        if waits.iter().chain([&t.poll_max_interval]).any(|s| *s > MAX_WAIT_SECS) {
            return Err(ConfigError::Invalid(format!(
                "timeouts must not exceed {} seconds",
                MAX_WAIT_SECS
            )));
        }

        let d = &self.service_user_delete;
        if d.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "service_user_delete.max_attempts must be at least 1".into(),
            ));
        }
        if !d.backoff_multiplier.is_finite() || d.backoff_multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "service_user_delete.backoff_multiplier must be >= 1.0".into(),
            ));
        }
        if d.initial_delay_ms > d.max_delay_ms {
            return Err(ConfigError::Invalid(
                "service_user_delete.initial_delay_ms is above max_delay_ms".into(),
            ));
        }
        if d.deadline_secs > MAX_WAIT_SECS || d.max_delay_ms / 1000 > MAX_WAIT_SECS {
            return Err(ConfigError::Invalid(format!(
                "service_user_delete delays must not exceed {} seconds",
                MAX_WAIT_SECS
            )));
        }

        Ok(())
    }
}

/// Upper bound for any configured wait, in seconds (one week)
pub const MAX_WAIT_SECS: u64 = 7 * 24 * 3600;

fn default_user_domain() -> String {
    "default".to_string()
}

fn default_expiry_margin() -> u64 {
    60
}

fn default_request_timeout() -> u64 {
    60
}

fn default_security_groups() -> Vec<String> {
    vec!["default".to_string()]
}

fn default_availability_zone() -> String {
    "nova".to_string()
}

fn default_spawn_timeout() -> u64 {
    300
}

fn default_destroy_timeout() -> u64 {
    600
}

fn default_volume_timeout() -> u64 {
    300
}

fn default_power_timeout() -> u64 {
    300
}

fn default_poll_interval() -> u64 {
    2
}

fn default_poll_max_interval() -> u64 {
    10
}

fn default_poll_backoff() -> f64 {
    1.5
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_deadline_secs() -> u64 {
    60
}

fn default_hypervisor_type() -> String {
    "hybrid".to_string()
}
