use crate::TenantArgs;
use anyhow::Context;
use serde::de::DeserializeOwned;
use skybridge_cloud::{FileMappingStore, MappingStore, MemoryMappingStore, TenantContext};
use skybridge_config::BridgeConfig;
use skybridge_driver::ProxyDriver;
use skybridge_openstack::{IdentityEndpoints, OpenStackCloud};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Explicit `--config` path, or the discovered skybridge.yaml
pub fn load_config(path: Option<&Path>) -> anyhow::Result<BridgeConfig> {
    match path {
        Some(path) => skybridge_config::load_config(path)
            .with_context(|| format!("failed to load {}", path.display())),
        None => skybridge_config::load().context("no usable skybridge.yaml found"),
    }
}

pub fn build_driver(config: &BridgeConfig) -> anyhow::Result<ProxyDriver> {
    let cloud = OpenStackCloud::builder(IdentityEndpoints::new(
        &config.identity.v2_url,
        &config.identity.v3_url,
    ))
    .user_domain(&config.identity.user_domain)
    .request_timeout(Duration::from_secs(config.identity.request_timeout_secs))
    .build()
    .context("failed to build remote cloud client")?;

    let store: Arc<dyn MappingStore> = match &config.mapping_store {
        Some(root) => {
            tracing::debug!("Using mapping state under {}", root.display());
            Arc::new(FileMappingStore::new(root))
        }
        None => Arc::new(MemoryMappingStore::new()),
    };

    Ok(ProxyDriver::from_config(config, cloud, store))
}

pub fn tenant_context(args: &TenantArgs) -> anyhow::Result<TenantContext> {
    let project_id = args
        .project_id
        .clone()
        .context("tenant project required: pass --project or set OS_PROJECT_ID")?;

    Ok(TenantContext {
        project_id,
        user_id: args.user_id.clone(),
        auth_token: args.token.clone(),
        username: args.username.clone(),
        password: args.password.clone(),
        trust_id: args.trust_id.clone(),
    })
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid JSON in {}", path.display()))
}
