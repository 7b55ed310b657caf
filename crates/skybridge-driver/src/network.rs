//! Network-binding seam
//!
//! Port binding belongs to the local networking service. Spawn calls it
//! twice: once against the local host before the remote create, once
//! against the remote instance id after it.

use async_trait::async_trait;
use skybridge_cloud::Result;

#[async_trait]
pub trait PortBinder: Send + Sync {
    async fn bind_port(&self, port_id: &str, host_id: &str) -> Result<()>;
}

/// Binder for deployments without a local networking service
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingPortBinder;

#[async_trait]
impl PortBinder for LoggingPortBinder {
    async fn bind_port(&self, port_id: &str, host_id: &str) -> Result<()> {
        tracing::debug!(port = port_id, host = host_id, "Port binding requested");
        Ok(())
    }
}
