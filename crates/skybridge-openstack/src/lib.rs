//! Provider-cloud adapters for Skybridge
//!
//! Implements the four remote service traits of `skybridge-cloud` over the
//! provider's generic control-plane REST APIs using `reqwest`. Every failure
//! is translated into `CloudError` here.
//!
//! # Example
//!
//! ```ignore
//! use skybridge_openstack::{IdentityEndpoints, OpenStackCloud};
//!
//! let cloud = OpenStackCloud::builder(IdentityEndpoints::new(
//!     "https://keystone.example.com:5000/v2.0",
//!     "https://keystone.example.com:5000/v3",
//! ))
//! .request_timeout(std::time::Duration::from_secs(30))
//! .build()?;
//!
//! let servers = cloud.compute.list_servers(&session).await?;
//! ```

pub mod compute;
mod error;
pub mod http;
pub mod identity;
pub mod image;
pub mod volume;

pub use compute::ComputeClient;
pub use http::ApiClient;
pub use identity::{IdentityClient, IdentityEndpoints};
pub use image::ImageClient;
pub use volume::VolumeClient;

use skybridge_cloud::{RemoteCloud, Result};
use std::sync::Arc;
use std::time::Duration;

/// Builder wiring all four adapters onto one HTTP client
pub struct OpenStackCloud {
    endpoints: IdentityEndpoints,
    request_timeout: Duration,
}

impl OpenStackCloud {
    pub fn builder(endpoints: IdentityEndpoints) -> Self {
        Self {
            endpoints,
            request_timeout: Duration::from_secs(60),
        }
    }

    pub fn user_domain(mut self, domain: impl Into<String>) -> Self {
        self.endpoints.user_domain = domain.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<RemoteCloud> {
        let api = ApiClient::new(self.request_timeout)?;
        Ok(RemoteCloud {
            identity: Arc::new(IdentityClient::new(api.clone(), self.endpoints)),
            compute: Arc::new(ComputeClient::new(api.clone())),
            volume: Arc::new(VolumeClient::new(api.clone())),
            image: Arc::new(ImageClient::new(api)),
        })
    }
}
