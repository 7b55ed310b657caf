//! Skybridge shared abstractions
//!
//! Types every layer of the hybrid-cloud resource proxy agrees on: the error
//! taxonomy, local resource descriptors, remote sessions, the four remote
//! service traits, the bounded poller and the mapping persistence interface.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │            local orchestrator (compute)          │
//! └─────────────────┬───────────────────────────────┘
//!                   │ spawn / destroy / attach / power
//! ┌─────────────────▼───────────────────────────────┐
//! │                skybridge-driver                  │
//! │  ┌────────────┐ ┌──────────────┐ ┌───────────┐  │
//! │  │ Credential │ │   Resource   │ │  Driver   │  │
//! │  │   Broker   │ │    Mapper    │ │   State   │  │
//! │  └────────────┘ └──────────────┘ └───────────┘  │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼────────────────────────┐
//! │ MappingStore  │ │ skybridge-openstack adapters   │
//! │ (this crate)  │ │ identity/compute/volume/image  │
//! └───────────────┘ └────────────────────────────────┘
//! ```

pub mod error;
pub mod mapping;
pub mod model;
pub mod poll;
pub mod retry;
pub mod service;
pub mod session;
pub mod state;

// Re-exports
pub use error::{CloudError, Result};
pub use mapping::{MappingKey, MappingStore, MemoryMappingStore, ResourceKind, ResourceMapping};
pub use model::{
    BlockDeviceDescriptor, CapacitySnapshot, ImageDescriptor, InjectedFile, InstanceDescriptor,
    LOCAL_UUID_METADATA_KEY, NamingKey, PowerState, VolumeConnectionInfo,
};
pub use poll::{Observation, PendingOperation, PollPolicy};
pub use retry::{RetryConfig, retry_transient};
pub use service::{
    BlockDeviceMapping, ComputeService, CreateServerRequest, IdentityService, ImageService,
    RemoteCloud, RemoteFlavor, RemoteImage, RemoteServer, RemoteVolume, ServerAction,
    ServiceUserRequest, TrustRequest, VolumeAttachment, VolumeService,
};
pub use session::{
    Credential, DelegatedScope, IdentitySession, ServiceType, Session, TenantContext,
};
pub use state::{FileMappingStore, MappingTable};
