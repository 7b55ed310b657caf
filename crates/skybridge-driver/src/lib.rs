//! Skybridge driver core
//!
//! The three layers that turn orchestrator requests into remote control-plane
//! calls:
//!
//! - [`CredentialBroker`]: per-project remote sessions and identity
//!   administration (trusts, service users)
//! - [`ResourceMapper`]: local id to remote id correlation with name-based
//!   fallback
//! - [`ProxyDriver`]: the lifecycle operations (spawn, destroy, volumes,
//!   power, inspect)

pub mod broker;
pub mod driver;
pub mod mapper;
pub mod network;
pub mod settings;

pub use broker::{CredentialBroker, ServiceIdentity};
pub use driver::ProxyDriver;
pub use mapper::{RemoteResource, ResourceMapper};
pub use network::{LoggingPortBinder, PortBinder};
pub use settings::DriverSettings;
