pub mod discovery;
pub mod discovery_service;
pub mod registry;

pub use discovery::{DiscoveryCache, DiscoveryError, InstanceList, WatchConfig};
pub use discovery_service::DiscoveryService;
pub use registry::{ConsulGateway, Instance, Registration, RegistryError, RegistryGateway};
