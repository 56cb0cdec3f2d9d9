//! Registry gateway module
//!
//! Thin operations against the external service registry:
//! - `types`: instance, health and notification records
//! - `error`: registry error type
//! - `gateway`: the `RegistryGateway` trait
//! - `consul`: HTTP implementation against a Consul agent

pub mod consul;
pub mod error;
pub mod gateway;
pub mod types;

pub use consul::{ConsulConfig, ConsulGateway};
pub use error::RegistryError;
pub use gateway::RegistryGateway;
pub use types::{
    HealthCheck, HealthStatus, Instance, Notification, Registration, ServiceEntry, WatchStream,
};
