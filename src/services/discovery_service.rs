use std::collections::HashMap;
use std::sync::Arc;

use crate::services::discovery::{
    CacheStats, DiscoveryCache, DiscoveryError, InstanceList, WatchConfig,
};
use crate::services::registry::{RegistryGateway, Registration};

/// 服务注册与发现的对外入口
///
/// 组合注册中心网关与发现缓存，本身不持有额外状态。
#[derive(Debug)]
pub struct DiscoveryService<G: RegistryGateway> {
    gateway: Arc<G>,
    cache: DiscoveryCache<G>,
}

impl<G: RegistryGateway> DiscoveryService<G> {
    pub fn new(gateway: G, config: WatchConfig) -> Self {
        let gateway = Arc::new(gateway);
        Self {
            cache: DiscoveryCache::new(gateway.clone(), config),
            gateway,
        }
    }

    /// 注册服务实例，失败只记录日志并返回 false
    pub async fn register(
        &self,
        service_name: &str,
        instance_id: &str,
        health_check_path: &str,
        host: &str,
        port: u16,
        metadata: HashMap<String, String>,
    ) -> bool {
        let registration = Registration {
            service_name: service_name.to_string(),
            instance_id: instance_id.to_string(),
            health_check_path: health_check_path.to_string(),
            host: host.to_string(),
            port,
            metadata,
        };
        self.register_instance(&registration).await
    }

    pub async fn register_instance(&self, registration: &Registration) -> bool {
        match self.gateway.register(registration).await {
            Ok(()) => {
                tracing::info!(
                    service_name = %registration.service_name,
                    instance_id = %registration.instance_id,
                    health_check = %registration.health_check_url(),
                    "Registered service instance"
                );
                true
            }
            Err(e) => {
                tracing::error!(
                    service_name = %registration.service_name,
                    instance_id = %registration.instance_id,
                    error = %e,
                    "Failed to register service instance"
                );
                false
            }
        }
    }

    /// 注销服务实例，失败只记录日志并返回 false
    pub async fn deregister(&self, instance_id: &str) -> bool {
        match self.gateway.deregister(instance_id).await {
            Ok(()) => {
                tracing::info!(instance_id = %instance_id, "Deregistered service instance");
                true
            }
            Err(e) => {
                tracing::error!(
                    instance_id = %instance_id,
                    error = %e,
                    "Failed to deregister service instance"
                );
                false
            }
        }
    }

    /// 按服务名发现实例；没有可用实例时返回 `DiscoveryError::NoInstances`
    pub async fn discovery_services(
        &self,
        service_name: &str,
    ) -> Result<InstanceList, DiscoveryError> {
        let instances = self.cache.resolve(service_name).await?;
        if instances.is_empty() {
            return Err(DiscoveryError::NoInstances {
                service_name: service_name.to_string(),
            });
        }
        Ok(instances)
    }

    pub fn health_check(&self) -> bool {
        !self.cache.is_shut_down()
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn cache(&self) -> &DiscoveryCache<G> {
        &self.cache
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub async fn shutdown(&self) {
        self.cache.shutdown().await;
    }
}
