use std::future::Future;
use std::time::Duration;

use crate::config::{AgentConfig, Config};
use crate::services::{
    ConsulGateway, DiscoveryError, DiscoveryService, Registration, RegistryGateway,
};

pub async fn start(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let gateway = ConsulGateway::new(&config.consul, config.watch.wait())?;
    let service = DiscoveryService::new(gateway, config.watch.watch_config());
    let registration = config.instance.as_ref().map(|instance| instance.registration());

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
    };
    run(&service, registration.as_ref(), &config.agent, shutdown).await;

    Ok(())
}

/// 注册本实例并定期解析配置中的服务，`shutdown` 完成后注销并停止所有监听
pub async fn run<G, F>(
    service: &DiscoveryService<G>,
    registration: Option<&Registration>,
    agent: &AgentConfig,
    shutdown: F,
) where
    G: RegistryGateway,
    F: Future<Output = ()>,
{
    if let Some(registration) = registration {
        service.register_instance(registration).await;
    }

    // 信号 future 只创建一次，解析过程中到达的信号不会丢失
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(agent.refresh_interval());
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received");
                break;
            }
            _ = async {
                ticker.tick().await;
                resolve_all(service, &agent.services).await;
            } => {}
        }
    }

    if let Some(registration) = registration {
        service.deregister(&registration.instance_id).await;
    }
    // 避免卡在阻塞查询上
    if tokio::time::timeout(Duration::from_secs(5), service.shutdown())
        .await
        .is_err()
    {
        tracing::warn!("Timed out waiting for watches to stop");
    }
}

async fn resolve_all<G: RegistryGateway>(service: &DiscoveryService<G>, names: &[String]) {
    for name in names {
        match service.discovery_services(name).await {
            Ok(instances) => {
                let addresses: Vec<String> = instances.iter().map(|i| i.address()).collect();
                tracing::info!(
                    service_name = %name,
                    instances = ?addresses,
                    "Resolved service"
                );
            }
            Err(DiscoveryError::NoInstances { .. }) => {
                tracing::warn!(service_name = %name, "No healthy instances");
            }
            Err(e) => {
                tracing::error!(service_name = %name, error = %e, "Failed to resolve service");
            }
        }
    }
}
