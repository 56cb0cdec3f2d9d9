mod common;

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use common::{FakeGateway, instance};
use service_discovery::config::AgentConfig;
use service_discovery::server;
use service_discovery::services::discovery::WatchConfig;
use service_discovery::services::discovery_service::DiscoveryService;
use service_discovery::services::registry::Registration;

fn agent_service(gateway: FakeGateway) -> DiscoveryService<FakeGateway> {
    DiscoveryService::new(
        gateway,
        WatchConfig {
            retry_interval: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
        },
    )
}

fn registration() -> Registration {
    Registration {
        service_name: "agent".to_string(),
        instance_id: "agent-1".to_string(),
        health_check_path: "/health".to_string(),
        host: "10.0.0.9".to_string(),
        port: 7000,
        metadata: HashMap::new(),
    }
}

#[tokio::test]
async fn test_shutdown_during_slow_resolve_stops_agent() {
    // 首次解析会卡在慢速加载上，关闭信号在此期间到达
    let service = agent_service(
        FakeGateway::new()
            .with_members("orders", vec![instance("orders", "orders-1", 8080)])
            .with_list_delay(Duration::from_secs(30)),
    );
    let agent = AgentConfig {
        services: vec!["orders".to_string()],
        refresh_secs: 1,
    };
    let registration = registration();

    let started = Instant::now();
    tokio::time::timeout(
        Duration::from_secs(2),
        server::run(
            &service,
            Some(&registration),
            &agent,
            tokio::time::sleep(Duration::from_millis(100)),
        ),
    )
    .await
    .expect("agent should stop while a resolve is in flight");

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(service.gateway().list_calls(), 1);
    assert_eq!(service.gateway().register_calls.load(Ordering::SeqCst), 1);
    assert_eq!(service.gateway().deregister_calls.load(Ordering::SeqCst), 1);
    assert!(!service.health_check());
}

#[tokio::test]
async fn test_agent_resolves_until_shutdown() {
    let service = agent_service(
        FakeGateway::new().with_members("orders", vec![instance("orders", "orders-1", 8080)]),
    );
    let agent = AgentConfig {
        services: vec!["orders".to_string()],
        refresh_secs: 1,
    };
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let stop = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = tx.send(());
    });

    tokio::time::timeout(
        Duration::from_secs(2),
        server::run(&service, None, &agent, async {
            let _ = rx.await;
        }),
    )
    .await
    .expect("agent should stop on shutdown signal");
    stop.await.unwrap();

    // 首次 tick 立即触发解析
    assert_eq!(service.gateway().list_calls(), 1);
    assert_eq!(service.gateway().watch_calls(), 1);
    assert_eq!(service.gateway().register_calls.load(Ordering::SeqCst), 0);
    assert_eq!(service.gateway().deregister_calls.load(Ordering::SeqCst), 0);
    assert_eq!(service.stats().active_watches, 0);
}
