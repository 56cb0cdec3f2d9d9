use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::types::{CacheStats, DiscoveryError, InstanceList, StatsCounters, WatchConfig};
use super::watcher::Watcher;
use crate::services::registry::RegistryGateway;

/// 按服务名缓存健康实例列表，并通过后台监听保持更新
///
/// 每个服务名在首次解析时加载一次并启动一个监听任务，之后的解析直接读缓存。
/// 所有监听任务都归缓存对象所有，`shutdown` 或 drop 时一并取消。
#[derive(Debug)]
pub struct DiscoveryCache<G: RegistryGateway> {
    gateway: Arc<G>,
    // 服务名 -> 实例列表
    instances: Arc<DashMap<String, InstanceList>>,
    // 已启动监听的服务名，只在持有 init_lock 时写入
    watches: DashSet<String>,
    init_lock: Mutex<()>,
    config: WatchConfig,
    stats: Arc<StatsCounters>,
    shutdown: CancellationToken,
    task_tracker: TaskTracker,
}

impl<G: RegistryGateway> DiscoveryCache<G> {
    pub fn new(gateway: Arc<G>, config: WatchConfig) -> Self {
        Self {
            gateway,
            instances: Arc::new(DashMap::new()),
            watches: DashSet::new(),
            init_lock: Mutex::new(()),
            config,
            stats: Arc::new(StatsCounters::default()),
            shutdown: CancellationToken::new(),
            task_tracker: TaskTracker::new(),
        }
    }

    /// 解析服务名对应的实例列表，可能为空
    pub async fn resolve(&self, service_name: &str) -> Result<InstanceList, DiscoveryError> {
        if self.shutdown.is_cancelled() {
            return Err(DiscoveryError::ShutDown);
        }

        // 快速路径：不加锁读缓存
        if let Some(instances) = self.cached(service_name) {
            tracing::debug!(service_name = %service_name, "Discovery cache hit");
            return Ok(instances);
        }

        let _guard = self.init_lock.lock().await;

        // 拿到锁后再检查一次，其他调用者可能已完成初始化
        if let Some(instances) = self.cached(service_name) {
            return Ok(instances);
        }

        self.ensure_watch(service_name);

        StatsCounters::incr(&self.stats.seed_fetches);
        let seeded = match self.gateway.list_instances(service_name).await {
            Ok(instances) => instances,
            Err(e) => {
                tracing::warn!(
                    service_name = %service_name,
                    error = %e,
                    "Failed to seed discovery cache"
                );
                // 监听在此期间可能已写入
                return match self.cached(service_name) {
                    Some(instances) => Ok(instances),
                    None => Err(e.into()),
                };
            }
        };

        // 监听推送先到时保留推送结果
        let instances = self
            .instances
            .entry(service_name.to_string())
            .or_insert_with(|| Arc::new(seeded))
            .value()
            .clone();

        tracing::debug!(
            service_name = %service_name,
            instances = instances.len(),
            "Seeded discovery cache"
        );

        Ok(instances)
    }

    // 调用方必须持有 init_lock
    fn ensure_watch(&self, service_name: &str) {
        if self.watches.contains(service_name) {
            return;
        }

        let stream = self.gateway.watch_changes(service_name);
        self.watches.insert(service_name.to_string());

        let watcher = Watcher {
            service_name: service_name.to_string(),
            gateway: self.gateway.clone(),
            instances: self.instances.clone(),
            stats: self.stats.clone(),
            config: self.config.clone(),
            shutdown: self.shutdown.clone(),
        };
        self.task_tracker.spawn(watcher.run(stream));

        tracing::info!(service_name = %service_name, "Started watch for service");
    }

    /// 当前缓存的实例列表，不触发任何网络请求
    pub fn cached(&self, service_name: &str) -> Option<InstanceList> {
        self.instances
            .get(service_name)
            .map(|entry| entry.value().clone())
    }

    pub fn is_watching(&self, service_name: &str) -> bool {
        self.watches.contains(service_name)
    }

    pub fn watched_services(&self) -> Vec<String> {
        self.watches.iter().map(|name| name.key().clone()).collect()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            cached_services: self.instances.len(),
            active_watches: self.task_tracker.len(),
            seed_fetches: StatsCounters::get(&self.stats.seed_fetches),
            watch_updates: StatsCounters::get(&self.stats.watch_updates),
            discarded_notifications: StatsCounters::get(&self.stats.discarded_notifications),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// 取消所有监听任务并等待其退出
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;
        tracing::info!(
            watches = self.watches.len(),
            "Discovery cache shut down"
        );
    }
}

impl<G: RegistryGateway> Drop for DiscoveryCache<G> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
