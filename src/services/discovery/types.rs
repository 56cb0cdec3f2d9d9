use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use thiserror::Error;

use crate::services::registry::{Instance, RegistryError};

/// 缓存中的实例列表，整体替换，从不原地修改
pub type InstanceList = Arc<Vec<Instance>>;

/// 监听任务配置
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// 首次失败后的重试间隔
    pub retry_interval: Duration,
    /// 退避上限
    pub max_backoff: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(5),
            max_backoff: Duration::from_secs(20),
        }
    }
}

impl WatchConfig {
    /// 连续失败 `failures` 次后的等待时长：`retry_interval * failures²`，不超过上限
    pub fn backoff(&self, failures: u32) -> Duration {
        let factor = failures.saturating_mul(failures).max(1);
        self.retry_interval
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// 服务发现错误类型
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("No instances available for service: {service_name}")]
    NoInstances { service_name: String },

    #[error("Discovery cache has been shut down")]
    ShutDown,
}

// 缓存统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// 已缓存的服务名数量
    pub cached_services: usize,
    /// 活跃的监听任务数量
    pub active_watches: usize,
    /// 首次加载调用次数
    pub seed_fetches: u64,
    /// 通过监听推送完成的缓存更新次数
    pub watch_updates: u64,
    /// 被丢弃的空载荷或异常载荷数量
    pub discarded_notifications: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub(crate) seed_fetches: AtomicU64,
    pub(crate) watch_updates: AtomicU64,
    pub(crate) discarded_notifications: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}
