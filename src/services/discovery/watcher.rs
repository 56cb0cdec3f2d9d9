use std::sync::Arc;

use dashmap::DashMap;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use super::types::{InstanceList, StatsCounters, WatchConfig};
use crate::services::registry::{Instance, Notification, RegistryGateway, WatchStream};

// 单个服务名的后台监听任务
pub(super) struct Watcher<G> {
    pub(super) service_name: String,
    pub(super) gateway: Arc<G>,
    pub(super) instances: Arc<DashMap<String, InstanceList>>,
    pub(super) stats: Arc<StatsCounters>,
    pub(super) config: WatchConfig,
    pub(super) shutdown: CancellationToken,
}

impl<G: RegistryGateway> Watcher<G> {
    pub(super) async fn run(self, mut stream: WatchStream) {
        let mut failures: u32 = 0;

        loop {
            let item = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                item = stream.next() => item,
            };

            match item {
                Some(Ok(notification)) => {
                    failures = 0;
                    self.apply(notification);
                }
                Some(Err(e)) => {
                    failures = failures.saturating_add(1);
                    tracing::warn!(
                        service_name = %self.service_name,
                        error = %e,
                        failures = failures,
                        "Watch request failed, backing off"
                    );
                    if !self.pause(failures).await {
                        break;
                    }
                }
                None => {
                    failures = failures.saturating_add(1);
                    tracing::warn!(
                        service_name = %self.service_name,
                        "Watch stream ended, resubscribing"
                    );
                    if !self.pause(failures).await {
                        break;
                    }
                    stream = self.gateway.watch_changes(&self.service_name);
                }
            }
        }

        tracing::info!(service_name = %self.service_name, "Watch stopped");
    }

    // 退避等待，期间被取消时返回 false
    async fn pause(&self, failures: u32) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(self.config.backoff(failures)) => true,
        }
    }

    fn apply(&self, notification: Notification) {
        match notification {
            Notification::Snapshot { index, entries } => {
                let total = entries.len();
                let healthy: Vec<Instance> = entries
                    .into_iter()
                    .filter(|entry| entry.is_passing())
                    .map(|entry| entry.instance)
                    .collect();

                tracing::debug!(
                    service_name = %self.service_name,
                    index = index,
                    total = total,
                    healthy = healthy.len(),
                    "Replacing cached instances from watch snapshot"
                );

                // 没有健康实例时同样写入空列表
                self.instances
                    .insert(self.service_name.clone(), Arc::new(healthy));
                StatsCounters::incr(&self.stats.watch_updates);
            }
            Notification::Nil => {
                tracing::debug!(
                    service_name = %self.service_name,
                    "Ignoring empty watch notification"
                );
                StatsCounters::incr(&self.stats.discarded_notifications);
            }
            Notification::Malformed { reason } => {
                tracing::debug!(
                    service_name = %self.service_name,
                    reason = %reason,
                    "Ignoring malformed watch notification"
                );
                StatsCounters::incr(&self.stats.discarded_notifications);
            }
        }
    }
}
